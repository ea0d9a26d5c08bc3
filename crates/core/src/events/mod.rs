//! Session events, the observer bus and the event history

pub mod bus;
pub mod log;
pub mod types;

pub use bus::{EventBus, Observer, ObserverSet};
pub use log::EventLog;
pub use types::{
    ChannelDirection, ChannelInfo, EventKind, EventOrigin, EventType, Initiator, SessionEvent,
    TrackInfo, TrackSource,
};
