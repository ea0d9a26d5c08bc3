//! Session negotiation core for manually-signalled peer-to-peer sessions
//!
//! Two endpoints establish a direct session (data channel and/or media
//! tracks) by pasting negotiation payloads to each other by hand. This
//! crate holds the parts that do not depend on the actual network stack:
//!
//! - **State machine** ([`state`]): derives a [`Phase`] from the transport's
//!   two raw state signals and the predicates deciding which operations are
//!   legal.
//! - **Session facade** ([`Session`]): owns one [`Transport`], enforces the
//!   predicates, sequences offer/answer/candidate exchange and turns a
//!   remote disconnect into the same closure path as a local close.
//! - **Event bus** ([`events`]): typed events with atomic replace-all
//!   observer sets and a bounded newest-first history.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Front end (CLI / UI)                                │
//! │  ↓ operations              ↑ SessionEvents           │
//! │  Session ── guard(Operation) ── SessionSnapshot      │
//! │  ├─ EventBus (ObserverSet) + EventLog                │
//! │  └─ notification pump (single writer via Mutex)      │
//! │     ↑ TransportNotification                          │
//! │  dyn Transport (webrtc, mock, ...)                   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use peerpaste_core::mock::MockNetwork;
//! use peerpaste_core::{Phase, Session};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> peerpaste_core::Result<()> {
//! let network = MockNetwork::new();
//! let session = Session::new(Arc::new(network.factory()));
//!
//! session.initialize().await?;
//! session.create_outbound_channel("chat").await?;
//! session.create_offer().await?;
//! session.set_local_description().await?;
//!
//! assert_eq!(session.phase().await, Some(Phase::LocalOfferSent));
//! let payload = session.exchange_payload().await.expect("offer was created");
//! println!("{}", payload.encode()?);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod session;
pub mod state;
pub mod transport;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{
    ChannelDirection, ChannelInfo, EventKind, EventOrigin, EventType, Initiator, ObserverSet,
    SessionEvent, TrackInfo, TrackSource,
};
pub use exchange::{DescriptionKind, ExchangePayload, IceCandidate, SessionDescription};
pub use session::Session;
pub use state::{
    derive_phase, Affordances, ConnectionState, NegotiationState, Operation, Phase,
    SessionSnapshot,
};
pub use transport::{
    ChannelId, ChannelMessage, DataChannel, MediaTrack, TrackKind, Transport, TransportEvents,
    TransportFactory, TransportNotification,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
