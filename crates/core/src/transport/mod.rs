//! Transport capability contract
//!
//! A [`Transport`] performs the actual negotiation, connectivity and
//! delivery. The session never inspects how; it only calls the operations
//! below and consumes [`TransportNotification`]s pushed through the
//! [`TransportEvents`] handle it passes to the [`TransportFactory`].
//!
//! Implementations must only ever report raw state pairs from the phase
//! table in [`crate::state::derive_phase`], plus `disconnected` when the
//! remote peer goes away.

pub mod channel;
pub mod track;

pub use channel::{ChannelId, ChannelMessage, DataChannel, MAX_MESSAGE_SIZE};
pub use track::{MediaTrack, TrackKind};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::exchange::{DescriptionKind, IceCandidate, SessionDescription};
use crate::state::{ConnectionState, NegotiationState};
use crate::Result;

/// Asynchronous notifications raised by a transport
#[derive(Debug, Clone)]
pub enum TransportNotification {
    /// A local connectivity candidate was gathered
    LocalCandidate(IceCandidate),
    ConnectionStateChanged(ConnectionState),
    NegotiationStateChanged(NegotiationState),
    /// The peer opened a channel towards us
    InboundChannel(Arc<dyn DataChannel>),
    /// A channel (either direction) became usable
    ChannelOpened(ChannelId),
    /// The peer added a media track
    InboundTrack(MediaTrack),
    ChannelMessage(ChannelId, ChannelMessage),
    ChannelClosed(ChannelId),
}

/// Sending half handed to a transport for raising notifications
#[derive(Debug, Clone)]
pub struct TransportEvents {
    tx: mpsc::UnboundedSender<TransportNotification>,
}

impl TransportEvents {
    /// Create a notification handle and its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Raise a notification; dropped silently once the session stopped
    /// listening
    pub fn emit(&self, notification: TransportNotification) {
        let _ = self.tx.send(notification);
    }

    /// Whether a session is still listening
    pub fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Connection establishment primitives
#[async_trait]
pub trait Transport: Send + Sync {
    /// Produce (but do not apply) a local offer or answer
    async fn create_local_description(&self, kind: DescriptionKind)
        -> Result<SessionDescription>;

    /// Apply a previously produced local description; starts candidate
    /// gathering
    async fn commit_local_description(&self, description: &SessionDescription) -> Result<()>;

    async fn commit_remote_description(&self, description: &SessionDescription) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    async fn create_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    async fn add_track(&self, track: &MediaTrack) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Current connection lifecycle signal
    fn connection_state(&self) -> ConnectionState;

    /// Current negotiation lifecycle signal
    fn negotiation_state(&self) -> NegotiationState;

    /// Both signals, read together
    fn state_pair(&self) -> (ConnectionState, NegotiationState) {
        (self.connection_state(), self.negotiation_state())
    }
}

/// Creates one transport per `initialize`
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, events: TransportEvents) -> Result<Arc<dyn Transport>>;
}
