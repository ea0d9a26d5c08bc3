//! Domain events published by a session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::exchange::{DescriptionKind, IceCandidate, SessionDescription};
use crate::state::{ConnectionState, NegotiationState};
use crate::transport::{ChannelId, ChannelMessage, MediaTrack, TrackKind};

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// Forwarded transport notification
    Transport,
    /// Raised by the session itself (pseudo event)
    Session,
}

/// Channel direction relative to this peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelDirection {
    Outbound,
    Inbound,
}

/// Which side a track belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Local,
    Remote,
}

/// Which side ended the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub label: String,
    pub direction: ChannelDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
}

impl From<&MediaTrack> for TrackInfo {
    fn from(track: &MediaTrack) -> Self {
        Self {
            id: track.id().to_string(),
            kind: track.kind(),
            stream_id: track.stream_id().to_string(),
        }
    }
}

/// Normalized event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    ConnectionStateChanged(ConnectionState),
    NegotiationStateChanged(NegotiationState),
    LocalCandidateGenerated(IceCandidate),
    ChannelOpened(ChannelInfo),
    ChannelClosed(ChannelInfo),
    MessageReceived {
        channel: ChannelInfo,
        message: ChannelMessage,
    },
    RemoteTrackAdded(TrackInfo),
    /// The remote peer ended the session
    RemotePeerClosed,

    Initialized,
    OfferCreated(SessionDescription),
    AnswerCreated(SessionDescription),
    LocalDescriptionSet(DescriptionKind),
    RemoteDescriptionApplied(DescriptionKind),
    RemoteCandidatesApplied {
        count: usize,
    },
    LocalTrackAdded(TrackInfo),
    TrackEnded {
        track: TrackInfo,
        source: TrackSource,
    },
    MessageSent(ChannelMessage),
    ConnectionClosed {
        initiator: Initiator,
    },
}

/// Payload-free discriminant of [`EventKind`], used for observer filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ConnectionStateChanged,
    NegotiationStateChanged,
    LocalCandidateGenerated,
    ChannelOpened,
    ChannelClosed,
    MessageReceived,
    RemoteTrackAdded,
    RemotePeerClosed,
    Initialized,
    OfferCreated,
    AnswerCreated,
    LocalDescriptionSet,
    RemoteDescriptionApplied,
    RemoteCandidatesApplied,
    LocalTrackAdded,
    TrackEnded,
    MessageSent,
    ConnectionClosed,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::ConnectionStateChanged(_) => EventType::ConnectionStateChanged,
            EventKind::NegotiationStateChanged(_) => EventType::NegotiationStateChanged,
            EventKind::LocalCandidateGenerated(_) => EventType::LocalCandidateGenerated,
            EventKind::ChannelOpened(_) => EventType::ChannelOpened,
            EventKind::ChannelClosed(_) => EventType::ChannelClosed,
            EventKind::MessageReceived { .. } => EventType::MessageReceived,
            EventKind::RemoteTrackAdded(_) => EventType::RemoteTrackAdded,
            EventKind::RemotePeerClosed => EventType::RemotePeerClosed,
            EventKind::Initialized => EventType::Initialized,
            EventKind::OfferCreated(_) => EventType::OfferCreated,
            EventKind::AnswerCreated(_) => EventType::AnswerCreated,
            EventKind::LocalDescriptionSet(_) => EventType::LocalDescriptionSet,
            EventKind::RemoteDescriptionApplied(_) => EventType::RemoteDescriptionApplied,
            EventKind::RemoteCandidatesApplied { .. } => EventType::RemoteCandidatesApplied,
            EventKind::LocalTrackAdded(_) => EventType::LocalTrackAdded,
            EventKind::TrackEnded { .. } => EventType::TrackEnded,
            EventKind::MessageSent(_) => EventType::MessageSent,
            EventKind::ConnectionClosed { .. } => EventType::ConnectionClosed,
        }
    }
}

/// A timestamped event on the session bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub origin: EventOrigin,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    /// Event forwarded from a transport notification
    pub fn transport(kind: EventKind) -> Self {
        Self {
            kind,
            origin: EventOrigin::Transport,
            timestamp: Utc::now(),
        }
    }

    /// Event raised by the session itself
    pub fn synthetic(kind: EventKind) -> Self {
        Self {
            kind,
            origin: EventOrigin::Session,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == EventOrigin::Session
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_synthetic() { "*" } else { " " };
        write!(f, "{} {}{}", self.timestamp.format("%H:%M:%S%.3f"), marker, self.kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::ConnectionStateChanged(state) => write!(f, "connection state: {}", state),
            EventKind::NegotiationStateChanged(state) => {
                write!(f, "negotiation state: {}", state)
            }
            EventKind::LocalCandidateGenerated(c) => write!(f, "local candidate: {}", c.candidate),
            EventKind::ChannelOpened(c) => {
                write!(f, "channel opened: {} ({:?})", c.label, c.direction)
            }
            EventKind::ChannelClosed(c) => {
                write!(f, "channel closed: {} ({:?})", c.label, c.direction)
            }
            EventKind::MessageReceived { channel, message } => {
                write!(f, "message on {}: {}", channel.label, message)
            }
            EventKind::RemoteTrackAdded(t) => write!(f, "remote {} track added: {}", t.kind, t.id),
            EventKind::RemotePeerClosed => f.write_str("remote peer closed the session"),
            EventKind::Initialized => f.write_str("transport initialized"),
            EventKind::OfferCreated(_) => f.write_str("offer created"),
            EventKind::AnswerCreated(_) => f.write_str("answer created"),
            EventKind::LocalDescriptionSet(kind) => write!(f, "local {} set", kind),
            EventKind::RemoteDescriptionApplied(kind) => write!(f, "remote {} applied", kind),
            EventKind::RemoteCandidatesApplied { count } => {
                write!(f, "{} remote candidates applied", count)
            }
            EventKind::LocalTrackAdded(t) => write!(f, "local {} track added: {}", t.kind, t.id),
            EventKind::TrackEnded { track, source } => {
                write!(f, "{:?} {} track ended: {}", source, track.kind, track.id)
            }
            EventKind::MessageSent(message) => write!(f, "message sent: {}", message),
            EventKind::ConnectionClosed { initiator } => {
                write!(f, "connection closed ({:?})", initiator)
            }
        }
    }
}
