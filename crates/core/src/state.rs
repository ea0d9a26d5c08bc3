//! Session phase derivation and legality predicates
//!
//! The transport exposes two raw signals that evolve independently: the
//! connection lifecycle and the negotiation lifecycle. [`derive_phase`] maps
//! a snapshot of both onto a [`Phase`], and [`SessionSnapshot`] combines the
//! phase with the few pieces of facade state the predicates need.
//!
//! The session facade enforces these predicates before touching the
//! transport, and a UI can call [`SessionSnapshot::affordances`] to decide
//! which actions to offer. Both read the same rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    /// Nothing negotiated yet
    New,
    /// Local description committed or connectivity checks running
    Negotiating,
    /// Peers are connected
    Connected,
    /// The remote peer went away
    Disconnected,
    /// Transport closed
    Closed,
}

/// Negotiation (offer/answer) lifecycle as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationState {
    /// No offer outstanding
    Stable,
    /// A local offer has been committed
    HaveLocalOffer,
    /// A remote offer has been applied
    HaveRemoteOffer,
    /// Transport closed
    Closed,
}

/// Derived negotiation/connection status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Transport created, no description exchanged yet
    Fresh,
    /// The peer's offer has been applied; an answer is expected from us
    RemoteOfferPending,
    /// Our offer is committed; waiting for the peer's answer
    LocalOfferSent,
    /// Our answer is committed (or the peer's answer applied); waiting for
    /// connectivity
    AnswerAcceptancePending,
    /// Peers are connected
    Connected,
    /// Transport closed
    Closed,
    /// Raw state pair outside the table
    Invalid,
}

/// Map a raw signal pair onto a phase
///
/// | connection  | negotiation       | phase                     |
/// |-------------|-------------------|---------------------------|
/// | new         | stable            | `Fresh`                   |
/// | new         | have-remote-offer | `RemoteOfferPending`      |
/// | negotiating | have-local-offer  | `LocalOfferSent`          |
/// | negotiating | stable            | `AnswerAcceptancePending` |
/// | connected   | any               | `Connected`               |
/// | closed      | closed            | `Closed`                  |
/// | otherwise   |                   | `Invalid`                 |
pub fn derive_phase(connection: ConnectionState, negotiation: NegotiationState) -> Phase {
    use ConnectionState as C;
    use NegotiationState as N;

    match (connection, negotiation) {
        (C::New, N::Stable) => Phase::Fresh,
        (C::New, N::HaveRemoteOffer) => Phase::RemoteOfferPending,
        (C::Negotiating, N::HaveLocalOffer) => Phase::LocalOfferSent,
        (C::Negotiating, N::Stable) => Phase::AnswerAcceptancePending,
        (C::Connected, _) => Phase::Connected,
        (C::Closed, N::Closed) => Phase::Closed,
        _ => Phase::Invalid,
    }
}

/// Operations gated by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Initialize,
    CreateChannel,
    AttachTrack,
    DetachTracks,
    StopRemoteTracks,
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    ApplyRemoteDescription,
    ApplyRemoteCandidates,
    SendMessage,
    CloseChannel,
    CloseConnection,
    Clear,
}

/// Point-in-time view of everything the predicates depend on
///
/// `phase` is `None` while no transport exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Option<Phase>,
    pub has_local_description: bool,
    pub local_description_committed: bool,
    pub remote_candidates_applied: bool,
    pub outbound_channel_open: bool,
    pub has_outbound_channel: bool,
    pub has_inbound_channel: bool,
    pub local_track_count: usize,
    pub remote_track_count: usize,
    pub local_candidate_count: usize,
}

impl SessionSnapshot {
    fn phase_is(&self, phase: Phase) -> bool {
        self.phase == Some(phase)
    }

    /// `initialize` is legal: no transport exists
    pub fn can_initialize(&self) -> bool {
        self.phase.is_none()
    }

    /// A channel or track may be added to the negotiation
    pub fn can_create_channel_or_track(&self) -> bool {
        self.phase_is(Phase::Fresh)
            || (self.phase_is(Phase::RemoteOfferPending) && self.remote_candidates_applied)
    }

    pub fn can_create_offer(&self) -> bool {
        self.phase_is(Phase::Fresh)
    }

    pub fn can_create_answer(&self) -> bool {
        self.phase_is(Phase::RemoteOfferPending) && self.remote_candidates_applied
    }

    /// The generated description may be committed to the transport
    pub fn can_set_local_description(&self) -> bool {
        self.has_local_description
            && !self.local_description_committed
            && (self.phase_is(Phase::Fresh) || self.phase_is(Phase::RemoteOfferPending))
    }

    /// Either the first remote offer (nothing generated locally yet) or the
    /// answer to our committed offer
    pub fn can_apply_remote_description(&self) -> bool {
        (self.phase_is(Phase::Fresh) && !self.has_local_description)
            || (self.phase_is(Phase::LocalOfferSent) && self.has_local_description)
    }

    pub fn can_apply_remote_candidates(&self) -> bool {
        self.phase_is(Phase::RemoteOfferPending)
            && !self.has_local_description
            && !self.remote_candidates_applied
    }

    pub fn can_send_message(&self) -> bool {
        self.phase_is(Phase::Connected) && self.outbound_channel_open
    }

    pub fn can_close(&self) -> bool {
        self.phase_is(Phase::Connected)
    }

    pub fn can_reset(&self) -> bool {
        self.phase_is(Phase::Closed)
    }

    /// Whether `operation` is currently legal
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Initialize => self.can_initialize(),
            Operation::CreateChannel | Operation::AttachTrack => {
                self.can_create_channel_or_track()
            }
            Operation::DetachTracks => self.local_track_count > 0,
            Operation::StopRemoteTracks => self.remote_track_count > 0,
            Operation::CreateOffer => self.can_create_offer(),
            Operation::CreateAnswer => self.can_create_answer(),
            Operation::SetLocalDescription => self.can_set_local_description(),
            Operation::ApplyRemoteDescription => self.can_apply_remote_description(),
            Operation::ApplyRemoteCandidates => self.can_apply_remote_candidates(),
            Operation::SendMessage => self.can_send_message(),
            Operation::CloseChannel => self.has_outbound_channel || self.has_inbound_channel,
            Operation::CloseConnection => self.can_close(),
            Operation::Clear => self.can_reset(),
        }
    }

    /// Evaluate every predicate at once
    pub fn affordances(&self) -> Affordances {
        Affordances {
            initialize: self.can_initialize(),
            create_channel: self.can_create_channel_or_track(),
            attach_track: self.can_create_channel_or_track(),
            detach_tracks: self.allows(Operation::DetachTracks),
            stop_remote_tracks: self.allows(Operation::StopRemoteTracks),
            create_offer: self.can_create_offer(),
            create_answer: self.can_create_answer(),
            set_local_description: self.can_set_local_description(),
            apply_remote_description: self.can_apply_remote_description(),
            apply_remote_candidates: self.can_apply_remote_candidates(),
            send_message: self.can_send_message(),
            close_outbound_channel: self.has_outbound_channel,
            close_inbound_channel: self.has_inbound_channel,
            close_connection: self.can_close(),
            clear: self.can_reset(),
        }
    }
}

/// Which user-facing actions are currently available
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordances {
    pub initialize: bool,
    pub create_channel: bool,
    pub attach_track: bool,
    pub detach_tracks: bool,
    pub stop_remote_tracks: bool,
    pub create_offer: bool,
    pub create_answer: bool,
    pub set_local_description: bool,
    pub apply_remote_description: bool,
    pub apply_remote_candidates: bool,
    pub send_message: bool,
    pub close_outbound_channel: bool,
    pub close_inbound_channel: bool,
    pub close_connection: bool,
    pub clear: bool,
}

impl Affordances {
    /// Names of the enabled actions, in declaration order
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            (self.initialize, "initialize"),
            (self.create_channel, "create-channel"),
            (self.attach_track, "attach-track"),
            (self.detach_tracks, "detach-tracks"),
            (self.stop_remote_tracks, "stop-remote-tracks"),
            (self.create_offer, "create-offer"),
            (self.create_answer, "create-answer"),
            (self.set_local_description, "set-local-description"),
            (self.apply_remote_description, "apply-remote-description"),
            (self.apply_remote_candidates, "apply-remote-candidates"),
            (self.send_message, "send-message"),
            (self.close_outbound_channel, "close-outbound-channel"),
            (self.close_inbound_channel, "close-inbound-channel"),
            (self.close_connection, "close-connection"),
            (self.clear, "clear"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationState::Stable => "stable",
            NegotiationState::HaveLocalOffer => "have-local-offer",
            NegotiationState::HaveRemoteOffer => "have-remote-offer",
            NegotiationState::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Fresh => "fresh",
            Phase::RemoteOfferPending => "remote-offer-pending",
            Phase::LocalOfferSent => "local-offer-sent",
            Phase::AnswerAcceptancePending => "answer-acceptance-pending",
            Phase::Connected => "connected",
            Phase::Closed => "closed",
            Phase::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Initialize => "initialize",
            Operation::CreateChannel => "create channel",
            Operation::AttachTrack => "attach track",
            Operation::DetachTracks => "detach tracks",
            Operation::StopRemoteTracks => "stop remote tracks",
            Operation::CreateOffer => "create offer",
            Operation::CreateAnswer => "create answer",
            Operation::SetLocalDescription => "set local description",
            Operation::ApplyRemoteDescription => "apply remote description",
            Operation::ApplyRemoteCandidates => "apply remote candidates",
            Operation::SendMessage => "send message",
            Operation::CloseChannel => "close channel",
            Operation::CloseConnection => "close connection",
            Operation::Clear => "clear",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION_STATES: [ConnectionState; 5] = [
        ConnectionState::New,
        ConnectionState::Negotiating,
        ConnectionState::Connected,
        ConnectionState::Disconnected,
        ConnectionState::Closed,
    ];

    const NEGOTIATION_STATES: [NegotiationState; 4] = [
        NegotiationState::Stable,
        NegotiationState::HaveLocalOffer,
        NegotiationState::HaveRemoteOffer,
        NegotiationState::Closed,
    ];

    fn snapshot(phase: Phase) -> SessionSnapshot {
        SessionSnapshot {
            phase: Some(phase),
            ..Default::default()
        }
    }

    #[test]
    fn test_phase_table() {
        use ConnectionState as C;
        use NegotiationState as N;

        assert_eq!(derive_phase(C::New, N::Stable), Phase::Fresh);
        assert_eq!(derive_phase(C::New, N::HaveRemoteOffer), Phase::RemoteOfferPending);
        assert_eq!(derive_phase(C::Negotiating, N::HaveLocalOffer), Phase::LocalOfferSent);
        assert_eq!(
            derive_phase(C::Negotiating, N::Stable),
            Phase::AnswerAcceptancePending
        );
        assert_eq!(derive_phase(C::Closed, N::Closed), Phase::Closed);
        for negotiation in NEGOTIATION_STATES {
            assert_eq!(derive_phase(C::Connected, negotiation), Phase::Connected);
        }
    }

    #[test]
    fn test_phase_outside_table_is_invalid() {
        use ConnectionState as C;
        use NegotiationState as N;

        assert_eq!(derive_phase(C::New, N::HaveLocalOffer), Phase::Invalid);
        assert_eq!(derive_phase(C::Negotiating, N::HaveRemoteOffer), Phase::Invalid);
        assert_eq!(derive_phase(C::Closed, N::Stable), Phase::Invalid);
        assert_eq!(derive_phase(C::Disconnected, N::Stable), Phase::Invalid);
        assert_eq!(derive_phase(C::New, N::Closed), Phase::Invalid);
    }

    #[test]
    fn test_every_pair_yields_exactly_one_phase() {
        let mut valid = 0;
        for connection in CONNECTION_STATES {
            for negotiation in NEGOTIATION_STATES {
                if derive_phase(connection, negotiation) != Phase::Invalid {
                    valid += 1;
                }
            }
        }
        // 4 single rows + 4 connected rows + closed/closed
        assert_eq!(valid, 9);
    }

    #[test]
    fn test_can_create_offer_iff_fresh() {
        for connection in CONNECTION_STATES {
            for negotiation in NEGOTIATION_STATES {
                let phase = derive_phase(connection, negotiation);
                let mut snap = snapshot(phase);
                assert_eq!(snap.can_create_offer(), phase == Phase::Fresh);
                snap.has_local_description = true;
                snap.remote_candidates_applied = true;
                assert_eq!(snap.can_create_offer(), phase == Phase::Fresh);
            }
        }
    }

    #[test]
    fn test_uninitialized_snapshot() {
        let snap = SessionSnapshot::default();
        assert!(snap.can_initialize());
        let affordances = snap.affordances();
        assert_eq!(affordances.enabled(), vec!["initialize"]);
    }

    #[test]
    fn test_channel_or_track_needs_applied_candidates_on_answerer() {
        let mut snap = snapshot(Phase::RemoteOfferPending);
        assert!(!snap.can_create_channel_or_track());
        assert!(!snap.can_create_answer());
        assert!(snap.can_apply_remote_candidates());

        snap.remote_candidates_applied = true;
        assert!(snap.can_create_channel_or_track());
        assert!(snap.can_create_answer());
        assert!(!snap.can_apply_remote_candidates());
    }

    #[test]
    fn test_set_local_description_once() {
        let mut snap = snapshot(Phase::Fresh);
        assert!(!snap.can_set_local_description());

        snap.has_local_description = true;
        assert!(snap.can_set_local_description());

        snap.local_description_committed = true;
        assert!(!snap.can_set_local_description());
    }

    #[test]
    fn test_apply_remote_description() {
        let mut snap = snapshot(Phase::Fresh);
        assert!(snap.can_apply_remote_description());

        // An offer was generated locally; we are the offerer now
        snap.has_local_description = true;
        assert!(!snap.can_apply_remote_description());

        let mut snap = snapshot(Phase::LocalOfferSent);
        snap.has_local_description = true;
        assert!(snap.can_apply_remote_description());

        let mut snap = snapshot(Phase::AnswerAcceptancePending);
        snap.has_local_description = true;
        assert!(!snap.can_apply_remote_description());
    }

    #[test]
    fn test_apply_remote_candidates_rules() {
        let mut snap = snapshot(Phase::RemoteOfferPending);
        snap.has_local_description = true;
        assert!(!snap.can_apply_remote_candidates());

        assert!(!snapshot(Phase::Fresh).can_apply_remote_candidates());
    }

    #[test]
    fn test_close_and_reset() {
        assert!(snapshot(Phase::Connected).can_close());
        assert!(!snapshot(Phase::Connected).can_reset());
        assert!(snapshot(Phase::Closed).can_reset());
        assert!(!snapshot(Phase::Closed).can_close());
        assert!(!snapshot(Phase::Invalid).can_close());
    }

    #[test]
    fn test_send_requires_open_outbound_channel() {
        let mut snap = snapshot(Phase::Connected);
        snap.has_outbound_channel = true;
        assert!(!snap.can_send_message());
        snap.outbound_channel_open = true;
        assert!(snap.can_send_message());
        snap.phase = Some(Phase::AnswerAcceptancePending);
        assert!(!snap.can_send_message());
    }

    #[test]
    fn test_allows_matches_affordances() {
        let mut snap = snapshot(Phase::Connected);
        snap.has_outbound_channel = true;
        snap.outbound_channel_open = true;
        snap.local_track_count = 1;

        let affordances = snap.affordances();
        assert_eq!(affordances.send_message, snap.allows(Operation::SendMessage));
        assert_eq!(affordances.close_connection, snap.allows(Operation::CloseConnection));
        assert_eq!(affordances.detach_tracks, snap.allows(Operation::DetachTracks));
        assert!(!snap.allows(Operation::Clear));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&Phase::RemoteOfferPending).unwrap();
        assert_eq!(json, "\"remote-offer-pending\"");
        let state: NegotiationState = serde_json::from_str("\"have-local-offer\"").unwrap();
        assert_eq!(state, NegotiationState::HaveLocalOffer);
        assert_eq!(Phase::AnswerAcceptancePending.to_string(), "answer-acceptance-pending");
    }
}
