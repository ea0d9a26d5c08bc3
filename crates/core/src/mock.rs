//! In-memory transport for tests and demos
//!
//! A [`MockNetwork`] connects any number of [`MockTransport`] endpoints
//! living in the same process. Descriptions are tiny SDP-like documents
//! naming the endpoint that produced them, so pasting one endpoint's offer
//! into another wires the pair together exactly as a real exchange would.
//!
//! The transport only reports raw state pairs from the phase table, trickles
//! one candidate per negotiated section after a local commit, delivers
//! channels and tracks to the peer once both sides are connected, and turns
//! a `close()` into `disconnected` on the peer.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::exchange::{DescriptionKind, IceCandidate, SessionDescription};
use crate::state::{ConnectionState, NegotiationState};
use crate::transport::{
    ChannelId, ChannelMessage, DataChannel, MediaTrack, TrackKind, Transport, TransportEvents,
    TransportFactory, TransportNotification,
};
use crate::{Error, Result};

/// Identity of an endpoint on a [`MockNetwork`]
pub type EndpointId = u64;

const ENDPOINT_ATTRIBUTE: &str = "a=mock-endpoint:";

/// Shared in-memory network
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    next_endpoint: EndpointId,
    endpoints: HashMap<EndpointId, Endpoint>,
}

struct Endpoint {
    events: TransportEvents,
    connection: ConnectionState,
    negotiation: NegotiationState,
    local_committed: bool,
    remote: Option<EndpointId>,
    remote_committed: bool,
    remote_candidates: usize,
    next_channel: u64,
    channels: BTreeMap<ChannelId, ChannelRecord>,
    tracks: Vec<MediaTrack>,
}

struct ChannelRecord {
    open: bool,
    closed: bool,
    label: String,
    peer: Option<(EndpointId, ChannelId)>,
}

impl Endpoint {
    fn new(events: TransportEvents) -> Self {
        Self {
            events,
            connection: ConnectionState::New,
            negotiation: NegotiationState::Stable,
            local_committed: false,
            remote: None,
            remote_committed: false,
            remote_candidates: 0,
            next_channel: 0,
            channels: BTreeMap::new(),
            tracks: Vec::new(),
        }
    }

    fn set_state(&mut self, connection: ConnectionState, negotiation: NegotiationState) {
        let connection_changed = self.connection != connection;
        let negotiation_changed = self.negotiation != negotiation;
        self.connection = connection;
        self.negotiation = negotiation;

        if connection_changed {
            self.events
                .emit(TransportNotification::ConnectionStateChanged(connection));
        }
        if negotiation_changed {
            self.events
                .emit(TransportNotification::NegotiationStateChanged(negotiation));
        }
    }

    fn allocate_channel(&mut self) -> ChannelId {
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        id
    }

    fn has_channels(&self) -> bool {
        self.channels.values().any(|c| !c.closed)
    }

    fn section_count(&self) -> usize {
        usize::from(self.has_channels()) + self.tracks.len()
    }

    fn describe(&self, id: EndpointId, kind: DescriptionKind) -> SessionDescription {
        let mut lines = vec![
            "v=0".to_string(),
            format!("o=- {} 1 IN IP4 127.0.0.1", id),
            "s=-".to_string(),
            format!("{}{}", ENDPOINT_ATTRIBUTE, id),
        ];
        if self.has_channels() {
            lines.push("m=application 9 UDP/DTLS/SCTP webrtc-datachannel".to_string());
        }
        for track in &self.tracks {
            match track.kind() {
                TrackKind::Audio => lines.push("m=audio 9 UDP/TLS/RTP/SAVPF 111".to_string()),
                TrackKind::Video => lines.push("m=video 9 UDP/TLS/RTP/SAVPF 96".to_string()),
            }
            lines.push(format!("a=msid:{} {}", track.stream_id(), track.id()));
        }
        let mut sdp = lines.join("\r\n");
        sdp.push_str("\r\n");

        SessionDescription { kind, sdp }
    }

    fn trickle_candidates(&self, id: EndpointId) {
        for index in 0..self.section_count() {
            let port = 40000 + id * 16 + index as u64;
            self.events
                .emit(TransportNotification::LocalCandidate(IceCandidate {
                    candidate: format!(
                        "candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host",
                        id * 16 + index as u64,
                        port
                    ),
                    sdp_mid: Some(index.to_string()),
                    sdp_m_line_index: Some(index as u16),
                    username_fragment: None,
                }));
        }
    }

    fn ready_to_connect(&self, peer: EndpointId) -> bool {
        self.remote == Some(peer)
            && self.local_committed
            && self.remote_committed
            && self.connection == ConnectionState::Negotiating
            && self.negotiation == NegotiationState::Stable
    }
}

impl NetworkState {
    fn endpoint(&self, id: EndpointId) -> Result<&Endpoint> {
        self.endpoints
            .get(&id)
            .ok_or_else(|| Error::transport(format!("unknown endpoint {}", id)))
    }

    fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(&id)
            .ok_or_else(|| Error::transport(format!("unknown endpoint {}", id)))
    }

    fn try_connect(&mut self, network: &Weak<Mutex<NetworkState>>, a: EndpointId) {
        let Some(b) = self.endpoints.get(&a).and_then(|e| e.remote) else {
            return;
        };
        let ready = match (self.endpoints.get(&a), self.endpoints.get(&b)) {
            (Some(ea), Some(eb)) => ea.ready_to_connect(b) && eb.ready_to_connect(a),
            _ => false,
        };
        if !ready {
            return;
        }

        debug!(a, b, "Mock endpoints connected");
        for id in [a, b] {
            if let Some(endpoint) = self.endpoints.get_mut(&id) {
                endpoint.set_state(ConnectionState::Connected, NegotiationState::Stable);
            }
        }

        self.open_channels(network, a, b);
        self.open_channels(network, b, a);
        self.deliver_tracks(a, b);
        self.deliver_tracks(b, a);
    }

    fn open_channels(&mut self, network: &Weak<Mutex<NetworkState>>, from: EndpointId, to: EndpointId) {
        let pending: Vec<(ChannelId, String)> = match self.endpoints.get(&from) {
            Some(endpoint) => endpoint
                .channels
                .iter()
                .filter(|(_, c)| !c.open && !c.closed && c.peer.is_none())
                .map(|(id, c)| (*id, c.label.clone()))
                .collect(),
            None => return,
        };

        for (local_id, label) in pending {
            let Some(remote) = self.endpoints.get_mut(&to) else {
                return;
            };
            let remote_id = remote.allocate_channel();
            remote.channels.insert(
                remote_id,
                ChannelRecord {
                    open: true,
                    closed: false,
                    label: label.clone(),
                    peer: Some((from, local_id)),
                },
            );
            let handle: Arc<dyn DataChannel> = Arc::new(MockChannel {
                id: remote_id,
                label,
                endpoint: to,
                network: network.clone(),
            });
            remote
                .events
                .emit(TransportNotification::InboundChannel(handle));
            remote
                .events
                .emit(TransportNotification::ChannelOpened(remote_id));

            if let Some(local) = self.endpoints.get_mut(&from) {
                if let Some(record) = local.channels.get_mut(&local_id) {
                    record.open = true;
                    record.peer = Some((to, remote_id));
                }
                local
                    .events
                    .emit(TransportNotification::ChannelOpened(local_id));
            }
        }
    }

    fn deliver_tracks(&mut self, from: EndpointId, to: EndpointId) {
        let tracks = match self.endpoints.get(&from) {
            Some(endpoint) => endpoint.tracks.clone(),
            None => return,
        };
        if let Some(remote) = self.endpoints.get(&to) {
            for track in tracks {
                let received = MediaTrack::new(track.id(), track.kind(), track.stream_id());
                remote
                    .events
                    .emit(TransportNotification::InboundTrack(received));
            }
        }
    }

    /// Mark both ends of a channel closed and notify each side once
    fn close_channel(&mut self, endpoint: EndpointId, channel: ChannelId) {
        let Some(owner) = self.endpoints.get_mut(&endpoint) else {
            return;
        };
        let Some(record) = owner.channels.get_mut(&channel) else {
            return;
        };
        if record.closed {
            return;
        }
        record.closed = true;
        record.open = false;
        let peer = record.peer;
        owner
            .events
            .emit(TransportNotification::ChannelClosed(channel));

        if let Some((peer_endpoint, peer_channel)) = peer {
            self.close_channel(peer_endpoint, peer_channel);
        }
    }
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory creating endpoints on this network
    pub fn factory(&self) -> MockTransportFactory {
        MockTransportFactory {
            network: self.clone(),
        }
    }

    /// Ids of the live endpoints, in creation order
    ///
    /// An endpoint leaves the network when its transport is dropped.
    pub fn endpoints(&self) -> Vec<EndpointId> {
        let state = self.state.lock();
        let mut ids: Vec<_> = state.endpoints.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Endpoint that produced `description`
    pub fn endpoint_of(description: &SessionDescription) -> Option<EndpointId> {
        description
            .sdp
            .lines()
            .find_map(|line| line.strip_prefix(ENDPOINT_ATTRIBUTE))
            .and_then(|id| id.trim().parse().ok())
    }

    /// Raw state pair of an endpoint
    pub fn state_of(&self, endpoint: EndpointId) -> Option<(ConnectionState, NegotiationState)> {
        let state = self.state.lock();
        state
            .endpoints
            .get(&endpoint)
            .map(|e| (e.connection, e.negotiation))
    }

    /// Number of remote candidates an endpoint accepted
    pub fn remote_candidates_received(&self, endpoint: EndpointId) -> usize {
        let state = self.state.lock();
        state
            .endpoints
            .get(&endpoint)
            .map_or(0, |e| e.remote_candidates)
    }

    /// Simulate the peer of `endpoint` vanishing without a close
    pub fn disconnect(&self, endpoint: EndpointId) {
        let mut state = self.state.lock();
        if let Some(e) = state.endpoints.get_mut(&endpoint) {
            e.remote = None;
            let negotiation = e.negotiation;
            e.set_state(ConnectionState::Disconnected, negotiation);
        }
    }

    /// Force an arbitrary raw state pair, bypassing the transport contract
    pub fn force_state(
        &self,
        endpoint: EndpointId,
        connection: ConnectionState,
        negotiation: NegotiationState,
    ) {
        let mut state = self.state.lock();
        if let Some(e) = state.endpoints.get_mut(&endpoint) {
            e.set_state(connection, negotiation);
        }
    }

    fn register(&self, events: TransportEvents) -> EndpointId {
        let mut state = self.state.lock();
        let id = state.next_endpoint;
        state.next_endpoint += 1;
        state.endpoints.insert(id, Endpoint::new(events));
        id
    }
}

/// Creates [`MockTransport`]s on a shared [`MockNetwork`]
#[derive(Clone)]
pub struct MockTransportFactory {
    network: MockNetwork,
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(&self, events: TransportEvents) -> Result<Arc<dyn Transport>> {
        let id = self.network.register(events);
        debug!(endpoint = id, "Created mock transport");
        Ok(Arc::new(MockTransport {
            id,
            network: self.network.clone(),
        }))
    }
}

/// One endpoint on a [`MockNetwork`]
pub struct MockTransport {
    id: EndpointId,
    network: MockNetwork,
}

impl MockTransport {
    pub fn endpoint_id(&self) -> EndpointId {
        self.id
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if self.network.state.lock().endpoints.remove(&self.id).is_some() {
            debug!(endpoint = self.id, "Removed mock endpoint");
        }
    }
}

fn reject(what: &str, negotiation: NegotiationState) -> Error {
    Error::transport(format!("cannot {} in negotiation state {}", what, negotiation))
}

#[async_trait]
impl Transport for MockTransport {
    async fn create_local_description(
        &self,
        kind: DescriptionKind,
    ) -> Result<SessionDescription> {
        let state = self.network.state.lock();
        let endpoint = state.endpoint(self.id)?;

        let legal = match kind {
            DescriptionKind::Offer => {
                endpoint.connection == ConnectionState::New
                    && endpoint.negotiation == NegotiationState::Stable
            }
            DescriptionKind::Answer => endpoint.negotiation == NegotiationState::HaveRemoteOffer,
        };
        if !legal {
            return Err(reject(&format!("create {}", kind), endpoint.negotiation));
        }

        Ok(endpoint.describe(self.id, kind))
    }

    async fn commit_local_description(&self, description: &SessionDescription) -> Result<()> {
        if MockNetwork::endpoint_of(description) != Some(self.id) {
            return Err(Error::transport(
                "local description was not produced by this transport",
            ));
        }

        let mut state = self.network.state.lock();
        let endpoint = state.endpoint_mut(self.id)?;
        match description.kind {
            DescriptionKind::Offer => {
                if endpoint.connection != ConnectionState::New
                    || endpoint.negotiation != NegotiationState::Stable
                {
                    return Err(reject("commit local offer", endpoint.negotiation));
                }
                endpoint.local_committed = true;
                endpoint.set_state(ConnectionState::Negotiating, NegotiationState::HaveLocalOffer);
            }
            DescriptionKind::Answer => {
                if endpoint.negotiation != NegotiationState::HaveRemoteOffer {
                    return Err(reject("commit local answer", endpoint.negotiation));
                }
                endpoint.local_committed = true;
                endpoint.set_state(ConnectionState::Negotiating, NegotiationState::Stable);
            }
        }
        endpoint.trickle_candidates(self.id);

        let weak = Arc::downgrade(&self.network.state);
        state.try_connect(&weak, self.id);
        Ok(())
    }

    async fn commit_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let peer = MockNetwork::endpoint_of(description)
            .ok_or_else(|| Error::transport("malformed session description"))?;
        if peer == self.id {
            return Err(Error::transport("cannot negotiate with self"));
        }

        let mut state = self.network.state.lock();
        state.endpoint(peer)?;
        let endpoint = state.endpoint_mut(self.id)?;
        match description.kind {
            DescriptionKind::Offer => {
                if endpoint.connection != ConnectionState::New
                    || endpoint.negotiation != NegotiationState::Stable
                {
                    return Err(reject("apply remote offer", endpoint.negotiation));
                }
                endpoint.remote = Some(peer);
                endpoint.remote_committed = true;
                endpoint.set_state(ConnectionState::New, NegotiationState::HaveRemoteOffer);
            }
            DescriptionKind::Answer => {
                if endpoint.negotiation != NegotiationState::HaveLocalOffer {
                    return Err(reject("apply remote answer", endpoint.negotiation));
                }
                endpoint.remote = Some(peer);
                endpoint.remote_committed = true;
                endpoint.set_state(ConnectionState::Negotiating, NegotiationState::Stable);
            }
        }

        let weak = Arc::downgrade(&self.network.state);
        state.try_connect(&weak, self.id);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        if !candidate.candidate.starts_with("candidate:") {
            return Err(Error::transport(format!(
                "malformed candidate: {:?}",
                candidate.candidate
            )));
        }

        let mut state = self.network.state.lock();
        let endpoint = state.endpoint_mut(self.id)?;
        if !endpoint.remote_committed {
            return Err(Error::transport("no remote description applied"));
        }
        endpoint.remote_candidates += 1;
        Ok(())
    }

    async fn create_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let mut state = self.network.state.lock();
        let endpoint = state.endpoint_mut(self.id)?;
        if endpoint.connection == ConnectionState::Closed {
            return Err(Error::transport("transport is closed"));
        }

        let id = endpoint.allocate_channel();
        endpoint.channels.insert(
            id,
            ChannelRecord {
                open: false,
                closed: false,
                label: label.to_string(),
                peer: None,
            },
        );

        Ok(Arc::new(MockChannel {
            id,
            label: label.to_string(),
            endpoint: self.id,
            network: Arc::downgrade(&self.network.state),
        }))
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        let mut state = self.network.state.lock();
        let endpoint = state.endpoint_mut(self.id)?;
        if endpoint.connection == ConnectionState::Closed {
            return Err(Error::transport("transport is closed"));
        }
        endpoint.tracks.push(track.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.network.state.lock();
        let endpoint = state.endpoint_mut(self.id)?;
        if endpoint.connection == ConnectionState::Closed {
            return Ok(());
        }

        endpoint.set_state(ConnectionState::Closed, NegotiationState::Closed);
        let peer = endpoint.remote.take();
        let channels: Vec<ChannelId> = endpoint.channels.keys().copied().collect();
        for channel in channels {
            state.close_channel(self.id, channel);
        }

        if let Some(peer) = peer {
            if let Some(remote) = state.endpoints.get_mut(&peer) {
                remote.remote = None;
                if remote.connection == ConnectionState::Connected {
                    let negotiation = remote.negotiation;
                    remote.set_state(ConnectionState::Disconnected, negotiation);
                }
            }
        }
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        let state = self.network.state.lock();
        state
            .endpoints
            .get(&self.id)
            .map_or(ConnectionState::Closed, |e| e.connection)
    }

    fn negotiation_state(&self) -> NegotiationState {
        let state = self.network.state.lock();
        state
            .endpoints
            .get(&self.id)
            .map_or(NegotiationState::Closed, |e| e.negotiation)
    }

    fn state_pair(&self) -> (ConnectionState, NegotiationState) {
        let state = self.network.state.lock();
        state
            .endpoints
            .get(&self.id)
            .map_or((ConnectionState::Closed, NegotiationState::Closed), |e| {
                (e.connection, e.negotiation)
            })
    }
}

/// Channel handle on a [`MockNetwork`]
#[derive(Debug)]
pub struct MockChannel {
    id: ChannelId,
    label: String,
    endpoint: EndpointId,
    network: Weak<Mutex<NetworkState>>,
}

#[async_trait]
impl DataChannel for MockChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        let Some(network) = self.network.upgrade() else {
            return false;
        };
        let state = network.lock();
        state
            .endpoints
            .get(&self.endpoint)
            .and_then(|e| e.channels.get(&self.id))
            .map_or(false, |c| c.open)
    }

    async fn send(&self, message: &ChannelMessage) -> Result<()> {
        if message.exceeds_max_size() {
            return Err(Error::transport(format!(
                "message of {} bytes exceeds the channel limit",
                message.size()
            )));
        }

        let network = self
            .network
            .upgrade()
            .ok_or_else(|| Error::transport("network is gone"))?;
        let state = network.lock();
        let record = state
            .endpoint(self.endpoint)?
            .channels
            .get(&self.id)
            .ok_or_else(|| Error::transport("unknown channel"))?;

        let (peer_endpoint, peer_channel) = match (record.open, record.peer) {
            (true, Some(peer)) => peer,
            _ => {
                return Err(Error::transport(format!(
                    "channel {} is not open",
                    self.label
                )))
            }
        };

        state
            .endpoint(peer_endpoint)?
            .events
            .emit(TransportNotification::ChannelMessage(
                peer_channel,
                message.clone(),
            ));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(network) = self.network.upgrade() {
            network.lock().close_channel(self.endpoint, self.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn endpoint(network: &MockNetwork) -> (Arc<dyn Transport>, UnboundedReceiver<TransportNotification>) {
        let (events, rx) = TransportEvents::channel();
        let transport = network.factory().create(events).await.unwrap();
        (transport, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<TransportNotification>) -> Vec<TransportNotification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn test_offer_commit_trickles_candidates() {
        let network = MockNetwork::new();
        let (a, mut rx) = endpoint(&network).await;
        a.create_channel("chat").await.unwrap();

        let offer = a
            .create_local_description(DescriptionKind::Offer)
            .await
            .unwrap();
        assert!(offer.sdp.contains("m=application"));
        assert_eq!(a.state_pair(), (ConnectionState::New, NegotiationState::Stable));

        a.commit_local_description(&offer).await.unwrap();
        assert_eq!(
            a.state_pair(),
            (ConnectionState::Negotiating, NegotiationState::HaveLocalOffer)
        );

        let candidates = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, TransportNotification::LocalCandidate(_)))
            .count();
        assert_eq!(candidates, 1);
    }

    #[tokio::test]
    async fn test_no_candidates_without_sections() {
        let network = MockNetwork::new();
        let (a, mut rx) = endpoint(&network).await;
        let offer = a
            .create_local_description(DescriptionKind::Offer)
            .await
            .unwrap();
        a.commit_local_description(&offer).await.unwrap();

        assert!(!drain(&mut rx)
            .iter()
            .any(|n| matches!(n, TransportNotification::LocalCandidate(_))));
    }

    #[tokio::test]
    async fn test_full_negotiation_connects_and_delivers_channel() {
        let network = MockNetwork::new();
        let (a, mut rx_a) = endpoint(&network).await;
        let (b, mut rx_b) = endpoint(&network).await;

        let channel = a.create_channel("chat").await.unwrap();
        let offer = a.create_local_description(DescriptionKind::Offer).await.unwrap();
        a.commit_local_description(&offer).await.unwrap();

        b.commit_remote_description(&offer).await.unwrap();
        assert_eq!(
            b.state_pair(),
            (ConnectionState::New, NegotiationState::HaveRemoteOffer)
        );
        let answer = b.create_local_description(DescriptionKind::Answer).await.unwrap();
        b.commit_local_description(&answer).await.unwrap();
        assert_eq!(
            b.state_pair(),
            (ConnectionState::Negotiating, NegotiationState::Stable)
        );

        a.commit_remote_description(&answer).await.unwrap();
        assert_eq!(a.connection_state(), ConnectionState::Connected);
        assert_eq!(b.connection_state(), ConnectionState::Connected);
        assert!(channel.is_open());

        drain(&mut rx_a);
        let inbound = drain(&mut rx_b)
            .into_iter()
            .find_map(|n| match n {
                TransportNotification::InboundChannel(ch) => Some(ch),
                _ => None,
            })
            .unwrap();
        assert_eq!(inbound.label(), "chat");

        channel.send(&ChannelMessage::text("hello")).await.unwrap();
        let received = drain(&mut rx_b);
        assert!(matches!(
            &received[..],
            [TransportNotification::ChannelMessage(id, ChannelMessage::Text(text))]
                if *id == inbound.id() && text == "hello"
        ));

        a.close().await.unwrap();
        assert_eq!(a.state_pair(), (ConnectionState::Closed, NegotiationState::Closed));
        assert_eq!(b.connection_state(), ConnectionState::Disconnected);
        assert!(drain(&mut rx_b)
            .iter()
            .any(|n| matches!(n, TransportNotification::ChannelClosed(id) if *id == inbound.id())));
    }

    #[tokio::test]
    async fn test_malformed_input_rejected() {
        let network = MockNetwork::new();
        let (a, _rx) = endpoint(&network).await;

        let err = a
            .commit_remote_description(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap_err();
        assert!(err.is_transport_error());

        let err = a
            .add_remote_candidate(&IceCandidate::new("candidate:1 1 udp 1 127.0.0.1 1 typ host"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no remote description"));

        let err = a
            .add_remote_candidate(&IceCandidate::new("garbage"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed candidate"));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let network = MockNetwork::new();
        let (a, _rx) = endpoint(&network).await;
        let channel = a.create_channel("chat").await.unwrap();
        assert!(!channel.is_open());
        assert!(channel.send(&ChannelMessage::text("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_transport_leaves_network() {
        let network = MockNetwork::new();
        let (a, _rx_a) = endpoint(&network).await;
        let (b, _rx_b) = endpoint(&network).await;
        assert_eq!(network.endpoints().len(), 2);

        a.close().await.unwrap();
        assert_eq!(
            network.state_of(0),
            Some((ConnectionState::Closed, NegotiationState::Closed))
        );

        drop(a);
        assert_eq!(network.endpoints(), vec![1]);
        assert_eq!(network.state_of(0), None);
        assert_eq!(b.state_pair(), (ConnectionState::New, NegotiationState::Stable));
    }

    #[test]
    fn test_endpoint_of() {
        let description = SessionDescription::offer("v=0\r\na=mock-endpoint:7\r\n");
        assert_eq!(MockNetwork::endpoint_of(&description), Some(7));
        assert_eq!(
            MockNetwork::endpoint_of(&SessionDescription::offer("v=0")),
            None
        );
    }
}
