//! Session transport backed by a webrtc-rs peer connection

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use peerpaste_core::transport::{TransportEvents, TransportNotification};
use peerpaste_core::{
    ChannelId, ConnectionState, DataChannel, DescriptionKind, IceCandidate, MediaTrack,
    NegotiationState, SessionDescription, Transport, TransportFactory,
};

use crate::channel::WebRtcChannel;
use crate::config::WebRtcTransportConfig;
use crate::{media, Error, Result};

/// Creates one [`WebRtcTransport`] per session initialization
#[derive(Debug, Clone, Default)]
pub struct WebRtcTransportFactory {
    config: WebRtcTransportConfig,
}

impl WebRtcTransportFactory {
    pub fn new(config: WebRtcTransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebRtcTransportConfig {
        &self.config
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        events: TransportEvents,
    ) -> peerpaste_core::Result<Arc<dyn Transport>> {
        let transport = WebRtcTransport::new(&self.config, events).await?;
        Ok(Arc::new(transport))
    }
}

/// One peer connection, reporting contract states to the owning session
pub struct WebRtcTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    connection_id: String,
    peer_connection: Arc<RTCPeerConnection>,
    events: TransportEvents,
    config: WebRtcTransportConfig,
    next_channel: AtomicU64,
    local_committed: AtomicBool,
    closed: AtomicBool,
    /// Last pair handed to the session
    reported: Mutex<(ConnectionState, NegotiationState)>,
    /// Outgoing tracks stay alive until close
    local_tracks: Mutex<HashMap<String, Arc<TrackLocalStaticSample>>>,
}

impl WebRtcTransport {
    /// Create a peer connection with STUN/TURN servers from `config`
    #[instrument(skip(config, events))]
    pub async fn new(config: &WebRtcTransportConfig, events: TransportEvents) -> Result<Self> {
        config.validate()?;
        let connection_id = uuid::Uuid::new_v4().to_string();

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::webrtc("Failed to register codecs", e))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine)
                .map_err(|e| Error::webrtc("Failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::webrtc("Failed to create peer connection", e))?,
        );

        info!(%connection_id, "Created peer connection");

        let inner = Arc::new(TransportInner {
            connection_id,
            peer_connection,
            events,
            config: config.clone(),
            next_channel: AtomicU64::new(0),
            local_committed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            reported: Mutex::new((ConnectionState::New, NegotiationState::Stable)),
            local_tracks: Mutex::new(HashMap::new()),
        });
        TransportInner::install_handlers(&inner);

        Ok(Self { inner })
    }

    pub fn connection_id(&self) -> &str {
        &self.inner.connection_id
    }
}

fn ice_servers(config: &WebRtcTransportConfig) -> Vec<RTCIceServer> {
    config
        .stun_servers
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
            urls: vec![turn.url.clone()],
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        }))
        .collect()
}

/// Connection signal for a raw webrtc-rs state
///
/// `new` with a committed local description counts as negotiating, and a
/// closed peer connection we did not close ourselves means the peer went
/// away.
pub fn map_connection_state(
    state: RTCPeerConnectionState,
    signaling: RTCSignalingState,
    local_committed: bool,
    closed: bool,
) -> ConnectionState {
    if closed {
        return ConnectionState::Closed;
    }
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => match signaling {
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                ConnectionState::Negotiating
            }
            RTCSignalingState::Stable if local_committed => ConnectionState::Negotiating,
            _ => ConnectionState::New,
        },
        RTCPeerConnectionState::Connecting => ConnectionState::Negotiating,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected
        | RTCPeerConnectionState::Failed
        | RTCPeerConnectionState::Closed => ConnectionState::Disconnected,
    }
}

/// Negotiation signal for a raw webrtc-rs signaling state
pub fn map_negotiation_state(signaling: RTCSignalingState, closed: bool) -> NegotiationState {
    if closed {
        return NegotiationState::Closed;
    }
    match signaling {
        RTCSignalingState::Unspecified | RTCSignalingState::Stable => NegotiationState::Stable,
        RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
            NegotiationState::HaveLocalOffer
        }
        RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
            NegotiationState::HaveRemoteOffer
        }
        RTCSignalingState::Closed => NegotiationState::Closed,
    }
}

impl TransportInner {
    fn install_handlers(self: &Arc<Self>) {
        let pc = &self.peer_connection;

        let weak = Arc::downgrade(self);
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let weak = Weak::clone(&weak);
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    debug!(connection_id = %inner.connection_id, %state, "Peer connection state");
                    inner.report();
                }
            })
        }));

        let weak = Arc::downgrade(self);
        pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
            let weak = Weak::clone(&weak);
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    debug!(connection_id = %inner.connection_id, %state, "Signaling state");
                    inner.report();
                }
            })
        }));

        let events = self.events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("Candidate gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => events.emit(TransportNotification::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    })),
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        let weak = Arc::downgrade(self);
        pc.on_data_channel(Box::new(move |rtc_channel: Arc<RTCDataChannel>| {
            let weak = Weak::clone(&weak);
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    let id = inner.allocate_channel_id();
                    info!(channel = %id, label = rtc_channel.label(), "Inbound data channel");
                    WebRtcChannel::wire_inbound(id, rtc_channel, &inner.events);
                }
            })
        }));

        let events = self.events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = events.clone();
            Box::pin(async move {
                match media::remote_track(&track) {
                    Some(track) => {
                        info!(track_id = track.id(), kind = %track.kind(), "Inbound track");
                        events.emit(TransportNotification::InboundTrack(track));
                    }
                    None => debug!("Ignoring track of unknown kind"),
                }
            })
        }));
    }

    fn allocate_channel_id(&self) -> ChannelId {
        ChannelId(self.next_channel.fetch_add(1, Ordering::SeqCst))
    }

    fn current(&self) -> (ConnectionState, NegotiationState) {
        let closed = self.closed.load(Ordering::SeqCst);
        let signaling = self.peer_connection.signaling_state();
        (
            map_connection_state(
                self.peer_connection.connection_state(),
                signaling,
                self.local_committed.load(Ordering::SeqCst),
                closed,
            ),
            map_negotiation_state(signaling, closed),
        )
    }

    /// Notify the session of whichever signals changed since the last report
    fn report(&self) {
        let mut reported = self.reported.lock();
        let (connection, negotiation) = self.current();

        if reported.0 != connection {
            reported.0 = connection;
            self.events
                .emit(TransportNotification::ConnectionStateChanged(connection));
        }
        if reported.1 != negotiation {
            reported.1 = negotiation;
            self.events
                .emit(TransportNotification::NegotiationStateChanged(negotiation));
        }
    }

    fn to_rtc(description: &SessionDescription) -> Result<RTCSessionDescription> {
        let sdp = description.sdp.clone();
        let parsed = match description.kind {
            DescriptionKind::Offer => RTCSessionDescription::offer(sdp),
            DescriptionKind::Answer => RTCSessionDescription::answer(sdp),
        };
        parsed.map_err(|e| Error::webrtc("Malformed session description", e))
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn create_local_description(
        &self,
        kind: DescriptionKind,
    ) -> peerpaste_core::Result<SessionDescription> {
        let pc = &self.inner.peer_connection;
        let description = match kind {
            DescriptionKind::Offer => pc
                .create_offer(None)
                .await
                .map_err(|e| Error::webrtc("Failed to create offer", e))?,
            DescriptionKind::Answer => pc
                .create_answer(None)
                .await
                .map_err(|e| Error::webrtc("Failed to create answer", e))?,
        };
        Ok(SessionDescription {
            kind,
            sdp: description.sdp,
        })
    }

    async fn commit_local_description(
        &self,
        description: &SessionDescription,
    ) -> peerpaste_core::Result<()> {
        let rtc = TransportInner::to_rtc(description)?;
        self.inner
            .peer_connection
            .set_local_description(rtc)
            .await
            .map_err(|e| Error::webrtc("Failed to set local description", e))?;
        self.inner.local_committed.store(true, Ordering::SeqCst);
        self.inner.report();
        Ok(())
    }

    async fn commit_remote_description(
        &self,
        description: &SessionDescription,
    ) -> peerpaste_core::Result<()> {
        let rtc = TransportInner::to_rtc(description)?;
        self.inner
            .peer_connection
            .set_remote_description(rtc)
            .await
            .map_err(|e| Error::webrtc("Failed to set remote description", e))?;
        self.inner.report();
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> peerpaste_core::Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment.clone(),
        };
        self.inner
            .peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::webrtc("Failed to add candidate", e))?;
        Ok(())
    }

    async fn create_channel(&self, label: &str) -> peerpaste_core::Result<Arc<dyn DataChannel>> {
        let mode = self.inner.config.data_channel_mode;
        let init = RTCDataChannelInit {
            ordered: Some(mode.ordered()),
            max_retransmits: mode.max_retransmits(),
            ..Default::default()
        };
        let rtc_channel = self
            .inner
            .peer_connection
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| Error::webrtc("Failed to create data channel", e))?;

        let id = self.inner.allocate_channel_id();
        debug!(channel = %id, label, ?mode, "Created data channel");
        Ok(WebRtcChannel::wire(id, rtc_channel, &self.inner.events))
    }

    async fn add_track(&self, track: &MediaTrack) -> peerpaste_core::Result<()> {
        let local = media::local_track(track);
        let sender = self
            .inner
            .peer_connection
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::webrtc("Failed to add track", e))?;

        // Drain RTCP so interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        self.inner
            .local_tracks
            .lock()
            .insert(track.id().to_owned(), local);
        debug!(track_id = track.id(), kind = %track.kind(), "Added local track");
        Ok(())
    }

    async fn close(&self) -> peerpaste_core::Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(connection_id = %self.inner.connection_id, "Closing peer connection");
        self.inner.local_tracks.lock().clear();
        let result = self
            .inner
            .peer_connection
            .close()
            .await
            .map_err(|e| Error::webrtc("Failed to close peer connection", e));
        self.inner.report();
        result?;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner.current().0
    }

    fn negotiation_state(&self) -> NegotiationState {
        self.inner.current().1
    }

    fn state_pair(&self) -> (ConnectionState, NegotiationState) {
        self.inner.current()
    }
}

impl Drop for WebRtcTransport {
    fn drop(&mut self) {
        if !self.inner.closed.load(Ordering::SeqCst) {
            let pc = Arc::clone(&self.inner.peer_connection);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = pc.close().await;
                });
            }
        }
    }
}
