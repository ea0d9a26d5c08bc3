//! Session facade
//!
//! A [`Session`] owns one transport at a time together with the local
//! negotiation artifacts, at most one outbound and one inbound channel, and
//! the local and remote media tracks. Every operation checks its predicate
//! on a fresh [`SessionSnapshot`] before touching the transport.
//!
//! Direct calls and transport notifications are serialized through a single
//! async mutex. Notifications are consumed by a pump task spawned at
//! `initialize`; it updates the accumulated state first and publishes the
//! corresponding [`SessionEvent`] afterwards, while still holding the lock,
//! so observers see events in the order the state changed.

mod notifications;

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::events::{
    ChannelDirection, ChannelInfo, EventBus, EventKind, EventLog, Initiator, ObserverSet,
    SessionEvent, TrackInfo, TrackSource,
};
use crate::exchange::{DescriptionKind, ExchangePayload, IceCandidate, SessionDescription};
use crate::state::{derive_phase, Affordances, ConnectionState, Operation, Phase, SessionSnapshot};
use crate::transport::{
    ChannelMessage, DataChannel, MediaTrack, Transport, TransportEvents, TransportFactory,
};
use crate::{Error, Result};

/// Manually-signalled peer-to-peer session
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    factory: Arc<dyn TransportFactory>,
    shared: Arc<Shared>,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// State reachable from both the facade and the notification pump
struct Shared {
    id: Uuid,
    inner: Mutex<SessionInner>,
    bus: EventBus,
    history: EventLog,
}

#[derive(Default)]
struct SessionInner {
    /// Bumped on every `initialize`/`clear`; a pump from an older round exits
    epoch: u64,
    transport: Option<Arc<dyn Transport>>,
    local_description: Option<SessionDescription>,
    local_description_committed: bool,
    local_candidates: Vec<IceCandidate>,
    remote_candidates_applied: bool,
    outbound: Option<Arc<dyn DataChannel>>,
    inbound: Option<Arc<dyn DataChannel>>,
    local_tracks: Vec<MediaTrack>,
    remote_tracks: Vec<MediaTrack>,
    closed_by: Option<Initiator>,
}

fn channel_info(channel: &dyn DataChannel, direction: ChannelDirection) -> ChannelInfo {
    ChannelInfo {
        id: channel.id(),
        label: channel.label().to_string(),
        direction,
    }
}

impl SessionInner {
    fn phase(&self) -> Option<Phase> {
        self.transport.as_ref().map(|t| {
            let (connection, negotiation) = t.state_pair();
            derive_phase(connection, negotiation)
        })
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            has_local_description: self.local_description.is_some(),
            local_description_committed: self.local_description_committed,
            remote_candidates_applied: self.remote_candidates_applied,
            outbound_channel_open: self.outbound.as_ref().map_or(false, |c| c.is_open()),
            has_outbound_channel: self.outbound.is_some(),
            has_inbound_channel: self.inbound.is_some(),
            local_track_count: self.local_tracks.len(),
            remote_track_count: self.remote_tracks.len(),
            local_candidate_count: self.local_candidates.len(),
        }
    }

    /// Check `operation` against the current state and hand out the transport
    fn guard(&self, operation: Operation) -> Result<Arc<dyn Transport>> {
        let transport = self.transport.clone().ok_or(Error::NotInitialized)?;

        let (connection, negotiation) = transport.state_pair();
        let phase = derive_phase(connection, negotiation);
        if phase == Phase::Invalid && connection != ConnectionState::Disconnected {
            error!(
                %connection,
                %negotiation,
                %operation,
                "Transport reported a state pair outside the phase table"
            );
            return Err(Error::InvalidState {
                connection,
                negotiation,
            });
        }

        if !self.snapshot().allows(operation) {
            return Err(Error::illegal(operation, Some(phase)));
        }
        Ok(transport)
    }

    fn outbound_info(&self) -> Option<ChannelInfo> {
        self.outbound
            .as_deref()
            .map(|c| channel_info(c, ChannelDirection::Outbound))
    }

    fn inbound_info(&self) -> Option<ChannelInfo> {
        self.inbound
            .as_deref()
            .map(|c| channel_info(c, ChannelDirection::Inbound))
    }
}

impl Shared {
    /// Record and publish an event
    fn publish(&self, event: SessionEvent) {
        debug!(session_id = %self.id, event = %event.kind, "Publishing event");
        self.history.record(event.clone());
        self.bus.publish(&event);
    }

    fn emit(&self, kind: EventKind) {
        self.publish(SessionEvent::synthetic(kind));
    }

    async fn close_channel(
        &self,
        channel: Arc<dyn DataChannel>,
        direction: ChannelDirection,
    ) -> Result<()> {
        let info = channel_info(channel.as_ref(), direction);
        let result = channel.close().await;
        if let Err(e) = &result {
            warn!(session_id = %self.id, channel = %info.label, "Channel close failed: {}", e);
        }
        self.emit(EventKind::ChannelClosed(info));
        result
    }

    fn end_tracks(&self, tracks: Vec<MediaTrack>, source: TrackSource) {
        for track in tracks {
            track.stop();
            self.emit(EventKind::TrackEnded {
                track: TrackInfo::from(&track),
                source,
            });
        }
    }

    /// Shared closure path for local and remote initiation; runs once per
    /// transport
    async fn shutdown(&self, inner: &mut SessionInner, initiator: Initiator) -> Result<()> {
        if let Some(previous) = inner.closed_by {
            debug!(session_id = %self.id, ?previous, "Session already closed");
            return Ok(());
        }
        inner.closed_by = Some(initiator);
        info!(session_id = %self.id, ?initiator, "Closing session");

        if let Some(channel) = inner.outbound.take() {
            let _ = self.close_channel(channel, ChannelDirection::Outbound).await;
        }
        if let Some(channel) = inner.inbound.take() {
            let _ = self.close_channel(channel, ChannelDirection::Inbound).await;
        }

        self.end_tracks(std::mem::take(&mut inner.local_tracks), TrackSource::Local);
        self.end_tracks(std::mem::take(&mut inner.remote_tracks), TrackSource::Remote);

        let result = match &inner.transport {
            Some(transport) => transport.close().await,
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!(session_id = %self.id, "Transport close failed: {}", e);
        }

        self.emit(EventKind::ConnectionClosed { initiator });
        result
    }
}

impl Session {
    /// Create an idle session over `factory`
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self::with_config(factory, SessionConfig::default())
    }

    /// Create an idle session with explicit configuration
    ///
    /// An invalid configuration is replaced by the default one; use
    /// [`Session::try_with_config`] to reject it instead.
    pub fn with_config(factory: Arc<dyn TransportFactory>, config: SessionConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Falling back to default session configuration: {}", e);
                SessionConfig::default()
            }
        };
        Self::build(factory, config)
    }

    /// Create an idle session, failing on invalid configuration
    pub fn try_with_config(
        factory: Arc<dyn TransportFactory>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(factory, config))
    }

    fn build(factory: Arc<dyn TransportFactory>, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        let shared = Arc::new(Shared {
            id,
            inner: Mutex::new(SessionInner::default()),
            bus: EventBus::new(),
            history: EventLog::new(config.event_history_capacity),
        });

        Self {
            id,
            config,
            factory,
            shared,
            pump: parking_lot::Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create the transport and start consuming its notifications
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn initialize(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.transport.is_some() {
            return Err(Error::illegal(Operation::Initialize, inner.phase()));
        }

        let (events, notifications) = TransportEvents::channel();
        let transport = self.factory.create(events).await?;

        inner.epoch += 1;
        inner.transport = Some(transport);
        let handle = tokio::spawn(notifications::run(
            Arc::clone(&self.shared),
            notifications,
            inner.epoch,
        ));
        if let Some(previous) = self.pump.lock().replace(handle) {
            previous.abort();
        }

        info!("Session initialized");
        self.shared.emit(EventKind::Initialized);
        Ok(())
    }

    /// Open the outbound data channel, closing any previous one
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn create_outbound_channel(&self, label: &str) -> Result<ChannelInfo> {
        let mut inner = self.shared.inner.lock().await;
        let transport = inner.guard(Operation::CreateChannel)?;

        if let Some(previous) = inner.outbound.take() {
            debug!(label = previous.label(), "Replacing outbound channel");
            let _ = self
                .shared
                .close_channel(previous, ChannelDirection::Outbound)
                .await;
        }

        let channel = transport.create_channel(label).await?;
        let info = channel_info(channel.as_ref(), ChannelDirection::Outbound);
        inner.outbound = Some(channel);
        info!(channel = %info.id, "Outbound channel created");
        Ok(info)
    }

    /// Add a local media track to the negotiation
    ///
    /// A track is attached at most once; stopped tracks cannot be attached.
    #[instrument(skip(self, track), fields(session_id = %self.id, track_id = track.id()))]
    pub async fn attach_local_track(&self, track: MediaTrack) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let transport = inner.guard(Operation::AttachTrack)?;
        if track.is_ended() || inner.local_tracks.iter().any(|t| t.id() == track.id()) {
            warn!("Track is stopped or already attached");
            return Err(Error::illegal(Operation::AttachTrack, inner.phase()));
        }

        transport.add_track(&track).await?;
        let info = TrackInfo::from(&track);
        inner.local_tracks.push(track);
        self.shared.emit(EventKind::LocalTrackAdded(info));
        Ok(())
    }

    /// Stop and forget every local track; returns how many were stopped
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn detach_local_tracks(&self) -> Result<usize> {
        let mut inner = self.shared.inner.lock().await;
        if inner.local_tracks.is_empty() {
            return Err(Error::illegal(Operation::DetachTracks, inner.phase()));
        }

        let tracks = std::mem::take(&mut inner.local_tracks);
        let count = tracks.len();
        self.shared.end_tracks(tracks, TrackSource::Local);
        Ok(count)
    }

    /// Stop and forget every remote track; returns how many were stopped
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn stop_remote_tracks(&self) -> Result<usize> {
        let mut inner = self.shared.inner.lock().await;
        if inner.remote_tracks.is_empty() {
            return Err(Error::illegal(Operation::StopRemoteTracks, inner.phase()));
        }

        let tracks = std::mem::take(&mut inner.remote_tracks);
        let count = tracks.len();
        self.shared.end_tracks(tracks, TrackSource::Remote);
        Ok(count)
    }

    /// Generate a local offer without applying it
    ///
    /// Calling again before [`Session::set_local_description`] replaces the
    /// pending offer.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn create_offer(&self) -> Result<SessionDescription> {
        self.create_description(DescriptionKind::Offer).await
    }

    /// Generate a local answer to the applied remote offer
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn create_answer(&self) -> Result<SessionDescription> {
        self.create_description(DescriptionKind::Answer).await
    }

    async fn create_description(&self, kind: DescriptionKind) -> Result<SessionDescription> {
        let operation = match kind {
            DescriptionKind::Offer => Operation::CreateOffer,
            DescriptionKind::Answer => Operation::CreateAnswer,
        };
        let mut inner = self.shared.inner.lock().await;
        let transport = inner.guard(operation)?;

        let description = transport.create_local_description(kind).await?;
        inner.local_description = Some(description.clone());
        inner.local_description_committed = false;

        info!(%kind, "Local description created");
        self.shared.emit(match kind {
            DescriptionKind::Offer => EventKind::OfferCreated(description.clone()),
            DescriptionKind::Answer => EventKind::AnswerCreated(description.clone()),
        });
        Ok(description)
    }

    /// Commit the generated description; starts local candidate gathering
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn set_local_description(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let transport = inner.guard(Operation::SetLocalDescription)?;
        let description = inner
            .local_description
            .clone()
            .ok_or_else(|| Error::illegal(Operation::SetLocalDescription, inner.phase()))?;

        transport.commit_local_description(&description).await?;
        inner.local_description_committed = true;

        info!(kind = %description.kind, "Local description set");
        self.shared
            .emit(EventKind::LocalDescriptionSet(description.kind));
        Ok(())
    }

    /// Hand the peer's description to the transport
    #[instrument(skip(self, description), fields(session_id = %self.id, kind = %description.kind))]
    pub async fn apply_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let inner = self.shared.inner.lock().await;
        let transport = inner.guard(Operation::ApplyRemoteDescription)?;

        transport.commit_remote_description(description).await?;

        info!("Remote description applied");
        self.shared
            .emit(EventKind::RemoteDescriptionApplied(description.kind));
        Ok(())
    }

    /// Apply the peer's candidates in order
    ///
    /// The first rejected candidate aborts the batch; candidates applied
    /// before it stay applied and the batch is not marked as applied, so a
    /// corrected batch may be supplied.
    #[instrument(skip(self, candidates), fields(session_id = %self.id, count = candidates.len()))]
    pub async fn apply_remote_candidates(&self, candidates: &[IceCandidate]) -> Result<usize> {
        let mut inner = self.shared.inner.lock().await;
        let transport = inner.guard(Operation::ApplyRemoteCandidates)?;

        for (index, candidate) in candidates.iter().enumerate() {
            if let Err(e) = transport.add_remote_candidate(candidate).await {
                warn!(index, applied = index, "Remote candidate rejected: {}", e);
                return Err(e);
            }
        }
        inner.remote_candidates_applied = true;

        info!("Remote candidates applied");
        self.shared.emit(EventKind::RemoteCandidatesApplied {
            count: candidates.len(),
        });
        Ok(candidates.len())
    }

    /// Send over the open outbound channel
    #[instrument(skip(self, message), fields(session_id = %self.id))]
    pub async fn send_message(&self, message: impl Into<ChannelMessage>) -> Result<()> {
        let message = message.into();
        let inner = self.shared.inner.lock().await;

        let channel = match &inner.outbound {
            Some(channel) if channel.is_open() => Arc::clone(channel),
            Some(channel) => {
                return Err(Error::ChannelUnavailable(format!(
                    "outbound channel {} is not open",
                    channel.label()
                )))
            }
            None => {
                return Err(Error::ChannelUnavailable(
                    "no outbound channel".to_string(),
                ))
            }
        };
        match inner.phase() {
            Some(Phase::Connected) => {}
            Some(phase) => {
                return Err(Error::ChannelUnavailable(format!(
                    "session is {}, not connected",
                    phase
                )))
            }
            None => return Err(Error::ChannelUnavailable("no transport".to_string())),
        }
        if message.exceeds_max_size() {
            return Err(Error::TransportFailure(format!(
                "message of {} bytes exceeds the channel limit",
                message.size()
            )));
        }

        channel.send(&message).await?;
        debug!(bytes = message.size(), "Message sent");
        self.shared.emit(EventKind::MessageSent(message));
        Ok(())
    }

    /// Close and forget the outbound channel
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn close_outbound_channel(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let channel = match inner.outbound.take() {
            Some(channel) => channel,
            None => return Err(Error::illegal(Operation::CloseChannel, inner.phase())),
        };
        self.shared
            .close_channel(channel, ChannelDirection::Outbound)
            .await
    }

    /// Close and forget the inbound channel
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn close_inbound_channel(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let channel = match inner.inbound.take() {
            Some(channel) => channel,
            None => return Err(Error::illegal(Operation::CloseChannel, inner.phase())),
        };
        self.shared
            .close_channel(channel, ChannelDirection::Inbound)
            .await
    }

    /// Close channels, stop tracks and close the transport
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn close_connection(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.guard(Operation::CloseConnection)?;
        self.shared.shutdown(&mut inner, Initiator::Local).await
    }

    /// Discard the transport and every accumulated artifact
    ///
    /// Observers are detached and the event history is emptied.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.guard(Operation::Clear)?;

        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        let epoch = inner.epoch + 1;
        *inner = SessionInner {
            epoch,
            ..SessionInner::default()
        };
        self.shared.bus.clear();
        self.shared.history.clear();

        info!("Session cleared");
        Ok(())
    }

    /// Current phase, `None` before `initialize`
    pub async fn phase(&self) -> Option<Phase> {
        self.shared.inner.lock().await.phase()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.shared.inner.lock().await.snapshot()
    }

    /// Every predicate evaluated on the current state
    pub async fn affordances(&self) -> Affordances {
        self.snapshot().await.affordances()
    }

    pub async fn is_initialized(&self) -> bool {
        self.shared.inner.lock().await.transport.is_some()
    }

    pub async fn local_description(&self) -> Option<SessionDescription> {
        self.shared.inner.lock().await.local_description.clone()
    }

    /// Locally gathered candidates, in generation order
    pub async fn local_candidates(&self) -> Vec<IceCandidate> {
        self.shared.inner.lock().await.local_candidates.clone()
    }

    /// Local description plus candidates, ready to hand to the peer
    pub async fn exchange_payload(&self) -> Option<ExchangePayload> {
        let inner = self.shared.inner.lock().await;
        inner
            .local_description
            .clone()
            .map(|d| ExchangePayload::new(d, inner.local_candidates.clone()))
    }

    pub async fn outbound_channel(&self) -> Option<ChannelInfo> {
        self.shared.inner.lock().await.outbound_info()
    }

    pub async fn inbound_channel(&self) -> Option<ChannelInfo> {
        self.shared.inner.lock().await.inbound_info()
    }

    pub async fn local_tracks(&self) -> Vec<TrackInfo> {
        let inner = self.shared.inner.lock().await;
        inner.local_tracks.iter().map(TrackInfo::from).collect()
    }

    pub async fn remote_tracks(&self) -> Vec<TrackInfo> {
        let inner = self.shared.inner.lock().await;
        inner.remote_tracks.iter().map(TrackInfo::from).collect()
    }

    /// Which side closed the connection, once closed
    pub async fn closed_by(&self) -> Option<Initiator> {
        self.shared.inner.lock().await.closed_by
    }

    /// Published events, newest first
    pub fn event_history(&self) -> Vec<SessionEvent> {
        self.shared.history.snapshot()
    }

    /// Atomically replace the observer set
    pub fn set_observers(&self, observers: ObserverSet) {
        self.shared.bus.replace(observers);
    }

    /// Install a channel observer and return its receiving end
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<SessionEvent> {
        let (observers, rx) = ObserverSet::channel();
        self.set_observers(observers);
        rx
    }

    pub fn clear_observers(&self) {
        self.shared.bus.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
