//! Transport notification pump

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{Shared, SessionInner};
use crate::events::{ChannelDirection, EventKind, Initiator, SessionEvent, TrackInfo};
use crate::state::{derive_phase, ConnectionState, Phase};
use crate::transport::{ChannelId, TransportNotification};

/// Consume notifications for one transport until it goes away or the
/// session moves to a newer epoch
pub(super) async fn run(
    shared: Arc<Shared>,
    mut notifications: mpsc::UnboundedReceiver<TransportNotification>,
    epoch: u64,
) {
    while let Some(notification) = notifications.recv().await {
        let mut inner = shared.inner.lock().await;
        if inner.epoch != epoch {
            debug!(session_id = %shared.id, "Dropping notification from a discarded transport");
            break;
        }
        handle(&shared, &mut inner, notification).await;
    }
    debug!(session_id = %shared.id, epoch, "Notification pump stopped");
}

async fn handle(shared: &Shared, inner: &mut SessionInner, notification: TransportNotification) {
    match notification {
        TransportNotification::LocalCandidate(candidate) => {
            inner.local_candidates.push(candidate.clone());
            shared.publish(SessionEvent::transport(EventKind::LocalCandidateGenerated(
                candidate,
            )));
        }

        TransportNotification::ConnectionStateChanged(state) => {
            info!(session_id = %shared.id, %state, "Connection state changed");
            shared.publish(SessionEvent::transport(EventKind::ConnectionStateChanged(
                state,
            )));

            if state == ConnectionState::Disconnected {
                if inner.closed_by.is_none() {
                    info!(session_id = %shared.id, "Remote peer closed the session");
                    shared.emit(EventKind::RemotePeerClosed);
                    if let Err(e) = shared.shutdown(inner, Initiator::Remote).await {
                        warn!(session_id = %shared.id, "Remote closure cleanup failed: {}", e);
                    }
                }
            } else {
                check_phase(shared, inner);
            }
        }

        TransportNotification::NegotiationStateChanged(state) => {
            debug!(session_id = %shared.id, %state, "Negotiation state changed");
            shared.publish(SessionEvent::transport(EventKind::NegotiationStateChanged(
                state,
            )));
            check_phase(shared, inner);
        }

        TransportNotification::InboundChannel(channel) => {
            debug!(session_id = %shared.id, label = channel.label(), "Inbound channel created");
            if let Some(previous) = inner.inbound.replace(channel) {
                let _ = shared
                    .close_channel(previous, ChannelDirection::Inbound)
                    .await;
            }
        }

        TransportNotification::ChannelOpened(id) => match find_channel(inner, id) {
            Some(info) => {
                info!(session_id = %shared.id, label = %info.label, "Channel opened");
                shared.publish(SessionEvent::transport(EventKind::ChannelOpened(info)));
            }
            None => debug!(session_id = %shared.id, channel = %id, "Open for unknown channel"),
        },

        TransportNotification::InboundTrack(track) => {
            let info = TrackInfo::from(&track);
            info!(session_id = %shared.id, track_id = %info.id, kind = %info.kind, "Remote track added");
            inner.remote_tracks.push(track);
            shared.publish(SessionEvent::transport(EventKind::RemoteTrackAdded(info)));
        }

        TransportNotification::ChannelMessage(id, message) => match find_channel(inner, id) {
            Some(channel) => {
                shared.publish(SessionEvent::transport(EventKind::MessageReceived {
                    channel,
                    message,
                }));
            }
            None => debug!(session_id = %shared.id, channel = %id, "Message on unknown channel"),
        },

        TransportNotification::ChannelClosed(id) => {
            let info = find_channel(inner, id);
            match info {
                Some(info) => {
                    match info.direction {
                        ChannelDirection::Outbound => inner.outbound = None,
                        ChannelDirection::Inbound => inner.inbound = None,
                    }
                    info!(session_id = %shared.id, label = %info.label, "Channel closed by transport");
                    shared.publish(SessionEvent::transport(EventKind::ChannelClosed(info)));
                }
                // Channels closed locally are already forgotten
                None => debug!(session_id = %shared.id, channel = %id, "Close for unknown channel"),
            }
        }
    }
}

fn find_channel(inner: &SessionInner, id: ChannelId) -> Option<crate::events::ChannelInfo> {
    inner
        .outbound_info()
        .filter(|c| c.id == id)
        .or_else(|| inner.inbound_info().filter(|c| c.id == id))
}

fn check_phase(shared: &Shared, inner: &SessionInner) {
    let Some(transport) = &inner.transport else {
        return;
    };
    let (connection, negotiation) = transport.state_pair();
    if derive_phase(connection, negotiation) == Phase::Invalid
        && connection != ConnectionState::Disconnected
    {
        error!(
            session_id = %shared.id,
            %connection,
            %negotiation,
            "Transport reported a state pair outside the phase table"
        );
    }
}
