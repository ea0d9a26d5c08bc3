//! WebRTC data channel wrapper

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

use peerpaste_core::transport::{TransportEvents, TransportNotification};
use peerpaste_core::{ChannelId, ChannelMessage, DataChannel};

use crate::Error;

/// A data channel in either direction, backed by an `RTCDataChannel`
pub struct WebRtcChannel {
    id: ChannelId,
    label: String,
    rtc_channel: Arc<RTCDataChannel>,
}

impl WebRtcChannel {
    /// Wrap a channel this side created and forward its open, close and
    /// message callbacks to `events`
    pub(crate) fn wire(
        id: ChannelId,
        rtc_channel: Arc<RTCDataChannel>,
        events: &TransportEvents,
    ) -> Arc<Self> {
        let channel = Self::new(id, rtc_channel);
        channel.forward(events);
        channel
    }

    /// Wrap a channel the peer opened; the session learns about it before
    /// any of its callbacks fire
    pub(crate) fn wire_inbound(
        id: ChannelId,
        rtc_channel: Arc<RTCDataChannel>,
        events: &TransportEvents,
    ) {
        let channel = Self::new(id, rtc_channel);
        events.emit(TransportNotification::InboundChannel(
            Arc::clone(&channel) as Arc<dyn DataChannel>
        ));
        channel.forward(events);
    }

    fn new(id: ChannelId, rtc_channel: Arc<RTCDataChannel>) -> Arc<Self> {
        Arc::new(Self {
            id,
            label: rtc_channel.label().to_string(),
            rtc_channel,
        })
    }

    fn forward(&self, events: &TransportEvents) {
        let id = self.id;
        let label = self.label.clone();
        let rtc_channel = &self.rtc_channel;

        let on_open = events.clone();
        let open_label = label.clone();
        rtc_channel.on_open(Box::new(move || {
            let events = on_open.clone();
            let label = open_label.clone();
            Box::pin(async move {
                debug!(channel = %id, %label, "Data channel open");
                events.emit(TransportNotification::ChannelOpened(id));
            })
        }));

        let on_close = events.clone();
        let close_label = label.clone();
        rtc_channel.on_close(Box::new(move || {
            let events = on_close.clone();
            let label = close_label.clone();
            Box::pin(async move {
                debug!(channel = %id, %label, "Data channel closed");
                events.emit(TransportNotification::ChannelClosed(id));
            })
        }));

        let on_message = events.clone();
        rtc_channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let events = on_message.clone();
            Box::pin(async move {
                let message = if msg.is_string {
                    match String::from_utf8(msg.data.to_vec()) {
                        Ok(text) => ChannelMessage::Text(text),
                        Err(e) => {
                            warn!(channel = %id, "Dropping text frame with invalid UTF-8: {}", e);
                            return;
                        }
                    }
                } else {
                    ChannelMessage::Binary(msg.data)
                };
                events.emit(TransportNotification::ChannelMessage(id, message));
            })
        }));

        rtc_channel.on_error(Box::new(move |err| {
            let label = label.clone();
            Box::pin(async move {
                warn!(channel = %id, %label, "Data channel error: {}", err);
            })
        }));
    }
}

impl fmt::Debug for WebRtcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcChannel")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.rtc_channel.ready_state())
            .finish()
    }
}

#[async_trait]
impl DataChannel for WebRtcChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.rtc_channel.ready_state() == RTCDataChannelState::Open
    }

    async fn send(&self, message: &ChannelMessage) -> peerpaste_core::Result<()> {
        let sent = match message {
            ChannelMessage::Text(text) => self.rtc_channel.send_text(text.clone()).await,
            ChannelMessage::Binary(data) => self.rtc_channel.send(data).await,
        }
        .map_err(|e| Error::webrtc("Failed to send message", e))?;

        debug!(channel = %self.id, bytes = sent, "Sent message");
        Ok(())
    }

    async fn close(&self) -> peerpaste_core::Result<()> {
        match self.rtc_channel.ready_state() {
            RTCDataChannelState::Closing | RTCDataChannelState::Closed => Ok(()),
            _ => self
                .rtc_channel
                .close()
                .await
                .map_err(|e| Error::webrtc("Failed to close data channel", e).into()),
        }
    }
}
