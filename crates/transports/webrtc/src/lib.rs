//! WebRTC transport for peerpaste sessions
//!
//! Implements the [`peerpaste_core::Transport`] contract on top of a
//! webrtc-rs peer connection, plus the `peerpaste` binary that lets two
//! people connect by pasting exchange payloads to each other.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  peerpaste CLI (stdin commands, stdout payloads)       │
//! │  ↓                                                     │
//! │  peerpaste_core::Session                               │
//! │  ↓ Transport                 ↑ TransportNotification   │
//! │  WebRtcTransport                                       │
//! │  ├─ RTCPeerConnection (ICE, DTLS, SCTP, SRTP)          │
//! │  ├─ WebRtcChannel (RTCDataChannel per direction)       │
//! │  └─ TrackLocalStaticSample per attached track          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use peerpaste_core::Session;
//! use peerpaste_webrtc::{WebRtcTransportConfig, WebRtcTransportFactory};
//!
//! # async fn example() -> peerpaste_core::Result<()> {
//! let factory = WebRtcTransportFactory::new(WebRtcTransportConfig::local_only());
//! let session = Session::new(Arc::new(factory));
//!
//! session.initialize().await?;
//! session.create_outbound_channel("chat").await?;
//! session.create_offer().await?;
//! session.set_local_description().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod media;
pub mod transport;

pub use channel::WebRtcChannel;
pub use command::{Command, CommandError, ExportFormat};
pub use config::{DataChannelMode, TurnServerConfig, WebRtcTransportConfig};
pub use error::{Error, Result};
pub use transport::{WebRtcTransport, WebRtcTransportFactory};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
