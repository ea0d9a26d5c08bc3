//! Configuration types for the WebRTC transport

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Public STUN server used by the default configuration
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Default time `export` waits for trickled candidates
pub const DEFAULT_ICE_GATHERING_TIMEOUT_MS: u64 = 2000;

/// Upper bound for the candidate gathering wait
pub const MAX_ICE_GATHERING_TIMEOUT_MS: u64 = 60_000;

/// Main configuration for WebRtcTransport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcTransportConfig {
    /// STUN server URLs (may be empty for host-only candidates)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Data channel mode (default: Reliable)
    pub data_channel_mode: DataChannelMode,

    /// How long to wait for local candidates before exporting a payload
    /// (default: 2000ms, range: 0-60000ms)
    pub ice_gathering_timeout_ms: u64,
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Data channel mode
///
/// Determines the reliability of message delivery on channels this side
/// creates. Inbound channels use whatever the peer asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataChannelMode {
    /// Reliable, ordered delivery (default)
    #[default]
    Reliable,
    /// Unordered delivery without retransmits
    Unreliable,
}

impl DataChannelMode {
    /// Get the ordered setting for webrtc-rs
    pub fn ordered(&self) -> bool {
        match self {
            DataChannelMode::Reliable => true,
            DataChannelMode::Unreliable => false,
        }
    }

    /// Get the max retransmits setting for webrtc-rs
    pub fn max_retransmits(&self) -> Option<u16> {
        match self {
            DataChannelMode::Reliable => None,
            DataChannelMode::Unreliable => Some(0),
        }
    }
}

impl Default for WebRtcTransportConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            turn_servers: Vec::new(),
            data_channel_mode: DataChannelMode::Reliable,
            ice_gathering_timeout_ms: DEFAULT_ICE_GATHERING_TIMEOUT_MS,
        }
    }
}

impl WebRtcTransportConfig {
    /// Configuration without any ICE servers
    ///
    /// Only host candidates are gathered, which is enough for two peers on
    /// the same network.
    ///
    /// ```
    /// use peerpaste_webrtc::config::WebRtcTransportConfig;
    ///
    /// let config = WebRtcTransportConfig::local_only();
    /// assert!(config.stun_servers.is_empty());
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn local_only() -> Self {
        Self {
            stun_servers: Vec::new(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a STUN URL does not start with `stun:` or `stuns:`
    /// - a TURN URL does not start with `turn:` or `turns:`, or has an empty
    ///   username
    /// - `ice_gathering_timeout_ms` exceeds 60000
    pub fn validate(&self) -> Result<()> {
        for url in &self.stun_servers {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN server must start with stun: or stuns:, got {}",
                    url
                )));
            }
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
            if turn.username.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "TURN server {} needs a username",
                    turn.url
                )));
            }
        }

        if self.ice_gathering_timeout_ms > MAX_ICE_GATHERING_TIMEOUT_MS {
            return Err(Error::InvalidConfig(format!(
                "ice_gathering_timeout_ms must be in range 0-{}, got {}",
                MAX_ICE_GATHERING_TIMEOUT_MS, self.ice_gathering_timeout_ms
            )));
        }

        Ok(())
    }

    /// Replace the STUN servers
    pub fn with_stun_servers(mut self, servers: Vec<String>) -> Self {
        self.stun_servers = servers;
        self
    }

    /// Replace the TURN servers
    ///
    /// ```
    /// use peerpaste_webrtc::config::{TurnServerConfig, WebRtcTransportConfig};
    ///
    /// let config = WebRtcTransportConfig::default().with_turn_servers(vec![TurnServerConfig {
    ///     url: "turn:turn.example.com:3478".to_string(),
    ///     username: "user".to_string(),
    ///     credential: "pass".to_string(),
    /// }]);
    /// assert_eq!(config.turn_servers.len(), 1);
    /// ```
    pub fn with_turn_servers(mut self, servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = servers;
        self
    }

    pub fn with_data_channel_mode(mut self, mode: DataChannelMode) -> Self {
        self.data_channel_mode = mode;
        self
    }

    pub fn with_ice_gathering_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.ice_gathering_timeout_ms = timeout_ms;
        self
    }
}

/// Parse a TURN server string (`turn:host:port:username:password`)
///
/// The password may itself contain colons.
pub fn parse_turn_server(s: &str) -> Result<TurnServerConfig> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(Error::InvalidConfig(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        )));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(Error::InvalidConfig(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        )));
    }

    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, parts[1], parts[2]),
        username: parts[3].to_string(),
        credential: parts[4..].join(":"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = WebRtcTransportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stun_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert_eq!(config.data_channel_mode, DataChannelMode::Reliable);
    }

    #[test]
    fn test_invalid_stun_scheme() {
        let config =
            WebRtcTransportConfig::default().with_stun_servers(vec!["http://example.com".into()]);
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_turn_scheme() {
        let config = WebRtcTransportConfig::default().with_turn_servers(vec![TurnServerConfig {
            url: "stun:turn.example.com".into(),
            username: "user".into(),
            credential: "pass".into(),
        }]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gathering_timeout_range() {
        let config = WebRtcTransportConfig::default().with_ice_gathering_timeout_ms(60_001);
        assert!(config.validate().is_err());
        let config = WebRtcTransportConfig::default().with_ice_gathering_timeout_ms(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_data_channel_mode() {
        assert!(DataChannelMode::Reliable.ordered());
        assert_eq!(DataChannelMode::Reliable.max_retransmits(), None);
        assert!(!DataChannelMode::Unreliable.ordered());
        assert_eq!(DataChannelMode::Unreliable.max_retransmits(), Some(0));
    }

    #[test]
    fn test_parse_turn_server() {
        let turn = parse_turn_server("turns:relay.example.com:5349:alice:pa:ss").unwrap();
        assert_eq!(turn.url, "turns:relay.example.com:5349");
        assert_eq!(turn.username, "alice");
        assert_eq!(turn.credential, "pa:ss");

        assert!(parse_turn_server("turn:host:3478").is_err());
        assert!(parse_turn_server("stun:host:3478:user:pass").is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"stun_servers": [], "data_channel_mode": "unreliable"}}"#).unwrap();

        let config = WebRtcTransportConfig::from_file(file.path()).unwrap();
        assert!(config.stun_servers.is_empty());
        assert_eq!(config.data_channel_mode, DataChannelMode::Unreliable);
        assert_eq!(config.ice_gathering_timeout_ms, DEFAULT_ICE_GATHERING_TIMEOUT_MS);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"stun_servers": ["example.com"]}}"#).unwrap();
        assert!(WebRtcTransportConfig::from_file(file.path()).is_err());

        assert!(matches!(
            WebRtcTransportConfig::from_file("/nonexistent/peerpaste.json"),
            Err(Error::Io(_))
        ));
    }
}
