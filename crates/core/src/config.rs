//! Session configuration

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Label used for the outbound data channel when the caller does not pick one
pub const DEFAULT_CHANNEL_LABEL: &str = "the-one-and-only";

/// Default number of events kept in the session history
pub const DEFAULT_EVENT_HISTORY_CAPACITY: usize = 256;

/// Configuration for a [`Session`](crate::Session)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of events retained by the event history (at least 1)
    pub event_history_capacity: usize,

    /// Outbound channel label used by front ends when none is given
    pub default_channel_label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_history_capacity: DEFAULT_EVENT_HISTORY_CAPACITY,
            default_channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
        }
    }
}

impl SessionConfig {
    /// Set the event history capacity
    pub fn with_event_history_capacity(mut self, capacity: usize) -> Self {
        self.event_history_capacity = capacity;
        self
    }

    /// Set the default outbound channel label
    pub fn with_default_channel_label(mut self, label: impl Into<String>) -> Self {
        self.default_channel_label = label.into();
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.event_history_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_history_capacity must be at least 1".to_string(),
            ));
        }

        if self.default_channel_label.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "default_channel_label must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_channel_label, "the-one-and-only");
        assert_eq!(config.event_history_capacity, 256);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SessionConfig::default().with_event_history_capacity(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_blank_label_rejected() {
        let config = SessionConfig::default().with_default_channel_label("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"event_history_capacity": 8}"#).unwrap();
        assert_eq!(config.event_history_capacity, 8);
        assert_eq!(config.default_channel_label, DEFAULT_CHANNEL_LABEL);
    }
}
