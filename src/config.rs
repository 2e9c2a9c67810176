use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_PORT;
use crate::reconciler::DEFAULT_FAILURE_THRESHOLD;
use crate::types::ZoneIndex;
use crate::{Error, Result};

/// Connection and zone layout, handed over by the host after it has parsed
/// its own configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirzoneConfig {
    /// Controller IP or hostname.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_system_id")]
    pub system_id: u8,
    /// Number of zones; zones are addressed `1..=zones`.
    pub zones: u8,
    /// Zone whose power switch gates the whole system.
    pub master_zone: ZoneIndex,
    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Consecutive failed polls before the device is reported offline.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_system_id() -> u8 {
    1
}

fn default_poll_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

impl AirzoneConfig {
    pub fn new(host: impl Into<String>, zones: u8, master_zone: ZoneIndex) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            system_id: default_system_id(),
            zones,
            master_zone,
            poll_interval: default_poll_interval(),
            timeout: default_timeout(),
            failure_threshold: default_failure_threshold(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_system_id(mut self, system_id: u8) -> Self {
        self.system_id = system_id;
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval = secs;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host is empty".into()));
        }
        if self.zones == 0 {
            return Err(Error::InvalidConfig("at least one zone is required".into()));
        }
        if !(1..=self.zones).contains(&self.master_zone) {
            return Err(Error::InvalidConfig(format!(
                "master zone {} outside 1..={}",
                self.master_zone, self.zones
            )));
        }
        if self.poll_interval == 0 {
            return Err(Error::InvalidConfig("poll interval must be non-zero".into()));
        }
        if self.timeout == 0 {
            return Err(Error::InvalidConfig("timeout must be non-zero".into()));
        }
        if self.failure_threshold == 0 {
            return Err(Error::InvalidConfig("failure threshold must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_json() {
        let config: AirzoneConfig = serde_json::from_str(
            r#"{"host": "192.168.1.50", "zones": 3, "master_zone": 1}"#,
        )
        .unwrap();
        assert_eq!(config, AirzoneConfig::new("192.168.1.50", 3, 1));
        assert_eq!(config.port, 3000);
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.failure_threshold, 3);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_layouts() {
        assert!(AirzoneConfig::new("h", 0, 1).validate().is_err());
        assert!(AirzoneConfig::new("h", 3, 0).validate().is_err());
        assert!(AirzoneConfig::new("h", 3, 4).validate().is_err());
        assert!(AirzoneConfig::new("", 3, 1).validate().is_err());
        assert!(AirzoneConfig::new("h", 3, 1).with_timeout(0).validate().is_err());
        assert!(AirzoneConfig::new("h", 3, 1).with_poll_interval(0).validate().is_err());
    }
}
