//! Coordinator Configuration
//!
//! Tunables for turn cadence, message sizing and timeout arbitration.
//! Loadable from JSON; every field has a default. Sizes are checked on
//! load against the 16-bit length fields they end up in.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::header::MAX_PACKET_SIZE;

/// Configuration rejected on load.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Not valid JSON for this structure.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A size does not fit the wire's 16-bit length fields.
    #[error("{field} = {value} exceeds {MAX_PACKET_SIZE}")]
    SizeTooLarge {
        /// Offending field.
        field: &'static str,
        /// Configured value.
        value: usize,
    },
}

/// Configuration for one coordinator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Ticks between turn sends; turns are collected every `4 ×` this.
    pub net_update_rate: u32,
    /// Turns kept in flight ahead of the simulation.
    pub turns_in_transit: u32,
    /// Size budget of one batched packet (header included).
    pub normal_msg_size: usize,
    /// Upper bound of any packet (header included).
    pub largest_msg_size: usize,
    /// Length of a serialized player record.
    pub record_size: usize,
    /// Continuous stall before the arbiter acts (ms).
    pub timeout_grace_ms: u64,
    /// Continuous stall after which the session is abandoned (ms).
    pub timeout_give_up_ms: u64,
    /// Sub-command id announcing a player record.
    pub announce_cmd: u8,
    /// Sub-command id acknowledging with a player record.
    pub ack_cmd: u8,
    /// Sub-command id carrying delta export data.
    pub delta_cmd: u8,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            net_update_rate: 1,
            turns_in_transit: 1,
            normal_msg_size: 512,
            largest_msg_size: 512,
            record_size: 1024,
            timeout_grace_ms: 10_000,
            timeout_give_up_ms: 20_000,
            announce_cmd: 0x36,
            ack_cmd: 0x37,
            delta_cmd: 0x38,
        }
    }
}

impl CoordinatorConfig {
    /// Parse from a JSON string; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that packet and record sizes fit a u16 length field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("normal_msg_size", self.normal_msg_size),
            ("largest_msg_size", self.largest_msg_size),
            ("record_size", self.record_size),
        ] {
            if value > MAX_PACKET_SIZE {
                return Err(ConfigError::SizeTooLarge { field, value });
            }
        }
        Ok(())
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::from_json_str(&text)?)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Grace period before arbitration.
    pub fn timeout_grace(&self) -> Duration {
        Duration::from_millis(self.timeout_grace_ms)
    }

    /// Stall length after which the session is given up.
    pub fn timeout_give_up(&self) -> Duration {
        Duration::from_millis(self.timeout_give_up_ms)
    }

    /// Whether `cmd` carries a chunk of a player record.
    pub fn is_record_cmd(&self, cmd: u8) -> bool {
        cmd == self.announce_cmd || cmd == self.ack_cmd
    }
}
