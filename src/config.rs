//! # Typed device configuration.
//!
//! Configuration is loaded once at startup from persisted TOML and handed to
//! the composition root. Durability is the loader's concern: the alarm
//! settings are mutated in memory by inbound bus messages and are never
//! written back here.
//!
//! ## Field semantics
//! - `alarm.target_time` is stored verbatim, including malformed values.
//!   Validation happens at match time: a value that does not parse as
//!   `"hh:mm"` simply never matches, it does not error (see the alarm
//!   engine docs).
//! - `bus.prefix` scopes every topic this device touches. It normally ends
//!   with `/`.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Alarm settings, remotely modifiable over the bus.
///
/// Shared as [`SharedAlarmConfig`] between the alarm engine (reader) and the
/// bus callbacks (writers). Both run on the same logical thread; the mutex
/// exists for Rust aliasing and is never held across an await.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Whether the alarm triggers at all.
    pub enabled: bool,
    /// Target time of day, `"hh:mm"`. Stored verbatim, validated at match time.
    pub target_time: String,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_time: "07:00".to_string(),
        }
    }
}

/// Alarm settings behind the shared handle used across components.
pub type SharedAlarmConfig = Arc<Mutex<AlarmConfig>>;

/// Message-bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Whether the bus client runs at all. A disabled bus leaves the device
    /// fully functional but unreachable for remote configuration.
    pub enabled: bool,
    /// Device topic prefix, e.g. `"clock/bedroom/"`.
    pub prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "clock/".to_string(),
        }
    }
}

/// Top-level device configuration record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub alarm: AlarmConfig,
    pub bus: BusConfig,
}

impl DeviceConfig {
    /// Parses a configuration document from TOML text.
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}
