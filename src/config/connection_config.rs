use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::bluetooth::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DISCONNECT_GRACE_MS, UUID_HEALTH_THERMOMETER_SERVICE,
    UUID_TEMPERATURE_MEASUREMENT, short_uuid,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Budget for connecting, discovering services and subscribing.
    pub connect_timeout_ms: u64,

    /// Longest wait for unsubscribe/disconnect when a session ends.
    pub disconnect_grace_ms: u64,

    /// Case-insensitive fragment of the telemetry service identifier.
    pub service_match: String,

    /// Case-insensitive fragment of the telemetry characteristic identifier.
    pub characteristic_match: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            disconnect_grace_ms: DEFAULT_DISCONNECT_GRACE_MS,
            service_match: short_uuid(UUID_HEALTH_THERMOMETER_SERVICE),
            characteristic_match: short_uuid(UUID_TEMPERATURE_MEASUREMENT),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}
