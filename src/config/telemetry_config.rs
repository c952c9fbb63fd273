use serde::{Deserialize, Serialize};

use crate::core::bluetooth::DEFAULT_EVENT_CAPACITY;
use crate::core::telemetry::ByteOrder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Byte order of float and integer temperature payloads.
    pub byte_order: ByteOrder,

    /// Events buffered per observer before the slowest one starts missing some.
    pub event_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            byte_order: ByteOrder::Little,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
