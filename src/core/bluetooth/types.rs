//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::UNNAMED_DEVICE;
use crate::core::telemetry::{DecodeError, DecodedTelemetry};

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").expect("valid MAC address pattern")
});

/// Platform-specific unique identifier for a device.
///
/// Opaque to the core; stable for a physical device on a given host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The MAC address embedded in the identifier, if the platform exposes one
    /// (Linux and Windows do, macOS hands out opaque UUIDs).
    pub fn mac_address(&self) -> Option<String> {
        MAC_ADDRESS
            .find_iter(&self.0)
            .last()
            .map(|m| m.as_str().to_uppercase())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Represents a discovered Bluetooth device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    /// Platform-specific unique identifier for the device
    pub id: DeviceId,
    /// The advertised name of the device, if any
    pub name: Option<String>,
    /// The signal strength (RSSI) of the device in dBm
    pub rssi: i16,
    /// When the device was last observed
    pub last_seen: DateTime<Utc>,
}

impl DiscoveredDevice {
    /// Creates a new DiscoveredDevice observed right now
    pub fn new(id: impl Into<DeviceId>, name: Option<String>, rssi: i16) -> Self {
        Self {
            id: id.into(),
            name,
            rssi,
            last_seen: Utc::now(),
        }
    }

    /// The name to show for this device; blank or missing names become `[Unnamed]`.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => UNNAMED_DEVICE,
        }
    }
}

/// A service as enumerated on a connected peripheral, with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub uuid: String,
    pub characteristics: Vec<String>,
}

impl ServiceInfo {
    pub fn new(uuid: impl Into<String>, characteristics: Vec<String>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics,
        }
    }
}

/// The resolved telemetry service/characteristic pair of a connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GattEndpoint {
    pub service: String,
    pub characteristic: String,
}

/// Generic information about a device that reached service resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceMetadata {
    pub id: DeviceId,
    pub name: Option<String>,
    pub rssi: i16,
    pub service_count: usize,
}

/// Why a session ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    Timeout,
    ConnectionLost,
    TelemetryUnsupported,
    Radio(String),
}

impl FailureReason {
    /// Status line shown to the user once the failure has been cleaned up.
    pub fn status_message(&self) -> String {
        match self {
            Self::Timeout => "Connection timed out".to_string(),
            Self::ConnectionLost => "Device connection lost".to_string(),
            Self::TelemetryUnsupported => {
                "Temperature service not available on this device".to_string()
            }
            Self::Radio(message) => format!("Bluetooth error: {message}"),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::TelemetryUnsupported => f.write_str("telemetry unsupported"),
            Self::Radio(message) => write!(f, "radio error: {message}"),
        }
    }
}

/// States of the connection orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    ServiceResolution,
    Monitoring,
    Disconnecting,
    Failed(FailureReason),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Scanning => f.write_str("scanning"),
            Self::Connecting => f.write_str("connecting"),
            Self::ServiceResolution => f.write_str("resolving services"),
            Self::Monitoring => f.write_str("monitoring"),
            Self::Disconnecting => f.write_str("disconnecting"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Current state plus the status line the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub state: ConnectionState,
    pub message: String,
    /// Device of the active session, if any
    pub device: Option<DeviceId>,
}

impl Status {
    pub fn idle(message: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Idle,
            message: message.into(),
            device: None,
        }
    }
}

/// Result of a connect attempt that did not fail structurally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConnectOutcome {
    /// Telemetry characteristic found and subscribed
    Monitoring {
        endpoint: GattEndpoint,
        metadata: DeviceMetadata,
    },
    /// The device does not expose the temperature service; the session was closed
    Unsupported { metadata: DeviceMetadata },
}

/// Everything the orchestrator reports to its observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScannerEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    DeviceFound(DiscoveredDevice),
    DeviceInfo(DeviceMetadata),
    Telemetry(DecodedTelemetry),
    DecodeFailed { sequence: u64, error: DecodeError },
    /// An operation could not proceed until the user acts (enable Bluetooth, grant access)
    ActionRequired(String),
}
