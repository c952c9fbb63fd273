//! Constants used throughout the application
//! This module contains all the constant values used in the application,
//! such as UUIDs, timeouts, and other configuration values.

use uuid::Uuid;

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid =
    Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_HEALTH_THERMOMETER_SERVICE: Uuid =
    Uuid::from_u128(0x00001809_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const UUID_MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const UUID_TEMPERATURE_MEASUREMENT: Uuid =
    Uuid::from_u128(0x00002a1c_0000_1000_8000_00805f9b34fb);
pub const UUID_INTERMEDIATE_TEMPERATURE: Uuid =
    Uuid::from_u128(0x00002a1e_0000_1000_8000_00805f9b34fb);

/// Timeout for a connect attempt in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Grace period for unsubscribe/disconnect during teardown in milliseconds
pub const DEFAULT_DISCONNECT_GRACE_MS: u64 = 2_000;

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 10;

/// Capacity of the broadcast channel carrying state changes and telemetry
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Capacity of the orchestrator command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Signal strength (dBm) at or above which a device shows a full meter
pub const SIGNAL_STRONG_DBM: i16 = -60;

/// Signal strength (dBm) at or below which a device shows an empty meter
pub const SIGNAL_WEAK_DBM: i16 = -100;

/// Number of bars in the signal meter
pub const SIGNAL_BARS: u8 = 5;

/// Name shown for devices that advertise no name
pub const UNNAMED_DEVICE: &str = "[Unnamed]";

/// Returns the 16-bit short form of a UUID built on the Bluetooth base UUID, e.g. `1809`.
pub fn short_uuid(uuid: Uuid) -> String {
    format!("{:04X}", (uuid.as_u128() >> 96) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_takes_the_assigned_number() {
        assert_eq!(short_uuid(UUID_HEALTH_THERMOMETER_SERVICE), "1809");
        assert_eq!(short_uuid(UUID_TEMPERATURE_MEASUREMENT), "2A1C");
        assert_eq!(short_uuid(UUID_DEVICE_INFORMATION_SERVICE), "180A");
    }
}
