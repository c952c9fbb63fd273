//! Front-end commands
//! This module defines the operations a presentation layer invokes. Errors are
//! flattened to strings so they can be shown as-is.

use serde::Serialize;

use crate::core::bluetooth::{ConnectOutcome, DeviceId, DiscoveredDevice, Status};
use crate::core::signal;
use crate::state::AppState;

/// One row of the device list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceListing {
    pub id: DeviceId,
    pub name: String,
    pub address: Option<String>,
    pub rssi: i16,
    /// Meter level, 0 (weakest) to 5
    pub signal_level: u8,
    /// e.g. `◉◉◉○○ -75 dBm`
    pub signal_label: String,
}

impl From<&DiscoveredDevice> for DeviceListing {
    fn from(device: &DiscoveredDevice) -> Self {
        Self {
            id: device.id.clone(),
            name: device.display_name().to_string(),
            address: device.id.mac_address(),
            rssi: device.rssi,
            signal_level: signal::classify(device.rssi),
            signal_label: signal::describe(device.rssi),
        }
    }
}

/// Starts scanning, or stops the running scan.
///
/// # Returns
/// Whether a scan is running afterwards. Progress is reported through the
/// orchestrator's status and event stream.
pub async fn toggle_scan(app_state: &AppState) -> Result<bool, String> {
    app_state
        .orchestrator
        .toggle_scan()
        .await
        .map_err(|e| e.to_string())
}

/// Connects to a discovered device and starts monitoring its temperature.
///
/// # Arguments
/// * `device_id` - The platform identifier from the device list
/// * `app_state` - The application state
pub async fn connect_to_device(
    device_id: String,
    app_state: &AppState,
) -> Result<ConnectOutcome, String> {
    let timeout = app_state.config.connection.connect_timeout();
    app_state
        .orchestrator
        .connect(DeviceId::from(device_id), timeout)
        .await
        .map_err(|e| e.to_string())
}

/// Disconnects from the monitored device
pub async fn disconnect(app_state: &AppState) -> Result<(), String> {
    let grace = app_state.config.connection.disconnect_grace();
    app_state
        .orchestrator
        .disconnect(grace)
        .await
        .map_err(|e| e.to_string())
}

/// The ranked device list, strongest signal first.
pub fn list_devices(app_state: &AppState) -> Vec<DeviceListing> {
    app_state
        .orchestrator
        .snapshot()
        .iter()
        .map(DeviceListing::from)
        .collect()
}

pub fn current_status(app_state: &AppState) -> Status {
    app_state.orchestrator.status()
}
