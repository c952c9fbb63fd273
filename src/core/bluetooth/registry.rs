//! Ranked set of devices discovered during a scan session.

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::types::{DeviceId, DiscoveredDevice};

/// What to do when an already known device is seen again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SightingPolicy {
    /// Keep the first sighting's signal strength and position.
    #[default]
    KeepFirst,
    /// Take the new signal strength and move the device to its new rank.
    Refresh,
}

/// Discovered devices, strongest signal first.
///
/// Holds at most one entry per [`DeviceId`]. Devices of equal strength stay in
/// discovery order. Entries only go away through [`DeviceRegistry::clear`].
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DiscoveredDevice>,
    policy: SightingPolicy,
}

impl DeviceRegistry {
    pub fn new(policy: SightingPolicy) -> Self {
        Self {
            devices: Vec::new(),
            policy,
        }
    }

    /// Records a sighting. Returns `true` if the ranked list changed.
    pub fn observe(&mut self, device: DiscoveredDevice) -> bool {
        match self.position(&device.id) {
            None => {
                self.insert_ranked(device);
                true
            }
            Some(index) => match self.policy {
                SightingPolicy::KeepFirst => false,
                SightingPolicy::Refresh => {
                    let mut known = self.devices.remove(index);
                    known.rssi = device.rssi;
                    known.last_seen = device.last_seen;
                    if device.name.is_some() {
                        known.name = device.name;
                    }
                    self.insert_ranked(known);
                    true
                }
            },
        }
    }

    /// Forgets every device.
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// The ranked list as it stands.
    pub fn snapshot(&self) -> Vec<DiscoveredDevice> {
        self.devices.clone()
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DiscoveredDevice> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn position(&self, id: &DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| &d.id == id)
    }

    // Before the first strictly weaker entry, so ties keep discovery order.
    fn insert_ranked(&mut self, device: DiscoveredDevice) {
        let index = self
            .devices
            .iter()
            .position(|d| d.rssi < device.rssi)
            .unwrap_or(self.devices.len());
        self.devices.insert(index, device);
    }
}
