use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::bluetooth::{DEFAULT_SCAN_DURATION_SECS, SightingPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How long the radio scans before stopping on its own. `None` scans until stopped.
    pub duration_secs: Option<u64>,

    /// Advertisements weaker than this (dBm) are not listed.
    pub min_rssi: Option<i16>,

    /// Whether repeat sightings update a device's rank.
    pub sighting_policy: SightingPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            duration_secs: Some(DEFAULT_SCAN_DURATION_SECS),
            min_rssi: None,
            sighting_policy: SightingPolicy::default(),
        }
    }
}

impl ScanConfig {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}
