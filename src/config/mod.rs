pub mod connection_config;
pub mod scan_config;
pub mod telemetry_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::connection_config::ConnectionConfig;
use crate::config::scan_config::ScanConfig;
use crate::config::telemetry_config::TelemetryConfig;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "scanner_config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub connection: ConnectionConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Loads the config from `path`, falling back to defaults if the file does not exist.
    pub async fn load_config(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found at {:?}, using default.", path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", path);
        Ok(config)
    }

    /// Saves the config to `path`, creating its directory if needed.
    pub async fn save_config(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            ensure_directory_exists(dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize scanner config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(path, config_json).await?;

        info!("Scanner config saved to {:?}.", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::SightingPolicy;
    use crate::core::telemetry::ByteOrder;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("medical-scanner-{}-{}", name, std::process::id()))
    }

    #[test]
    fn defaults_target_the_health_thermometer() {
        let config = AppConfig::default();
        assert_eq!(config.connection.service_match, "1809");
        assert_eq!(config.connection.characteristic_match, "2A1C");
        assert_eq!(config.connection.connect_timeout().as_millis(), 10_000);
        assert_eq!(config.scan.sighting_policy, SightingPolicy::KeepFirst);
        assert_eq!(config.telemetry.byte_order, ByteOrder::Little);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "scan": { "sighting_policy": "refresh" }, "telemetry": { "byte_order": "big" } }"#,
        )
        .unwrap();
        assert_eq!(config.scan.sighting_policy, SightingPolicy::Refresh);
        assert_eq!(config.scan.duration_secs, Some(10));
        assert_eq!(config.telemetry.byte_order, ByteOrder::Big);
        assert_eq!(config.connection, ConnectionConfig::default());
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let path = scratch_dir("missing").join(CONFIG_FILE_NAME);
        let config = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn saved_config_loads_back() {
        let dir = scratch_dir("saved");
        let path = dir.join("nested").join(CONFIG_FILE_NAME);
        let mut config = AppConfig::default();
        config.scan.min_rssi = Some(-85);
        config.connection.connect_timeout_ms = 2_500;

        config.save_config(&path).await.unwrap();
        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded, config);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
