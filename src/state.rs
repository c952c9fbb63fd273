//! Application state management
//! This module defines and manages the global application state.

use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::config::AppConfig;
use crate::core::bluetooth::{BluestRadio, ConnectionOrchestrator, OrchestratorHandle, Radio};

/// Global application state
pub struct AppState {
    /// Handle to the running connection orchestrator
    pub orchestrator: OrchestratorHandle,
    pub config: AppConfig,
}

impl AppState {
    /// Opens the platform Bluetooth adapter and starts the orchestrator.
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing Bluetooth radio...");
        let radio = BluestRadio::new(config.scan.duration()).await?;
        Ok(Self::with_radio(Arc::new(radio), config))
    }

    /// Starts the orchestrator on top of an existing radio.
    pub fn with_radio(radio: Arc<dyn Radio>, config: AppConfig) -> Self {
        let orchestrator = ConnectionOrchestrator::spawn(radio, config.clone());
        Self {
            orchestrator,
            config,
        }
    }

    /// Gets a handle to the orchestrator
    pub fn orchestrator(&self) -> OrchestratorHandle {
        self.orchestrator.clone()
    }
}
