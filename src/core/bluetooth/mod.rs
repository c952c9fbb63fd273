//! Bluetooth functionality for the Medical Scanner
//! This module handles discovery, connection and GATT resolution, and streams
//! temperature notifications through the connection orchestrator.

mod connection;
pub(crate) mod constants;
mod error;
mod manager;
mod notification;
mod radio;
mod registry;
mod resolver;
mod scanner;
mod session;
mod types;
pub mod mock;

// Re-export types that should be publicly accessible
pub use connection::BluestRadio;
pub use constants::*; // Re-export all constants
pub use error::{RadioError, ScannerError};
pub use manager::{ConnectionOrchestrator, OrchestratorHandle};
pub use radio::{EventSender, Radio, RadioEvent, SubscriptionHandle, SubscriptionId};
pub use registry::{DeviceRegistry, SightingPolicy};
pub use resolver::{ResolveError, find_characteristic};
pub use session::ConnectionSession;
pub use types::{
    ConnectOutcome, ConnectionState, DeviceId, DeviceMetadata, DiscoveredDevice, FailureReason,
    GattEndpoint, ScannerEvent, ServiceInfo, Status,
};
