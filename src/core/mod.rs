//! Core functionality for the Medical Scanner
//! This module contains discovery, connection management and telemetry decoding.

pub mod bluetooth;
pub mod signal;
pub mod telemetry;

// Re-export commonly used types
pub use bluetooth::{ConnectionOrchestrator, OrchestratorHandle};
pub use telemetry::{ByteOrder, DecodeError, DecodedTelemetry, TelemetryDecoder, TelemetryFrame};
