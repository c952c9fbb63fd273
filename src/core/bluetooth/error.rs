use thiserror::Error;

use crate::core::bluetooth::types::{ConnectionState, DeviceId, FailureReason};

/// Errors reported by a [`Radio`](crate::core::bluetooth::Radio) implementation.
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("no Bluetooth adapter is available")]
    AdapterUnavailable,

    #[error("Bluetooth permission denied")]
    PermissionDenied,

    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("unknown subscription: {0}")]
    UnknownSubscription(u64),

    #[error("service {service} has no characteristic {characteristic}")]
    UnknownCharacteristic {
        service: String,
        characteristic: String,
    },

    #[error(transparent)]
    Bluetooth(#[from] bluest::Error),

    #[error("{0}")]
    Platform(String),
}

/// Errors surfaced to callers of the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScannerError {
    #[error("Bluetooth adapter is unavailable")]
    AdapterUnavailable,

    #[error("action required: {0}")]
    ActionRequired(String),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("device {0} has not been discovered")]
    DeviceNotFound(DeviceId),

    #[error("operation timed out")]
    Timeout,

    #[error("connection lost")]
    ConnectionLost,

    #[error("telemetry service or characteristic not available")]
    TelemetryUnsupported,

    #[error("radio error: {0}")]
    Radio(String),

    #[error("orchestrator is no longer running")]
    Closed,
}

impl From<FailureReason> for ScannerError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Timeout => Self::Timeout,
            FailureReason::ConnectionLost => Self::ConnectionLost,
            FailureReason::TelemetryUnsupported => Self::TelemetryUnsupported,
            FailureReason::Radio(message) => Self::Radio(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_error_display() {
        let err = ScannerError::InvalidState {
            operation: "connect",
            state: ConnectionState::Monitoring,
        };
        assert_eq!(err.to_string(), "cannot connect while monitoring");

        let err = ScannerError::DeviceNotFound(DeviceId::new("dev-1"));
        assert_eq!(err.to_string(), "device dev-1 has not been discovered");

        let err = RadioError::UnknownCharacteristic {
            service: "1809".to_string(),
            characteristic: "2A1C".to_string(),
        };
        assert_eq!(err.to_string(), "service 1809 has no characteristic 2A1C");
    }

    #[test]
    fn failure_reasons_map_onto_errors() {
        assert_eq!(ScannerError::from(FailureReason::Timeout), ScannerError::Timeout);
        assert_eq!(
            ScannerError::from(FailureReason::Radio("gatt".to_string())),
            ScannerError::Radio("gatt".to_string())
        );
    }
}
