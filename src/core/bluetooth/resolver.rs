//! Locates the telemetry characteristic among a device's enumerated services.
//!
//! Identifiers are matched as case-insensitive substrings because platforms
//! report them in either the 16-bit short form (`2A1C`) or the full 128-bit
//! form (`00002a1c-0000-1000-8000-00805f9b34fb`).

use thiserror::Error;

use crate::core::bluetooth::types::{GattEndpoint, ServiceInfo};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{0} not found")]
    NotFound(String),
}

/// Returns the first service containing `service_match`, and within it the
/// first characteristic containing `characteristic_match`, in enumeration order.
pub fn find_characteristic(
    services: &[ServiceInfo],
    service_match: &str,
    characteristic_match: &str,
) -> Result<GattEndpoint, ResolveError> {
    let service = services
        .iter()
        .find(|s| contains_ignore_case(&s.uuid, service_match))
        .ok_or_else(|| ResolveError::NotFound(format!("service {service_match}")))?;

    let characteristic = service
        .characteristics
        .iter()
        .find(|c| contains_ignore_case(c, characteristic_match))
        .ok_or_else(|| {
            ResolveError::NotFound(format!(
                "characteristic {characteristic_match} in service {}",
                service.uuid
            ))
        })?;

    Ok(GattEndpoint {
        service: service.uuid.clone(),
        characteristic: characteristic.clone(),
    })
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_uppercase().contains(&needle.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermometer() -> Vec<ServiceInfo> {
        vec![
            ServiceInfo::new(
                "0000180A-0000-1000-8000-00805F9B34FB",
                vec!["00002A29-0000-1000-8000-00805F9B34FB".to_string()],
            ),
            ServiceInfo::new(
                "00001809-0000-1000-8000-00805F9B34FB",
                vec![
                    "00002a1c-0000-1000-8000-00805f9b34fb".to_string(),
                    "00002a1e-0000-1000-8000-00805f9b34fb".to_string(),
                ],
            ),
        ]
    }

    #[test]
    fn finds_the_temperature_measurement() {
        let endpoint = find_characteristic(&thermometer(), "1809", "2A1C").unwrap();
        assert_eq!(endpoint.service, "00001809-0000-1000-8000-00805F9B34FB");
        assert_eq!(endpoint.characteristic, "00002a1c-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn short_form_identifiers_match_too() {
        let services = vec![ServiceInfo::new("1809", vec!["2a1c".to_string()])];
        let endpoint = find_characteristic(&services, "1809", "2A1C").unwrap();
        assert_eq!(endpoint.characteristic, "2a1c");
    }

    #[test]
    fn first_match_in_enumeration_order_wins() {
        let services = vec![
            ServiceInfo::new("1809-a", vec!["2a1c-first".to_string()]),
            ServiceInfo::new("1809-b", vec!["2a1c-second".to_string()]),
        ];
        let endpoint = find_characteristic(&services, "1809", "2A1C").unwrap();
        assert_eq!(endpoint.service, "1809-a");
        assert_eq!(endpoint.characteristic, "2a1c-first");
    }

    #[test]
    fn missing_service_is_not_found() {
        let services = vec![thermometer().remove(0)];
        let result = find_characteristic(&services, "1809", "2A1C");
        assert!(matches!(result, Err(ResolveError::NotFound(_))));
    }

    #[test]
    fn missing_characteristic_is_not_found() {
        let result = find_characteristic(&thermometer(), "1809", "2A6E");
        assert!(matches!(result, Err(ResolveError::NotFound(_))));
        // The first matching service is final; later services are not searched.
        let services = vec![
            ServiceInfo::new("1809-a", vec![]),
            ServiceInfo::new("1809-b", vec!["2a1c".to_string()]),
        ];
        assert!(find_characteristic(&services, "1809", "2A1C").is_err());
    }
}
