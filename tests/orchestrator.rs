use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use medical_scanner_lib::config::AppConfig;
use medical_scanner_lib::core::bluetooth::mock::{MockPeripheral, MockRadio};
use medical_scanner_lib::core::bluetooth::{
    ConnectOutcome, ConnectionOrchestrator, ConnectionState, DeviceId, DiscoveredDevice,
    FailureReason, OrchestratorHandle, ScannerError, ScannerEvent,
};
use medical_scanner_lib::core::telemetry::DecodeError;

const THERMOMETER: &str = "mock-thermometer-1";
const BAND: &str = "mock-band-1";
const TIMEOUT: Duration = Duration::from_secs(5);
const GRACE: Duration = Duration::from_millis(50);

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.connection.disconnect_grace_ms = 50;
    config
}

fn spawn(radio: &MockRadio) -> OrchestratorHandle {
    ConnectionOrchestrator::spawn(Arc::new(radio.clone()), config())
}

/// Waits until the orchestrator has applied every event the radio delivered so far.
///
/// Radio events are handled ahead of commands, so any command round trip works;
/// `stop_scan` outside a scan changes nothing.
async fn settle(handle: &OrchestratorHandle) {
    handle.stop_scan().await.unwrap();
}

/// Scans and delivers every scripted advertisement, leaving the scan running.
async fn scanned(radio: &MockRadio) -> OrchestratorHandle {
    let handle = spawn(radio);
    handle.start_scan().await.unwrap();
    radio.advertise_all();
    // A second start is a no-op while scanning, but still a round trip.
    handle.start_scan().await.unwrap();
    handle
}

fn drain(events: &mut broadcast::Receiver<ScannerEvent>) -> Vec<ScannerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn states(events: &[ScannerEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            ScannerEvent::StateChanged { to, .. } => Some(to.clone()),
            _ => None,
        })
        .collect()
}

fn temperatures(events: &[ScannerEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            ScannerEvent::Telemetry(reading) => Some(reading.celsius),
            _ => None,
        })
        .collect()
}

fn flagged_float(celsius: f32) -> Vec<u8> {
    let mut payload = vec![0x00];
    payload.extend_from_slice(&celsius.to_le_bytes());
    payload
}

#[tokio::test]
async fn scan_ranks_devices_strongest_first() {
    let radio = MockRadio::new()
        .with_peripheral(MockPeripheral::generic("a", Some("A"), -80))
        .with_peripheral(MockPeripheral::generic("b", None, -50))
        .with_peripheral(MockPeripheral::generic("c", Some("C"), -65))
        .with_peripheral(MockPeripheral::generic("d", Some("D"), -65));
    let handle = scanned(&radio).await;

    // A repeat sighting does not move or duplicate a device.
    radio.advertise(DiscoveredDevice::new("a", Some("A".to_string()), -20));
    settle(&handle).await;

    let snapshot = handle.snapshot();
    let ids: Vec<_> = snapshot.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["b", "c", "d", "a"]);
    let unique: HashSet<_> = snapshot.iter().map(|d| d.id.clone()).collect();
    assert_eq!(unique.len(), snapshot.len());
    assert_eq!(handle.status().state, ConnectionState::Idle);
}

#[tokio::test]
async fn stop_scan_keeps_the_list_and_is_idempotent() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    assert_eq!(handle.status().state, ConnectionState::Scanning);

    handle.stop_scan().await.unwrap();
    handle.stop_scan().await.unwrap();
    assert_eq!(handle.status().state, ConnectionState::Idle);
    assert!(!radio.is_discovering());
    assert_eq!(handle.snapshot().len(), 2);

    // A new scan starts from an empty list.
    handle.start_scan().await.unwrap();
    assert!(handle.snapshot().is_empty());
}

#[tokio::test]
async fn toggle_scan_flips_between_scanning_and_idle() {
    let radio = MockRadio::with_sample_data();
    let handle = spawn(&radio);
    assert!(handle.toggle_scan().await.unwrap());
    assert!(radio.is_discovering());
    assert!(!handle.toggle_scan().await.unwrap());
    assert!(!radio.is_discovering());
}

#[tokio::test]
async fn scan_window_elapsing_returns_to_idle() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    radio.end_discovery();
    settle(&handle).await;
    assert_eq!(handle.status().state, ConnectionState::Idle);
    assert_eq!(handle.snapshot().len(), 2);
}

#[tokio::test]
async fn scanning_with_the_adapter_off_asks_for_action() {
    let radio = MockRadio::with_sample_data();
    radio.set_powered(false);
    let handle = spawn(&radio);
    let mut events = handle.subscribe();

    assert_eq!(handle.start_scan().await, Err(ScannerError::AdapterUnavailable));
    assert_eq!(handle.status().state, ConnectionState::Idle);
    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        ScannerEvent::ActionRequired(message) if message.contains("enable Bluetooth")
    )));
    assert!(states(&events).is_empty());
}

#[tokio::test]
async fn connect_monitors_and_decodes_every_frame_independently() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    let mut events = handle.subscribe();

    let outcome = handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await.unwrap();
    let ConnectOutcome::Monitoring { endpoint, metadata } = outcome else {
        panic!("expected monitoring, got {outcome:?}");
    };
    assert!(endpoint.service.to_uppercase().contains("1809"));
    assert!(endpoint.characteristic.to_uppercase().contains("2A1C"));
    assert_eq!(metadata.service_count, 3);
    assert_eq!(metadata.name.as_deref(), Some("IR Thermometer"));
    assert!(!radio.is_discovering());
    assert_eq!(radio.active_subscriptions(), 1);

    radio.notify(&flagged_float(36.5));
    radio.notify(&[]);
    radio.notify(&[37]);
    radio.notify(&3650i16.to_le_bytes());
    settle(&handle).await;

    let events = drain(&mut events);
    assert_eq!(
        states(&events),
        [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::ServiceResolution,
            ConnectionState::Monitoring,
        ]
    );
    assert_eq!(temperatures(&events), [36.5, 37.0, 36.5]);
    assert!(events.iter().any(|e| matches!(
        e,
        ScannerEvent::DecodeFailed { sequence: 2, error: DecodeError::TooShort }
    )));

    let status = handle.status();
    assert_eq!(status.state, ConnectionState::Monitoring);
    assert_eq!(status.message, "Receiving data");
    assert_eq!(status.device, Some(DeviceId::new(THERMOMETER)));
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_fails_and_releases_everything() {
    let radio = MockRadio::with_sample_data().with_connect_delay(Duration::from_secs(3600));
    let handle = scanned(&radio).await;
    let mut events = handle.subscribe();

    let result = handle
        .connect(DeviceId::new(THERMOMETER), Duration::from_millis(10))
        .await;
    assert_eq!(result, Err(ScannerError::Timeout));

    let transitions = states(&drain(&mut events));
    assert_eq!(
        transitions,
        [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Failed(FailureReason::Timeout),
            ConnectionState::Idle,
        ]
    );
    assert_eq!(radio.active_subscriptions(), 0);
    assert_eq!(radio.disconnect_calls(), 1);
    assert_eq!(radio.connect_calls(), 1);

    let status = handle.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert_eq!(status.message, "Connection timed out");
    assert_eq!(status.device, None);

    // Not retried, and a fresh attempt is allowed.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(radio.connect_calls(), 1);
    assert_eq!(
        handle.connect(DeviceId::new(BAND), Duration::from_millis(10)).await,
        Err(ScannerError::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn unbounded_timeouts_do_not_overflow_the_deadline() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;

    let outcome = handle
        .connect(DeviceId::new(THERMOMETER), Duration::MAX)
        .await
        .unwrap();
    assert!(matches!(outcome, ConnectOutcome::Monitoring { .. }));

    handle.disconnect(Duration::MAX).await.unwrap();
    assert_eq!(handle.status().state, ConnectionState::Idle);
    assert_eq!(radio.active_subscriptions(), 0);
    assert_eq!(handle.start_scan().await, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn link_loss_while_connecting_fails_the_attempt() {
    let radio = MockRadio::with_sample_data().with_connect_delay(Duration::from_secs(3600));
    let handle = scanned(&radio).await;
    let mut events = handle.subscribe();

    let attempt = tokio::spawn({
        let handle = handle.clone();
        async move { handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await }
    });
    while radio.connect_calls() == 0 {
        tokio::task::yield_now().await;
    }
    radio.drop_connection(&DeviceId::new(THERMOMETER));

    assert_eq!(attempt.await.unwrap(), Err(ScannerError::ConnectionLost));
    assert_eq!(
        states(&drain(&mut events)),
        [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Failed(FailureReason::ConnectionLost),
            ConnectionState::Idle,
        ]
    );
    assert_eq!(radio.disconnect_calls(), 1);
    assert_eq!(handle.status().message, "Device connection lost");
}

#[tokio::test]
async fn refused_notifications_fail_the_attempt() {
    let radio = MockRadio::with_sample_data().with_refused_notifications();
    let handle = scanned(&radio).await;
    let mut events = handle.subscribe();

    let result = handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await;
    assert!(matches!(
        result,
        Err(ScannerError::Radio(message)) if message.contains("notifications")
    ));

    let transitions = states(&drain(&mut events));
    assert!(matches!(
        transitions.as_slice(),
        [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::ServiceResolution,
            ConnectionState::Failed(FailureReason::Radio(_)),
            ConnectionState::Idle,
        ]
    ));
    assert_eq!(radio.active_subscriptions(), 0);
    assert_eq!(radio.disconnect_calls(), 1);
    assert_eq!(handle.status().device, None);
}

#[tokio::test]
async fn disconnect_releases_the_subscription_and_silences_telemetry() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await.unwrap();
    radio.notify(&[36]);
    settle(&handle).await;

    let mut events = handle.subscribe();
    handle.disconnect(GRACE).await.unwrap();
    assert_eq!(radio.unsubscribe_calls(), 1);
    assert_eq!(radio.active_subscriptions(), 0);
    assert!(!radio.is_connected(&DeviceId::new(THERMOMETER)));

    // Values and link events that arrive late belong to no session.
    radio.notify(&[38]);
    radio.drop_connection(&DeviceId::new(THERMOMETER));
    settle(&handle).await;

    let events = drain(&mut events);
    assert_eq!(
        states(&events),
        [ConnectionState::Disconnecting, ConnectionState::Idle]
    );
    assert!(temperatures(&events).is_empty());
    assert_eq!(handle.status().message, "Disconnected.");
}

#[tokio::test(start_paused = true)]
async fn disconnect_never_waits_longer_than_the_grace_period() {
    let radio = MockRadio::with_sample_data().with_disconnect_delay(Duration::from_secs(3600));
    let handle = scanned(&radio).await;
    handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await.unwrap();

    let started = tokio::time::Instant::now();
    handle.disconnect(GRACE).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(handle.status().state, ConnectionState::Idle);
    assert_eq!(radio.active_subscriptions(), 0);
}

#[tokio::test]
async fn connection_loss_while_monitoring_returns_to_idle() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await.unwrap();
    let mut events = handle.subscribe();

    radio.drop_connection(&DeviceId::new(THERMOMETER));
    settle(&handle).await;

    assert_eq!(
        states(&drain(&mut events)),
        [
            ConnectionState::Failed(FailureReason::ConnectionLost),
            ConnectionState::Idle,
        ]
    );
    assert_eq!(radio.active_subscriptions(), 0);
    assert_eq!(handle.status().message, "Device connection lost");
    assert!(matches!(
        handle.disconnect(GRACE).await,
        Err(ScannerError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn device_without_temperature_service_is_reported_not_raised() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    let mut events = handle.subscribe();

    let outcome = handle.connect(DeviceId::new(BAND), TIMEOUT).await.unwrap();
    let ConnectOutcome::Unsupported { metadata } = outcome else {
        panic!("expected unsupported, got {outcome:?}");
    };
    assert_eq!(metadata.id, DeviceId::new(BAND));
    assert_eq!(metadata.rssi, -71);
    assert_eq!(metadata.service_count, 1);

    let events = drain(&mut events);
    assert!(events.iter().any(
        |e| matches!(e, ScannerEvent::DeviceInfo(m) if m.id == DeviceId::new(BAND))
    ));
    assert_eq!(
        states(&events)[3..],
        [
            ConnectionState::Failed(FailureReason::TelemetryUnsupported),
            ConnectionState::Idle,
        ]
    );
    assert_eq!(radio.disconnect_calls(), 1);
    assert_eq!(radio.active_subscriptions(), 0);
}

#[tokio::test]
async fn only_one_session_at_a_time() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await.unwrap();

    assert!(matches!(
        handle.connect(DeviceId::new(BAND), TIMEOUT).await,
        Err(ScannerError::InvalidState { operation: "connect", .. })
    ));
    assert!(matches!(
        handle.start_scan().await,
        Err(ScannerError::InvalidState { operation: "scan", .. })
    ));
    assert_eq!(radio.connect_calls(), 1);
}

#[tokio::test]
async fn undiscovered_devices_cannot_be_connected() {
    let radio = MockRadio::with_sample_data();
    let handle = spawn(&radio);
    assert_eq!(
        handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await,
        Err(ScannerError::DeviceNotFound(DeviceId::new(THERMOMETER)))
    );
    assert_eq!(radio.connect_calls(), 0);
}

#[tokio::test]
async fn shutdown_tears_down_the_session() {
    let radio = MockRadio::with_sample_data();
    let handle = scanned(&radio).await;
    handle.connect(DeviceId::new(THERMOMETER), TIMEOUT).await.unwrap();

    handle.shutdown().await;
    assert_eq!(radio.active_subscriptions(), 0);
    assert!(!radio.is_connected(&DeviceId::new(THERMOMETER)));
    assert_eq!(handle.start_scan().await, Err(ScannerError::Closed));
}
