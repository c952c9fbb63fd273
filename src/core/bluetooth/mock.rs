//! In-memory radio for tests and demos.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::bluetooth::constants::{
    UUID_DEVICE_INFORMATION_SERVICE, UUID_DEVICE_NAME, UUID_GENERIC_ACCESS_SERVICE,
    UUID_HEALTH_THERMOMETER_SERVICE, UUID_INTERMEDIATE_TEMPERATURE, UUID_MANUFACTURER_NAME,
    UUID_TEMPERATURE_MEASUREMENT,
};
use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::radio::{
    EventSender, Radio, RadioEvent, SubscriptionHandle, SubscriptionId,
};
use crate::core::bluetooth::types::{DeviceId, DiscoveredDevice, GattEndpoint, ServiceInfo};

/// A scripted peripheral.
#[derive(Clone, Debug)]
pub struct MockPeripheral {
    pub id: DeviceId,
    pub name: Option<String>,
    pub rssi: i16,
    pub services: Vec<ServiceInfo>,
}

impl MockPeripheral {
    /// A device exposing the Health Thermometer service.
    pub fn thermometer(id: &str, name: &str, rssi: i16) -> Self {
        Self {
            id: DeviceId::new(id),
            name: Some(name.to_string()),
            rssi,
            services: vec![
                ServiceInfo::new(
                    UUID_GENERIC_ACCESS_SERVICE.to_string(),
                    vec![UUID_DEVICE_NAME.to_string()],
                ),
                ServiceInfo::new(
                    UUID_DEVICE_INFORMATION_SERVICE.to_string(),
                    vec![UUID_MANUFACTURER_NAME.to_string()],
                ),
                ServiceInfo::new(
                    UUID_HEALTH_THERMOMETER_SERVICE.to_string(),
                    vec![
                        UUID_INTERMEDIATE_TEMPERATURE.to_string(),
                        UUID_TEMPERATURE_MEASUREMENT.to_string(),
                    ],
                ),
            ],
        }
    }

    /// A device without any temperature service.
    pub fn generic(id: &str, name: Option<&str>, rssi: i16) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.map(str::to_string),
            rssi,
            services: vec![ServiceInfo::new(
                UUID_DEVICE_INFORMATION_SERVICE.to_string(),
                vec![UUID_MANUFACTURER_NAME.to_string()],
            )],
        }
    }

    fn advertisement(&self) -> DiscoveredDevice {
        DiscoveredDevice::new(self.id.clone(), self.name.clone(), self.rssi)
    }
}

#[derive(Default)]
struct MockState {
    powered: bool,
    peripherals: Vec<MockPeripheral>,
    connect_delay: Option<Duration>,
    disconnect_delay: Option<Duration>,
    refuse_notifications: bool,
    discovery: Option<EventSender>,
    connection_events: HashMap<DeviceId, EventSender>,
    connected: HashSet<DeviceId>,
    subscriptions: HashMap<SubscriptionId, (DeviceId, EventSender)>,
    last_subscription: Option<(SubscriptionId, EventSender)>,
    next_subscription: u64,
    connect_calls: usize,
    disconnect_calls: usize,
    unsubscribe_calls: usize,
}

/// Cloneable handle to a shared in-memory radio.
///
/// Tests keep one clone to inject events and inspect calls while the
/// orchestrator owns another.
#[derive(Clone, Default)]
pub struct MockRadio {
    state: Arc<Mutex<MockState>>,
}

impl MockRadio {
    /// A powered radio with no peripherals in range.
    pub fn new() -> Self {
        let radio = Self::default();
        radio.lock().powered = true;
        radio
    }

    /// A powered radio with one thermometer and one unrelated device in range.
    pub fn with_sample_data() -> Self {
        Self::new()
            .with_peripheral(MockPeripheral::thermometer(
                "mock-thermometer-1",
                "IR Thermometer",
                -58,
            ))
            .with_peripheral(MockPeripheral::generic("mock-band-1", Some("Fitness Band"), -71))
    }

    pub fn with_peripheral(self, peripheral: MockPeripheral) -> Self {
        self.lock().peripherals.push(peripheral);
        self
    }

    /// Makes every connect attempt take `delay` before completing.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    /// Makes every disconnect take `delay` before completing.
    pub fn with_disconnect_delay(self, delay: Duration) -> Self {
        self.lock().disconnect_delay = Some(delay);
        self
    }

    /// Makes every subscribe attempt fail as if the peripheral refused notifications.
    pub fn with_refused_notifications(self) -> Self {
        self.lock().refuse_notifications = true;
        self
    }

    pub fn set_powered(&self, powered: bool) {
        self.lock().powered = powered;
    }

    /// Delivers an advertisement for every scripted peripheral, in order.
    pub fn advertise_all(&self) {
        let state = self.lock();
        if let Some(events) = &state.discovery {
            for peripheral in &state.peripherals {
                let _ = events.send(RadioEvent::Discovered(peripheral.advertisement()));
            }
        }
    }

    /// Delivers one advertisement to the current (or last) discovery sink.
    pub fn advertise(&self, device: DiscoveredDevice) {
        if let Some(events) = &self.lock().discovery {
            let _ = events.send(RadioEvent::Discovered(device));
        }
    }

    /// Ends discovery as if the platform scan window elapsed.
    pub fn end_discovery(&self) {
        if let Some(events) = &self.lock().discovery {
            let _ = events.send(RadioEvent::DiscoveryStopped);
        }
    }

    /// Pushes a value on the most recent subscription, even if it was released.
    pub fn notify(&self, value: &[u8]) {
        if let Some((id, events)) = &self.lock().last_subscription {
            let _ = events.send(RadioEvent::Notification {
                subscription: *id,
                value: value.to_vec(),
            });
        }
    }

    /// Reports the link to `device` as lost.
    pub fn drop_connection(&self, device: &DeviceId) {
        let mut state = self.lock();
        state.connected.remove(device);
        if let Some(events) = state.connection_events.get(device) {
            let _ = events.send(RadioEvent::ConnectionLost {
                device: device.clone(),
            });
        }
    }

    pub fn is_discovering(&self) -> bool {
        self.lock().discovery.is_some()
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.lock().connected.contains(device)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.lock().disconnect_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.lock().unsubscribe_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn peripheral(&self, device: &DeviceId) -> Result<MockPeripheral, RadioError> {
        self.lock()
            .peripherals
            .iter()
            .find(|p| &p.id == device)
            .cloned()
            .ok_or_else(|| RadioError::UnknownDevice(device.clone()))
    }

    fn ensure_connected(&self, device: &DeviceId) -> Result<(), RadioError> {
        if self.is_connected(device) {
            Ok(())
        } else {
            Err(RadioError::Platform(format!("{device} is not connected")))
        }
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn is_powered(&self) -> bool {
        self.lock().powered
    }

    async fn start_discovery(&self, events: EventSender) -> Result<(), RadioError> {
        let mut state = self.lock();
        if !state.powered {
            return Err(RadioError::AdapterUnavailable);
        }
        state.discovery = Some(events);
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), RadioError> {
        self.lock().discovery = None;
        Ok(())
    }

    async fn connect(&self, device: &DeviceId, events: EventSender) -> Result<(), RadioError> {
        self.lock().connect_calls += 1;
        self.peripheral(device)?;
        // Link loss can be reported while the connection is still being set up.
        let delay = {
            let mut state = self.lock();
            state.connection_events.insert(device.clone(), events);
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lock().connected.insert(device.clone());
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<(), RadioError> {
        let delay = {
            let mut state = self.lock();
            state.disconnect_calls += 1;
            state.disconnect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // The link-loss sender is kept so tests can replay a late platform event.
        self.lock().connected.remove(device);
        Ok(())
    }

    async fn services(&self, device: &DeviceId) -> Result<Vec<String>, RadioError> {
        self.ensure_connected(device)?;
        let peripheral = self.peripheral(device)?;
        Ok(peripheral.services.into_iter().map(|s| s.uuid).collect())
    }

    async fn characteristics(
        &self,
        device: &DeviceId,
        service: &str,
    ) -> Result<Vec<String>, RadioError> {
        self.ensure_connected(device)?;
        self.peripheral(device)?
            .services
            .into_iter()
            .find(|s| s.uuid == service)
            .map(|s| s.characteristics)
            .ok_or_else(|| RadioError::Platform(format!("unknown service {service}")))
    }

    async fn subscribe(
        &self,
        device: &DeviceId,
        endpoint: &GattEndpoint,
        events: EventSender,
    ) -> Result<SubscriptionHandle, RadioError> {
        self.ensure_connected(device)?;
        let mut state = self.lock();
        if state.refuse_notifications {
            return Err(RadioError::Platform("notifications not permitted".to_string()));
        }
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state.subscriptions.insert(id, (device.clone(), events.clone()));
        state.last_subscription = Some((id, events));
        Ok(SubscriptionHandle::new(id, device.clone(), endpoint.clone()))
    }

    async fn unsubscribe(&self, subscription: SubscriptionHandle) -> Result<(), RadioError> {
        let mut state = self.lock();
        state.unsubscribe_calls += 1;
        match state.subscriptions.remove(&subscription.id()) {
            Some((device, _)) if &device == subscription.device() => Ok(()),
            Some(_) => Err(RadioError::UnknownDevice(subscription.device().clone())),
            None => Err(RadioError::UnknownSubscription(subscription.id().0)),
        }
    }
}
