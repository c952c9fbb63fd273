//! Bluetooth radio backed by bluest
//! This module connects to and disconnects from peripherals, enumerates their
//! GATT tables and manages notification subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{info, warn};
use tokio::task::JoinHandle;

use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::notification::NotificationPump;
use crate::core::bluetooth::radio::{
    EventSender, Radio, RadioEvent, SubscriptionHandle, SubscriptionId,
};
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::types::{DeviceId, GattEndpoint};

/// [`Radio`] implementation on top of the platform adapter.
pub struct BluestRadio {
    adapter: Adapter,
    /// Devices seen by the scanner, needed to connect by id
    devices: Arc<Mutex<HashMap<DeviceId, Device>>>,
    scanner: tokio::sync::Mutex<BluetoothScanner>,
    /// Link-loss watchers of connected devices
    watchers: Mutex<HashMap<DeviceId, JoinHandle<()>>>,
    subscriptions: Mutex<HashMap<SubscriptionId, NotificationPump>>,
    next_subscription: AtomicU64,
}

impl BluestRadio {
    /// Opens the default adapter. Discovery ends on its own after `scan_duration`, if given.
    pub async fn new(scan_duration: Option<Duration>) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let devices = Arc::new(Mutex::new(HashMap::new()));
        let scanner = BluetoothScanner::new(adapter.clone(), devices.clone(), scan_duration);

        Ok(Self {
            adapter,
            devices,
            scanner: tokio::sync::Mutex::new(scanner),
            watchers: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    fn device(&self, id: &DeviceId) -> Result<Device, RadioError> {
        lock(&self.devices)
            .get(id)
            .cloned()
            .ok_or_else(|| RadioError::UnknownDevice(id.clone()))
    }

    async fn find_characteristic(
        &self,
        id: &DeviceId,
        endpoint: &GattEndpoint,
    ) -> Result<Characteristic, RadioError> {
        let device = self.device(id)?;
        let services = device.services().await?;
        let service = services
            .iter()
            .find(|s| s.uuid().to_string() == endpoint.service)
            .ok_or_else(|| {
                RadioError::Platform(format!("service {} not found", endpoint.service))
            })?;
        service
            .characteristics()
            .await?
            .into_iter()
            .find(|c| c.uuid().to_string() == endpoint.characteristic)
            .ok_or_else(|| RadioError::UnknownCharacteristic {
                service: endpoint.service.clone(),
                characteristic: endpoint.characteristic.clone(),
            })
    }

    fn watch_connection(&self, id: DeviceId, device: Device, events: EventSender) {
        let adapter = self.adapter.clone();
        let device_id = id.clone();
        let handle = tokio::spawn(async move {
            let mut connection_events = match adapter.device_connection_events(&device).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Cannot watch connection state of {}: {}", device_id, e);
                    return;
                }
            };
            while let Some(event) = connection_events.next().await {
                if matches!(event, ConnectionEvent::Disconnected) {
                    info!("Device {} disconnected.", device_id);
                    let _ = events.send(RadioEvent::ConnectionLost { device: device_id });
                    break;
                }
            }
        });
        if let Some(previous) = lock(&self.watchers).insert(id, handle) {
            previous.abort();
        }
    }
}

#[async_trait]
impl Radio for BluestRadio {
    async fn is_powered(&self) -> bool {
        self.adapter.is_available().await.unwrap_or(false)
    }

    async fn start_discovery(&self, events: EventSender) -> Result<(), RadioError> {
        self.scanner
            .lock()
            .await
            .start_scan(events)
            .await
            .map_err(|e| RadioError::Platform(e.to_string()))
    }

    async fn stop_discovery(&self) -> Result<(), RadioError> {
        self.scanner
            .lock()
            .await
            .stop_scan()
            .await
            .map_err(|e| RadioError::Platform(e.to_string()))
    }

    async fn connect(&self, id: &DeviceId, events: EventSender) -> Result<(), RadioError> {
        let device = self.device(id)?;
        if !device.is_connected().await {
            info!("Initiating connection to {}...", id);
            self.adapter.connect_device(&device).await?;
        }
        self.watch_connection(id.clone(), device, events);
        Ok(())
    }

    async fn disconnect(&self, id: &DeviceId) -> Result<(), RadioError> {
        if let Some(watcher) = lock(&self.watchers).remove(id) {
            watcher.abort();
        }
        let device = self.device(id)?;
        if device.is_connected().await {
            info!("Disconnecting from device {}", id);
            self.adapter.disconnect_device(&device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", id);
        }
        Ok(())
    }

    async fn services(&self, id: &DeviceId) -> Result<Vec<String>, RadioError> {
        let device = self.device(id)?;
        let services = device.services().await?;
        Ok(services.iter().map(|s| s.uuid().to_string()).collect())
    }

    async fn characteristics(
        &self,
        id: &DeviceId,
        service: &str,
    ) -> Result<Vec<String>, RadioError> {
        let device = self.device(id)?;
        let services = device.services().await?;
        let Some(service) = services.iter().find(|s| s.uuid().to_string() == service) else {
            return Err(RadioError::Platform(format!("service {service} not found")));
        };
        let characteristics = service.characteristics().await?;
        Ok(characteristics.iter().map(|c| c.uuid().to_string()).collect())
    }

    async fn subscribe(
        &self,
        id: &DeviceId,
        endpoint: &GattEndpoint,
        events: EventSender,
    ) -> Result<SubscriptionHandle, RadioError> {
        let characteristic = self.find_characteristic(id, endpoint).await?;
        let subscription = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let pump =
            NotificationPump::start(subscription, id.clone(), characteristic, events).await?;
        lock(&self.subscriptions).insert(subscription, pump);
        Ok(SubscriptionHandle::new(subscription, id.clone(), endpoint.clone()))
    }

    async fn unsubscribe(&self, subscription: SubscriptionHandle) -> Result<(), RadioError> {
        info!(
            "Unsubscribing from {} on {}",
            subscription.endpoint().characteristic,
            subscription.device()
        );
        let pump = lock(&self.subscriptions)
            .remove(&subscription.id())
            .ok_or(RadioError::UnknownSubscription(subscription.id().0))?;
        pump.stop().await;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
