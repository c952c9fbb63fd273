use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::radio::{EventSender, RadioEvent};
use crate::core::bluetooth::session::deadline_after;
use crate::core::bluetooth::types::{DeviceId, DiscoveredDevice};

/// Runs bluest discovery in a background task and forwards advertisements.
pub struct BluetoothScanner {
    adapter: Adapter,
    devices: Arc<Mutex<HashMap<DeviceId, Device>>>,
    scan_duration: Option<Duration>,
    cancel_token: Arc<CancellationToken>,
    scan_task_handle: Option<JoinHandle<Result<()>>>,
}

impl BluetoothScanner {
    pub fn new(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<DeviceId, Device>>>,
        scan_duration: Option<Duration>,
    ) -> Self {
        Self {
            adapter,
            devices,
            scan_duration,
            cancel_token: Arc::new(CancellationToken::new()),
            scan_task_handle: None,
        }
    }

    pub async fn start_scan(&mut self, events: EventSender) -> Result<()> {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await?;
        }

        // Only devices advertising in this scan can be connected to.
        self.devices.lock().unwrap_or_else(|p| p.into_inner()).clear();

        self.cancel_token = Arc::new(CancellationToken::new());
        let cancel_token_for_task = self.cancel_token.clone();
        let adapter_for_task = self.adapter.clone();
        let devices_for_task = self.devices.clone();
        let deadline = self.scan_duration.map(|d| deadline_after(Instant::now(), d));

        let handle = tokio::spawn(async move {
            let result = Self::internal_scan_task(
                adapter_for_task,
                devices_for_task,
                events.clone(),
                cancel_token_for_task.clone(),
                deadline,
            )
            .await;
            if let Err(e) = &result {
                error!("Bluetooth scan failed: {:?}", e);
            }
            // Only report an unrequested end; a cancelled scan was stopped by the caller.
            if !cancel_token_for_task.is_cancelled() {
                let _ = events.send(RadioEvent::DiscoveryStopped);
            }
            result
        });

        self.scan_task_handle = Some(handle);
        info!("Device scan task started.");
        Ok(())
    }

    async fn internal_scan_task(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<DeviceId, Device>>>,
        events: EventSender,
        cancel_token: Arc<CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<()> {
        info!("Starting bluetooth scan");
        let mut scan_stream = adapter.scan(&[]).await?;

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let device = discovered_device.device;
                            debug!(
                                "Found device - Device: {:?}, RSSI: {:?}",
                                device, discovered_device.rssi
                            );
                            // Advertisements without a signal reading cannot be ranked.
                            let Some(rssi) = discovered_device.rssi else {
                                continue;
                            };
                            let id = DeviceId::new(device.id().to_string());
                            let name = discovered_device
                                .adv_data
                                .local_name
                                .clone()
                                .or_else(|| device.name().ok());
                            {
                                let mut devices = devices.lock().unwrap_or_else(|p| p.into_inner());
                                devices.insert(id.clone(), device);
                            }
                            let advertisement = DiscoveredDevice::new(id, name, rssi);
                            if events.send(RadioEvent::Discovered(advertisement)).is_err() {
                                info!("Discovery listener is gone, ending scan.");
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
                _ = scan_window(deadline) => {
                    info!("Scan window elapsed.");
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        if let Some(handle) = self.scan_task_handle.take() {
            info!("Waiting for scan task to finish...");
            match handle.await {
                Ok(Ok(())) => info!("Scan task finished successfully after cancellation."),
                Ok(Err(e)) => error!("Scan task finished with an error: {:?}", e),
                Err(e) if e.is_cancelled() => info!("Scan task was cancelled successfully."),
                Err(e) => error!("Scan task finished with an unexpected join error: {:?}", e),
            }
        } else {
            info!("No active scan task handle found to wait for.");
        }
        Ok(())
    }
}

async fn scan_window(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
