//! Connection orchestrator
//! This module drives scanning, connecting, service resolution and telemetry
//! monitoring as a single actor task. Commands from [`OrchestratorHandle`] and
//! events from the radio are handled one at a time, so the registry and the
//! session are never mutated concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use crate::config::AppConfig;
use crate::core::bluetooth::constants::COMMAND_QUEUE_CAPACITY;
use crate::core::bluetooth::error::{RadioError, ScannerError};
use crate::core::bluetooth::radio::{EventSender, Radio, RadioEvent, SubscriptionId};
use crate::core::bluetooth::registry::DeviceRegistry;
use crate::core::bluetooth::resolver::find_characteristic;
use crate::core::bluetooth::session::{ConnectionSession, deadline_after};
use crate::core::bluetooth::types::{
    ConnectOutcome, ConnectionState, DeviceId, DeviceMetadata, DiscoveredDevice, FailureReason,
    ScannerEvent, ServiceInfo, Status,
};

const IDLE_MESSAGE: &str = "Press Scan to start.";
const BLUETOOTH_OFF_MESSAGE: &str = "Please enable Bluetooth to scan for devices.";
const PERMISSION_MESSAGE: &str = "Bluetooth permission is needed for Bluetooth scanning.";

type Reply<T> = oneshot::Sender<Result<T, ScannerError>>;

enum Command {
    StartScan(Reply<()>),
    StopScan(Reply<()>),
    ToggleScan(Reply<bool>),
    Connect {
        device: DeviceId,
        timeout: Duration,
        reply: Reply<ConnectOutcome>,
    },
    Disconnect {
        grace: Duration,
        reply: Reply<()>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front end of a running [`ConnectionOrchestrator`].
///
/// Commands are queued to the orchestrator task; the read accessors
/// (`snapshot`, `status`, the watch/broadcast receivers) never wait on it.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    devices: watch::Receiver<Vec<DiscoveredDevice>>,
    status: watch::Receiver<Status>,
    events: broadcast::Sender<ScannerEvent>,
}

impl OrchestratorHandle {
    pub async fn start_scan(&self) -> Result<(), ScannerError> {
        self.request(Command::StartScan).await
    }

    pub async fn stop_scan(&self) -> Result<(), ScannerError> {
        self.request(Command::StopScan).await
    }

    /// Starts a scan, or stops the running one. Returns whether a scan is running afterwards.
    pub async fn toggle_scan(&self) -> Result<bool, ScannerError> {
        self.request(Command::ToggleScan).await
    }

    /// Connects to a discovered device and starts monitoring its temperature.
    ///
    /// `timeout` bounds the whole attempt: link setup, service discovery and subscription.
    pub async fn connect(
        &self,
        device: DeviceId,
        timeout: Duration,
    ) -> Result<ConnectOutcome, ScannerError> {
        self.request(|reply| Command::Connect {
            device,
            timeout,
            reply,
        })
        .await
    }

    /// Ends the monitoring session. Never waits longer than `grace` on the radio.
    pub async fn disconnect(&self, grace: Duration) -> Result<(), ScannerError> {
        self.request(|reply| Command::Disconnect { grace, reply })
            .await
    }

    /// Stops scanning, tears down any session and ends the orchestrator task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// The ranked device list.
    pub fn snapshot(&self) -> Vec<DiscoveredDevice> {
        self.devices.borrow().clone()
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    pub fn watch_devices(&self) -> watch::Receiver<Vec<DiscoveredDevice>> {
        self.devices.clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// State changes, telemetry and notices emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ScannerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| ScannerError::Closed)?;
        rx.await.map_err(|_| ScannerError::Closed)?
    }
}

/// Owns the device registry and the connection session.
pub struct ConnectionOrchestrator {
    radio: Arc<dyn Radio>,
    config: AppConfig,
    registry: DeviceRegistry,
    session: Option<ConnectionSession>,
    state: ConnectionState,
    next_session_id: u64,
    events_tx: EventSender,
    devices_tx: watch::Sender<Vec<DiscoveredDevice>>,
    status_tx: watch::Sender<Status>,
    notices_tx: broadcast::Sender<ScannerEvent>,
}

impl ConnectionOrchestrator {
    /// Spawns the orchestrator on the current tokio runtime.
    pub fn spawn(radio: Arc<dyn Radio>, config: AppConfig) -> OrchestratorHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (devices_tx, devices_rx) = watch::channel(Vec::new());
        let (status_tx, status_rx) = watch::channel(Status::idle(IDLE_MESSAGE));
        let (notices_tx, _) = broadcast::channel(config.telemetry.event_capacity.max(1));

        let orchestrator = Self {
            radio,
            registry: DeviceRegistry::new(config.scan.sighting_policy),
            config,
            session: None,
            state: ConnectionState::Idle,
            next_session_id: 0,
            events_tx,
            devices_tx,
            status_tx,
            notices_tx: notices_tx.clone(),
        };
        tokio::spawn(orchestrator.run(commands_rx, events_rx));

        OrchestratorHandle {
            commands: commands_tx,
            devices: devices_rx,
            status: status_rx,
            events: notices_tx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<RadioEvent>,
    ) {
        info!("Connection orchestrator started.");
        loop {
            tokio::select! {
                // Radio events first: everything delivered before a command is applied before it.
                biased;
                Some(event) = events.recv() => self.handle_event(event).await,
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command, &mut events).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }
        info!("Connection orchestrator stopped.");
    }

    async fn handle_command(
        &mut self,
        command: Command,
        events: &mut mpsc::UnboundedReceiver<RadioEvent>,
    ) {
        match command {
            Command::StartScan(reply) => {
                let _ = reply.send(self.start_scan().await);
            }
            Command::StopScan(reply) => {
                self.stop_scan().await;
                let _ = reply.send(Ok(()));
            }
            Command::ToggleScan(reply) => {
                let result = if self.state == ConnectionState::Scanning {
                    self.stop_scan().await;
                    Ok(false)
                } else {
                    self.start_scan().await.map(|()| true)
                };
                let _ = reply.send(result);
            }
            Command::Connect {
                device,
                timeout,
                reply,
            } => {
                let _ = reply.send(self.connect(device, timeout, events).await);
            }
            Command::Disconnect { grace, reply } => {
                let _ = reply.send(self.disconnect(grace).await);
            }
            Command::Shutdown(_) => unreachable!("shutdown is handled by the run loop"),
        }
    }

    async fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Discovered(device) => self.on_discovered(device),
            RadioEvent::DiscoveryStopped => {
                if self.state == ConnectionState::Scanning {
                    info!("Discovery ended with {} device(s) found.", self.registry.len());
                    self.transition(ConnectionState::Idle, "Scan complete.");
                }
            }
            RadioEvent::Notification {
                subscription,
                value,
            } => self.on_notification(subscription, value),
            RadioEvent::ConnectionLost { device } => self.on_connection_lost(device).await,
        }
    }

    async fn start_scan(&mut self) -> Result<(), ScannerError> {
        match self.state {
            ConnectionState::Scanning => {
                debug!("Scan already running.");
                return Ok(());
            }
            ConnectionState::Idle => {}
            ref state => {
                return Err(ScannerError::InvalidState {
                    operation: "scan",
                    state: state.clone(),
                });
            }
        }

        if !self.radio.is_powered().await {
            warn!("Bluetooth adapter is off or missing.");
            self.action_required(BLUETOOTH_OFF_MESSAGE);
            return Err(ScannerError::AdapterUnavailable);
        }

        self.registry.clear();
        self.publish_devices();
        self.transition(ConnectionState::Scanning, "Scanning for Low-Energy devices...");

        if let Err(e) = self.radio.start_discovery(self.events_tx.clone()).await {
            error!("Failed to start discovery: {}", e);
            let (message, err) = match e {
                RadioError::PermissionDenied => (
                    PERMISSION_MESSAGE.to_string(),
                    ScannerError::ActionRequired(PERMISSION_MESSAGE.to_string()),
                ),
                RadioError::AdapterUnavailable => {
                    (BLUETOOTH_OFF_MESSAGE.to_string(), ScannerError::AdapterUnavailable)
                }
                other => {
                    let message = other.to_string();
                    self.transition(ConnectionState::Idle, format!("Scan failed: {message}"));
                    return Err(ScannerError::Radio(message));
                }
            };
            self.action_required(&message);
            self.transition(ConnectionState::Idle, message);
            return Err(err);
        }
        info!("Discovery started.");
        Ok(())
    }

    async fn stop_scan(&mut self) {
        if self.state != ConnectionState::Scanning {
            debug!("No scan running.");
            return;
        }
        if let Err(e) = self.radio.stop_discovery().await {
            warn!("Failed to stop discovery cleanly: {}", e);
        }
        self.transition(ConnectionState::Idle, "Scan stopped.");
    }

    fn on_discovered(&mut self, device: DiscoveredDevice) {
        if self.state != ConnectionState::Scanning {
            debug!("Discarding advertisement from {} outside a scan.", device.id);
            return;
        }
        if let Some(min_rssi) = self.config.scan.min_rssi {
            if device.rssi < min_rssi {
                debug!("Ignoring {} at {} dBm (below {} dBm).", device.id, device.rssi, min_rssi);
                return;
            }
        }
        let is_new = self.registry.get(&device.id).is_none();
        debug!("Found device - ID: {}, Name: {:?}, RSSI: {}", device.id, device.name, device.rssi);
        if self.registry.observe(device.clone()) {
            self.publish_devices();
            if is_new {
                let _ = self.notices_tx.send(ScannerEvent::DeviceFound(device));
            }
        }
    }

    fn on_notification(&mut self, subscription: SubscriptionId, value: Vec<u8>) {
        let Some(session) = self.session.as_mut().filter(|s| s.owns(subscription)) else {
            debug!("Discarding notification for stale subscription {:?}.", subscription);
            return;
        };
        let first = session.frames_decoded() == 0;
        match session.decode(value) {
            (_, Ok(reading)) => {
                debug!("Temperature #{}: {:.2} °C", reading.sequence, reading.celsius);
                let _ = self.notices_tx.send(ScannerEvent::Telemetry(reading));
                if first {
                    self.set_message("Receiving data");
                }
            }
            (sequence, Err(error)) => {
                warn!("Dropping telemetry frame #{}: {}", sequence, error);
                let _ = self
                    .notices_tx
                    .send(ScannerEvent::DecodeFailed { sequence, error });
            }
        }
    }

    async fn on_connection_lost(&mut self, device: DeviceId) {
        let ours = self
            .session
            .as_ref()
            .is_some_and(|s| s.device().id == device);
        if !ours {
            debug!("Ignoring connection loss for {} (no session).", device);
            return;
        }
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::ServiceResolution
            | ConnectionState::Monitoring => {
                self.fail(FailureReason::ConnectionLost).await;
            }
            _ => debug!("Ignoring connection loss for {} while {}.", device, self.state),
        }
    }

    async fn connect(
        &mut self,
        device_id: DeviceId,
        timeout: Duration,
        events: &mut mpsc::UnboundedReceiver<RadioEvent>,
    ) -> Result<ConnectOutcome, ScannerError> {
        if self.session.is_some() {
            return Err(ScannerError::InvalidState {
                operation: "connect",
                state: self.state.clone(),
            });
        }
        let device = self
            .registry
            .get(&device_id)
            .cloned()
            .ok_or_else(|| ScannerError::DeviceNotFound(device_id.clone()))?;

        self.stop_scan().await;

        self.next_session_id += 1;
        let session = ConnectionSession::new(
            self.next_session_id,
            device.clone(),
            timeout,
            self.config.telemetry.byte_order,
        );
        let deadline = session.deadline();
        self.session = Some(session);
        info!("Device details - ID: {}, Name: {:?}", device.id, device.name);
        self.transition(
            ConnectionState::Connecting,
            format!("Connecting to {}...", device.display_name()),
        );

        let link = race(
            deadline,
            self.radio.connect(&device.id, self.events_tx.clone()),
            events,
            &device.id,
        )
        .await;
        if let Err(reason) = link {
            return Err(self.fail(reason).await);
        }

        info!("Connection successful, discovering services...");
        self.transition(ConnectionState::ServiceResolution, "Discovering services...");
        let services = match race(deadline, self.enumerate(&device.id), events, &device.id).await {
            Ok(services) => services,
            Err(reason) => return Err(self.fail(reason).await),
        };

        let metadata = DeviceMetadata {
            id: device.id.clone(),
            name: device.name.clone(),
            rssi: device.rssi,
            service_count: services.len(),
        };
        let _ = self.notices_tx.send(ScannerEvent::DeviceInfo(metadata.clone()));

        let connection = &self.config.connection;
        let endpoint = match find_characteristic(
            &services,
            &connection.service_match,
            &connection.characteristic_match,
        ) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                for service in &services {
                    info!("Available service: {}", service.uuid);
                }
                info!("Device {} has no telemetry endpoint: {}", device.id, e);
                self.fail(FailureReason::TelemetryUnsupported).await;
                return Ok(ConnectOutcome::Unsupported { metadata });
            }
        };
        info!(
            "Found telemetry characteristic {} in service {}",
            endpoint.characteristic, endpoint.service
        );

        info!("Subscribing to notifications...");
        let subscription = race(
            deadline,
            self.radio
                .subscribe(&device.id, &endpoint, self.events_tx.clone()),
            events,
            &device.id,
        )
        .await;
        let subscription = match subscription {
            Ok(subscription) => subscription,
            Err(reason) => return Err(self.fail(reason).await),
        };

        if let Some(session) = self.session.as_mut() {
            session.attach(endpoint.clone(), subscription);
        }
        self.transition(ConnectionState::Monitoring, "Monitoring temperature...");
        Ok(ConnectOutcome::Monitoring { endpoint, metadata })
    }

    async fn enumerate(&self, device: &DeviceId) -> Result<Vec<ServiceInfo>, RadioError> {
        let mut services = Vec::new();
        for uuid in self.radio.services(device).await? {
            let characteristics = self.radio.characteristics(device, &uuid).await?;
            services.push(ServiceInfo::new(uuid, characteristics));
        }
        Ok(services)
    }

    async fn disconnect(&mut self, grace: Duration) -> Result<(), ScannerError> {
        if self.state != ConnectionState::Monitoring || self.session.is_none() {
            return Err(ScannerError::InvalidState {
                operation: "disconnect",
                state: self.state.clone(),
            });
        }
        let deadline = deadline_after(Instant::now(), grace);
        let subscription = self.session.as_mut().and_then(|s| s.take_subscription());
        if let Some(subscription) = subscription {
            let released = self.radio.unsubscribe(subscription);
            log_outcome("unsubscribe", time::timeout_at(deadline, released).await);
        }
        self.transition(ConnectionState::Disconnecting, "Disconnecting...");
        if let Some(session) = self.session.take() {
            let device = session.device().id.clone();
            info!("Disconnecting from device {}", device);
            let closed = self.radio.disconnect(&device);
            log_outcome("disconnect", time::timeout_at(deadline, closed).await);
            log_summary(&session);
        }
        self.transition(ConnectionState::Idle, "Disconnected.");
        Ok(())
    }

    /// Moves through `Failed(reason)`, releases the session and settles in `Idle`.
    async fn fail(&mut self, reason: FailureReason) -> ScannerError {
        warn!("Session failed: {}", reason);
        self.transition(ConnectionState::Failed(reason.clone()), reason.status_message());
        self.teardown().await;
        self.transition(ConnectionState::Idle, reason.status_message());
        reason.into()
    }

    /// Best-effort release of the subscription and the link, bounded by the grace period.
    async fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let deadline = deadline_after(Instant::now(), self.config.connection.disconnect_grace());
        if let Some(subscription) = session.take_subscription() {
            let released = self.radio.unsubscribe(subscription);
            log_outcome("unsubscribe", time::timeout_at(deadline, released).await);
        }
        log_outcome(
            "disconnect",
            time::timeout_at(deadline, self.radio.disconnect(&session.device().id)).await,
        );
        log_summary(&session);
    }

    async fn shutdown(&mut self) {
        self.stop_scan().await;
        if self.state == ConnectionState::Monitoring {
            let grace = self.config.connection.disconnect_grace();
            let _ = self.disconnect(grace).await;
        } else {
            self.teardown().await;
        }
    }

    fn transition(&mut self, to: ConnectionState, message: impl Into<String>) {
        let message = message.into();
        let from = std::mem::replace(&mut self.state, to.clone());
        info!("State {} -> {}: {}", from, to, message);
        self.status_tx.send_replace(Status {
            state: to.clone(),
            message,
            device: self.session.as_ref().map(|s| s.device().id.clone()),
        });
        let _ = self.notices_tx.send(ScannerEvent::StateChanged { from, to });
    }

    fn set_message(&self, message: &str) {
        self.status_tx.send_modify(|status| status.message = message.to_string());
    }

    fn action_required(&self, message: &str) {
        let _ = self
            .notices_tx
            .send(ScannerEvent::ActionRequired(message.to_string()));
    }

    fn publish_devices(&self) {
        self.devices_tx.send_replace(self.registry.snapshot());
    }
}

/// Runs a session step against the session deadline, giving up early if the
/// radio reports the device gone.
async fn race<T>(
    deadline: Instant,
    operation: impl Future<Output = Result<T, RadioError>>,
    events: &mut mpsc::UnboundedReceiver<RadioEvent>,
    device: &DeviceId,
) -> Result<T, FailureReason> {
    tokio::select! {
        result = time::timeout_at(deadline, operation) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FailureReason::Radio(e.to_string())),
            Err(_) => Err(FailureReason::Timeout),
        },
        () = wait_for_loss(events, device) => Err(FailureReason::ConnectionLost),
    }
}

// Nothing else is live while a session is being set up: discovery is stopped
// and no subscription exists yet, so other events can be dropped.
async fn wait_for_loss(events: &mut mpsc::UnboundedReceiver<RadioEvent>, device: &DeviceId) {
    while let Some(event) = events.recv().await {
        match event {
            RadioEvent::ConnectionLost { device: lost } if &lost == device => return,
            other => debug!("Discarding {:?} during session setup.", other),
        }
    }
    std::future::pending::<()>().await
}

fn log_outcome(operation: &str, outcome: Result<Result<(), RadioError>, time::error::Elapsed>) {
    match outcome {
        Ok(Ok(())) => debug!("{} completed.", operation),
        Ok(Err(e)) => warn!("{} failed: {}", operation, e),
        Err(_) => warn!("{} did not finish within the grace period.", operation),
    }
}

fn log_summary(session: &ConnectionSession) {
    let characteristic = session
        .endpoint()
        .map_or("none", |endpoint| endpoint.characteristic.as_str());
    info!(
        "Session {} with {} ({}) closed after {:?}: {} frame(s) decoded, {} rejected.",
        session.id(),
        session.device().id,
        characteristic,
        session.elapsed(),
        session.frames_decoded(),
        session.frames_rejected()
    );
}
