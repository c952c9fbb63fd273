//! The radio stack as seen by the orchestrator.
//! Everything platform specific sits behind [`Radio`]; events flow back to the
//! orchestrator over the [`EventSender`] it passes in.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::types::{DeviceId, DiscoveredDevice, GattEndpoint};

/// Identifies one characteristic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Events delivered asynchronously by the radio stack.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// An advertisement was received
    Discovered(DiscoveredDevice),
    /// Discovery ended without being asked to (scan window elapsed, stream closed)
    DiscoveryStopped,
    /// A characteristic value arrived on a subscription
    Notification {
        subscription: SubscriptionId,
        value: Vec<u8>,
    },
    /// The link to a device dropped
    ConnectionLost { device: DeviceId },
}

pub type EventSender = mpsc::UnboundedSender<RadioEvent>;

/// A live notification subscription.
///
/// Not `Clone`: it is released exactly once by handing it back to
/// [`Radio::unsubscribe`].
#[derive(Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    device: DeviceId,
    endpoint: GattEndpoint,
}

impl SubscriptionHandle {
    pub fn new(id: SubscriptionId, device: DeviceId, endpoint: GattEndpoint) -> Self {
        Self {
            id,
            device,
            endpoint,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn endpoint(&self) -> &GattEndpoint {
        &self.endpoint
    }
}

/// Platform Bluetooth operations used by the orchestrator.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Whether the adapter is present and switched on
    async fn is_powered(&self) -> bool;

    /// Starts discovery; advertisements are sent as [`RadioEvent::Discovered`].
    async fn start_discovery(&self, events: EventSender) -> Result<(), RadioError>;

    async fn stop_discovery(&self) -> Result<(), RadioError>;

    /// Connects to a discovered device. Link loss is reported on `events`.
    async fn connect(&self, device: &DeviceId, events: EventSender) -> Result<(), RadioError>;

    async fn disconnect(&self, device: &DeviceId) -> Result<(), RadioError>;

    /// Identifiers of the services on a connected device, in platform order.
    async fn services(&self, device: &DeviceId) -> Result<Vec<String>, RadioError>;

    /// Identifiers of the characteristics of one service, in platform order.
    async fn characteristics(
        &self,
        device: &DeviceId,
        service: &str,
    ) -> Result<Vec<String>, RadioError>;

    /// Subscribes to value changes; values arrive as [`RadioEvent::Notification`].
    async fn subscribe(
        &self,
        device: &DeviceId,
        endpoint: &GattEndpoint,
        events: EventSender,
    ) -> Result<SubscriptionHandle, RadioError>;

    async fn unsubscribe(&self, subscription: SubscriptionHandle) -> Result<(), RadioError>;
}
