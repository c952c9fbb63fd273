//! State of a single connect attempt, from `Connecting` until teardown.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::bluetooth::radio::{SubscriptionHandle, SubscriptionId};
use crate::core::bluetooth::types::{DiscoveredDevice, GattEndpoint};
use crate::core::telemetry::{
    ByteOrder, DecodeError, DecodedTelemetry, TelemetryDecoder, TelemetryFrame,
};

/// Stand-in deadline for budgets `Instant` cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// `start + budget`, saturating so that `Duration::MAX` means "no limit".
pub fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

pub struct ConnectionSession {
    id: u64,
    device: DiscoveredDevice,
    started_at: Instant,
    budget: Duration,
    endpoint: Option<GattEndpoint>,
    subscription: Option<SubscriptionHandle>,
    decoder: TelemetryDecoder,
    next_sequence: u64,
}

impl ConnectionSession {
    pub fn new(id: u64, device: DiscoveredDevice, budget: Duration, byte_order: ByteOrder) -> Self {
        Self {
            id,
            device,
            started_at: Instant::now(),
            budget,
            endpoint: None,
            subscription: None,
            decoder: TelemetryDecoder::new(byte_order),
            next_sequence: 1,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    /// Point in time by which connecting, resolving and subscribing must be done.
    pub fn deadline(&self) -> Instant {
        deadline_after(self.started_at, self.budget)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn endpoint(&self) -> Option<&GattEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn attach(&mut self, endpoint: GattEndpoint, subscription: SubscriptionHandle) {
        self.endpoint = Some(endpoint);
        self.subscription = Some(subscription);
    }

    /// Whether a notification on `subscription` belongs to this session.
    pub fn owns(&self, subscription: SubscriptionId) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|s| s.id() == subscription)
    }

    pub fn take_subscription(&mut self) -> Option<SubscriptionHandle> {
        self.subscription.take()
    }

    /// Stamps a payload with the next sequence number and decodes it.
    pub fn decode(&mut self, payload: Vec<u8>) -> (u64, Result<DecodedTelemetry, DecodeError>) {
        let frame = TelemetryFrame::new(self.next_sequence, payload);
        self.next_sequence += 1;
        (frame.sequence, self.decoder.decode_frame(&frame))
    }

    pub fn frames_decoded(&self) -> u64 {
        self.decoder.decoded()
    }

    pub fn frames_rejected(&self) -> u64 {
        self.decoder.rejected()
    }
}
