//! Notification handling for bluest characteristics
//! Each subscription runs a pump task that forwards characteristic values to
//! the orchestrator until it is cancelled or the stream ends.

use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::radio::{EventSender, RadioEvent, SubscriptionId};
use crate::core::bluetooth::types::DeviceId;

type Ready = oneshot::Sender<Result<(), RadioError>>;

/// A running notification pump for one subscription.
pub struct NotificationPump {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl NotificationPump {
    /// Enables notifications on `notify_char` and forwards them tagged with `subscription`.
    ///
    /// Returns once the peripheral has accepted the subscription. A stream that
    /// later ends on its own is reported as [`RadioEvent::ConnectionLost`].
    pub async fn start(
        subscription: SubscriptionId,
        device: DeviceId,
        notify_char: Characteristic,
        events: EventSender,
    ) -> Result<Self, RadioError> {
        info!("Subscribing to notifications...");
        let cancel_token = CancellationToken::new();
        let cancel_token_for_task = cancel_token.clone();
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let forwarding =
                Self::process_notifications(subscription, device, notify_char, events, ready_tx);
            tokio::select! {
                _ = cancel_token_for_task.cancelled() => {
                    debug!("Notification pump {:?} cancelled.", subscription);
                }
                _ = forwarding => {}
            }
        });

        // The caller may give up while the peripheral is still answering.
        let guard = cancel_token.clone().drop_guard();
        let ready = ready_rx.await;
        guard.disarm();

        let pump = Self {
            cancel_token,
            handle,
        };
        match ready {
            Ok(Ok(())) => Ok(pump),
            Ok(Err(e)) => {
                pump.stop().await;
                Err(e)
            }
            Err(_) => {
                pump.stop().await;
                Err(RadioError::Platform(
                    "notification task ended before subscribing".to_string(),
                ))
            }
        }
    }

    /// Stops the pump; dropping the notify stream unsubscribes on the device.
    pub async fn stop(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.handle.await {
            error!("Notification pump ended abnormally: {:?}", e);
        }
    }

    async fn process_notifications(
        subscription: SubscriptionId,
        device: DeviceId,
        notify_char: Characteristic,
        events: EventSender,
        ready: Ready,
    ) {
        let mut notification_stream = match notify_char.notify().await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = ready.send(Err(e.into()));
                return;
            }
        };
        info!("Listening for temperature notifications...");

        while let Some(result) = notification_stream.next().await {
            match result {
                Ok(value) => {
                    debug!("Received telemetry data: {:?}", value);
                    let event = RadioEvent::Notification {
                        subscription,
                        value,
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("Error in notification stream: {}", e);
                    break;
                }
            }
        }

        // Not cancelled, so the peripheral stopped talking to us.
        warn!("Notification stream of {} ended", device);
        let _ = events.send(RadioEvent::ConnectionLost { device });
    }
}
