//! Fire-and-forget fan-out of decision notifications
//!
//! The dispatcher is a cheap cloneable handle over an unbounded queue. `notify`
//! enqueues and returns immediately; a background worker drains the queue and
//! delivers each event to every channel. A channel that fails is retried once
//! after a backoff, then the failure is logged and dropped. Nothing here is ever
//! reported back to the decision that produced the event.
//!
//! The worker exits once every dispatcher handle has been dropped and the queue
//! is drained, returning its delivery counts.

use super::channel::NotificationChannel;
use super::event::NotificationEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Delivery counts reported by the worker on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Channel deliveries that succeeded, on the first try or the retry
    pub delivered: u64,

    /// Channel deliveries abandoned after the retry
    pub failed: u64,
}

/// Handle used by the engine to enqueue notifications
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::UnboundedSender<NotificationEvent>,
}

/// Background worker draining the queue
pub struct DispatchWorker {
    receiver: mpsc::UnboundedReceiver<NotificationEvent>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    retry_backoff: Duration,
}

impl NotificationDispatcher {
    /// Create a dispatcher and its worker
    ///
    /// # Arguments
    ///
    /// * `channels` - Destinations every event is delivered to
    /// * `retry_backoff` - Delay before the single retry of a failed delivery
    ///
    /// # Returns
    ///
    /// The handle to give the engine, and the worker to run with
    /// [`DispatchWorker::spawn`] or [`DispatchWorker::run`].
    pub fn new(
        channels: Vec<Arc<dyn NotificationChannel>>,
        retry_backoff: Duration,
    ) -> (Self, DispatchWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self { sender },
            DispatchWorker {
                receiver,
                channels,
                retry_backoff,
            },
        )
    }

    /// Enqueue an event without waiting for delivery
    pub fn notify(&self, event: NotificationEvent) {
        if self.sender.send(event).is_err() {
            warn!("notification worker stopped; event dropped");
        }
    }
}

impl DispatchWorker {
    /// Run the worker on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<DispatchStats> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until every sender is dropped
    pub async fn run(mut self) -> DispatchStats {
        let mut stats = DispatchStats::default();

        while let Some(event) = self.receiver.recv().await {
            for channel in &self.channels {
                if deliver_with_retry(channel.as_ref(), &event, self.retry_backoff).await {
                    stats.delivered += 1;
                } else {
                    stats.failed += 1;
                }
            }
        }

        debug!(
            delivered = stats.delivered,
            failed = stats.failed,
            "notification worker finished"
        );
        stats
    }
}

/// One attempt plus at most one retry after `backoff`
async fn deliver_with_retry(
    channel: &dyn NotificationChannel,
    event: &NotificationEvent,
    backoff: Duration,
) -> bool {
    let first = match channel.deliver(event).await {
        Ok(()) => return true,
        Err(e) => e,
    };

    debug!(
        channel = channel.name(),
        error = %first,
        backoff_ms = backoff.as_millis() as u64,
        "notification failed, retrying once"
    );
    tokio::time::sleep(backoff).await;

    match channel.deliver(event).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                channel = channel.name(),
                event_type = %event.event_type,
                recipient = %event.recipient_ref,
                error = %e,
                "notification permanently failed"
            );
            false
        }
    }
}
