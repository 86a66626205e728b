//! `KeyWatch` consumes values pushed over a channel and always holds the most
//! recently delivered one.
//!
//! A producer (typically a storage backend announcing key rotations) sends
//! values into the channel at its own pace; readers take cheap `Arc` snapshots
//! of the current value without ever blocking the producer or each other.
//! Replacement is atomic: a reader sees either the previous value or the new
//! one, never a mix. The consumer task shuts down when the `KeyWatch` is
//! dropped.

use log::{debug, info, warn};
use stats::KeyWatchStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

mod stats;

#[derive(Debug)]
pub struct KeyWatch<K> {
    /// The most recently delivered value, if any.
    current: Arc<RwLock<Option<Arc<K>>>>,
    /// A cancellation token to stop the consumer task.
    shutdown_token: CancellationToken,
    /// Receiver tracking whether at least one value has arrived.
    ready_receiver: watch::Receiver<bool>,
    /// Statistics about deliveries
    stats: Arc<KeyWatchStats>,
}

impl<K: Send + Sync + 'static> KeyWatch<K> {
    /// Starts consuming the given channel and keeps the latest value around.
    ///
    /// The sending half stays with the producer; it may deliver zero or more
    /// values over the process lifetime and is never expected to close under
    /// normal operation. If the producer does drop its sender, the already
    /// installed value (if any) remains readable.
    ///
    /// # Arguments
    /// * `receiver` - The receiving half of the delivery channel.
    pub fn start(receiver: mpsc::Receiver<K>) -> Self {
        let shutdown_token = CancellationToken::new();
        let (ready_sender, ready_receiver) = watch::channel(false);

        let handle = Self {
            current: Arc::new(RwLock::new(None)),
            shutdown_token,
            ready_receiver,
            stats: Arc::new(KeyWatchStats::default()),
        };

        handle.spawn(receiver, ready_sender);
        handle
    }

    /// Spawns the consumer task.
    fn spawn(&self, mut receiver: mpsc::Receiver<K>, ready_sender: watch::Sender<bool>) {
        let current = Arc::clone(&self.current);
        let shutdown_token = self.shutdown_token.clone();
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_token.cancelled() => {
                        debug!("KeyWatch consumer received shutdown signal");
                        break;
                    }
                    delivery = receiver.recv() => {
                        match delivery {
                            Some(value) => {
                                {
                                    let mut slot = current.write().await;
                                    *slot = Some(Arc::new(value));
                                }
                                let count = stats.increment_deliveries();
                                info!("Installed delivered value (delivery count: {})", count + 1);
                                if let Err(e) = ready_sender.send(true) {
                                    warn!("Failed to broadcast readiness: {}", e);
                                }
                            }
                            None => {
                                // The producer went away. The last installed
                                // value stays readable; only future deliveries
                                // are impossible now.
                                warn!("Delivery channel closed by producer, consumer stopping");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Returns a snapshot of the most recently delivered value, if any.
    pub async fn current(&self) -> Option<Arc<K>> {
        self.current.read().await.clone()
    }

    /// Check if at least one value has been delivered
    pub fn is_ready(&self) -> bool {
        *self.ready_receiver.borrow()
    }

    /// Wait until the first value arrives or the timeout elapses
    ///
    /// # Arguments
    /// * `wait_timeout` - Maximum duration to wait for the first delivery
    ///
    /// # Returns
    /// * `Ok(())` - If a value was delivered within the timeout
    /// * `Err(tokio::time::error::Elapsed)` - If the timeout was reached
    pub async fn wait_for_value(
        &self,
        wait_timeout: Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        let mut receiver = self.ready_receiver.clone();
        timeout(wait_timeout, async move {
            while !*receiver.borrow_and_update() {
                if receiver.changed().await.is_err() {
                    // The consumer ended without ever seeing a delivery; there
                    // is nothing left to wait on, so park until the timeout.
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Gets the number of values delivered so far
    pub fn deliveries(&self) -> usize {
        self.stats.deliveries()
    }
}

impl<K> Drop for KeyWatch<K> {
    fn drop(&mut self) {
        debug!("KeyWatch dropping, stopping consumer task");
        self.shutdown_token.cancel();
    }
}
