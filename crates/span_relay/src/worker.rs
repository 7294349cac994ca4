//! Background worker loop.
//!
//! Each worker waits for the first envelope of a batch, drains whatever else
//! is immediately available up to `batch_size`, and delivers when the batch is
//! full or has aged past `flush_interval`. Once the queue is closed it stops
//! waiting and delivers whatever it holds, exiting when the queue and its own
//! batch are both empty.

use crate::batch::{Batch, BatchConfig};
use crate::delivery::DeliveryClient;
use crate::envelope::Envelope;
use crate::queue::EventQueue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) struct Worker {
    id: usize,
    queue: Arc<EventQueue>,
    delivery: Arc<DeliveryClient>,
    batch_config: BatchConfig,
    idle_timeout: Duration,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        queue: Arc<EventQueue>,
        delivery: Arc<DeliveryClient>,
        batch_config: BatchConfig,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            delivery,
            batch_config,
            idle_timeout,
        }
    }

    pub(crate) async fn run(self) {
        let mut batch = Batch::new(self.batch_config);
        debug!(worker = self.id, "Worker started");

        loop {
            let draining = self.queue.is_closed();
            if draining && batch.is_empty() && self.queue.is_empty() {
                break;
            }

            if !draining {
                // An idle worker re-checks shutdown at least once per idle_timeout;
                // a partial batch waits no longer than its remaining interval.
                let wait = if batch.is_empty() {
                    self.idle_timeout
                } else {
                    batch.time_until_due().min(self.idle_timeout)
                };
                if let Some(envelope) = self.queue.dequeue_blocking(wait).await {
                    batch.push(envelope);
                }
            }

            while !batch.is_full() {
                match self.queue.try_dequeue() {
                    Some(envelope) => batch.push(envelope),
                    None => break,
                }
            }

            if batch.should_flush() || (self.queue.is_closed() && !batch.is_empty()) {
                let items = batch.take();
                let count = items.len();
                self.deliver(items).await;
                self.queue.mark_processed(count);
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }

    /// Runs the delivery on its own task so a panic cannot take the loop down.
    async fn deliver(&self, items: Vec<Envelope>) {
        debug_assert!(items.len() <= self.batch_config.batch_size);
        let count = items.len();
        let delivery = Arc::clone(&self.delivery);

        if let Err(e) = tokio::spawn(async move { delivery.deliver_batch(items).await }).await {
            warn!(worker = self.id, count, error = %e, "Delivery task failed, batch dropped");
        }
    }
}
