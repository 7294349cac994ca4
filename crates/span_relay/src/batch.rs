//! Batch accumulation.
//!
//! A [`Batch`] is owned by exactly one worker and has no concurrency concerns:
//! it only holds envelopes in dequeue order and decides when they are due for
//! delivery. A batch is due when it is full, or when it is non-empty and
//! `flush_interval` has elapsed since the last delivery.
//!
//! ```rust,ignore
//! let mut batch = Batch::new(BatchConfig::default());
//! batch.push(envelope);
//! if batch.should_flush() {
//!     delivery.deliver_batch(batch.take()).await;
//! }
//! ```

use crate::config::RelayConfig;
use crate::envelope::Envelope;
use std::time::Duration;
use tokio::time::Instant;

/// Size and time thresholds for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of envelopes per batch
    pub batch_size: usize,
    /// Maximum time a non-empty batch waits before it is due
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval: Duration::from_secs(5),
        }
    }
}

impl From<&RelayConfig> for BatchConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval,
        }
    }
}

/// Envelopes accumulated by one worker.
#[derive(Debug)]
pub struct Batch {
    items: Vec<Envelope>,
    config: BatchConfig,
    last_flush: Instant,
}

impl Batch {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            items: Vec::with_capacity(config.batch_size),
            config,
            last_flush: Instant::now(),
        }
    }

    /// Adds an envelope. Callers must not push into a full batch.
    pub fn push(&mut self, envelope: Envelope) {
        debug_assert!(
            !self.is_full(),
            "batch already holds {} envelopes",
            self.items.len()
        );
        self.items.push(envelope);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.config.batch_size
    }

    /// Time left before a non-empty batch becomes due by age.
    pub fn time_until_due(&self) -> Duration {
        self.config
            .flush_interval
            .saturating_sub(self.last_flush.elapsed())
    }

    /// Checks if the batch should be delivered now.
    pub fn should_flush(&self) -> bool {
        !self.items.is_empty()
            && (self.is_full() || self.last_flush.elapsed() >= self.config.flush_interval)
    }

    /// Takes every envelope and restarts the interval.
    pub fn take(&mut self) -> Vec<Envelope> {
        self.last_flush = Instant::now();
        std::mem::replace(&mut self.items, Vec::with_capacity(self.config.batch_size))
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn config(batch_size: usize, secs: u64) -> BatchConfig {
        BatchConfig {
            batch_size,
            flush_interval: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_on_size() {
        let mut batch = Batch::new(config(5, 10));

        for _ in 0..3 {
            batch.push(Envelope::span(Map::new()));
        }
        assert_eq!(batch.len(), 3);
        assert!(!batch.should_flush()); // Below limit

        for _ in 0..2 {
            batch.push(Envelope::span(Map::new()));
        }
        assert!(batch.is_full());
        assert!(batch.should_flush()); // At limit

        let items = batch.take();
        assert_eq!(items.len(), 5);
        assert!(batch.is_empty());
        assert!(!batch.should_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_on_age() {
        let mut batch = Batch::new(config(100, 5));
        batch.push(Envelope::span(Map::new()));
        assert!(!batch.should_flush());
        assert_eq!(batch.time_until_due(), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(batch.time_until_due(), Duration::from_secs(2));
        assert!(!batch.should_flush());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(batch.should_flush());
        assert_eq!(batch.time_until_due(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_never_due() {
        let batch = Batch::new(config(1, 1));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!batch.should_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_restarts_interval() {
        let mut batch = Batch::new(config(100, 5));
        tokio::time::advance(Duration::from_secs(10)).await;
        batch.push(Envelope::span(Map::new()));
        assert!(batch.should_flush());

        batch.take();
        batch.push(Envelope::span(Map::new()));
        assert!(!batch.should_flush());
    }

    #[test]
    fn test_config_from_relay_config() {
        let relay = RelayConfig::default()
            .with_batch_size(25)
            .with_flush_interval(Duration::from_millis(250));
        let config = BatchConfig::from(&relay);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
    }
}
