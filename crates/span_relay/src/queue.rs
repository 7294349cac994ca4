//! Multi-producer, multi-consumer envelope queue with completion counting.
//!
//! Producers are arbitrary application threads and never block. Workers wait
//! for the first item of a batch through a `Notify`, bounded by a timeout, and
//! drain the rest without waiting. Every enqueued item counts as unfinished
//! until a worker marks it processed; [`EventQueue::join`] waits for that count
//! to reach zero.

use crate::envelope::Envelope;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Envelope>,
    /// Enqueued but not yet marked processed (includes items held in batches).
    unfinished: usize,
    closed: bool,
}

/// Thread-safe FIFO of [`Envelope`]s.
#[derive(Debug, Default)]
pub struct EventQueue {
    state: Mutex<QueueState>,
    all_processed: Condvar,
    item_available: Notify,
    /// Lock-free mirror of `state.closed` for the worker loop.
    closed: AtomicBool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an envelope. Returns `false` (and drops it) once closed.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.items.push_back(envelope);
            state.unfinished += 1;
        }
        self.item_available.notify_one();
        true
    }

    /// Takes the next envelope if one is immediately available.
    pub fn try_dequeue(&self) -> Option<Envelope> {
        self.lock().items.pop_front()
    }

    /// Waits up to `timeout` for an envelope.
    ///
    /// Returns `None` on timeout, or at once if the queue is closed and empty.
    pub async fn dequeue_blocking(&self, timeout: Duration) -> Option<Envelope> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.item_available.notified();
            tokio::pin!(notified);
            // Register before checking so an enqueue in between is not missed.
            notified.as_mut().enable();

            if let Some(envelope) = self.try_dequeue() {
                return Some(envelope);
            }
            if self.is_closed() {
                return None;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_dequeue();
            }
        }
    }

    /// Marks `n` previously dequeued envelopes as processed.
    pub fn mark_processed(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut state = self.lock();
        debug_assert!(
            n <= state.unfinished,
            "marked {} processed with only {} unfinished",
            n,
            state.unfinished
        );
        state.unfinished = state.unfinished.saturating_sub(n);
        if state.unfinished == 0 {
            self.all_processed.notify_all();
        }
    }

    /// Blocks the calling thread until every enqueued envelope is processed.
    pub fn join(&self) {
        let mut state = self.lock();
        while state.unfinished > 0 {
            state = self
                .all_processed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`join`](Self::join) but gives up after `timeout`.
    ///
    /// Returns `true` if everything was processed in time.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .all_processed
            .wait_timeout_while(state, timeout, |s| s.unfinished > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.unfinished == 0
    }

    /// Stops accepting envelopes and wakes every waiting worker.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
        }
        self.closed.store(true, Ordering::Release);
        self.item_available.notify_waiters();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Envelopes waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Envelopes enqueued but not yet marked processed.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}
