//! Bounded-concurrency work queue for the resolver.
//!
//! Work items wait in a FIFO and are turned into futures by the caller once a
//! worker slot is free. All futures are polled from the coordinator's own
//! task through a `FuturesUnordered`; nothing is spawned.

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a queued item was dropped instead of run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    /// The time budget ran out.
    Deadline,
    /// An error has already been latched.
    Latched,
}

/// Outcome of asking the queue for work.
#[derive(Debug)]
pub enum Dispatch<T> {
    /// Run this item.
    Run(T),
    /// The item was dropped as a no-op.
    Discarded(T, Abort),
    /// Nothing queued, or every worker slot is busy.
    Idle,
}

/// Something the coordinator has to react to.
#[derive(Debug)]
pub enum Event<O> {
    /// An in-flight future finished.
    Completed(O),
    /// The deadline passed while futures were still in flight.
    Deadline,
}

pub struct WorkQueue<'a, T, O> {
    pending: VecDeque<T>,
    in_flight: FuturesUnordered<LocalBoxFuture<'a, O>>,
    concurrency: usize,
    started: Instant,
    timeout: Duration,
    token: CancellationToken,
}

impl<'a, T, O> WorkQueue<'a, T, O> {
    /// Create a queue. The clock starts now.
    #[must_use]
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            concurrency: concurrency.max(1),
            started: Instant::now(),
            timeout,
            token: CancellationToken::new(),
        }
    }

    pub fn push(&mut self, item: T) {
        self.pending.push_back(item);
    }

    /// Start polling a future in a worker slot.
    pub fn spawn(&mut self, fut: LocalBoxFuture<'a, O>) {
        self.in_flight.push(fut);
    }

    /// Take the next item if a slot is free.
    ///
    /// The abort condition is checked for every item: once the deadline has
    /// passed or `latched` is set, items are handed back as discarded.
    pub fn dispatch(&mut self, latched: bool) -> Dispatch<T> {
        if self.in_flight.len() >= self.concurrency {
            return Dispatch::Idle;
        }
        let Some(item) = self.pending.pop_front() else {
            return Dispatch::Idle;
        };

        if self.deadline_passed() {
            Dispatch::Discarded(item, Abort::Deadline)
        } else if latched {
            Dispatch::Discarded(item, Abort::Latched)
        } else {
            Dispatch::Run(item)
        }
    }

    /// Wait for the next in-flight future or the deadline.
    ///
    /// Returns `None` once nothing is in flight. After [`cancel`](Self::cancel)
    /// the deadline no longer fires, so the remaining futures can drain.
    pub async fn next_event(&mut self) -> Option<Event<O>> {
        if self.in_flight.is_empty() {
            return None;
        }

        if self.token.is_cancelled() {
            return self.in_flight.next().await.map(Event::Completed);
        }

        let deadline = self.deadline();
        tokio::select! {
            biased;
            out = self.in_flight.next() => out.map(Event::Completed),
            () = tokio::time::sleep_until(deadline) => Some(Event::Deadline),
        }
    }

    /// Raise the cancellation token handed to in-flight fetches.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that in-flight futures race against.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.started + self.timeout
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn deadline_passed(&self) -> bool {
        self.elapsed() > self.timeout
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Nothing queued and nothing in flight.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}
