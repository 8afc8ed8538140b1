//! Cooperative event loop core
//!
//! This module provides:
//! - The loop tick rate used by drivers
//! - A millisecond tick clock owned by the dispatcher
//! - One-shot scheduled events with cancellable handles
//!
//! Everything here runs on a single thread. Drivers advance the clock and
//! hand the due events back to their owner, which executes them in order.

use std::collections::BTreeMap;
use std::time::Duration;

/// Loop tick rate in nanoseconds (10ms = 10,000,000 ns)
pub const LOOP_TICK_RATE_NS: u64 = 10_000_000;

/// Loop tick rate as a Duration for convenience
pub const LOOP_TICK_RATE: Duration = Duration::from_nanos(LOOP_TICK_RATE_NS);

/// Handle to a scheduled event; used to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Queue of one-shot events ordered by due tick, then by scheduling order.
#[derive(Debug)]
pub struct Dispatcher<E> {
    now: u64,
    next_id: u64,
    queue: BTreeMap<(u64, TimerHandle), E>,
}

impl<E> Dispatcher<E> {
    pub fn new() -> Self {
        Self {
            now: 0,
            next_id: 1,
            queue: BTreeMap::new(),
        }
    }

    /// Current tick in milliseconds since the dispatcher was created.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `event` to become due `delay_ms` from now.
    pub fn schedule(&mut self, delay_ms: u64, event: E) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        let due = self.now.saturating_add(delay_ms);
        self.queue.insert((due, handle), event);
        handle
    }

    /// Cancel a pending event. Returns it if it had not fired yet.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<E> {
        let key = self.queue.keys().find(|(_, h)| *h == handle).copied()?;
        self.queue.remove(&key)
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.queue.keys().any(|(_, h)| *h == handle)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Milliseconds until the next event is due, `None` when idle.
    pub fn next_due_in(&self) -> Option<u64> {
        self.queue
            .keys()
            .next()
            .map(|(due, _)| due.saturating_sub(self.now))
    }

    /// Move the clock forward and drain every event that became due.
    pub fn advance(&mut self, elapsed_ms: u64) -> Vec<(TimerHandle, E)> {
        self.now = self.now.saturating_add(elapsed_ms);
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            let (_, handle) = *entry.key();
            due.push((handle, entry.remove()));
        }
        due
    }
}

impl<E> Default for Dispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
