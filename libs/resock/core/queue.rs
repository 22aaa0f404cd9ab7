//! Pending queue
//!
//! Buffers payloads while no transport can take them and delivers them,
//! paced, after the next open:
//!
//! ```text
//!  open at T:   entry rank 1 ──> T + 1×base
//!               entry rank 2 ──> T + 2×base
//!               entry rank n ──> T + n×base
//! ```
//!
//! Entries are identified by [`EntryId`], never by position, so payloads
//! queued while a flush is in progress cannot be delivered in place of
//! another entry.

use crate::core::backoff::Timer;
use crate::traits::Payload;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Identity of a queued payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

/// A payload waiting for a usable transport
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: EntryId,
    pub payload: Payload,
}

/// FIFO buffer of outbound payloads plus its flush schedule
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<QueueEntry>,
    next_id: u64,
    schedule: VecDeque<(Instant, EntryId)>,
    pub(crate) flush_timer: Timer,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload; duplicates are distinct entries
    pub fn push(&mut self, payload: Payload) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push_back(QueueEntry { id, payload });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued payloads, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Remove the entry with `id`, if it is still queued
    pub fn take(&mut self, id: EntryId) -> Option<Payload> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        self.entries.remove(pos).map(|e| e.payload)
    }

    /// Plan delivery of every queued entry relative to `opened_at`
    ///
    /// Entry of rank `n` (oldest is 1) becomes due at `opened_at + n × base`.
    /// Replaces any earlier schedule. Returns the number of entries planned.
    pub fn schedule_flush(&mut self, opened_at: Instant, base: Duration) -> usize {
        self.schedule = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (opened_at + base.saturating_mul(i as u32 + 1), e.id))
            .collect();
        self.rearm();
        self.schedule.len()
    }

    /// Forget the flush plan; queued entries stay queued
    pub fn cancel_flush(&mut self) {
        self.schedule.clear();
        self.flush_timer.cancel();
    }

    pub fn is_flushing(&self) -> bool {
        !self.schedule.is_empty()
    }

    /// Pop the ids whose deadline has passed, in delivery order
    ///
    /// Re-arms the flush timer for the next deadline, if any.
    pub fn due(&mut self, now: Instant) -> Vec<EntryId> {
        let mut due = Vec::new();
        while let Some(&(deadline, id)) = self.schedule.front() {
            if deadline > now {
                break;
            }
            self.schedule.pop_front();
            due.push(id);
        }
        self.rearm();
        due
    }

    fn rearm(&mut self) {
        match self.schedule.front() {
            Some(&(deadline, _)) => self.flush_timer.arm_at(deadline),
            None => self.flush_timer.cancel(),
        }
    }
}
