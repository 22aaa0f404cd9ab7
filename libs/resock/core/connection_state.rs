//! Lock-free connection state shared between the driver task and handles
//!
//! The driver task is the only writer; `Connection` handles read these
//! from any thread without going through the command channel.

use crate::transport::ReadyState;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    /// Constructed, first connect attempt not started yet
    Init = 0,
    /// A transport exists and has not opened yet
    Connecting = 1,
    /// The transport is open
    Open = 2,
    /// Waiting out the backoff delay before the next attempt
    ReconnectWait = 3,
    /// Terminal; no further attempts will be made
    ClosedFinal = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Init,
            1 => Lifecycle::Connecting,
            2 => Lifecycle::Open,
            3 => Lifecycle::ReconnectWait,
            _ => Lifecycle::ClosedFinal,
        }
    }

    /// Whether the lifecycle can still produce a connect attempt
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == Lifecycle::ClosedFinal
    }
}

/// Atomic wrapper around [`Lifecycle`]
#[derive(Debug)]
pub struct AtomicLifecycle(AtomicU8);

impl AtomicLifecycle {
    pub fn new(state: Lifecycle) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: Lifecycle) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.get().is_terminal()
    }
}

/// Atomic wrapper around [`ReadyState`]
#[derive(Debug)]
pub struct AtomicReadyState(AtomicU8);

impl AtomicReadyState {
    pub fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state.code()))
    }

    #[inline]
    pub fn get(&self) -> ReadyState {
        ReadyState::from_code(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ReadyState) {
        self.0.store(state.code(), Ordering::Release);
    }

    /// Set `new` only if the current state is `current`
    pub fn compare_exchange(
        &self,
        current: ReadyState,
        new: ReadyState,
    ) -> Result<ReadyState, ReadyState> {
        self.0
            .compare_exchange(current.code(), new.code(), Ordering::AcqRel, Ordering::Acquire)
            .map(ReadyState::from_code)
            .map_err(ReadyState::from_code)
    }
}

/// Client metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub timeouts: u64,
    pub pending: usize,
}

/// Atomic counters behind [`Metrics`]
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
    timeouts: AtomicU64,
    pending: AtomicUsize,
    attempt: AtomicU32,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        let metrics = Self::default();
        metrics.attempt.store(1, Ordering::Relaxed);
        metrics
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::Release);
    }

    #[inline]
    pub fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            messages_sent: self.messages_sent(),
            messages_received: self.messages_received(),
            reconnect_count: self.reconnect_count(),
            timeouts: self.timeouts(),
            pending: self.pending(),
        }
    }
}
