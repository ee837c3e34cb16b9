//! Pipeline counters.
//!
//! Each counter has exactly one writer: the receive context owns `received`
//! and the receive-side drops, the render context owns `processed` and the
//! render-side drops. Counters are bumped with a plain load and store, which
//! also works on cores without atomic read-modify-write. Readers may see a
//! slightly stale value; the counters only feed diagnostics.

use core::sync::atomic::{AtomicU32, Ordering};

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Frames decoded and queued
    pub received: u32,
    /// Packets written to an output
    pub processed: u32,
    /// Frames or packets dropped by either context
    pub dropped: u32,
    /// Queue usage in percent
    pub queue_usage: f32,
}

#[derive(Debug, Default)]
pub struct Statistics {
    received: AtomicU32,
    processed: AtomicU32,
    receive_dropped: AtomicU32,
    render_dropped: AtomicU32,
}

impl Statistics {
    pub const fn new() -> Self {
        Self {
            received: AtomicU32::new(0),
            processed: AtomicU32::new(0),
            receive_dropped: AtomicU32::new(0),
            render_dropped: AtomicU32::new(0),
        }
    }

    pub fn received(&self) -> u32 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u32 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Frames dropped because the queue was full
    pub fn receive_dropped(&self) -> u32 {
        self.receive_dropped.load(Ordering::Relaxed)
    }

    /// Frames dropped by the render context (corrupt, malformed or unroutable)
    pub fn render_dropped(&self) -> u32 {
        self.render_dropped.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u32 {
        self.receive_dropped().wrapping_add(self.render_dropped())
    }

    pub fn snapshot(&self, queue_usage: f32) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received(),
            processed: self.processed(),
            dropped: self.dropped(),
            queue_usage,
        }
    }

    pub(crate) fn record_received(&self) -> u32 {
        bump(&self.received)
    }

    pub(crate) fn record_processed(&self) -> u32 {
        bump(&self.processed)
    }

    pub(crate) fn record_receive_drop(&self) -> u32 {
        bump(&self.receive_dropped)
    }

    pub(crate) fn record_render_drop(&self) -> u32 {
        bump(&self.render_dropped)
    }

    /// Zero every counter. Only called while the receive context is stopped.
    pub(crate) fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.receive_dropped.store(0, Ordering::Relaxed);
        self.render_dropped.store(0, Ordering::Relaxed);
    }
}

fn bump(counter: &AtomicU32) -> u32 {
    let next = counter.load(Ordering::Relaxed).wrapping_add(1);
    counter.store(next, Ordering::Relaxed);
    next
}
