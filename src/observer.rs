//! Diagnostics hooks.
//!
//! The pipeline itself never prints. Everything worth reporting is handed to
//! an [`Observer`] at a fixed point of the receive or render loop, and each
//! context owns its own observer.

use core::fmt;

use embassy_time::Duration;

use crate::ddp::{Packet, ParseError};
use crate::stats::StatsSnapshot;

/// Why the render context dropped a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Invalid length header on read; the queue was reset
    QueueCorrupted,
    /// Frame is not a valid packet
    Malformed(ParseError),
    /// No channel is configured for the destination id
    UnknownDestination(u8),
    /// First pixel lies past the end of the channel
    StartOutOfRange { start: u32, pixel_count: usize },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueCorrupted => f.write_str("queue corrupted, reset"),
            Self::Malformed(err) => write!(f, "parse failed: {}", err),
            Self::UnknownDestination(id) => write!(f, "unknown destination {}", id),
            Self::StartOutOfRange { start, pixel_count } => {
                write!(f, "start pixel {} >= LED count {}", start, pixel_count)
            }
        }
    }
}

/// Receives diagnostics from the pipeline. Every hook defaults to a no-op.
pub trait Observer {
    /// A frame was queued. Only reported for the first few frames after start.
    fn frame_accepted(&mut self, _len: usize, _received: u32) {}

    /// A decoded frame did not fit in the queue. Only reported for the first
    /// few drops after start.
    fn frame_dropped(&mut self, _len: usize, _dropped: u32) {}

    /// Frames received since the previous report
    fn receive_rate(&mut self, _frames: u32, _elapsed: Duration) {}

    /// A packet was written to its channel(s)
    fn packet_processed(&mut self, _packet: &Packet<'_>, _pixels: usize, _processed: u32) {}

    /// The render context dropped a frame. Only reported for the first few
    /// drops after start; `frame` is empty when the queue was reset.
    fn packet_dropped(&mut self, _reason: DropReason, _frame: &[u8], _dropped: u32) {}

    /// Periodic statistics
    fn stats(&mut self, _snapshot: &StatsSnapshot) {}
}

impl<T: Observer + ?Sized> Observer for &mut T {
    fn frame_accepted(&mut self, len: usize, received: u32) {
        (**self).frame_accepted(len, received);
    }

    fn frame_dropped(&mut self, len: usize, dropped: u32) {
        (**self).frame_dropped(len, dropped);
    }

    fn receive_rate(&mut self, frames: u32, elapsed: Duration) {
        (**self).receive_rate(frames, elapsed);
    }

    fn packet_processed(&mut self, packet: &Packet<'_>, pixels: usize, processed: u32) {
        (**self).packet_processed(packet, pixels, processed);
    }

    fn packet_dropped(&mut self, reason: DropReason, frame: &[u8], dropped: u32) {
        (**self).packet_dropped(reason, frame, dropped);
    }

    fn stats(&mut self, snapshot: &StatsSnapshot) {
        (**self).stats(snapshot);
    }
}

/// Observer that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

#[cfg(feature = "esp32-log")]
pub use print::PrintObserver;

#[cfg(feature = "esp32-log")]
mod print {
    use embassy_time::Duration;
    use esp_println::{print, println};

    use super::{DropReason, Observer};
    use crate::ddp::HEADER_SIZE;
    use crate::stats::StatsSnapshot;

    /// Bytes shown in the hex dump of a dropped frame
    const DUMP_LEN: usize = 16;

    /// Writes diagnostics to the console with `esp-println`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PrintObserver;

    impl Observer for PrintObserver {
        fn frame_accepted(&mut self, len: usize, received: u32) {
            println!("[ddp] ACK: frame #{} received ({} bytes)", received, len);
        }

        fn frame_dropped(&mut self, len: usize, dropped: u32) {
            println!(
                "[ddp] WARN: queue full, {} byte frame dropped ({} total)",
                len, dropped
            );
        }

        fn receive_rate(&mut self, frames: u32, elapsed: Duration) {
            let millis = elapsed.as_millis();
            println!(
                "[ddp] ACK: {} frames received in last {}.{}s",
                frames,
                millis / 1000,
                (millis % 1000) / 100
            );
        }

        fn packet_dropped(&mut self, reason: DropReason, frame: &[u8], dropped: u32) {
            println!(
                "[ddp] ERROR: {} (len {}, drop #{})",
                reason,
                frame.len(),
                dropped
            );
            if frame.len() < HEADER_SIZE {
                return;
            }
            print!("[ddp] RAW HEX:");
            for byte in frame.iter().take(DUMP_LEN) {
                print!(" {:02X}", byte);
            }
            println!();
        }

        fn stats(&mut self, snapshot: &StatsSnapshot) {
            println!(
                "[ddp] Stats - RX: {} | Processed: {} | Dropped: {} | Buffer: {:.1}%",
                snapshot.received, snapshot.processed, snapshot.dropped, snapshot.queue_usage
            );
        }
    }
}
