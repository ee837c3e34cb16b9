#![no_std]

pub mod channel;
pub mod cobs;
pub mod ddp;
pub mod frame_decoder;
pub mod limiter;
pub mod observer;
pub mod pipeline;
pub mod queue;
pub mod receiver;
pub mod stats;
pub mod strip;

pub use channel::{Channel, ChannelError, ChannelTable};
pub use ddp::{Header, Packet, ParseError};
pub use frame_decoder::{DecoderState, FrameDecoder, MAX_FRAME_SIZE};
pub use limiter::{BrightnessLimiter, LimiterConfig};
pub use observer::{DropReason, NoopObserver, Observer};
#[cfg(feature = "esp32-log")]
pub use observer::PrintObserver;
pub use pipeline::{Pipeline, PipelineConfig, PipelineController, PipelineState, TickResult};
pub use queue::{FrameQueue, ReadError, WriteError};
pub use receiver::FrameReceiver;
pub use stats::{Statistics, StatsSnapshot};
pub use strip::StripOutput;

pub use embassy_time::{Duration, Instant};

pub type Rgb = smart_leds::RGB8;

/// Abstract LED output
///
/// Implement this trait to support different hardware platforms. Writes are
/// buffered until [`flush`](LedOutput::flush).
pub trait LedOutput {
    /// Number of pixels on the output
    fn pixel_count(&self) -> usize;

    /// Set one pixel. Out of range indices are ignored.
    fn set_pixel(&mut self, index: usize, color: Rgb);

    /// Push buffered pixels to the hardware
    fn flush(&mut self);

    /// Set every pixel to `color`
    fn fill(&mut self, color: Rgb) {
        for index in 0..self.pixel_count() {
            self.set_pixel(index, color);
        }
    }
}

impl<T: LedOutput + ?Sized> LedOutput for &mut T {
    fn pixel_count(&self) -> usize {
        (**self).pixel_count()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        (**self).set_pixel(index, color);
    }

    fn flush(&mut self) {
        (**self).flush();
    }

    fn fill(&mut self, color: Rgb) {
        (**self).fill(color);
    }
}

/// Non-blocking source of serial bytes
pub trait ByteSource {
    /// Copy available bytes into `buf` and return how many were copied.
    ///
    /// Returns 0 when nothing is available; must not block.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }
}

impl ByteSource for &[u8] {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.len());
        let (head, tail) = self.split_at(len);
        buf[..len].copy_from_slice(head);
        *self = tail;
        len
    }
}
