//! Incremental frame decoder for the serial byte stream.
//!
//! Bytes are fed one at a time. Stuffed bytes accumulate until a delimiter
//! arrives, then the whole frame is unstuffed into a second buffer. Malformed
//! or oversized frames are dropped silently and the decoder resyncs on the
//! next delimiter.

use crate::cobs;

/// Default size of the accumulation and decode buffers
pub const MAX_FRAME_SIZE: usize = 2048;

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No bytes since the last delimiter
    Idle,
    /// Collecting stuffed bytes until the next delimiter
    Accumulating { len: usize },
}

/// Frame decoder with fixed `N` byte buffers
pub struct FrameDecoder<const N: usize = MAX_FRAME_SIZE> {
    state: DecoderState,
    encoded: [u8; N],
    decoded: [u8; N],
    decoded_len: usize,
}

impl<const N: usize> FrameDecoder<N> {
    /// Create an idle decoder
    pub const fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            encoded: [0; N],
            decoded: [0; N],
            decoded_len: 0,
        }
    }

    /// Feed one byte from the stream.
    ///
    /// Returns `true` when the byte completed a frame; the frame is then
    /// available from [`frame`](Self::frame) until the next completed frame.
    pub fn process_byte(&mut self, byte: u8) -> bool {
        if byte == cobs::DELIMITER {
            let DecoderState::Accumulating { len } = self.state else {
                return false;
            };
            self.state = DecoderState::Idle;
            self.decoded_len = cobs::decode(&self.encoded[..len], &mut self.decoded);
            return self.decoded_len > 0;
        }

        let len = match self.state {
            DecoderState::Idle => 0,
            DecoderState::Accumulating { len } => len,
        };

        if len < N {
            self.encoded[len] = byte;
            self.state = DecoderState::Accumulating { len: len + 1 };
        } else {
            // Frame too large: drop what we have and keep accumulating, the
            // next delimiter resyncs
            self.state = DecoderState::Idle;
        }

        false
    }

    /// Last decoded frame
    pub fn frame(&self) -> &[u8] {
        &self.decoded[..self.decoded_len]
    }

    /// Current state
    pub const fn state(&self) -> DecoderState {
        self.state
    }

    /// Drop any partially received frame
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.decoded_len = 0;
    }
}

impl<const N: usize> Default for FrameDecoder<N> {
    fn default() -> Self {
        Self::new()
    }
}
