//! Bounded frame queue shared between the receive and render contexts.
//!
//! Frames are stored back to back in a single byte ring, each prefixed by its
//! length as a big-endian `u16`. The ring sits behind a `critical-section`
//! mutex that is held only while bytes are copied in or out, never while a
//! frame is parsed or rendered.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;

/// Size of the length prefix in front of every entry
pub const LENGTH_HEADER_SIZE: usize = 2;

/// Error returned when a frame cannot be queued. The queue is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// Zero-length frames are never queued
    Empty,
    /// Frame is larger than the queue or than a `u16` length
    TooLarge,
    /// Not enough free space for the frame and its header
    Full,
}

/// Error returned when no frame can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// Fewer than two bytes are queued
    Empty,
    /// The length header was invalid; the queue has been reset
    Corrupted,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty frame"),
            Self::TooLarge => f.write_str("frame larger than queue"),
            Self::Full => f.write_str("queue full"),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("queue empty"),
            Self::Corrupted => f.write_str("corrupted entry, queue reset"),
        }
    }
}

/// Fixed-capacity, length-prefixed frame queue.
///
/// Intended for one producer and one consumer. Both sides only need a shared
/// reference.
pub struct FrameQueue<const N: usize> {
    inner: Mutex<RefCell<Deque<u8, N>>>,
}

impl<const N: usize> FrameQueue<N> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Append one frame.
    pub fn write(&self, payload: &[u8]) -> Result<(), WriteError> {
        if payload.is_empty() {
            return Err(WriteError::Empty);
        }
        if payload.len() > N {
            return Err(WriteError::TooLarge);
        }
        let Ok(len) = u16::try_from(payload.len()) else {
            return Err(WriteError::TooLarge);
        };

        critical_section::with(|cs| {
            let mut ring = self.inner.borrow_ref_mut(cs);
            if N - ring.len() < payload.len() + LENGTH_HEADER_SIZE {
                return Err(WriteError::Full);
            }
            for &byte in len.to_be_bytes().iter().chain(payload) {
                // Space was checked above
                let _ = ring.push_back(byte);
            }
            Ok(())
        })
    }

    /// Read the oldest frame into `out` and return its length.
    ///
    /// A header that declares zero bytes, more than `out` can hold, or more
    /// than is actually queued means the ring is out of sync. The whole queue
    /// is dropped in that case rather than trying to recover a boundary.
    pub fn read(&self, out: &mut [u8]) -> Result<usize, ReadError> {
        critical_section::with(|cs| {
            let mut ring = self.inner.borrow_ref_mut(cs);
            if ring.len() < LENGTH_HEADER_SIZE {
                return Err(ReadError::Empty);
            }

            let mut header = [0; LENGTH_HEADER_SIZE];
            pop_into(&mut ring, &mut header);
            let len = usize::from(u16::from_be_bytes(header));

            if len == 0 || len > out.len() || len > ring.len() {
                ring.clear();
                return Err(ReadError::Corrupted);
            }

            Ok(pop_into(&mut ring, &mut out[..len]))
        })
    }

    /// Free bytes, headers included
    pub fn available_space(&self) -> usize {
        critical_section::with(|cs| N - self.inner.borrow_ref(cs).len())
    }

    /// Check if at least one entry header is queued
    pub fn has_data(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len() >= LENGTH_HEADER_SIZE)
    }

    /// Queued bytes, headers included
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Share of the capacity in use, in percent
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_percent(&self) -> f32 {
        if N == 0 {
            return 0.0;
        }
        let used = self.len();
        (used as f32 * 100.0) / N as f32
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every queued frame
    pub fn clear(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).clear());
    }
}

impl<const N: usize> Default for FrameQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Move the oldest bytes of `ring` into `out`, returning how many were moved
fn pop_into<const N: usize>(ring: &mut Deque<u8, N>, out: &mut [u8]) -> usize {
    let mut copied = 0;
    for slot in out.iter_mut() {
        let Some(byte) = ring.pop_front() else {
            break;
        };
        *slot = byte;
        copied += 1;
    }
    copied
}
