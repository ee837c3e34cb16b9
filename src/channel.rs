//! Destination id routing table.
//!
//! Every channel pairs a DDP destination id with one LED output. Pixel
//! ranges never overlap because every channel owns its own output.

use core::fmt;

use heapless::Vec;

use crate::ddp::{ID_BROADCAST, ID_DEFAULT};
use crate::{LedOutput, Rgb};

/// Error returned when a channel cannot be added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Id 0 addresses every channel and cannot be assigned
    ReservedId,
    DuplicateId(u8),
    TableFull,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedId => f.write_str("destination id 0 is reserved for broadcast"),
            Self::DuplicateId(id) => write!(f, "destination id {} already configured", id),
            Self::TableFull => f.write_str("channel table full"),
        }
    }
}

/// One configured destination
#[derive(Debug)]
pub struct Channel<O> {
    id: u8,
    output: O,
}

impl<O: LedOutput> Channel<O> {
    pub const fn id(&self) -> u8 {
        self.id
    }

    pub fn pixel_count(&self) -> usize {
        self.output.pixel_count()
    }

    pub const fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

/// Ordered table of up to `N` channels keyed by destination id
#[derive(Debug)]
pub struct ChannelTable<O, const N: usize> {
    channels: Vec<Channel<O>, N>,
}

impl<O: LedOutput, const N: usize> ChannelTable<O, N> {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Table with a single output on the default destination id.
    ///
    /// `N` must be at least 1; a zero-capacity table fails to compile here.
    pub fn single(output: O) -> Self {
        const { assert!(N > 0, "channel table needs room for one output") };
        let mut table = Self::new();
        // Empty table with free room and a non-broadcast id, cannot fail
        let _ = table.add(ID_DEFAULT, output);
        table
    }

    /// Add an output for destination `id`
    pub fn add(&mut self, id: u8, output: O) -> Result<(), ChannelError> {
        if id == ID_BROADCAST {
            return Err(ChannelError::ReservedId);
        }
        if self.get(id).is_some() {
            return Err(ChannelError::DuplicateId(id));
        }
        self.channels
            .push(Channel { id, output })
            .map_err(|_| ChannelError::TableFull)
    }

    pub fn get(&self, id: u8) -> Option<&Channel<O>> {
        self.channels.iter().find(|channel| channel.id == id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Channel<O>> {
        self.channels.iter_mut().find(|channel| channel.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel<O>> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel<O>> {
        self.channels.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Paint every channel with `color` and flush it
    pub fn fill(&mut self, color: Rgb) {
        for channel in &mut self.channels {
            channel.output.fill(color);
            channel.output.flush();
        }
    }
}

impl<O: LedOutput, const N: usize> Default for ChannelTable<O, N> {
    fn default() -> Self {
        Self::new()
    }
}
