//! DDP (Distributed Display Protocol) packets.
//!
//! Only what is needed to drive RGB strips is accepted: version 1 packets
//! with undefined (`0x00`, as sent by xLights) or RGB (`0x01`) data that fit
//! in a single frame.
//!
//! Header layout, multi-byte fields big-endian:
//!
//! | Byte | Field |
//! |---|---|
//! | 0 | flags (bits 7-6 version, bit 0 push) |
//! | 1 | sequence (low 4 bits) |
//! | 2 | data type |
//! | 3 | destination id |
//! | 4-7 | byte offset |
//! | 8-9 | payload length |

use core::fmt;

pub const HEADER_SIZE: usize = 10;
/// Largest accepted payload (480 RGB pixels)
pub const MAX_PAYLOAD_SIZE: usize = 1440;
pub const BYTES_PER_PIXEL: usize = 3;

/// Destination id addressing every channel
pub const ID_BROADCAST: u8 = 0;
/// Destination id of the first (or only) channel
pub const ID_DEFAULT: u8 = 1;

pub const VERSION_MASK: u8 = 0xC0;
pub const VERSION_1: u8 = 0x40;
pub const FLAG_TIMECODE: u8 = 0x10;
pub const FLAG_STORAGE: u8 = 0x08;
pub const FLAG_REPLY: u8 = 0x04;
pub const FLAG_QUERY: u8 = 0x02;
pub const FLAG_PUSH: u8 = 0x01;

pub const TYPE_UNDEFINED: u8 = 0x00;
pub const TYPE_RGB: u8 = 0x01;

const SEQUENCE_MASK: u8 = 0x0F;

/// Reason a frame is not a usable packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Shorter than the fixed header
    TooShort,
    /// Version bits are not `01`
    BadVersion(u8),
    UnsupportedDataType(u8),
    EmptyPayload,
    PayloadTooLarge(u16),
    /// Header declares more payload than the frame carries
    Truncated { declared: u16, available: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => f.write_str("shorter than header"),
            Self::BadVersion(flags) => write!(f, "bad version in flags 0x{:02X}", flags),
            Self::UnsupportedDataType(kind) => write!(f, "unsupported data type 0x{:02X}", kind),
            Self::EmptyPayload => f.write_str("empty payload"),
            Self::PayloadTooLarge(len) => write!(f, "payload of {} bytes too large", len),
            Self::Truncated {
                declared,
                available,
            } => write!(f, "declared {} bytes, got {}", declared, available),
        }
    }
}

/// Fixed 10-byte DDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: u8,
    pub sequence: u8,
    pub data_type: u8,
    pub destination: u8,
    /// Offset of the payload in bytes
    pub offset: u32,
    /// Payload length in bytes
    pub length: u16,
}

impl Header {
    /// Version 1 RGB header without the push flag
    pub const fn rgb(destination: u8, offset: u32, length: u16) -> Self {
        Self {
            flags: VERSION_1,
            sequence: 0,
            data_type: TYPE_RGB,
            destination,
            offset,
            length,
        }
    }

    /// Set the push flag
    #[must_use]
    pub const fn with_push(mut self) -> Self {
        self.flags |= FLAG_PUSH;
        self
    }

    /// Set the sequence number (low 4 bits are kept)
    #[must_use]
    pub const fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence & SEQUENCE_MASK;
        self
    }

    /// Read and validate a header from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let Some(bytes) = buf.first_chunk::<HEADER_SIZE>() else {
            return Err(ParseError::TooShort);
        };

        let header = Self {
            flags: bytes[0],
            sequence: bytes[1] & SEQUENCE_MASK,
            data_type: bytes[2],
            destination: bytes[3],
            offset: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            length: u16::from_be_bytes([bytes[8], bytes[9]]),
        };
        header.validate()?;

        Ok(header)
    }

    /// Check version, data type and payload length
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.flags & VERSION_MASK != VERSION_1 {
            return Err(ParseError::BadVersion(self.flags));
        }
        if self.data_type != TYPE_UNDEFINED && self.data_type != TYPE_RGB {
            return Err(ParseError::UnsupportedDataType(self.data_type));
        }
        if self.length == 0 {
            return Err(ParseError::EmptyPayload);
        }
        if usize::from(self.length) > MAX_PAYLOAD_SIZE {
            return Err(ParseError::PayloadTooLarge(self.length));
        }
        Ok(())
    }

    /// Wire representation
    pub const fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let offset = self.offset.to_be_bytes();
        let length = self.length.to_be_bytes();
        [
            self.flags,
            self.sequence,
            self.data_type,
            self.destination,
            offset[0],
            offset[1],
            offset[2],
            offset[3],
            length[0],
            length[1],
        ]
    }

    /// Check if the target should be flushed after this packet
    pub const fn push(&self) -> bool {
        self.flags & FLAG_PUSH != 0
    }

    pub const fn query(&self) -> bool {
        self.flags & FLAG_QUERY != 0
    }

    pub const fn reply(&self) -> bool {
        self.flags & FLAG_REPLY != 0
    }

    pub const fn timecode(&self) -> bool {
        self.flags & FLAG_TIMECODE != 0
    }

    pub const fn storage(&self) -> bool {
        self.flags & FLAG_STORAGE != 0
    }
}

/// Validated packet borrowing its payload from the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: Header,
    /// Exactly `header.length` bytes of RGB triplets
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Parse and validate a decoded frame.
    ///
    /// Bytes past the declared payload are ignored.
    pub fn parse(buf: &'a [u8]) -> Result<Self, ParseError> {
        let header = Header::parse(buf)?;
        let end = HEADER_SIZE + usize::from(header.length);
        let Some(payload) = buf.get(HEADER_SIZE..end) else {
            return Err(ParseError::Truncated {
                declared: header.length,
                available: buf.len() - HEADER_SIZE,
            });
        };

        Ok(Self { header, payload })
    }

    /// Number of whole RGB triplets in the payload
    pub const fn pixel_count(&self) -> usize {
        self.payload.len() / BYTES_PER_PIXEL
    }

    /// Index of the first pixel to write
    #[allow(clippy::cast_possible_truncation)]
    pub const fn start_pixel(&self) -> u32 {
        self.header.offset / BYTES_PER_PIXEL as u32
    }

    pub const fn destination(&self) -> u8 {
        self.header.destination
    }

    pub const fn push(&self) -> bool {
        self.header.push()
    }
}
