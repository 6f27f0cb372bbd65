//! Packet Header
//!
//! Every message on the wire starts with a fixed 24-byte header carrying
//! the sender's avatar snapshot. Layout (little-endian, C-aligned):
//!
//! ```text
//!  0  px      u8      current tile x
//!  1  py      u8      current tile y
//!  2  targx   u8      walk target x
//!  3  targy   u8      walk target y
//!  4  hp      i32     current hit points
//!  8  max_hp  i32     maximum hit points
//! 12  str     u8      base strength
//! 13  mag     u8      base magic
//! 14  dex     u8      base dexterity
//! 15  -       pad
//! 16  magic   u32     HEADER_MAGIC
//! 20  len     u16     header + body length
//! 22  -       pad
//! ```

use thiserror::Error;

use crate::MAX_PEERS;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Check value every header must carry.
pub const HEADER_MAGIC: u32 = 0x0000_6970;

/// Largest packet the length field can describe.
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Tile coordinate as carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tile {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
}

impl Tile {
    /// Create a tile coordinate.
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// True if either axis differs by more than `limit`.
    #[inline]
    pub fn farther_than(self, other: Tile, limit: u8) -> bool {
        self.x.abs_diff(other.x) > limit || self.y.abs_diff(other.y) > limit
    }
}

/// Hit points and base attributes mirrored from a remote avatar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vitals {
    /// Current hit points.
    pub hit_points: i32,
    /// Maximum hit points.
    pub max_hit_points: i32,
    /// Base strength.
    pub strength: u8,
    /// Base magic.
    pub magic: u8,
    /// Base dexterity.
    pub dexterity: u8,
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHeader {
    /// Sender's current tile.
    pub position: Tile,
    /// Sender's walk target.
    pub target: Tile,
    /// Sender's vitals.
    pub vitals: Vitals,
    /// Check value, `HEADER_MAGIC` when well formed.
    pub magic: u32,
    /// Declared total length (header + body).
    pub len: u16,
}

/// Why an inbound packet was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// Fewer bytes than a header.
    #[error("packet too short: {actual} bytes")]
    TooShort {
        /// Bytes received.
        actual: usize,
    },

    /// Sender index outside the peer table.
    #[error("sender {sender} out of range")]
    SenderOutOfRange {
        /// Reported sender.
        sender: usize,
    },

    /// Check value mismatch.
    #[error("bad magic 0x{found:08X}")]
    BadMagic {
        /// Value found in the header.
        found: u32,
    },

    /// Declared length disagrees with the received length.
    #[error("declared length {declared} but received {actual}")]
    LengthMismatch {
        /// Length field.
        declared: u16,
        /// Bytes received.
        actual: usize,
    },

    /// Outgoing body does not fit the length field.
    #[error("packet of {len} bytes exceeds {MAX_PACKET_SIZE}")]
    TooLarge {
        /// Header + body length.
        len: usize,
    },
}

impl PacketHeader {
    /// Header describing `position`/`target`/`vitals`, length unset.
    pub fn new(position: Tile, target: Tile, vitals: Vitals) -> Self {
        Self {
            position,
            target,
            vitals,
            magic: HEADER_MAGIC,
            len: HEADER_SIZE as u16,
        }
    }

    /// Header with every avatar field zeroed, as used by chunked transfers.
    pub fn blank() -> Self {
        Self::new(Tile::default(), Tile::default(), Vitals::default())
    }

    /// Encode to the 24-byte wire layout.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.position.x;
        out[1] = self.position.y;
        out[2] = self.target.x;
        out[3] = self.target.y;
        out[4..8].copy_from_slice(&self.vitals.hit_points.to_le_bytes());
        out[8..12].copy_from_slice(&self.vitals.max_hit_points.to_le_bytes());
        out[12] = self.vitals.strength;
        out[13] = self.vitals.magic;
        out[14] = self.vitals.dexterity;
        out[16..20].copy_from_slice(&self.magic.to_le_bytes());
        out[20..22].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    /// Decode the first `HEADER_SIZE` bytes. Does not validate.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::TooShort { actual: bytes.len() });
        }
        let i32_at = |o: usize| i32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);

        Ok(Self {
            position: Tile::new(bytes[0], bytes[1]),
            target: Tile::new(bytes[2], bytes[3]),
            vitals: Vitals {
                hit_points: i32_at(4),
                max_hit_points: i32_at(8),
                strength: bytes[12],
                magic: bytes[13],
                dexterity: bytes[14],
            },
            magic: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
            len: u16::from_le_bytes([bytes[20], bytes[21]]),
        })
    }

    /// Check magic and declared length against what arrived.
    pub fn validate(&self, received: usize) -> Result<(), HeaderError> {
        if self.magic != HEADER_MAGIC {
            return Err(HeaderError::BadMagic { found: self.magic });
        }
        if self.len as usize != received {
            return Err(HeaderError::LengthMismatch {
                declared: self.len,
                actual: received,
            });
        }
        Ok(())
    }
}

/// Decode and fully validate an inbound packet from `sender`.
///
/// On success returns the header and the body that follows it.
pub fn parse_packet(sender: usize, bytes: &[u8]) -> Result<(PacketHeader, &[u8]), HeaderError> {
    if bytes.len() < HEADER_SIZE {
        return Err(HeaderError::TooShort { actual: bytes.len() });
    }
    if sender >= MAX_PEERS {
        return Err(HeaderError::SenderOutOfRange { sender });
    }
    let header = PacketHeader::decode(bytes)?;
    header.validate(bytes.len())?;
    Ok((header, &bytes[HEADER_SIZE..]))
}

/// Reject a body whose packet would not fit the length field.
pub fn check_body_len(body_len: usize) -> Result<u16, HeaderError> {
    let len = HEADER_SIZE.saturating_add(body_len);
    u16::try_from(len).map_err(|_| HeaderError::TooLarge { len })
}

/// Assemble header + body, filling in the length field.
pub fn build_packet(mut header: PacketHeader, body: &[u8]) -> Result<Vec<u8>, HeaderError> {
    header.len = check_body_len(body.len())?;
    let mut out = Vec::with_capacity(header.len as usize);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(body);
    Ok(out)
}

// =============================================================================
// TESTS
// =============================================================================
