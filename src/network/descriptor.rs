//! Game Descriptor
//!
//! Session parameters announced by the creating peer. The descriptor is
//! bincode-encoded and carries its own encoded size; a mismatch means the
//! peers were built from incompatible versions and the session cannot start.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Program identifier every compatible build shares.
pub const PROGRAM_ID: u32 = 0x4C4B_5354;

/// Session parameters shared at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDescriptor {
    /// Encoded size of this struct; filled by `encode`.
    pub size: u32,
    /// Session random seed (level generation lives with the simulation).
    pub seed: u32,
    /// Build family.
    pub program_id: u32,
    /// Major version.
    pub version_major: u8,
    /// Minor version.
    pub version_minor: u8,
    /// Patch version.
    pub version_patch: u8,
    /// Simulation ticks per second.
    pub tick_rate: u8,
    /// Gameplay toggles forwarded to the simulation.
    pub flags: u8,
}

/// Descriptor decode failures.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Payload could not be decoded.
    #[error("malformed descriptor: {0}")]
    Malformed(#[from] bincode::Error),

    /// Declared size disagrees with the encoded size.
    #[error("invalid size of game data: {declared} (expected {expected})")]
    InvalidSize {
        /// Size field.
        declared: u32,
        /// Size this build encodes.
        expected: u32,
    },

    /// Program id or version differs from ours.
    #[error("incompatible peer build {major}.{minor}.{patch} (program 0x{program_id:08X})")]
    Incompatible {
        /// Peer's program id.
        program_id: u32,
        /// Peer's major version.
        major: u8,
        /// Peer's minor version.
        minor: u8,
        /// Peer's patch version.
        patch: u8,
    },
}

impl Default for GameDescriptor {
    fn default() -> Self {
        Self {
            size: 0,
            seed: 0,
            program_id: PROGRAM_ID,
            version_major: 0,
            version_minor: 1,
            version_patch: 0,
            tick_rate: 20,
            flags: 0,
        }
    }
}

impl GameDescriptor {
    /// Descriptor for this build with the given seed and tick rate.
    pub fn new(seed: u32, tick_rate: u8) -> Self {
        let (major, minor, patch) = crate_version();
        Self {
            seed,
            tick_rate,
            version_major: major,
            version_minor: minor,
            version_patch: patch,
            ..Self::default()
        }
    }

    /// Encoded size every descriptor must declare.
    pub fn encoded_size() -> u32 {
        bincode::serialized_size(&Self::default()).unwrap_or(0) as u32
    }

    /// Encode, stamping the size field.
    pub fn encode(&self) -> Result<Vec<u8>, DescriptorError> {
        let stamped = Self {
            size: Self::encoded_size(),
            ..*self
        };
        Ok(bincode::serialize(&stamped)?)
    }

    /// Decode and check the declared size.
    pub fn decode(data: &[u8]) -> Result<Self, DescriptorError> {
        let descriptor: Self = bincode::deserialize(data)?;
        let expected = Self::encoded_size();
        if descriptor.size != expected || data.len() != expected as usize {
            return Err(DescriptorError::InvalidSize {
                declared: descriptor.size,
                expected,
            });
        }
        Ok(descriptor)
    }

    /// Check that a peer's descriptor comes from a compatible build.
    pub fn check_compatible(&self, local: &GameDescriptor) -> Result<(), DescriptorError> {
        let same = self.program_id == local.program_id
            && self.version_major == local.version_major
            && self.version_minor == local.version_minor
            && self.version_patch == local.version_patch;
        if same {
            Ok(())
        } else {
            Err(DescriptorError::Incompatible {
                program_id: self.program_id,
                major: self.version_major,
                minor: self.version_minor,
                patch: self.version_patch,
            })
        }
    }

    /// Milliseconds per simulation tick.
    pub fn tick_delay_ms(&self) -> u32 {
        1000 / u32::from(self.tick_rate.max(1))
    }
}

fn crate_version() -> (u8, u8, u8) {
    let parse = |s: &str| s.parse::<u8>().unwrap_or(0);
    (
        parse(env!("CARGO_PKG_VERSION_MAJOR")),
        parse(env!("CARGO_PKG_VERSION_MINOR")),
        parse(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let descriptor = GameDescriptor::new(0xDEAD_BEEF, 20);
        let bytes = descriptor.encode().unwrap();
        let decoded = GameDescriptor::decode(&bytes).unwrap();
        assert_eq!(decoded.seed, 0xDEAD_BEEF);
        assert_eq!(decoded.size, GameDescriptor::encoded_size());
        assert!(decoded.check_compatible(&descriptor).is_ok());
    }

    #[test]
    fn test_rejects_wrong_size_field() {
        let descriptor = GameDescriptor {
            size: 3,
            ..GameDescriptor::new(1, 20)
        };
        let bytes = bincode::serialize(&descriptor).unwrap();
        assert!(matches!(
            GameDescriptor::decode(&bytes),
            Err(DescriptorError::InvalidSize { declared: 3, .. })
        ));
    }

    #[test]
    fn test_rejects_truncated() {
        let bytes = GameDescriptor::new(1, 20).encode().unwrap();
        assert!(GameDescriptor::decode(&bytes[..4]).is_err());
    }

    #[test]
    fn test_rejects_other_version() {
        let local = GameDescriptor::new(1, 20);
        let peer = GameDescriptor {
            version_major: local.version_major.wrapping_add(1),
            ..local
        };
        assert!(matches!(
            peer.check_compatible(&local),
            Err(DescriptorError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_tick_delay() {
        assert_eq!(GameDescriptor::new(0, 20).tick_delay_ms(), 50);
        assert_eq!(GameDescriptor::new(0, 0).tick_delay_ms(), 1000);
    }
}
