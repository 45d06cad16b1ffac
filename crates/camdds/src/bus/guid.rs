// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Entity GUID (Globally Unique Identifier).

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Entity ID assigned to the participant itself.
pub const ENTITY_ID_PARTICIPANT: [u8; 4] = [0x00, 0x00, 0x01, 0xC1];

/// 16-byte entity identifier.
///
/// # Structure
/// - Prefix: 12 bytes, unique per participant (process id + clock + counter)
/// - Entity ID: 4 bytes, unique per entity within a participant
///
/// # Display Format
/// Hex with dots: "00.00.30.39.5f.3a.10.c4.88.21.00.01.00.00.01.c1"
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Guid {
    pub prefix: [u8; 12],
    pub entity_id: [u8; 4],
}

impl Guid {
    /// Create a GUID from separate prefix and entity ID.
    pub fn new(prefix: [u8; 12], entity_id: [u8; 4]) -> Self {
        Self { prefix, entity_id }
    }

    /// Create a GUID from 16 raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut prefix = [0u8; 12];
        let mut entity_id = [0u8; 4];
        prefix.copy_from_slice(&bytes[0..12]);
        entity_id.copy_from_slice(&bytes[12..16]);
        Self { prefix, entity_id }
    }

    /// Convert to a 16-byte array.
    pub fn as_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..12].copy_from_slice(&self.prefix);
        bytes[12..16].copy_from_slice(&self.entity_id);
        bytes
    }

    /// All-zero GUID (invalid/placeholder).
    pub fn zero() -> Self {
        Self {
            prefix: [0; 12],
            entity_id: [0; 4],
        }
    }

    /// Check whether this is the all-zero GUID.
    pub fn is_zero(&self) -> bool {
        self.prefix.iter().all(|&b| b == 0) && self.entity_id.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.prefix.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        for byte in &self.entity_id {
            write!(f, ".{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

/// Build a fresh participant prefix.
///
/// Layout: process id (4 bytes) + wall-clock nanos (6 bytes) + process-wide
/// counter (2 bytes). The counter disambiguates participants created within
/// the same nanosecond tick.
pub(crate) fn fresh_prefix() -> [u8; 12] {
    static COUNTER: AtomicU16 = AtomicU16::new(0);

    let mut prefix = [0u8; 12];
    prefix[0..4].copy_from_slice(&std::process::id().to_be_bytes());

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    prefix[4..10].copy_from_slice(&nanos.to_be_bytes()[2..8]);

    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    prefix[10..12].copy_from_slice(&count.to_be_bytes());
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_roundtrip_bytes() {
        let orig = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let guid = Guid::from_bytes(orig);
        assert_eq!(guid.as_bytes(), orig);
    }

    #[test]
    fn test_guid_display() {
        let guid = Guid::new([1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1], [0, 0, 1, 193]);
        assert_eq!(
            format!("{}", guid),
            "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
        );
    }

    #[test]
    fn test_guid_zero() {
        assert!(Guid::zero().is_zero());
        let non_zero = Guid::new([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], [0, 0, 0, 0]);
        assert!(!non_zero.is_zero());
    }

    #[test]
    fn test_fresh_prefixes_differ() {
        let a = fresh_prefix();
        let b = fresh_prefix();
        assert_ne!(a, b);
    }
}
