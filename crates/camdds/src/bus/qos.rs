// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Quality of Service policies.
//!
//! Scoped to the policies the device-info profile actually exercises:
//! reliability, durability, ownership and data sharing. Policies are carried
//! in discovery announcements and checked at match time; see
//! [`QoS::writer_compatible`] for the matching rule.

use crate::bus::codec::{Decoder, Encoder};
use crate::{Error, Result};

/// RELIABILITY policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    /// Delivery is retried/acknowledged where the transport allows it.
    Reliable,
    /// Fire-and-forget.
    BestEffort,
}

/// DURABILITY policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Samples exist only for readers matched at write time.
    Volatile,
    /// Writer keeps the last sample for late joiners.
    TransientLocal,
}

/// OWNERSHIP policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Any writer may update an instance.
    Shared,
    /// A single writer owns each instance.
    Exclusive,
}

/// DATA_SHARING policy.
///
/// Carried and announced but transport-inert here: the profile knob exists
/// so callers can pin it Off, which is what the device-info topic does to
/// keep delivery and the discovery handshake on one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSharing {
    Automatic,
    Off,
}

/// QoS profile for writers and readers.
///
/// # Examples
///
/// ```
/// use camdds::QoS;
///
/// let qos = camdds::QoS::reliable().volatile().exclusive().data_sharing_off();
/// assert_eq!(qos, QoS {
///     reliability: camdds::Reliability::Reliable,
///     durability: camdds::Durability::Volatile,
///     ownership: camdds::Ownership::Exclusive,
///     data_sharing: camdds::DataSharing::Off,
/// });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QoS {
    pub reliability: Reliability,
    pub durability: Durability,
    pub ownership: Ownership,
    pub data_sharing: DataSharing,
}

impl Default for QoS {
    fn default() -> Self {
        Self::best_effort()
    }
}

impl QoS {
    /// BestEffort baseline profile.
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            ownership: Ownership::Shared,
            data_sharing: DataSharing::Automatic,
        }
    }

    /// Reliable profile.
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            ..Self::best_effort()
        }
    }

    pub fn volatile(mut self) -> Self {
        self.durability = Durability::Volatile;
        self
    }

    pub fn transient_local(mut self) -> Self {
        self.durability = Durability::TransientLocal;
        self
    }

    pub fn shared(mut self) -> Self {
        self.ownership = Ownership::Shared;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.ownership = Ownership::Exclusive;
        self
    }

    pub fn data_sharing_off(mut self) -> Self {
        self.data_sharing = DataSharing::Off;
        self
    }

    pub fn data_sharing_automatic(mut self) -> Self {
        self.data_sharing = DataSharing::Automatic;
        self
    }

    /// Writer-to-reader compatibility.
    ///
    /// A BestEffort writer cannot satisfy a Reliable reader; every other
    /// combination matches.
    pub fn writer_compatible(writer: &QoS, reader: &QoS) -> bool {
        match (writer.reliability, reader.reliability) {
            (Reliability::BestEffort, Reliability::Reliable) => false,
            _ => true,
        }
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(match self.reliability {
            Reliability::Reliable => 0,
            Reliability::BestEffort => 1,
        });
        enc.put_u8(match self.durability {
            Durability::Volatile => 0,
            Durability::TransientLocal => 1,
        });
        enc.put_u8(match self.ownership {
            Ownership::Shared => 0,
            Ownership::Exclusive => 1,
        });
        enc.put_u8(match self.data_sharing {
            DataSharing::Automatic => 0,
            DataSharing::Off => 1,
        });
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let reliability = match dec.get_u8()? {
            0 => Reliability::Reliable,
            1 => Reliability::BestEffort,
            n => return Err(Error::Decode(format!("unknown reliability kind {}", n))),
        };
        let durability = match dec.get_u8()? {
            0 => Durability::Volatile,
            1 => Durability::TransientLocal,
            n => return Err(Error::Decode(format!("unknown durability kind {}", n))),
        };
        let ownership = match dec.get_u8()? {
            0 => Ownership::Shared,
            1 => Ownership::Exclusive,
            n => return Err(Error::Decode(format!("unknown ownership kind {}", n))),
        };
        let data_sharing = match dec.get_u8()? {
            0 => DataSharing::Automatic,
            1 => DataSharing::Off,
            n => return Err(Error::Decode(format!("unknown data-sharing kind {}", n))),
        };
        Ok(Self {
            reliability,
            durability,
            ownership,
            data_sharing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let qos = QoS::reliable().volatile().exclusive().data_sharing_off();
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.durability, Durability::Volatile);
        assert_eq!(qos.ownership, Ownership::Exclusive);
        assert_eq!(qos.data_sharing, DataSharing::Off);
    }

    #[test]
    fn test_compatibility_matrix() {
        let rel = QoS::reliable();
        let be = QoS::best_effort();

        assert!(QoS::writer_compatible(&rel, &rel));
        assert!(QoS::writer_compatible(&rel, &be));
        assert!(QoS::writer_compatible(&be, &be));
        assert!(!QoS::writer_compatible(&be, &rel));
    }

    #[test]
    fn test_wire_roundtrip() {
        let qos = QoS::reliable().transient_local().exclusive().data_sharing_off();
        let mut enc = Encoder::new();
        qos.encode(&mut enc);
        let buf = enc.into_vec();

        let mut dec = Decoder::new(&buf);
        assert_eq!(QoS::decode(&mut dec).unwrap(), qos);
    }

    #[test]
    fn test_wire_rejects_unknown_kind() {
        let buf = [9u8, 0, 0, 0];
        let mut dec = Decoder::new(&buf);
        assert!(matches!(QoS::decode(&mut dec), Err(Error::Decode(_))));
    }
}
