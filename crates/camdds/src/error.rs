// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Error type for all camdds operations.

use std::fmt;
use std::io;

/// Errors returned by camdds operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration / entity errors
    // ========================================================================
    /// Domain ID out of range (0-232).
    InvalidDomainId(u32),
    /// Topic name rejected (empty or malformed).
    InvalidTopic(String),
    /// Operation requires state the entity is not in (e.g. `run()` twice).
    InvalidState(&'static str),

    // ========================================================================
    // Transport errors
    // ========================================================================
    /// I/O error with underlying cause.
    Io(io::Error),
    /// Failed to bind a discovery or data socket.
    BindFailed(String),
    /// Failed to join the discovery multicast group.
    MulticastJoinFailed(String),
    /// Datagram send failed.
    SendFailed(String),

    // ========================================================================
    // Data errors
    // ========================================================================
    /// Wire frame failed to decode (truncated, bad magic, bad UTF-8, ...).
    Decode(String),
    /// A string field exceeds its fixed wire capacity.
    ///
    /// Oversized fields are rejected outright rather than silently
    /// truncated, so a device never goes on the wire with mangled identity.
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    /// Device info rejected before encoding (e.g. empty serial number).
    InvalidDeviceInfo(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidDomainId(id) => {
                write!(f, "Invalid domain_id: {} (must be 0-232)", id)
            }
            Error::InvalidTopic(name) => write!(f, "Invalid topic: {:?}", name),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            Error::MulticastJoinFailed(msg) => write!(f, "Multicast join failed: {}", msg),
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            Error::Decode(msg) => write!(f, "Decode failed: {}", msg),
            Error::FieldTooLong { field, len, max } => {
                write!(
                    f,
                    "Field '{}' too long: {} bytes (max {})",
                    field, len, max
                )
            }
            Error::InvalidDeviceInfo(msg) => write!(f, "Invalid device info: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
