// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! # camdds - camera device broadcasting over a DDS-style bus
//!
//! Publishes the identity of locally-connected depth cameras (name, serial,
//! product line, lock state) into a network-visible topic space, and keeps
//! that publication correct in the face of the classic discovery race:
//! subscribers that join *after* a device was announced still receive its
//! info, because every newly-matched reader re-triggers an idempotent send.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        broadcast layer                             |
//! |  DeviceBroadcaster -> Dispatcher (1 worker) -> writer per device   |
//! |         ^                    ^                                     |
//! |  device add/remove    new-subscriber waiter (condvar)              |
//! +--------------------------------------------------------------------+
//! |                            bus layer                               |
//! |  Participant -> Publisher/Subscriber -> DataWriter/DataReader      |
//! |  registry matching (intra-process) | UDP discovery (cross-process) |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use camdds::{DeviceBroadcaster, Participant, StaticDevice, TransportMode};
//!
//! fn main() -> camdds::Result<()> {
//!     let participant = Participant::builder("camdds-server")
//!         .domain_id(0)
//!         .with_transport(TransportMode::UdpDiscovery)
//!         .build()?;
//!
//!     let broadcaster = DeviceBroadcaster::new(participant);
//!     broadcaster.run()?;
//!
//!     let d435 = StaticDevice::new("Intel RealSense D435", "123456789", "D400", false);
//!     broadcaster.add_device(Arc::new(d435));
//!     Ok(())
//! }
//! ```

/// Device discovery broadcasting (the application layer).
pub mod broadcast;
/// Pub/sub bus: participants, topics, writers/readers, discovery.
pub mod bus;

mod error;

pub use broadcast::{
    topic_root_for, DeviceBroadcaster, DeviceInfo, DeviceSource, Dispatcher, StaticDevice,
    DEVICE_INFO_TOPIC, DEVICE_NAME_PREFIX,
};
pub use bus::{
    BusData, DataReader, DataReaderListener, DataSharing, DataWriter, DataWriterListener,
    Decoder, Durability, Encoder, Guid, Ownership, Participant, ParticipantBuilder,
    ParticipantListener, Publisher, PublicationMatchedStatus, QoS, Reliability, Subscriber,
    SubscriptionMatchedStatus, Topic, TransportMode,
};
pub use error::{Error, Result};
