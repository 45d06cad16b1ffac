// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Publisher entity - creates and manages DataWriter instances.
//!
//! Publisher and Subscriber are structurally near-identical on purpose:
//! callers expect the symmetric pair of factory entities, and the two sides
//! carry role-specific documentation and QoS defaults.

use std::sync::Arc;

use crate::bus::codec::BusData;
use crate::bus::listener::DataWriterListener;
use crate::bus::participant::ParticipantCore;
use crate::bus::qos::QoS;
use crate::bus::topic::Topic;
use crate::bus::writer::DataWriter;
use crate::Result;

/// Factory for [`DataWriter`] instances.
#[derive(Clone)]
pub struct Publisher {
    core: Arc<ParticipantCore>,
    qos: QoS,
}

impl Publisher {
    pub(crate) fn new(core: Arc<ParticipantCore>, qos: QoS) -> Self {
        Self { core, qos }
    }

    /// QoS this publisher was created with.
    pub fn qos(&self) -> &QoS {
        &self.qos
    }

    /// Create a writer on `topic` with its own QoS.
    pub fn create_writer<T: BusData>(&self, topic: &Topic<T>, qos: QoS) -> Result<DataWriter<T>> {
        DataWriter::create(Arc::clone(&self.core), topic, qos, None)
    }

    /// Create a writer with a listener attached from the start, so no
    /// match event can slip by before the caller wires one up.
    pub fn create_writer_with_listener<T: BusData>(
        &self,
        topic: &Topic<T>,
        qos: QoS,
        listener: Arc<dyn DataWriterListener>,
    ) -> Result<DataWriter<T>> {
        DataWriter::create(Arc::clone(&self.core), topic, qos, Some(listener))
    }
}
