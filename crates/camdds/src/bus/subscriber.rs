// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Subscriber entity - creates and manages DataReader instances.

use std::sync::Arc;

use crate::bus::codec::BusData;
use crate::bus::listener::DataReaderListener;
use crate::bus::participant::ParticipantCore;
use crate::bus::qos::QoS;
use crate::bus::reader::DataReader;
use crate::bus::topic::Topic;
use crate::Result;

/// Factory for [`DataReader`] instances.
#[derive(Clone)]
pub struct Subscriber {
    core: Arc<ParticipantCore>,
    qos: QoS,
}

impl Subscriber {
    pub(crate) fn new(core: Arc<ParticipantCore>, qos: QoS) -> Self {
        Self { core, qos }
    }

    /// QoS this subscriber was created with.
    pub fn qos(&self) -> &QoS {
        &self.qos
    }

    /// Create a reader on `topic` with its own QoS.
    pub fn create_reader<T: BusData>(&self, topic: &Topic<T>, qos: QoS) -> Result<DataReader<T>> {
        DataReader::create(Arc::clone(&self.core), topic, qos, None)
    }

    /// Create a reader with a listener attached from the start.
    pub fn create_reader_with_listener<T: BusData>(
        &self,
        topic: &Topic<T>,
        qos: QoS,
        listener: Arc<dyn DataReaderListener<T>>,
    ) -> Result<DataReader<T>> {
        DataReader::create(Arc::clone(&self.core), topic, qos, Some(listener))
    }
}
