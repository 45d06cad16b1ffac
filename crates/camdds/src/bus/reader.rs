// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Typed data reader.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::bus::codec::{BusData, Decoder};
use crate::bus::discovery::EndpointAd;
use crate::bus::guid::Guid;
use crate::bus::listener::{DataReaderListener, SubscriptionMatchedStatus};
use crate::bus::participant::ParticipantCore;
use crate::bus::qos::QoS;
use crate::bus::registry::{
    DataHook, EndpointEntry, EndpointKind, LocalReaderSlot, MatchHook, MatchKey,
    RegistrationToken,
};
use crate::bus::topic::Topic;
use crate::Result;

#[derive(Default)]
struct ReaderState {
    total: AtomicU32,
    current: AtomicI32,
}

/// Receives typed samples from one topic.
///
/// Samples arrive in an unbounded inbox; consume them with [`try_take`] or
/// [`take_timeout`]. A listener, when supplied at creation, additionally
/// gets `on_data_available` invoked on the delivering thread.
///
/// [`try_take`]: DataReader::try_take
/// [`take_timeout`]: DataReader::take_timeout
pub struct DataReader<T: BusData> {
    guid: Guid,
    key: MatchKey,
    qos: QoS,
    core: Arc<ParticipantCore>,
    inbox: Receiver<Arc<[u8]>>,
    state: Arc<ReaderState>,
    _registration: RegistrationToken,
    _marker: PhantomData<fn() -> T>,
}

impl<T: BusData> DataReader<T> {
    pub(crate) fn create(
        core: Arc<ParticipantCore>,
        topic: &Topic<T>,
        qos: QoS,
        listener: Option<Arc<dyn DataReaderListener<T>>>,
    ) -> Result<Self> {
        let guid = core.next_entity_guid();
        let key = MatchKey::new(topic.name(), topic.type_name());
        let (sender, inbox) = crossbeam::channel::unbounded();

        let state = Arc::new(ReaderState::default());
        let hook: MatchHook = {
            let state = Arc::clone(&state);
            let listener = listener.clone();
            Arc::new(move |delta, other| {
                let current = state.current.fetch_add(delta, Ordering::SeqCst) + delta;
                let total = if delta > 0 {
                    state.total.fetch_add(1, Ordering::SeqCst) + 1
                } else {
                    state.total.load(Ordering::SeqCst)
                };
                if let Some(listener) = &listener {
                    listener.on_subscription_matched(SubscriptionMatchedStatus {
                        total_count: total,
                        current_count: current.max(0) as u32,
                        current_count_change: delta,
                        last_publication: Some(other),
                    });
                }
            })
        };

        let on_data: Option<DataHook> = listener.map(|listener| {
            let hook: DataHook = Arc::new(move |bytes: &[u8]| {
                let mut dec = Decoder::new(bytes);
                match T::decode(&mut dec) {
                    Ok(sample) => listener.on_data_available(&sample),
                    Err(e) => log::warn!("[reader] dropping undecodable sample: {}", e),
                }
            });
            hook
        });

        let registration = core.domain.register(
            key.clone(),
            EndpointEntry {
                guid,
                kind: EndpointKind::Reader,
                qos,
                on_match: Some(hook),
                local_reader: Some(LocalReaderSlot { sender, on_data }),
                remote_addr: None,
            },
        );
        core.inventory_add(EndpointAd {
            guid,
            kind: EndpointKind::Reader,
            topic_name: topic.name().to_string(),
            type_name: topic.type_name().to_string(),
            qos,
        });

        log::debug!("[reader] {} created on '{}'", guid, topic.name());
        Ok(Self {
            guid,
            key,
            qos,
            core,
            inbox,
            state,
            _registration: registration,
            _marker: PhantomData,
        })
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn topic_name(&self) -> &str {
        &self.key.topic_name
    }

    pub fn qos(&self) -> &QoS {
        &self.qos
    }

    /// Number of currently matched writers.
    pub fn matched_count(&self) -> u32 {
        self.state.current.load(Ordering::SeqCst).max(0) as u32
    }

    /// Take the next pending sample, if any.
    pub fn try_take(&self) -> Result<Option<T>> {
        match self.inbox.try_recv() {
            Ok(buf) => {
                let mut dec = Decoder::new(&buf);
                Ok(Some(T::decode(&mut dec)?))
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    /// Block up to `timeout` for the next sample.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        match self.inbox.recv_timeout(timeout) {
            Ok(buf) => {
                let mut dec = Decoder::new(&buf);
                Ok(Some(T::decode(&mut dec)?))
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

impl<T: BusData> Drop for DataReader<T> {
    fn drop(&mut self) {
        self.core.inventory_remove(self.guid);
        log::debug!("[reader] {} on '{}' deleted", self.guid, self.key.topic_name);
    }
}
