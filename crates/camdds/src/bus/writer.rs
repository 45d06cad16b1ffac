// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Typed data writer.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use crate::bus::codec::{BusData, Encoder};
use crate::bus::discovery::EndpointAd;
use crate::bus::guid::Guid;
use crate::bus::listener::{DataWriterListener, PublicationMatchedStatus};
use crate::bus::participant::ParticipantCore;
use crate::bus::qos::QoS;
use crate::bus::registry::{
    EndpointEntry, EndpointKind, MatchHook, MatchKey, ReaderPath, RegistrationToken,
};
use crate::bus::topic::Topic;
use crate::{Error, Result};

/// Match bookkeeping shared with the registry hook.
struct WriterShared {
    total: AtomicU32,
    current: AtomicI32,
    listener: Option<Arc<dyn DataWriterListener>>,
}

impl WriterShared {
    fn on_match(&self, delta: i32, other: Guid) {
        let current = self.current.fetch_add(delta, Ordering::SeqCst) + delta;
        let total = if delta > 0 {
            self.total.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.total.load(Ordering::SeqCst)
        };
        if let Some(listener) = &self.listener {
            listener.on_publication_matched(PublicationMatchedStatus {
                total_count: total,
                current_count: current.max(0) as u32,
                current_count_change: delta,
                last_subscription: Some(other),
            });
        }
    }
}

/// Publishes typed samples to one topic.
///
/// `write` resolves the currently-matched reader set at call time and
/// delivers to every member: local readers through their in-process
/// channel, remote readers as a datagram to their advertised data socket.
/// Dropping the writer unregisters it, which unmatches (and notifies) every
/// matched reader.
pub struct DataWriter<T: BusData> {
    guid: Guid,
    key: MatchKey,
    qos: QoS,
    core: Arc<ParticipantCore>,
    shared: Arc<WriterShared>,
    _registration: RegistrationToken,
    _marker: PhantomData<fn(&T)>,
}

impl<T: BusData> DataWriter<T> {
    pub(crate) fn create(
        core: Arc<ParticipantCore>,
        topic: &Topic<T>,
        qos: QoS,
        listener: Option<Arc<dyn DataWriterListener>>,
    ) -> Result<Self> {
        let guid = core.next_entity_guid();
        let key = MatchKey::new(topic.name(), topic.type_name());

        let shared = Arc::new(WriterShared {
            total: AtomicU32::new(0),
            current: AtomicI32::new(0),
            listener,
        });
        let hook: MatchHook = {
            let shared = Arc::clone(&shared);
            Arc::new(move |delta, other| shared.on_match(delta, other))
        };

        let registration = core.domain.register(
            key.clone(),
            EndpointEntry {
                guid,
                kind: EndpointKind::Writer,
                qos,
                on_match: Some(hook),
                local_reader: None,
                remote_addr: None,
            },
        );
        core.inventory_add(EndpointAd {
            guid,
            kind: EndpointKind::Writer,
            topic_name: topic.name().to_string(),
            type_name: topic.type_name().to_string(),
            qos,
        });

        log::debug!("[writer] {} created on '{}'", guid, topic.name());
        Ok(Self {
            guid,
            key,
            qos,
            core,
            shared,
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

    /// Number of currently matched readers.
    pub fn matched_count(&self) -> u32 {
        self.shared.current.load(Ordering::SeqCst).max(0) as u32
    }

    /// Publish one sample to every matched reader.
    ///
    /// Writing with no matched readers succeeds (and delivers nothing).
    /// Partial delivery failures are logged; the call errs only when every
    /// matched reader failed to accept the sample.
    pub fn write(&self, sample: &T) -> Result<()> {
        let mut enc = Encoder::new();
        sample.encode(&mut enc)?;
        let payload: Arc<[u8]> = enc.into_vec().into();

        let paths = self.core.domain.reader_paths(&self.key, &self.qos);
        if paths.is_empty() {
            log::debug!(
                "[writer] {} wrote on '{}' with no matched readers",
                self.guid,
                self.key.topic_name
            );
            return Ok(());
        }

        let mut delivered = 0usize;
        let mut failed = 0usize;
        for path in paths {
            match path {
                ReaderPath::Local(slot) => {
                    if slot.sender.send(Arc::clone(&payload)).is_ok() {
                        if let Some(on_data) = &slot.on_data {
                            on_data(&payload);
                        }
                        delivered += 1;
                    } else {
                        failed += 1;
                    }
                }
                ReaderPath::Remote(addr) => {
                    match self.core.send_remote(&self.key, self.guid, &payload, addr) {
                        Ok(()) => delivered += 1,
                        Err(e) => {
                            log::warn!(
                                "[writer] {} remote delivery to {} failed: {}",
                                self.guid,
                                addr,
                                e
                            );
                            failed += 1;
                        }
                    }
                }
            }
        }

        if delivered == 0 && failed > 0 {
            return Err(Error::SendFailed(format!(
                "no delivery succeeded on '{}' ({} matched reader(s))",
                self.key.topic_name, failed
            )));
        }
        Ok(())
    }
}

impl<T: BusData> Drop for DataWriter<T> {
    fn drop(&mut self) {
        self.core.inventory_remove(self.guid);
        log::debug!("[writer] {} on '{}' deleted", self.guid, self.key.topic_name);
    }
}
