// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Per-domain endpoint registry and matching.
//!
//! One `DomainState` exists per (process, domain id), held weakly by the
//! process-global registry and strongly by every participant in that domain.
//! Writers and readers register under a `(topic, type)` key; registering
//! either side notifies the compatible other side with a `+1` delta, and
//! deregistration (token drop) notifies survivors with `-1`. Remote
//! endpoints discovered over UDP are mirrored in as proxy entries so that
//! matching is uniform regardless of where the peer lives.
//!
//! Match hooks fire *after* the endpoint table lock is released, so a hook
//! may call back into the bus without deadlocking.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use crossbeam::channel::Sender;
use parking_lot::{Mutex, RwLock};

use crate::bus::guid::Guid;
use crate::bus::qos::QoS;

pub(crate) type DomainId = u32;

/// Match notification hook: `(current_count_change, other_endpoint_guid)`.
pub(crate) type MatchHook = Arc<dyn Fn(i32, Guid) + Send + Sync>;

/// Type-erased data delivery hook for listener-equipped readers.
pub(crate) type DataHook = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Endpoints match when topic name and type name both agree.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct MatchKey {
    pub topic_name: Arc<str>,
    pub type_name: Arc<str>,
}

impl MatchKey {
    pub fn new(topic_name: &str, type_name: &str) -> Self {
        Self {
            topic_name: Arc::from(topic_name),
            type_name: Arc::from(type_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointKind {
    Reader,
    Writer,
}

/// In-process delivery slot for a local reader.
#[derive(Clone)]
pub(crate) struct LocalReaderSlot {
    pub sender: Sender<Arc<[u8]>>,
    pub on_data: Option<DataHook>,
}

/// One registered endpoint: a local writer/reader or a remote proxy.
pub(crate) struct EndpointEntry {
    pub guid: Guid,
    pub kind: EndpointKind,
    pub qos: QoS,
    /// Match callback; `None` for remote proxies.
    pub on_match: Option<MatchHook>,
    /// Delivery slot; `Some` only for local readers.
    pub local_reader: Option<LocalReaderSlot>,
    /// Remote data address; `Some` only for remote reader proxies.
    pub remote_addr: Option<SocketAddr>,
}

/// Delivery path a writer resolves at send time.
pub(crate) enum ReaderPath {
    Local(LocalReaderSlot),
    Remote(SocketAddr),
}

/// Token returned on registration; unregisters the endpoint when dropped.
pub(crate) struct RegistrationToken {
    domain: Weak<DomainState>,
    key: MatchKey,
    guid: Guid,
}

impl Drop for RegistrationToken {
    fn drop(&mut self) {
        if let Some(domain) = self.domain.upgrade() {
            domain.unregister(&self.key, self.guid);
        }
    }
}

/// All endpoints of one domain within this process.
pub(crate) struct DomainState {
    domain_id: DomainId,
    endpoints: RwLock<HashMap<MatchKey, Vec<EndpointEntry>>>,
}

/// True when `writer` can deliver to `reader`, honouring each side's role.
fn compatible(writer: &QoS, reader: &QoS) -> bool {
    QoS::writer_compatible(writer, reader)
}

impl DomainState {
    pub fn new(domain_id: DomainId) -> Self {
        Self {
            domain_id,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    /// Register an endpoint and notify both sides of any new matches.
    pub fn register(self: &Arc<Self>, key: MatchKey, entry: EndpointEntry) -> RegistrationToken {
        let entry_guid = entry.guid;
        let mut fires: Vec<(MatchHook, i32, Guid)> = Vec::new();
        {
            let mut endpoints = self.endpoints.write();
            let entries = endpoints.entry(key.clone()).or_default();

            for existing in entries.iter() {
                if existing.kind == entry.kind {
                    continue;
                }
                let matched = match entry.kind {
                    EndpointKind::Writer => compatible(&entry.qos, &existing.qos),
                    EndpointKind::Reader => compatible(&existing.qos, &entry.qos),
                };
                if !matched {
                    log::debug!(
                        "[registry] domain {}: skipping bind on '{}', QoS incompatible ({} vs {})",
                        self.domain_id,
                        key.topic_name,
                        entry.guid,
                        existing.guid
                    );
                    continue;
                }
                if let Some(hook) = &existing.on_match {
                    fires.push((Arc::clone(hook), 1, entry.guid));
                }
                if let Some(hook) = &entry.on_match {
                    fires.push((Arc::clone(hook), 1, existing.guid));
                }
            }

            log::debug!(
                "[registry] domain {}: registered {:?} {} on '{}'",
                self.domain_id,
                entry.kind,
                entry.guid,
                key.topic_name
            );
            entries.push(entry);
        }

        for (hook, delta, other) in fires {
            hook(delta, other);
        }

        RegistrationToken {
            domain: Arc::downgrade(self),
            key,
            guid: entry_guid,
        }
    }

    fn unregister(&self, key: &MatchKey, guid: Guid) {
        let mut fires: Vec<(MatchHook, i32, Guid)> = Vec::new();
        {
            let mut endpoints = self.endpoints.write();
            let Some(entries) = endpoints.get_mut(key) else {
                return;
            };
            let Some(pos) = entries.iter().position(|e| e.guid == guid) else {
                return;
            };
            let removed = entries.remove(pos);

            for survivor in entries.iter() {
                if survivor.kind == removed.kind {
                    continue;
                }
                let matched = match removed.kind {
                    EndpointKind::Writer => compatible(&removed.qos, &survivor.qos),
                    EndpointKind::Reader => compatible(&survivor.qos, &removed.qos),
                };
                if matched {
                    if let Some(hook) = &survivor.on_match {
                        fires.push((Arc::clone(hook), -1, removed.guid));
                    }
                }
            }

            if entries.is_empty() {
                endpoints.remove(key);
            }
            log::debug!(
                "[registry] domain {}: unregistered {} from '{}'",
                self.domain_id,
                guid,
                key.topic_name
            );
        }

        for (hook, delta, other) in fires {
            hook(delta, other);
        }
    }

    /// Delivery paths of every reader currently compatible with `writer_qos`.
    pub fn reader_paths(&self, key: &MatchKey, writer_qos: &QoS) -> Vec<ReaderPath> {
        let endpoints = self.endpoints.read();
        let Some(entries) = endpoints.get(key) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|e| e.kind == EndpointKind::Reader && compatible(writer_qos, &e.qos))
            .filter_map(|e| {
                if let Some(slot) = &e.local_reader {
                    Some(ReaderPath::Local(slot.clone()))
                } else {
                    e.remote_addr.map(ReaderPath::Remote)
                }
            })
            .collect()
    }

    /// Route a payload received from a remote writer to local readers.
    ///
    /// The writer must have been mirrored in as a proxy already; data from a
    /// writer we have not discovered yet is dropped (the sender's
    /// application-level re-send protocol covers this window).
    pub fn deliver_from_remote(&self, key: &MatchKey, writer_guid: Guid, payload: &[u8]) {
        let slots: Vec<LocalReaderSlot> = {
            let endpoints = self.endpoints.read();
            let Some(entries) = endpoints.get(key) else {
                log::debug!(
                    "[registry] domain {}: data on unknown topic '{}', dropped",
                    self.domain_id,
                    key.topic_name
                );
                return;
            };
            let Some(writer) = entries
                .iter()
                .find(|e| e.kind == EndpointKind::Writer && e.guid == writer_guid)
            else {
                log::debug!(
                    "[registry] domain {}: data from undiscovered writer {}, dropped",
                    self.domain_id,
                    writer_guid
                );
                return;
            };
            entries
                .iter()
                .filter(|e| {
                    e.kind == EndpointKind::Reader
                        && e.local_reader.is_some()
                        && compatible(&writer.qos, &e.qos)
                })
                .filter_map(|e| e.local_reader.clone())
                .collect()
        };

        if slots.is_empty() {
            return;
        }
        let shared: Arc<[u8]> = Arc::from(payload);
        for slot in slots {
            let _ = slot.sender.send(Arc::clone(&shared));
            if let Some(on_data) = &slot.on_data {
                on_data(&shared);
            }
        }
    }

    #[cfg(test)]
    fn endpoint_count(&self, key: &MatchKey) -> usize {
        self.endpoints.read().get(key).map_or(0, Vec::len)
    }
}

/// Process-global registry of domain states.
pub(crate) struct DomainRegistry {
    domains: Mutex<HashMap<DomainId, Weak<DomainState>>>,
}

impl DomainRegistry {
    fn new() -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static DomainRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<DomainRegistry> = OnceLock::new();
        REGISTRY.get_or_init(DomainRegistry::new)
    }

    /// Get or create the state for a domain. Participants hold the strong
    /// reference; the registry only remembers it weakly.
    pub fn get_or_create(&self, domain_id: DomainId) -> Arc<DomainState> {
        let mut domains = self.domains.lock();
        if let Some(weak) = domains.get(&domain_id) {
            if let Some(strong) = weak.upgrade() {
                return strong;
            }
        }
        let state = Arc::new(DomainState::new(domain_id));
        domains.insert(domain_id, Arc::downgrade(&state));
        log::debug!("[registry] created domain state for domain_id={}", domain_id);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn writer_entry(guid: Guid, qos: QoS, hook: Option<MatchHook>) -> EndpointEntry {
        EndpointEntry {
            guid,
            kind: EndpointKind::Writer,
            qos,
            on_match: hook,
            local_reader: None,
            remote_addr: None,
        }
    }

    fn reader_entry(guid: Guid, qos: QoS, hook: Option<MatchHook>) -> (EndpointEntry, crossbeam::channel::Receiver<Arc<[u8]>>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        let entry = EndpointEntry {
            guid,
            kind: EndpointKind::Reader,
            qos,
            on_match: hook,
            local_reader: Some(LocalReaderSlot {
                sender: tx,
                on_data: None,
            }),
            remote_addr: None,
        };
        (entry, rx)
    }

    fn counting_hook() -> (MatchHook, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&count);
        let hook: MatchHook = Arc::new(move |delta, _| {
            c.fetch_add(delta, Ordering::SeqCst);
        });
        (hook, count)
    }

    fn guid(n: u8) -> Guid {
        Guid::new([n; 12], [0, 0, 0, n])
    }

    #[test]
    fn test_writer_first_then_reader_matches() {
        let domain = Arc::new(DomainState::new(0));
        let key = MatchKey::new("test/topic", "TestType");

        let (whook, wcount) = counting_hook();
        let _wt = domain.register(key.clone(), writer_entry(guid(1), QoS::reliable(), Some(whook)));
        assert_eq!(wcount.load(Ordering::SeqCst), 0);

        let (rhook, rcount) = counting_hook();
        let (entry, _rx) = reader_entry(guid(2), QoS::reliable(), Some(rhook));
        let _rt = domain.register(key.clone(), entry);

        assert_eq!(wcount.load(Ordering::SeqCst), 1);
        assert_eq!(rcount.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reader_first_then_writer_matches() {
        let domain = Arc::new(DomainState::new(0));
        let key = MatchKey::new("test/topic", "TestType");

        let (rhook, rcount) = counting_hook();
        let (entry, _rx) = reader_entry(guid(2), QoS::best_effort(), Some(rhook));
        let _rt = domain.register(key.clone(), entry);
        assert_eq!(rcount.load(Ordering::SeqCst), 0);

        let (whook, wcount) = counting_hook();
        let _wt = domain.register(key.clone(), writer_entry(guid(1), QoS::reliable(), Some(whook)));

        assert_eq!(wcount.load(Ordering::SeqCst), 1);
        assert_eq!(rcount.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_incompatible_qos_blocks_match() {
        let domain = Arc::new(DomainState::new(0));
        let key = MatchKey::new("test/topic", "TestType");

        let (whook, wcount) = counting_hook();
        let _wt = domain.register(
            key.clone(),
            writer_entry(guid(1), QoS::best_effort(), Some(whook)),
        );

        let (rhook, rcount) = counting_hook();
        let (entry, _rx) = reader_entry(guid(2), QoS::reliable(), Some(rhook));
        let _rt = domain.register(key.clone(), entry);

        assert_eq!(wcount.load(Ordering::SeqCst), 0);
        assert_eq!(rcount.load(Ordering::SeqCst), 0);
        assert!(domain.reader_paths(&key, &QoS::best_effort()).is_empty());
    }

    #[test]
    fn test_token_drop_unregisters_and_fires_minus_one() {
        let domain = Arc::new(DomainState::new(0));
        let key = MatchKey::new("test/topic", "TestType");

        let (whook, wcount) = counting_hook();
        let _wt = domain.register(key.clone(), writer_entry(guid(1), QoS::reliable(), Some(whook)));

        let (entry, _rx) = reader_entry(guid(2), QoS::reliable(), None);
        let rt = domain.register(key.clone(), entry);
        assert_eq!(wcount.load(Ordering::SeqCst), 1);
        assert_eq!(domain.endpoint_count(&key), 2);

        drop(rt);
        assert_eq!(wcount.load(Ordering::SeqCst), 0);
        assert_eq!(domain.endpoint_count(&key), 1);
    }

    #[test]
    fn test_reader_paths_and_local_delivery() {
        let domain = Arc::new(DomainState::new(0));
        let key = MatchKey::new("test/topic", "TestType");

        let (entry, rx) = reader_entry(guid(2), QoS::reliable(), None);
        let _rt = domain.register(key.clone(), entry);

        let paths = domain.reader_paths(&key, &QoS::reliable());
        assert_eq!(paths.len(), 1);
        match &paths[0] {
            ReaderPath::Local(slot) => {
                slot.sender.send(Arc::from(&b"ping"[..])).unwrap();
            }
            ReaderPath::Remote(_) => panic!("expected local path"),
        }
        assert_eq!(&*rx.try_recv().unwrap(), b"ping");
    }

    #[test]
    fn test_remote_delivery_requires_discovered_writer() {
        let domain = Arc::new(DomainState::new(0));
        let key = MatchKey::new("test/topic", "TestType");

        let (entry, rx) = reader_entry(guid(2), QoS::reliable(), None);
        let _rt = domain.register(key.clone(), entry);

        // Unknown writer: dropped.
        domain.deliver_from_remote(&key, guid(9), b"lost");
        assert!(rx.try_recv().is_err());

        // Mirror the writer proxy in, then delivery works.
        let _wt = domain.register(key.clone(), writer_entry(guid(9), QoS::reliable(), None));
        domain.deliver_from_remote(&key, guid(9), b"found");
        assert_eq!(&*rx.try_recv().unwrap(), b"found");
    }

    #[test]
    fn test_global_registry_same_domain_same_state() {
        let a = DomainRegistry::global().get_or_create(77);
        let b = DomainRegistry::global().get_or_create(77);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.domain_id(), 77);
    }
}
