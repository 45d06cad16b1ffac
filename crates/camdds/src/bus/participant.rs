// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Domain participant - entry point to the bus, factory for all entities.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::bus::codec::BusData;
use crate::bus::discovery::{DiscoveryService, DiscoveryShared, EndpointAd, MAX_DOMAIN_ID};
use crate::bus::guid::{fresh_prefix, Guid, ENTITY_ID_PARTICIPANT};
use crate::bus::listener::ParticipantListener;
use crate::bus::publisher::Publisher;
use crate::bus::qos::QoS;
use crate::bus::registry::{DomainRegistry, DomainState, MatchKey};
use crate::bus::subscriber::Subscriber;
use crate::bus::topic::Topic;
use crate::{Error, Result};

/// How a participant reaches other participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Registry-only matching within the current process. No sockets.
    IntraProcess,
    /// UDP multicast discovery (plus optional static unicast peers) with
    /// unicast datagram data delivery to remote readers.
    UdpDiscovery,
}

/// The per-participant state all entities hang off.
pub(crate) struct ParticipantCore {
    name: String,
    domain_id: u32,
    guid: Guid,
    prefix: [u8; 12],
    entity_counter: AtomicU32,
    pub(crate) domain: Arc<DomainState>,
    disc_shared: Option<Arc<DiscoveryShared>>,
    /// Owns the discovery threads; joined when the last entity handle drops.
    _discovery: Option<DiscoveryService>,
}

impl ParticipantCore {
    pub(crate) fn next_entity_guid(&self) -> Guid {
        let n = self.entity_counter.fetch_add(1, Ordering::Relaxed) + 1;
        Guid::new(self.prefix, n.to_be_bytes())
    }

    pub(crate) fn inventory_add(&self, ad: EndpointAd) {
        if let Some(disc) = &self.disc_shared {
            disc.inventory_add(ad);
        }
    }

    pub(crate) fn inventory_remove(&self, guid: Guid) {
        if let Some(disc) = &self.disc_shared {
            disc.inventory_remove(guid);
        }
    }

    pub(crate) fn send_remote(
        &self,
        key: &MatchKey,
        writer: Guid,
        payload: &[u8],
        dest: SocketAddr,
    ) -> Result<()> {
        match &self.disc_shared {
            Some(disc) => disc.send_data(key, writer, payload, dest),
            None => Err(Error::InvalidState(
                "remote delivery requires UdpDiscovery transport",
            )),
        }
    }
}

impl Drop for ParticipantCore {
    fn drop(&mut self) {
        log::info!(
            "[participant] '{}' ({}) leaving domain {}",
            self.name,
            self.guid,
            self.domain_id
        );
    }
}

/// Entry point to a bus domain.
///
/// The handle is cheap to clone. Entities (publishers, writers, readers)
/// keep the underlying participant alive, so teardown order between a
/// participant handle and its entities is not observable; the discovery
/// service (and its network presence) goes away only when the last handle
/// drops.
///
/// # Examples
///
/// ```no_run
/// use camdds::{Participant, QoS, TransportMode};
///
/// fn main() -> camdds::Result<()> {
///     let participant = Participant::builder("my-app")
///         .domain_id(0)
///         .with_transport(TransportMode::UdpDiscovery)
///         .build()?;
///
///     let publisher = participant.create_publisher(QoS::default())?;
///     let topic = participant.create_topic::<camdds::DeviceInfo>(camdds::DEVICE_INFO_TOPIC)?;
///     let _writer = publisher.create_writer(&topic, QoS::reliable())?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Participant {
    core: Arc<ParticipantCore>,
}

impl Participant {
    /// Start building a participant with the given display name.
    pub fn builder(name: &str) -> ParticipantBuilder {
        ParticipantBuilder {
            name: name.to_string(),
            domain_id: 0,
            transport: TransportMode::UdpDiscovery,
            peers: Vec::new(),
            listener: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn guid(&self) -> Guid {
        self.core.guid
    }

    pub fn domain_id(&self) -> u32 {
        self.core.domain_id
    }

    /// Create a publisher entity.
    pub fn create_publisher(&self, qos: QoS) -> Result<Publisher> {
        Ok(Publisher::new(Arc::clone(&self.core), qos))
    }

    /// Create a subscriber entity.
    pub fn create_subscriber(&self, qos: QoS) -> Result<Subscriber> {
        Ok(Subscriber::new(Arc::clone(&self.core), qos))
    }

    /// Create a typed topic handle.
    pub fn create_topic<T: BusData>(&self, name: &str) -> Result<Topic<T>> {
        if name.is_empty() {
            return Err(Error::InvalidTopic(name.to_string()));
        }
        Ok(Topic::new(name))
    }

    pub(crate) fn core(&self) -> &Arc<ParticipantCore> {
        &self.core
    }
}

/// Builder for [`Participant`].
pub struct ParticipantBuilder {
    name: String,
    domain_id: u32,
    transport: TransportMode,
    peers: Vec<SocketAddr>,
    listener: Option<Arc<dyn ParticipantListener>>,
}

impl ParticipantBuilder {
    pub fn domain_id(mut self, domain_id: u32) -> Self {
        self.domain_id = domain_id;
        self
    }

    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    /// Add a static unicast discovery peer (for multicast-hostile networks).
    pub fn add_peer(mut self, peer: SocketAddr) -> Self {
        self.peers.push(peer);
        self
    }

    /// Attach a participant discovery listener (diagnostic surface).
    pub fn with_listener(mut self, listener: Arc<dyn ParticipantListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Create the participant.
    ///
    /// Fails if the domain id is out of range or, in `UdpDiscovery` mode,
    /// if the discovery sockets cannot be set up. Socket failures here are
    /// fatal: there is no degraded half-discovered mode to fall back to.
    pub fn build(self) -> Result<Participant> {
        if self.domain_id > MAX_DOMAIN_ID {
            return Err(Error::InvalidDomainId(self.domain_id));
        }

        let prefix = fresh_prefix();
        let guid = Guid::new(prefix, ENTITY_ID_PARTICIPANT);
        let domain = DomainRegistry::global().get_or_create(self.domain_id);

        let (disc_shared, discovery) = match self.transport {
            TransportMode::IntraProcess => (None, None),
            TransportMode::UdpDiscovery => {
                let service = DiscoveryService::spawn(
                    guid,
                    self.name.clone(),
                    self.domain_id,
                    Arc::clone(&domain),
                    self.listener.clone(),
                    self.peers.clone(),
                )?;
                (Some(Arc::clone(service.shared())), Some(service))
            }
        };

        log::info!(
            "[participant] '{}' ({}) joined domain {} ({:?})",
            self.name,
            guid,
            self.domain_id,
            self.transport
        );

        Ok(Participant {
            core: Arc::new(ParticipantCore {
                name: self.name,
                domain_id: self.domain_id,
                guid,
                prefix,
                entity_counter: AtomicU32::new(0),
                domain,
                disc_shared,
                _discovery: discovery,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_bad_domain() {
        let result = Participant::builder("test")
            .domain_id(999)
            .with_transport(TransportMode::IntraProcess)
            .build();
        assert!(matches!(result, Err(Error::InvalidDomainId(999))));
    }

    #[test]
    fn test_intra_process_build() {
        let participant = Participant::builder("unit-test")
            .domain_id(200)
            .with_transport(TransportMode::IntraProcess)
            .build()
            .expect("intra-process build cannot fail");
        assert_eq!(participant.name(), "unit-test");
        assert_eq!(participant.domain_id(), 200);
        assert!(!participant.guid().is_zero());
    }

    #[test]
    fn test_empty_topic_rejected() {
        let participant = Participant::builder("unit-test")
            .domain_id(201)
            .with_transport(TransportMode::IntraProcess)
            .build()
            .expect("intra-process build cannot fail");
        let result = participant.create_topic::<crate::broadcast::DeviceInfo>("");
        assert!(matches!(result, Err(Error::InvalidTopic(_))));
    }

    #[test]
    fn test_entity_guids_unique_and_prefixed() {
        let participant = Participant::builder("unit-test")
            .domain_id(202)
            .with_transport(TransportMode::IntraProcess)
            .build()
            .expect("intra-process build cannot fail");
        let a = participant.core().next_entity_guid();
        let b = participant.core().next_entity_guid();
        assert_ne!(a, b);
        assert_eq!(a.prefix, participant.guid().prefix);
        assert_eq!(b.prefix, participant.guid().prefix);
    }
}
