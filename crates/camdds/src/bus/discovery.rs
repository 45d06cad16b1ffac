// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! UDP participant discovery and remote data delivery.
//!
//! Each participant in `UdpDiscovery` mode runs three background threads:
//!
//! - **announcer**: periodically multicasts (and unicasts to static peers)
//!   an announcement carrying the participant identity plus its full
//!   endpoint inventory. Announcements burst fast right after startup, then
//!   settle to a steady cadence. A `bye` frame is sent on shutdown.
//! - **receiver**: ingests announcements, maintains a lease-expiring peer
//!   table, mirrors remote endpoints into the local registry as proxies
//!   (which is what drives publication/subscription-matched callbacks for
//!   remote peers), and surfaces participant join/leave to the listener.
//! - **data**: receives `data` frames on a per-participant data socket and
//!   routes payloads to local readers by (topic, type).
//!
//! Endpoint state is level-based: every announcement carries the complete
//! inventory, so a lost frame is repaired by the next one.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use crate::bus::codec::{Decoder, Encoder};
use crate::bus::guid::Guid;
use crate::bus::listener::ParticipantListener;
use crate::bus::qos::QoS;
use crate::bus::registry::{
    DomainState, EndpointEntry, EndpointKind, MatchKey, RegistrationToken,
};
use crate::{Error, Result};

/// Well-known discovery multicast group.
pub(crate) const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);

const PORT_BASE: u16 = 7400;
const DOMAIN_ID_GAIN: u16 = 250;

/// Largest domain id that still maps to a valid UDP port.
pub(crate) const MAX_DOMAIN_ID: u32 = 232;

const FRAME_MAGIC: u32 = 0x4344_5331; // "CDS1"
const FRAME_VERSION: u8 = 1;
const KIND_ANNOUNCE: u8 = 1;
const KIND_BYE: u8 = 2;
const KIND_DATA: u8 = 3;

const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);
const STARTUP_BURST_WINDOW: Duration = Duration::from_secs(5);
const STARTUP_BURST_INTERVAL: Duration = Duration::from_millis(200);
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);
const SOCKET_POLL: Duration = Duration::from_millis(250);

/// Advertised lease; peers that stay silent this long are declared lost.
const LEASE: Duration = Duration::from_secs(10);

/// Discovery port for a domain.
pub(crate) fn discovery_port(domain_id: u32) -> u16 {
    PORT_BASE + DOMAIN_ID_GAIN * domain_id as u16
}

/// One endpoint as carried in an announcement.
#[derive(Debug, Clone)]
pub(crate) struct EndpointAd {
    pub guid: Guid,
    pub kind: EndpointKind,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QoS,
}

#[derive(Debug, Clone)]
pub(crate) struct Announcement {
    pub participant: Guid,
    pub domain_id: u32,
    pub lease_ms: u32,
    pub data_port: u16,
    pub name: String,
    pub endpoints: Vec<EndpointAd>,
}

pub(crate) enum Frame {
    Announcement(Announcement),
    Bye {
        participant: Guid,
        domain_id: u32,
    },
    Data {
        domain_id: u32,
        writer: Guid,
        topic_name: String,
        type_name: String,
        payload: Vec<u8>,
    },
}

fn put_header(enc: &mut Encoder, kind: u8) {
    enc.put_u32(FRAME_MAGIC);
    enc.put_u8(FRAME_VERSION);
    enc.put_u8(kind);
}

pub(crate) fn encode_announcement(a: &Announcement) -> Vec<u8> {
    let mut enc = Encoder::with_capacity(64 + a.endpoints.len() * 64);
    put_header(&mut enc, KIND_ANNOUNCE);
    enc.put_guid(&a.participant);
    enc.put_u32(a.domain_id);
    enc.put_u32(a.lease_ms);
    enc.put_u16(a.data_port);
    enc.put_str(&a.name);
    enc.put_u32(a.endpoints.len() as u32);
    for ep in &a.endpoints {
        enc.put_guid(&ep.guid);
        enc.put_u8(match ep.kind {
            EndpointKind::Reader => 0,
            EndpointKind::Writer => 1,
        });
        enc.put_str(&ep.topic_name);
        enc.put_str(&ep.type_name);
        ep.qos.encode(&mut enc);
    }
    enc.into_vec()
}

pub(crate) fn encode_bye(participant: Guid, domain_id: u32) -> Vec<u8> {
    let mut enc = Encoder::with_capacity(32);
    put_header(&mut enc, KIND_BYE);
    enc.put_guid(&participant);
    enc.put_u32(domain_id);
    enc.into_vec()
}

pub(crate) fn encode_data(
    domain_id: u32,
    writer: Guid,
    key: &MatchKey,
    payload: &[u8],
) -> Vec<u8> {
    let mut enc = Encoder::with_capacity(64 + payload.len());
    put_header(&mut enc, KIND_DATA);
    enc.put_u32(domain_id);
    enc.put_guid(&writer);
    enc.put_str(&key.topic_name);
    enc.put_str(&key.type_name);
    enc.put_bytes(payload);
    enc.into_vec()
}

pub(crate) fn decode_frame(buf: &[u8]) -> Result<Frame> {
    let mut dec = Decoder::new(buf);
    let magic = dec.get_u32()?;
    if magic != FRAME_MAGIC {
        return Err(Error::Decode(format!("bad frame magic {:#010x}", magic)));
    }
    let version = dec.get_u8()?;
    if version != FRAME_VERSION {
        return Err(Error::Decode(format!("unsupported frame version {}", version)));
    }
    match dec.get_u8()? {
        KIND_ANNOUNCE => {
            let participant = dec.get_guid()?;
            let domain_id = dec.get_u32()?;
            let lease_ms = dec.get_u32()?;
            let data_port = dec.get_u16()?;
            let name = dec.get_str()?;
            let count = dec.get_u32()? as usize;
            let mut endpoints = Vec::with_capacity(count.min(256));
            for _ in 0..count {
                let guid = dec.get_guid()?;
                let kind = match dec.get_u8()? {
                    0 => EndpointKind::Reader,
                    1 => EndpointKind::Writer,
                    n => {
                        return Err(Error::Decode(format!("unknown endpoint kind {}", n)));
                    }
                };
                let topic_name = dec.get_str()?;
                let type_name = dec.get_str()?;
                let qos = QoS::decode(&mut dec)?;
                endpoints.push(EndpointAd {
                    guid,
                    kind,
                    topic_name,
                    type_name,
                    qos,
                });
            }
            Ok(Frame::Announcement(Announcement {
                participant,
                domain_id,
                lease_ms,
                data_port,
                name,
                endpoints,
            }))
        }
        KIND_BYE => Ok(Frame::Bye {
            participant: dec.get_guid()?,
            domain_id: dec.get_u32()?,
        }),
        KIND_DATA => {
            let domain_id = dec.get_u32()?;
            let writer = dec.get_guid()?;
            let topic_name = dec.get_str()?;
            let type_name = dec.get_str()?;
            let payload = dec.get_bytes()?;
            Ok(Frame::Data {
                domain_id,
                writer,
                topic_name,
                type_name,
                payload,
            })
        }
        n => Err(Error::Decode(format!("unknown frame kind {}", n))),
    }
}

/// A known remote participant and its mirrored endpoints.
struct PeerRecord {
    name: String,
    last_seen: Instant,
    lease: Duration,
    /// Proxy registrations; dropping a token unregisters the proxy.
    endpoints: HashMap<Guid, (MatchKey, RegistrationToken)>,
}

/// State shared between the discovery threads and the participant.
pub(crate) struct DiscoveryShared {
    pub participant_guid: Guid,
    pub participant_name: String,
    pub domain_id: u32,
    pub domain: Arc<DomainState>,
    pub listener: Option<Arc<dyn ParticipantListener>>,
    pub static_peers: Vec<SocketAddr>,
    pub send_socket: UdpSocket,
    pub data_port: u16,
    inventory: Mutex<Vec<EndpointAd>>,
    peers: Mutex<HashMap<Guid, PeerRecord>>,
}

impl DiscoveryShared {
    pub fn inventory_add(&self, ad: EndpointAd) {
        self.inventory.lock().push(ad);
    }

    pub fn inventory_remove(&self, guid: Guid) {
        self.inventory.lock().retain(|ad| ad.guid != guid);
    }

    /// Send one sample to a remote reader's data socket.
    pub fn send_data(
        &self,
        key: &MatchKey,
        writer: Guid,
        payload: &[u8],
        dest: SocketAddr,
    ) -> Result<()> {
        let frame = encode_data(self.domain_id, writer, key, payload);
        self.send_socket
            .send_to(&frame, dest)
            .map_err(|e| Error::SendFailed(format!("data to {}: {}", dest, e)))?;
        Ok(())
    }
}

/// Background discovery service; threads stop and join on drop.
pub(crate) struct DiscoveryService {
    shared: Arc<DiscoveryShared>,
    shutdown: Arc<AtomicBool>,
    announcer: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
    data_loop: Option<JoinHandle<()>>,
}

impl DiscoveryService {
    pub fn spawn(
        participant_guid: Guid,
        participant_name: String,
        domain_id: u32,
        domain: Arc<DomainState>,
        listener: Option<Arc<dyn ParticipantListener>>,
        static_peers: Vec<SocketAddr>,
    ) -> Result<Self> {
        let port = discovery_port(domain_id);

        // Discovery receive socket: well-known port, address reuse so
        // multiple participants can coexist on one host.
        let recv = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        recv.set_reuse_address(true)?;
        recv.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())
            .map_err(|e| Error::BindFailed(format!("discovery port {}: {}", port, e)))?;
        let recv: UdpSocket = recv.into();
        recv.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| Error::MulticastJoinFailed(e.to_string()))?;
        recv.set_read_timeout(Some(SOCKET_POLL))?;

        // Per-participant data socket; its ephemeral port is advertised.
        let data = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| Error::BindFailed(format!("data socket: {}", e)))?;
        data.set_read_timeout(Some(SOCKET_POLL))?;
        let data_port = data.local_addr()?.port();

        // Send socket shared by the announcer and all writers.
        let send = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| Error::BindFailed(format!("send socket: {}", e)))?;
        send.set_multicast_ttl_v4(1)?;

        let shared = Arc::new(DiscoveryShared {
            participant_guid,
            participant_name,
            domain_id,
            domain,
            listener,
            static_peers,
            send_socket: send,
            data_port,
            inventory: Mutex::new(Vec::new()),
            peers: Mutex::new(HashMap::new()),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let announcer = {
            let shared = Arc::clone(&shared);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || announcer_loop(&shared, &shutdown))
        };
        let receiver = {
            let shared = Arc::clone(&shared);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || receiver_loop(&shared, &shutdown, &recv))
        };
        let data_loop = {
            let shared = Arc::clone(&shared);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || data_loop(&shared, &shutdown, &data))
        };

        log::info!(
            "[discovery] participant {} on domain {} (discovery port {}, data port {})",
            participant_guid,
            domain_id,
            port,
            data_port
        );

        Ok(Self {
            shared,
            shutdown,
            announcer: Some(announcer),
            receiver: Some(receiver),
            data_loop: Some(data_loop),
        })
    }

    pub fn shared(&self) -> &Arc<DiscoveryShared> {
        &self.shared
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in [
            self.announcer.take(),
            self.receiver.take(),
            self.data_loop.take(),
        ]
        .into_iter()
        .flatten()
        {
            if handle.join().is_err() {
                log::warn!("[discovery] background thread panicked during shutdown");
            }
        }
        log::debug!(
            "[discovery] participant {} left domain {}",
            self.shared.participant_guid,
            self.shared.domain_id
        );
    }
}

fn announcer_loop(shared: &Arc<DiscoveryShared>, shutdown: &AtomicBool) {
    let start = Instant::now();
    let mcast_dest = SocketAddr::from((MULTICAST_GROUP, discovery_port(shared.domain_id)));

    while !shutdown.load(Ordering::Relaxed) {
        let endpoints = shared.inventory.lock().clone();
        let frame = encode_announcement(&Announcement {
            participant: shared.participant_guid,
            domain_id: shared.domain_id,
            lease_ms: LEASE.as_millis() as u32,
            data_port: shared.data_port,
            name: shared.participant_name.clone(),
            endpoints,
        });

        send_to_all(shared, &frame, mcast_dest);

        let interval = if start.elapsed() < STARTUP_BURST_WINDOW {
            STARTUP_BURST_INTERVAL
        } else {
            ANNOUNCE_INTERVAL
        };
        let deadline = Instant::now() + interval;
        while Instant::now() < deadline {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(SHUTDOWN_POLL);
        }
    }

    // Courtesy bye so peers drop us without waiting for the lease.
    let bye = encode_bye(shared.participant_guid, shared.domain_id);
    send_to_all(shared, &bye, mcast_dest);
}

fn send_to_all(shared: &DiscoveryShared, frame: &[u8], mcast_dest: SocketAddr) {
    if let Err(e) = shared.send_socket.send_to(frame, mcast_dest) {
        log::debug!("[discovery] multicast send to {} failed: {}", mcast_dest, e);
    }
    for peer in &shared.static_peers {
        if let Err(e) = shared.send_socket.send_to(frame, peer) {
            log::debug!("[discovery] unicast send to {} failed: {}", peer, e);
        }
    }
}

fn receiver_loop(shared: &Arc<DiscoveryShared>, shutdown: &AtomicBool, socket: &UdpSocket) {
    let mut buf = vec![0u8; 64 * 1024];
    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((n, src)) => match decode_frame(&buf[..n]) {
                Ok(Frame::Announcement(a)) => ingest_announcement(shared, a, src),
                Ok(Frame::Bye {
                    participant,
                    domain_id,
                }) => {
                    if domain_id == shared.domain_id && participant != shared.participant_guid {
                        remove_peer(shared, participant, "bye");
                    }
                }
                Ok(Frame::Data { .. }) => {
                    log::debug!("[discovery] data frame on discovery port from {}, dropped", src);
                }
                Err(e) => {
                    log::debug!("[discovery] malformed frame from {}: {}", src, e);
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                log::debug!("[discovery] recv error: {}", e);
            }
        }
        sweep_leases(shared);
    }

    // Forget all peers on shutdown; dropping the proxy tokens unmatches
    // every local endpoint that was bound to them.
    let drained: Vec<PeerRecord> = shared.peers.lock().drain().map(|(_, r)| r).collect();
    drop(drained);
}

fn ingest_announcement(shared: &Arc<DiscoveryShared>, a: Announcement, src: SocketAddr) {
    if a.participant == shared.participant_guid || a.domain_id != shared.domain_id {
        return;
    }

    let mut newly_discovered = false;
    {
        let mut peers = shared.peers.lock();
        let record = peers.entry(a.participant).or_insert_with(|| {
            newly_discovered = true;
            PeerRecord {
                name: a.name.clone(),
                last_seen: Instant::now(),
                lease: Duration::from_millis(u64::from(a.lease_ms.max(1000))),
                endpoints: HashMap::new(),
            }
        });
        record.last_seen = Instant::now();
        record.name = a.name.clone();
        record.lease = Duration::from_millis(u64::from(a.lease_ms.max(1000)));

        // Level-based reconcile: tokens for vanished endpoints drop (and
        // unregister their proxies), new endpoints get mirrored in.
        let advertised: HashSet<Guid> = a.endpoints.iter().map(|ad| ad.guid).collect();
        record.endpoints.retain(|guid, _| advertised.contains(guid));

        for ad in &a.endpoints {
            if record.endpoints.contains_key(&ad.guid) {
                continue;
            }
            let key = MatchKey::new(&ad.topic_name, &ad.type_name);
            let entry = EndpointEntry {
                guid: ad.guid,
                kind: ad.kind,
                qos: ad.qos,
                on_match: None,
                local_reader: None,
                remote_addr: match ad.kind {
                    EndpointKind::Reader => Some(SocketAddr::new(src.ip(), a.data_port)),
                    EndpointKind::Writer => None,
                },
            };
            let token = shared.domain.register(key.clone(), entry);
            record.endpoints.insert(ad.guid, (key, token));
        }
    }

    if newly_discovered {
        log::info!(
            "[discovery] participant '{}' ({}) discovered",
            a.name,
            a.participant
        );
        if let Some(listener) = &shared.listener {
            listener.on_participant_discovered(a.participant, &a.name);
        }
    }
}

fn remove_peer(shared: &Arc<DiscoveryShared>, participant: Guid, reason: &str) {
    let removed = shared.peers.lock().remove(&participant);
    if let Some(record) = removed {
        log::info!(
            "[discovery] participant '{}' ({}) disappeared ({})",
            record.name,
            participant,
            reason
        );
        if let Some(listener) = &shared.listener {
            listener.on_participant_lost(participant, &record.name);
        }
        // Proxy tokens drop here, after the peers lock is released.
        drop(record);
    }
}

fn sweep_leases(shared: &Arc<DiscoveryShared>) {
    let expired: Vec<(Guid, PeerRecord)> = {
        let mut peers = shared.peers.lock();
        let dead: Vec<Guid> = peers
            .iter()
            .filter(|(_, r)| r.last_seen.elapsed() > r.lease)
            .map(|(g, _)| *g)
            .collect();
        dead.into_iter()
            .filter_map(|g| peers.remove(&g).map(|r| (g, r)))
            .collect()
    };

    for (guid, record) in expired {
        log::info!(
            "[discovery] participant '{}' ({}) disappeared (lease expired)",
            record.name,
            guid
        );
        if let Some(listener) = &shared.listener {
            listener.on_participant_lost(guid, &record.name);
        }
        drop(record);
    }
}

fn data_loop(shared: &Arc<DiscoveryShared>, shutdown: &AtomicBool, socket: &UdpSocket) {
    let mut buf = vec![0u8; 64 * 1024];
    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((n, src)) => match decode_frame(&buf[..n]) {
                Ok(Frame::Data {
                    domain_id,
                    writer,
                    topic_name,
                    type_name,
                    payload,
                }) => {
                    if domain_id == shared.domain_id {
                        let key = MatchKey::new(&topic_name, &type_name);
                        shared.domain.deliver_from_remote(&key, writer, &payload);
                    }
                }
                Ok(_) => {
                    log::debug!("[discovery] non-data frame on data port from {}, dropped", src);
                }
                Err(e) => {
                    log::debug!("[discovery] malformed data frame from {}: {}", src, e);
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                log::debug!("[discovery] data recv error: {}", e);
            }
        }
    }
}
