// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! The device broadcaster: one writer per connected device on the shared
//! device-info topic, with late-joiner delivery.
//!
//! # The discovery race
//!
//! A writer may come up before any reader exists, and a reader may attach
//! long after a device was announced; a one-shot send at registration time
//! would be lost to whichever side is late. The broadcaster therefore
//! treats "send the current device snapshot" as re-triggerable and
//! idempotent: every time a reader newly matches a device's writer, that
//! device's info is (re-)published. Duplicate sends to already-matched
//! readers are acceptable - the message is replaceable state, not an event.
//!
//! # Threads
//!
//! The per-writer listener fires on bus-internal threads and only sets a
//! per-device flag plus the shared trigger; the waiter thread consumes the
//! trigger and enqueues the actual re-send scan on the dispatcher, whose
//! single worker is the only thread that touches the device map or the
//! writers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::broadcast::device::{DeviceInfo, DeviceSource, DEVICE_INFO_TOPIC};
use crate::broadcast::dispatcher::Dispatcher;
use crate::bus::listener::{DataWriterListener, PublicationMatchedStatus};
use crate::bus::qos::QoS;
use crate::bus::{DataWriter, Participant, Publisher, Topic};
use crate::{Error, Result};

/// Level-triggered signal from writer listeners to the waiter thread.
///
/// One mutex guards both the fire and stop bits; the waiter re-checks the
/// predicate after every wake (spurious wakeups, and wakes that raced a
/// concurrent consume, are harmless), and shutdown satisfies the wait even
/// with the fire bit clear.
struct SendTrigger {
    state: Mutex<TriggerState>,
    cv: Condvar,
}

#[derive(Default)]
struct TriggerState {
    fire: bool,
    stop: bool,
}

impl SendTrigger {
    fn new() -> Self {
        Self {
            state: Mutex::new(TriggerState::default()),
            cv: Condvar::new(),
        }
    }

    fn pulse(&self) {
        self.state.lock().fire = true;
        self.cv.notify_all();
    }

    fn shutdown(&self) {
        self.state.lock().stop = true;
        self.cv.notify_all();
    }

    /// Block until fired or stopped. Returns `false` on stop, and consumes
    /// the fire bit otherwise.
    fn wait_for_fire(&self) -> bool {
        let mut state = self.state.lock();
        while !state.fire && !state.stop {
            self.cv.wait(&mut state);
        }
        if state.stop {
            return false;
        }
        state.fire = false;
        true
    }
}

/// Per-writer listener: remembers that a new reader appeared since the last
/// successful send. One independently-clearable bit per device; nothing
/// here may block, since matches are reported from bus-internal threads.
struct DeviceWriterListener {
    serial: String,
    new_reader_joined: AtomicBool,
    trigger: Arc<SendTrigger>,
}

impl DataWriterListener for DeviceWriterListener {
    fn on_publication_matched(&self, status: PublicationMatchedStatus) {
        match status.current_count_change {
            1 => {
                log::info!(
                    "[broadcaster] reader {} discovered for device '{}'",
                    status
                        .last_subscription
                        .map(|g| g.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    self.serial
                );
                self.new_reader_joined.store(true, Ordering::SeqCst);
                self.trigger.pulse();
            }
            -1 => {
                log::info!(
                    "[broadcaster] reader {} disappeared from device '{}'",
                    status
                        .last_subscription
                        .map(|g| g.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    self.serial
                );
            }
            n => {
                log::warn!(
                    "[broadcaster] {} is not a valid publication-matched delta",
                    n
                );
            }
        }
    }
}

/// Publication state for one registered device.
struct DeviceHandle {
    device: Arc<dyn DeviceSource>,
    writer: DataWriter<DeviceInfo>,
    listener: Arc<DeviceWriterListener>,
}

/// State owned by the dispatcher worker (and read-only probed from outside).
struct Shared {
    publisher: Mutex<Option<Publisher>>,
    topic: Mutex<Option<Topic<DeviceInfo>>>,
    /// Keyed by serial. Mutated only from dispatcher tasks; the mutex exists
    /// for the read-only probes and the final teardown.
    devices: Mutex<HashMap<String, DeviceHandle>>,
}

/// Bridges a local device registry to the shared device-info topic.
///
/// Create with [`new`], start with [`run`], then feed it
/// [`add_device`]/[`remove_device`] from the device-event callbacks (any
/// thread). Both operations enqueue onto a single serialized worker, so
/// rapid add/remove sequences for one serial resolve to the last
/// operation and never leave a dangling writer.
///
/// [`new`]: DeviceBroadcaster::new
/// [`run`]: DeviceBroadcaster::run
/// [`add_device`]: DeviceBroadcaster::add_device
/// [`remove_device`]: DeviceBroadcaster::remove_device
pub struct DeviceBroadcaster {
    participant: Participant,
    shared: Arc<Shared>,
    trigger: Arc<SendTrigger>,
    dispatcher: Arc<Dispatcher>,
    waiter: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl DeviceBroadcaster {
    /// Cheap construction; no entities are created until [`run`].
    ///
    /// [`run`]: DeviceBroadcaster::run
    pub fn new(participant: Participant) -> Self {
        Self {
            participant,
            shared: Arc::new(Shared {
                publisher: Mutex::new(None),
                topic: Mutex::new(None),
                devices: Mutex::new(HashMap::new()),
            }),
            trigger: Arc::new(SendTrigger::new()),
            dispatcher: Arc::new(Dispatcher::new()),
            waiter: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// One-time startup: create the publisher and the shared device-info
    /// topic, start the dispatcher worker and the new-subscriber waiter.
    ///
    /// On error the broadcaster must not be used further; `add_device` and
    /// `remove_device` become silent no-ops.
    pub fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState("broadcaster is already running"));
        }

        let publisher = self.participant.create_publisher(QoS::default())?;
        let topic = self
            .participant
            .create_topic::<DeviceInfo>(DEVICE_INFO_TOPIC)?;
        *self.shared.publisher.lock() = Some(publisher);
        *self.shared.topic.lock() = Some(topic);

        self.dispatcher.start();

        let shared = Arc::clone(&self.shared);
        let trigger = Arc::clone(&self.trigger);
        let dispatcher = Arc::clone(&self.dispatcher);
        *self.waiter.lock() = Some(thread::spawn(move || {
            waiter_loop(&shared, &trigger, &dispatcher)
        }));

        log::info!(
            "[broadcaster] running on domain {} as '{}'",
            self.participant.domain_id(),
            self.participant.name()
        );
        Ok(())
    }

    /// Register a device and create its writer.
    ///
    /// Safe to call from any thread, including device-event callbacks; the
    /// work is deferred to the dispatcher. Idempotent per serial: a device
    /// that is already registered is left untouched. A writer-creation
    /// failure is logged and the device simply stays unregistered.
    pub fn add_device(&self, device: Arc<dyn DeviceSource>) {
        let serial = device.serial();
        if serial.is_empty() {
            log::error!("[broadcaster] ignoring device with an empty serial number");
            return;
        }
        let shared = Arc::clone(&self.shared);
        let trigger = Arc::clone(&self.trigger);
        self.dispatcher
            .invoke(move || register_device(&shared, &trigger, serial, device));
    }

    /// Deregister a device by handle. Unknown serials are a benign no-op.
    pub fn remove_device(&self, device: &dyn DeviceSource) {
        self.remove_by_serial(&device.serial());
    }

    /// Deregister a device by serial. Unknown serials are a benign no-op.
    pub fn remove_by_serial(&self, serial: &str) {
        let serial = serial.to_string();
        let shared = Arc::clone(&self.shared);
        self.dispatcher.invoke(move || {
            let removed = shared.devices.lock().remove(&serial);
            match removed {
                Some(handle) => {
                    // Dropping the handle tears the writer down first,
                    // which is what notifies matched readers.
                    drop(handle);
                    log::info!("[broadcaster] device '{}' removed", serial);
                }
                None => {
                    log::debug!(
                        "[broadcaster] remove for unknown device '{}' ignored",
                        serial
                    );
                }
            }
        });
    }

    /// Whether a device with this serial is currently registered.
    pub fn contains(&self, serial: &str) -> bool {
        self.shared.devices.lock().contains_key(serial)
    }

    /// Number of currently registered devices.
    pub fn device_count(&self) -> usize {
        self.shared.devices.lock().len()
    }
}

impl Drop for DeviceBroadcaster {
    fn drop(&mut self) {
        log::info!("[broadcaster] shutting down");

        // Stop intake first so no task can observe half-torn-down state,
        // then satisfy the waiter's wait even though no trigger will come.
        self.dispatcher.stop();
        self.trigger.shutdown();
        if let Some(handle) = self.waiter.lock().take() {
            if handle.join().is_err() {
                log::error!("[broadcaster] waiter thread panicked during shutdown");
            }
        }

        // Reverse creation order: writers, then topic, then publisher.
        self.shared.devices.lock().clear();
        *self.shared.topic.lock() = None;
        *self.shared.publisher.lock() = None;
    }
}

fn waiter_loop(shared: &Arc<Shared>, trigger: &Arc<SendTrigger>, dispatcher: &Dispatcher) {
    while trigger.wait_for_fire() {
        let shared = Arc::clone(shared);
        dispatcher.invoke(move || resend_to_new_readers(&shared));
    }
    log::debug!("[broadcaster] new-subscriber waiter stopped");
}

/// Runs on the dispatcher worker: re-publish info for every device whose
/// writer saw a new reader, clearing the flag only on a successful send.
fn resend_to_new_readers(shared: &Shared) {
    let devices = shared.devices.lock();
    for (serial, handle) in devices.iter() {
        if !handle.listener.new_reader_joined.load(Ordering::SeqCst) {
            continue;
        }
        match DeviceInfo::from_source(handle.device.as_ref()) {
            Ok(info) => match handle.writer.write(&info) {
                Ok(()) => {
                    handle
                        .listener
                        .new_reader_joined
                        .store(false, Ordering::SeqCst);
                    log::info!("[broadcaster] device-info for '{}' published", serial);
                }
                Err(e) => {
                    // Flag stays set; the next matched reader retriggers us.
                    log::error!(
                        "[broadcaster] failed publishing device-info for '{}': {}",
                        serial,
                        e
                    );
                }
            },
            Err(e) => {
                log::error!("[broadcaster] failed querying device '{}': {}", serial, e);
            }
        }
    }
}

/// Runs on the dispatcher worker: create the writer+listener pair for a
/// newly-connected device.
fn register_device(
    shared: &Shared,
    trigger: &Arc<SendTrigger>,
    serial: String,
    device: Arc<dyn DeviceSource>,
) {
    let mut devices = shared.devices.lock();
    if devices.contains_key(&serial) {
        log::debug!("[broadcaster] device '{}' is already registered", serial);
        return;
    }

    let publisher = shared.publisher.lock().clone();
    let topic = shared.topic.lock().clone();
    let (Some(publisher), Some(topic)) = (publisher, topic) else {
        log::warn!(
            "[broadcaster] not running, dropping registration of device '{}'",
            serial
        );
        return;
    };

    log::info!("[broadcaster] device '{}' detected", serial);
    let listener = Arc::new(DeviceWriterListener {
        serial: serial.clone(),
        new_reader_joined: AtomicBool::new(false),
        trigger: Arc::clone(trigger),
    });

    // Reliable + volatile + exclusive-ownership, data sharing pinned off:
    // the late-joiner protocol owns durability, and delivery must ride the
    // same transport the discovery handshake rides.
    let qos = QoS::reliable().volatile().exclusive().data_sharing_off();
    match publisher.create_writer_with_listener(
        &topic,
        qos,
        Arc::clone(&listener) as Arc<dyn DataWriterListener>,
    ) {
        Ok(writer) => {
            devices.insert(
                serial,
                DeviceHandle {
                    device,
                    writer,
                    listener,
                },
            );
        }
        Err(e) => {
            log::error!(
                "[broadcaster] failed creating a writer for device '{}': {}",
                serial,
                e
            );
        }
    }
}
