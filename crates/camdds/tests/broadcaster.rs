// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Broadcaster integration tests: registration idempotency, safe removal,
//! add/remove ordering, late-joiner delivery and shutdown determinism.
//!
//! Broadcaster operations are asynchronous (they enqueue onto the
//! dispatcher), so assertions about registration state poll with a
//! timeout. Each test runs on its own domain id.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use camdds::{
    DeviceBroadcaster, DeviceInfo, DeviceSource, Participant, QoS, StaticDevice,
    TransportMode, DEVICE_INFO_TOPIC,
};

fn participant(domain_id: u32) -> Participant {
    let _ = env_logger::builder().is_test(true).try_init();
    Participant::builder("broadcaster-test")
        .domain_id(domain_id)
        .with_transport(TransportMode::IntraProcess)
        .build()
        .expect("intra-process participant")
}

fn d435() -> Arc<StaticDevice> {
    Arc::new(StaticDevice::new(
        "Intel RealSense D435",
        "123456789",
        "D400",
        false,
    ))
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// End to end: device connects, a reader attaches and
/// receives the info message, device disconnects and the registration
/// disappears.
#[test]
fn test_connect_publish_disconnect_scenario() {
    let p = participant(50);
    let broadcaster = DeviceBroadcaster::new(p.clone());
    broadcaster.run().expect("run");

    let dev = d435();
    broadcaster.add_device(dev.clone());
    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("123456789")));

    // Late reader attaches; the matched event must drive a (re-)send.
    let topic = p.create_topic::<DeviceInfo>(DEVICE_INFO_TOPIC).unwrap();
    let reader = p
        .create_subscriber(QoS::default())
        .unwrap()
        .create_reader(&topic, QoS::reliable())
        .unwrap();

    let info = reader
        .take_timeout(Duration::from_secs(5))
        .unwrap()
        .expect("late joiner must receive device info");
    assert_eq!(info.serial, "123456789");
    assert_eq!(info.name, "Intel RealSense D435");
    assert_eq!(info.product_line, "D400");
    assert!(!info.locked);
    assert_eq!(info.topic_root, "realsense/D435/123456789");

    broadcaster.remove_device(dev.as_ref());
    assert!(wait_until(Duration::from_secs(5), || !broadcaster
        .contains("123456789")));
    assert!(wait_until(Duration::from_secs(5), || reader.matched_count()
        == 0));
}

/// Adding the same serial twice leaves exactly one writer.
#[test]
fn test_add_device_is_idempotent() {
    let p = participant(51);
    let broadcaster = DeviceBroadcaster::new(p.clone());
    broadcaster.run().expect("run");

    broadcaster.add_device(d435());
    broadcaster.add_device(d435());
    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("123456789")));
    assert_eq!(broadcaster.device_count(), 1);

    // A reader on the shared topic matches one writer per registered
    // device; exactly one here.
    let topic = p.create_topic::<DeviceInfo>(DEVICE_INFO_TOPIC).unwrap();
    let reader = p
        .create_subscriber(QoS::default())
        .unwrap()
        .create_reader(&topic, QoS::reliable())
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || reader.matched_count()
        >= 1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(reader.matched_count(), 1);
}

/// Removing unknown serials never panics and changes nothing.
#[test]
fn test_remove_unknown_device_is_noop() {
    let p = participant(52);
    let broadcaster = DeviceBroadcaster::new(p);
    broadcaster.run().expect("run");

    broadcaster.remove_by_serial("no-such-serial");

    let dev = d435();
    broadcaster.add_device(dev.clone());
    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("123456789")));

    // Double remove: second one must be a quiet no-op.
    broadcaster.remove_device(dev.as_ref());
    broadcaster.remove_device(dev.as_ref());
    assert!(wait_until(Duration::from_secs(5), || !broadcaster
        .contains("123456789")));
    assert_eq!(broadcaster.device_count(), 0);
}

/// Rapid alternating add/remove of one serial resolves to the final
/// operation - no lost updates, no dangling writer.
#[test]
fn test_rapid_add_remove_resolves_to_last_operation() {
    let p = participant(53);
    let broadcaster = DeviceBroadcaster::new(p);
    broadcaster.run().expect("run");

    let dev = d435();
    for _ in 0..25 {
        broadcaster.add_device(dev.clone());
        broadcaster.remove_device(dev.as_ref());
    }
    broadcaster.add_device(dev.clone());

    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("123456789")));
    assert_eq!(broadcaster.device_count(), 1);
}

/// Each thread churns its own serial and finishes with
/// an add; every serial must end up registered exactly once.
#[test]
fn test_concurrent_add_remove_from_multiple_threads() {
    let p = participant(54);
    let broadcaster = Arc::new(DeviceBroadcaster::new(p));
    broadcaster.run().expect("run");

    let mut handles = Vec::new();
    for t in 0..4 {
        let broadcaster = Arc::clone(&broadcaster);
        handles.push(thread::spawn(move || {
            let serial = format!("serial-{}", t);
            let dev = Arc::new(StaticDevice::new(
                "Intel RealSense D455",
                &serial,
                "D400",
                false,
            ));
            for _ in 0..20 {
                broadcaster.add_device(dev.clone());
                broadcaster.remove_device(dev.as_ref());
            }
            broadcaster.add_device(dev);
        }));
    }
    for handle in handles {
        handle.join().expect("worker thread");
    }

    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .device_count()
        == 4));
    for t in 0..4 {
        assert!(broadcaster.contains(&format!("serial-{}", t)));
    }
}

/// A subscriber attaching after the device was announced still gets
/// the info, without any further add_device call.
#[test]
fn test_late_joiner_receives_device_info() {
    let p = participant(55);
    let broadcaster = DeviceBroadcaster::new(p.clone());
    broadcaster.run().expect("run");

    broadcaster.add_device(Arc::new(StaticDevice::new(
        "Intel RealSense L515",
        "f0011223",
        "L500",
        true,
    )));
    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("f0011223")));

    let topic = p.create_topic::<DeviceInfo>(DEVICE_INFO_TOPIC).unwrap();
    let reader = p
        .create_subscriber(QoS::default())
        .unwrap()
        .create_reader(&topic, QoS::reliable())
        .unwrap();

    let info = reader
        .take_timeout(Duration::from_secs(5))
        .unwrap()
        .expect("late joiner must receive device info");
    assert_eq!(info.serial, "f0011223");
    assert_eq!(info.topic_root, "realsense/L515/f0011223");
    assert!(info.locked);
}

/// Two registered devices mean two writers on the shared topic; a new
/// reader receives both info records.
#[test]
fn test_reader_receives_every_registered_device() {
    let p = participant(58);
    let broadcaster = DeviceBroadcaster::new(p.clone());
    broadcaster.run().expect("run");

    broadcaster.add_device(d435());
    broadcaster.add_device(Arc::new(StaticDevice::new(
        "Intel RealSense D455",
        "987654321",
        "D400",
        false,
    )));
    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .device_count()
        == 2));

    let topic = p.create_topic::<DeviceInfo>(DEVICE_INFO_TOPIC).unwrap();
    let reader = p
        .create_subscriber(QoS::default())
        .unwrap()
        .create_reader(&topic, QoS::reliable())
        .unwrap();

    let mut serials = Vec::new();
    for _ in 0..2 {
        let info = reader
            .take_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("each device's info must arrive");
        serials.push(info.serial);
    }
    serials.sort();
    assert_eq!(serials, vec!["123456789", "987654321"]);
}

/// Devices may be handed to the broadcaster before `run()`; they register
/// once the worker starts.
#[test]
fn test_add_before_run_registers_after_run() {
    let p = participant(57);
    let broadcaster = DeviceBroadcaster::new(p);

    broadcaster.add_device(d435());
    broadcaster.run().expect("run");

    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("123456789")));
}

/// A second `run()` is rejected.
#[test]
fn test_run_twice_is_an_error() {
    let p = participant(59);
    let broadcaster = DeviceBroadcaster::new(p);
    broadcaster.run().expect("first run");
    assert!(broadcaster.run().is_err());
}

/// Destruction never hangs on the waiter's condition variable, even
/// while readers keep matching right up to shutdown.
#[test]
fn test_shutdown_is_bounded() {
    let p = participant(56);
    let broadcaster = DeviceBroadcaster::new(p.clone());
    broadcaster.run().expect("run");
    broadcaster.add_device(d435());
    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("123456789")));

    let topic = p.create_topic::<DeviceInfo>(DEVICE_INFO_TOPIC).unwrap();
    let _reader = p
        .create_subscriber(QoS::default())
        .unwrap()
        .create_reader(&topic, QoS::reliable())
        .unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        drop(broadcaster);
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(10))
        .expect("broadcaster shutdown hung");
}

/// The broadcaster queries the device through the DeviceSource seam at
/// send time, so whatever the device reports then is what goes out.
#[test]
fn test_device_source_is_queried_at_send_time() {
    struct FlakyNameDevice;

    impl DeviceSource for FlakyNameDevice {
        fn name(&self) -> String {
            "Intel RealSense D415".to_string()
        }
        fn serial(&self) -> String {
            "aabbccdd".to_string()
        }
        fn product_line(&self) -> String {
            "D400".to_string()
        }
        fn locked(&self) -> bool {
            false
        }
    }

    let p = participant(67);
    let broadcaster = DeviceBroadcaster::new(p.clone());
    broadcaster.run().expect("run");
    broadcaster.add_device(Arc::new(FlakyNameDevice));
    assert!(wait_until(Duration::from_secs(5), || broadcaster
        .contains("aabbccdd")));

    let topic = p.create_topic::<DeviceInfo>(DEVICE_INFO_TOPIC).unwrap();
    let reader = p
        .create_subscriber(QoS::default())
        .unwrap()
        .create_reader(&topic, QoS::reliable())
        .unwrap();
    let info = reader
        .take_timeout(Duration::from_secs(5))
        .unwrap()
        .expect("device info");
    assert_eq!(info.topic_root, "realsense/D415/aabbccdd");
}
