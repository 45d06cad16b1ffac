// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Device discovery broadcasting.
//!
//! Bridges a locally-connected device registry to the shared
//! `realsense/device-info` topic: one data writer per device, add/remove
//! serialized through a single-worker dispatcher, and a level-triggered
//! notifier that re-publishes device info whenever a late subscriber joins.

mod broadcaster;
mod device;
mod dispatcher;

pub use broadcaster::DeviceBroadcaster;
pub use device::{
    topic_root_for, DeviceInfo, DeviceSource, StaticDevice, DEVICE_INFO_TOPIC,
    DEVICE_NAME_PREFIX, MAX_NAME_LEN, MAX_PRODUCT_LINE_LEN, MAX_SERIAL_LEN, MAX_TOPIC_ROOT_LEN,
};
pub use dispatcher::Dispatcher;
