// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Device identity: the info record published per device, and the seam to
//! the device-management layer that owns the actual hardware handles.

use crate::bus::codec::{BusData, Decoder, Encoder};
use crate::{Error, Result};

/// Shared topic every device's writer publishes on.
pub const DEVICE_INFO_TOPIC: &str = "realsense/device-info";

/// Vendor display-name prefix stripped when deriving the topic root.
pub const DEVICE_NAME_PREFIX: &str = "Intel RealSense ";

const TOPIC_ROOT_PREFIX: &str = "realsense/";

/// Wire capacity per field, in UTF-8 bytes. Oversized values are rejected
/// at encode time, never truncated.
pub const MAX_NAME_LEN: usize = 64;
pub const MAX_SERIAL_LEN: usize = 32;
pub const MAX_PRODUCT_LINE_LEN: usize = 32;
pub const MAX_TOPIC_ROOT_LEN: usize = 128;

/// Borrowed view of a connected device.
///
/// The device-management layer owns the underlying handle and its lifetime;
/// the broadcaster only queries identity through this trait and must not
/// assume the handle stays valid beyond the shared reference it holds.
pub trait DeviceSource: Send + Sync {
    /// Vendor display name, e.g. `"Intel RealSense D435"`.
    fn name(&self) -> String;
    /// Unique serial number; the stable registration key.
    fn serial(&self) -> String;
    /// Product family, e.g. `"D400"`.
    fn product_line(&self) -> String;
    /// Camera lock state.
    fn locked(&self) -> bool;
}

/// Trivial [`DeviceSource`] backed by plain values. Used by the server tool
/// to stand in for SDK device handles, and by tests.
#[derive(Debug, Clone)]
pub struct StaticDevice {
    name: String,
    serial: String,
    product_line: String,
    locked: bool,
}

impl StaticDevice {
    pub fn new(name: &str, serial: &str, product_line: &str, locked: bool) -> Self {
        Self {
            name: name.to_string(),
            serial: serial.to_string(),
            product_line: product_line.to_string(),
            locked,
        }
    }
}

impl DeviceSource for StaticDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn product_line(&self) -> String {
        self.product_line.clone()
    }

    fn locked(&self) -> bool {
        self.locked
    }
}

/// Derive the per-device topic root, e.g. `realsense/D435/123456789`.
///
/// Pure: the same name and serial always produce the same root. The vendor
/// display prefix is dropped so the path carries only the model part; names
/// without the prefix pass through unchanged.
pub fn topic_root_for(name: &str, serial: &str) -> String {
    let model = name.strip_prefix(DEVICE_NAME_PREFIX).unwrap_or(name);
    format!("{}{}/{}", TOPIC_ROOT_PREFIX, model, serial)
}

/// One device's published identity. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub serial: String,
    pub product_line: String,
    pub locked: bool,
    pub topic_root: String,
}

impl DeviceInfo {
    /// Query a device and derive its info record.
    ///
    /// Rejects devices with an empty serial: the serial is the registration
    /// key and the topic-root component, so there is nothing sane to
    /// publish without one.
    pub fn from_source(device: &dyn DeviceSource) -> Result<Self> {
        let serial = device.serial();
        if serial.is_empty() {
            return Err(Error::InvalidDeviceInfo(
                "device reports an empty serial number".into(),
            ));
        }
        let name = device.name();
        let topic_root = topic_root_for(&name, &serial);
        Ok(Self {
            name,
            serial,
            product_line: device.product_line(),
            locked: device.locked(),
            topic_root,
        })
    }
}

impl BusData for DeviceInfo {
    fn type_name() -> &'static str {
        "camdds::DeviceInfo"
    }

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.put_str_bounded("name", &self.name, MAX_NAME_LEN)?;
        enc.put_str_bounded("serial", &self.serial, MAX_SERIAL_LEN)?;
        enc.put_str_bounded("product_line", &self.product_line, MAX_PRODUCT_LINE_LEN)?;
        enc.put_str_bounded("topic_root", &self.topic_root, MAX_TOPIC_ROOT_LEN)?;
        enc.put_bool(self.locked);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let name = dec.get_str_bounded("name", MAX_NAME_LEN)?;
        let serial = dec.get_str_bounded("serial", MAX_SERIAL_LEN)?;
        let product_line = dec.get_str_bounded("product_line", MAX_PRODUCT_LINE_LEN)?;
        let topic_root = dec.get_str_bounded("topic_root", MAX_TOPIC_ROOT_LEN)?;
        let locked = dec.get_bool()?;
        Ok(Self {
            name,
            serial,
            product_line,
            locked,
            topic_root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d435() -> StaticDevice {
        StaticDevice::new("Intel RealSense D435", "123456789", "D400", false)
    }

    #[test]
    fn test_topic_root_strips_vendor_prefix() {
        assert_eq!(
            topic_root_for("Intel RealSense D435", "123456789"),
            "realsense/D435/123456789"
        );
    }

    #[test]
    fn test_topic_root_without_prefix_passes_through() {
        assert_eq!(topic_root_for("OtherCam 9000", "abc"), "realsense/OtherCam 9000/abc");
    }

    #[test]
    fn test_topic_root_deterministic() {
        let a = topic_root_for("Intel RealSense L515", "f0011223");
        let b = topic_root_for("Intel RealSense L515", "f0011223");
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_source() {
        let info = DeviceInfo::from_source(&d435()).unwrap();
        assert_eq!(info.name, "Intel RealSense D435");
        assert_eq!(info.serial, "123456789");
        assert_eq!(info.product_line, "D400");
        assert!(!info.locked);
        assert_eq!(info.topic_root, "realsense/D435/123456789");
    }

    #[test]
    fn test_from_source_rejects_empty_serial() {
        let dev = StaticDevice::new("Intel RealSense D435", "", "D400", false);
        assert!(matches!(
            DeviceInfo::from_source(&dev),
            Err(Error::InvalidDeviceInfo(_))
        ));
    }

    #[test]
    fn test_wire_roundtrip_preserves_all_fields() {
        let info = DeviceInfo {
            name: "Intel RealSense D455".to_string(),
            serial: "987654321".to_string(),
            product_line: "D400".to_string(),
            locked: true,
            topic_root: topic_root_for("Intel RealSense D455", "987654321"),
        };

        let mut enc = Encoder::new();
        info.encode(&mut enc).unwrap();
        let buf = enc.into_vec();

        let mut dec = Decoder::new(&buf);
        let back = DeviceInfo::decode(&mut dec).unwrap();
        assert_eq!(back, info);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn test_encode_rejects_oversized_serial() {
        let info = DeviceInfo {
            name: "Intel RealSense D435".to_string(),
            serial: "s".repeat(MAX_SERIAL_LEN + 1),
            product_line: "D400".to_string(),
            locked: false,
            topic_root: "realsense/D435/x".to_string(),
        };
        let mut enc = Encoder::new();
        assert!(matches!(
            info.encode(&mut enc),
            Err(Error::FieldTooLong {
                field: "serial",
                ..
            })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_name() {
        let info = DeviceInfo {
            name: "n".repeat(MAX_NAME_LEN + 1),
            serial: "123".to_string(),
            product_line: "D400".to_string(),
            locked: false,
            topic_root: "realsense/x/123".to_string(),
        };
        let mut enc = Encoder::new();
        assert!(matches!(
            info.encode(&mut enc),
            Err(Error::FieldTooLong { field: "name", .. })
        ));
    }
}
