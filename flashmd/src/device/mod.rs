//! Device discovery and classification utilities.
//!
//! The dumper enumerates as a USB CDC ACM virtual serial port built on an
//! STM32 (VID `0x0483`, PID `0x5740`). Discovery walks the host's serial
//! ports and classifies each by its USB identifiers.

use crate::error::{Error, Result};
use crate::port::{PRODUCT_ID, VENDOR_ID};

use log::debug;
#[cfg(feature = "native")]
use log::{info, trace};

/// Classification of a discovered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// FlashMaster MD dumper (STM32 virtual COM port).
    FlashMaster,
    /// Some other STMicroelectronics CDC device.
    StmCdc,
    /// Unknown device.
    Unknown,
}

impl DeviceKind {
    /// Classify a VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        match (vid, pid) {
            (VENDOR_ID, PRODUCT_ID) => Self::FlashMaster,
            (VENDOR_ID, _) => Self::StmCdc,
            _ => Self::Unknown,
        }
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FlashMaster => "FlashMaster MD",
            Self::StmCdc => "STM32 CDC",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is the dumper itself.
    pub fn is_dumper(&self) -> bool {
        matches!(self, Self::FlashMaster)
    }
}

/// Discovered endpoint information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectedPort {
    /// Endpoint name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// Classified device kind.
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

/// Enumerate serial endpoints, failing if the host cannot enumerate at all.
#[cfg(feature = "native")]
pub fn try_detect_ports() -> Result<Vec<DetectedPort>> {
    let ports =
        serialport::available_ports().map_err(|e| Error::UsbInitFailed(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|port_info| {
            let mut detected = DetectedPort {
                name: port_info.port_name,
                device: DeviceKind::Unknown,
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
                serial: None,
            };

            if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                detected.vid = Some(usb_info.vid);
                detected.pid = Some(usb_info.pid);
                detected.manufacturer = usb_info.manufacturer;
                detected.product = usb_info.product;
                detected.serial = usb_info.serial_number;
                detected.device = DeviceKind::from_vid_pid(usb_info.vid, usb_info.pid);

                trace!(
                    "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                    detected.name, usb_info.vid, usb_info.pid, detected.device
                );
            }

            detected
        })
        .collect())
}

/// Enumerate serial endpoints (native support disabled).
#[cfg(not(feature = "native"))]
pub fn try_detect_ports() -> Result<Vec<DetectedPort>> {
    Err(Error::UsbInitFailed(
        "built without the `native` feature".to_string(),
    ))
}

/// Detect all available endpoints, logging and swallowing enumeration errors.
pub fn detect_ports() -> Vec<DetectedPort> {
    try_detect_ports().unwrap_or_else(|e| {
        debug!("Failed to enumerate serial ports: {e}");
        Vec::new()
    })
}

/// Pick the dumper out of a list of endpoints.
pub fn select_dumper(ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    ports
        .into_iter()
        .find(|p| p.device.is_dumper())
        .ok_or(Error::DeviceNotFound)
}

/// Auto-detect the attached dumper.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    let port = select_dumper(try_detect_ports()?)?;
    info!("Auto-detected {} on {}", port.device.name(), port.name);
    Ok(port)
}

/// Format a list of detected endpoints for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device_info = if port.device != DeviceKind::Unknown {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };

            let product_info = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();

            format!("{}{}{}", port.name, device_info, product_info)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, vid: Option<u16>, pid: Option<u16>) -> DetectedPort {
        DetectedPort {
            name: name.to_string(),
            device: match (vid, pid) {
                (Some(v), Some(p)) => DeviceKind::from_vid_pid(v, p),
                _ => DeviceKind::Unknown,
            },
            vid,
            pid,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    #[test]
    fn test_device_kind_from_vid_pid() {
        assert_eq!(DeviceKind::from_vid_pid(0x0483, 0x5740), DeviceKind::FlashMaster);
        assert_eq!(DeviceKind::from_vid_pid(0x0483, 0xDF11), DeviceKind::StmCdc);
        assert_eq!(DeviceKind::from_vid_pid(0x1A86, 0x7523), DeviceKind::Unknown);
    }

    #[test]
    fn test_select_dumper_prefers_flashmaster() {
        let ports = vec![
            port("/dev/ttyS0", None, None),
            port("/dev/ttyACM0", Some(0x0483), Some(0xDF11)),
            port("/dev/ttyACM1", Some(0x0483), Some(0x5740)),
        ];
        let selected = select_dumper(ports).unwrap();
        assert_eq!(selected.name, "/dev/ttyACM1");
    }

    #[test]
    fn test_select_dumper_none_is_device_not_found() {
        let ports = vec![port("/dev/ttyUSB0", Some(0x1A86), Some(0x7523))];
        assert!(matches!(select_dumper(ports), Err(Error::DeviceNotFound)));
    }

    #[test]
    fn test_format_port_list() {
        let mut dumper = port("/dev/ttyACM0", Some(0x0483), Some(0x5740));
        dumper.product = Some("STM32 Virtual ComPort".to_string());
        let ports = vec![dumper, port("/dev/ttyUSB1", Some(0x1A86), Some(0x7523))];

        let formatted = format_port_list(&ports);
        assert_eq!(formatted.len(), 2);
        assert!(formatted[0].contains("FlashMaster MD"));
        assert!(formatted[0].contains("STM32 Virtual ComPort"));
        assert!(formatted[1].contains("VID:1A86 PID:7523"));
    }
}
