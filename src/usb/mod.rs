//! `rusb`-backed `LinkEndpoint`: physical USB enumeration and bulk I/O.
//! Mirrors `UsbTransport`'s enumerate/claim/bulk-I/O shape.

use std::time::Duration;

use log::debug;
use rusb::{DeviceHandle, UsbContext};

use crate::error::LinkError;
use crate::link::LinkEndpoint;

/// (class, subclass, protocol) of the ADB USB interface, per the reference `adb.h`.
const ADB_INTERFACE: (u8, u8, u8) = (0xFF, 0x42, 0x01);

/// Selects which attached ADB interface to open.
pub enum DeviceSelector {
    Index(usize),
    Serial(String),
}

/// A `LinkEndpoint` backed by a claimed USB bulk interface.
pub struct UsbLink {
    handle: DeviceHandle<rusb::Context>,
    ep_in: u8,
    ep_out: u8,
    interface_number: u8,
    timeout: Duration,
}

impl UsbLink {
    pub fn open(selector: DeviceSelector, timeout: Duration) -> Result<Self, LinkError> {
        let ctx = rusb::Context::new().map_err(|e| LinkError::Io(format!("libusb init failed: {e}")))?;
        let mut matches = Vec::new();
        for device in ctx.devices().map_err(|e| LinkError::Io(e.to_string()))?.iter() {
            let Ok(config) = device.active_config_descriptor() else { continue };
            for iface in config.interfaces() {
                for setting in iface.descriptors() {
                    let sig = (setting.class_code(), setting.sub_class_code(), setting.protocol_code());
                    if sig != ADB_INTERFACE {
                        continue;
                    }
                    let mut ep_in = None;
                    let mut ep_out = None;
                    for ep in setting.endpoint_descriptors() {
                        if ep.transfer_type() != rusb::TransferType::Bulk {
                            continue;
                        }
                        if ep.address() & 0x80 != 0 {
                            ep_in = Some(ep.address());
                        } else {
                            ep_out = Some(ep.address());
                        }
                    }
                    if let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) {
                        matches.push((device.clone(), setting.interface_number(), ep_in, ep_out));
                    }
                }
            }
        }

        if matches.is_empty() {
            return Err(LinkError::Io("no ADB USB interface found (class 0xff, subclass 0x42, protocol 1)".into()));
        }

        let (device, interface_number, ep_in, ep_out) = match selector {
            DeviceSelector::Index(i) => {
                if i >= matches.len() {
                    return Err(LinkError::Io(format!("device index {i} out of range ({} found)", matches.len())));
                }
                matches.remove(i)
            }
            DeviceSelector::Serial(serial) => {
                let pos = matches.iter().position(|(d, ..)| {
                    d.open()
                        .ok()
                        .and_then(|h| h.read_serial_number_string_ascii(&d.device_descriptor().ok()?).ok())
                        .is_some_and(|s| s == serial)
                });
                match pos {
                    Some(i) => matches.remove(i),
                    None => return Err(LinkError::Io(format!("no ADB device with serial {serial}"))),
                }
            }
        };

        let handle = device.open().map_err(|e| LinkError::Io(format!("opening device: {e}")))?;
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            handle.set_auto_detach_kernel_driver(true).ok();
        }
        handle
            .claim_interface(interface_number)
            .map_err(|e| LinkError::Io(format!("claiming interface {interface_number}: {e}")))?;
        debug!("claimed ADB interface {interface_number}, ep_in={ep_in:#x} ep_out={ep_out:#x}");
        Ok(Self { handle, ep_in, ep_out, interface_number, timeout })
    }
}

impl LinkEndpoint for UsbLink {
    fn read(&self, len: usize) -> Result<Vec<u8>, LinkError> {
        let mut buf = vec![0u8; len];
        let n = self.handle.read_bulk(self.ep_in, &mut buf, self.timeout).map_err(map_usb_err)?;
        buf.truncate(n);
        if buf.is_empty() {
            return Err(LinkError::Io("USB bulk read returned 0 bytes".into()));
        }
        Ok(buf)
    }

    fn write(&self, data: &[u8]) -> Result<(), LinkError> {
        let mut written = 0;
        while written < data.len() {
            let n = self
                .handle
                .write_bulk(self.ep_out, &data[written..], self.timeout)
                .map_err(map_usb_err)?;
            if n == 0 {
                return Err(LinkError::Io("USB bulk write returned 0 bytes (stall or timeout)".into()));
            }
            written += n;
        }
        Ok(())
    }

    fn close(&self) {
        let _ = self.handle.release_interface(self.interface_number);
    }
}

fn map_usb_err(e: rusb::Error) -> LinkError {
    match e {
        rusb::Error::Timeout => LinkError::Timeout,
        rusb::Error::NoDevice | rusb::Error::Io => LinkError::Closed,
        other => LinkError::Io(other.to_string()),
    }
}
