//! FTDI serial endpoint discovery, ported from `licut_probe.cpp`'s
//! `lsusb -v` scrape: find the `20d3:0011` FTDI entry, resolve its
//! endpoint's sysfs path, and pick out the `ttyUSB*` sibling.

use std::fs;
use std::process::Command;

const FTDI_ID: &str = "ID 20d3:0011";
const FALLBACK_DEVICE: &str = "/dev/ttyUSB0";

/// Find the tty path for the plotter's FTDI USB-serial adapter.
/// Falls back to `/dev/ttyUSB0` if an FTDI entry is found but no
/// `ttyUSB*` sysfs sibling can be resolved; fails only when no FTDI
/// device shows up in `lsusb -v` output at all.
pub fn find_device() -> Option<String> {
    let output = Command::new("lsusb").arg("-v").output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);

    let mut bus = 0u32;
    let mut device = 0u32;
    let mut found_ftdi = false;
    let mut in_ftdi = false;

    for line in text.lines() {
        if !in_ftdi && !found_ftdi && line.contains(FTDI_ID) {
            in_ftdi = true;
            found_ftdi = true;
            if let Some((b, d)) = parse_bus_device(line) {
                bus = b;
                device = d;
            }
        } else if in_ftdi && line.starts_with("Bus ") {
            in_ftdi = false;
        }

        if !in_ftdi {
            continue;
        }

        if let Some(endpoint) = parse_endpoint_address(line) {
            let class_dir = format!(
                "/sys/class/usb_endpoint/usbdev{}.{}_ep{:02x}/device",
                bus, device, endpoint
            );
            if let Ok(entries) = fs::read_dir(&class_dir) {
                for entry in entries.flatten() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if name.starts_with("ttyUSB") {
                        return Some(format!("/dev/{}", name));
                    }
                }
            }
        }
    }

    if found_ftdi {
        Some(FALLBACK_DEVICE.to_string())
    } else {
        None
    }
}

fn parse_bus_device(line: &str) -> Option<(u32, u32)> {
    // "Bus 001 Device 004: ID 20d3:0011 ..."
    let mut words = line.split_whitespace();
    if words.next()? != "Bus" {
        return None;
    }
    let bus: u32 = words.next()?.parse().ok()?;
    if words.next()? != "Device" {
        return None;
    }
    let device_field = words.next()?.trim_end_matches(':');
    let device: u32 = device_field.parse().ok()?;
    Some((bus, device))
}

fn parse_endpoint_address(line: &str) -> Option<u32> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("bEndpointAddress")?;
    let hex = rest.trim().split_whitespace().next()?;
    let hex = hex.strip_prefix("0x")?;
    u32::from_str_radix(hex, 16).ok()
}
