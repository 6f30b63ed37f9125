//! Device reporter — captures Metal device capabilities and prints them.
//!
//! Capabilities are snapshotted into a plain [`DeviceInfo`] so the report
//! formatting is independent of the Metal bindings. On hosts without Metal
//! enumeration simply yields no devices.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

#[cfg(target_os = "macos")]
use crate::metal::device_init;

const MIB: u64 = 1024 * 1024;

/// GPU feature families included in the report, in print order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum GpuFamily {
    Mac(u8),
    Apple(u8),
}

impl GpuFamily {
    pub const REPORTED: [GpuFamily; 10] = [
        GpuFamily::Mac(1),
        GpuFamily::Mac(2),
        GpuFamily::Apple(1),
        GpuFamily::Apple(2),
        GpuFamily::Apple(3),
        GpuFamily::Apple(4),
        GpuFamily::Apple(5),
        GpuFamily::Apple(6),
        GpuFamily::Apple(7),
        GpuFamily::Apple(8),
    ];
}

impl fmt::Display for GpuFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuFamily::Mac(n) => write!(f, "Mac {}", n),
            GpuFamily::Apple(n) => write!(f, "Apple {}", n),
        }
    }
}

impl From<GpuFamily> for String {
    fn from(family: GpuFamily) -> String {
        family.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilySupport {
    pub family: GpuFamily,
    pub supported: bool,
}

/// Static capability snapshot of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub registry_id: u64,
    pub headless: bool,
    pub unified_memory: bool,
    /// Bytes.
    pub recommended_max_working_set_size: u64,
    pub families: Vec<FamilySupport>,
    pub max_threads_per_threadgroup: usize,
    /// Bytes.
    pub max_buffer_length: u64,
    pub supports_32bit_float_filtering: bool,
    pub supports_query_texture_lod: bool,
    pub supports_bc_texture_compression: bool,
    pub supports_pull_model_interpolation: bool,
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Whole mebibytes, rounded down.
pub fn bytes_to_mib(bytes: u64) -> u64 {
    bytes / MIB
}

/// Print one device report, or a placeholder when there is no device.
pub fn write_device_info<W: Write>(out: &mut W, device: Option<&DeviceInfo>) -> io::Result<()> {
    let Some(info) = device else {
        return writeln!(out, "Device: NULL");
    };

    writeln!(out, "=== Device Information ===")?;
    writeln!(out, "Name: {}", info.name)?;
    writeln!(out, "Registry ID: {}", info.registry_id)?;
    writeln!(out, "Headless: {}", yes_no(info.headless))?;
    writeln!(out, "Unified Memory: {}", yes_no(info.unified_memory))?;

    writeln!(
        out,
        "Recommended Max Working Set Size: {} MB",
        bytes_to_mib(info.recommended_max_working_set_size)
    )?;

    for flag in &info.families {
        writeln!(out, "Supports Family {}: {}", flag.family, yes_no(flag.supported))?;
    }

    writeln!(out, "Max Threads Per Threadgroup: {}", info.max_threads_per_threadgroup)?;
    writeln!(out, "Max Buffer Length: {} MB", bytes_to_mib(info.max_buffer_length))?;

    writeln!(
        out,
        "Supports 32-bit Float Filtering: {}",
        yes_no(info.supports_32bit_float_filtering)
    )?;
    writeln!(
        out,
        "Supports Query Texture LOD: {}",
        yes_no(info.supports_query_texture_lod)
    )?;
    writeln!(
        out,
        "Supports BC Texture Compression: {}",
        yes_no(info.supports_bc_texture_compression)
    )?;
    writeln!(
        out,
        "Supports Pull Model Interpolation: {}",
        yes_no(info.supports_pull_model_interpolation)
    )?;

    writeln!(out, "=========================")?;
    writeln!(out)
}

/// Print the enumeration header followed by a numbered report per device.
pub fn write_all_devices<W: Write>(out: &mut W, devices: &[DeviceInfo]) -> io::Result<()> {
    writeln!(out, "\n=== All Available Metal Devices ===")?;

    if devices.is_empty() {
        return writeln!(out, "No Metal devices found!");
    }

    writeln!(out, "Found {} Metal device(s):", devices.len())?;
    writeln!(out)?;

    for (i, device) in devices.iter().enumerate() {
        writeln!(out, "Device {}:", i + 1)?;
        write_device_info(out, Some(device))?;
    }
    Ok(())
}

/// Snapshot every Metal device on the system.
///
/// Returns an empty list when Metal is unavailable.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    #[cfg(target_os = "macos")]
    {
        device_init::all_devices()
    }
    #[cfg(not(target_os = "macos"))]
    {
        Vec::new()
    }
}
