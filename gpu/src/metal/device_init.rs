//! Metal device initialization and capability queries

use log::info;
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{
    MTLCommandQueue, MTLCopyAllDevices, MTLCreateSystemDefaultDevice, MTLDevice, MTLGPUFamily,
};

use crate::device::{DeviceInfo, FamilySupport, GpuFamily};
use crate::error::{GpuError, Result};

// MTLCreateSystemDefaultDevice requires CoreGraphics to be linked
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {}

/// Default device plus the command queue the run submits to.
///
/// Both are released when the context is dropped.
pub struct MetalContext {
    pub device: Retained<ProtocolObject<dyn MTLDevice>>,
    pub command_queue: Retained<ProtocolObject<dyn MTLCommandQueue>>,
}

impl MetalContext {
    /// Create a context on the system default device.
    pub fn new() -> Result<Self> {
        let device = MTLCreateSystemDefaultDevice().ok_or(GpuError::NoDevice)?;
        let command_queue = device.newCommandQueue().ok_or(GpuError::CommandQueue)?;
        info!("using default Metal device '{}'", device.name());
        Ok(MetalContext {
            device,
            command_queue,
        })
    }

    /// Check if Metal is available on this system.
    pub fn is_available() -> bool {
        MTLCreateSystemDefaultDevice().is_some()
    }

    pub fn info(&self) -> DeviceInfo {
        query_device_info(&self.device)
    }
}

#[allow(deprecated)]
fn mtl_family(family: GpuFamily) -> Option<MTLGPUFamily> {
    let mapped = match family {
        GpuFamily::Mac(1) => MTLGPUFamily::Mac1,
        GpuFamily::Mac(2) => MTLGPUFamily::Mac2,
        GpuFamily::Apple(1) => MTLGPUFamily::Apple1,
        GpuFamily::Apple(2) => MTLGPUFamily::Apple2,
        GpuFamily::Apple(3) => MTLGPUFamily::Apple3,
        GpuFamily::Apple(4) => MTLGPUFamily::Apple4,
        GpuFamily::Apple(5) => MTLGPUFamily::Apple5,
        GpuFamily::Apple(6) => MTLGPUFamily::Apple6,
        GpuFamily::Apple(7) => MTLGPUFamily::Apple7,
        GpuFamily::Apple(8) => MTLGPUFamily::Apple8,
        _ => return None,
    };
    Some(mapped)
}

/// Snapshot the static capability fields of `device`.
pub fn query_device_info(device: &ProtocolObject<dyn MTLDevice>) -> DeviceInfo {
    let families = GpuFamily::REPORTED
        .iter()
        .map(|&family| FamilySupport {
            family,
            supported: mtl_family(family).is_some_and(|f| device.supportsFamily(f)),
        })
        .collect();

    DeviceInfo {
        name: device.name().to_string(),
        registry_id: device.registryID(),
        headless: device.isHeadless(),
        unified_memory: device.hasUnifiedMemory(),
        recommended_max_working_set_size: device.recommendedMaxWorkingSetSize(),
        families,
        max_threads_per_threadgroup: device.maxThreadsPerThreadgroup().width,
        max_buffer_length: device.maxBufferLength() as u64,
        supports_32bit_float_filtering: device.supports32BitFloatFiltering(),
        supports_query_texture_lod: device.supportsQueryTextureLOD(),
        supports_bc_texture_compression: device.supportsBCTextureCompression(),
        supports_pull_model_interpolation: device.supportsPullModelInterpolation(),
    }
}

/// Snapshot every device returned by `MTLCopyAllDevices`.
pub fn all_devices() -> Vec<DeviceInfo> {
    let devices = MTLCopyAllDevices();
    info!("found {} Metal device(s)", devices.count());
    devices
        .iter()
        .map(|device| query_device_info(&device))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metal_device_creation() {
        let available = MetalContext::is_available();
        println!("Metal available: {}", available);
        if available {
            let ctx = MetalContext::new().expect("Failed to create Metal context");
            let info = ctx.info();
            assert!(!info.name.is_empty());
            assert!(info.max_threads_per_threadgroup > 0);
            assert_eq!(info.families.len(), GpuFamily::REPORTED.len());
        }
    }

    #[test]
    fn test_default_device_is_enumerated() {
        if !MetalContext::is_available() {
            println!("Metal not available, skipping");
            return;
        }
        let ctx = MetalContext::new().unwrap();
        let default_id = ctx.info().registry_id;
        let all = all_devices();
        assert!(all.iter().any(|d| d.registry_id == default_id));
    }
}
