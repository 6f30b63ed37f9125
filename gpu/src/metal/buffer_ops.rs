//! Metal buffer operations — GPU memory allocation and data transfer

use std::ptr::NonNull;

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLBuffer, MTLDevice, MTLResourceOptions};

use super::device_init::MetalContext;
use crate::error::{GpuError, Result};

/// Metal-specific GPU buffer wrapping an MTLBuffer.
pub struct MetalBuffer {
    pub(crate) mtl_buffer: Retained<ProtocolObject<dyn MTLBuffer>>,
    pub(crate) byte_size: usize,
}

impl MetalBuffer {
    /// Create a shared buffer initialised with a copy of `data`.
    pub fn from_slice<T: Copy>(ctx: &MetalContext, data: &[T]) -> Result<Self> {
        let byte_size = std::mem::size_of_val(data);
        if byte_size == 0 {
            return Err(GpuError::BufferAllocation { bytes: 0 });
        }

        let ptr = NonNull::new(data.as_ptr() as *mut std::ffi::c_void)
            .ok_or(GpuError::BufferAllocation { bytes: byte_size })?;
        let mtl_buffer = unsafe {
            ctx.device.newBufferWithBytes_length_options(
                ptr,
                byte_size,
                MTLResourceOptions::StorageModeShared,
            )
        }
        .ok_or(GpuError::BufferAllocation { bytes: byte_size })?;

        Ok(MetalBuffer {
            mtl_buffer,
            byte_size,
        })
    }

    /// Allocate an uninitialised shared buffer of `byte_size` bytes.
    pub fn allocate(ctx: &MetalContext, byte_size: usize) -> Result<Self> {
        if byte_size == 0 {
            return Err(GpuError::BufferAllocation { bytes: 0 });
        }

        let mtl_buffer = ctx
            .device
            .newBufferWithLength_options(byte_size, MTLResourceOptions::StorageModeShared)
            .ok_or(GpuError::BufferAllocation { bytes: byte_size })?;

        Ok(MetalBuffer {
            mtl_buffer,
            byte_size,
        })
    }

    /// Get a raw CPU-accessible pointer to the buffer contents.
    pub fn contents(&self) -> *mut u8 {
        self.mtl_buffer.contents().as_ptr() as *mut u8
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Copy the first `count` floats back to host memory.
    ///
    /// Only valid once the GPU work writing this buffer has completed.
    pub fn read_f32(&self, count: usize) -> Vec<f32> {
        let count = count.min(self.byte_size / std::mem::size_of::<f32>());
        let mut data = vec![0f32; count];
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.contents() as *const f32,
                data.as_mut_ptr(),
                count,
            );
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_round_trips_host_data() {
        if !MetalContext::is_available() {
            println!("Metal not available, skipping");
            return;
        }
        let ctx = MetalContext::new().unwrap();
        let data = [1.5f32, -2.0, 3.25];
        let buf = MetalBuffer::from_slice(&ctx, &data).unwrap();
        assert_eq!(buf.byte_size(), 12);
        assert_eq!(buf.read_f32(3), data.to_vec());
        assert_eq!(buf.read_f32(10).len(), 3);
    }

    #[test]
    fn test_zero_sized_buffers_are_rejected() {
        if !MetalContext::is_available() {
            println!("Metal not available, skipping");
            return;
        }
        let ctx = MetalContext::new().unwrap();
        assert!(matches!(
            MetalBuffer::allocate(&ctx, 0),
            Err(GpuError::BufferAllocation { bytes: 0 })
        ));
        let empty: [f32; 0] = [];
        assert!(MetalBuffer::from_slice(&ctx, &empty).is_err());
    }
}
