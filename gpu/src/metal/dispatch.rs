//! Metal compute kernel dispatch — encodes and submits GPU work.

use log::debug;
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{
    MTLCommandBuffer, MTLCommandBufferStatus, MTLCommandEncoder, MTLCommandQueue,
    MTLComputeCommandEncoder, MTLSize,
};

use super::buffer_ops::MetalBuffer;
use super::compile::CompiledKernel;
use super::device_init::MetalContext;
use crate::error::{GpuError, Result};
use crate::runner::CommandOutcome;

/// A committed command buffer that has not been waited on yet.
pub struct InFlight {
    command_buffer: Retained<ProtocolObject<dyn MTLCommandBuffer>>,
}

/// Encode one 1-D dispatch of `numel` threads and commit it.
///
/// `buffers[i]` is bound to argument slot `i`.
pub fn dispatch(
    ctx: &MetalContext,
    kernel: &CompiledKernel,
    buffers: &[&MetalBuffer],
    numel: usize,
    threads_per_group: usize,
) -> Result<InFlight> {
    // Create command buffer
    let command_buffer = ctx
        .command_queue
        .commandBuffer()
        .ok_or(GpuError::Encoding("failed to create command buffer"))?;

    // Create compute command encoder
    let encoder = command_buffer
        .computeCommandEncoder()
        .ok_or(GpuError::Encoding("failed to create compute encoder"))?;

    // Set pipeline state
    encoder.setComputePipelineState(&kernel.pipeline);

    // Bind buffers
    for (i, buf) in buffers.iter().enumerate() {
        unsafe {
            encoder.setBuffer_offset_atIndex(Some(&buf.mtl_buffer), 0, i);
        }
    }

    // 1-D grid, one thread per element
    let grid_size = MTLSize {
        width: numel,
        height: 1,
        depth: 1,
    };
    let threadgroup_size = MTLSize {
        width: threads_per_group,
        height: 1,
        depth: 1,
    };
    debug!("dispatching {} threads, {} per threadgroup", numel, threads_per_group);

    // Dispatch threads
    encoder.dispatchThreads_threadsPerThreadgroup(grid_size, threadgroup_size);

    // End encoding and commit
    encoder.endEncoding();
    command_buffer.commit();

    Ok(InFlight { command_buffer })
}

impl InFlight {
    /// Block until the GPU finishes, then report whether execution failed.
    pub fn wait(self) -> CommandOutcome {
        self.command_buffer.waitUntilCompleted();

        // Check for command buffer errors
        if self.command_buffer.status() != MTLCommandBufferStatus::Error {
            return CommandOutcome::Completed;
        }

        let detail = self
            .command_buffer
            .error()
            .map(|e| e.localizedDescription().to_string());
        debug!("command buffer status: error, {:?}", detail);
        CommandOutcome::Failed { detail }
    }
}
