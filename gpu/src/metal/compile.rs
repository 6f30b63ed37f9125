//! Metal library loading and pipeline compilation

use log::{debug, info};
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_foundation::{NSError, NSString, NSURL};
use objc2_metal::{MTLComputePipelineState, MTLDevice, MTLFunction, MTLLibrary};

use super::device_init::MetalContext;
use crate::error::{GpuError, Result};
use crate::runner::LibrarySource;

/// A compiled Metal compute kernel ready for dispatch.
pub struct CompiledKernel {
    pub pipeline: Retained<ProtocolObject<dyn MTLComputePipelineState>>,
    /// Maximum threads per threadgroup for this pipeline.
    pub max_threads_per_group: usize,
}

fn describe(error: &NSError) -> Option<String> {
    Some(error.localizedDescription().to_string())
}

/// Load the kernel library.
///
/// For [`LibrarySource::Precompiled`] the library embedded in the app bundle
/// wins; the metallib file is only read when no default library exists.
#[allow(unused_unsafe)]
pub fn load_library(
    ctx: &MetalContext,
    source: &LibrarySource,
) -> Result<Retained<ProtocolObject<dyn MTLLibrary>>> {
    match source {
        LibrarySource::Precompiled { fallback } => {
            // Embedded default library first
            if let Some(library) = unsafe { ctx.device.newDefaultLibrary() } {
                info!("loaded default Metal library");
                return Ok(library);
            }

            // Then the metallib file
            debug!("no default library, loading {}", fallback.display());
            let url = NSURL::from_file_path(fallback).ok_or_else(|| GpuError::LibraryLoad {
                detail: Some(format!("invalid library path {}", fallback.display())),
            })?;
            let library = unsafe { ctx.device.newLibraryWithURL_error(&url) }.map_err(|e| {
                GpuError::LibraryLoad {
                    detail: describe(&e),
                }
            })?;
            info!("loaded Metal library from {}", fallback.display());
            Ok(library)
        }
        LibrarySource::Msl(code) => {
            // Compile MSL source → MTLLibrary
            let source_ns = NSString::from_str(code);
            let library = ctx
                .device
                .newLibraryWithSource_options_error(&source_ns, None)
                .map_err(|e| GpuError::LibraryLoad {
                    detail: describe(&e),
                })?;
            info!("compiled Metal library from source");
            Ok(library)
        }
    }
}

/// Look up a kernel function by name.
pub fn resolve_function(
    library: &ProtocolObject<dyn MTLLibrary>,
    fn_name: &str,
) -> Result<Retained<ProtocolObject<dyn MTLFunction>>> {
    let fn_name_ns = NSString::from_str(fn_name);
    library
        .newFunctionWithName(&fn_name_ns)
        .ok_or_else(|| GpuError::FunctionNotFound {
            name: fn_name.to_string(),
        })
}

/// Create a compute pipeline state for `function`.
pub fn build_pipeline(
    ctx: &MetalContext,
    function: &ProtocolObject<dyn MTLFunction>,
) -> Result<CompiledKernel> {
    // Create compute pipeline state
    let pipeline = ctx
        .device
        .newComputePipelineStateWithFunction_error(function)
        .map_err(|e| GpuError::PipelineCreation {
            detail: describe(&e),
        })?;

    let max_threads_per_group = pipeline.maxTotalThreadsPerThreadgroup();
    info!("pipeline ready, max {} threads per threadgroup", max_threads_per_group);

    Ok(CompiledKernel {
        pipeline,
        max_threads_per_group,
    })
}

/// Compile MSL source code straight into a pipeline.
///
/// `fn_name` must match the kernel function name in the MSL source.
#[cfg(test)]
pub fn compile_msl(ctx: &MetalContext, source: &str, fn_name: &str) -> Result<CompiledKernel> {
    let library = load_library(ctx, &LibrarySource::Msl(source.to_string()))?;
    // Get kernel function from library
    let function = resolve_function(&library, fn_name)?;
    build_pipeline(ctx, &function)
}
