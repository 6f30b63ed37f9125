//! Errors raised while probing devices or running the vector-add kernel.
//!
//! `Display` renders the exact diagnostic line printed on stderr before the
//! process exits with a failure status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::stage::Stage;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("Invalid element count {0}: at least one element is required")]
    InvalidCount(usize),

    #[error("Failed to create Metal device")]
    NoDevice,

    #[error("Failed to create command queue")]
    CommandQueue,

    #[error("Failed to read Metal source {}: {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to load Metal library{}", detail_suffix(.detail))]
    LibraryLoad { detail: Option<String> },

    #[error("Failed to find function '{name}' in library")]
    FunctionNotFound { name: String },

    #[error("Failed to create compute pipeline state{}", detail_suffix(.detail))]
    PipelineCreation { detail: Option<String> },

    #[error("Failed to allocate Metal buffer of {bytes} bytes")]
    BufferAllocation { bytes: usize },

    #[error("Failed to encode compute work: {0}")]
    Encoding(&'static str),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(text) => format!(": {}", text),
        None => String::new(),
    }
}

impl GpuError {
    /// The run stage this error aborts.
    pub fn stage(&self) -> Stage {
        match self {
            GpuError::InvalidCount(_) => Stage::Init,
            GpuError::NoDevice | GpuError::CommandQueue => Stage::LoadDefaultDevice,
            GpuError::SourceRead { .. } | GpuError::LibraryLoad { .. } => Stage::LoadLibrary,
            GpuError::FunctionNotFound { .. } => Stage::ResolveFunction,
            GpuError::PipelineCreation { .. } => Stage::BuildPipeline,
            GpuError::BufferAllocation { .. } => Stage::AllocateBuffers,
            GpuError::Encoding(_) => Stage::Dispatch,
            GpuError::Output(_) => Stage::Print,
        }
    }
}

pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_load_message_with_and_without_detail() {
        let bare = GpuError::LibraryLoad { detail: None };
        assert_eq!(bare.to_string(), "Failed to load Metal library");

        let detailed = GpuError::LibraryLoad {
            detail: Some("file not found".to_string()),
        };
        assert_eq!(
            detailed.to_string(),
            "Failed to load Metal library: file not found"
        );
    }

    #[test]
    fn test_function_not_found_names_the_function() {
        let err = GpuError::FunctionNotFound {
            name: "vector_add".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to find function 'vector_add' in library"
        );
        assert_eq!(err.stage(), Stage::ResolveFunction);
    }

    #[test]
    fn test_pipeline_error_carries_framework_text() {
        let err = GpuError::PipelineCreation {
            detail: Some("unsupported argument".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create compute pipeline state: unsupported argument"
        );
        assert_eq!(err.stage(), Stage::BuildPipeline);
    }

    #[test]
    fn test_fatal_kinds_map_to_load_stages() {
        assert_eq!(GpuError::NoDevice.stage(), Stage::LoadDefaultDevice);
        assert_eq!(
            GpuError::LibraryLoad { detail: None }.stage(),
            Stage::LoadLibrary
        );
        assert!(GpuError::NoDevice.stage() < GpuError::LibraryLoad { detail: None }.stage());
    }
}
