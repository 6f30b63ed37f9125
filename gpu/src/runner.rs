//! Vector-add smoke test.
//!
//! Walks the [`Stage`] pipeline once: report devices, open the default
//! device, load the `vector_add` kernel, add two all-ones vectors on the GPU
//! and print the three vectors. Every load or compile failure aborts the run
//! with a [`GpuError`]; resources acquired so far are dropped on the way out.

use std::io::Write;
use std::path::PathBuf;

use log::info;

use crate::device::{self, DeviceInfo};
use crate::error::{GpuError, Result};
use crate::stage::{Stage, StageTracker};

pub const DEFAULT_METALLIB: &str = "build/mtlprobe_kernel.metallib";
pub const DEFAULT_FUNCTION: &str = "vector_add";
pub const DEFAULT_COUNT: usize = 8;

/// Upper bound on threads per threadgroup for the 1-D dispatch.
pub const MAX_THREADGROUP_WIDTH: usize = 32;

/// MSL source of the bundled `vector_add` kernel.
pub const VECTOR_ADD_MSL: &str = include_str!("../shaders/vector_add.metal");

/// Where the kernel library comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    /// The embedded default library, else the metallib at `fallback`.
    Precompiled { fallback: PathBuf },
    /// Metal Shading Language source compiled at runtime.
    Msl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub metallib: PathBuf,
    pub function: String,
    pub count: usize,
    /// Compile this MSL file instead of loading a precompiled library.
    pub source: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            metallib: PathBuf::from(DEFAULT_METALLIB),
            function: DEFAULT_FUNCTION.to_string(),
            count: DEFAULT_COUNT,
            source: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(GpuError::InvalidCount(self.count));
        }
        Ok(())
    }

    /// Resolve the library source, reading the MSL file if one was given.
    pub fn library_source(&self) -> Result<LibrarySource> {
        match &self.source {
            Some(path) => {
                let code = std::fs::read_to_string(path).map_err(|source| GpuError::SourceRead {
                    path: path.clone(),
                    source,
                })?;
                Ok(LibrarySource::Msl(code))
            }
            None => Ok(LibrarySource::Precompiled {
                fallback: self.metallib.clone(),
            }),
        }
    }
}

/// Result of waiting on the submitted command buffer.
///
/// A failed execution is reported but does not fail the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    Failed { detail: Option<String> },
}

/// Host-side inputs of the addition.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorAdd {
    pub a: Vec<f32>,
    pub b: Vec<f32>,
}

impl VectorAdd {
    pub fn ones(count: usize) -> Self {
        VectorAdd {
            a: vec![1.0; count],
            b: vec![1.0; count],
        }
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// C = A + B computed on the host.
    pub fn expected(&self) -> Vec<f32> {
        self.a.iter().zip(&self.b).map(|(x, y)| x + y).collect()
    }

    /// Index of the first element of `c` that differs from A + B.
    pub fn first_mismatch(&self, c: &[f32]) -> Option<usize> {
        if c.len() != self.len() {
            return Some(c.len().min(self.len()));
        }
        self.expected()
            .iter()
            .zip(c)
            .position(|(want, got)| (want - got).abs() > f32::EPSILON)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub devices: Vec<DeviceInfo>,
    pub default_device: DeviceInfo,
    pub inputs: VectorAdd,
    pub output: Vec<f32>,
    pub command: CommandOutcome,
}

/// Threads per threadgroup for a 1-D grid of `count` threads.
pub fn threadgroup_width(count: usize, pipeline_max: usize) -> usize {
    count.min(MAX_THREADGROUP_WIDTH).min(pipeline_max.max(1))
}

/// `label = v0 v1 ... ` with a space after every value.
pub fn format_vector(label: &str, values: &[f32]) -> String {
    let mut line = format!("{} = ", label);
    for v in values {
        line.push_str(&format!("{} ", v));
    }
    line
}

/// Report a failed command buffer on `diag`. Completed runs print nothing.
pub fn write_command_outcome<W: Write>(diag: &mut W, outcome: &CommandOutcome) -> std::io::Result<()> {
    if let CommandOutcome::Failed { detail } = outcome {
        writeln!(diag, "Command buffer execution failed")?;
        if let Some(detail) = detail {
            writeln!(diag, "Error: {}", detail)?;
        }
    }
    Ok(())
}

pub fn write_vectors<W: Write>(out: &mut W, inputs: &VectorAdd, output: &[f32]) -> std::io::Result<()> {
    writeln!(out, "{}", format_vector("A", &inputs.a))?;
    writeln!(out, "{}", format_vector("B", &inputs.b))?;
    writeln!(out, "{}", format_vector("C = A + B", output))
}

/// Print the device list, then run the vector addition on the default device.
///
/// Reports go to `out`; a command buffer failure is written to `diag` right
/// after the wait and does not fail the run.
pub fn run<W: Write, D: Write>(config: &RunConfig, out: &mut W, diag: &mut D) -> Result<RunReport> {
    with_autorelease_pool(|| -> Result<RunReport> {
        let mut stages = StageTracker::new();
        config.validate()?;

        stages.enter(Stage::EnumerateDevices);
        let devices = device::enumerate_devices();
        device::write_all_devices(out, &devices)?;

        stages.enter(Stage::LoadDefaultDevice);
        let report = run_on_default_device(config, &mut stages, devices, out, diag);
        if let Err(e) = &report {
            info!("run aborted during {}: {}", e.stage(), e);
        }
        report
    })
}

#[cfg(target_os = "macos")]
fn with_autorelease_pool<T>(f: impl FnOnce() -> T) -> T {
    objc2::rc::autoreleasepool(|_| f())
}

#[cfg(not(target_os = "macos"))]
fn with_autorelease_pool<T>(f: impl FnOnce() -> T) -> T {
    f()
}

#[cfg(target_os = "macos")]
fn run_on_default_device<W: Write, D: Write>(
    config: &RunConfig,
    stages: &mut StageTracker,
    devices: Vec<DeviceInfo>,
    out: &mut W,
    diag: &mut D,
) -> Result<RunReport> {
    use crate::metal::{buffer_ops::MetalBuffer, compile, device_init::MetalContext, dispatch};

    let ctx = MetalContext::new()?;
    let default_device = ctx.info();
    writeln!(out, "Using default device for computation:")?;
    device::write_device_info(out, Some(&default_device))?;
    writeln!(
        out,
        "Performing a simple parallelized vector addition to test working of GPU."
    )?;

    stages.enter(Stage::LoadLibrary);
    let library = compile::load_library(&ctx, &config.library_source()?)?;

    stages.enter(Stage::ResolveFunction);
    let function = compile::resolve_function(&library, &config.function)?;

    stages.enter(Stage::BuildPipeline);
    let kernel = compile::build_pipeline(&ctx, &function)?;

    stages.enter(Stage::AllocateBuffers);
    let inputs = VectorAdd::ones(config.count);
    let buf_a = MetalBuffer::from_slice(&ctx, &inputs.a)?;
    let buf_b = MetalBuffer::from_slice(&ctx, &inputs.b)?;
    let buf_c = MetalBuffer::allocate(&ctx, std::mem::size_of::<f32>() * inputs.len())?;

    stages.enter(Stage::Dispatch);
    let width = threadgroup_width(inputs.len(), kernel.max_threads_per_group);
    let in_flight = dispatch::dispatch(
        &ctx,
        &kernel,
        &[&buf_a, &buf_b, &buf_c],
        inputs.len(),
        width,
    )?;

    stages.enter(Stage::Wait);
    let command = in_flight.wait();
    write_command_outcome(diag, &command)?;

    stages.enter(Stage::Readback);
    let output = buf_c.read_f32(inputs.len());
    if let Some(i) = inputs.first_mismatch(&output) {
        log::warn!(
            "GPU result differs from host sum at index {}: expected {:?}, got {:?}",
            i,
            inputs.expected().get(i),
            output.get(i)
        );
    }

    stages.enter(Stage::Print);
    write_vectors(out, &inputs, &output)?;

    stages.enter(Stage::Cleanup);
    Ok(RunReport {
        devices,
        default_device,
        inputs,
        output,
        command,
    })
}

#[cfg(not(target_os = "macos"))]
fn run_on_default_device<W: Write, D: Write>(
    _config: &RunConfig,
    _stages: &mut StageTracker,
    _devices: Vec<DeviceInfo>,
    _out: &mut W,
    _diag: &mut D,
) -> Result<RunReport> {
    Err(GpuError::NoDevice)
}

/// Print the device list only.
pub fn report_devices<W: Write>(out: &mut W) -> Result<Vec<DeviceInfo>> {
    with_autorelease_pool(|| -> Result<Vec<DeviceInfo>> {
        let devices = device::enumerate_devices();
        device::write_all_devices(out, &devices)?;
        Ok(devices)
    })
}

/// Snapshot the device list without printing it.
pub fn collect_devices() -> Vec<DeviceInfo> {
    with_autorelease_pool(device::enumerate_devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threadgroup_width_caps_at_32() {
        assert_eq!(threadgroup_width(8, 1024), 8);
        assert_eq!(threadgroup_width(32, 1024), 32);
        assert_eq!(threadgroup_width(1000, 1024), 32);
        assert_eq!(threadgroup_width(1000, 16), 16);
        assert_eq!(threadgroup_width(1, 0), 1);
    }

    #[test]
    fn test_ones_add_to_twos() {
        let job = VectorAdd::ones(8);
        assert_eq!(job.len(), 8);
        assert_eq!(job.expected(), vec![2.0; 8]);
        assert_eq!(job.first_mismatch(&[2.0; 8]), None);
    }

    #[test]
    fn test_first_mismatch() {
        let job = VectorAdd::ones(4);
        assert_eq!(job.first_mismatch(&[2.0, 2.0, 0.0, 2.0]), Some(2));
        assert_eq!(job.first_mismatch(&[2.0, 2.0]), Some(2));
        assert_eq!(job.first_mismatch(&[0.0; 4]), Some(0));
    }

    #[test]
    fn test_format_vector_matches_stream_output() {
        assert_eq!(format_vector("A", &[1.0, 1.0, 1.0]), "A = 1 1 1 ");
        assert_eq!(format_vector("C = A + B", &[2.0, 2.5]), "C = A + B = 2 2.5 ");
        assert_eq!(format_vector("B", &[]), "B = ");
    }

    fn outcome_text(outcome: &CommandOutcome) -> String {
        let mut diag: Vec<u8> = Vec::new();
        write_command_outcome(&mut diag, outcome).unwrap();
        String::from_utf8(diag).unwrap()
    }

    #[test]
    fn test_command_failure_with_framework_text() {
        let outcome = CommandOutcome::Failed {
            detail: Some("Caused GPU Timeout Error".to_string()),
        };
        assert_eq!(
            outcome_text(&outcome),
            "Command buffer execution failed\nError: Caused GPU Timeout Error\n"
        );
    }

    #[test]
    fn test_command_failure_without_framework_text() {
        let outcome = CommandOutcome::Failed { detail: None };
        assert_eq!(outcome_text(&outcome), "Command buffer execution failed\n");
    }

    #[test]
    fn test_completed_command_prints_nothing() {
        assert_eq!(outcome_text(&CommandOutcome::Completed), "");
    }

    #[test]
    fn test_write_vectors() {
        let job = VectorAdd::ones(2);
        let mut out: Vec<u8> = Vec::new();
        write_vectors(&mut out, &job, &job.expected()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "A = 1 1 \nB = 1 1 \nC = A + B = 2 2 \n"
        );
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.function, "vector_add");
        assert_eq!(config.count, 8);
        assert_eq!(
            config.library_source().unwrap(),
            LibrarySource::Precompiled {
                fallback: PathBuf::from("build/mtlprobe_kernel.metallib")
            }
        );
    }

    #[test]
    fn test_zero_count_is_rejected_before_enumeration() {
        let config = RunConfig {
            count: 0,
            ..RunConfig::default()
        };
        let mut out: Vec<u8> = Vec::new();
        let err = run(&config, &mut out, &mut std::io::sink()).err().unwrap();
        assert!(matches!(err, GpuError::InvalidCount(0)));
        assert_eq!(err.stage(), Stage::Init);
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_source_file() {
        let config = RunConfig {
            source: Some(PathBuf::from("no/such/kernel.metal")),
            ..RunConfig::default()
        };
        let err = config.library_source().err().unwrap();
        assert!(matches!(err, GpuError::SourceRead { .. }));
        assert!(err.to_string().starts_with("Failed to read Metal source no/such/kernel.metal"));
    }

    #[test]
    fn test_bundled_source_defines_vector_add() {
        assert!(VECTOR_ADD_MSL.contains("kernel void vector_add"));
        assert!(VECTOR_ADD_MSL.contains("[[buffer(2)]]"));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_run_without_metal_reports_no_device() {
        let mut out: Vec<u8> = Vec::new();
        let err = run(&RunConfig::default(), &mut out, &mut std::io::sink()).err().unwrap();
        assert!(matches!(err, GpuError::NoDevice));
        assert_eq!(err.to_string(), "Failed to create Metal device");
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No Metal devices found!"));
        assert!(!text.contains("A = "));
    }

    #[cfg(target_os = "macos")]
    mod on_metal {
        use super::*;
        use crate::metal::device_init::MetalContext;

        fn source_config(function: &str) -> RunConfig {
            let path = std::env::temp_dir().join(format!(
                "mtlprobe_{}_{}.metal",
                function,
                std::process::id()
            ));
            std::fs::write(&path, VECTOR_ADD_MSL).unwrap();
            RunConfig {
                function: function.to_string(),
                source: Some(path),
                ..RunConfig::default()
            }
        }

        #[test]
        fn test_run_adds_ones() {
            if !MetalContext::is_available() {
                println!("Metal not available, skipping");
                return;
            }
            let mut out: Vec<u8> = Vec::new();
            let mut diag: Vec<u8> = Vec::new();
            let report = run(&source_config("vector_add"), &mut out, &mut diag).unwrap();
            assert_eq!(report.output, vec![2.0; 8]);
            assert_eq!(report.command, CommandOutcome::Completed);
            assert!(diag.is_empty());

            let text = String::from_utf8(out).unwrap();
            assert!(text.contains("Using default device for computation:"));
            assert!(text.contains("C = A + B = 2 2 2 2 2 2 2 2 \n"));
            // once per enumerated device plus the default device again
            assert_eq!(
                text.matches("=== Device Information ===").count(),
                report.devices.len() + 1
            );
        }

        #[test]
        fn test_run_unknown_function_stops_before_pipeline() {
            if !MetalContext::is_available() {
                println!("Metal not available, skipping");
                return;
            }
            let mut out: Vec<u8> = Vec::new();
            let err = run(&source_config("vector_mul"), &mut out, &mut std::io::sink()).err().unwrap();
            assert_eq!(err.stage(), Stage::ResolveFunction);
            assert!(!String::from_utf8(out).unwrap().contains("C = A + B"));
        }

        #[test]
        fn test_run_missing_metallib_fails() {
            if !MetalContext::is_available() {
                println!("Metal not available, skipping");
                return;
            }
            let config = RunConfig {
                metallib: PathBuf::from("build/missing_kernel.metallib"),
                ..RunConfig::default()
            };
            let mut out: Vec<u8> = Vec::new();
            let err = run(&config, &mut out, &mut std::io::sink()).err().unwrap();
            assert!(matches!(err, GpuError::LibraryLoad { .. }));
        }
    }
}
