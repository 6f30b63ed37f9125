//! mtlprobe - Metal device report and GPU smoke test
//!
//! # Usage
//!
//! ```bash
//! # Report every Metal device, then add two vectors on the default device
//! mtlprobe
//!
//! # Same, with an explicit metallib and element count
//! mtlprobe run --metallib build/mtlprobe_kernel.metallib --count 64
//!
//! # Compile the kernel from MSL source at runtime
//! mtlprobe run --source gpu/shaders/vector_add.metal
//!
//! # Device report only, as JSON
//! mtlprobe devices --json
//! ```

mod logging;

use clap::{Args, Parser, Subcommand};
use mtlprobe_gpu::runner::{self, DEFAULT_COUNT, DEFAULT_FUNCTION, DEFAULT_METALLIB};
use mtlprobe_gpu::{GpuError, RunConfig, RunReport};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

/// Exit status for any device, library, function or pipeline failure.
const EXIT_FAILURE: i32 = -1;

#[derive(Parser)]
#[command(name = "mtlprobe")]
#[command(version = "0.1.0")]
#[command(about = "Report Metal devices and run a vector-add smoke test", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Report devices, then add two vectors on the default device (default)
    Run(RunArgs),

    /// Report available Metal devices only
    Devices {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Precompiled kernel library, used when no default library is embedded
    #[arg(long, default_value = DEFAULT_METALLIB)]
    metallib: PathBuf,

    /// Kernel function to run
    #[arg(long, default_value = DEFAULT_FUNCTION)]
    function: String,

    /// Number of elements per vector
    #[arg(long, default_value_t = DEFAULT_COUNT)]
    count: usize,

    /// Compile this Metal source file instead of loading a metallib
    #[arg(long)]
    source: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        let config = RunConfig::default();
        RunArgs {
            metallib: config.metallib,
            function: config.function,
            count: config.count,
            source: config.source,
        }
    }
}

impl From<RunArgs> for RunConfig {
    fn from(args: RunArgs) -> Self {
        RunConfig {
            metallib: args.metallib,
            function: args.function,
            count: args.count,
            source: args.source,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_probe(args.into()).map(|_| ()),
        Commands::Devices { json } => show_devices(json),
    };

    if let Err(e) = &result {
        eprintln!("{}", e);
    }
    let code = exit_code(&result);
    if code != 0 {
        process::exit(code);
    }
}

/// Only fatal errors change the status; a failed command buffer is
/// reported on stderr during the run and still exits 0.
fn exit_code<T>(result: &Result<T, GpuError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => EXIT_FAILURE,
    }
}

fn run_probe(config: RunConfig) -> Result<RunReport, GpuError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stderr = io::stderr();
    let mut diag = stderr.lock();
    let report = runner::run(&config, &mut out, &mut diag)?;
    out.flush()?;
    Ok(report)
}

fn show_devices(json: bool) -> Result<(), GpuError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if json {
        let devices = runner::collect_devices();
        serde_json::to_writer_pretty(&mut out, &devices).map_err(io::Error::from)?;
        writeln!(out)?;
    } else {
        runner::report_devices(&mut out)?;
    }
    out.flush()?;
    Ok(())
}
