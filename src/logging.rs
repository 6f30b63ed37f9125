//! Logging configuration for mtlprobe
//!
//! Uses the `log` facade with `env_logger`. Stdout is reserved for the
//! device report and vector output, so everything logged goes to stderr.
//!
//! # Log Levels
//!
//! - `error!` - command buffer failures
//! - `warn!` - GPU results that disagree with the host sum
//! - `info!` - device counts, library and pipeline loading
//! - `debug!` - run stage transitions and dispatch sizes
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over `-v` when set:
//!
//! ```bash
//! RUST_LOG=debug mtlprobe run
//! RUST_LOG=mtlprobe_gpu::metal=debug mtlprobe run
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Map the `-v` count to a level: warn, info, then debug.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Initialize from `RUST_LOG` if set, otherwise from the `-v` count.
pub fn init(verbose: u8) {
    if std::env::var_os("RUST_LOG").is_some() {
        init_from_env();
    } else {
        init_with_level(level_for_verbosity(verbose));
    }
}

/// Initialize logging with a specific level.
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {}:{} - {}",
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from the RUST_LOG environment variable.
///
/// If RUST_LOG is not set, defaults to Warn level.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests.
#[cfg(test)]
pub fn init_test() {
    // try_init() doesn't panic if already initialized
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}
