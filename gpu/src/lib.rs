//! mtlprobe GPU layer
//!
//! Reports the Metal devices present on the system and runs a one-shot
//! vector addition on the default device to confirm that library loading,
//! pipeline creation and dispatch work end to end.
//!
//! Device reports and the run pipeline compile everywhere; the Metal
//! bindings themselves only exist on macOS. Elsewhere enumeration finds no
//! devices and [`runner::run`] fails with [`GpuError::NoDevice`].

pub mod device;
pub mod error;
pub mod runner;
pub mod stage;

#[cfg(target_os = "macos")]
pub mod metal;

pub use device::{DeviceInfo, FamilySupport, GpuFamily};
pub use error::GpuError;
pub use runner::{CommandOutcome, LibrarySource, RunConfig, RunReport};
pub use stage::Stage;
