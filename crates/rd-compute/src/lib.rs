//! # rd-compute
//!
//! GPU compute session for stepping reaction-diffusion grids.
//!
//! Provides:
//! - Platform/device enumeration and lazily rebuilt context, kernel and buffers
//! - Kernel builds with the compiler log surfaced verbatim on failure
//! - Work-group derivation for 3-D grids (X first, then Y, then Z)
//! - Ping-pong stepping with explicit result slot
//! - A never-failing diagnostics report
//! - OpenCL backend, runtime-loaded (behind `opencl` feature flag)
//! - CPU reference backend for hosts without a device, and for tests

pub mod backend;
pub mod buffers;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod enumerate;
pub mod error;
pub mod grid;
pub mod host;
pub mod partition;
pub mod program;
pub mod session;
pub mod status;
pub mod step;

#[cfg(feature = "opencl")]
pub mod opencl;

pub use backend::{Backend, DeviceInfo, PlatformInfo};
pub use buffers::{GridLayout, Slot};
pub use config::{Limits, SessionConfig, DEFAULT_ENTRY_POINT};
pub use enumerate::ComputeTarget;
pub use error::{Error, ErrorKind, Result};
pub use grid::{Grid, GridSide, HostGrid};
pub use host::HostBackend;
pub use partition::WorkPartition;
pub use program::KernelSource;
pub use session::Session;
pub use status::Status;

#[cfg(feature = "opencl")]
pub use opencl::OpenCl;
