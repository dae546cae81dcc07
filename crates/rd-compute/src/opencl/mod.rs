//! OpenCL backend.
//!
//! All OpenCL calls go through function pointers resolved at runtime from the
//! ICD loader (see `ffi.rs`), so nothing OpenCL-specific is needed at build
//! time.

mod backend;
pub mod ffi;

pub use backend::{Buffer, Context, DeviceId, Kernel, OpenCl, PlatformId, Program, Queue};

use crate::config::{Limits, SessionConfig};
use crate::diagnostics::{self, NO_PLATFORMS};
use crate::error::Result;
use crate::session::Session;

/// Report on the system's OpenCL platforms and devices. Never fails, even
/// when no OpenCL library is installed.
pub fn diagnostics_report() -> String {
    diagnostics_report_with(&Limits::default())
}

pub fn diagnostics_report_with(limits: &Limits) -> String {
    match OpenCl::load() {
        Ok(backend) => diagnostics::report(&backend, limits),
        Err(_) => NO_PLATFORMS.to_string(),
    }
}

impl Session<OpenCl> {
    /// A session on the system's OpenCL implementation.
    pub fn opencl(config: SessionConfig) -> Result<Self> {
        Session::with_config(OpenCl::load()?, config)
    }
}
