//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::enumerate::ComputeTarget;
use crate::error::{Error, Result};

/// Entry point looked up in kernel source when none is given.
pub const DEFAULT_ENTRY_POINT: &str = "rd_compute";

/// Upper bounds on enumeration and query results.
///
/// Backend queries ask for the real count or size first and are then capped
/// by these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of platforms considered.
    pub max_platforms: usize,

    /// Maximum number of devices considered per platform.
    pub max_devices: usize,

    /// Maximum length of a retrieved build log, in bytes.
    pub max_build_log_bytes: usize,

    /// Maximum length of a platform or device info string, in bytes.
    pub max_info_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_platforms: 10,
            max_devices: 10,
            max_build_log_bytes: 10_000,
            max_info_bytes: 1000,
        }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("max_platforms", self.max_platforms),
            ("max_devices", self.max_devices),
            ("max_build_log_bytes", self.max_build_log_bytes),
            ("max_info_bytes", self.max_info_bytes),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(Error::config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

/// Configuration for a [`Session`](crate::Session).
///
/// Serializable so a host can persist it alongside its own settings; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Platform/device pair the session compiles and runs on.
    pub target: ComputeTarget,

    /// Kernel function looked up when a source is set without an explicit
    /// entry point.
    pub entry_point: String,

    pub limits: Limits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: ComputeTarget::default(),
            entry_point: DEFAULT_ENTRY_POINT.into(),
            limits: Limits::default(),
        }
    }
}

impl SessionConfig {
    /// Config targeting the given platform and device, defaults elsewhere.
    pub fn for_target(platform: usize, device: usize) -> Self {
        Self { target: ComputeTarget::new(platform, device), ..Self::default() }
    }

    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Reject configs the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.entry_point.trim().is_empty() {
            return Err(Error::config("entry_point must not be empty"));
        }
        self.limits.validate()
    }
}
