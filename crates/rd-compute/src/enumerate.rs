//! Platform and device enumeration.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::Backend;
use crate::config::Limits;
use crate::error::{Error, ErrorKind, Result};
use crate::status::checked;

/// Platform and device indices selecting the compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputeTarget {
    pub platform: usize,
    pub device: usize,
}

impl ComputeTarget {
    pub const fn new(platform: usize, device: usize) -> Self {
        Self { platform, device }
    }
}

impl fmt::Display for ComputeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.device)
    }
}

/// The visible platforms, at most `limit` of them.
///
/// A backend failure and an empty platform list are both reported as
/// [`Error::NoBackend`]: either way nothing can run here.
pub fn platforms<B: Backend>(backend: &B, limit: usize) -> Result<Vec<B::Platform>> {
    let mut platforms = match backend.platforms() {
        Ok(p) => p,
        Err(status) => {
            debug!(%status, "platform query failed");
            return Err(Error::NoBackend);
        }
    };
    if platforms.is_empty() {
        return Err(Error::NoBackend);
    }
    if platforms.len() > limit {
        debug!(found = platforms.len(), limit, "ignoring platforms beyond limit");
        platforms.truncate(limit);
    }
    Ok(platforms)
}

/// The devices on `platform`, at most `limit` of them.
pub fn devices<B: Backend>(
    backend: &B,
    platform: &B::Platform,
    limit: usize,
    operation: &str,
) -> Result<Vec<B::Device>> {
    let mut devices = checked(
        backend.devices(platform),
        ErrorKind::Enumeration,
        &format!("{operation}: failed to retrieve device IDs"),
    )?;
    if devices.len() > limit {
        debug!(found = devices.len(), limit, "ignoring devices beyond limit");
        devices.truncate(limit);
    }
    Ok(devices)
}

/// Look up the platform and device handles named by `target`.
pub fn resolve<B: Backend>(
    backend: &B,
    target: ComputeTarget,
    limits: &Limits,
    operation: &'static str,
) -> Result<(B::Platform, B::Device)> {
    let platforms = platforms(backend, limits.max_platforms)?;
    let platform = platforms.get(target.platform).cloned().ok_or(Error::IndexOutOfRange {
        operation,
        what: "platform",
        index: target.platform,
        available: platforms.len(),
    })?;

    let devices = devices(backend, &platform, limits.max_devices, operation)?;
    let device = devices.get(target.device).cloned().ok_or(Error::IndexOutOfRange {
        operation,
        what: "device",
        index: target.device,
        available: devices.len(),
    })?;

    Ok((platform, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostBackend, HostDevice, HostOp, HostPlatform};
    use crate::status::Status;

    fn two_by_three() -> HostBackend {
        HostBackend::new(vec![
            HostPlatform::new("alpha").with_device(HostDevice::new("a0", 256)),
            HostPlatform::new("beta")
                .with_device(HostDevice::new("b0", 256))
                .with_device(HostDevice::new("b1", 128))
                .with_device(HostDevice::new("b2", 64)),
        ])
    }

    #[test]
    fn test_display_target() {
        assert_eq!(ComputeTarget::new(1, 3).to_string(), "1:3");
        assert_eq!(ComputeTarget::default(), ComputeTarget::new(0, 0));
    }

    #[test]
    fn test_resolve_every_valid_pair() {
        let backend = two_by_three();
        let limits = Limits::default();
        for (platform, count) in [(0, 1), (1, 3)] {
            for device in 0..count {
                let (p, d) = resolve(&backend, ComputeTarget::new(platform, device), &limits, "test").unwrap();
                assert_eq!(p.index(), platform);
                assert_eq!(d.index(), device);
            }
        }
    }

    #[test]
    fn test_resolve_out_of_range() {
        let backend = two_by_three();
        let limits = Limits::default();

        let err = resolve(&backend, ComputeTarget::new(2, 0), &limits, "test").unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { what: "platform", index: 2, available: 2, .. }));

        let err = resolve(&backend, ComputeTarget::new(0, 1), &limits, "test").unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { what: "device", index: 1, available: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Enumeration);
    }

    #[test]
    fn test_no_platforms_is_no_backend() {
        let err = platforms(&HostBackend::empty(), 10).unwrap_err();
        assert!(matches!(err, Error::NoBackend));

        let backend = two_by_three();
        backend.fail_next(HostOp::Platforms, Status::PLATFORM_NOT_FOUND_KHR);
        assert!(matches!(platforms(&backend, 10), Err(Error::NoBackend)));
    }

    #[test]
    fn test_limit_truncates_visible_set() {
        let backend = two_by_three();
        assert_eq!(platforms(&backend, 1).unwrap().len(), 1);

        let limits = Limits { max_devices: 2, ..Limits::default() };
        let err = resolve(&backend, ComputeTarget::new(1, 2), &limits, "test").unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { what: "device", available: 2, .. }));
    }

    #[test]
    fn test_platform_without_devices_is_out_of_range() {
        let backend = HostBackend::new(vec![
            HostPlatform::new("alpha").with_device(HostDevice::new("a0", 256)),
            HostPlatform::new("bare"),
        ]);
        let bare = platforms(&backend, 10).unwrap().remove(1);
        assert!(devices(&backend, &bare, 10, "test").unwrap().is_empty());

        let err = resolve(&backend, ComputeTarget::new(1, 0), &Limits::default(), "reload_context").unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { what: "device", index: 0, available: 0, .. }));
        assert_eq!(err.kind(), ErrorKind::Enumeration);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_device_query_failure_is_api_error() {
        let backend = two_by_three();
        backend.fail_next(HostOp::Devices, Status::INVALID_PLATFORM);
        let err = resolve(&backend, ComputeTarget::new(0, 0), &Limits::default(), "reload_context").unwrap_err();
        assert_eq!(err.status(), Some(Status::INVALID_PLATFORM));
        assert!(err.to_string().starts_with("reload_context: failed to retrieve device IDs"));
        assert_eq!(err.kind(), ErrorKind::Enumeration);
    }
}
