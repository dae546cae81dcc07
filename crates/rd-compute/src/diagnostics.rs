//! Best-effort platform and device report for troubleshooting.
//!
//! Unlike every other component, nothing here propagates a failure: a failed
//! query becomes a placeholder in the text.

use std::fmt::Write;

use crate::backend::{Backend, DeviceInfo, PlatformInfo};
use crate::config::Limits;

pub const NO_PLATFORMS: &str = "No compute platforms available";
pub const UNAVAILABLE: &str = "<unavailable>";

/// Describe every visible platform and device of `backend`, numbered from 1.
pub fn report<B: Backend>(backend: &B, limits: &Limits) -> String {
    let platforms = match backend.platforms() {
        Ok(p) if !p.is_empty() => p,
        _ => return NO_PLATFORMS.to_string(),
    };
    let platforms = &platforms[..platforms.len().min(limits.max_platforms)];

    let mut out = String::new();
    let _ = writeln!(out, "Found {} platform(s):", platforms.len());
    for (i, platform) in platforms.iter().enumerate() {
        let _ = writeln!(out, "\nPlatform {}:", i + 1);
        for param in PlatformInfo::ALL {
            let value = backend.platform_info(platform, param);
            push_property(&mut out, "  ", param.label(), value.ok().as_deref(), limits);
        }

        let devices = backend.devices(platform).unwrap_or_default();
        let devices = &devices[..devices.len().min(limits.max_devices)];
        let _ = writeln!(out, "\n  Found {} device(s) on this platform.", devices.len());
        for (j, device) in devices.iter().enumerate() {
            let _ = writeln!(out, "  Device {}:", j + 1);
            for param in DeviceInfo::ALL {
                let value = backend.device_info(device, param);
                push_property(&mut out, "    ", param.label(), value.ok().as_deref(), limits);
            }
        }
    }
    out
}

fn push_property(out: &mut String, indent: &str, label: &str, value: Option<&str>, limits: &Limits) {
    let value = match value {
        Some(v) => clip(v.trim_end_matches('\0'), limits.max_info_bytes),
        None => UNAVAILABLE,
    };
    let _ = writeln!(out, "{indent}{label}: {value}");
}

/// The longest prefix of `s` that fits in `max_bytes` without splitting a
/// character.
pub(crate) fn clip(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
