//! The device-API seam.
//!
//! A [`Backend`] exposes the handful of compute-API calls the session needs,
//! each returning the raw [`Status`] on failure. Turning a status into an
//! [`Error`](crate::Error) with an operation prefix is done by the callers via
//! [`check`](crate::status::check), never by the backend itself.

use crate::status::Status;

/// Platform string properties, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformInfo {
    Profile,
    Version,
    Name,
    Vendor,
    Extensions,
}

impl PlatformInfo {
    pub const ALL: [PlatformInfo; 5] = [
        PlatformInfo::Profile,
        PlatformInfo::Version,
        PlatformInfo::Name,
        PlatformInfo::Vendor,
        PlatformInfo::Extensions,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PlatformInfo::Profile => "PROFILE",
            PlatformInfo::Version => "VERSION",
            PlatformInfo::Name => "NAME",
            PlatformInfo::Vendor => "VENDOR",
            PlatformInfo::Extensions => "EXTENSIONS",
        }
    }
}

/// Device string properties, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceInfo {
    Name,
    Vendor,
    DriverVersion,
    Profile,
    Version,
    Extensions,
}

impl DeviceInfo {
    pub const ALL: [DeviceInfo; 6] = [
        DeviceInfo::Name,
        DeviceInfo::Vendor,
        DeviceInfo::DriverVersion,
        DeviceInfo::Profile,
        DeviceInfo::Version,
        DeviceInfo::Extensions,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DeviceInfo::Name => "NAME",
            DeviceInfo::Vendor => "VENDOR",
            DeviceInfo::DriverVersion => "DRIVER_VERSION",
            DeviceInfo::Profile => "PROFILE",
            DeviceInfo::Version => "VERSION",
            DeviceInfo::Extensions => "EXTENSIONS",
        }
    }
}

/// A compute API capable of running the step kernel.
///
/// Handle types own their underlying API object: dropping a context, queue,
/// program, kernel or buffer releases it. Platforms and devices are plain
/// identifiers.
pub trait Backend {
    type Platform: Clone;
    type Device: Clone;
    type Context;
    type Queue;
    type Program;
    type Kernel;
    type Buffer;

    /// Every visible platform. An empty list is not an error at this level.
    fn platforms(&self) -> Result<Vec<Self::Platform>, Status>;

    /// Every device, of any type, on `platform`. A platform without devices
    /// yields an empty list, never an error, so callers see it as an index
    /// out of range.
    fn devices(&self, platform: &Self::Platform) -> Result<Vec<Self::Device>, Status>;

    fn platform_info(&self, platform: &Self::Platform, param: PlatformInfo) -> Result<String, Status>;

    fn device_info(&self, device: &Self::Device, param: DeviceInfo) -> Result<String, Status>;

    fn create_context(&self, device: &Self::Device) -> Result<Self::Context, Status>;

    /// An in-order queue on `device` within `context`.
    fn create_queue(&self, context: &Self::Context, device: &Self::Device) -> Result<Self::Queue, Status>;

    /// Submit kernel source text; does not build it.
    fn create_program(&self, context: &Self::Context, source: &str) -> Result<Self::Program, Status>;

    fn build_program(&self, program: &Self::Program, device: &Self::Device) -> Result<(), Status>;

    /// The compiler output of the last build of `program` for `device`.
    fn build_log(&self, program: &Self::Program, device: &Self::Device) -> Result<String, Status>;

    /// Resolve the kernel function `name` in a built program.
    fn create_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel, Status>;

    /// Maximum work-group size usable with `kernel` on `device`.
    fn kernel_work_group_size(&self, kernel: &Self::Kernel, device: &Self::Device) -> Result<usize, Status>;

    /// A read-write device buffer of `bytes` bytes.
    fn create_buffer(&self, context: &Self::Context, bytes: usize) -> Result<Self::Buffer, Status>;

    /// Blocking host-to-device copy of all of `data`.
    fn write_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, data: &[f32]) -> Result<(), Status>;

    /// Blocking device-to-host copy filling all of `data`.
    fn read_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, data: &mut [f32]) -> Result<(), Status>;

    fn set_kernel_arg_buffer(&self, kernel: &Self::Kernel, index: u32, buffer: &Self::Buffer) -> Result<(), Status>;

    /// Enqueue a 3-D range execution of `kernel`.
    fn enqueue_nd_range(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global: [usize; 3],
        local: [usize; 3],
    ) -> Result<(), Status>;

    /// Block until everything enqueued on `queue` has completed.
    fn finish(&self, queue: &Self::Queue) -> Result<(), Status>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_order_and_labels() {
        let platform: Vec<_> = PlatformInfo::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(platform, ["PROFILE", "VERSION", "NAME", "VENDOR", "EXTENSIONS"]);
        let device: Vec<_> = DeviceInfo::ALL.iter().map(|d| d.label()).collect();
        assert_eq!(device, ["NAME", "VENDOR", "DRIVER_VERSION", "PROFILE", "VERSION", "EXTENSIONS"]);
    }
}
