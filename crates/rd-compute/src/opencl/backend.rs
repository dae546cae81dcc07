//! [`Backend`] implementation over the runtime-loaded OpenCL API.

use std::ffi::{c_char, c_void, CString};
use std::mem::{size_of, size_of_val};
use std::ptr;

use crate::backend::{Backend, DeviceInfo, PlatformInfo};
use crate::error::{Error, Result};
use crate::status::Status;

use super::ffi::{self, cl_status, query_string, ClDeviceId, ClInt, ClMem, ClPlatformId, ClUint, OpenClApi};

/// OpenCL 1.x through the system ICD loader.
#[derive(Clone, Copy)]
pub struct OpenCl {
    api: &'static OpenClApi,
}

impl OpenCl {
    /// Load the OpenCL library, failing with [`Error::NoBackend`] if it is
    /// not installed.
    pub fn load() -> Result<Self> {
        ffi::opencl_api().map(|api| Self { api }).ok_or(Error::NoBackend)
    }

    /// Whether an OpenCL ICD loader could be found.
    pub fn is_available() -> bool {
        ffi::opencl_api().is_some()
    }
}

impl std::fmt::Debug for OpenCl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OpenCl")
    }
}

/// Pointer and explicit length for `clCreateProgramWithSource`.
///
/// A zero length tells the driver to `strlen` the pointer, and an empty
/// slice's pointer is dangling, so empty text never reaches the call.
fn source_parts(source: &str) -> std::result::Result<(*const c_char, usize), Status> {
    if source.is_empty() {
        return Err(Status::INVALID_VALUE);
    }
    Ok((source.as_ptr().cast(), source.len()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformId(ClPlatformId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(ClDeviceId);

macro_rules! cl_handle {
    ($(#[$meta:meta])* $name:ident, $release:ident) => {
        $(#[$meta])*
        pub struct $name {
            raw: *mut c_void,
            api: &'static OpenClApi,
        }

        impl $name {
            /// Wrap a handle returned by a create call alongside its error code.
            fn from_raw(api: &'static OpenClApi, raw: *mut c_void, err: ClInt) -> std::result::Result<Self, Status> {
                cl_status(err)?;
                if raw.is_null() {
                    return Err(Status::INVALID_VALUE);
                }
                Ok(Self { raw, api })
            }

            pub fn as_raw(&self) -> *mut c_void {
                self.raw
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { (self.api.$release)(self.raw) };
            }
        }
    };
}

cl_handle!(
    /// An OpenCL context, released on drop.
    Context,
    release_context
);
cl_handle!(
    /// An in-order command queue, released on drop.
    Queue,
    release_command_queue
);
cl_handle!(Program, release_program);
cl_handle!(Kernel, release_kernel);
cl_handle!(
    /// A device memory object, released on drop.
    Buffer,
    release_mem_object
);

fn platform_param(param: PlatformInfo) -> ClUint {
    match param {
        PlatformInfo::Profile => ffi::CL_PLATFORM_PROFILE,
        PlatformInfo::Version => ffi::CL_PLATFORM_VERSION,
        PlatformInfo::Name => ffi::CL_PLATFORM_NAME,
        PlatformInfo::Vendor => ffi::CL_PLATFORM_VENDOR,
        PlatformInfo::Extensions => ffi::CL_PLATFORM_EXTENSIONS,
    }
}

fn device_param(param: DeviceInfo) -> ClUint {
    match param {
        DeviceInfo::Name => ffi::CL_DEVICE_NAME,
        DeviceInfo::Vendor => ffi::CL_DEVICE_VENDOR,
        DeviceInfo::DriverVersion => ffi::CL_DRIVER_VERSION,
        DeviceInfo::Profile => ffi::CL_DEVICE_PROFILE,
        DeviceInfo::Version => ffi::CL_DEVICE_VERSION,
        DeviceInfo::Extensions => ffi::CL_DEVICE_EXTENSIONS,
    }
}

impl Backend for OpenCl {
    type Platform = PlatformId;
    type Device = DeviceId;
    type Context = Context;
    type Queue = Queue;
    type Program = Program;
    type Kernel = Kernel;
    type Buffer = Buffer;

    fn platforms(&self) -> std::result::Result<Vec<PlatformId>, Status> {
        let mut count: ClUint = 0;
        cl_status(unsafe { (self.api.get_platform_ids)(0, ptr::null_mut(), &mut count) })?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut ids = vec![ptr::null_mut(); count as usize];
        cl_status(unsafe { (self.api.get_platform_ids)(count, ids.as_mut_ptr(), ptr::null_mut()) })?;
        Ok(ids.into_iter().map(PlatformId).collect())
    }

    fn devices(&self, platform: &PlatformId) -> std::result::Result<Vec<DeviceId>, Status> {
        let mut count: ClUint = 0;
        let code = unsafe {
            (self.api.get_device_ids)(platform.0, ffi::CL_DEVICE_TYPE_ALL, 0, ptr::null_mut(), &mut count)
        };
        if Status(code) == Status::DEVICE_NOT_FOUND {
            return Ok(Vec::new());
        }
        cl_status(code)?;
        let mut ids = vec![ptr::null_mut(); count as usize];
        cl_status(unsafe {
            (self.api.get_device_ids)(platform.0, ffi::CL_DEVICE_TYPE_ALL, count, ids.as_mut_ptr(), ptr::null_mut())
        })?;
        Ok(ids.into_iter().map(DeviceId).collect())
    }

    fn platform_info(&self, platform: &PlatformId, param: PlatformInfo) -> std::result::Result<String, Status> {
        let param = platform_param(param);
        query_string(|size, value, size_ret| unsafe {
            (self.api.get_platform_info)(platform.0, param, size, value, size_ret)
        })
    }

    fn device_info(&self, device: &DeviceId, param: DeviceInfo) -> std::result::Result<String, Status> {
        let param = device_param(param);
        query_string(|size, value, size_ret| unsafe {
            (self.api.get_device_info)(device.0, param, size, value, size_ret)
        })
    }

    fn create_context(&self, device: &DeviceId) -> std::result::Result<Context, Status> {
        let mut err: ClInt = 0;
        let raw = unsafe { (self.api.create_context)(ptr::null(), 1, &device.0, None, ptr::null_mut(), &mut err) };
        Context::from_raw(self.api, raw, err)
    }

    fn create_queue(&self, context: &Context, device: &DeviceId) -> std::result::Result<Queue, Status> {
        let mut err: ClInt = 0;
        let raw = unsafe { (self.api.create_command_queue)(context.raw, device.0, 0, &mut err) };
        Queue::from_raw(self.api, raw, err)
    }

    fn create_program(&self, context: &Context, source: &str) -> std::result::Result<Program, Status> {
        let (text, len) = source_parts(source)?;
        let mut err: ClInt = 0;
        let raw = unsafe { (self.api.create_program_with_source)(context.raw, 1, &text, &len, &mut err) };
        Program::from_raw(self.api, raw, err)
    }

    fn build_program(&self, program: &Program, device: &DeviceId) -> std::result::Result<(), Status> {
        cl_status(unsafe {
            (self.api.build_program)(program.raw, 1, &device.0, ptr::null(), None, ptr::null_mut())
        })
    }

    fn build_log(&self, program: &Program, device: &DeviceId) -> std::result::Result<String, Status> {
        query_string(|size, value, size_ret| unsafe {
            (self.api.get_program_build_info)(program.raw, device.0, ffi::CL_PROGRAM_BUILD_LOG, size, value, size_ret)
        })
    }

    fn create_kernel(&self, program: &Program, name: &str) -> std::result::Result<Kernel, Status> {
        let name = CString::new(name).map_err(|_| Status::INVALID_KERNEL_NAME)?;
        let mut err: ClInt = 0;
        let raw = unsafe { (self.api.create_kernel)(program.raw, name.as_ptr(), &mut err) };
        Kernel::from_raw(self.api, raw, err)
    }

    fn kernel_work_group_size(&self, kernel: &Kernel, device: &DeviceId) -> std::result::Result<usize, Status> {
        let mut wgs: usize = 0;
        cl_status(unsafe {
            (self.api.get_kernel_work_group_info)(
                kernel.raw,
                device.0,
                ffi::CL_KERNEL_WORK_GROUP_SIZE,
                size_of::<usize>(),
                &mut wgs as *mut usize as *mut c_void,
                ptr::null_mut(),
            )
        })?;
        Ok(wgs)
    }

    fn create_buffer(&self, context: &Context, bytes: usize) -> std::result::Result<Buffer, Status> {
        let mut err: ClInt = 0;
        let raw = unsafe {
            (self.api.create_buffer)(context.raw, ffi::CL_MEM_READ_WRITE, bytes, ptr::null_mut(), &mut err)
        };
        Buffer::from_raw(self.api, raw, err)
    }

    fn write_buffer(&self, queue: &Queue, buffer: &Buffer, data: &[f32]) -> std::result::Result<(), Status> {
        cl_status(unsafe {
            (self.api.enqueue_write_buffer)(
                queue.raw,
                buffer.raw,
                ffi::CL_TRUE,
                0,
                size_of_val(data),
                data.as_ptr() as *const c_void,
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        })
    }

    fn read_buffer(&self, queue: &Queue, buffer: &Buffer, data: &mut [f32]) -> std::result::Result<(), Status> {
        cl_status(unsafe {
            (self.api.enqueue_read_buffer)(
                queue.raw,
                buffer.raw,
                ffi::CL_TRUE,
                0,
                size_of_val(data),
                data.as_mut_ptr() as *mut c_void,
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        })
    }

    fn set_kernel_arg_buffer(&self, kernel: &Kernel, index: u32, buffer: &Buffer) -> std::result::Result<(), Status> {
        let mem: ClMem = buffer.raw;
        cl_status(unsafe {
            (self.api.set_kernel_arg)(kernel.raw, index, size_of::<ClMem>(), &mem as *const ClMem as *const c_void)
        })
    }

    fn enqueue_nd_range(
        &self,
        queue: &Queue,
        kernel: &Kernel,
        global: [usize; 3],
        local: [usize; 3],
    ) -> std::result::Result<(), Status> {
        cl_status(unsafe {
            (self.api.enqueue_nd_range_kernel)(
                queue.raw,
                kernel.raw,
                3,
                ptr::null(),
                global.as_ptr(),
                local.as_ptr(),
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        })
    }

    fn finish(&self, queue: &Queue) -> std::result::Result<(), Status> {
        cl_status(unsafe { (self.api.finish)(queue.raw) })
    }
}
