//! Runtime-loaded OpenCL function pointers via dlopen.
//!
//! Resolving the ICD loader at runtime means the crate builds and runs on
//! machines without OpenCL headers or libraries; the backend is simply
//! unavailable there.

use std::ffi::{c_char, c_void};
use std::sync::OnceLock;

use libloading::Library;

use crate::status::Status;

// ---------------------------------------------------------------------------
// Types and constants (OpenCL 1.2)
// ---------------------------------------------------------------------------

pub type ClInt = i32;
pub type ClUint = u32;
pub type ClBool = u32;
pub type ClBitfield = u64;

pub type ClPlatformId = *mut c_void;
pub type ClDeviceId = *mut c_void;
pub type ClContext = *mut c_void;
pub type ClCommandQueue = *mut c_void;
pub type ClProgram = *mut c_void;
pub type ClKernel = *mut c_void;
pub type ClMem = *mut c_void;
pub type ClEvent = *mut c_void;

pub const CL_SUCCESS: ClInt = 0;
pub const CL_TRUE: ClBool = 1;

pub const CL_DEVICE_TYPE_ALL: ClBitfield = 0xFFFF_FFFF;
pub const CL_MEM_READ_WRITE: ClBitfield = 1 << 0;

pub const CL_PLATFORM_PROFILE: ClUint = 0x0900;
pub const CL_PLATFORM_VERSION: ClUint = 0x0901;
pub const CL_PLATFORM_NAME: ClUint = 0x0902;
pub const CL_PLATFORM_VENDOR: ClUint = 0x0903;
pub const CL_PLATFORM_EXTENSIONS: ClUint = 0x0904;

pub const CL_DEVICE_NAME: ClUint = 0x102B;
pub const CL_DEVICE_VENDOR: ClUint = 0x102C;
pub const CL_DRIVER_VERSION: ClUint = 0x102D;
pub const CL_DEVICE_PROFILE: ClUint = 0x102E;
pub const CL_DEVICE_VERSION: ClUint = 0x102F;
pub const CL_DEVICE_EXTENSIONS: ClUint = 0x1030;

pub const CL_PROGRAM_BUILD_LOG: ClUint = 0x1183;
pub const CL_KERNEL_WORK_GROUP_SIZE: ClUint = 0x11B0;

type ContextNotify = Option<unsafe extern "C" fn(*const c_char, *const c_void, usize, *mut c_void)>;
type BuildNotify = Option<unsafe extern "C" fn(ClProgram, *mut c_void)>;

// ---------------------------------------------------------------------------
// Function signatures
// ---------------------------------------------------------------------------

type FnGetPlatformIds = unsafe extern "C" fn(ClUint, *mut ClPlatformId, *mut ClUint) -> ClInt;
type FnGetPlatformInfo = unsafe extern "C" fn(ClPlatformId, ClUint, usize, *mut c_void, *mut usize) -> ClInt;
type FnGetDeviceIds = unsafe extern "C" fn(
    ClPlatformId, ClBitfield, ClUint, *mut ClDeviceId, *mut ClUint,
) -> ClInt;
type FnGetDeviceInfo = unsafe extern "C" fn(ClDeviceId, ClUint, usize, *mut c_void, *mut usize) -> ClInt;
type FnCreateContext = unsafe extern "C" fn(
    *const isize,       // properties
    ClUint,
    *const ClDeviceId,
    ContextNotify,
    *mut c_void,        // user data
    *mut ClInt,
) -> ClContext;
type FnCreateCommandQueue = unsafe extern "C" fn(ClContext, ClDeviceId, ClBitfield, *mut ClInt) -> ClCommandQueue;
type FnCreateProgramWithSource = unsafe extern "C" fn(
    ClContext, ClUint, *const *const c_char, *const usize, *mut ClInt,
) -> ClProgram;
type FnBuildProgram = unsafe extern "C" fn(
    ClProgram, ClUint, *const ClDeviceId, *const c_char, BuildNotify, *mut c_void,
) -> ClInt;
type FnGetProgramBuildInfo = unsafe extern "C" fn(
    ClProgram, ClDeviceId, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnCreateKernel = unsafe extern "C" fn(ClProgram, *const c_char, *mut ClInt) -> ClKernel;
type FnGetKernelWorkGroupInfo = unsafe extern "C" fn(
    ClKernel, ClDeviceId, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnCreateBuffer = unsafe extern "C" fn(ClContext, ClBitfield, usize, *mut c_void, *mut ClInt) -> ClMem;
type FnEnqueueWriteBuffer = unsafe extern "C" fn(
    ClCommandQueue, ClMem, ClBool,
    usize, usize,       // offset, size
    *const c_void,
    ClUint, *const ClEvent, *mut ClEvent,
) -> ClInt;
type FnEnqueueReadBuffer = unsafe extern "C" fn(
    ClCommandQueue, ClMem, ClBool,
    usize, usize,       // offset, size
    *mut c_void,
    ClUint, *const ClEvent, *mut ClEvent,
) -> ClInt;
type FnSetKernelArg = unsafe extern "C" fn(ClKernel, ClUint, usize, *const c_void) -> ClInt;
type FnEnqueueNdRangeKernel = unsafe extern "C" fn(
    ClCommandQueue,
    ClKernel,
    ClUint,             // work dim
    *const usize,       // global offset (null)
    *const usize,       // global size
    *const usize,       // local size
    ClUint, *const ClEvent, *mut ClEvent,
) -> ClInt;
type FnFinish = unsafe extern "C" fn(ClCommandQueue) -> ClInt;
type FnRelease = unsafe extern "C" fn(*mut c_void) -> ClInt;

// ---------------------------------------------------------------------------
// Loaded API
// ---------------------------------------------------------------------------

pub struct OpenClApi {
    _lib: Library,
    pub get_platform_ids: FnGetPlatformIds,
    pub get_platform_info: FnGetPlatformInfo,
    pub get_device_ids: FnGetDeviceIds,
    pub get_device_info: FnGetDeviceInfo,
    pub create_context: FnCreateContext,
    pub release_context: FnRelease,
    pub create_command_queue: FnCreateCommandQueue,
    pub release_command_queue: FnRelease,
    pub create_program_with_source: FnCreateProgramWithSource,
    pub build_program: FnBuildProgram,
    pub get_program_build_info: FnGetProgramBuildInfo,
    pub release_program: FnRelease,
    pub create_kernel: FnCreateKernel,
    pub get_kernel_work_group_info: FnGetKernelWorkGroupInfo,
    pub release_kernel: FnRelease,
    pub create_buffer: FnCreateBuffer,
    pub release_mem_object: FnRelease,
    pub enqueue_write_buffer: FnEnqueueWriteBuffer,
    pub enqueue_read_buffer: FnEnqueueReadBuffer,
    pub set_kernel_arg: FnSetKernelArg,
    pub enqueue_nd_range_kernel: FnEnqueueNdRangeKernel,
    pub finish: FnFinish,
}

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["OpenCL.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

static OPENCL_API: OnceLock<Option<OpenClApi>> = OnceLock::new();

impl OpenClApi {
    fn try_load() -> Option<Self> {
        let lib = LIBRARY_NAMES.iter().find_map(|name| unsafe { Library::new(name) }.ok())?;
        unsafe {
            let api = OpenClApi {
                get_platform_ids: *lib.get::<FnGetPlatformIds>(b"clGetPlatformIDs\0").ok()?,
                get_platform_info: *lib.get::<FnGetPlatformInfo>(b"clGetPlatformInfo\0").ok()?,
                get_device_ids: *lib.get::<FnGetDeviceIds>(b"clGetDeviceIDs\0").ok()?,
                get_device_info: *lib.get::<FnGetDeviceInfo>(b"clGetDeviceInfo\0").ok()?,
                create_context: *lib.get::<FnCreateContext>(b"clCreateContext\0").ok()?,
                release_context: *lib.get::<FnRelease>(b"clReleaseContext\0").ok()?,
                create_command_queue: *lib.get::<FnCreateCommandQueue>(b"clCreateCommandQueue\0").ok()?,
                release_command_queue: *lib.get::<FnRelease>(b"clReleaseCommandQueue\0").ok()?,
                create_program_with_source: *lib
                    .get::<FnCreateProgramWithSource>(b"clCreateProgramWithSource\0")
                    .ok()?,
                build_program: *lib.get::<FnBuildProgram>(b"clBuildProgram\0").ok()?,
                get_program_build_info: *lib.get::<FnGetProgramBuildInfo>(b"clGetProgramBuildInfo\0").ok()?,
                release_program: *lib.get::<FnRelease>(b"clReleaseProgram\0").ok()?,
                create_kernel: *lib.get::<FnCreateKernel>(b"clCreateKernel\0").ok()?,
                get_kernel_work_group_info: *lib
                    .get::<FnGetKernelWorkGroupInfo>(b"clGetKernelWorkGroupInfo\0")
                    .ok()?,
                release_kernel: *lib.get::<FnRelease>(b"clReleaseKernel\0").ok()?,
                create_buffer: *lib.get::<FnCreateBuffer>(b"clCreateBuffer\0").ok()?,
                release_mem_object: *lib.get::<FnRelease>(b"clReleaseMemObject\0").ok()?,
                enqueue_write_buffer: *lib.get::<FnEnqueueWriteBuffer>(b"clEnqueueWriteBuffer\0").ok()?,
                enqueue_read_buffer: *lib.get::<FnEnqueueReadBuffer>(b"clEnqueueReadBuffer\0").ok()?,
                set_kernel_arg: *lib.get::<FnSetKernelArg>(b"clSetKernelArg\0").ok()?,
                enqueue_nd_range_kernel: *lib.get::<FnEnqueueNdRangeKernel>(b"clEnqueueNDRangeKernel\0").ok()?,
                finish: *lib.get::<FnFinish>(b"clFinish\0").ok()?,
                _lib: lib,
            };
            Some(api)
        }
    }
}

/// Get the runtime-loaded OpenCL API. Returns None if no ICD loader is found.
pub fn opencl_api() -> Option<&'static OpenClApi> {
    OPENCL_API.get_or_init(OpenClApi::try_load).as_ref()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `Ok` for `CL_SUCCESS`, the raw status otherwise.
pub fn cl_status(code: ClInt) -> Result<(), Status> {
    if code == CL_SUCCESS {
        Ok(())
    } else {
        Err(Status(code))
    }
}

/// Run a `clGet*Info`-style string query: ask for the size, then fetch.
///
/// `query(size, value, size_ret)` forwards to the API call.
pub fn query_string(mut query: impl FnMut(usize, *mut c_void, *mut usize) -> ClInt) -> Result<String, Status> {
    let mut size = 0usize;
    cl_status(query(0, std::ptr::null_mut(), &mut size))?;
    if size == 0 {
        return Ok(String::new());
    }
    let mut buf = vec![0u8; size];
    cl_status(query(size, buf.as_mut_ptr() as *mut c_void, std::ptr::null_mut()))?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
