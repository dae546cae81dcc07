//! Compute-API status codes and the check helper every component routes
//! backend results through.
//!
//! Codes follow the OpenCL 1.2 numbering so the OpenCL backend can pass raw
//! return values straight through; the host reference backend reports the
//! same codes.

use std::fmt;

use crate::error::{Error, ErrorKind, Result};

/// A raw status code returned by a compute-API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

macro_rules! status_codes {
    ($($name:ident = $code:literal => $desc:literal;)*) => {
        impl Status {
            $(pub const $name: Status = Status($code);)*

            /// Human-readable description of this status.
            ///
            /// Unknown codes describe as `"Unknown"`.
            pub fn describe(self) -> &'static str {
                match self.0 {
                    $($code => $desc,)*
                    _ => "Unknown",
                }
            }

            /// Symbolic name of this status, if it is a known code.
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($code => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    SUCCESS = 0 => "Success!";
    DEVICE_NOT_FOUND = -1 => "Device not found.";
    DEVICE_NOT_AVAILABLE = -2 => "Device not available";
    COMPILER_NOT_AVAILABLE = -3 => "Compiler not available";
    MEM_OBJECT_ALLOCATION_FAILURE = -4 => "Memory object allocation failure";
    OUT_OF_RESOURCES = -5 => "Out of resources";
    OUT_OF_HOST_MEMORY = -6 => "Out of host memory";
    PROFILING_INFO_NOT_AVAILABLE = -7 => "Profiling information not available";
    MEM_COPY_OVERLAP = -8 => "Memory copy overlap";
    IMAGE_FORMAT_MISMATCH = -9 => "Image format mismatch";
    IMAGE_FORMAT_NOT_SUPPORTED = -10 => "Image format not supported";
    BUILD_PROGRAM_FAILURE = -11 => "Program build failure";
    MAP_FAILURE = -12 => "Map failure";
    MISALIGNED_SUB_BUFFER_OFFSET = -13 => "Misaligned sub-buffer offset";
    EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST = -14 => "Execution status error for events in wait list";
    COMPILE_PROGRAM_FAILURE = -15 => "Program compile failure";
    LINKER_NOT_AVAILABLE = -16 => "Linker not available";
    LINK_PROGRAM_FAILURE = -17 => "Program link failure";
    DEVICE_PARTITION_FAILED = -18 => "Device partition failed";
    KERNEL_ARG_INFO_NOT_AVAILABLE = -19 => "Kernel argument info not available";
    INVALID_VALUE = -30 => "Invalid value";
    INVALID_DEVICE_TYPE = -31 => "Invalid device type";
    INVALID_PLATFORM = -32 => "Invalid platform";
    INVALID_DEVICE = -33 => "Invalid device";
    INVALID_CONTEXT = -34 => "Invalid context";
    INVALID_QUEUE_PROPERTIES = -35 => "Invalid queue properties";
    INVALID_COMMAND_QUEUE = -36 => "Invalid command queue";
    INVALID_HOST_PTR = -37 => "Invalid host pointer";
    INVALID_MEM_OBJECT = -38 => "Invalid memory object";
    INVALID_IMAGE_FORMAT_DESCRIPTOR = -39 => "Invalid image format descriptor";
    INVALID_IMAGE_SIZE = -40 => "Invalid image size";
    INVALID_SAMPLER = -41 => "Invalid sampler";
    INVALID_BINARY = -42 => "Invalid binary";
    INVALID_BUILD_OPTIONS = -43 => "Invalid build options";
    INVALID_PROGRAM = -44 => "Invalid program";
    INVALID_PROGRAM_EXECUTABLE = -45 => "Invalid program executable";
    INVALID_KERNEL_NAME = -46 => "Invalid kernel name";
    INVALID_KERNEL_DEFINITION = -47 => "Invalid kernel definition";
    INVALID_KERNEL = -48 => "Invalid kernel";
    INVALID_ARG_INDEX = -49 => "Invalid argument index";
    INVALID_ARG_VALUE = -50 => "Invalid argument value";
    INVALID_ARG_SIZE = -51 => "Invalid argument size";
    INVALID_KERNEL_ARGS = -52 => "Invalid kernel arguments";
    INVALID_WORK_DIMENSION = -53 => "Invalid work dimension";
    INVALID_WORK_GROUP_SIZE = -54 => "Invalid work group size";
    INVALID_WORK_ITEM_SIZE = -55 => "Invalid work item size";
    INVALID_GLOBAL_OFFSET = -56 => "Invalid global offset";
    INVALID_EVENT_WAIT_LIST = -57 => "Invalid event wait list";
    INVALID_EVENT = -58 => "Invalid event";
    INVALID_OPERATION = -59 => "Invalid operation";
    INVALID_GL_OBJECT = -60 => "Invalid OpenGL object";
    INVALID_BUFFER_SIZE = -61 => "Invalid buffer size";
    INVALID_MIP_LEVEL = -62 => "Invalid mip-map level";
    INVALID_GLOBAL_WORK_SIZE = -63 => "Invalid global work size";
    INVALID_PROPERTY = -64 => "Invalid property";
    PLATFORM_NOT_FOUND_KHR = -1001 => "No platforms found by the ICD loader";
}

impl Status {
    /// Whether this is the success sentinel.
    pub fn is_success(self) -> bool {
        self == Status::SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.0)
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status(code)
    }
}

/// Fail with a descriptive error unless `status` is the success sentinel.
///
/// The error message is `context` followed by the status description; `kind`
/// is the failure class of the calling operation.
pub fn check(status: Status, kind: ErrorKind, context: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::Api { kind, context: context.to_string(), status })
    }
}

/// Lift a backend result into a crate [`Result`], attaching `kind` and
/// `context` on failure.
pub(crate) fn checked<T>(result: std::result::Result<T, Status>, kind: ErrorKind, context: &str) -> Result<T> {
    result.map_err(|status| Error::Api { kind, context: context.to_string(), status })
}
