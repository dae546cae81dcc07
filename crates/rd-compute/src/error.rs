//! Error type for the compute session.

use crate::status::Status;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure classes, used by hosts to decide how to present an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No backend/platform/device, or a requested index is out of range.
    Enumeration,
    /// Context, queue or buffer creation failed.
    ResourceCreation,
    /// Kernel source failed to build, or cannot be partitioned for the grid.
    Compilation,
    /// Argument binding or kernel enqueue failed.
    Execution,
    /// Host/device memory copy failed.
    Transfer,
    /// The session was driven out of order or misconfigured.
    Usage,
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no compute backend available (no platforms found)")]
    NoBackend,

    #[error("{operation}: {what} index {index} out of range ({available} available)")]
    IndexOutOfRange { operation: &'static str, what: &'static str, index: usize, available: usize },

    #[error("{context}: {status}")]
    Api { kind: ErrorKind, context: String, status: Status },

    #[error("{context}: build failed:\n\n{log}")]
    BuildFailed { context: String, log: String },

    #[error("{context}: kernel '{name}' not found in program")]
    KernelNotFound { context: String, name: String },

    #[error("unsupported work-group size shape: {size} is not a power of two")]
    UnsupportedWorkGroupSize { size: usize },

    #[error("grid not divisible by derived work-group size: grid {global:?}, work-group {local:?}")]
    GridNotDivisible { global: [usize; 3], local: [usize; 3] },

    #[error("grid has an empty dimension: {dims:?}")]
    EmptyGrid { dims: [usize; 3] },

    #[error("{context}: host data holds {actual} values, device buffer holds {expected}")]
    SizeMismatch { context: String, expected: usize, actual: usize },

    #[error("{operation}: {what} not loaded")]
    NotLoaded { operation: &'static str, what: &'static str },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// The underlying status code, for errors raised from a backend call.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this error into the session's failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoBackend | Error::IndexOutOfRange { .. } => ErrorKind::Enumeration,
            Error::BuildFailed { .. }
            | Error::KernelNotFound { .. }
            | Error::UnsupportedWorkGroupSize { .. }
            | Error::GridNotDivisible { .. }
            | Error::EmptyGrid { .. } => ErrorKind::Compilation,
            Error::SizeMismatch { .. } => ErrorKind::Transfer,
            Error::NotLoaded { .. } | Error::Config(_) => ErrorKind::Usage,
            Error::Api { kind, .. } => *kind,
        }
    }
}
