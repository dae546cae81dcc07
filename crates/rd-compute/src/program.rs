//! Kernel source, program builds and the compiled step kernel.

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::{Limits, DEFAULT_ENTRY_POINT};
use crate::diagnostics::clip;
use crate::error::{Error, ErrorKind, Result};
use crate::partition::WorkPartition;
use crate::status::{checked, Status};

/// Kernel program text and the name of the function to run from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelSource {
    text: String,
    entry_point: String,
}

impl KernelSource {
    /// Source whose entry point is `rd_compute`.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), entry_point: DEFAULT_ENTRY_POINT.into() }
    }

    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// A built program, its entry-point kernel and the partition it runs with.
pub struct CompiledKernel<B: Backend> {
    // Declared before `program` so the kernel is released first.
    kernel: B::Kernel,
    _program: B::Program,
    partition: WorkPartition,
}

impl<B: Backend> CompiledKernel<B> {
    pub fn kernel(&self) -> &B::Kernel {
        &self.kernel
    }

    pub fn partition(&self) -> &WorkPartition {
        &self.partition
    }
}

/// Submit and build `text` for `device`.
///
/// On a failed build the compiler log is returned verbatim in
/// [`Error::BuildFailed`], cut only at `limits.max_build_log_bytes`.
pub fn build_program<B: Backend>(
    backend: &B,
    context: &B::Context,
    device: &B::Device,
    text: &str,
    limits: &Limits,
    operation: &str,
) -> Result<B::Program> {
    let program = checked(
        backend.create_program(context, text),
        ErrorKind::Compilation,
        &format!("{operation}: source submission failed"),
    )?;

    if let Err(status) = backend.build_program(&program, device) {
        let log = checked(
            backend.build_log(&program, device),
            ErrorKind::Compilation,
            &format!("{operation}: retrieving program build log failed"),
        )?;
        let log = bounded_log(&log, limits.max_build_log_bytes);
        warn!(operation, %status, log_bytes = log.len(), "kernel build failed");
        return Err(Error::BuildFailed { context: operation.to_string(), log });
    }
    Ok(program)
}

fn bounded_log(raw: &str, max_bytes: usize) -> String {
    let log = raw.trim_end_matches('\0');
    let clipped = clip(log, max_bytes);
    if clipped.len() < log.len() {
        debug!(full = log.len(), kept = clipped.len(), "build log truncated");
    }
    clipped.to_string()
}

/// Build `source`, resolve its entry point and derive the work partition for
/// a grid of `dims` cells.
pub fn compile<B: Backend>(
    backend: &B,
    context: &B::Context,
    device: &B::Device,
    source: &KernelSource,
    dims: [usize; 3],
    limits: &Limits,
    operation: &str,
) -> Result<CompiledKernel<B>> {
    let program = build_program(backend, context, device, source.text(), limits, operation)?;

    let kernel = match backend.create_kernel(&program, source.entry_point()) {
        Ok(k) => k,
        Err(Status::INVALID_KERNEL_NAME) => {
            return Err(Error::KernelNotFound {
                context: operation.to_string(),
                name: source.entry_point().to_string(),
            })
        }
        Err(status) => {
            return Err(Error::Api {
                kind: ErrorKind::Compilation,
                context: format!("{operation}: kernel creation failed"),
                status,
            })
        }
    };

    let wgs = checked(
        backend.kernel_work_group_size(&kernel, device),
        ErrorKind::Compilation,
        &format!("{operation}: retrieving kernel work group size failed"),
    )?;
    let partition = WorkPartition::derive(dims, wgs)?;

    info!(
        entry_point = source.entry_point(),
        global = ?partition.global,
        local = ?partition.local,
        "kernel built"
    );
    Ok(CompiledKernel { kernel, _program: program, partition })
}
