//! Ping-pong step execution.

use tracing::trace;

use crate::backend::Backend;
use crate::buffers::{DoubleBuffer, Slot};
use crate::error::{ErrorKind, Result};
use crate::partition::WorkPartition;
use crate::status::checked;

/// Run `steps` invocations of `kernel`, starting with `start` as input.
///
/// Each step binds the current slot as argument 0 and the other slot as
/// argument 1, so the roles swap every invocation. `on_step` is called with
/// the output slot of each step once it has been enqueued. Any failure aborts
/// the remaining steps. Returns the slot holding the latest result: `start`
/// after an even count, the other slot after an odd one.
#[allow(clippy::too_many_arguments)]
pub fn run_steps<B: Backend>(
    backend: &B,
    queue: &B::Queue,
    kernel: &B::Kernel,
    buffers: &DoubleBuffer<B>,
    partition: &WorkPartition,
    start: Slot,
    steps: usize,
    mut on_step: impl FnMut(Slot),
) -> Result<Slot> {
    if steps == 0 {
        return Ok(start);
    }

    let mut input = start;
    for i in 0..steps {
        let output = input.other();
        checked(
            backend.set_kernel_arg_buffer(kernel, 0, buffers.get(input)),
            ErrorKind::Execution,
            "step: failed to set kernel input argument",
        )?;
        checked(
            backend.set_kernel_arg_buffer(kernel, 1, buffers.get(output)),
            ErrorKind::Execution,
            "step: failed to set kernel output argument",
        )?;
        checked(
            backend.enqueue_nd_range(queue, kernel, partition.global, partition.local),
            ErrorKind::Execution,
            "step: kernel enqueue failed",
        )?;
        trace!(step = i, ?input, ?output, "enqueued step");
        on_step(output);
        input = output;
    }

    checked(backend.finish(queue), ErrorKind::Execution, "step: waiting for queue to finish failed")?;
    Ok(input)
}
