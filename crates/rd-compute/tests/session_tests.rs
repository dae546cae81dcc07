//! Session lifecycle tests against the CPU reference backend.
//! Run with: cargo test -p rd-compute --test session_tests -- --nocapture

use rd_compute::host::{HostBackend, HostDevice, HostOp, HostPlatform, HostResource};
use rd_compute::{
    ComputeTarget, Error, ErrorKind, Grid, GridLayout, GridSide, HostGrid, KernelSource, Session, Slot, Status,
};

const IDENTITY_SRC: &str = r#"
__kernel void rd_compute(__global float* a, __global float* a_out)
{
    const int x = get_global_id(0);
    const int y = get_global_id(1);
    const int z = get_global_id(2);
    const int i = X * (Y * z + y) + x;
    a_out[i] = a[i];
}
"#;

const HALVE_SRC: &str = r#"
// Exponential decay, one half per step.
__kernel void halve(__global float* a, __global float* a_out)
{
    const int i = get_global_id(0) + X * (get_global_id(1) + Y * get_global_id(2));
    a_out[i] = 0.5f * a[i];
}
"#;

/// Missing the closing brace of the kernel body.
const MALFORMED_SRC: &str = "__kernel void rd_compute(__global float* a, __global float* a_out)\n{\n    a_out[0] = a[0];\n";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn host_backend() -> HostBackend {
    HostBackend::new(vec![
        HostPlatform::new("Reference")
            .with_device(HostDevice::new("cpu0", 256))
            .with_device(HostDevice::new("cpu1", 256)),
        HostPlatform::new("Odd").with_device(HostDevice::new("weird", 200)),
    ])
    .with_kernel("rd_compute", |input, output, _| output.copy_from_slice(input))
    .with_kernel("halve", |input, output, _| {
        for (o, i) in output.iter_mut().zip(input) {
            *o = 0.5 * i;
        }
    })
}

fn sample_grid(dims: [usize; 3], components: usize) -> HostGrid {
    HostGrid::from_fn(dims, components, |i| (i % 97) as f32 * 0.25 + 1.0)
}

/// A session with context, kernel and buffers loaded and `grid` uploaded.
fn ready_session(backend: &HostBackend, source: KernelSource, grid: &HostGrid) -> Session<HostBackend> {
    let mut session = Session::new(backend.clone());
    session.set_kernel_source(source);
    session.reload_context_if_needed().unwrap();
    session.reload_kernel_if_needed(grid).unwrap();
    session.create_buffers(grid).unwrap();
    session.write_to_buffers(grid).unwrap();
    session
}

fn context_id(session: &Session<HostBackend>) -> (u64, u64) {
    let dc = session.device_context().expect("context loaded");
    (dc.context().id(), dc.queue().id())
}

// ============================================================================
// Device enumeration
// ============================================================================

#[test]
fn test_every_valid_target_resolves() {
    init_tracing();
    let backend = host_backend();
    let mut session = Session::new(backend.clone());
    for (platform, device) in [(0, 0), (0, 1), (1, 0)] {
        session.set_compute_target(platform, device);
        session.reload_context_if_needed().unwrap();
        let dc = session.device_context().unwrap();
        assert_eq!(dc.device().platform(), platform);
        assert_eq!(dc.device().index(), device);
    }
}

#[test]
fn test_out_of_range_target() {
    let mut session = Session::new(host_backend());

    session.set_compute_target(2, 0);
    let err = session.reload_context_if_needed().unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { what: "platform", index: 2, available: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::Enumeration);
    assert!(err.to_string().starts_with("reload_context: "), "{err}");
    assert!(!session.is_context_loaded());

    session.set_compute_target(1, 1);
    let err = session.reload_context_if_needed().unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { what: "device", index: 1, available: 1, .. }));
}

#[test]
fn test_no_backend() {
    let mut session = Session::new(HostBackend::empty());
    let err = session.reload_context_if_needed().unwrap_err();
    assert!(matches!(err, Error::NoBackend));
    assert_eq!(err.kind(), ErrorKind::Enumeration);
}

// ============================================================================
// Lazy reloads
// ============================================================================

#[test]
fn test_reloads_are_noops_when_unchanged() {
    init_tracing();
    let backend = host_backend();
    let grid = sample_grid([16, 16, 1], 2);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);
    let ids = context_id(&session);

    session.reload_context_if_needed().unwrap();
    session.reload_kernel_if_needed(&grid).unwrap();
    session.create_buffers(&grid).unwrap();
    session.set_kernel_source(KernelSource::new(IDENTITY_SRC));
    session.reload_kernel_if_needed(&grid).unwrap();

    assert_eq!(context_id(&session), ids);
    assert_eq!(backend.created(HostResource::Context), 1);
    assert_eq!(backend.created(HostResource::Queue), 1);
    assert_eq!(backend.created(HostResource::Program), 1);
    assert_eq!(backend.created(HostResource::Kernel), 1);
    assert_eq!(backend.created(HostResource::Buffer), 2);
}

#[test]
fn test_target_change_yields_fresh_handles() {
    init_tracing();
    let backend = host_backend();
    let grid = sample_grid([16, 16, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);
    let (old_context, old_queue) = context_id(&session);

    session.set_device(1);
    // Deferred until the next reload.
    assert_eq!(context_id(&session), (old_context, old_queue));
    session.reload_context_if_needed().unwrap();

    let (context, queue) = context_id(&session);
    assert_ne!(context, old_context);
    assert_ne!(queue, old_queue);
    assert_eq!(backend.created(HostResource::Context), 2);

    // Kernel and buffers went with the old context.
    assert!(!session.is_kernel_compiled());
    assert_eq!(session.buffer_layout(), None);
    assert_eq!(backend.live(HostResource::Context), 1);
    assert_eq!(backend.live(HostResource::Queue), 1);
    assert_eq!(backend.live(HostResource::Kernel), 0);
    assert_eq!(backend.live(HostResource::Program), 0);
    assert_eq!(backend.live(HostResource::Buffer), 0);

    assert!(matches!(session.step(1), Err(Error::NotLoaded { what: "kernel", .. })));
    session.reload_kernel_if_needed(&grid).unwrap();
    session.create_buffers(&grid).unwrap();
    assert_eq!(backend.created(HostResource::Program), 2);
    assert_eq!(backend.created(HostResource::Buffer), 4);
}

#[test]
fn test_failed_context_creation_leaves_nothing_loaded() {
    let backend = host_backend();
    let grid = sample_grid([16, 16, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);

    backend.fail_next(HostOp::CreateContext, Status::OUT_OF_HOST_MEMORY);
    session.set_device(1);
    let err = session.reload_context_if_needed().unwrap_err();
    assert_eq!(err.status(), Some(Status::OUT_OF_HOST_MEMORY));
    assert_eq!(err.kind(), ErrorKind::ResourceCreation);
    assert!(err.to_string().starts_with("reload_context: failed to create context"), "{err}");
    assert!(!session.is_context_loaded());
    assert_eq!(backend.live(HostResource::Context), 0);

    // Retrying the same target works once the failure is gone.
    session.reload_context_if_needed().unwrap();
    assert!(session.is_context_loaded());
}

#[test]
fn test_source_change_rebuilds_kernel() {
    let backend = host_backend();
    let grid = sample_grid([8, 8, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);

    session.set_kernel_source(KernelSource::new(HALVE_SRC).with_entry_point("halve"));
    session.reload_kernel_if_needed(&grid).unwrap();
    assert_eq!(backend.created(HostResource::Program), 2);
    assert_eq!(backend.live(HostResource::Program), 1);
    assert_eq!(session.kernel_source().unwrap().entry_point(), "halve");

    // Changing only the entry point is a different source too.
    session.set_kernel_source(KernelSource::new(HALVE_SRC).with_entry_point("rd_compute"));
    let err = session.reload_kernel_if_needed(&grid).unwrap_err();
    assert!(matches!(err, Error::KernelNotFound { ref name, .. } if name == "rd_compute"));
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert!(!session.is_kernel_compiled());
}

#[test]
fn test_grid_resize_rebuilds_kernel_and_buffers() {
    let backend = host_backend();
    let small = sample_grid([8, 8, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &small);
    assert_eq!(session.work_partition().unwrap().global, [8, 8, 1]);

    let large = sample_grid([32, 32, 4], 1);
    // Buffers still sized for the old grid.
    let err = session.write_to_buffers(&large).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { expected: 64, actual: 4096, .. }));
    assert_eq!(err.kind(), ErrorKind::Transfer);

    session.create_buffers(&large).unwrap();
    assert_eq!(session.buffer_layout(), Some(GridLayout::new([32, 32, 4], 1)));
    assert!(matches!(session.step(1), Err(Error::NotLoaded { operation: "step", .. })));

    session.reload_kernel_if_needed(&large).unwrap();
    let partition = session.work_partition().unwrap();
    assert_eq!(partition.global, [32, 32, 4]);
    assert_eq!(partition.local, [32, 8, 1]);
    assert_eq!(backend.live(HostResource::Buffer), 2);
}

// ============================================================================
// Work partition
// ============================================================================

#[test]
fn test_partition_examples_through_session() {
    let backend = host_backend();
    let mut session = Session::new(backend.clone());
    session.set_kernel_source(KernelSource::new(IDENTITY_SRC));
    session.reload_context_if_needed().unwrap();

    session.reload_kernel_if_needed(&HostGrid::new([64, 64, 1], 1)).unwrap();
    assert_eq!(session.work_partition().unwrap().local, [64, 4, 1]);

    session.reload_kernel_if_needed(&HostGrid::new([100, 100, 1], 1)).unwrap();
    assert_eq!(session.work_partition().unwrap().local, [100, 2, 1]);

    let err = session.reload_kernel_if_needed(&HostGrid::new([100, 97, 1], 1)).unwrap_err();
    assert!(matches!(err, Error::GridNotDivisible { local: [100, 2, 1], .. }));
    assert!(!session.is_kernel_compiled());
    assert_eq!(backend.live(HostResource::Kernel), 0);

    session.set_compute_target(1, 0);
    session.reload_context_if_needed().unwrap();
    let err = session.reload_kernel_if_needed(&HostGrid::new([64, 64, 1], 1)).unwrap_err();
    assert!(matches!(err, Error::UnsupportedWorkGroupSize { size: 200 }));
}

// ============================================================================
// Stepping
// ============================================================================

#[test]
fn test_step_twice_identity_round_trip() {
    init_tracing();
    let backend = host_backend();
    let mut grid = sample_grid([64, 64, 1], 2);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);

    session.step_twice().unwrap();
    assert_eq!(session.current_slot(), Slot::A);
    session.read_from_buffers(&mut grid).unwrap();

    assert_eq!(grid.scalars(GridSide::New), grid.scalars(GridSide::Old));
    assert_eq!(backend.enqueue_count(), 2);
}

#[test]
fn test_odd_step_parity() {
    let backend = host_backend();
    let mut grid = HostGrid::from_fn([4, 4, 1], 1, |_| 8.0);
    let mut session = ready_session(&backend, KernelSource::new(HALVE_SRC).with_entry_point("halve"), &grid);

    assert_eq!(session.step(3).unwrap(), Slot::B);
    assert_eq!(session.current_slot(), Slot::B);
    session.read_from_buffers(&mut grid).unwrap();
    assert!(grid.scalars(GridSide::New).iter().all(|v| *v == 1.0));

    // Continuing from B: one more step lands in A.
    assert_eq!(session.step(1).unwrap(), Slot::A);
    session.read_from_buffers(&mut grid).unwrap();
    assert!(grid.scalars(GridSide::New).iter().all(|v| *v == 0.5));
}

#[test]
fn test_zero_steps() {
    let backend = host_backend();
    let grid = sample_grid([4, 4, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);
    assert_eq!(session.step(0).unwrap(), Slot::A);
    assert_eq!(backend.enqueue_count(), 0);
}

#[test]
fn test_failed_step_keeps_last_completed_state() {
    let backend = host_backend();
    let mut grid = HostGrid::from_fn([4, 4, 1], 1, |_| 8.0);
    let mut session = ready_session(&backend, KernelSource::new(HALVE_SRC).with_entry_point("halve"), &grid);

    backend.fail_after(HostOp::Enqueue, 2, Status::OUT_OF_RESOURCES);
    let err = session.step(5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().starts_with("step: kernel enqueue failed"), "{err}");
    assert_eq!(backend.enqueue_count(), 2);

    assert_eq!(session.current_slot(), Slot::A);
    session.read_from_buffers(&mut grid).unwrap();
    assert!(grid.scalars(GridSide::New).iter().all(|v| *v == 2.0));
}

#[test]
fn test_write_resets_current_slot() {
    let backend = host_backend();
    let mut grid = HostGrid::from_fn([4, 4, 1], 1, |_| 8.0);
    let mut session = ready_session(&backend, KernelSource::new(HALVE_SRC).with_entry_point("halve"), &grid);

    session.step(1).unwrap();
    assert_eq!(session.current_slot(), Slot::B);
    session.read_from_buffers(&mut grid).unwrap();
    grid.swap();
    session.write_to_buffers(&grid).unwrap();
    assert_eq!(session.current_slot(), Slot::A);

    session.step_twice().unwrap();
    session.read_from_buffers(&mut grid).unwrap();
    assert!(grid.scalars(GridSide::New).iter().all(|v| *v == 1.0));
}

#[test]
fn test_transfer_failures() {
    let backend = host_backend();
    let mut grid = sample_grid([4, 4, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);

    backend.fail_next(HostOp::ReadBuffer, Status::INVALID_MEM_OBJECT);
    let err = session.read_from_buffers(&mut grid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert!(err.to_string().starts_with("read_from_buffers: buffer reading failed"), "{err}");

    backend.fail_next(HostOp::WriteBuffer, Status::OUT_OF_RESOURCES);
    let err = session.write_to_buffers(&grid).unwrap_err();
    assert!(err.to_string().starts_with("write_to_buffers: buffer writing failed"), "{err}");
    assert!(err.to_string().contains("Out of resources"), "{err}");
}

// ============================================================================
// Compilation diagnostics
// ============================================================================

#[test]
fn test_build_failure_surfaces_compiler_log() {
    init_tracing();
    let backend = host_backend();
    let grid = sample_grid([8, 8, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);
    assert!(session.is_kernel_compiled());

    session.set_kernel_source(KernelSource::new(MALFORMED_SRC));
    let err = session.reload_kernel_if_needed(&grid).unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("reload_kernel: build failed:\n\n"), "{msg}");
    assert!(msg.contains("<kernel>:2:1: error: '{' is never closed; expected '}'"), "{msg}");
    assert!(msg.contains("1 error generated."), "{msg}");
    assert_eq!(err.kind(), ErrorKind::Compilation);

    // The previous kernel is not left behind.
    assert!(!session.is_kernel_compiled());
    assert!(session.step(1).is_err());
}

#[test]
fn test_compile_leaves_live_kernel_alone() {
    let backend = host_backend();
    let mut grid = sample_grid([8, 8, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);
    let kernels = backend.created(HostResource::Kernel);

    session.test_compile(HALVE_SRC).unwrap();
    let err = session.test_compile(MALFORMED_SRC).unwrap_err();
    assert!(err.to_string().starts_with("test_compile: build failed:\n\n<kernel>:2:1: error"), "{err}");

    assert_eq!(backend.created(HostResource::Kernel), kernels);
    assert_eq!(backend.live(HostResource::Program), 1);
    assert!(session.is_kernel_compiled());
    session.step_twice().unwrap();
    session.read_from_buffers(&mut grid).unwrap();
    assert_eq!(grid.scalars(GridSide::New), grid.scalars(GridSide::Old));
}

#[test]
fn test_empty_source_fails_submission() {
    let backend = host_backend();
    let grid = sample_grid([8, 8, 1], 1);
    let mut session = ready_session(&backend, KernelSource::new(IDENTITY_SRC), &grid);

    let err = session.test_compile("").unwrap_err();
    assert_eq!(err.status(), Some(Status::INVALID_VALUE));
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert!(err.to_string().starts_with("test_compile: source submission failed"), "{err}");
    assert!(session.is_kernel_compiled());

    session.set_kernel_text("");
    let err = session.reload_kernel_if_needed(&grid).unwrap_err();
    assert!(err.to_string().starts_with("reload_kernel: source submission failed"), "{err}");
    assert!(!session.is_kernel_compiled());
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_diagnostics_without_platforms() {
    let session = Session::new(HostBackend::empty());
    let report = session.diagnostics_report();
    assert!(report.contains("No compute platforms available"), "{report}");
}

#[test]
fn test_diagnostics_lists_everything() {
    let session = Session::new(host_backend());
    let report = session.diagnostics_report();
    assert!(report.starts_with("Found 2 platform(s):"), "{report}");
    assert!(report.contains("NAME: Reference"));
    assert!(report.contains("NAME: weird"));
    assert_eq!(report.matches("device(s) on this platform.").count(), 2);
    assert_eq!(session.compute_target(), ComputeTarget::default());
}
