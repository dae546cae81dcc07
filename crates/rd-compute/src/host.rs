//! CPU reference backend.
//!
//! Simulates the device API on the host: platforms and devices are
//! configured up front, kernels are Rust closures registered by entry-point
//! name, and the "compiler" checks source structure and reports problems in a
//! line-numbered build log. Every created handle is counted, and any call can
//! be made to fail on demand, which makes this the backend the session's
//! lifecycle tests run against. Hosts without an OpenCL device can use it to
//! step a grid with native kernels.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::backend::{Backend, DeviceInfo, PlatformInfo};
use crate::status::Status;

/// Host implementation of a kernel: reads the input buffer, writes the
/// output buffer, and receives the global range.
pub type HostKernelFn = dyn Fn(&[f32], &mut [f32], [usize; 3]) + Send + Sync;

/// Backend calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    Platforms,
    Devices,
    PlatformInfo,
    DeviceInfo,
    CreateContext,
    CreateQueue,
    CreateProgram,
    BuildProgram,
    BuildLog,
    CreateKernel,
    WorkGroupSize,
    CreateBuffer,
    WriteBuffer,
    ReadBuffer,
    SetKernelArg,
    Enqueue,
    Finish,
}

/// Kinds of handle the backend counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostResource {
    Context,
    Queue,
    Program,
    Kernel,
    Buffer,
}

impl HostResource {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A simulated device.
#[derive(Debug, Clone)]
pub struct HostDevice {
    info: HashMap<DeviceInfo, String>,
    max_work_group_size: usize,
}

impl HostDevice {
    pub fn new(name: impl Into<String>, max_work_group_size: usize) -> Self {
        let info = HashMap::from([
            (DeviceInfo::Name, name.into()),
            (DeviceInfo::Vendor, "rd-compute".to_string()),
            (DeviceInfo::DriverVersion, env!("CARGO_PKG_VERSION").to_string()),
            (DeviceInfo::Profile, "FULL_PROFILE".to_string()),
            (DeviceInfo::Version, "OpenCL 1.2 host reference".to_string()),
            (DeviceInfo::Extensions, String::new()),
        ]);
        Self { info, max_work_group_size }
    }

    pub fn with_info(mut self, param: DeviceInfo, value: impl Into<String>) -> Self {
        self.info.insert(param, value.into());
        self
    }

    /// Make queries for `param` fail.
    pub fn without_info(mut self, param: DeviceInfo) -> Self {
        self.info.remove(&param);
        self
    }

    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }
}

/// A simulated platform and its devices.
#[derive(Debug, Clone)]
pub struct HostPlatform {
    info: HashMap<PlatformInfo, String>,
    devices: Vec<HostDevice>,
}

impl HostPlatform {
    pub fn new(name: impl Into<String>) -> Self {
        let info = HashMap::from([
            (PlatformInfo::Profile, "FULL_PROFILE".to_string()),
            (PlatformInfo::Version, "OpenCL 1.2 host reference".to_string()),
            (PlatformInfo::Name, name.into()),
            (PlatformInfo::Vendor, "rd-compute".to_string()),
            (PlatformInfo::Extensions, String::new()),
        ]);
        Self { info, devices: Vec::new() }
    }

    pub fn with_device(mut self, device: HostDevice) -> Self {
        self.devices.push(device);
        self
    }

    pub fn with_info(mut self, param: PlatformInfo, value: impl Into<String>) -> Self {
        self.info.insert(param, value.into());
        self
    }

    /// Make queries for `param` fail.
    pub fn without_info(mut self, param: PlatformInfo) -> Self {
        self.info.remove(&param);
        self
    }
}

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    created: [AtomicUsize; 5],
    live: [AtomicUsize; 5],
}

/// Counts a handle as live until dropped.
#[derive(Debug)]
struct Tracker {
    resource: HostResource,
    counters: Arc<Counters>,
}

impl Tracker {
    fn new(resource: HostResource, counters: &Arc<Counters>) -> Self {
        counters.created[resource.index()].fetch_add(1, Ordering::Relaxed);
        counters.live[resource.index()].fetch_add(1, Ordering::Relaxed);
        Self { resource, counters: Arc::clone(counters) }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.counters.live[self.resource.index()].fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
struct Injected {
    skip: usize,
    status: Status,
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostPlatformId(usize);

impl HostPlatformId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostDeviceId {
    platform: usize,
    device: usize,
}

impl HostDeviceId {
    /// Index of this device on its platform.
    pub fn index(&self) -> usize {
        self.device
    }

    pub fn platform(&self) -> usize {
        self.platform
    }
}

#[derive(Debug)]
pub struct HostContext {
    id: u64,
    device: HostDeviceId,
    _tracker: Tracker,
}

impl HostContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> HostDeviceId {
        self.device
    }
}

#[derive(Debug)]
pub struct HostQueue {
    id: u64,
    device: HostDeviceId,
    _tracker: Tracker,
}

impl HostQueue {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
struct BuildOutput {
    succeeded: bool,
    entry_points: Vec<String>,
    log: String,
}

#[derive(Debug)]
pub struct HostProgram {
    id: u64,
    source: String,
    build: Mutex<Option<BuildOutput>>,
    _tracker: Tracker,
}

impl HostProgram {
    pub fn id(&self) -> u64 {
        self.id
    }
}

type BufferData = Arc<Mutex<Vec<f32>>>;

#[derive(Clone)]
struct BoundBuffer {
    id: u64,
    data: BufferData,
}

pub struct HostKernel {
    id: u64,
    name: String,
    func: Arc<HostKernelFn>,
    args: Mutex<[Option<BoundBuffer>; 2]>,
    _tracker: Tracker,
}

impl HostKernel {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostKernel").field("id", &self.id).field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub struct HostBuffer {
    id: u64,
    data: BufferData,
    _tracker: Tracker,
}

impl HostBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct HostState {
    platforms: Vec<HostPlatform>,
    kernels: RwLock<HashMap<String, Arc<HostKernelFn>>>,
    failures: Mutex<HashMap<HostOp, Injected>>,
    counters: Arc<Counters>,
    next_id: AtomicU64,
    enqueued: AtomicUsize,
}

/// The CPU reference backend. Clones share state.
#[derive(Clone)]
pub struct HostBackend {
    state: Arc<HostState>,
}

impl Default for HostBackend {
    /// One platform with one device whose maximum work-group size is 256.
    fn default() -> Self {
        Self::new(vec![HostPlatform::new("Host Reference").with_device(HostDevice::new("Host CPU", 256))])
    }
}

impl fmt::Debug for HostBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBackend")
            .field("platforms", &self.state.platforms.len())
            .field("kernels", &self.state.kernels.read().len())
            .finish()
    }
}

impl HostBackend {
    pub fn new(platforms: Vec<HostPlatform>) -> Self {
        Self {
            state: Arc::new(HostState {
                platforms,
                kernels: RwLock::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                counters: Arc::new(Counters::default()),
                next_id: AtomicU64::new(1),
                enqueued: AtomicUsize::new(0),
            }),
        }
    }

    /// A backend with no platforms at all.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Provide the implementation of kernel `name`.
    ///
    /// Programs still have to declare the kernel in their source for it to
    /// be found.
    pub fn register_kernel<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&[f32], &mut [f32], [usize; 3]) + Send + Sync + 'static,
    {
        self.state.kernels.write().insert(name.into(), Arc::new(f));
    }

    pub fn with_kernel<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[f32], &mut [f32], [usize; 3]) + Send + Sync + 'static,
    {
        self.register_kernel(name, f);
        self
    }

    /// Fail the next call of `op` with `status`.
    pub fn fail_next(&self, op: HostOp, status: Status) {
        self.fail_after(op, 0, status);
    }

    /// Let `skip` calls of `op` succeed, then fail the one after with `status`.
    pub fn fail_after(&self, op: HostOp, skip: usize, status: Status) {
        self.state.failures.lock().insert(op, Injected { skip, status });
    }

    /// Handles of kind `resource` created so far.
    pub fn created(&self, resource: HostResource) -> usize {
        self.state.counters.created[resource.index()].load(Ordering::Relaxed)
    }

    /// Handles of kind `resource` not yet dropped.
    pub fn live(&self, resource: HostResource) -> usize {
        self.state.counters.live[resource.index()].load(Ordering::Relaxed)
    }

    /// Kernel executions run so far.
    pub fn enqueue_count(&self) -> usize {
        self.state.enqueued.load(Ordering::Relaxed)
    }

    fn inject(&self, op: HostOp) -> Result<(), Status> {
        let mut failures = self.state.failures.lock();
        match failures.get_mut(&op) {
            Some(injected) if injected.skip > 0 => {
                injected.skip -= 1;
                Ok(())
            }
            Some(injected) => {
                let status = injected.status;
                failures.remove(&op);
                Err(status)
            }
            None => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        self.state.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn tracker(&self, resource: HostResource) -> Tracker {
        Tracker::new(resource, &self.state.counters)
    }

    fn platform(&self, id: &HostPlatformId) -> Result<&HostPlatform, Status> {
        self.state.platforms.get(id.0).ok_or(Status::INVALID_PLATFORM)
    }

    fn device(&self, id: &HostDeviceId) -> Result<&HostDevice, Status> {
        self.state
            .platforms
            .get(id.platform)
            .and_then(|p| p.devices.get(id.device))
            .ok_or(Status::INVALID_DEVICE)
    }
}

impl Backend for HostBackend {
    type Platform = HostPlatformId;
    type Device = HostDeviceId;
    type Context = HostContext;
    type Queue = HostQueue;
    type Program = HostProgram;
    type Kernel = HostKernel;
    type Buffer = HostBuffer;

    fn platforms(&self) -> Result<Vec<HostPlatformId>, Status> {
        self.inject(HostOp::Platforms)?;
        Ok((0..self.state.platforms.len()).map(HostPlatformId).collect())
    }

    fn devices(&self, platform: &HostPlatformId) -> Result<Vec<HostDeviceId>, Status> {
        self.inject(HostOp::Devices)?;
        let p = self.platform(platform)?;
        Ok((0..p.devices.len()).map(|device| HostDeviceId { platform: platform.0, device }).collect())
    }

    fn platform_info(&self, platform: &HostPlatformId, param: PlatformInfo) -> Result<String, Status> {
        self.inject(HostOp::PlatformInfo)?;
        self.platform(platform)?.info.get(&param).cloned().ok_or(Status::INVALID_VALUE)
    }

    fn device_info(&self, device: &HostDeviceId, param: DeviceInfo) -> Result<String, Status> {
        self.inject(HostOp::DeviceInfo)?;
        self.device(device)?.info.get(&param).cloned().ok_or(Status::INVALID_VALUE)
    }

    fn create_context(&self, device: &HostDeviceId) -> Result<HostContext, Status> {
        self.inject(HostOp::CreateContext)?;
        self.device(device)?;
        Ok(HostContext { id: self.next_id(), device: *device, _tracker: self.tracker(HostResource::Context) })
    }

    fn create_queue(&self, context: &HostContext, device: &HostDeviceId) -> Result<HostQueue, Status> {
        self.inject(HostOp::CreateQueue)?;
        if context.device != *device {
            return Err(Status::INVALID_DEVICE);
        }
        Ok(HostQueue { id: self.next_id(), device: *device, _tracker: self.tracker(HostResource::Queue) })
    }

    fn create_program(&self, _context: &HostContext, source: &str) -> Result<HostProgram, Status> {
        self.inject(HostOp::CreateProgram)?;
        if source.is_empty() {
            return Err(Status::INVALID_VALUE);
        }
        Ok(HostProgram {
            id: self.next_id(),
            source: source.to_string(),
            build: Mutex::new(None),
            _tracker: self.tracker(HostResource::Program),
        })
    }

    fn build_program(&self, program: &HostProgram, device: &HostDeviceId) -> Result<(), Status> {
        self.inject(HostOp::BuildProgram)?;
        self.device(device)?;
        let output = compile_source(&program.source);
        let succeeded = output.succeeded;
        *program.build.lock() = Some(output);
        if succeeded {
            Ok(())
        } else {
            Err(Status::BUILD_PROGRAM_FAILURE)
        }
    }

    fn build_log(&self, program: &HostProgram, device: &HostDeviceId) -> Result<String, Status> {
        self.inject(HostOp::BuildLog)?;
        self.device(device)?;
        Ok(program.build.lock().as_ref().map(|b| b.log.clone()).unwrap_or_default())
    }

    fn create_kernel(&self, program: &HostProgram, name: &str) -> Result<HostKernel, Status> {
        self.inject(HostOp::CreateKernel)?;
        let declared = match program.build.lock().as_ref() {
            Some(build) if build.succeeded => build.entry_points.iter().any(|e| e == name),
            _ => return Err(Status::INVALID_PROGRAM_EXECUTABLE),
        };
        if !declared {
            return Err(Status::INVALID_KERNEL_NAME);
        }
        let func = self.state.kernels.read().get(name).cloned().ok_or(Status::INVALID_KERNEL_DEFINITION)?;
        Ok(HostKernel {
            id: self.next_id(),
            name: name.to_string(),
            func,
            args: Mutex::new([None, None]),
            _tracker: self.tracker(HostResource::Kernel),
        })
    }

    fn kernel_work_group_size(&self, _kernel: &HostKernel, device: &HostDeviceId) -> Result<usize, Status> {
        self.inject(HostOp::WorkGroupSize)?;
        Ok(self.device(device)?.max_work_group_size)
    }

    fn create_buffer(&self, _context: &HostContext, bytes: usize) -> Result<HostBuffer, Status> {
        self.inject(HostOp::CreateBuffer)?;
        let width = std::mem::size_of::<f32>();
        if bytes == 0 || bytes % width != 0 {
            return Err(Status::INVALID_BUFFER_SIZE);
        }
        Ok(HostBuffer {
            id: self.next_id(),
            data: Arc::new(Mutex::new(vec![0.0; bytes / width])),
            _tracker: self.tracker(HostResource::Buffer),
        })
    }

    fn write_buffer(&self, _queue: &HostQueue, buffer: &HostBuffer, data: &[f32]) -> Result<(), Status> {
        self.inject(HostOp::WriteBuffer)?;
        let mut dst = buffer.data.lock();
        if dst.len() != data.len() {
            return Err(Status::INVALID_VALUE);
        }
        dst.copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, _queue: &HostQueue, buffer: &HostBuffer, data: &mut [f32]) -> Result<(), Status> {
        self.inject(HostOp::ReadBuffer)?;
        let src = buffer.data.lock();
        if src.len() != data.len() {
            return Err(Status::INVALID_VALUE);
        }
        data.copy_from_slice(&src);
        Ok(())
    }

    fn set_kernel_arg_buffer(&self, kernel: &HostKernel, index: u32, buffer: &HostBuffer) -> Result<(), Status> {
        self.inject(HostOp::SetKernelArg)?;
        let mut args = kernel.args.lock();
        let slot = args.get_mut(index as usize).ok_or(Status::INVALID_ARG_INDEX)?;
        *slot = Some(BoundBuffer { id: buffer.id, data: Arc::clone(&buffer.data) });
        Ok(())
    }

    fn enqueue_nd_range(
        &self,
        queue: &HostQueue,
        kernel: &HostKernel,
        global: [usize; 3],
        local: [usize; 3],
    ) -> Result<(), Status> {
        self.inject(HostOp::Enqueue)?;
        if global.contains(&0) {
            return Err(Status::INVALID_GLOBAL_WORK_SIZE);
        }
        let max = self.device(&queue.device)?.max_work_group_size;
        let fits = local.iter().product::<usize>() <= max;
        let divides = global.iter().zip(&local).all(|(g, l)| *l != 0 && g % l == 0);
        if !fits || !divides {
            return Err(Status::INVALID_WORK_GROUP_SIZE);
        }

        let args = kernel.args.lock();
        let (input, output) = match &*args {
            [Some(input), Some(output)] if input.id != output.id => (input.clone(), output.clone()),
            _ => return Err(Status::INVALID_KERNEL_ARGS),
        };
        drop(args);

        let src = input.data.lock();
        let mut dst = output.data.lock();
        (kernel.func)(&src, &mut dst, global);
        self.state.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn finish(&self, _queue: &HostQueue) -> Result<(), Status> {
        // Kernels run synchronously at enqueue.
        self.inject(HostOp::Finish)
    }
}

// ---------------------------------------------------------------------------
// Source checking
// ---------------------------------------------------------------------------

const SOURCE_NAME: &str = "<kernel>";

/// Check kernel source structure and collect its `__kernel void` entry
/// points.
///
/// Reports unbalanced brackets and `#error` directives, clang style.
fn compile_source(source: &str) -> BuildOutput {
    let code = strip_comments(source);
    let lines: Vec<&str> = source.lines().collect();
    let mut errors: Vec<String> = Vec::new();

    let mut diagnostic = |line: usize, col: usize, message: String| {
        let text = lines.get(line - 1).copied().unwrap_or("");
        let caret = format!("{}^", " ".repeat(col.saturating_sub(1)));
        errors.push(format!("{SOURCE_NAME}:{line}:{col}: error: {message}\n{text}\n{caret}"));
    };

    for (i, line) in code.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("#error") {
            let col = line.len() - trimmed.len() + 2;
            diagnostic(i + 1, col, rest.trim().to_string());
        }
    }

    let mut open: Vec<(char, usize, usize)> = Vec::new();
    for (i, line) in code.lines().enumerate() {
        for (j, c) in line.chars().enumerate() {
            let (line_no, col) = (i + 1, j + 1);
            match c {
                '(' | '[' | '{' => open.push((c, line_no, col)),
                ')' | ']' | '}' => match open.last() {
                    Some(&(o, _, _)) if closing(o) == c => {
                        open.pop();
                    }
                    Some(&(o, _, _)) => diagnostic(line_no, col, format!("expected '{}' before '{c}'", closing(o))),
                    None => diagnostic(line_no, col, format!("extraneous closing '{c}'")),
                },
                _ => {}
            }
        }
    }
    for (o, line_no, col) in open {
        diagnostic(line_no, col, format!("'{o}' is never closed; expected '{}'", closing(o)));
    }

    if errors.is_empty() {
        return BuildOutput { succeeded: true, entry_points: entry_points(&code), log: String::new() };
    }
    let count = errors.len();
    let mut log = errors.join("\n");
    log.push_str(&format!("\n{count} error{} generated.\n", if count == 1 { "" } else { "s" }));
    BuildOutput { succeeded: false, entry_points: Vec::new(), log }
}

fn closing(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Blank out `//` and `/* */` comments, keeping line structure.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                out.push_str("  ");
                let mut prev = ' ';
                for c in chars.by_ref() {
                    out.push(if c == '\n' { '\n' } else { ' ' });
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn entry_points(code: &str) -> Vec<String> {
    let words: Vec<&str> = code
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    words
        .windows(3)
        .filter(|w| matches!(w[0], "__kernel" | "kernel") && w[1] == "void")
        .map(|w| w[2].to_string())
        .collect()
}
