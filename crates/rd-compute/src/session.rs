//! The compute session driven by the host application.

use tracing::debug;

use crate::backend::Backend;
use crate::buffers::{DoubleBuffer, GridLayout, Slot};
use crate::config::SessionConfig;
use crate::context::{ContextState, DeviceContext, KernelState, LoadedContext};
use crate::diagnostics;
use crate::enumerate::ComputeTarget;
use crate::error::{Error, Result};
use crate::grid::{Grid, GridSide};
use crate::partition::WorkPartition;
use crate::program::{self, KernelSource};
use crate::step;

/// Steps a reaction-diffusion grid on a compute device.
///
/// Configuration setters only record what is wanted. Nothing is created on
/// the device until the matching reload or create call, and each of those
/// does nothing when its inputs are unchanged since it last succeeded. The
/// expected order per run is [`reload_context_if_needed`],
/// [`reload_kernel_if_needed`], [`create_buffers`], [`write_to_buffers`],
/// any number of [`step`] calls, then [`read_from_buffers`].
///
/// [`reload_context_if_needed`]: Session::reload_context_if_needed
/// [`reload_kernel_if_needed`]: Session::reload_kernel_if_needed
/// [`create_buffers`]: Session::create_buffers
/// [`write_to_buffers`]: Session::write_to_buffers
/// [`step`]: Session::step
/// [`read_from_buffers`]: Session::read_from_buffers
pub struct Session<B: Backend> {
    backend: B,
    config: SessionConfig,
    source: Option<KernelSource>,
    state: ContextState<B>,
    current: Slot,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: SessionConfig::default(),
            source: None,
            state: ContextState::Unloaded,
            current: Slot::A,
        }
    }

    pub fn with_config(backend: B, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, ..Self::new(backend) })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -- configuration ------------------------------------------------------

    pub fn set_compute_target(&mut self, platform: usize, device: usize) {
        self.config.target = ComputeTarget::new(platform, device);
    }

    pub fn set_platform(&mut self, platform: usize) {
        self.config.target.platform = platform;
    }

    pub fn set_device(&mut self, device: usize) {
        self.config.target.device = device;
    }

    pub fn platform(&self) -> usize {
        self.config.target.platform
    }

    pub fn device(&self) -> usize {
        self.config.target.device
    }

    pub fn compute_target(&self) -> ComputeTarget {
        self.config.target
    }

    pub fn set_kernel_source(&mut self, source: KernelSource) {
        self.source = Some(source);
    }

    /// Set kernel text using the configured entry point.
    pub fn set_kernel_text(&mut self, text: impl Into<String>) {
        let source = KernelSource::new(text).with_entry_point(self.config.entry_point.clone());
        self.set_kernel_source(source);
    }

    pub fn kernel_source(&self) -> Option<&KernelSource> {
        self.source.as_ref()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create the context and queue for the configured target unless they
    /// already exist. A new context discards the kernel and buffers.
    pub fn reload_context_if_needed(&mut self) -> Result<()> {
        self.state.ensure(&self.backend, self.config.target, &self.config.limits)
    }

    /// Build the kernel unless the one in the loaded context was built from
    /// the current source for a grid of the same dimensions.
    pub fn reload_kernel_if_needed(&mut self, grid: &impl Grid) -> Result<()> {
        const OP: &str = "reload_kernel";
        let loaded = loaded_mut(&mut self.state, OP)?;
        let source = self.source.as_ref().ok_or(Error::NotLoaded { operation: OP, what: "kernel source" })?;
        let dims = grid.dimensions();
        if loaded.kernel.is_current(source, dims) {
            debug!(entry_point = source.entry_point(), "kernel up to date");
            return Ok(());
        }

        loaded.kernel = KernelState::Uncompiled;
        let kernel = program::compile(
            &self.backend,
            loaded.device.context(),
            loaded.device.device(),
            source,
            dims,
            &self.config.limits,
            OP,
        )?;
        loaded.kernel = KernelState::Compiled { source: source.clone(), dims, kernel };
        Ok(())
    }

    /// Allocate the double buffer for `grid` unless one of the same layout
    /// already exists.
    pub fn create_buffers(&mut self, grid: &impl Grid) -> Result<()> {
        const OP: &str = "create_buffers";
        let loaded = loaded_mut(&mut self.state, OP)?;
        let layout = GridLayout::new(grid.dimensions(), grid.component_count());
        if loaded.buffers.as_ref().map(|b| *b.layout()) == Some(layout) {
            debug!(dims = ?layout.dims, "buffers up to date");
            return Ok(());
        }

        loaded.buffers = None;
        let buffers = DoubleBuffer::allocate(&self.backend, loaded.device.context(), layout, OP)?;
        loaded.buffers = Some(buffers);
        self.current = Slot::A;
        Ok(())
    }

    /// Upload the grid's old snapshot into slot A, which becomes current.
    pub fn write_to_buffers(&mut self, grid: &impl Grid) -> Result<()> {
        const OP: &str = "write_to_buffers";
        let loaded = loaded(&self.state, OP)?;
        let buffers = loaded.buffers.as_ref().ok_or(Error::NotLoaded { operation: OP, what: "buffers" })?;
        buffers.write_in(&self.backend, loaded.device.queue(), Slot::A, grid.scalars(GridSide::Old), OP)?;
        self.current = Slot::A;
        Ok(())
    }

    /// Download the current slot into the grid's new snapshot.
    pub fn read_from_buffers(&self, grid: &mut impl Grid) -> Result<()> {
        const OP: &str = "read_from_buffers";
        let loaded = loaded(&self.state, OP)?;
        let buffers = loaded.buffers.as_ref().ok_or(Error::NotLoaded { operation: OP, what: "buffers" })?;
        buffers.read_out(&self.backend, loaded.device.queue(), self.current, grid.scalars_mut(GridSide::New), OP)
    }

    /// Advance the grid `steps` times and return the slot now holding the
    /// result, which also becomes current.
    ///
    /// If a step fails, the current slot is left at the last step that was
    /// enqueued successfully.
    pub fn step(&mut self, steps: usize) -> Result<Slot> {
        const OP: &str = "step";
        let loaded = loaded(&self.state, OP)?;
        let (kernel, dims) = match &loaded.kernel {
            KernelState::Compiled { kernel, dims, .. } => (kernel, *dims),
            KernelState::Uncompiled => return Err(Error::NotLoaded { operation: OP, what: "kernel" }),
        };
        let buffers = loaded.buffers.as_ref().ok_or(Error::NotLoaded { operation: OP, what: "buffers" })?;
        if buffers.layout().dims != dims {
            return Err(Error::NotLoaded { operation: OP, what: "kernel for the current grid dimensions" });
        }

        let current = &mut self.current;
        step::run_steps(
            &self.backend,
            loaded.device.queue(),
            kernel.kernel(),
            buffers,
            kernel.partition(),
            *current,
            steps,
            |slot| *current = slot,
        )
    }

    /// Advance two steps. Starting from slot A the result is back in slot A.
    pub fn step_twice(&mut self) -> Result<()> {
        self.step(2).map(|_| ())
    }

    pub fn current_slot(&self) -> Slot {
        self.current
    }

    /// Build `text` against the loaded context and discard the result.
    ///
    /// The live kernel and buffers are not touched.
    pub fn test_compile(&self, text: &str) -> Result<()> {
        const OP: &str = "test_compile";
        let loaded = loaded(&self.state, OP)?;
        program::build_program(
            &self.backend,
            loaded.device.context(),
            loaded.device.device(),
            text,
            &self.config.limits,
            OP,
        )?;
        Ok(())
    }

    /// Describe the backend's platforms and devices. Never fails.
    pub fn diagnostics_report(&self) -> String {
        diagnostics::report(&self.backend, &self.config.limits)
    }

    // -- introspection ------------------------------------------------------

    pub fn is_context_loaded(&self) -> bool {
        self.state.loaded().is_some()
    }

    pub fn is_kernel_compiled(&self) -> bool {
        self.state.loaded().and_then(|l| l.kernel.compiled()).is_some()
    }

    pub fn work_partition(&self) -> Option<WorkPartition> {
        self.state.loaded().and_then(|l| l.kernel.compiled()).map(|k| *k.partition())
    }

    pub fn buffer_layout(&self) -> Option<GridLayout> {
        self.state.loaded().and_then(|l| l.buffers.as_ref()).map(|b| *b.layout())
    }

    /// Device, context and queue, if loaded.
    pub fn device_context(&self) -> Option<&DeviceContext<B>> {
        self.state.loaded().map(|l| &l.device)
    }
}

fn loaded<'a, B: Backend>(state: &'a ContextState<B>, operation: &'static str) -> Result<&'a LoadedContext<B>> {
    state.loaded().ok_or(Error::NotLoaded { operation, what: "context" })
}

fn loaded_mut<'a, B: Backend>(
    state: &'a mut ContextState<B>,
    operation: &'static str,
) -> Result<&'a mut LoadedContext<B>> {
    state.loaded_mut().ok_or(Error::NotLoaded { operation, what: "context" })
}
