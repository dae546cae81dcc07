//! Device context lifecycle.
//!
//! The compiled kernel and the double buffer are owned by the loaded context
//! they were created against, so replacing or dropping the context always
//! drops them too.

use tracing::{debug, info};

use crate::backend::Backend;
use crate::buffers::DoubleBuffer;
use crate::config::Limits;
use crate::enumerate::{self, ComputeTarget};
use crate::error::{ErrorKind, Result};
use crate::program::{CompiledKernel, KernelSource};
use crate::status::checked;

/// Device, context and queue, created together and released together.
pub struct DeviceContext<B: Backend> {
    // Field order is release order: queue before context.
    queue: B::Queue,
    context: B::Context,
    device: B::Device,
}

impl<B: Backend> DeviceContext<B> {
    /// Resolve `target` and create a context and in-order queue on it.
    pub fn create(backend: &B, target: ComputeTarget, limits: &Limits, operation: &'static str) -> Result<Self> {
        let (_platform, device) = enumerate::resolve(backend, target, limits, operation)?;
        let context = checked(
            backend.create_context(&device),
            ErrorKind::ResourceCreation,
            &format!("{operation}: failed to create context"),
        )?;
        let queue = checked(
            backend.create_queue(&context, &device),
            ErrorKind::ResourceCreation,
            &format!("{operation}: failed to create command queue"),
        )?;
        Ok(Self { queue, context, device })
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn context(&self) -> &B::Context {
        &self.context
    }

    pub fn queue(&self) -> &B::Queue {
        &self.queue
    }
}

/// The step kernel, if one has been built in the current context.
pub enum KernelState<B: Backend> {
    Uncompiled,
    Compiled {
        /// Source the kernel was built from.
        source: KernelSource,
        /// Grid dimensions the work partition was derived for.
        dims: [usize; 3],
        kernel: CompiledKernel<B>,
    },
}

impl<B: Backend> KernelState<B> {
    /// Whether the compiled kernel matches `source` and `dims`.
    pub fn is_current(&self, source: &KernelSource, dims: [usize; 3]) -> bool {
        match self {
            KernelState::Compiled { source: s, dims: d, .. } => s == source && *d == dims,
            KernelState::Uncompiled => false,
        }
    }

    pub fn compiled(&self) -> Option<&CompiledKernel<B>> {
        match self {
            KernelState::Compiled { kernel, .. } => Some(kernel),
            KernelState::Uncompiled => None,
        }
    }
}

/// A context for a particular target, with everything built against it.
pub struct LoadedContext<B: Backend> {
    // Dependents first so they are released before the context.
    pub kernel: KernelState<B>,
    pub buffers: Option<DoubleBuffer<B>>,
    pub target: ComputeTarget,
    pub device: DeviceContext<B>,
}

/// Context lifecycle state.
pub enum ContextState<B: Backend> {
    Unloaded,
    Loaded(LoadedContext<B>),
}

impl<B: Backend> Default for ContextState<B> {
    fn default() -> Self {
        ContextState::Unloaded
    }
}

impl<B: Backend> ContextState<B> {
    pub fn loaded(&self) -> Option<&LoadedContext<B>> {
        match self {
            ContextState::Loaded(l) => Some(l),
            ContextState::Unloaded => None,
        }
    }

    pub fn loaded_mut(&mut self) -> Option<&mut LoadedContext<B>> {
        match self {
            ContextState::Loaded(l) => Some(l),
            ContextState::Unloaded => None,
        }
    }

    /// Make sure a context for `target` is loaded.
    ///
    /// Does nothing when `target` is already loaded. Otherwise the current
    /// context and its dependents are released first, so a failure part way
    /// leaves the state unloaded.
    pub fn ensure(&mut self, backend: &B, target: ComputeTarget, limits: &Limits) -> Result<()> {
        if let ContextState::Loaded(loaded) = self {
            if loaded.target == target {
                debug!(%target, "context already loaded");
                return Ok(());
            }
        }

        *self = ContextState::Unloaded;
        let device = DeviceContext::create(backend, target, limits, "reload_context")?;
        info!(%target, "created compute context");
        *self = ContextState::Loaded(LoadedContext {
            kernel: KernelState::Uncompiled,
            buffers: None,
            target,
            device,
        });
        Ok(())
    }
}
