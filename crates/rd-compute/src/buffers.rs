//! Device-side double buffer and host transfers.

use std::mem::size_of;

use tracing::debug;

use crate::backend::Backend;
use crate::error::{Error, ErrorKind, Result};
use crate::status::checked;

/// One of the two buffers of a [`DoubleBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Shape of the grid data a double buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridLayout {
    pub dims: [usize; 3],
    pub components: usize,
}

impl GridLayout {
    pub fn new(dims: [usize; 3], components: usize) -> Self {
        Self { dims, components }
    }

    /// Number of `f32` values.
    pub fn len(&self) -> usize {
        self.dims.iter().product::<usize>() * self.components
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        size_of::<f32>() * self.len()
    }
}

/// Two device buffers of identical size, used alternately as kernel input
/// and output.
pub struct DoubleBuffer<B: Backend> {
    a: B::Buffer,
    b: B::Buffer,
    layout: GridLayout,
}

impl<B: Backend> DoubleBuffer<B> {
    /// Allocate both read-write buffers for `layout`.
    pub fn allocate(backend: &B, context: &B::Context, layout: GridLayout, operation: &str) -> Result<Self> {
        let bytes = layout.byte_size();
        let context_msg = format!("{operation}: buffer creation failed");
        let a = checked(backend.create_buffer(context, bytes), ErrorKind::ResourceCreation, &context_msg)?;
        let b = checked(backend.create_buffer(context, bytes), ErrorKind::ResourceCreation, &context_msg)?;
        debug!(bytes, dims = ?layout.dims, components = layout.components, "allocated double buffer");
        Ok(Self { a, b, layout })
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn get(&self, slot: Slot) -> &B::Buffer {
        match slot {
            Slot::A => &self.a,
            Slot::B => &self.b,
        }
    }

    /// Blocking copy of `data` into `slot`.
    pub fn write_in(&self, backend: &B, queue: &B::Queue, slot: Slot, data: &[f32], operation: &str) -> Result<()> {
        self.check_len(data.len(), operation)?;
        checked(
            backend.write_buffer(queue, self.get(slot), data),
            ErrorKind::Transfer,
            &format!("{operation}: buffer writing failed"),
        )
    }

    /// Blocking copy of `slot` into `data`.
    pub fn read_out(&self, backend: &B, queue: &B::Queue, slot: Slot, data: &mut [f32], operation: &str) -> Result<()> {
        self.check_len(data.len(), operation)?;
        checked(
            backend.read_buffer(queue, self.get(slot), data),
            ErrorKind::Transfer,
            &format!("{operation}: buffer reading failed"),
        )
    }

    fn check_len(&self, actual: usize, operation: &str) -> Result<()> {
        let expected = self.layout.len();
        if actual != expected {
            return Err(Error::SizeMismatch { context: operation.to_string(), expected, actual });
        }
        Ok(())
    }
}
