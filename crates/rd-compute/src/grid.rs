//! Host-side grid data consumed by the session.

/// Which of the host's two grid snapshots to access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridSide {
    /// State before the step; uploaded by `write_to_buffers`.
    Old,
    /// State after the step; filled by `read_from_buffers`.
    New,
}

/// A host-owned 3-D grid of `f32` cells with a fixed number of components per
/// cell, stored as two snapshots.
///
/// Each snapshot holds `X * Y * Z * component_count()` values. The session
/// reads and writes through these slices and never keeps them.
pub trait Grid {
    fn dimensions(&self) -> [usize; 3];

    fn component_count(&self) -> usize;

    fn scalars(&self, side: GridSide) -> &[f32];

    fn scalars_mut(&mut self, side: GridSide) -> &mut [f32];
}

/// A `Vec`-backed [`Grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct HostGrid {
    dims: [usize; 3],
    components: usize,
    old: Vec<f32>,
    new: Vec<f32>,
}

impl HostGrid {
    /// A zero-filled grid.
    pub fn new(dims: [usize; 3], components: usize) -> Self {
        let len = dims.iter().product::<usize>() * components;
        Self { dims, components, old: vec![0.0; len], new: vec![0.0; len] }
    }

    /// A grid whose old snapshot is filled from `f(index)`.
    pub fn from_fn(dims: [usize; 3], components: usize, mut f: impl FnMut(usize) -> f32) -> Self {
        let mut grid = Self::new(dims, components);
        for (i, v) in grid.old.iter_mut().enumerate() {
            *v = f(i);
        }
        grid
    }

    /// Promote the new snapshot to old.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.old, &mut self.new);
    }

    pub fn old(&self) -> &[f32] {
        &self.old
    }

    pub fn new_data(&self) -> &[f32] {
        &self.new
    }
}

impl Grid for HostGrid {
    fn dimensions(&self) -> [usize; 3] {
        self.dims
    }

    fn component_count(&self) -> usize {
        self.components
    }

    fn scalars(&self, side: GridSide) -> &[f32] {
        match side {
            GridSide::Old => &self.old,
            GridSide::New => &self.new,
        }
    }

    fn scalars_mut(&mut self, side: GridSide) -> &mut [f32] {
        match side {
            GridSide::Old => &mut self.old,
            GridSide::New => &mut self.new,
        }
    }
}
