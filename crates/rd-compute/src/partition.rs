//! Work-group geometry for the 3-D step range.

use crate::error::{Error, Result};

/// Global and local extents for a 3-D range execution.
///
/// `local` divides `global` component-wise and its product never exceeds the
/// work-group size it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkPartition {
    pub global: [usize; 3],
    pub local: [usize; 3],
}

impl WorkPartition {
    /// Derive the partition for a grid of `dims` cells on a device whose
    /// maximum work-group size is `max_work_group_size`.
    ///
    /// X is packed first, then Y with what remains, then Z. Grids the derived
    /// group does not tile exactly are rejected; no padding is applied.
    pub fn derive(dims: [usize; 3], max_work_group_size: usize) -> Result<Self> {
        let wgs = max_work_group_size;
        if !wgs.is_power_of_two() {
            return Err(Error::UnsupportedWorkGroupSize { size: wgs });
        }
        if dims.contains(&0) {
            return Err(Error::EmptyGrid { dims });
        }

        let [x, y, z] = dims;
        let wgx = x.min(wgs);
        let wgy = y.min(wgs / wgx);
        let wgz = z.min(wgs / (wgx * wgy));
        let local = [wgx, wgy, wgz];

        if x % wgx != 0 || y % wgy != 0 || z % wgz != 0 {
            return Err(Error::GridNotDivisible { global: dims, local });
        }
        Ok(Self { global: dims, local })
    }

    /// Work items per group.
    pub fn group_size(&self) -> usize {
        self.local.iter().product()
    }

    /// Number of work groups along each axis.
    pub fn groups(&self) -> [usize; 3] {
        [
            self.global[0] / self.local[0],
            self.global[1] / self.local[1],
            self.global[2] / self.local[2],
        ]
    }
}
