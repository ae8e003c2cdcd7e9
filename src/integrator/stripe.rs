use std::sync::{Mutex, MutexGuard};

use crate::grid::hash::hash_voxel_index;
use crate::grid::GlobalVoxelIndex;

pub const STRIPE_BITS: u32 = 12;
const STRIPE_COUNT: usize = 1 << STRIPE_BITS;

/// Fixed pool of mutexes indexed by the low bits of a voxel-index hash.
///
/// Serializes per-voxel read-modify-write without per-voxel memory cost:
/// with W workers the chance two of them contend on unrelated voxels is
/// about W / 2^12. A worker holds at most one stripe at a time and stripes
/// are never reentrantly acquired.
pub struct StripeLocks {
    locks: Box<[Mutex<()>]>,
}

impl StripeLocks {
    pub fn new() -> Self {
        Self {
            locks: (0..STRIPE_COUNT).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Locks the stripe owning `index`; the guard must be held for the whole
    /// update of that voxel.
    #[inline]
    pub fn lock(&self, index: GlobalVoxelIndex) -> MutexGuard<'_, ()> {
        let stripe = (hash_voxel_index(index) & (STRIPE_COUNT as u32 - 1)) as usize;
        self.locks[stripe].lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StripeLocks {
    fn default() -> Self {
        Self::new()
    }
}
