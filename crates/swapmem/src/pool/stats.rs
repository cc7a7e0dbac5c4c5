//! Statistics tracking for one size-class pool

use core::sync::atomic::{AtomicUsize, Ordering};

/// Live counters, updated by the pool as it works
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    /// Slots whose RAM level is occupied
    pub(crate) used: AtomicUsize,
    /// Slots currently held locked (by handles or by eviction/release)
    pub(crate) locked: AtomicUsize,
    /// Logical blocks currently resident on disk levels
    pub(crate) swapped: AtomicUsize,
    /// Disk levels the swap table has grown to
    pub(crate) swap_levels: AtomicUsize,
}

impl PoolStats {
    pub(crate) fn snapshot(&self, block_size: usize, num_blocks: usize) -> PoolStatSnapshot {
        PoolStatSnapshot {
            block_size,
            num_blocks,
            used: self.used.load(Ordering::Relaxed),
            locked: self.locked.load(Ordering::Relaxed),
            swapped: self.swapped.load(Ordering::Relaxed),
            swap_levels: self.swap_levels.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one pool's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatSnapshot {
    /// The pool's size class in bytes
    pub block_size: usize,
    /// Total slots in the pool
    pub num_blocks: usize,
    /// Slots whose RAM level is occupied
    pub used: usize,
    /// Slots currently locked
    pub locked: usize,
    /// Logical blocks resident on disk
    pub swapped: usize,
    /// Disk levels in the swap table
    pub swap_levels: usize,
}

impl PoolStatSnapshot {
    /// Bytes of pool RAM occupied by live blocks
    #[must_use]
    pub fn ram_used(&self) -> usize {
        self.used * self.block_size
    }

    /// Bytes of disk currently holding swapped blocks
    #[must_use]
    pub fn swap_used(&self) -> usize {
        self.swapped * self.block_size
    }
}
