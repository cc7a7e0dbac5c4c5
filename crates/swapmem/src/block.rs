//! User-facing capability for one logical block
//!
//! A [`MemoryBlock`] is move-only: ownership transfers the usual Rust way, so
//! use-after-move and double-free are compile errors rather than the runtime
//! tombstone checks the design calls for in less strict languages. `free`
//! consumes the handle; dropping a live handle frees it implicitly with a
//! warning.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::MemoryResult;
use crate::pool::Pool;

/// Handle to one logical block inside a pool
///
/// While locked, the block's bytes are resident in the pool's RAM buffer and
/// exclusively owned by this handle. Locking a swapped block triggers the
/// round-trip swap that restores its contents first.
///
/// # Example
/// ```no_run
/// use swapmem::MemoryManager;
///
/// let manager = MemoryManager::new(1 << 20)?;
/// let mut block = manager.get(100)?;
/// block.access(|data| data.fill(0x2A))?;
/// block.free()?;
/// # Ok::<(), swapmem::MemoryError>(())
/// ```
pub struct MemoryBlock {
    pool: Arc<Pool>,
    slot: usize,
    id: u8,
    size: usize,
    locked: bool,
    freed: bool,
}

impl MemoryBlock {
    pub(crate) fn new(pool: Arc<Pool>, slot: usize, id: u8, size: usize) -> Self {
        Self {
            pool,
            slot,
            id,
            size,
            locked: false,
            freed: false,
        }
    }

    /// Bytes requested at allocation; `data()` exposes exactly this many
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// The slot's full capacity (the pool's size class)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.block_size()
    }

    /// Is the block currently locked by this handle?
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[cfg(test)]
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    #[cfg(test)]
    pub(crate) fn occupant_id(&self) -> u8 {
        self.id
    }

    /// Pin the block's bytes into RAM and take exclusive access
    ///
    /// Blocks until the slot is free of other holders, then swaps the block
    /// up from disk if it was evicted. Locking an already locked block is a
    /// no-op.
    pub fn lock(&mut self) -> MemoryResult<()> {
        if self.locked {
            debug!(slot = self.slot, id = self.id, "lock() called on a locked block");
            return Ok(());
        }
        self.pool.lock_slot(self.slot);
        if let Err(e) = self.pool.load_into_ram(self.slot, self.id) {
            self.pool.unlock_slot(self.slot);
            return Err(e);
        }
        self.locked = true;
        Ok(())
    }

    /// Release exclusive access; the block becomes evictable again
    ///
    /// Unlocking an unlocked block is a no-op.
    pub fn unlock(&mut self) {
        if !self.locked {
            debug!(slot = self.slot, id = self.id, "unlock() called on an unlocked block");
            return;
        }
        self.pool.unlock_slot(self.slot);
        self.locked = false;
    }

    /// The block's bytes; only valid while locked
    ///
    /// # Panics
    /// Panics if the block is not locked.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        assert!(self.locked, "data() on an unlocked block");
        // SAFETY: the slot lock held by this handle gives it exclusive use of
        // the record; `size <= capacity` by construction.
        unsafe { std::slice::from_raw_parts(self.pool.slot_ptr(self.slot), self.size) }
    }

    /// The block's bytes, writable; only valid while locked
    ///
    /// # Panics
    /// Panics if the block is not locked.
    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8] {
        assert!(self.locked, "data_mut() on an unlocked block");
        // SAFETY: as `data()`, plus `&mut self` makes this the only slice.
        unsafe { std::slice::from_raw_parts_mut(self.pool.slot_ptr(self.slot), self.size) }
    }

    /// Run `f` over the block's bytes, locking around the call if needed
    ///
    /// If this call acquired the lock it releases it on every exit path,
    /// including a panic in `f`. A block locked before the call stays locked.
    pub fn access<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> MemoryResult<R> {
        let acquired = !self.locked;
        if acquired {
            self.lock()?;
        }

        let ptr = self.pool.slot_ptr(self.slot);
        let len = self.size;

        struct UnlockOnDrop<'a>(&'a mut MemoryBlock, bool);
        impl Drop for UnlockOnDrop<'_> {
            fn drop(&mut self) {
                if self.1 {
                    self.0.unlock();
                }
            }
        }
        let guard = UnlockOnDrop(self, acquired);

        // SAFETY: the slot lock is held for the whole closure call; the raw
        // slice does not outlive the guard below.
        let data = unsafe { std::slice::from_raw_parts_mut(ptr, len) };
        let result = f(data);
        drop(guard);
        Ok(result)
    }

    /// Give the block back to its pool, consuming the handle
    ///
    /// A locked block is unlocked first. Freeing may touch disk when the
    /// deepest swapped tenant of the slot gets promoted into RAM.
    pub fn free(mut self) -> MemoryResult<()> {
        self.release_now()
    }

    fn release_now(&mut self) -> MemoryResult<()> {
        if self.freed {
            return Ok(());
        }
        self.freed = true;
        if self.locked {
            self.pool.unlock_slot(self.slot);
            self.locked = false;
        }
        self.pool.release(self.slot, self.id)
    }
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        if !self.freed {
            warn!(
                slot = self.slot,
                id = self.id,
                size = self.size,
                "block dropped without an explicit free()"
            );
            if let Err(e) = self.release_now() {
                warn!(%e, "implicit free failed");
            }
        }
    }
}

impl std::fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("slot", &self.slot)
            .field("id", &self.id)
            .field("size", &self.size)
            .field("capacity", &self.capacity())
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}
