//! One size-class pool: buffer, free list, slot locks, eviction queue
//!
//! # Safety
//!
//! The pool hands out raw access to regions of one contiguous buffer. The
//! discipline that makes this sound:
//! - the buffer lives in a `SyncUnsafeCell` and is only touched (a) through
//!   the swap table's RAM level under the swap mutex, or (b) through a handle
//!   that holds its slot lock;
//! - a locked slot cannot be chosen as an eviction victim (`acquire` waits on
//!   the slot lock), so the bytes a handle sees stay its own until unlock;
//! - free slots are tracked in a side array, never through the slot storage,
//!   so list maintenance does not alias user data.
//!
//! Lock order, outermost first: pool mutex → slot lock → swap mutex → level
//! I/O mutex. Release in reverse. `lock_slot` from a handle skips the pool
//! mutex, which lets locking proceed in parallel with unrelated acquires.

mod stats;

use std::cell::UnsafeCell;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

pub use stats::PoolStatSnapshot;
use stats::PoolStats;

use crate::block::MemoryBlock;
use crate::error::MemoryResult;
use crate::swap::{RAM_RESIDENT_ID, SwapTable};

/// Thread-safe wrapper for the pool buffer with interior mutability
#[repr(transparent)]
struct SyncUnsafeCell<T: ?Sized>(UnsafeCell<T>);

// SAFETY: SyncUnsafeCell<[u8]> is shared between threads even though
// UnsafeCell is not Sync.
// - Swap-table copies into the buffer are serialized by the swap mutex plus
//   the RAM level's copy guard.
// - A handle only reads/writes its slot while holding that slot's lock, and
//   the slot cannot be swapped out from under it (eviction waits on the same
//   lock).
// - Free-list state lives outside the buffer, so no access overlaps it.
unsafe impl<T: ?Sized> Sync for SyncUnsafeCell<T> {}

// SAFETY: repr(transparent) over UnsafeCell<T>; moving the box between
// threads moves plain bytes with no thread-local state.
unsafe impl<T: ?Sized + Send> Send for SyncUnsafeCell<T> {}

impl<T: ?Sized> SyncUnsafeCell<T> {
    fn get(&self) -> *mut T {
        self.0.get()
    }
}

/// Sentinel for "no next free slot"
const FREE_NONE: u32 = u32::MAX;

/// Intrusive-list replacement: `next[i]` chains free slots, head first
struct FreeList {
    head: u32,
    next: Vec<u32>,
}

impl FreeList {
    fn new(num_blocks: usize) -> Self {
        // Slot i links to i + 1; the last slot terminates the chain.
        let mut next: Vec<u32> = (1..=num_blocks as u32).collect();
        next[num_blocks - 1] = FREE_NONE;
        Self { head: 0, next }
    }

    fn pop(&mut self) -> Option<usize> {
        if self.head == FREE_NONE {
            return None;
        }
        let slot = self.head as usize;
        self.head = self.next[slot];
        self.next[slot] = FREE_NONE;
        Some(slot)
    }

    fn push(&mut self, slot: usize) {
        self.next[slot] = self.head;
        self.head = slot as u32;
    }
}

/// The allocator for one size class
pub struct Pool {
    num_blocks: usize,
    block_size: usize,

    /// Serializes acquire/release against each other ("pool mutex")
    free: Mutex<FreeList>,

    /// Slot lock state; waiters park on `slot_unlocked` ("slot mutex")
    slot_locked: Mutex<Vec<bool>>,
    slot_unlocked: Condvar,

    /// Id matrix and level data movement ("swap mutex")
    swap: Mutex<SwapTable>,

    /// FIFO of ever-touched slots; the head is the next eviction victim
    swap_queue: SegQueue<usize>,

    stats: PoolStats,

    /// Backing storage; declared last so the swap table (whose RAM level
    /// aliases it) drops first
    buffer: Box<SyncUnsafeCell<[u8]>>,
}

impl Pool {
    /// Build a pool of `num_blocks` slots of `block_size` bytes each, with
    /// one RAM level and one initial disk level under `swap_dir`
    pub(crate) fn new(
        num_blocks: usize,
        block_size: usize,
        swap_dir: &Path,
        max_swap_level: u8,
    ) -> MemoryResult<Self> {
        assert!(num_blocks > 0);
        assert!(block_size > 0);
        assert!(num_blocks < FREE_NONE as usize);

        let total = num_blocks * block_size;
        let boxed = vec![0u8; total].into_boxed_slice();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed).cast::<u8>();
        // SAFETY: SyncUnsafeCell is repr(transparent) over its inner type, so
        // a Box<[u8]> pointer round-trips as Box<SyncUnsafeCell<[u8]>> with
        // the same allocation and length.
        let buffer: Box<SyncUnsafeCell<[u8]>> = unsafe {
            Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len) as *mut SyncUnsafeCell<[u8]>)
        };

        let base = buffer.get().cast::<u8>();
        let table = SwapTable::new(
            base,
            num_blocks,
            block_size,
            swap_dir.to_path_buf(),
            max_swap_level,
        )?;

        let stats = PoolStats::default();
        stats
            .swap_levels
            .store(table.num_levels() - 1, Ordering::Relaxed);

        Ok(Self {
            num_blocks,
            block_size,
            free: Mutex::new(FreeList::new(num_blocks)),
            slot_locked: Mutex::new(vec![false; num_blocks]),
            slot_unlocked: Condvar::new(),
            swap: Mutex::new(table),
            swap_queue: SegQueue::new(),
            stats,
            buffer,
        })
    }

    /// The pool's size class in bytes
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total slots in the pool
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Point-in-time counters
    #[must_use]
    pub fn stats(&self) -> PoolStatSnapshot {
        self.stats.snapshot(self.block_size, self.num_blocks)
    }

    /// Raw address of a slot's RAM record
    pub(crate) fn slot_ptr(&self, slot: usize) -> *mut u8 {
        debug_assert!(slot < self.num_blocks);
        // SAFETY: in-bounds offset within the buffer allocation.
        unsafe { self.buffer.get().cast::<u8>().add(slot * self.block_size) }
    }

    /// Hand out a slot for a new logical block of `size` bytes
    ///
    /// Fast path: pop the free list, occupant id 1. Slow path: evict the
    /// FIFO victim's RAM tenant to disk and take over its slot. The returned
    /// handle is alive, unlocked, and its initial contents are undefined.
    pub(crate) fn acquire(pool: &Arc<Self>, size: usize) -> MemoryResult<MemoryBlock> {
        assert!(
            size <= pool.block_size,
            "request of {size} bytes routed to the {}-byte pool",
            pool.block_size
        );

        let mut free = pool.free.lock();

        if let Some(slot) = free.pop() {
            pool.swap.lock().mark_allocated(slot, RAM_RESIDENT_ID);
            pool.stats.used.fetch_add(1, Ordering::Relaxed);
            pool.swap_queue.push(slot);
            trace!(slot, size, block_size = pool.block_size, "fast-path acquire");
            return Ok(MemoryBlock::new(Arc::clone(pool), slot, RAM_RESIDENT_ID, size));
        }

        // Every slot is occupied: evict the queue head. The queue is fed on
        // every acquire, so it is only empty before the first one.
        let victim = pool.swap_queue.pop().unwrap_or(0);

        // Serialize against any handle currently holding this slot.
        pool.lock_slot(victim);
        let evicted = {
            let mut table = pool.swap.lock();
            match table.evict(victim) {
                Ok(id) => {
                    table.mark_allocated(victim, id);
                    pool.stats.swapped.fetch_add(1, Ordering::Relaxed);
                    pool.stats
                        .swap_levels
                        .store(table.num_levels() - 1, Ordering::Relaxed);
                    Ok(id)
                }
                Err(e) => Err(e),
            }
        };
        pool.unlock_slot(victim);
        pool.swap_queue.push(victim);

        let id = evicted?;
        trace!(slot = victim, id, size, block_size = pool.block_size, "evicting acquire");
        Ok(MemoryBlock::new(Arc::clone(pool), victim, id, size))
    }

    /// Give back the logical block `(slot, id)`
    ///
    /// A disk-resident block just clears its cell. The RAM occupant either
    /// yields the slot to the deepest swapped tenant (which is promoted) or,
    /// with nothing swapped, returns the slot to the free list.
    pub(crate) fn release(&self, slot: usize, id: u8) -> MemoryResult<()> {
        let mut free = self.free.lock();
        self.lock_slot(slot);

        let result = {
            let mut table = self.swap.lock();
            if !table.in_ram(slot, id) {
                table.mark_freed(slot, id);
                self.stats
                    .swapped
                    .fetch_sub(1, Ordering::Relaxed);
                Ok(())
            } else if table.has_swapped(slot) {
                table.mark_freed(slot, id);
                match table.return_tail_to_ram(slot) {
                    Ok(()) => {
                        self.stats.swapped.fetch_sub(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            } else {
                free.push(slot);
                table.mark_freed(slot, id);
                self.stats
                    .used
                    .fetch_sub(1, Ordering::Relaxed);
                Ok(())
            }
        };

        self.unlock_slot(slot);
        trace!(slot, id, block_size = self.block_size, "released block");
        result
    }

    /// Block until `slot` is unlocked, then lock it
    pub(crate) fn lock_slot(&self, slot: usize) {
        let mut locked = self.slot_locked.lock();
        while locked[slot] {
            self.slot_unlocked.wait(&mut locked);
        }
        locked[slot] = true;
        self.stats
            .locked
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Unlock `slot` and wake waiters
    ///
    /// Wakes every waiter: they share one condvar across all slots, so a
    /// single wakeup could land on a thread waiting for a different slot and
    /// strand the right one.
    pub(crate) fn unlock_slot(&self, slot: usize) {
        let mut locked = self.slot_locked.lock();
        debug_assert!(locked[slot], "unlock of an unlocked slot {slot}");
        locked[slot] = false;
        self.stats
            .locked
            .fetch_sub(1, Ordering::Relaxed);
        drop(locked);
        self.slot_unlocked.notify_all();
    }

    /// Bring `(slot, id)` into the RAM level (caller holds the slot lock)
    pub(crate) fn load_into_ram(&self, slot: usize, id: u8) -> MemoryResult<()> {
        self.swap.lock().load_into_ram(slot, id)
    }

    /// Is `(slot, id)` currently the RAM occupant?
    #[cfg(test)]
    fn in_ram(&self, slot: usize, id: u8) -> bool {
        self.swap.lock().in_ram(slot, id)
    }

    /// Walk the free chain and check it is acyclic, in bounds, and disjoint
    /// from occupied RAM cells
    #[cfg(test)]
    pub(crate) fn assert_free_list_well_formed(&self) {
        let free = self.free.lock();
        let table = self.swap.lock();
        let ram_ids = table.ram_ids();

        let mut visited = vec![false; self.num_blocks];
        let mut cursor = free.head;
        while cursor != FREE_NONE {
            let slot = cursor as usize;
            assert!(slot < self.num_blocks, "free slot {slot} out of bounds");
            assert!(!visited[slot], "cycle through free slot {slot}");
            visited[slot] = true;
            assert_eq!(
                ram_ids[slot], 0,
                "free slot {slot} still has a RAM occupant"
            );
            cursor = free.next[slot];
        }
        table.assert_ids_unique();
    }
}
