//! Per-pool swap table: which logical block lives at which level of each slot
//!
//! The table is an ordered stack of [`SwapLevel`]s. Level 0 is RAM; levels
//! `1..` are disk files, appended on demand up to `max_swap_level + 1` in
//! total. Per slot, the non-zero ids across all levels form a set — the
//! caller serializes every call through the pool's swap mutex.

use std::path::PathBuf;

use tracing::trace;

use super::level::SwapLevel;
use crate::error::{MemoryError, MemoryResult};

/// Id marking a vacant (slot, level) cell
pub(crate) const EMPTY_ID: u8 = 0;

/// Id of a block allocated straight into RAM and never evicted since
pub(crate) const RAM_RESIDENT_ID: u8 = 1;

/// Index of the RAM level
const RAM: usize = 0;

pub(crate) struct SwapTable {
    num_blocks: usize,
    block_size: usize,
    swap_dir: PathBuf,
    max_swap_level: u8,
    /// `levels[0]` is RAM; the stack only ever grows
    levels: Vec<SwapLevel>,
}

impl SwapTable {
    /// Build a table with the RAM level aliasing `base` and one initial disk level
    pub(crate) fn new(
        base: *mut u8,
        num_blocks: usize,
        block_size: usize,
        swap_dir: PathBuf,
        max_swap_level: u8,
    ) -> MemoryResult<Self> {
        let levels = vec![
            SwapLevel::ram(base, num_blocks, block_size),
            SwapLevel::disk(&swap_dir, 1, num_blocks, block_size)?,
        ];
        Ok(Self {
            num_blocks,
            block_size,
            swap_dir,
            max_swap_level,
            levels,
        })
    }

    /// Number of levels, RAM included
    pub(crate) fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Record `id` as the new RAM occupant of `slot`
    ///
    /// The acquire protocol guarantees the RAM cell is vacant: the slot
    /// either came off the free list or was just evicted.
    pub(crate) fn mark_allocated(&mut self, slot: usize, id: u8) {
        debug_assert_eq!(self.levels[RAM].id(slot), EMPTY_ID);
        self.levels[RAM].set_id(slot, id);
    }

    /// Clear the cell currently holding `(slot, id)`, whichever level it is on
    pub(crate) fn mark_freed(&mut self, slot: usize, id: u8) {
        let level = self
            .level_of(slot, id)
            .unwrap_or_else(|| panic!("mark_freed: id {id} not present at slot {slot}"));
        self.levels[level].set_id(slot, EMPTY_ID);
    }

    /// Level currently holding `(slot, id)`, RAM included
    fn level_of(&self, slot: usize, id: u8) -> Option<usize> {
        debug_assert_ne!(id, EMPTY_ID);
        (0..self.levels.len()).find(|&k| self.levels[k].id(slot) == id)
    }

    /// First disk level whose cell at `slot` is vacant
    fn find_empty_level(&self, slot: usize) -> Option<usize> {
        (1..self.levels.len()).find(|&k| self.levels[k].id(slot) == EMPTY_ID)
    }

    /// Largest level with a non-zero id at `slot` (0 when nothing is swapped)
    fn find_tail_level(&self, slot: usize) -> usize {
        (1..self.levels.len())
            .rev()
            .find(|&k| self.levels[k].id(slot) != EMPTY_ID)
            .unwrap_or(RAM)
    }

    /// Does `(slot, id)` currently occupy the RAM level?
    pub(crate) fn in_ram(&self, slot: usize, id: u8) -> bool {
        self.levels[RAM].id(slot) == id
    }

    /// Does any disk level hold a tenant for `slot`?
    pub(crate) fn has_swapped(&self, slot: usize) -> bool {
        (1..self.levels.len()).any(|k| self.levels[k].id(slot) != EMPTY_ID)
    }

    /// Three-way byte swap between RAM and disk level `k` at `slot`,
    /// then exchange the two ids
    ///
    /// On the eviction path `k` is a vacant cell: RAM receives its (unset)
    /// bytes and id 0, which the caller overwrites via `mark_allocated`.
    fn swap(&mut self, slot: usize, k: usize) -> MemoryResult<()> {
        debug_assert!(k > RAM);

        let mut disk_bytes = vec![0u8; self.block_size];
        let mut ram_bytes = vec![0u8; self.block_size];
        self.levels[k].read_block(&mut disk_bytes, slot)?;
        self.levels[RAM].read_block(&mut ram_bytes, slot)?;
        self.levels[k].write_block(&ram_bytes, slot)?;
        self.levels[RAM].write_block(&disk_bytes, slot)?;

        let ram_id = self.levels[RAM].id(slot);
        let disk_id = self.levels[k].id(slot);
        self.levels[RAM].set_id(slot, disk_id);
        self.levels[k].set_id(slot, ram_id);

        trace!(slot, level = k, ram_id, disk_id, "swapped records");
        Ok(())
    }

    /// Ensure `(slot, id)` occupies the RAM level, swapping it up if needed
    pub(crate) fn load_into_ram(&mut self, slot: usize, id: u8) -> MemoryResult<()> {
        if self.in_ram(slot, id) {
            return Ok(());
        }
        let k = self
            .level_of(slot, id)
            .unwrap_or_else(|| panic!("load_into_ram: id {id} not present at slot {slot}"));
        self.swap(slot, k)
    }

    /// Push the RAM occupant of `slot` down to a disk level and return a
    /// fresh occupant id for the caller about to take over the RAM cell
    ///
    /// The returned id differs from every id currently live at `slot` on any
    /// level, the one just evicted included. Ids are scanned descending from
    /// `max_swap_level` so reuse after frees is deterministic.
    pub(crate) fn evict(&mut self, slot: usize) -> MemoryResult<u8> {
        debug_assert_ne!(self.levels[RAM].id(slot), EMPTY_ID);

        // Pick the id first: on exhaustion nothing must move.
        let new_id = (2..=self.max_swap_level)
            .rev()
            .find(|&id| self.level_of(slot, id).is_none())
            .ok_or_else(|| MemoryError::slot_exhausted(self.block_size, slot))?;

        let k = match self.find_empty_level(slot) {
            Some(k) => k,
            None => self.grow(slot)?,
        };
        self.swap(slot, k)?;
        Ok(new_id)
    }

    /// Append a new disk level and return its index
    fn grow(&mut self, slot: usize) -> MemoryResult<usize> {
        let next = self.levels.len();
        if next > self.max_swap_level as usize {
            // Unreachable when an unused id exists, kept as a hard stop.
            return Err(MemoryError::slot_exhausted(self.block_size, slot));
        }
        self.levels.push(SwapLevel::disk(
            &self.swap_dir,
            next,
            self.num_blocks,
            self.block_size,
        )?);
        trace!(level = next, block_size = self.block_size, "grew swap table");
        Ok(next)
    }

    /// Promote the deepest swapped tenant of `slot` into the (just freed)
    /// RAM cell; its disk cell becomes vacant
    pub(crate) fn return_tail_to_ram(&mut self, slot: usize) -> MemoryResult<()> {
        let tail = self.find_tail_level(slot);
        debug_assert!(tail > RAM, "return_tail_to_ram: nothing swapped at {slot}");

        let mut bytes = vec![0u8; self.block_size];
        self.levels[tail].read_block(&mut bytes, slot)?;
        self.levels[RAM].write_block(&bytes, slot)?;

        let id = self.levels[tail].id(slot);
        self.levels[RAM].set_id(slot, id);
        self.levels[tail].set_id(slot, EMPTY_ID);
        Ok(())
    }

    /// Panic unless the non-zero ids at every slot form a set
    #[cfg(test)]
    pub(crate) fn assert_ids_unique(&self) {
        for slot in 0..self.num_blocks {
            let mut seen = [false; 256];
            for level in &self.levels {
                let id = level.id(slot);
                if id != EMPTY_ID {
                    assert!(!seen[id as usize], "duplicate id {id} at slot {slot}");
                    seen[id as usize] = true;
                }
            }
        }
    }

    /// RAM occupant ids, one per slot (test observability)
    #[cfg(test)]
    pub(crate) fn ram_ids(&self) -> Vec<u8> {
        (0..self.num_blocks).map(|s| self.levels[RAM].id(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_buffer(
        num_blocks: usize,
        block_size: usize,
        max: u8,
    ) -> (Vec<u8>, tempfile::TempDir, SwapTable) {
        let mut buffer = vec![0u8; num_blocks * block_size];
        let dir = tempfile::tempdir().unwrap();
        let table = SwapTable::new(
            buffer.as_mut_ptr(),
            num_blocks,
            block_size,
            dir.path().to_path_buf(),
            max,
        )
        .unwrap();
        (buffer, dir, table)
    }

    #[test]
    fn evict_assigns_descending_ids() {
        let (_buf, _dir, mut table) = table_with_buffer(1, 16, 255);

        table.mark_allocated(0, RAM_RESIDENT_ID);
        let a = table.evict(0).unwrap();
        table.mark_allocated(0, a);
        let b = table.evict(0).unwrap();
        table.mark_allocated(0, b);

        assert_eq!(a, 255);
        assert_eq!(b, 254);
        table.assert_ids_unique();
    }

    #[test]
    fn evict_reuses_freed_ids() {
        let (_buf, _dir, mut table) = table_with_buffer(1, 16, 255);

        table.mark_allocated(0, RAM_RESIDENT_ID);
        let a = table.evict(0).unwrap();
        table.mark_allocated(0, a);
        assert_eq!(a, 255);
        let b = table.evict(0).unwrap();
        table.mark_allocated(0, b);
        assert_eq!(b, 254);

        // Free the disk tenant holding 255; the descending scan hands the
        // id out again on the next eviction.
        table.mark_freed(0, 255);
        let c = table.evict(0).unwrap();
        assert_eq!(c, 255, "freed id comes back first");
        table.mark_allocated(0, c);
        table.assert_ids_unique();
    }

    #[test]
    fn evict_exhausts_ids() {
        let (_buf, _dir, mut table) = table_with_buffer(1, 16, 4);

        table.mark_allocated(0, RAM_RESIDENT_ID);
        for expected in [4, 3, 2] {
            let id = table.evict(0).unwrap();
            assert_eq!(id, expected);
            table.mark_allocated(0, id);
        }
        let err = table.evict(0).unwrap_err();
        assert!(matches!(err, MemoryError::SlotExhausted { slot: 0, .. }));
        // Nothing moved on the failure path.
        assert_eq!(table.levels[RAM].id(0), 2);
    }

    #[test]
    fn load_into_ram_round_trips_bytes() {
        let (buf, _dir, mut table) = table_with_buffer(1, 4, 255);

        table.mark_allocated(0, RAM_RESIDENT_ID);
        table.levels[RAM].write_block(&[0xAA; 4], 0).unwrap();

        let id = table.evict(0).unwrap();
        table.mark_allocated(0, id);
        table.levels[RAM].write_block(&[0xBB; 4], 0).unwrap();

        // 0xAA went to disk; bring it back and the new tenant goes down.
        table.load_into_ram(0, RAM_RESIDENT_ID).unwrap();
        assert_eq!(&buf[..4], &[0xAA; 4]);
        assert!(table.in_ram(0, RAM_RESIDENT_ID));
        assert!(table.has_swapped(0));

        // Already resident: no-op.
        table.load_into_ram(0, RAM_RESIDENT_ID).unwrap();
        assert_eq!(&buf[..4], &[0xAA; 4]);
        table.assert_ids_unique();
    }

    #[test]
    fn return_tail_promotes_deepest_tenant() {
        let (buf, _dir, mut table) = table_with_buffer(1, 4, 255);

        table.mark_allocated(0, RAM_RESIDENT_ID);
        table.levels[RAM].write_block(&[0x0A; 4], 0).unwrap();
        let b = table.evict(0).unwrap();
        table.mark_allocated(0, b);
        table.levels[RAM].write_block(&[0x0B; 4], 0).unwrap();
        let c = table.evict(0).unwrap();
        table.mark_allocated(0, c);
        table.levels[RAM].write_block(&[0x0C; 4], 0).unwrap();
        assert_eq!(table.num_levels(), 3);

        // Free the RAM tenant `c`; the deepest swapped block moves up.
        table.mark_freed(0, c);
        table.return_tail_to_ram(0).unwrap();
        assert_eq!(table.levels[RAM].id(0), b);
        assert_eq!(&buf[..4], &[0x0B; 4]);
        assert!(table.has_swapped(0), "the first tenant is still on disk");
        table.assert_ids_unique();
    }

    #[test]
    fn grows_one_disk_level_per_full_stack() {
        let (_buf, _dir, mut table) = table_with_buffer(2, 8, 255);
        assert_eq!(table.num_levels(), 2);

        table.mark_allocated(0, RAM_RESIDENT_ID);
        let a = table.evict(0).unwrap(); // uses the initial disk level
        table.mark_allocated(0, a);
        assert_eq!(table.num_levels(), 2);

        let b = table.evict(0).unwrap(); // needs a fresh level
        table.mark_allocated(0, b);
        assert_eq!(table.num_levels(), 3);

        // Slot 1 still has the initial level free.
        table.mark_allocated(1, RAM_RESIDENT_ID);
        table.evict(1).unwrap();
        assert_eq!(table.num_levels(), 3);
    }
}
