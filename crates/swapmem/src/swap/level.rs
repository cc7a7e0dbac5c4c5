//! One storage tier of a pool's swap table
//!
//! A level stores `num_blocks` fixed-length records of `block_size` bytes plus
//! a per-slot occupant id (`0` = vacant). Level 0 aliases the pool's RAM
//! buffer; every further level is a preallocated file under the swap
//! directory, created on construction and unlinked on drop.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::{MemoryError, MemoryResult};

/// Storage backend of one level
enum Backing {
    /// Aliases the owning pool's buffer; `copy_guard` serializes the memcpys
    Ram {
        base: *mut u8,
        copy_guard: Mutex<()>,
    },
    /// Fixed-size file of `num_blocks * block_size` bytes; the mutex
    /// serializes seek + read/write on the shared stream
    Disk { path: PathBuf, file: Mutex<File> },
}

/// One tier of block storage with its occupant-id vector
pub(crate) struct SwapLevel {
    num_blocks: usize,
    block_size: usize,
    ids: Vec<u8>,
    backing: Backing,
}

// SAFETY: the only non-Send/Sync field is the raw `base` pointer of the RAM
// backing. It aliases the owning pool's heap buffer, which outlives the level
// (the pool drops its swap table before the buffer), and all byte access goes
// through `read_block`/`write_block` under the level's copy guard, itself
// nested inside the pool's swap mutex. Ids are only mutated through `&mut
// self`, which the swap mutex makes exclusive.
unsafe impl Send for SwapLevel {}
unsafe impl Sync for SwapLevel {}

impl SwapLevel {
    /// Level 0: storage aliases the pool buffer starting at `base`
    pub(crate) fn ram(base: *mut u8, num_blocks: usize, block_size: usize) -> Self {
        Self {
            num_blocks,
            block_size,
            ids: vec![0; num_blocks],
            backing: Backing::Ram {
                base,
                copy_guard: Mutex::new(()),
            },
        }
    }

    /// Level `k >= 1`: storage is `<swap_dir>/swap_<N>x<B>_L<k>.bin`,
    /// created and resized to exactly `N * B` bytes
    pub(crate) fn disk(
        swap_dir: &Path,
        level: usize,
        num_blocks: usize,
        block_size: usize,
    ) -> MemoryResult<Self> {
        fs::create_dir_all(swap_dir).map_err(|e| MemoryError::swap_io(swap_dir, e))?;

        let path = swap_dir.join(format!("swap_{num_blocks}x{block_size}_L{level}.bin"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| MemoryError::swap_io(&path, e))?;
        file.set_len((num_blocks * block_size) as u64)
            .map_err(|e| MemoryError::swap_io(&path, e))?;

        trace!(path = %path.display(), "created swap level file");

        Ok(Self {
            num_blocks,
            block_size,
            ids: vec![0; num_blocks],
            backing: Backing::Disk {
                path,
                file: Mutex::new(file),
            },
        })
    }

    /// Copy the record at `slot` into `dst`
    pub(crate) fn read_block(&self, dst: &mut [u8], slot: usize) -> MemoryResult<()> {
        assert!(slot < self.num_blocks);
        assert_eq!(dst.len(), self.block_size);

        match &self.backing {
            Backing::Ram { base, copy_guard } => {
                let _guard = copy_guard.lock();
                // SAFETY: `base + slot * block_size` is in bounds of the pool
                // buffer (slot checked above) and the copy guard gives this
                // memcpy exclusive use of the record.
                unsafe {
                    let src = base.add(slot * self.block_size);
                    std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), self.block_size);
                }
                Ok(())
            }
            Backing::Disk { path, file } => {
                let mut file = file.lock();
                let pos = (slot * self.block_size) as u64;
                file.seek(SeekFrom::Start(pos))
                    .and_then(|_| file.read_exact(dst))
                    .map_err(|e| MemoryError::swap_io(path, e))
            }
        }
    }

    /// Copy `src` into the record at `slot`
    pub(crate) fn write_block(&self, src: &[u8], slot: usize) -> MemoryResult<()> {
        assert!(slot < self.num_blocks);
        assert_eq!(src.len(), self.block_size);

        match &self.backing {
            Backing::Ram { base, copy_guard } => {
                let _guard = copy_guard.lock();
                // SAFETY: same bounds and exclusivity argument as `read_block`.
                unsafe {
                    let dst = base.add(slot * self.block_size);
                    std::ptr::copy_nonoverlapping(src.as_ptr(), dst, self.block_size);
                }
                Ok(())
            }
            Backing::Disk { path, file } => {
                let mut file = file.lock();
                let pos = (slot * self.block_size) as u64;
                file.seek(SeekFrom::Start(pos))
                    .and_then(|_| file.write_all(src))
                    .map_err(|e| MemoryError::swap_io(path, e))
            }
        }
    }

    /// Occupant id at `slot` (`0` = vacant)
    pub(crate) fn id(&self, slot: usize) -> u8 {
        self.ids[slot]
    }

    pub(crate) fn set_id(&mut self, slot: usize, id: u8) {
        self.ids[slot] = id;
    }
}

impl Drop for SwapLevel {
    fn drop(&mut self) {
        if let Backing::Disk { path, .. } = &self.backing {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), %e, "failed to remove swap level file");
            }
        }
    }
}
