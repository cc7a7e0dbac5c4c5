//! Configuration for the memory manager and its pools

use std::path::PathBuf;

use crate::error::{MemoryError, MemoryResult};

/// Default size-class ladder, in bytes
pub const DEFAULT_BLOCK_SIZES: [usize; 9] = [16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Largest assignable occupant id, and the bound on swap levels per pool
///
/// Ids `0` (empty) and `1` (resident in RAM, never swapped) are reserved, so
/// at most `MAX_SWAP_LEVEL - 1` logical blocks can be live per slot.
pub const MAX_SWAP_LEVEL: u8 = 255;

/// Default directory holding swap level files
pub const DEFAULT_SWAP_DIR: &str = "./swap";

/// Configuration for a [`MemoryManager`](crate::MemoryManager)
///
/// Defaults: the 16..4096 size ladder, level files under `./swap`, and the
/// full 255-id space per slot.
///
/// # Example
/// ```
/// use swapmem::ManagerConfig;
///
/// let config = ManagerConfig::default()
///     .with_swap_dir("/tmp/my-swap")
///     .with_max_swap_level(4);
/// assert_eq!(config.pack_size(), 8176);
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Size classes, ascending; one pool is created per entry
    pub block_sizes: Vec<usize>,

    /// Directory where disk levels keep their backing files
    pub swap_dir: PathBuf,

    /// Largest occupant id handed out during eviction
    pub max_swap_level: u8,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            block_sizes: DEFAULT_BLOCK_SIZES.to_vec(),
            swap_dir: PathBuf::from(DEFAULT_SWAP_DIR),
            max_swap_level: MAX_SWAP_LEVEL,
        }
    }
}

impl ManagerConfig {
    /// Replace the size-class ladder
    #[must_use]
    pub fn with_block_sizes(mut self, sizes: impl Into<Vec<usize>>) -> Self {
        self.block_sizes = sizes.into();
        self
    }

    /// Replace the swap directory
    #[must_use]
    pub fn with_swap_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.swap_dir = dir.into();
        self
    }

    /// Replace the occupant id ceiling (useful to force `SlotExhausted` in tests)
    #[must_use]
    pub fn with_max_swap_level(mut self, max: u8) -> Self {
        self.max_swap_level = max;
        self
    }

    /// Sum of all block sizes; one "pack" is one block of every class
    #[must_use]
    pub fn pack_size(&self) -> usize {
        self.block_sizes.iter().sum()
    }

    /// Validate ladder shape and id space
    pub fn validate(&self) -> MemoryResult<()> {
        if self.block_sizes.is_empty() {
            return Err(MemoryError::invalid_config("block size ladder is empty"));
        }
        if self.block_sizes.iter().any(|&s| s == 0) {
            return Err(MemoryError::invalid_config("block size of 0 bytes"));
        }
        if !self.block_sizes.is_sorted() {
            return Err(MemoryError::invalid_config(
                "block sizes must be sorted ascending",
            ));
        }
        if self.block_sizes.windows(2).any(|w| w[0] == w[1]) {
            return Err(MemoryError::invalid_config("duplicate block size"));
        }
        // Ids 0 and 1 are reserved; eviction draws from 2..=max_swap_level.
        if self.max_swap_level < 2 {
            return Err(MemoryError::invalid_config(
                "max_swap_level must be at least 2",
            ));
        }
        Ok(())
    }
}
