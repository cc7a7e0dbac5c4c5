//! The process-wide allocator facade
//!
//! A [`MemoryManager`] owns one [`Pool`] per size class and routes each
//! request to the smallest class that fits. Construct private instances
//! freely (tests do); the process singleton is a thin layer on top with an
//! explicit, non-idempotent [`MemoryManager::init`].

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::info;

use crate::block::MemoryBlock;
use crate::config::ManagerConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::pool::Pool;
use crate::stats::Statistics;

static GLOBAL: OnceCell<MemoryManager> = OnceCell::new();
// Serializes init against concurrent init; gets go straight to the OnceCell.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Size-classed allocator: a pool per block size, eviction to disk when full
pub struct MemoryManager {
    /// Keyed by block size; `range(size..)` finds the smallest fitting class
    pools: BTreeMap<usize, Arc<Pool>>,
    ram_limit: usize,
    config: ManagerConfig,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("ram_limit", &self.ram_limit)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemoryManager {
    /// Build a private manager with the default configuration
    ///
    /// `budget` is divided by the pack size (the sum of all block sizes) to
    /// get the slot count `N` shared by every pool, committing at most
    /// `budget` bytes of RAM.
    pub fn new(budget: usize) -> MemoryResult<Self> {
        Self::with_config(budget, ManagerConfig::default())
    }

    /// Build a private manager with a custom configuration
    pub fn with_config(budget: usize, config: ManagerConfig) -> MemoryResult<Self> {
        config.validate()?;

        let pack_size = config.pack_size();
        let num_blocks = budget / pack_size;
        if num_blocks == 0 {
            return Err(MemoryError::budget_too_small(budget, pack_size));
        }

        let mut pools = BTreeMap::new();
        for &block_size in &config.block_sizes {
            let pool = Pool::new(
                num_blocks,
                block_size,
                &config.swap_dir,
                config.max_swap_level,
            )?;
            pools.insert(block_size, Arc::new(pool));
        }

        info!(
            budget,
            pack_size,
            blocks_per_pool = num_blocks,
            swap_dir = %config.swap_dir.display(),
            "memory manager ready"
        );

        Ok(Self {
            pools,
            ram_limit: num_blocks * pack_size,
            config,
        })
    }

    /// Initialize the process-wide manager; errors on the second call
    pub fn init(budget: usize) -> MemoryResult<()> {
        Self::init_with_config(budget, ManagerConfig::default())
    }

    /// Initialize the process-wide manager with a custom configuration
    pub fn init_with_config(budget: usize, config: ManagerConfig) -> MemoryResult<()> {
        let _guard = INIT_LOCK.lock();
        if GLOBAL.get().is_some() {
            return Err(MemoryError::AlreadyInitialized);
        }
        let manager = Self::with_config(budget, config)?;
        // Cannot race: the init lock is held and the cell was empty.
        let _ = GLOBAL.set(manager);
        Ok(())
    }

    /// The process-wide manager; errors before [`init`](Self::init)
    pub fn global() -> MemoryResult<&'static Self> {
        GLOBAL.get().ok_or(MemoryError::NotInitialized)
    }

    /// Allocate a block of at least `size` bytes from the smallest fitting class
    pub fn get(&self, size: usize) -> MemoryResult<MemoryBlock> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }
        let Some((_, pool)) = self.pools.range(size..).next() else {
            return Err(MemoryError::too_large(size, self.max_block_size()));
        };
        Pool::acquire(pool, size)
    }

    /// The largest configured block size
    #[must_use]
    pub fn max_block_size(&self) -> usize {
        *self.pools.keys().next_back().expect("ladder is non-empty")
    }

    /// Total RAM committed across all pool buffers
    #[must_use]
    pub fn ram_limit(&self) -> usize {
        self.ram_limit
    }

    /// The configuration this manager was built with
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Snapshot all pool counters and manager totals
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        Statistics {
            pools: self.pools.values().map(|p| p.stats()).collect(),
            ram_limit: self.ram_limit,
        }
    }

    /// Render the statistics table to standard output
    pub fn print_statistics(&self) {
        println!("{}", self.statistics());
    }
}
