//! # swapmem
//!
//! Size-classed memory pools with multi-level disk swap.
//!
//! A [`MemoryManager`] owns one fixed-capacity pool per block size. `get`
//! routes a request to the smallest class that fits and returns a
//! [`MemoryBlock`] handle. When a pool runs out of physical slots, the
//! least-recently-touched slot's tenant is evicted to a disk-backed swap
//! level; locking the evicted block's handle later swaps its bytes back in
//! transparently.
//!
//! ```no_run
//! use swapmem::MemoryManager;
//!
//! MemoryManager::init(64 * 1024 * 1024)?;
//! let manager = MemoryManager::global()?;
//!
//! let mut block = manager.get(300)?;      // smallest fitting class: 512
//! block.access(|data| data.fill(0xAB))?;  // lock, write, unlock
//! block.free()?;
//! # Ok::<(), swapmem::MemoryError>(())
//! ```
//!
//! Handles are move-only and freed explicitly; every pool keeps its own
//! free list, slot locks, and swap table, so clients on different slots
//! proceed in parallel.

#![allow(unsafe_code)]

pub mod config;
pub mod error;
pub mod stats;
pub mod utils;

mod block;
mod manager;
mod pool;
mod swap;

pub use block::MemoryBlock;
pub use config::{DEFAULT_BLOCK_SIZES, MAX_SWAP_LEVEL, ManagerConfig};
pub use error::{MemoryError, MemoryResult};
pub use manager::MemoryManager;
pub use pool::PoolStatSnapshot;
pub use stats::Statistics;
