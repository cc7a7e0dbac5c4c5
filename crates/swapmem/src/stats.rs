//! Aggregated statistics across all pools

use std::fmt;

use crate::pool::PoolStatSnapshot;
use crate::utils::format_bytes;

/// Snapshot of every pool plus the manager-level totals
///
/// Produced by [`MemoryManager::statistics`](crate::MemoryManager::statistics);
/// rendering it is a pure observation and never touches pool state.
#[derive(Debug, Clone)]
pub struct Statistics {
    /// One entry per size class, ascending
    pub pools: Vec<PoolStatSnapshot>,
    /// Total RAM committed across all pool buffers
    pub ram_limit: usize,
}

impl Statistics {
    /// Bytes of pool RAM occupied by live blocks
    #[must_use]
    pub fn ram_used(&self) -> usize {
        self.pools.iter().map(PoolStatSnapshot::ram_used).sum()
    }

    /// Bytes of disk occupied by swapped blocks
    #[must_use]
    pub fn swap_used(&self) -> usize {
        self.pools.iter().map(PoolStatSnapshot::swap_used).sum()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>10} | {:>6} | {:>6} | {:>6} | {:>7} | {:>11}",
            "block size", "slots", "used", "locked", "swapped", "swap levels"
        )?;
        writeln!(f, "{}", "-".repeat(62))?;
        for pool in &self.pools {
            writeln!(
                f,
                "{:>10} | {:>6} | {:>6} | {:>6} | {:>7} | {:>11}",
                pool.block_size,
                pool.num_blocks,
                pool.used,
                pool.locked,
                pool.swapped,
                pool.swap_levels
            )?;
        }
        writeln!(
            f,
            "RAM used:  {} of {}",
            format_bytes(self.ram_used()),
            format_bytes(self.ram_limit)
        )?;
        write!(f, "Swap used: {}", format_bytes(self.swap_used()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(block_size: usize, used: usize, swapped: usize) -> PoolStatSnapshot {
        PoolStatSnapshot {
            block_size,
            num_blocks: 4,
            used,
            locked: 0,
            swapped,
            swap_levels: 1,
        }
    }

    #[test]
    fn totals_sum_over_pools() {
        let stats = Statistics {
            pools: vec![snapshot(16, 2, 1), snapshot(32, 4, 3)],
            ram_limit: 4 * 48,
        };
        assert_eq!(stats.ram_used(), 2 * 16 + 4 * 32);
        assert_eq!(stats.swap_used(), 16 + 3 * 32);
    }

    #[test]
    fn renders_one_row_per_pool() {
        let stats = Statistics {
            pools: vec![snapshot(16, 2, 1), snapshot(32, 0, 0)],
            ram_limit: 192,
        };
        let rendered = stats.to_string();
        assert_eq!(rendered.lines().count(), 2 + 2 + 2);
        assert!(rendered.contains("RAM used:"));
        assert!(rendered.contains("Swap used: 16 B"));
    }
}
