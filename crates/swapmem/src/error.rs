//! Error types for swapmem
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. Environmental
//! failures (I/O, budget, id exhaustion) surface as `MemoryError`; violations
//! of internal invariants (free-list shape, id uniqueness, swap-table
//! consistency) are programmer errors and panic with context instead.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, warn};

// ============================================================================
// Main Error Type
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MemoryError {
    // --- Lifecycle Errors ---
    #[error("memory manager is not initialized; call MemoryManager::init first")]
    NotInitialized,

    #[error("memory manager is already initialized")]
    AlreadyInitialized,

    // --- Request Errors ---
    #[error("requested {requested} bytes exceeds the largest block size ({max})")]
    TooLarge { requested: usize, max: usize },

    #[error("requested block size must be at least 1 byte")]
    InvalidSize,

    // --- Configuration Errors ---
    #[error("memory budget of {budget} bytes cannot fit one block of each class ({required} bytes required)")]
    BudgetTooSmall { budget: usize, required: usize },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Swap Errors ---
    #[error("swap I/O failed on {}: {source}", path.display())]
    SwapIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free occupant id left for slot {slot} of the {block_size}-byte pool")]
    SlotExhausted { block_size: usize, slot: usize },
}

impl MemoryError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "MEM:LIFECYCLE:UNINIT",
            Self::AlreadyInitialized => "MEM:LIFECYCLE:REINIT",
            Self::TooLarge { .. } => "MEM:REQUEST:TOO_LARGE",
            Self::InvalidSize => "MEM:REQUEST:INVALID_SIZE",
            Self::BudgetTooSmall { .. } => "MEM:CONFIG:BUDGET",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::SwapIo { .. } => "MEM:SWAP:IO",
            Self::SlotExhausted { .. } => "MEM:SWAP:SLOT_EXHAUSTED",
        }
    }

    /// Check if error is retryable
    ///
    /// `SlotExhausted` clears once any tenant of the slot is freed; everything
    /// else is a hard failure for the issuing call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SlotExhausted { .. })
    }

    // ------------------------------------------------------------------------
    // Convenience Constructors
    // ------------------------------------------------------------------------

    /// Create a too-large request error
    #[must_use]
    pub fn too_large(requested: usize, max: usize) -> Self {
        Self::TooLarge { requested, max }
    }

    /// Create a budget-too-small error
    #[must_use]
    pub fn budget_too_small(budget: usize, required: usize) -> Self {
        Self::BudgetTooSmall { budget, required }
    }

    /// Create an invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a swap I/O error with the offending path attached
    pub fn swap_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        error!(path = %path.display(), %source, "swap level I/O failed");
        Self::SwapIo { path, source }
    }

    /// Create a slot-exhausted error
    #[must_use]
    pub fn slot_exhausted(block_size: usize, slot: usize) -> Self {
        warn!(block_size, slot, "occupant ids exhausted during eviction");
        Self::SlotExhausted { block_size, slot }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = MemoryError::too_large(10_000, 4096);
        assert!(err.to_string().contains("10000"));
        assert!(err.to_string().contains("4096"));

        let err = MemoryError::slot_exhausted(16, 3);
        assert!(err.to_string().contains("slot 3"));
        assert!(err.to_string().contains("16-byte"));
    }

    #[test]
    fn error_codes() {
        assert_eq!(MemoryError::NotInitialized.code(), "MEM:LIFECYCLE:UNINIT");
        assert_eq!(
            MemoryError::budget_too_small(100, 8176).code(),
            "MEM:CONFIG:BUDGET"
        );
        assert_eq!(
            MemoryError::slot_exhausted(16, 0).code(),
            "MEM:SWAP:SLOT_EXHAUSTED"
        );
    }

    #[test]
    fn retryable() {
        assert!(MemoryError::slot_exhausted(16, 0).is_retryable());
        assert!(!MemoryError::too_large(1, 0).is_retryable());
        assert!(!MemoryError::NotInitialized.is_retryable());
    }

    #[test]
    fn swap_io_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = MemoryError::swap_io("/tmp/swap_1x16_L1.bin", io);
        assert!(err.to_string().contains("swap_1x16_L1.bin"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
