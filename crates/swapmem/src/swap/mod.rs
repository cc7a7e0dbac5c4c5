//! Multi-level swap: storage tiers and the per-pool table over them

mod level;
mod table;

pub(crate) use table::{RAM_RESIDENT_ID, SwapTable};
