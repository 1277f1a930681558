use crate::PageTableLevel;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("page-table pool exhausted after {capacity} pages")]
    Exhausted { capacity: u64 },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The walk for `va` hit a non-present entry at `level`.
    #[error("{va} is not mapped (missing {level} entry)")]
    NotMapped {
        va: VirtualAddress,
        level: PageTableLevel,
    },

    /// The walk for `va` hit a large-page leaf at `level`.
    #[error("{va} is covered by a large page at {level}")]
    LargePage {
        va: VirtualAddress,
        level: PageTableLevel,
    },

    /// A non-leaf entry points at a table outside the pool.
    #[error("{va} walks through table {address} which is not owned by the pool")]
    ForeignTable {
        va: VirtualAddress,
        address: PhysicalAddress,
    },

    #[error("virtual window exhausted: {requested} pages requested, {remaining} remaining")]
    WindowExhausted { requested: u64, remaining: u64 },
}
