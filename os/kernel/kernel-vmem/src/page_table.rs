//! # Page Tables
//!
//! One 4 KiB table of 512 entries serves every level; the level only decides
//! which slice of the virtual address selects the entry.

use crate::PageEntryBits;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

/// Entries per table at every level.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Paging level, from the root down.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PageTableLevel {
    /// Page Map Level 4 (root, VA bits 47..39).
    Pml4,
    /// Page Directory Pointer Table (VA bits 38..30).
    Pdpt,
    /// Page Directory (VA bits 29..21).
    Pd,
    /// Page Table (leaf, VA bits 20..12).
    Pt,
}

impl PageTableLevel {
    /// Levels holding links to further tables, in walk order.
    pub const NON_LEAF: [Self; 3] = [Self::Pml4, Self::Pdpt, Self::Pd];

    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }
}

impl fmt::Display for PageTableLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pml4 => "PML4",
            Self::Pdpt => "PDPT",
            Self::Pd => "PD",
            Self::Pt => "PT",
        })
    }
}

/// Index of an entry within a table. Always in `0..512`.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// The entry `va` selects at `level`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of(va: VirtualAddress, level: PageTableLevel) -> Self {
        Self(((va.as_u64() >> level.shift()) & 0x1FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A 4 KiB-aligned table of 512 entries.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    /// Mark every entry non-present.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntryBits::new());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, index: TableIndex) -> PageEntryBits {
        self.entries[index.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, index: TableIndex, entry: PageEntryBits) {
        self.entries[index.as_usize()] = entry;
    }

    #[inline]
    pub const fn entry_mut(&mut self, index: TableIndex) -> &mut PageEntryBits {
        &mut self.entries[index.as_usize()]
    }
}
