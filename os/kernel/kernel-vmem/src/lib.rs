//! # Kernel Address-Space Construction
//!
//! Builds the kernel's own x86-64 4-level page tables during bring-up.
//!
//! ## Pieces
//! - [`PagePool`]: a bump allocator over the physical page range the loader
//!   reserved for page tables. Every page is zeroed before it becomes a table.
//! - [`AddressSpace`]: inserts 4 KiB mappings, walking and creating the
//!   intermediate levels on demand, and hands out leaf entries for later
//!   permission edits.
//! - [`ArchBackend`]: the two hardware side effects the builder needs (root
//!   activation and single-page translation invalidation).
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! Each field indexes a 512-entry table. Only 4 KiB leaves are created here;
//! a large-page entry encountered during a walk is reported as an error.
//!
//! ## Table nodes are pool indices
//!
//! A table node is named by its index in the pool ([`TableNode`]), never by a
//! raw pointer. Following a non-leaf entry translates its physical address
//! back into a node; an address outside the pool is rejected instead of being
//! dereferenced.
//!
//! ## Ordering
//!
//! Table nodes are written through the pool's [`PhysMapper`]. In the kernel
//! that mapper addresses the pool through a fixed virtual window, so the pool
//! must be mapped into the new hierarchy at that same window before the new
//! root goes live. The pool therefore starts out [`Unmapped`]; the only way to
//! obtain an [`AddressSpace`] (and with it [`PagePool::allocate_physical`],
//! which is only available on a [`Writable`] pool) is
//! [`AddressSpace::bootstrap`], which performs that self-mapping first.
//!
//! ```rust,ignore
//! # use kernel_memory_addresses::*;
//! # use kernel_vmem::*;
//! # use kernel_vmem::testing::{FrameArena, RecordingBackend};
//! let arena = FrameArena::new(PhysicalAddress::new(0x0020_0000), 32);
//! let pool = PagePool::new(&arena, arena.base(), 32).unwrap();
//! let window = VirtualRegion::new(0xFFFF_FF00_0000_0000, 32);
//! let mut space = AddressSpace::bootstrap(pool, window).unwrap();
//!
//! let va = VirtualAddress::new(0xFFFF_FF20_0000_0000);
//! space.map_pages(va, PhysicalAddress::new(0xFED0_0000), 1, PageEntryBits::device()).unwrap();
//! assert_eq!(space.translate(va + 0x10), Some(PhysicalAddress::new(0xFED0_0010)));
//!
//! let mut arch = RecordingBackend::default();
//! unsafe { space.activate(&mut arch) };
//! assert_eq!(arch.roots, [space.root_address()]);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

mod address_space;
mod arch;
mod error;
mod mapper;
mod page_entry;
mod page_table;
mod pool;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::address_space::{AddressSpace, WindowCursor};
#[cfg(target_arch = "x86_64")]
pub use crate::arch::X86Backend;
pub use crate::arch::ArchBackend;
pub use crate::error::{MapError, PoolError};
pub use crate::mapper::{PhysMapper, WindowMapper};
pub use crate::page_entry::PageEntryBits;
pub use crate::page_table::{ENTRIES_PER_TABLE, PageTable, PageTableLevel, TableIndex};
pub use crate::pool::{PagePool, PoolState, TableNode, Unmapped, Writable};
