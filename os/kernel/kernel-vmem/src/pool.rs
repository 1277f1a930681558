//! # Physical Page Pool
//!
//! A bump allocator over the contiguous physical range reserved for page
//! tables. Pages are handed out in address order, exactly once, and are
//! zeroed before the caller sees them. The cursor never moves backwards and
//! nothing is ever freed: the tables live as long as the kernel.
//!
//! The pool's phase is part of its type:
//!
//! | State        | Meaning |
//! |--------------|---------|
//! | [`Unmapped`] | Root allocated, pool pages not yet present in the new hierarchy. |
//! | [`Writable`] | Pool pages mapped at their window; public allocation is allowed. |
//!
//! Only [`AddressSpace::bootstrap`](crate::AddressSpace::bootstrap) moves a
//! pool from `Unmapped` to `Writable`.

use crate::{PageTable, PhysMapper, PoolError};
use core::marker::PhantomData;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use log::trace;

mod sealed {
    pub trait Sealed {}
}

/// Phase marker of a [`PagePool`].
pub trait PoolState: sealed::Sealed {}

/// The pool's own pages are not yet part of the hierarchy it builds.
#[derive(Debug)]
pub enum Unmapped {}

/// The pool's own pages are mapped; tables may be allocated freely.
#[derive(Debug)]
pub enum Writable {}

impl sealed::Sealed for Unmapped {}
impl sealed::Sealed for Writable {}
impl PoolState for Unmapped {}
impl PoolState for Writable {}

/// A page-table node, named by its page index within the pool.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableNode(u32);

/// Bump allocator over `[base, base + count)` physical pages.
pub struct PagePool<M, S: PoolState = Writable> {
    mapper: M,
    base: PhysicalAddress,
    count: u64,
    next_free_page: u64,
    root: TableNode,
    _state: PhantomData<S>,
}

impl<M: PhysMapper> PagePool<M, Unmapped> {
    /// Creates a pool over `count` pages at `base` and allocates the root table
    /// from it.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] if the range cannot even hold the root.
    ///
    /// # Panics
    /// In debug builds, if `base` is not page aligned.
    pub fn new(mapper: M, base: PhysicalAddress, count: u64) -> Result<Self, PoolError> {
        debug_assert!(base.is_page_aligned(), "pool base must be page aligned");

        let mut pool = Self {
            mapper,
            base,
            count,
            next_free_page: 0,
            root: TableNode(0),
            _state: PhantomData,
        };
        pool.root = pool.take_page()?;
        Ok(pool)
    }

    /// Declares the pool's backing range mapped into its own hierarchy.
    pub(crate) fn into_writable(self) -> PagePool<M, Writable> {
        PagePool {
            mapper: self.mapper,
            base: self.base,
            count: self.count,
            next_free_page: self.next_free_page,
            root: self.root,
            _state: PhantomData,
        }
    }
}

impl<M: PhysMapper> PagePool<M, Writable> {
    /// Hands out one zero-filled page.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] once every reserved page has been handed out.
    pub fn allocate_physical(&mut self) -> Result<PhysicalAddress, PoolError> {
        self.take_page().map(|node| self.node_address(node))
    }
}

impl<M: PhysMapper, S: PoolState> PagePool<M, S> {
    /// Takes the next page, zeroes it and returns it as a table node.
    pub(crate) fn take_page(&mut self) -> Result<TableNode, PoolError> {
        let exhausted = PoolError::Exhausted {
            capacity: self.count,
        };
        if self.next_free_page >= self.count {
            return Err(exhausted);
        }
        let node = TableNode(u32::try_from(self.next_free_page).map_err(|_| exhausted)?);
        self.next_free_page += 1;

        self.table_mut(node).zero();
        trace!(
            "page-table pool: page {} of {} at {}",
            node.0,
            self.count,
            self.node_address(node)
        );
        Ok(node)
    }

    /// Physical address of `node`.
    #[inline]
    #[must_use]
    pub const fn node_address(&self, node: TableNode) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + node.0 as u64 * PAGE_SIZE)
    }

    /// The node at `pa`, if `pa` is a page of this pool that has been handed out.
    #[must_use]
    pub fn node_at(&self, pa: PhysicalAddress) -> Option<TableNode> {
        if !pa.is_page_aligned() {
            return None;
        }
        let index = pa.as_u64().checked_sub(self.base.as_u64())? / PAGE_SIZE;
        if index >= self.next_free_page {
            return None;
        }
        u32::try_from(index).ok().map(TableNode)
    }

    pub(crate) fn table(&self, node: TableNode) -> &PageTable {
        // SAFETY: `node` was handed out by this pool, so it addresses one of
        // its zero-initialized pages which the mapper can reach.
        unsafe { self.mapper.phys_to_mut::<PageTable>(self.node_address(node)) }
    }

    pub(crate) fn table_mut(&mut self, node: TableNode) -> &mut PageTable {
        // SAFETY: As in `table`; `&mut self` makes the access exclusive.
        unsafe { self.mapper.phys_to_mut::<PageTable>(self.node_address(node)) }
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> TableNode {
        self.root
    }

    #[inline]
    #[must_use]
    pub const fn root_address(&self) -> PhysicalAddress {
        self.node_address(self.root)
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Total pages reserved.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.count
    }

    /// Pages handed out so far, root included.
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.next_free_page
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FrameArena;
    use alloc::collections::BTreeSet;

    #[test]
    fn empty_pool_cannot_hold_a_root() {
        let arena = FrameArena::new(PhysicalAddress::new(0x10_0000), 1);
        let err = PagePool::new(&arena, arena.base(), 0).err();
        assert_eq!(err, Some(PoolError::Exhausted { capacity: 0 }));
    }

    #[test]
    fn pages_are_unique_in_range_and_zeroed() {
        let base = PhysicalAddress::new(0x40_0000);
        let arena = FrameArena::new(base, 8);
        let pool = PagePool::new(&arena, base, 8).unwrap();
        let mut pool = pool.into_writable();

        let mut seen = BTreeSet::new();
        seen.insert(pool.root_address());
        while let Ok(pa) = pool.allocate_physical() {
            assert!(pa.is_page_aligned());
            assert!(pa >= base && pa.as_u64() < base.as_u64() + 8 * PAGE_SIZE);
            assert!(arena.bytes(pa, PAGE_SIZE as usize).iter().all(|&b| b == 0));
            assert!(seen.insert(pa), "{pa} handed out twice");
        }

        assert_eq!(seen.len(), 8);
        assert_eq!(pool.allocated(), 8);
        assert_eq!(
            pool.allocate_physical(),
            Err(PoolError::Exhausted { capacity: 8 })
        );
    }

    #[test]
    fn allocation_is_sequential() {
        let base = PhysicalAddress::new(0x40_0000);
        let arena = FrameArena::new(base, 4);
        let mut pool = PagePool::new(&arena, base, 4).unwrap().into_writable();

        assert_eq!(pool.root_address(), base);
        assert_eq!(pool.allocate_physical(), Ok(base + PAGE_SIZE));
        assert_eq!(pool.allocate_physical(), Ok(base + 2 * PAGE_SIZE));
    }

    #[test]
    fn node_lookup_only_knows_handed_out_pages() {
        let base = PhysicalAddress::new(0x40_0000);
        let arena = FrameArena::new(base, 4);
        let pool = PagePool::new(&arena, base, 4).unwrap();

        assert_eq!(pool.node_at(base), Some(pool.root()));
        assert_eq!(pool.node_at(base + PAGE_SIZE), None);
        assert_eq!(pool.node_at(base + 8), None);
        assert_eq!(pool.node_at(PhysicalAddress::new(0x1000)), None);
    }
}
