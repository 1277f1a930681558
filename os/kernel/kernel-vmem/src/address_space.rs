//! # Address Space Builder
//!
//! Populates the 4-level hierarchy owned by a [`PagePool`]. Mappings are
//! always 4 KiB; missing intermediate tables are taken from the pool and
//! linked as present + writable so the leaf alone decides permissions.
//!
//! ## Sharp edge
//!
//! [`AddressSpace::map_pages`] overwrites whatever leaf it finds. Re-mapping
//! the same `va -> pa` pair is harmless, but mapping a present `va` to a
//! *different* frame silently replaces the old translation. Callers keep
//! their virtual ranges disjoint.

mod walk;
mod window;

pub use crate::address_space::window::WindowCursor;

use crate::pool::{PagePool, Unmapped, Writable};
use crate::{ArchBackend, MapError, PageEntryBits, PageTableLevel, PhysMapper};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress, VirtualRegion, pages_for};
use log::{debug, trace};

/// The kernel address space under construction (and, once activated, the
/// live one).
pub struct AddressSpace<M> {
    pool: PagePool<M, Writable>,
}

impl<M: PhysMapper> AddressSpace<M> {
    /// Maps the pool's own backing pages at `window` and returns the address
    /// space built on it.
    ///
    /// All pages the pool will ever hand out are mapped, not just the ones in
    /// use, so tables allocated later are reachable through `window` as soon
    /// as they exist.
    ///
    /// # Errors
    /// - [`MapError::WindowExhausted`] if `window` is smaller than the pool.
    /// - [`MapError::Pool`] if the pool runs dry while mapping itself.
    pub fn bootstrap(
        mut pool: PagePool<M, Unmapped>,
        window: VirtualRegion,
    ) -> Result<Self, MapError> {
        if window.page_count < pool.capacity() {
            return Err(MapError::WindowExhausted {
                requested: pool.capacity(),
                remaining: window.page_count,
            });
        }

        let (base, count) = (pool.base(), pool.capacity());
        for i in 0..count {
            walk::map_leaf(
                &mut pool,
                window.base + i * PAGE_SIZE,
                base + i * PAGE_SIZE,
                PageEntryBits::kernel_rw(),
            )?;
        }

        debug!(
            "Page-table pool: {count} pages at {base} mapped at {}, {} used for self-mapping",
            window.base,
            pool.allocated()
        );
        Ok(Self {
            pool: pool.into_writable(),
        })
    }

    /// Maps `page_count` consecutive 4 KiB pages `va + i*4096 -> pa + i*4096`.
    ///
    /// `va` and `pa` must be page aligned.
    ///
    /// # Errors
    /// - [`MapError::Pool`] if an intermediate table cannot be allocated.
    /// - [`MapError::LargePage`]/[`MapError::ForeignTable`] if the walk runs
    ///   into an entry this builder did not create.
    pub fn map_pages(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        page_count: u64,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        debug_assert!(va.is_page_aligned() && pa.is_page_aligned());
        trace!("map {page_count} pages {va} -> {pa} ({:#x})", flags.into_bits());

        for i in 0..page_count {
            walk::map_leaf(&mut self.pool, va + i * PAGE_SIZE, pa + i * PAGE_SIZE, flags)?;
        }
        Ok(())
    }

    /// Maps `size_bytes` starting at `pa` to `va`, rounding out to whole pages.
    ///
    /// `va` and `pa` must share the same in-page offset; the tail page is
    /// always included.
    ///
    /// # Errors
    /// As [`AddressSpace::map_pages`].
    pub fn map_range(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        size_bytes: u64,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        debug_assert_eq!(va.page_offset(), pa.page_offset());
        let pages = pages_for(pa.page_offset() + size_bytes);
        self.map_pages(va.page_base(), pa.page_base(), pages, flags)
    }

    /// Maps `page_count` pages of the physical block containing `pa` at the
    /// next free slot of `cursor`'s window.
    ///
    /// Returns the virtual address corresponding to `pa`, in-page offset
    /// included.
    ///
    /// # Errors
    /// - [`MapError::WindowExhausted`] if the window has fewer pages left.
    /// - As [`AddressSpace::map_pages`].
    pub fn map_pages_in_region(
        &mut self,
        cursor: &mut WindowCursor,
        pa: PhysicalAddress,
        page_count: u64,
        flags: PageEntryBits,
    ) -> Result<VirtualAddress, MapError> {
        let va = cursor.take(page_count)?;
        self.map_pages(va, pa.page_base(), page_count, flags)?;
        Ok(va + pa.page_offset())
    }

    /// The present leaf entry mapping `va`.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] naming the first level along the walk that is
    /// absent, leaf included.
    pub fn get_present_pte(&mut self, va: VirtualAddress) -> Result<&mut PageEntryBits, MapError> {
        let (node, index) = walk::find_leaf(&self.pool, va)?;
        let entry = self.pool.table_mut(node).entry_mut(index);
        if entry.present() {
            Ok(entry)
        } else {
            Err(MapError::NotMapped {
                va,
                level: PageTableLevel::Pt,
            })
        }
    }

    /// Physical address `va` translates to, or `None` if unmapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (node, index) = walk::find_leaf(&self.pool, va).ok()?;
        let entry = self.pool.table(node).get(index);
        entry
            .present()
            .then(|| entry.physical_address() + va.page_offset())
    }

    /// Installs this hierarchy as the active one.
    ///
    /// # Safety
    /// Everything the CPU touches after the switch (code, stack, the pool
    /// window, live data) must already be mapped.
    pub unsafe fn activate<A: ArchBackend>(&self, arch: &mut A) {
        debug!(
            "Activating address space rooted at {} ({} of {} table pages used)",
            self.root_address(),
            self.pool.allocated(),
            self.pool.capacity()
        );
        unsafe { arch.activate_root(self.root_address()) };
    }

    #[inline]
    #[must_use]
    pub const fn root_address(&self) -> PhysicalAddress {
        self.pool.root_address()
    }

    #[inline]
    #[must_use]
    pub const fn pool(&self) -> &PagePool<M, Writable> {
        &self.pool
    }

    #[inline]
    pub const fn pool_mut(&mut self) -> &mut PagePool<M, Writable> {
        &mut self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoolError;
    use crate::testing::{FrameArena, RecordingBackend};

    const POOL_BASE: PhysicalAddress = PhysicalAddress::new(0x0080_0000);
    const WINDOW: VirtualRegion = VirtualRegion::new(0xFFFF_FF00_0000_0000, 64);

    fn space(arena: &FrameArena) -> AddressSpace<&FrameArena> {
        let pool = PagePool::new(arena, arena.base(), arena.page_count()).unwrap();
        AddressSpace::bootstrap(pool, WINDOW).unwrap()
    }

    #[test]
    fn bootstrap_maps_every_pool_page() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let space = space(&arena);

        for i in 0..16 {
            assert_eq!(
                space.translate(WINDOW.base + i * PAGE_SIZE),
                Some(POOL_BASE + i * PAGE_SIZE)
            );
        }
        // Root, PDPT, PD and PT for the window.
        assert_eq!(space.pool().allocated(), 4);
    }

    #[test]
    fn bootstrap_rejects_small_window() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let pool = PagePool::new(&arena, POOL_BASE, 16).unwrap();
        let window = VirtualRegion::new(0xFFFF_FF00_0000_0000, 8);
        assert_eq!(
            AddressSpace::bootstrap(pool, window).err(),
            Some(MapError::WindowExhausted {
                requested: 16,
                remaining: 8
            })
        );
    }

    #[test]
    fn device_region_reads_back_in_order() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let mut space = space(&arena);

        let va = VirtualAddress::new(0xFFFF_FF20_0000_0000);
        let pa = PhysicalAddress::new(0xFEB0_0000);
        space
            .map_pages(va, pa, 5, PageEntryBits::device())
            .unwrap();

        for i in 0..5 {
            let pte = space.get_present_pte(va + i * PAGE_SIZE).unwrap();
            assert_eq!(pte.physical_address(), pa + i * PAGE_SIZE);
            assert!(pte.cache_disabled());
        }
    }

    #[test]
    fn disjoint_mappings_translate_to_their_targets() {
        let arena = FrameArena::new(POOL_BASE, 32);
        let mut space = space(&arena);

        let runs = [
            (0xFFFF_FFFF_8000_0000, 0x0010_0000, 3),
            (0xFFFF_FF10_0000_0000, 0xC000_0000, 2),
            (0x0000_0000_7F00_0000, 0x7F00_0000, 4),
            // Crosses a page-table boundary.
            (0xFFFF_FF20_001F_F000, 0xFED0_0000, 2),
        ];
        for (va, pa, n) in runs {
            space
                .map_pages(
                    VirtualAddress::new(va),
                    PhysicalAddress::new(pa),
                    n,
                    PageEntryBits::kernel_rw(),
                )
                .unwrap();
        }
        for (va, pa, n) in runs {
            for i in 0..n {
                let va = VirtualAddress::new(va) + i * PAGE_SIZE;
                let pte = space.get_present_pte(va).unwrap();
                assert_eq!(pte.physical_address(), PhysicalAddress::new(pa) + i * PAGE_SIZE);
            }
        }
    }

    #[test]
    fn remapping_the_same_pair_is_idempotent() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let mut space = space(&arena);

        let va = VirtualAddress::new(0xFFFF_FFFF_8000_0000);
        let pa = PhysicalAddress::new(0x0010_0000);
        space.map_pages(va, pa, 2, PageEntryBits::kernel_rw()).unwrap();
        let used = space.pool().allocated();
        space.map_pages(va, pa, 2, PageEntryBits::kernel_rw()).unwrap();

        assert_eq!(space.pool().allocated(), used);
        assert_eq!(space.translate(va + PAGE_SIZE), Some(pa + PAGE_SIZE));
    }

    #[test]
    fn partial_tail_page_is_mapped() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let mut space = space(&arena);

        let va = VirtualAddress::new(0xFFFF_FF10_0000_0000);
        let pa = PhysicalAddress::new(0xC000_0000);
        space
            .map_range(va, pa, 2 * PAGE_SIZE + 1, PageEntryBits::framebuffer())
            .unwrap();

        assert_eq!(space.translate(va + 2 * PAGE_SIZE), Some(pa + 2 * PAGE_SIZE));
        assert_eq!(space.translate(va + 3 * PAGE_SIZE), None);
    }

    #[test]
    fn lookups_on_unmapped_memory_fail() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let mut space = space(&arena);

        let va = VirtualAddress::new(0x0000_1234_5678_9000);
        assert_eq!(
            space.get_present_pte(va).err(),
            Some(MapError::NotMapped {
                va,
                level: PageTableLevel::Pml4
            })
        );

        // Same PT as the pool window, different slot.
        let va = WINDOW.base + 100 * PAGE_SIZE;
        assert_eq!(
            space.get_present_pte(va).err(),
            Some(MapError::NotMapped {
                va,
                level: PageTableLevel::Pt
            })
        );
        assert_eq!(space.translate(va), None);
    }

    #[test]
    fn exhaustion_surfaces_as_pool_error() {
        let arena = FrameArena::new(POOL_BASE, 4);
        let mut space = space(&arena);

        let err = space
            .map_pages(
                VirtualAddress::new(0x0000_0000_4000_0000),
                PhysicalAddress::new(0x4000_0000),
                1,
                PageEntryBits::kernel_rw(),
            )
            .err();
        assert_eq!(err, Some(MapError::Pool(PoolError::Exhausted { capacity: 4 })));
    }

    #[test]
    fn device_windows_are_handed_out_consecutively() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let mut space = space(&arena);
        let mut cursor = WindowCursor::new(VirtualRegion::new(0xFFFF_FF20_0000_0000, 3));

        let hpet = space
            .map_pages_in_region(&mut cursor, PhysicalAddress::new(0xFED0_0000), 1, PageEntryBits::device())
            .unwrap();
        let lapic = space
            .map_pages_in_region(&mut cursor, PhysicalAddress::new(0xFEE0_0010), 1, PageEntryBits::device())
            .unwrap();

        assert_eq!(hpet.as_u64(), 0xFFFF_FF20_0000_0000);
        assert_eq!(lapic.as_u64(), 0xFFFF_FF20_0000_1010);
        assert_eq!(space.translate(lapic), Some(PhysicalAddress::new(0xFEE0_0010)));
        assert_eq!(
            space
                .map_pages_in_region(&mut cursor, PhysicalAddress::new(0xFEC0_0000), 2, PageEntryBits::device())
                .err(),
            Some(MapError::WindowExhausted {
                requested: 2,
                remaining: 1
            })
        );
    }

    #[test]
    fn activation_writes_the_root_once() {
        let arena = FrameArena::new(POOL_BASE, 16);
        let space = space(&arena);
        let mut arch = RecordingBackend::default();

        unsafe { space.activate(&mut arch) };
        assert_eq!(arch.roots, [POOL_BASE]);
        assert!(arch.invalidated.is_empty());
    }
}
