//! Host-side stand-ins for physical memory and the architecture backend.

use crate::{ArchBackend, PageEntryBits, PageTable, PageTableLevel, PhysMapper, TableIndex};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::NonNull;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};

/// Fill pattern of fresh frames, so missing zeroing shows up in tests.
pub const POISON: u8 = 0xCC;

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE as usize]);

/// A run of 4 KiB-aligned host frames posing as physical memory at
/// `[base, base + page_count * 4096)`.
pub struct FrameArena {
    frames: NonNull<[Frame]>,
    base: PhysicalAddress,
}

impl FrameArena {
    /// # Panics
    /// If `base` is not page aligned.
    #[must_use]
    pub fn new(base: PhysicalAddress, page_count: usize) -> Self {
        assert!(base.is_page_aligned());
        let frames: Box<[Frame]> = (0..page_count)
            .map(|_| Frame([POISON; PAGE_SIZE as usize]))
            .collect();
        Self {
            frames: NonNull::from(Box::leak(frames)),
            base,
        }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.frames.len() as u64
    }

    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.base.as_u64()
            && pa.as_u64() - self.base.as_u64() < self.page_count() * PAGE_SIZE
    }

    fn byte_ptr(&self, pa: PhysicalAddress, len: usize) -> *mut u8 {
        assert!(
            self.contains(pa) && self.contains(pa + (len.max(1) as u64 - 1)),
            "{pa} (+{len}) is outside the arena"
        );
        let offset = (pa.as_u64() - self.base.as_u64()) as usize;
        // SAFETY: Bounds checked above.
        unsafe { self.frames.cast::<u8>().as_ptr().add(offset) }
    }

    /// Reads back `len` bytes at `pa`.
    ///
    /// # Panics
    /// If the range leaves the arena.
    #[must_use]
    pub fn bytes(&self, pa: PhysicalAddress, len: usize) -> &[u8] {
        // SAFETY: In bounds; the arena outlives the borrow.
        unsafe { core::slice::from_raw_parts(self.byte_ptr(pa, len), len) }
    }

    /// The leaf entry for `va` in the hierarchy rooted at `root`, read straight
    /// from the frames. `None` if the walk hits a missing level, a large page
    /// or a table outside the arena.
    #[must_use]
    pub fn leaf_entry(&self, root: PhysicalAddress, va: VirtualAddress) -> Option<PageEntryBits> {
        let mut table = root;
        for level in PageTableLevel::NON_LEAF {
            let entry = self.read_entry(table, TableIndex::of(va, level))?;
            if !entry.present() || entry.large_page() {
                return None;
            }
            table = entry.physical_address();
        }
        self.read_entry(table, TableIndex::of(va, PageTableLevel::Pt))
    }

    fn read_entry(&self, table: PhysicalAddress, index: TableIndex) -> Option<PageEntryBits> {
        if !table.is_page_aligned() || !self.contains(table) {
            return None;
        }
        let ptr = self.byte_ptr(table, PAGE_SIZE as usize).cast::<PageTable>();
        // SAFETY: A whole, aligned frame of the arena; no reference outlives
        // this read.
        Some(unsafe { (*ptr).get(index) })
    }
}

impl Drop for FrameArena {
    fn drop(&mut self) {
        // SAFETY: Created by `Box::leak` in `new` and never freed elsewhere.
        drop(unsafe { Box::from_raw(self.frames.as_ptr()) });
    }
}

impl PhysMapper for FrameArena {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = self.byte_ptr(pa, size_of::<T>());
        debug_assert!(ptr.cast::<T>().is_aligned());
        // SAFETY: The caller promises `T` matches the bytes in the frame.
        unsafe { &mut *ptr.cast::<T>() }
    }
}

/// [`ArchBackend`] that records what would have reached the hardware.
///
/// Created with [`RecordingBackend::watching`], it also snapshots a set of
/// leaf entries at every invalidation, read under the most recently activated
/// root. That shows whether each edit was flushed before the next one.
#[derive(Default)]
pub struct RecordingBackend<'a> {
    pub roots: Vec<PhysicalAddress>,
    pub invalidated: Vec<VirtualAddress>,
    pub global_invalidations: usize,
    /// One row per invalidation, one column per watched address.
    pub leaves_at_invalidation: Vec<Vec<Option<PageEntryBits>>>,
    tables: Option<&'a FrameArena>,
    watched: Vec<VirtualAddress>,
}

impl<'a> RecordingBackend<'a> {
    #[must_use]
    pub fn watching(tables: &'a FrameArena, watched: &[VirtualAddress]) -> Self {
        Self {
            tables: Some(tables),
            watched: watched.to_vec(),
            ..Self::default()
        }
    }

    /// Writable bit of every watched address at each invalidation; `None`
    /// where the address was not mapped.
    #[must_use]
    pub fn writable_at_invalidation(&self) -> Vec<Vec<Option<bool>>> {
        self.leaves_at_invalidation
            .iter()
            .map(|row| row.iter().map(|e| e.map(|e| e.writable())).collect())
            .collect()
    }
}

impl ArchBackend for RecordingBackend<'_> {
    unsafe fn activate_root(&mut self, root: PhysicalAddress) {
        self.roots.push(root);
    }

    fn invalidate_translation(&mut self, va: VirtualAddress) {
        self.invalidated.push(va);
        if let (Some(tables), Some(&root)) = (self.tables, self.roots.last()) {
            let row = self
                .watched
                .iter()
                .map(|&w| tables.leaf_entry(root, w))
                .collect();
            self.leaves_at_invalidation.push(row);
        }
    }

    fn invalidate_translation_global(&mut self, va: VirtualAddress) {
        self.global_invalidations += 1;
        self.invalidate_translation(va);
    }
}
