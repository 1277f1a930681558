use crate::{PAGE_SIZE, VirtualAddress};

/// A contiguous, page-aligned window of the kernel address space.
///
/// Regions are fixed at compile time (see the `kernel-info` layout constants)
/// and never overlap. `page_count` counts 4 KiB pages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VirtualRegion {
    pub base: VirtualAddress,
    pub page_count: u64,
}

impl VirtualRegion {
    #[must_use]
    pub const fn new(base: u64, page_count: u64) -> Self {
        assert!(base % PAGE_SIZE == 0, "region base must be page aligned");
        Self {
            base: VirtualAddress::new(base),
            page_count,
        }
    }

    #[inline]
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.page_count * PAGE_SIZE
    }

    /// One past the last byte of the region.
    ///
    /// For a region ending exactly at the top of the address space this wraps
    /// to zero, so prefer [`VirtualRegion::contains`] for range checks.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        VirtualAddress::new(self.base.as_u64().wrapping_add(self.size_bytes()))
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        let base = self.base.as_u64();
        let va = va.as_u64();
        va >= base && va - base < self.size_bytes()
    }

    /// Whether `self` and `other` share at least one byte.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        let a = self.base.as_u64();
        let b = other.base.as_u64();
        if a <= b {
            b - a < self.size_bytes()
        } else {
            a - b < other.size_bytes()
        }
    }
}
