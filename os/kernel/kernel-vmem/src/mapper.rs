use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualRegion};

/// Converts physical addresses of table nodes to usable references in the
/// current virtual address space.
///
/// # Safety
/// - `pa` must be mapped as writable in the current page tables for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

impl<M> PhysMapper for &M
where
    M: PhysMapper + ?Sized,
{
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { (**self).phys_to_mut(pa) }
    }
}

/// [`PhysMapper`] for a physical range that is visible at a fixed virtual
/// window, `pa -> window.base + (pa - phys_base)`.
///
/// Used for the page-table pool: the loader maps it at the window before the
/// handoff and the kernel maps it at the same window in its own tables, so the
/// translation stays valid across the root switch.
#[derive(Debug, Copy, Clone)]
pub struct WindowMapper {
    phys_base: PhysicalAddress,
    window: VirtualRegion,
}

impl WindowMapper {
    #[must_use]
    pub const fn new(phys_base: PhysicalAddress, window: VirtualRegion) -> Self {
        Self { phys_base, window }
    }

    /// Virtual address of `pa`, or `None` if it lies outside the window.
    #[must_use]
    pub const fn virtual_of(&self, pa: PhysicalAddress) -> Option<u64> {
        let Some(offset) = pa.as_u64().checked_sub(self.phys_base.as_u64()) else {
            return None;
        };
        if offset / PAGE_SIZE >= self.window.page_count {
            return None;
        }
        Some(self.window.base.as_u64() + offset)
    }
}

impl PhysMapper for WindowMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let Some(va) = self.virtual_of(pa) else {
            panic!("{pa} is outside the mapped window");
        };
        // SAFETY: Caller guarantees the window is mapped and holds a `T` at `pa`.
        unsafe { &mut *(va as *mut T) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_translation_is_bounded() {
        let mapper = WindowMapper::new(
            PhysicalAddress::new(0x0800_0000),
            VirtualRegion::new(0xFFFF_FF00_0000_0000, 4),
        );
        assert_eq!(
            mapper.virtual_of(PhysicalAddress::new(0x0800_2000)),
            Some(0xFFFF_FF00_0000_2000)
        );
        assert_eq!(mapper.virtual_of(PhysicalAddress::new(0x0800_4000)), None);
        assert_eq!(mapper.virtual_of(PhysicalAddress::new(0x07FF_F000)), None);
    }
}
