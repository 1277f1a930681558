use crate::MapError;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, VirtualRegion};

/// Hands out consecutive pages of a fixed virtual window.
///
/// Used for MMIO blocks whose physical address is discovered at runtime: each
/// block gets the next free slot, and nothing is ever returned.
#[derive(Debug, Clone)]
pub struct WindowCursor {
    region: VirtualRegion,
    next_page: u64,
}

impl WindowCursor {
    #[must_use]
    pub const fn new(region: VirtualRegion) -> Self {
        Self {
            region,
            next_page: 0,
        }
    }

    /// Reserves `pages` pages and returns the first one's address.
    ///
    /// # Errors
    /// [`MapError::WindowExhausted`] if fewer than `pages` remain; the cursor
    /// is left unchanged.
    pub const fn take(&mut self, pages: u64) -> Result<VirtualAddress, MapError> {
        let remaining = self.remaining();
        if pages > remaining {
            return Err(MapError::WindowExhausted {
                requested: pages,
                remaining,
            });
        }
        let va = VirtualAddress::new(self.region.base.as_u64() + self.next_page * PAGE_SIZE);
        self.next_page += pages;
        Ok(va)
    }

    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.region.page_count - self.next_page
    }
}
