use core::ptr::NonNull;
use kernel_memory_addresses::VirtualAddress;

/// The kernel image as it sits in memory after loading.
///
/// `ptr` is where the bytes are accessible right now; `base` is the virtual
/// address the image runs at in the kernel address space, i.e. what section
/// RVAs are relative to when walking page tables. In the running kernel both
/// are the same address.
#[derive(Debug)]
pub struct LoadedImage {
    ptr: NonNull<u8>,
    len: usize,
    base: VirtualAddress,
}

impl LoadedImage {
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for the
    /// lifetime of the returned value, and nothing else may access that memory
    /// while it exists.
    #[must_use]
    pub const unsafe fn from_raw(ptr: NonNull<u8>, len: usize, base: VirtualAddress) -> Self {
        Self { ptr, len, base }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn bytes(&self) -> &[u8] {
        // SAFETY: Guaranteed by `from_raw`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub const fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: Guaranteed by `from_raw`; `&mut self` makes it exclusive.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}
