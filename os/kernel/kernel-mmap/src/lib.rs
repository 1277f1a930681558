//! # Firmware Memory Map Reader
//!
//! Walks the raw UEFI memory map handed over by the loader.
//!
//! The firmware reports a *descriptor size* alongside the buffer. It is at
//! least `size_of::<MemoryDescriptor>()` but may be larger (newer firmware
//! appends fields), so iteration always advances by the declared stride and
//! reads each descriptor unaligned from the start of its slot.
//!
//! ```rust
//! # use kernel_mmap::MemoryMap;
//! # use uefi::mem::memory_map::MemoryDescriptor;
//! let stride = size_of::<MemoryDescriptor>() + 8;
//! let buffer = vec![0u8; stride * 3];
//! let map = MemoryMap::new(&buffer, stride).unwrap();
//! assert_eq!(map.iter().count(), 3);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::iter::FusedIterator;
use kernel_info::boot::MemoryMapInfo;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use log::debug;
use uefi::mem::memory_map::{MemoryAttribute, MemoryDescriptor};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemoryMapError {
    #[error("memory map buffer is null")]
    NullBuffer,
    #[error("memory map stride {stride} is smaller than a descriptor ({minimum} bytes)")]
    StrideTooSmall { stride: usize, minimum: usize },
}

/// A borrowed view of a firmware memory map.
///
/// Copying the view is cheap and every call to [`MemoryMap::iter`] restarts
/// from the first descriptor.
#[derive(Copy, Clone, Debug)]
pub struct MemoryMap<'a> {
    buffer: &'a [u8],
    stride: usize,
}

impl<'a> MemoryMap<'a> {
    /// Creates a view over `buffer` with descriptors `stride` bytes apart.
    ///
    /// # Errors
    /// [`MemoryMapError::StrideTooSmall`] if `stride` cannot hold a
    /// [`MemoryDescriptor`].
    pub const fn new(buffer: &'a [u8], stride: usize) -> Result<Self, MemoryMapError> {
        let minimum = size_of::<MemoryDescriptor>();
        if stride < minimum {
            return Err(MemoryMapError::StrideTooSmall { stride, minimum });
        }
        Ok(Self { buffer, stride })
    }

    /// Creates a view from the loader handoff.
    ///
    /// # Errors
    /// [`MemoryMapError::NullBuffer`] for a null buffer, otherwise as [`MemoryMap::new`].
    ///
    /// # Safety
    /// `info.mmap_ptr` must point to `info.mmap_len` readable bytes that stay
    /// valid and unmodified for `'a`.
    pub unsafe fn from_boot_info(info: &MemoryMapInfo) -> Result<Self, MemoryMapError> {
        if info.mmap_ptr == 0 {
            return Err(MemoryMapError::NullBuffer);
        }

        // SAFETY: Caller guarantees the range is valid for 'a.
        let buffer = unsafe {
            core::slice::from_raw_parts(info.mmap_ptr as *const u8, info.mmap_len as usize)
        };
        Self::new(buffer, info.mmap_desc_size as usize)
    }

    /// Number of whole descriptors in the buffer. A trailing partial slot is ignored.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.buffer.len() / self.stride
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn iter(&self) -> MemoryDescriptors<'a> {
        MemoryDescriptors {
            buffer: self.buffer,
            stride: self.stride,
            offset: 0,
        }
    }

    /// Descriptors the firmware needs preserved after the handoff
    /// (`EFI_MEMORY_RUNTIME`), regardless of their type.
    pub fn runtime_regions(&self) -> impl Iterator<Item = MemoryDescriptor> + 'a {
        self.iter().filter(is_runtime)
    }
}

impl<'a> IntoIterator for &MemoryMap<'a> {
    type Item = MemoryDescriptor;
    type IntoIter = MemoryDescriptors<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the descriptors of a [`MemoryMap`].
#[derive(Clone, Debug)]
pub struct MemoryDescriptors<'a> {
    buffer: &'a [u8],
    stride: usize,
    offset: usize,
}

impl Iterator for MemoryDescriptors<'_> {
    type Item = MemoryDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.offset.checked_add(self.stride)?;
        if end > self.buffer.len() {
            return None;
        }

        let slot = &self.buffer[self.offset..end];
        self.offset = end;

        // SAFETY: `slot` holds at least `size_of::<MemoryDescriptor>()` bytes
        // (checked at construction); firmware descriptors are plain data.
        Some(unsafe { core::ptr::read_unaligned(slot.as_ptr().cast::<MemoryDescriptor>()) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.buffer.len() - self.offset.min(self.buffer.len())) / self.stride;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MemoryDescriptors<'_> {}
impl FusedIterator for MemoryDescriptors<'_> {}

/// Whether the firmware marked the region as required at runtime.
#[inline]
#[must_use]
pub fn is_runtime(desc: &MemoryDescriptor) -> bool {
    desc.att.contains(MemoryAttribute::RUNTIME)
}

/// Physical start of the region.
#[inline]
#[must_use]
pub const fn physical_start(desc: &MemoryDescriptor) -> PhysicalAddress {
    PhysicalAddress::new(desc.phys_start)
}

/// Virtual start the firmware expects the region at.
#[inline]
#[must_use]
pub const fn virtual_start(desc: &MemoryDescriptor) -> VirtualAddress {
    VirtualAddress::new(desc.virt_start)
}

/// Size of the region in bytes.
#[inline]
#[must_use]
pub const fn size_bytes(desc: &MemoryDescriptor) -> u64 {
    desc.page_count * PAGE_SIZE
}

/// Dumps every descriptor at `debug` level.
pub fn trace_memory_map(map: &MemoryMap<'_>) {
    debug!(
        "Memory map: {} descriptors, stride {} bytes",
        map.len(),
        map.stride()
    );
    for (i, desc) in map.iter().enumerate() {
        debug!(
            "  [{i:3}] {:?} phys={} virt={} pages={} attr={:#018x}",
            desc.ty,
            physical_start(&desc),
            virtual_start(&desc),
            desc.page_count,
            desc.att.bits()
        );
    }
}
