//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses handled while building the
//! kernel address space.
//!
//! ## Overview
//!
//! Bring-up code constantly juggles two kinds of 64-bit numbers: physical
//! addresses (what the firmware map, the boot loader and page-table entries
//! talk about) and virtual addresses (what the CPU dereferences once paging is
//! live). Mixing them up is the classic way to fault the instant CR3 is loaded,
//! so they get distinct types here:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | Physical memory or MMIO address. |
//! | [`VirtualAddress`]  | Address in the (new) kernel address space. |
//! | [`VirtualRegion`]   | A page-aligned virtual window of `page_count` pages. |
//!
//! All paging in this workspace uses 4 KiB pages ([`PAGE_SIZE`]).
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0010_2042);
//! assert_eq!(pa.page_base().as_u64(), 0x0010_2000);
//! assert_eq!(pa.page_offset(), 0x42);
//!
//! // A 5 KiB object spans two pages.
//! assert_eq!(pages_for(5 * 1024), 2);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod physical_address;
mod virtual_address;
mod virtual_region;

pub use crate::physical_address::PhysicalAddress;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_region::VirtualRegion;

/// Size of a base page in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);

/// Number of 4 KiB pages needed to hold `bytes` bytes.
///
/// Rounds up, so a region whose size is not a multiple of the page size is
/// never left partially unmapped at its tail.
///
/// ```rust
/// # use kernel_memory_addresses::pages_for;
/// assert_eq!(pages_for(0), 0);
/// assert_eq!(pages_for(1), 1);
/// assert_eq!(pages_for(4096), 1);
/// assert_eq!(pages_for(4097), 2);
/// ```
#[inline(always)]
#[must_use]
pub const fn pages_for(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(8191, 4096), 4096);
/// assert_eq!(align_down(0x12345, 16), 0x12340);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    debug_assert!(a.is_power_of_two());
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two and `x + (a - 1)` must not overflow.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(1, 4096), 4096);
/// assert_eq!(align_up(4096, 4096), 4096);
/// assert_eq!(align_up(0x12345, 16), 0x12350);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> u64 {
    debug_assert!(a.is_power_of_two());
    (x + a - 1) & !(a - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_for_rounds_up_partial_tail() {
        assert_eq!(pages_for(3 * PAGE_SIZE), 3);
        assert_eq!(pages_for(3 * PAGE_SIZE + 1), 4);
        assert_eq!(pages_for(PAGE_SIZE - 1), 1);
    }

    #[test]
    fn alignment_helpers_agree() {
        for x in [0u64, 1, 4095, 4096, 4097, 0x1234_5678] {
            assert_eq!(align_down(x, PAGE_SIZE) % PAGE_SIZE, 0);
            assert_eq!(align_up(x, PAGE_SIZE) % PAGE_SIZE, 0);
            assert!(align_down(x, PAGE_SIZE) <= x);
            assert!(align_up(x, PAGE_SIZE) >= x);
        }
    }
}
