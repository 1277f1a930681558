//! # ACPI (Advanced Configuration and Power Interface) Support
//!
//! Just enough ACPI to bring the kernel up: the boot loader already located
//! the MADT ("APIC" table) in the firmware configuration tables, so this crate
//! only validates it and extracts the interrupt topology.
//!
//! ```text
//! UEFI configuration table
//!     ↓ (loader)
//! MADT physical address in KernelBootInfo
//!     ↓ (madt::CpuTopology::parse)
//! local APIC base, I/O APIC base, enabled processors
//! ```
//!
//! ## Physical Memory Mapping ([`PhysMapRo`])
//! Firmware tables are accessed through a caller-provided read-only mapping,
//! so the parser works with identity mapping during bring-up as well as with
//! an in-memory buffer in tests.
//!
//! ## Validation
//! * **Signature**: the four-byte table signature must match.
//! * **Checksum**: all bytes of the table must sum to zero.
//! * **Bounds**: every entry must fit inside the declared table length.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod madt;

pub use madt::{CpuTopology, MadtError};

/// Map a physical region and return a *read-only* byte slice for its contents.
/// You provide the implementation (identity map, kmap, etc.).
pub trait PhysMapRo {
    /// # Safety
    /// The implementor must ensure the returned slice is valid for `len` bytes.
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8];
}

/// Byte-wise checksum used by every ACPI table; valid tables sum to zero.
fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, &b| a.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::sum;

    #[test]
    fn checksum_wraps() {
        assert_eq!(sum(&[]), 0);
        assert_eq!(sum(&[0xFF, 0x01]), 0);
        assert_eq!(sum(&[0x80, 0x80, 0x05]), 5);
    }
}
