//! # Kernel Boot Interface and Memory Layout
//!
//! Shared contract between the boot loader and the kernel bring-up code.
//!
//! ## Boot Information ([`boot`])
//! The loader-to-kernel handoff record: firmware memory map, frame buffer,
//! the loaded image's physical placement, ACPI/HPET addresses and the
//! physical page range reserved for building page tables.
//!
//! ## Memory Layout ([`memory`])
//! The fixed virtual windows the kernel address space is built from:
//!
//! ```text
//! 0xFFFF_FF00_0000_0000 ┌─────────────────────────────────┐
//!                       │   Page-table pool (PAGE_TABLES) │
//! 0xFFFF_FF10_0000_0000 ├─────────────────────────────────┤
//!                       │   Frame buffer (FRAME_BUFFER)   │
//! 0xFFFF_FF20_0000_0000 ├─────────────────────────────────┤
//!                       │   MMIO pages (DEVICES)          │
//!                       ├─────────────────────────────────┤
//!                       │            unmapped             │
//! 0xFFFF_FFFF_8000_0000 ├─────────────────────────────────┤
//!                       │   Kernel image (KERNEL_IMAGE)   │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! Firmware runtime regions are mapped 1:1 at whatever virtual address the
//! firmware memory map requests and are not part of the fixed layout.
//!
//! ### Build Script Integration
//! ```rust
//! use kernel_info::memory::KERNEL_IMAGE;
//!
//! println!("cargo:rustc-link-arg=/BASE:{:#x}", KERNEL_IMAGE.base.as_u64());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
