//! # Kernel Bring-up
//!
//! Takes the machine from the loader handoff to a kernel running on its own,
//! write-protected address space with interrupts unmasked.
//!
//! ## Sequence
//!
//! ```text
//! graphics → serial console → MADT → snapshot handoff
//!     → build address space → activate root
//!     → register frame buffer → CPU features → timer → legacy input
//!     → harden kernel image → unmask interrupts
//! ```
//!
//! Later steps rely on earlier ones: hardening edits leaf entries of the
//! active hierarchy and only binds ring 0 once CPU init has set `CR0.WP`;
//! timer init needs the HPET block mapped.
//!
//! All hardware access goes through [`Platform`]. Everything produced along
//! the way ends up in the returned [`BringUpContext`] rather than in globals.
//!
//! ## Failure
//! Running out of page-table pages, a malformed memory map, a corrupted
//! image header or an unmapped page under a read-only section are fatal and
//! returned as [`BringUpError`]. A missing legacy keyboard controller or HPET
//! is only logged.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod error;
mod layout;
mod platform;
mod tracing;

pub use crate::error::BringUpError;
pub use crate::layout::{DeviceWindows, build_address_space};
pub use crate::platform::Platform;

use kernel_acpi::CpuTopology;
use kernel_image::{HardeningReport, harden_image};
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::KERNEL_IMAGE;
use kernel_vmem::AddressSpace;
use log::{info, warn};

/// State produced by [`bring_up`] that later kernel code builds on.
pub struct BringUpContext<M> {
    /// Copy of the handoff record taken before any firmware memory is touched.
    pub boot: KernelBootInfo,
    pub topology: CpuTopology,
    /// The live kernel address space.
    pub address_space: AddressSpace<M>,
    pub devices: DeviceWindows,
    pub hardening: HardeningReport,
}

/// Runs the bring-up sequence on `platform`.
///
/// # Errors
/// See [`BringUpError`]. An error after the root switch leaves the new
/// address space active.
///
/// # Safety
/// Must run once, on the bootstrap processor, with interrupts masked, while
/// `boot` and everything it points to is still intact. The loader's
/// translations of the page-table pool at
/// [`PAGE_TABLES`](kernel_info::memory::PAGE_TABLES) must be in place.
pub unsafe fn bring_up<P: Platform>(
    platform: &mut P,
    boot: &KernelBootInfo,
) -> Result<BringUpContext<P::Mapper>, BringUpError> {
    platform.init_graphics(&boot.fb);
    platform.init_serial_console();
    info!("Kernel bring-up started");

    // SAFETY: The platform maps firmware tables read-only.
    let topology = unsafe { CpuTopology::parse(platform.firmware(), boot.madt_addr)? };

    let boot = boot.clone();
    tracing::trace_boot_info(&boot);

    let mapper = platform.page_table_mapper(&boot.page_tables);
    // SAFETY: The memory map has not been reclaimed yet.
    let (mut space, devices) = unsafe { build_address_space(mapper, &boot, &topology)? };

    // SAFETY: Kernel image, page-table pool and firmware runtime regions are
    // mapped; the boot stack is part of the image.
    unsafe { space.activate(platform.arch()) };

    if let Some(fb) = devices.frame_buffer {
        platform.register_frame_buffer(fb, &boot.fb);
    }

    platform.init_cpu();

    match devices.hpet {
        Some(hpet) => platform.init_timer(hpet),
        None => warn!("No HPET; system timer not started"),
    }

    if boot.has_legacy_input() {
        platform.init_legacy_input();
    } else {
        warn!("No PS/2 legacy support");
    }

    let mut image = platform.kernel_image(KERNEL_IMAGE.base, &boot.kernel);
    let hardening = harden_image(&mut image, &mut space, platform.arch())?;
    info!(
        "Kernel image hardened: {} sections, {} zeroed ({} bytes), {} pages write-protected",
        hardening.sections,
        hardening.zeroed_sections,
        hardening.zeroed_bytes,
        hardening.protected_pages
    );

    // SAFETY: The platform contract covers handler installation.
    unsafe { platform.unmask_interrupts() };
    info!("Kernel bring-up complete");

    Ok(BringUpContext {
        boot,
        topology,
        address_space: space,
        devices,
        hardening,
    })
}
