//! Hardware collaborators of the bring-up sequence.

use kernel_acpi::PhysMapRo;
use kernel_image::LoadedImage;
use kernel_info::boot::{FramebufferInfo, KernelImageInfo, PageTablePoolInfo};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{ArchBackend, PhysMapper};

/// Everything [`bring_up`](crate::bring_up) needs from the machine it runs on.
///
/// Hooks are called exactly once each, in the order they are declared here
/// (accessors excepted). Hooks that run after the new address space is active
/// receive virtual addresses inside it.
pub trait Platform {
    /// Writes page-table nodes of the pool.
    type Mapper: PhysMapper;

    /// Root activation and translation invalidation.
    type Arch: ArchBackend;

    /// Read-only access to firmware tables.
    type Firmware: PhysMapRo;

    /// Sets up graphics output on the loader's frame buffer.
    fn init_graphics(&mut self, fb: &FramebufferInfo);

    /// Brings up the serial console and installs the logger. Nothing logged
    /// before this returns is visible.
    fn init_serial_console(&mut self);

    fn firmware(&self) -> &Self::Firmware;

    /// Mapper for the page-table pool described by `pool`.
    ///
    /// Must stay valid across the root switch, so it addresses the pool
    /// through [`PAGE_TABLES`](kernel_info::memory::PAGE_TABLES).
    fn page_table_mapper(&mut self, pool: &PageTablePoolInfo) -> Self::Mapper;

    fn arch(&mut self) -> &mut Self::Arch;

    /// Points the graphics output at the frame buffer's new virtual address.
    fn register_frame_buffer(&mut self, fb: VirtualAddress, info: &FramebufferInfo);

    /// Enables the CPU features the rest of bring-up relies on, in particular
    /// supervisor write protection.
    fn init_cpu(&mut self);

    /// Starts the system timer through its mapped register block.
    fn init_timer(&mut self, hpet: VirtualAddress);

    /// Initializes the legacy keyboard controller. Only called if the loader
    /// reported one.
    fn init_legacy_input(&mut self);

    /// The kernel image as loaded at `base`.
    fn kernel_image(&mut self, base: VirtualAddress, info: &KernelImageInfo) -> LoadedImage;

    /// Unmasks maskable interrupts.
    ///
    /// # Safety
    /// Interrupt handlers for every unmasked vector must be installed.
    unsafe fn unmask_interrupts(&mut self);
}
