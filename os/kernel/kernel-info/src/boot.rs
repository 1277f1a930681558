//! # Kernel Boot Information
//!
//! The one-shot handoff record passed by the boot loader. It is only valid
//! until the kernel starts reclaiming firmware memory, so bring-up copies it
//! out (it is `Clone`) before touching anything else.

/// Kernel function pointer.
///
/// # ABI
/// The ABI is defined as `win64` since the kernel is called from a UEFI
/// (PE/COFF) application.
pub type KernelEntryFn = extern "win64" fn(*const KernelBootInfo) -> !;

/// Information the kernel needs right after `ExitBootServices`.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct KernelBootInfo {
    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// Framebuffer information, passed from UEFI GOP.
    pub fb: FramebufferInfo,

    /// Where the loader placed the kernel image.
    pub kernel: KernelImageInfo,

    /// Physical address of the ACPI MADT ("APIC") table, or 0 if not found.
    pub madt_addr: u64,

    /// Physical address of the HPET register block, or 0 if not present.
    pub hpet_addr: u64,

    /// Non-zero when the firmware reports an i8042 keyboard controller.
    pub legacy_input_present: u32,

    /// Physical pages reserved for building the kernel page tables.
    pub page_tables: PageTablePoolInfo,
}

impl KernelBootInfo {
    #[inline]
    #[must_use]
    pub const fn has_legacy_input(&self) -> bool {
        self.legacy_input_present != 0
    }
}

#[repr(C)]
#[derive(Clone, Debug)]
pub struct MemoryMapInfo {
    /// Pointer to the raw UEFI memory map buffer (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map buffer in **bytes**.
    pub mmap_len: u64,

    /// Size of a single memory descriptor in bytes (`EFI_MEMORY_DESCRIPTOR_VERSION` dependent).
    ///
    /// Firmware is free to hand out descriptors larger than the structure the
    /// kernel knows about; always advance by this value.
    pub mmap_desc_size: u64,

    /// Descriptor version (from UEFI).
    pub mmap_desc_version: u32,
}

#[repr(C)]
#[derive(Clone, Debug)]
pub struct FramebufferInfo {
    /// Linear framebuffer base address (CPU physical address).
    pub framebuffer_ptr: u64,

    /// Total framebuffer size in **bytes**.
    pub framebuffer_size: u64,

    /// Visible width in **pixels**.
    pub framebuffer_width: u64,

    /// Visible height in **pixels**.
    pub framebuffer_height: u64,

    /// Pixels per scanline (a.k.a. stride). May be >= width due to padding.
    pub framebuffer_stride: u64,

    /// Pixel format tag. If `BltOnly`, you cannot draw directly.
    pub framebuffer_format: BootPixelFormat,
}

/// Pixel format tag compatible with UEFI GOP.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootPixelFormat {
    Rgb = 0,
    Bgr = 1,
    Bitmask = 2,
    /// No linear framebuffer available.
    BltOnly = 3,
}

/// Physical placement of the loaded kernel image.
///
/// The image is linked to run at [`KERNEL_IMAGE`](crate::memory::KERNEL_IMAGE);
/// the loader copies it to `physical_base` and maps it there for the duration
/// of the handoff.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct KernelImageInfo {
    pub physical_base: u64,

    /// Size of the image in memory (`SizeOfImage`), in bytes.
    pub size: u64,
}

/// The physical range reserved for page-table construction.
///
/// The loader maps these pages at [`PAGE_TABLES`](crate::memory::PAGE_TABLES)
/// in its own tables so the kernel can write table nodes through the same
/// virtual addresses before and after switching to its own root.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct PageTablePoolInfo {
    pub physical_base: u64,
    pub page_count: u64,
}
