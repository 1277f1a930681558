//! Construction of the kernel address space from the handoff record.

use crate::BringUpError;
use kernel_acpi::CpuTopology;
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::{DEVICES, FRAME_BUFFER, KERNEL_IMAGE, PAGE_TABLES, framebuffer_map_bytes};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, pages_for};
use kernel_mmap::{MemoryMap, physical_start, trace_memory_map, virtual_start};
use kernel_vmem::{AddressSpace, MapError, PageEntryBits, PagePool, PhysMapper, WindowCursor};
use log::{info, warn};

/// Virtual addresses of the MMIO blocks mapped during bring-up.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DeviceWindows {
    /// `None` if the loader found no linear frame buffer.
    pub frame_buffer: Option<VirtualAddress>,
    /// `None` if the loader found no HPET.
    pub hpet: Option<VirtualAddress>,
    pub io_apic: VirtualAddress,
    pub local_apic: VirtualAddress,
}

/// Builds (but does not activate) the kernel address space.
///
/// Regions are mapped in this order:
/// 1. the page-table pool at [`PAGE_TABLES`]
/// 2. the kernel image at [`KERNEL_IMAGE`]
/// 3. the frame buffer at [`FRAME_BUFFER`], over-mapped by
///    [`FRAMEBUFFER_SLACK_BYTES`](kernel_info::memory::FRAMEBUFFER_SLACK_BYTES)
/// 4. one page each for HPET, I/O APIC and local APIC in [`DEVICES`]
/// 5. every firmware-runtime region of the memory map, 1:1
///
/// # Errors
/// [`MapError::WindowExhausted`] if the kernel image or the frame buffer's
/// nominal size does not fit its window. Any failure leaves a half-built
/// hierarchy behind that must not be activated.
///
/// # Safety
/// The memory map described by `boot.mmap` must be readable and unchanged.
pub unsafe fn build_address_space<M: PhysMapper>(
    mapper: M,
    boot: &KernelBootInfo,
    topology: &CpuTopology,
) -> Result<(AddressSpace<M>, DeviceWindows), BringUpError> {
    let pool = PagePool::new(
        mapper,
        PhysicalAddress::new(boot.page_tables.physical_base),
        boot.page_tables.page_count,
    )?;
    let mut space = AddressSpace::bootstrap(pool, PAGE_TABLES)?;

    let kernel_pages = pages_for(boot.kernel.size);
    if kernel_pages > KERNEL_IMAGE.page_count {
        return Err(MapError::WindowExhausted {
            requested: kernel_pages,
            remaining: KERNEL_IMAGE.page_count,
        }
        .into());
    }
    let kernel_pa = PhysicalAddress::new(boot.kernel.physical_base);
    space.map_range(
        KERNEL_IMAGE.base,
        kernel_pa,
        boot.kernel.size,
        PageEntryBits::kernel_rw(),
    )?;
    info!(
        "Kernel image: {kernel_pages} pages {kernel_pa} -> {}",
        KERNEL_IMAGE.base
    );

    let frame_buffer = if boot.fb.framebuffer_ptr == 0 {
        warn!("No linear frame buffer");
        None
    } else {
        let pa = PhysicalAddress::new(boot.fb.framebuffer_ptr);
        let bytes = framebuffer_map_bytes(boot.fb.framebuffer_size);
        let pages = pages_for(pa.page_offset().saturating_add(bytes));
        let va = space.map_pages_in_region(
            &mut WindowCursor::new(FRAME_BUFFER),
            pa,
            pages,
            PageEntryBits::framebuffer(),
        )?;
        info!(
            "Frame buffer: {pages} pages {pa} -> {va} ({} bytes nominal)",
            boot.fb.framebuffer_size
        );
        Some(va)
    };

    let mut devices = WindowCursor::new(DEVICES);
    let mut map_device = |name: &str, pa: PhysicalAddress| {
        let va = space.map_pages_in_region(&mut devices, pa, 1, PageEntryBits::device())?;
        info!("{name}: {pa} -> {va}");
        Ok::<_, MapError>(va)
    };

    let hpet = if boot.hpet_addr == 0 {
        warn!("No HPET reported by the loader");
        None
    } else {
        Some(map_device("HPET", PhysicalAddress::new(boot.hpet_addr))?)
    };
    let io_apic = map_device("I/O APIC", topology.io_apic)?;
    let local_apic = map_device("Local APIC", topology.local_apic)?;

    // SAFETY: Caller guarantees the memory map is intact.
    let map = unsafe { MemoryMap::from_boot_info(&boot.mmap)? };
    trace_memory_map(&map);

    let mut runtime_pages = 0;
    for desc in map.runtime_regions() {
        let pa = physical_start(&desc);
        // Firmware that never had its virtual map set reports 0 here.
        let va = match virtual_start(&desc) {
            va if va.is_zero() => VirtualAddress::new(pa.as_u64()),
            va => va,
        };
        space.map_pages(va, pa, desc.page_count, PageEntryBits::kernel_rw())?;
        runtime_pages += desc.page_count;
    }
    info!("Firmware runtime regions: {runtime_pages} pages mapped");

    Ok((
        space,
        DeviceWindows {
            frame_buffer,
            hpet,
            io_apic,
            local_apic,
        },
    ))
}
