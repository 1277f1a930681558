//! The bring-up hooks on real x86-64 hardware.

use crate::framebuffer::FrameBuffer;
use crate::{hpet, ps2};
use core::ptr::NonNull;
use kernel_acpi::PhysMapRo;
use kernel_bringup::Platform;
use kernel_image::LoadedImage;
use kernel_info::boot::{FramebufferInfo, KernelImageInfo, PageTablePoolInfo};
use kernel_info::memory::PAGE_TABLES;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::cr0::Cr0;
use kernel_registers::efer::Efer;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe, interrupts, port};
use kernel_serial::{COM1, Pio, SerialLogger, Uart16550, serial_trace};
use kernel_vmem::{WindowMapper, X86Backend};
use log::{LevelFilter, info, warn};

const PIC1_DATA: u16 = 0x21;
const PIC2_DATA: u16 = 0xA1;

/// Firmware tables through the loader's identity mapping. Only used before
/// the root switch.
pub struct IdentityTables;

impl PhysMapRo for IdentityTables {
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8] {
        unsafe { core::slice::from_raw_parts(paddr as *const u8, len) }
    }
}

pub struct X86Platform {
    arch: X86Backend,
    tables: IdentityTables,
    frame_buffer: Option<FrameBuffer>,
}

impl X86Platform {
    /// # Safety
    /// Ring 0 only, and only one instance may exist.
    pub const unsafe fn new() -> Self {
        Self {
            // SAFETY: Forwarded to the caller.
            arch: unsafe { X86Backend::new() },
            tables: IdentityTables,
            frame_buffer: None,
        }
    }
}

impl Platform for X86Platform {
    type Mapper = WindowMapper;
    type Arch = X86Backend;
    type Firmware = IdentityTables;

    fn init_graphics(&mut self, fb: &FramebufferInfo) {
        // Until the kernel maps it, the frame buffer is only reachable 1:1.
        self.frame_buffer = FrameBuffer::new(
            VirtualAddress::new(fb.framebuffer_ptr),
            fb.clone(),
        );
        if let Some(fb) = &mut self.frame_buffer {
            // SAFETY: The loader's tables identity-map the frame buffer.
            unsafe { fb.clear(0x00, 0x00, 0x40) };
        }
    }

    fn init_serial_console(&mut self) {
        let uart = Uart16550::new(Pio, COM1).init();

        let level = if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        if let Err(e) = SerialLogger::new(level).init() {
            // The logger installed first keeps working; this one never will.
            serial_trace!("serial logger not installed: {e}\n");
        }

        if let Err(e) = uart {
            warn!("{e}; output only reaches the debug console");
        }
    }

    fn firmware(&self) -> &IdentityTables {
        &self.tables
    }

    fn page_table_mapper(&mut self, pool: &PageTablePoolInfo) -> WindowMapper {
        WindowMapper::new(PhysicalAddress::new(pool.physical_base), PAGE_TABLES)
    }

    fn arch(&mut self) -> &mut X86Backend {
        &mut self.arch
    }

    fn register_frame_buffer(&mut self, fb: VirtualAddress, info: &FramebufferInfo) {
        self.frame_buffer = FrameBuffer::new(fb, info.clone());
        if let Some(fb) = &mut self.frame_buffer {
            // SAFETY: Mapped by bring-up at `fb`.
            unsafe { fb.clear(0x00, 0x40, 0x00) };
        }
    }

    fn init_cpu(&mut self) {
        // SAFETY: Ring 0. Every supervisor write the kernel does from here on
        // targets a page mapped writable.
        unsafe {
            let cr0 = Cr0::load_unsafe().with_wp_write_protect(true);
            cr0.store_unsafe();

            let efer = Efer::load_unsafe().with_nxe(true);
            efer.store_unsafe();

            // Nothing handles legacy PIC vectors.
            port::outb(PIC1_DATA, 0xFF);
            port::outb(PIC2_DATA, 0xFF);
        }
        info!("CPU: CR0.WP and EFER.NXE set, legacy PIC masked");
    }

    fn init_timer(&mut self, hpet: VirtualAddress) {
        // SAFETY: Bring-up mapped the HPET block as a device page at `hpet`.
        let period = unsafe { hpet::enable(hpet) };
        info!("HPET: main counter running, period {period} fs");
    }

    fn init_legacy_input(&mut self) {
        // SAFETY: Ring 0; the loader reported an i8042.
        match unsafe { ps2::init() } {
            Ok(drained) => info!("PS/2: first port enabled ({drained} stale bytes drained)"),
            Err(e) => warn!("PS/2: {e}"),
        }
    }

    fn kernel_image(&mut self, base: VirtualAddress, info: &KernelImageInfo) -> LoadedImage {
        // SAFETY: The kernel executes from `base`, which is never null, and
        // `info.size` is the image size the loader mapped there.
        unsafe {
            LoadedImage::from_raw(
                NonNull::new_unchecked(base.as_mut_ptr::<u8>()),
                usize::try_from(info.size).unwrap_or_default(),
                base,
            )
        }
    }

    unsafe fn unmask_interrupts(&mut self) {
        // SAFETY: With the PIC masked and no I/O APIC redirection programmed,
        // no external interrupt can arrive yet.
        unsafe { interrupts::enable() };
        info!("Interrupts unmasked");
    }
}
