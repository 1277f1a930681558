use core::ptr::NonNull;
use kernel_acpi::{MadtError, PhysMapRo};
use kernel_bringup::{BringUpError, Platform, bring_up};
use kernel_image::testing::ImageBuilder;
use kernel_image::{HardeningReport, LoadedImage};
use kernel_info::boot::{
    BootPixelFormat, FramebufferInfo, KernelBootInfo, KernelImageInfo, MemoryMapInfo,
    PageTablePoolInfo,
};
use kernel_info::memory::{DEVICES, FRAME_BUFFER, KERNEL_IMAGE, PAGE_TABLES};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_mmap::MemoryMapError;
use kernel_vmem::testing::{FrameArena, RecordingBackend};
use kernel_vmem::{MapError, PoolError};
use uefi::mem::memory_map::{MemoryAttribute, MemoryDescriptor, MemoryType};

const POOL_BASE: PhysicalAddress = PhysicalAddress::new(0x0080_0000);
const POOL_PAGES: usize = 64;
const KERNEL_PHYS: u64 = 0x0100_0000;
const FB_PHYS: u64 = 0x8000_0000;
const FB_SIZE: u64 = 0x0010_0000;
const HPET_PHYS: u64 = 0xFED0_0000;
const IO_APIC_PHYS: u64 = 0xFEC0_0000;
const LAPIC_PHYS: u64 = 0xFEE0_0000;
const MADT_ADDR: u64 = 0x100;

const DISCARDABLE: u32 = 0x4200_0040;
const READ_ONLY: u32 = 0x4000_0040;
const CODE: u32 = 0x6000_0020;
const DATA: u32 = 0xC000_0040;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Step {
    Graphics,
    Serial,
    FrameBuffer,
    Cpu,
    Timer,
    LegacyInput,
    Unmask,
}

/// A step together with what the hardware had seen by then.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Observed {
    step: Step,
    activated: bool,
    invalidations: usize,
}

/// Firmware tables living in a byte buffer starting at physical address 0.
struct Tables(Vec<u8>);

impl PhysMapRo for Tables {
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8] {
        let start = usize::try_from(paddr).unwrap();
        let slice = &self.0[start..start + len];
        unsafe { core::slice::from_raw_parts(slice.as_ptr(), slice.len()) }
    }
}

struct FakePlatform<'a> {
    arena: &'a FrameArena,
    tables: Tables,
    image: &'a mut [u8],
    arch: RecordingBackend<'a>,
    steps: Vec<Observed>,
    registered_fb: Option<VirtualAddress>,
    timer: Option<VirtualAddress>,
}

impl<'a> FakePlatform<'a> {
    fn new(arena: &'a FrameArena, tables: Tables, image: &'a mut [u8]) -> Self {
        Self {
            arena,
            tables,
            image,
            arch: RecordingBackend::default(),
            steps: Vec::new(),
            registered_fb: None,
            timer: None,
        }
    }

    fn record(&mut self, step: Step) {
        self.steps.push(Observed {
            step,
            activated: !self.arch.roots.is_empty(),
            invalidations: self.arch.invalidated.len(),
        });
    }

    fn step_names(&self) -> Vec<Step> {
        self.steps.iter().map(|o| o.step).collect()
    }
}

impl<'a> Platform for FakePlatform<'a> {
    type Mapper = &'a FrameArena;
    type Arch = RecordingBackend<'a>;
    type Firmware = Tables;

    fn init_graphics(&mut self, _fb: &FramebufferInfo) {
        self.record(Step::Graphics);
    }

    fn init_serial_console(&mut self) {
        self.record(Step::Serial);
    }

    fn firmware(&self) -> &Tables {
        &self.tables
    }

    fn page_table_mapper(&mut self, pool: &PageTablePoolInfo) -> &'a FrameArena {
        assert_eq!(pool.physical_base, self.arena.base().as_u64());
        self.arena
    }

    fn arch(&mut self) -> &mut RecordingBackend<'a> {
        &mut self.arch
    }

    fn register_frame_buffer(&mut self, fb: VirtualAddress, _info: &FramebufferInfo) {
        self.registered_fb = Some(fb);
        self.record(Step::FrameBuffer);
    }

    fn init_cpu(&mut self) {
        self.record(Step::Cpu);
    }

    fn init_timer(&mut self, hpet: VirtualAddress) {
        self.timer = Some(hpet);
        self.record(Step::Timer);
    }

    fn init_legacy_input(&mut self) {
        self.record(Step::LegacyInput);
    }

    fn kernel_image(&mut self, base: VirtualAddress, info: &KernelImageInfo) -> LoadedImage {
        assert_eq!(info.size, self.image.len() as u64);
        let ptr = NonNull::new(self.image.as_mut_ptr()).unwrap();
        unsafe { LoadedImage::from_raw(ptr, self.image.len(), base) }
    }

    unsafe fn unmask_interrupts(&mut self) {
        self.record(Step::Unmask);
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |a, &b| a.wrapping_add(b))
}

/// A MADT at [`MADT_ADDR`] with two enabled processors and one I/O APIC.
fn firmware_tables() -> Tables {
    let mut t = Vec::new();
    t.extend_from_slice(b"APIC");
    t.extend_from_slice(&0u32.to_le_bytes());
    t.extend_from_slice(&[4, 0]);
    t.extend_from_slice(b"OEMID TABLEID ");
    t.extend_from_slice(&[0; 12]);
    t.extend_from_slice(&u32::try_from(LAPIC_PHYS).unwrap().to_le_bytes());
    t.extend_from_slice(&1u32.to_le_bytes());
    for apic_id in [0u8, 1] {
        t.extend_from_slice(&[0, 8, apic_id, apic_id, 1, 0, 0, 0]);
    }
    t.extend_from_slice(&[1, 12, 0, 0]);
    t.extend_from_slice(&u32::try_from(IO_APIC_PHYS).unwrap().to_le_bytes());
    t.extend_from_slice(&0u32.to_le_bytes());

    let len = u32::try_from(t.len()).unwrap();
    t[4..8].copy_from_slice(&len.to_le_bytes());
    t[9] = 0u8.wrapping_sub(checksum(&t));

    let mut memory = vec![0u8; usize::try_from(MADT_ADDR).unwrap()];
    memory.extend_from_slice(&t);
    Tables(memory)
}

fn descriptor(ty: MemoryType, phys: u64, virt: u64, pages: u64, att: MemoryAttribute) -> MemoryDescriptor {
    MemoryDescriptor {
        ty,
        phys_start: phys,
        virt_start: virt,
        page_count: pages,
        att,
    }
}

/// A firmware memory map with padded descriptors.
fn memory_map() -> (Vec<u8>, usize) {
    let descs = [
        descriptor(MemoryType::CONVENTIONAL, 0x10_0000, 0, 256, MemoryAttribute::empty()),
        descriptor(MemoryType::RUNTIME_SERVICES_CODE, 0x7F00_0000, 0, 2, MemoryAttribute::RUNTIME),
        descriptor(
            MemoryType::RUNTIME_SERVICES_DATA,
            0x7F10_0000,
            0x0000_0040_0000_0000,
            1,
            MemoryAttribute::RUNTIME,
        ),
    ];
    let stride = size_of::<MemoryDescriptor>() + 16;
    let mut buffer = vec![0u8; descs.len() * stride];
    for (i, d) in descs.iter().enumerate() {
        unsafe {
            core::ptr::write_unaligned(buffer[i * stride..].as_mut_ptr().cast::<MemoryDescriptor>(), *d);
        }
    }
    (buffer, stride)
}

fn kernel_image() -> Vec<u8> {
    ImageBuilder::new()
        .section(".text", 0x1000, 0x1000, CODE, 0x90)
        .section(".rdata", 0x2000, 0x1000, READ_ONLY, 0x11)
        .section(".data", 0x3000, 0x1000, DATA, 0x22)
        .section(".reloc", 0x4000, 0x800, DISCARDABLE, 0xFF)
        .build()
}

fn boot_info(mmap: &[u8], stride: usize, image_len: usize) -> KernelBootInfo {
    KernelBootInfo {
        mmap: MemoryMapInfo {
            mmap_ptr: mmap.as_ptr() as u64,
            mmap_len: mmap.len() as u64,
            mmap_desc_size: stride as u64,
            mmap_desc_version: 1,
        },
        fb: FramebufferInfo {
            framebuffer_ptr: FB_PHYS,
            framebuffer_size: FB_SIZE,
            framebuffer_width: 512,
            framebuffer_height: 512,
            framebuffer_stride: 512,
            framebuffer_format: BootPixelFormat::Bgr,
        },
        kernel: KernelImageInfo {
            physical_base: KERNEL_PHYS,
            size: image_len as u64,
        },
        madt_addr: MADT_ADDR,
        hpet_addr: HPET_PHYS,
        legacy_input_present: 1,
        page_tables: PageTablePoolInfo {
            physical_base: POOL_BASE.as_u64(),
            page_count: POOL_PAGES as u64,
        },
    }
}

#[test]
fn full_sequence_builds_activates_and_hardens() {
    let arena = FrameArena::new(POOL_BASE, POOL_PAGES);
    let (mmap, stride) = memory_map();
    let mut image = kernel_image();
    let boot = boot_info(&mmap, stride, image.len());
    let mut platform = FakePlatform::new(&arena, firmware_tables(), &mut image);
    let read_only = [KERNEL_IMAGE.base + 0x1000, KERNEL_IMAGE.base + 0x2000];
    platform.arch = RecordingBackend::watching(&arena, &read_only);

    let mut ctx = unsafe { bring_up(&mut platform, &boot) }.unwrap();

    assert_eq!(
        platform.step_names(),
        [
            Step::Graphics,
            Step::Serial,
            Step::FrameBuffer,
            Step::Cpu,
            Step::Timer,
            Step::LegacyInput,
            Step::Unmask
        ]
    );

    // Console before the switch, everything else after it; hardening right
    // before interrupts are unmasked.
    let steps = &platform.steps;
    assert!(!steps[0].activated && !steps[1].activated);
    assert!(steps[2..].iter().all(|o| o.activated));
    assert_eq!(steps[5].invalidations, 0);
    assert_eq!(steps[6].invalidations, 2);

    // A single root switch to the first pool page.
    assert_eq!(platform.arch.roots, [ctx.address_space.root_address()]);
    assert_eq!(ctx.address_space.root_address(), POOL_BASE);

    // The pool is reachable through its window.
    let space = &ctx.address_space;
    assert_eq!(space.translate(PAGE_TABLES.base), Some(POOL_BASE));
    assert_eq!(
        space.translate(PAGE_TABLES.base + 63 * 4096),
        Some(POOL_BASE + 63 * 4096)
    );

    // Kernel image, headers included.
    assert_eq!(
        space.translate(KERNEL_IMAGE.base + 0x4010),
        Some(PhysicalAddress::new(KERNEL_PHYS + 0x4010))
    );

    // Frame buffer, including the slack past its nominal end.
    assert_eq!(ctx.devices.frame_buffer, Some(FRAME_BUFFER.base));
    assert_eq!(platform.registered_fb, Some(FRAME_BUFFER.base));
    assert_eq!(
        space.translate(FRAME_BUFFER.base + FB_SIZE + 0x1000),
        Some(PhysicalAddress::new(FB_PHYS + FB_SIZE + 0x1000))
    );

    // Devices on consecutive pages, in HPET, I/O APIC, local APIC order.
    assert_eq!(ctx.devices.hpet, Some(DEVICES.base));
    assert_eq!(platform.timer, Some(DEVICES.base));
    assert_eq!(ctx.devices.io_apic, DEVICES.base + 4096);
    assert_eq!(ctx.devices.local_apic, DEVICES.base + 2 * 4096);
    assert_eq!(space.translate(ctx.devices.io_apic), Some(PhysicalAddress::new(IO_APIC_PHYS)));
    assert_eq!(space.translate(ctx.devices.local_apic), Some(PhysicalAddress::new(LAPIC_PHYS)));

    // Firmware runtime regions: 1:1 when no virtual address was assigned,
    // otherwise at the firmware's choice. Plain RAM is left alone.
    assert_eq!(
        space.translate(VirtualAddress::new(0x7F00_1000)),
        Some(PhysicalAddress::new(0x7F00_1000))
    );
    assert_eq!(
        space.translate(VirtualAddress::new(0x0000_0040_0000_0000)),
        Some(PhysicalAddress::new(0x7F10_0000))
    );
    assert_eq!(space.translate(VirtualAddress::new(0x10_0000)), None);

    // Topology comes from the MADT.
    assert_eq!(ctx.topology.processors(), &[0, 1]);
    assert_eq!(ctx.topology.io_apic.as_u64(), IO_APIC_PHYS);

    // Hardening.
    assert_eq!(
        ctx.hardening,
        HardeningReport {
            sections: 4,
            zeroed_sections: 1,
            zeroed_bytes: 0x800,
            protected_sections: 2,
            protected_pages: 2,
        }
    );
    for (rva, writable) in [(0x1000, false), (0x2000, false), (0x3000, true), (0x4000, true)] {
        let pte = ctx
            .address_space
            .get_present_pte(KERNEL_IMAGE.base + rva)
            .unwrap();
        assert!(pte.present());
        assert_eq!(pte.writable(), writable, "rva {rva:#x}");
    }
    assert_eq!(platform.arch.invalidated, read_only);
    // Each entry was already read-only, and the next still writable, when
    // its translation was dropped.
    assert_eq!(
        platform.arch.writable_at_invalidation(),
        [[Some(false), Some(true)], [Some(false), Some(false)]]
    );
    assert!(platform.image[0x4000..0x4800].iter().all(|&b| b == 0));
    assert!(platform.image[0x3000..0x4000].iter().all(|&b| b == 0x22));

    // The snapshot is a copy of the handoff.
    assert_eq!(ctx.boot.hpet_addr, HPET_PHYS);
}

#[test]
fn missing_optional_hardware_is_not_fatal() {
    let arena = FrameArena::new(POOL_BASE, POOL_PAGES);
    let (mmap, stride) = memory_map();
    let mut image = kernel_image();
    let mut boot = boot_info(&mmap, stride, image.len());
    boot.legacy_input_present = 0;
    boot.hpet_addr = 0;
    let mut platform = FakePlatform::new(&arena, firmware_tables(), &mut image);

    let ctx = unsafe { bring_up(&mut platform, &boot) }.unwrap();

    assert_eq!(
        platform.step_names(),
        [Step::Graphics, Step::Serial, Step::FrameBuffer, Step::Cpu, Step::Unmask]
    );
    assert_eq!(ctx.devices.hpet, None);
    // Without the HPET the APIC blocks move up by one page.
    assert_eq!(ctx.devices.io_apic, DEVICES.base);
}

#[test]
fn pool_exhaustion_halts_before_activation() {
    let arena = FrameArena::new(POOL_BASE, 2);
    let (mmap, stride) = memory_map();
    let mut image = kernel_image();
    let mut boot = boot_info(&mmap, stride, image.len());
    boot.page_tables.page_count = 2;
    let mut platform = FakePlatform::new(&arena, firmware_tables(), &mut image);

    let err = unsafe { bring_up(&mut platform, &boot) }.err();

    assert_eq!(
        err,
        Some(BringUpError::Map(MapError::Pool(PoolError::Exhausted { capacity: 2 })))
    );
    assert!(platform.arch.roots.is_empty());
    assert_eq!(platform.step_names(), [Step::Graphics, Step::Serial]);
}

#[test]
fn oversized_frame_buffer_halts_before_activation() {
    let arena = FrameArena::new(POOL_BASE, POOL_PAGES);
    let (mmap, stride) = memory_map();
    let mut image = kernel_image();
    let mut boot = boot_info(&mmap, stride, image.len());
    boot.fb.framebuffer_size = FRAME_BUFFER.size_bytes() + 0x1000;
    let mut platform = FakePlatform::new(&arena, firmware_tables(), &mut image);

    let err = unsafe { bring_up(&mut platform, &boot) }.err();

    // The whole buffer or nothing: its tail is never silently dropped.
    assert_eq!(
        err,
        Some(BringUpError::Map(MapError::WindowExhausted {
            requested: FRAME_BUFFER.page_count + 1,
            remaining: FRAME_BUFFER.page_count,
        }))
    );
    assert!(platform.arch.roots.is_empty());
    assert_eq!(platform.registered_fb, None);
}

#[test]
fn frame_buffer_filling_the_window_drops_only_the_margin() {
    // 128 page tables for the frame buffer alone.
    const LARGE_POOL: usize = 192;
    let arena = FrameArena::new(POOL_BASE, LARGE_POOL);
    let (mmap, stride) = memory_map();
    let mut image = kernel_image();
    let mut boot = boot_info(&mmap, stride, image.len());
    boot.page_tables.page_count = LARGE_POOL as u64;
    boot.fb.framebuffer_size = FRAME_BUFFER.size_bytes();
    let mut platform = FakePlatform::new(&arena, firmware_tables(), &mut image);

    let ctx = unsafe { bring_up(&mut platform, &boot) }.unwrap();

    let last = FRAME_BUFFER.size_bytes() - 0x1000;
    assert_eq!(
        ctx.address_space.translate(FRAME_BUFFER.base + last),
        Some(PhysicalAddress::new(FB_PHYS + last))
    );
    assert_eq!(ctx.devices.local_apic, DEVICES.base + 2 * 4096);
}

#[test]
fn malformed_memory_map_halts_before_activation() {
    let arena = FrameArena::new(POOL_BASE, POOL_PAGES);
    let (mmap, _) = memory_map();
    let mut image = kernel_image();
    let boot = boot_info(&mmap, 8, image.len());
    let mut platform = FakePlatform::new(&arena, firmware_tables(), &mut image);

    let err = unsafe { bring_up(&mut platform, &boot) }.err();

    assert_eq!(
        err,
        Some(BringUpError::MemoryMap(MemoryMapError::StrideTooSmall {
            stride: 8,
            minimum: size_of::<MemoryDescriptor>()
        }))
    );
    assert!(platform.arch.roots.is_empty());
}

#[test]
fn corrupted_madt_is_fatal() {
    let arena = FrameArena::new(POOL_BASE, POOL_PAGES);
    let (mmap, stride) = memory_map();
    let mut image = kernel_image();
    let boot = boot_info(&mmap, stride, image.len());
    let mut tables = firmware_tables();
    let at = usize::try_from(MADT_ADDR).unwrap() + 9;
    tables.0[at] = tables.0[at].wrapping_add(1);
    let mut platform = FakePlatform::new(&arena, tables, &mut image);

    let err = unsafe { bring_up(&mut platform, &boot) }.err();

    assert!(matches!(
        err,
        Some(BringUpError::Topology(MadtError::BadChecksum { .. }))
    ));
    // The console is up, so the diagnostic can be reported.
    assert_eq!(platform.step_names(), [Step::Graphics, Step::Serial]);
}

#[test]
fn corrupted_image_is_fatal_after_activation() {
    let arena = FrameArena::new(POOL_BASE, POOL_PAGES);
    let (mmap, stride) = memory_map();
    let mut image = ImageBuilder::new()
        .section(".text", 0x1000, 0x1000, CODE, 0x90)
        .dos_magic(0x1234)
        .build();
    let boot = boot_info(&mmap, stride, image.len());
    let mut platform = FakePlatform::new(&arena, firmware_tables(), &mut image);

    let err = unsafe { bring_up(&mut platform, &boot) }.err();

    assert!(matches!(err, Some(BringUpError::Image(_))));
    assert_eq!(platform.arch.roots.len(), 1);
    assert!(platform.arch.invalidated.is_empty());
    assert!(!platform.step_names().contains(&Step::Unmask));
}
