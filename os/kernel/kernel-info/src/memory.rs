//! # Memory Layout
//!
//! Fixed virtual windows of the kernel address space. Every window is
//! page-aligned and windows never overlap; both properties are checked at
//! compile time.

use kernel_memory_addresses::{PAGE_SIZE, VirtualRegion};

/// Where the kernel image executes. Matches the image base the kernel is
/// linked at and runs to the top of the address space.
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const KERNEL_IMAGE: VirtualRegion = VirtualRegion::new(0xFFFF_FFFF_8000_0000, 0x8_0000); // 2 GiB

/// Virtual home of the page-table pool. Table nodes are only ever accessed
/// through this window.
pub const PAGE_TABLES: VirtualRegion = VirtualRegion::new(0xFFFF_FF00_0000_0000, 0x4000); // 64 MiB

/// Linear frame buffer window.
pub const FRAME_BUFFER: VirtualRegion = VirtualRegion::new(0xFFFF_FF10_0000_0000, 0x1_0000); // 256 MiB

/// Single-page MMIO register blocks (HPET, I/O APIC, local APIC), handed out
/// consecutively.
pub const DEVICES: VirtualRegion = VirtualRegion::new(0xFFFF_FF20_0000_0000, 64);

/// Extra bytes mapped past the nominal end of the frame buffer.
///
/// Some hypervisors (VirtualBox in particular) touch memory well beyond the
/// size reported through GOP; faults have been observed 48 MiB past the base of
/// a 3 MiB buffer. The margin is empirical. Only the margin is clamped to
/// [`FRAME_BUFFER`], never the nominal size.
pub const FRAMEBUFFER_SLACK_BYTES: u64 = 0x0400_0000; // 64 MiB

/// The size of the boot stack.
pub const KERNEL_STACK_SIZE: usize = 32 * 1024;

/// Number of bytes to map for a frame buffer of `nominal` bytes.
///
/// The margin is cut back to fit [`FRAME_BUFFER`]. A buffer whose nominal size
/// alone exceeds the window is returned as is, so mapping it fails instead of
/// leaving its tail unmapped.
#[must_use]
pub const fn framebuffer_map_bytes(nominal: u64) -> u64 {
    let limit = FRAME_BUFFER.size_bytes();
    if nominal >= limit {
        return nominal;
    }
    let wanted = nominal.saturating_add(FRAMEBUFFER_SLACK_BYTES);
    if wanted > limit { limit } else { wanted }
}

const _: () = {
    assert!(KERNEL_STACK_SIZE.is_multiple_of(PAGE_SIZE as usize));
    assert!(FRAMEBUFFER_SLACK_BYTES.is_multiple_of(PAGE_SIZE));
    assert!(!KERNEL_IMAGE.overlaps(&PAGE_TABLES));
    assert!(!KERNEL_IMAGE.overlaps(&FRAME_BUFFER));
    assert!(!KERNEL_IMAGE.overlaps(&DEVICES));
    assert!(!PAGE_TABLES.overlaps(&FRAME_BUFFER));
    assert!(!PAGE_TABLES.overlaps(&DEVICES));
    assert!(!FRAME_BUFFER.overlaps(&DEVICES));
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_margin_is_clamped() {
        let window = FRAME_BUFFER.size_bytes();
        assert_eq!(framebuffer_map_bytes(0x30_0000), 0x30_0000 + FRAMEBUFFER_SLACK_BYTES);
        assert_eq!(framebuffer_map_bytes(window - 0x1000), window);
        assert_eq!(framebuffer_map_bytes(window), window);
    }

    #[test]
    fn oversized_framebuffer_is_not_truncated() {
        let nominal = FRAME_BUFFER.size_bytes() + 0x1000;
        assert_eq!(framebuffer_map_bytes(nominal), nominal);
        assert_eq!(framebuffer_map_bytes(u64::MAX), u64::MAX);
    }

    #[test]
    fn kernel_window_reaches_top_of_address_space() {
        assert_eq!(KERNEL_IMAGE.end().as_u64(), 0);
    }
}
