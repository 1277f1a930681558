//! # Kernel Framebuffer helpers

use kernel_info::boot::{BootPixelFormat, FramebufferInfo};
use kernel_memory_addresses::VirtualAddress;

const BYTES_PER_PIXEL: usize = 4;

/// A linear 32-bit frame buffer at a known virtual address.
pub struct FrameBuffer {
    base: VirtualAddress,
    info: FramebufferInfo,
}

impl FrameBuffer {
    /// `None` if there is nothing to draw to.
    pub fn new(base: VirtualAddress, info: FramebufferInfo) -> Option<Self> {
        if base.is_zero()
            || matches!(
                info.framebuffer_format,
                BootPixelFormat::BltOnly | BootPixelFormat::Bitmask
            )
        {
            return None;
        }
        Some(Self { base, info })
    }

    /// Fills the visible area with one color.
    ///
    /// # Safety
    /// `stride * height` pixels starting at the base must be mapped writable.
    pub unsafe fn clear(&mut self, r: u8, g: u8, b: u8) {
        let pixel = match self.info.framebuffer_format {
            BootPixelFormat::Rgb => u32::from_le_bytes([r, g, b, 0xFF]),
            BootPixelFormat::Bgr => u32::from_le_bytes([b, g, r, 0xFF]),
            BootPixelFormat::BltOnly | BootPixelFormat::Bitmask => return,
        };

        let width = usize::try_from(self.info.framebuffer_width).unwrap_or_default();
        let height = usize::try_from(self.info.framebuffer_height).unwrap_or_default();
        let stride = usize::try_from(self.info.framebuffer_stride).unwrap_or_default();
        let size = usize::try_from(self.info.framebuffer_size).unwrap_or_default();
        let base = self.base.as_mut_ptr::<u32>();

        for y in 0..height {
            for x in 0..width {
                let offset = y * stride + x;
                if (offset + 1) * BYTES_PER_PIXEL > size {
                    return;
                }
                // SAFETY: Within the nominal size, which the caller guarantees is mapped.
                unsafe { base.add(offset).write_volatile(pixel) };
            }
        }
    }
}
