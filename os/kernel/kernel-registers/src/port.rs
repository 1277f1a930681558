//! Legacy port I/O.

/// Writes a byte to an I/O port.
///
/// # Safety
/// Ring 0 (or IOPL) only; the write may have arbitrary device side effects.
#[allow(clippy::inline_always)]
#[inline(always)]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nomem, nostack, preserves_flags)
        );
    }
}

/// Reads a byte from an I/O port.
///
/// # Safety
/// Ring 0 (or IOPL) only; the read may have device side effects.
#[allow(clippy::inline_always)]
#[inline(always)]
#[must_use]
pub unsafe fn inb(port: u16) -> u8 {
    let val: u8;
    unsafe {
        core::arch::asm!(
            "in al, dx",
            in("dx") port,
            out("al") val,
            options(nomem, nostack, preserves_flags)
        );
    }
    val
}
