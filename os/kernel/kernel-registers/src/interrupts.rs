//! Interrupt flag control.

/// Masks maskable interrupts (`cli`).
///
/// # Safety
/// Ring 0 only.
#[inline]
pub unsafe fn disable() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack)) };
}

/// Unmasks maskable interrupts (`sti`).
///
/// # Safety
/// Ring 0 only. An IDT able to handle every unmasked vector must be loaded.
#[inline]
pub unsafe fn enable() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack)) };
}

/// Halts until the next interrupt (`hlt`).
///
/// # Safety
/// Ring 0 only. With interrupts masked this never returns.
#[inline]
pub unsafe fn halt() {
    unsafe { core::arch::asm!("hlt", options(nomem, nostack, preserves_flags)) };
}
