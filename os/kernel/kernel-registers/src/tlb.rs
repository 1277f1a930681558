//! Translation lookaside buffer maintenance.

/// Invalidates the translation for the page containing `va` on the executing
/// core (`invlpg`).
///
/// # Safety
/// Ring 0 only. Other cores keep their cached translation.
#[inline]
pub unsafe fn invalidate_page(va: u64) {
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
    }
}
