use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// CR0 — system control flags.
///
/// Only [`Cr0::wp_write_protect`] is changed during bring-up: without it,
/// supervisor code ignores cleared writable bits and read-only kernel
/// sections stay writable in practice.
#[bitfield(u64)]
pub struct Cr0 {
    /// Bit 0 — PE: Protected mode enable.
    pub pe_protection_enable: bool,

    /// Bit 1 — MP: Monitor co-processor.
    pub mp_monitor_coprocessor: bool,

    /// Bit 2 — EM: x87 emulation.
    pub em_emulation: bool,

    /// Bit 3 — TS: Task switched.
    pub ts_task_switched: bool,

    /// Bit 4 — ET: Extension type (hardwired to 1).
    pub et_extension_type: bool,

    /// Bit 5 — NE: Native x87 error reporting.
    pub ne_numeric_error: bool,

    #[bits(10, default = 0)]
    _reserved_6_15: u16,

    /// Bit 16 — WP: Supervisor writes honor read-only pages.
    pub wp_write_protect: bool,

    #[bits(default = 0)]
    _reserved_17: bool,

    /// Bit 18 — AM: Alignment mask.
    pub am_alignment_mask: bool,

    #[bits(10, default = 0)]
    _reserved_19_28: u16,

    /// Bit 29 — NW: Not write-through.
    pub nw_not_write_through: bool,

    /// Bit 30 — CD: Cache disable.
    pub cd_cache_disable: bool,

    /// Bit 31 — PG: Paging.
    pub pg_paging: bool,

    #[bits(32, default = 0)]
    _reserved_32_63: u32,
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let mut cr0: u64;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0)
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        let cr0 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }
}
