use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// `IA32_EFER` / EFER (MSR `0xC000_0080`).
///
/// Bring-up only flips [`Efer::nxe`]; the remaining bits are modelled so a
/// read-modify-write preserves them.
#[bitfield(u64, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct Efer {
    /// Bit 0 — SCE: System Call Extensions.
    pub sce: bool,

    /// Bits 1–7 — Reserved or model specific.
    #[bits(7)]
    pub reserved0: u8,

    /// Bit 8 — LME: Long Mode Enable.
    pub lme: bool,

    /// Bit 9 — Reserved.
    pub reserved1: bool,

    /// Bit 10 — LMA: Long Mode Active (read-only).
    pub lma: bool,

    /// Bit 11 — NXE: No-Execute Enable.
    ///
    /// Until this is set, bit 63 of a page-table entry is reserved and
    /// setting it faults.
    pub nxe: bool,

    /// Bit 12 — SVME: Secure Virtual Machine Enable (AMD SVM).
    pub svme: bool,

    /// Bit 13 — LMSLE: Long Mode Segment Limit Enable.
    pub lmsle: bool,

    /// Bit 14 — FFXSR: Fast FXSAVE/FXRSTOR.
    pub ffxsr: bool,

    /// Bit 15 — TCE: Translation Cache Extension.
    pub tce: bool,

    /// Bits 16–63 — Reserved or model specific.
    #[bits(48)]
    pub reserved2: u64,
}

impl Efer {
    /// MSR index for `IA32_EFER` / `EFER`.
    pub const MSR_EFER: u32 = 0xC000_0080;
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Efer {
    unsafe fn load_unsafe() -> Self {
        let (lo, hi): (u32, u32);
        unsafe {
            core::arch::asm!(
                "rdmsr",
                in("ecx") Self::MSR_EFER,
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits(u64::from(hi) << 32 | u64::from(lo))
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Efer {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn store_unsafe(self) {
        let efer = self.into_bits();
        let lo = efer as u32;
        let hi = (efer >> 32) as u32;
        unsafe {
            core::arch::asm!(
                "wrmsr",
                in("ecx") Self::MSR_EFER,
                in("eax") lo,
                in("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}
