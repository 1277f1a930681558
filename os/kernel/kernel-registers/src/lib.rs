//! # Typed `X86_64` Registers
//!
//! Bitfield models of the control registers touched during bring-up
//! ([`cr0::Cr0`], [`cr3::Cr3`], [`efer::Efer`]) plus the handful of raw
//! instructions that have no register to model: TLB invalidation
//! ([`tlb`]), the interrupt flag ([`interrupts`]) and port I/O ([`port`]).
//!
//! Everything that executes an instruction is behind the `asm` feature so
//! the bitfield types stay usable in host-side tests.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "efer")]
pub mod efer;

#[cfg(feature = "asm")]
pub mod interrupts;

#[cfg(feature = "asm")]
pub mod port;

#[cfg(feature = "asm")]
pub mod tlb;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}
