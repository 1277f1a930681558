//! # Serial Console
//!
//! The earliest diagnostic channel of the kernel: a polled 16550 UART on
//! COM1 and a [`log::Log`] backend on top of it.
//!
//! ```text
//! log::info!(..)
//!     ↓
//! SerialLogger ("[LEVEL] target: message\n")
//!     ↓
//! Uart16550<Pio> → COM1 (0x3F8)
//!     ↓ (feature `qemu`)
//! QEMU debug console (0x402)
//! ```
//!
//! Nothing written before [`SerialLogger::init`] reaches the console, so a
//! failure that happens earlier in bring-up is silent.
//!
//! ## QEMU
//! ```bash
//! qemu-system-x86_64 ... -serial stdio -debugcon file:debug.log
//! ```
//!
//! The register access goes through [`PortBus`], which keeps the UART logic
//! testable on the host with a recording bus.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
mod uart;

pub use logger::SerialLogger;
pub use uart::{COM1, SerialError, Uart16550};

/// Byte-wide I/O port access.
pub trait PortBus {
    /// # Safety
    /// Writing a port may have arbitrary device side effects.
    unsafe fn write(&mut self, port: u16, value: u8);

    /// # Safety
    /// Reading a port may have device side effects.
    unsafe fn read(&mut self, port: u16) -> u8;
}

/// Port I/O through `in`/`out` instructions.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Copy, Clone, Default)]
pub struct Pio;

#[cfg(target_arch = "x86_64")]
impl PortBus for Pio {
    #[inline]
    unsafe fn write(&mut self, port: u16, value: u8) {
        unsafe { kernel_registers::port::outb(port, value) }
    }

    #[inline]
    unsafe fn read(&mut self, port: u16) -> u8 {
        unsafe { kernel_registers::port::inb(port) }
    }
}

#[cfg(target_arch = "x86_64")]
#[doc(hidden)]
pub mod serial_fmt {
    use crate::{COM1, Pio, Uart16550};
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub fn serial_write(args: fmt::Arguments) {
        // Best-effort output; there is nowhere to report a failure to.
        let _ = fmt::write(&mut Uart16550::new(Pio, COM1), args);
    }
}

/// Writes formatted text straight to COM1, bypassing the `log` facade.
///
/// Meant for the panic path, where the logger may be the thing that broke.
#[cfg(target_arch = "x86_64")]
#[macro_export]
macro_rules! serial_trace {
    ($($arg:tt)*) => {{
        $crate::serial_fmt::serial_write(core::format_args!($($arg)*));
    }};
}
