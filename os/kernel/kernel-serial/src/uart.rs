//! Polled 16550 UART driver.

use crate::PortBus;
use core::fmt;

/// I/O base of the first legacy serial port.
pub const COM1: u16 = 0x3F8;

/// QEMU debug console port.
#[cfg(feature = "qemu")]
const QEMU_DEBUG_PORT: u16 = 0x402;

const DATA: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CONTROL: u16 = 2;
const LINE_CONTROL: u16 = 3;
const MODEM_CONTROL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// LCR: divisor latch access.
const LCR_DLAB: u8 = 0x80;
/// LCR: 8 data bits, no parity, one stop bit.
const LCR_8N1: u8 = 0x03;
/// FCR: enable and clear FIFOs, 14-byte threshold.
const FCR_ENABLE_CLEAR_14: u8 = 0xC7;
/// MCR: DTR, RTS and OUT2.
const MCR_NORMAL: u8 = 0x0B;
/// MCR: loopback with RTS, OUT1 and OUT2.
const MCR_LOOPBACK: u8 = 0x1E;
/// LSR: transmit holding register empty.
const LSR_THR_EMPTY: u8 = 0x20;

/// Divisor for 115200 baud.
const DIVISOR_115200: u16 = 1;

const LOOPBACK_PROBE: u8 = 0xAE;

/// Polls of the line status before a byte is dropped.
const TX_SPIN_LIMIT: u32 = 100_000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SerialError {
    #[error("UART at {port:#x} failed the loopback test (read {read:#04x})")]
    LoopbackFailed { port: u16, read: u8 },
}

pub struct Uart16550<B> {
    bus: B,
    base: u16,
}

impl<B: PortBus> Uart16550<B> {
    pub const fn new(bus: B, base: u16) -> Self {
        Self { bus, base }
    }

    /// Programs 115200 8N1 with FIFOs and verifies the chip in loopback mode.
    ///
    /// # Errors
    /// [`SerialError::LoopbackFailed`] if no working UART answers at the base port.
    pub fn init(&mut self) -> Result<(), SerialError> {
        let [divisor_lo, divisor_hi] = DIVISOR_115200.to_le_bytes();

        self.write_reg(INTERRUPT_ENABLE, 0);
        self.write_reg(LINE_CONTROL, LCR_DLAB);
        self.write_reg(DATA, divisor_lo);
        self.write_reg(INTERRUPT_ENABLE, divisor_hi);
        self.write_reg(LINE_CONTROL, LCR_8N1);
        self.write_reg(FIFO_CONTROL, FCR_ENABLE_CLEAR_14);

        self.write_reg(MODEM_CONTROL, MCR_LOOPBACK);
        self.write_reg(DATA, LOOPBACK_PROBE);
        let read = self.read_reg(DATA);
        if read != LOOPBACK_PROBE {
            return Err(SerialError::LoopbackFailed {
                port: self.base,
                read,
            });
        }

        self.write_reg(MODEM_CONTROL, MCR_NORMAL);
        Ok(())
    }

    /// Sends one byte, dropping it if the transmitter never becomes ready.
    pub fn write_byte(&mut self, byte: u8) {
        let mut spins = 0;
        while self.read_reg(LINE_STATUS) & LSR_THR_EMPTY == 0 {
            spins += 1;
            if spins == TX_SPIN_LIMIT {
                return;
            }
            core::hint::spin_loop();
        }
        self.write_reg(DATA, byte);

        // SAFETY: Write-only port, ignored outside QEMU.
        #[cfg(feature = "qemu")]
        unsafe {
            self.bus.write(QEMU_DEBUG_PORT, byte);
        }
    }

    fn write_reg(&mut self, reg: u16, value: u8) {
        // SAFETY: Registers of the UART this value was constructed for.
        unsafe { self.bus.write(self.base + reg, value) }
    }

    fn read_reg(&mut self, reg: u16) -> u8 {
        // SAFETY: As above.
        unsafe { self.bus.read(self.base + reg) }
    }
}

impl<B: PortBus> fmt::Write for Uart16550<B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(b);
        }
        Ok(())
    }
}
