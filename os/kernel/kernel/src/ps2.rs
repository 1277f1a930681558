//! # i8042 PS/2 Controller

use kernel_registers::port::{inb, outb};

const DATA: u16 = 0x60;
const STATUS_COMMAND: u16 = 0x64;

const STATUS_OUTPUT_FULL: u8 = 1 << 0;
const STATUS_INPUT_FULL: u8 = 1 << 1;

const CMD_ENABLE_FIRST_PORT: u8 = 0xAE;

/// Upper bound for draining stale output; the controller buffers 16 bytes at most.
const DRAIN_LIMIT: usize = 64;
const SPIN_LIMIT: u32 = 100_000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Ps2Error {
    #[error("controller did not accept a command")]
    Timeout,
    #[error("output buffer does not drain")]
    Stuck,
}

/// Drains stale bytes and enables the first (keyboard) port.
///
/// Returns the number of bytes drained.
///
/// # Safety
/// Ring 0, and an i8042 must be present.
pub unsafe fn init() -> Result<usize, Ps2Error> {
    unsafe {
        let mut drained = 0;
        while inb(STATUS_COMMAND) & STATUS_OUTPUT_FULL != 0 {
            if drained == DRAIN_LIMIT {
                return Err(Ps2Error::Stuck);
            }
            let _ = inb(DATA);
            drained += 1;
        }

        let mut spins = 0;
        while inb(STATUS_COMMAND) & STATUS_INPUT_FULL != 0 {
            spins += 1;
            if spins == SPIN_LIMIT {
                return Err(Ps2Error::Timeout);
            }
            core::hint::spin_loop();
        }
        outb(STATUS_COMMAND, CMD_ENABLE_FIRST_PORT);

        Ok(drained)
    }
}
