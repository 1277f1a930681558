//! # High Precision Event Timer
//!
//! Only the main counter is started; no comparator is armed, so the HPET
//! raises no interrupts.

use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

const GENERAL_CAPABILITIES: u64 = 0x00;
const GENERAL_CONFIGURATION: u64 = 0x10;
const MAIN_COUNTER: u64 = 0xF0;

/// General Capabilities and ID Register.
#[bitfield(u64)]
pub struct Capabilities {
    pub revision_id: u8,
    #[bits(5)]
    pub num_timers_minus_one: u8,
    pub count_size_64: bool,
    #[bits(1)]
    __: u8,
    pub legacy_replacement_capable: bool,
    pub vendor_id: u16,
    /// Main counter tick period in femtoseconds.
    pub counter_period_fs: u32,
}

/// General Configuration Register.
#[bitfield(u64)]
pub struct Configuration {
    /// Main counter runs and timer interrupts are allowed.
    pub enable: bool,
    /// Timers 0 and 1 replace the PIT and RTC interrupts.
    pub legacy_replacement: bool,
    #[bits(62)]
    __: u64,
}

/// Starts the main counter from zero and returns its period in femtoseconds.
///
/// # Safety
/// `base` must be the mapped HPET register block.
pub unsafe fn enable(base: VirtualAddress) -> u32 {
    unsafe {
        let caps = Capabilities::from_bits(read(base, GENERAL_CAPABILITIES));

        let config = Configuration::from_bits(read(base, GENERAL_CONFIGURATION));
        write(base, GENERAL_CONFIGURATION, config.with_enable(false).into_bits());
        write(base, MAIN_COUNTER, 0);
        write(
            base,
            GENERAL_CONFIGURATION,
            config
                .with_enable(true)
                .with_legacy_replacement(false)
                .into_bits(),
        );

        caps.counter_period_fs()
    }
}

unsafe fn read(base: VirtualAddress, reg: u64) -> u64 {
    unsafe { (base + reg).as_mut_ptr::<u64>().read_volatile() }
}

unsafe fn write(base: VirtualAddress, reg: u64, value: u64) {
    unsafe { (base + reg).as_mut_ptr::<u64>().write_volatile(value) }
}
