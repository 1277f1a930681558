//! # Kernel Entry Point

#![no_std]
#![no_main]
#![allow(unsafe_code)]

mod framebuffer;
mod hpet;
mod platform;
mod ps2;

use crate::platform::X86Platform;
use core::fmt;
use kernel_bringup::{BringUpContext, bring_up};
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::KERNEL_STACK_SIZE;
use kernel_registers::interrupts;
use kernel_serial::serial_trace;
use kernel_vmem::PhysMapper;
use log::{error, info};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    // Straight to the UART: the logger may be what panicked.
    serial_trace!("\nKERNEL PANIC: {info}\n");
    halt_forever()
}

/// 16-byte aligned stack
#[repr(C, align(16))]
struct Aligned16<const N: usize>([u8; N]);

/// Stack the kernel runs on from [`_start_kernel`] on. Part of the image, so
/// it stays mapped across the root switch.
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned16<KERNEL_STACK_SIZE> = Aligned16([0; KERNEL_STACK_SIZE]);

const _: () = assert!(
    KERNEL_STACK_SIZE.is_multiple_of(16),
    "KERNEL_STACK_SIZE should be 16-byte aligned"
);

/// The kernel entry point
///
/// # UEFI Interaction
/// The UEFI loader will jump here after `ExitBootServices`.
///
/// # ABI
/// The ABI is defined as `win64` since the kernel is called from a UEFI
/// (PE/COFF) application. This passes the `boot_info` pointer as `RCX`.
///
/// # Naked function & Stack
/// This is a naked function in order to set up the stack ourselves. Without
/// the `naked` attribute (and the [`naked_asm`](core::arch::naked_asm) instruction), Rust
/// compiler would apply its own assumptions about the loader's stack, which
/// lives in memory the new address space does not map.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "win64" fn _start_kernel(_boot_info: *const KernelBootInfo) -> ! {
    core::arch::naked_asm!(
        "cli",

        // save RCX (boot_info per Win64)
        "mov r12, rcx",

        // Build our own kernel stack and establish a valid call frame for kernel_entry
        "lea rax, [rip + {stack_sym}]",
        "add rax, {stack_size}",
        // Align down to 16
        "and rax, -16",
        // Set RSP to the prepared value
        "mov rsp, rax",
        // Emulate a CALL by pushing a dummy return address (so RSP % 16 == 8 at entry)
        "push 0",
        "xor rbp, rbp",

        // boot_info into the first SysV argument register
        "mov rdi, r12",

        // Jump to Rust entry and never return
        "jmp {rust_entry}",
        stack_sym = sym BOOT_STACK,
        stack_size = const KERNEL_STACK_SIZE,
        rust_entry = sym kernel_entry,
    );
}

/// Kernel entry running on the boot stack.
///
/// Uses the SysV ABI explicitly; `extern "C"` means `win64` on the UEFI target.
extern "sysv64" fn kernel_entry(boot_info: *const KernelBootInfo) -> ! {
    // SAFETY: The loader passes a valid handoff record that stays intact
    // until bring-up has copied it.
    let boot_info = unsafe { &*boot_info };
    kernel_main(boot_info)
}

fn kernel_main(boot_info: &KernelBootInfo) -> ! {
    // SAFETY: We are in ring 0 on the bootstrap processor.
    let mut platform = unsafe { X86Platform::new() };

    // SAFETY: Single call on the bootstrap processor, interrupts masked by
    // `_start_kernel`, handoff record untouched so far.
    match unsafe { bring_up(&mut platform, boot_info) } {
        Ok(context) => idle(&context),
        Err(e) => fatal(format_args!("bring-up failed: {e}")),
    }
}

fn idle<M: PhysMapper>(context: &BringUpContext<M>) -> ! {
    info!(
        "Idle. {} processor(s), {} page-table pages in use",
        context.topology.processors().len(),
        context.address_space.pool().allocated()
    );
    loop {
        // SAFETY: Ring 0; wakes on the next interrupt.
        unsafe { interrupts::halt() };
    }
}

/// Reports an unrecoverable condition and stops the processor.
fn fatal(reason: fmt::Arguments) -> ! {
    error!("{reason}");
    error!("System halted.");
    halt_forever()
}

fn halt_forever() -> ! {
    loop {
        // SAFETY: Ring 0. With interrupts masked, `hlt` only returns for NMIs.
        unsafe {
            interrupts::disable();
            interrupts::halt();
        }
    }
}
