//! # Architecture Backend
//!
//! The hardware side effects of building and editing an address space,
//! isolated so the builder and the image hardener can run against a fake.

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

pub trait ArchBackend {
    /// Makes the hierarchy rooted at `root` the active one, in a single
    /// register write.
    ///
    /// # Safety
    /// Everything the CPU touches after the switch must be mapped by the new
    /// hierarchy.
    unsafe fn activate_root(&mut self, root: PhysicalAddress);

    /// Drops any cached translation of `va` on the executing processor.
    fn invalidate_translation(&mut self, va: VirtualAddress);

    /// Drops any cached translation of `va` on every processor sharing the
    /// address space.
    ///
    /// Bring-up runs on a single processor, so this defaults to the local
    /// invalidation. A multi-processor kernel overrides it with a shootdown
    /// once secondary processors are running.
    fn invalidate_translation_global(&mut self, va: VirtualAddress) {
        self.invalidate_translation(va);
    }
}

/// [`ArchBackend`] for the executing x86-64 processor.
#[cfg(target_arch = "x86_64")]
#[derive(Debug)]
pub struct X86Backend {
    _private: (),
}

#[cfg(target_arch = "x86_64")]
impl X86Backend {
    /// # Safety
    /// Must only be created while running in ring 0.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "x86_64")]
impl ArchBackend for X86Backend {
    unsafe fn activate_root(&mut self, root: PhysicalAddress) {
        use kernel_registers::StoreRegisterUnsafe;
        use kernel_registers::cr3::Cr3;

        unsafe { Cr3::from_pml4_phys(root).store_unsafe() };
    }

    fn invalidate_translation(&mut self, va: VirtualAddress) {
        // SAFETY: Constructing an `X86Backend` asserts ring 0.
        unsafe { kernel_registers::tlb::invalidate_page(va.as_u64()) };
    }
}
