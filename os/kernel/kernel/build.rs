use kernel_info::memory::KERNEL_IMAGE;
use std::env;

fn main() {
    // Only the PE/COFF build is a bootable kernel; host builds just type-check.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "uefi" {
        return;
    }

    let image_base = KERNEL_IMAGE.base.as_u64();
    assert_eq!(
        image_base & ((1u64 << 21) - 1),
        0,
        "KERNEL_IMAGE must be 2 MiB aligned (got {image_base:#x})"
    );

    println!("cargo:rerun-if-changed=build.rs");

    // lld-link: enter through the naked stub and link for the higher half.
    println!("cargo:rustc-link-arg-bins=/ENTRY:_start_kernel");
    println!("cargo:rustc-link-arg-bins=/BASE:{image_base:#x}");
    println!("cargo:rustc-link-arg-bins=/SUBSYSTEM:NATIVE");
    println!("cargo:rustc-link-arg-bins=/DYNAMICBASE:NO");
}
