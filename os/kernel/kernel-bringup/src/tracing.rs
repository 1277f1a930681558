use kernel_info::boot::{BootPixelFormat, KernelBootInfo};
use log::info;

pub fn trace_boot_info(boot_info: &KernelBootInfo) {
    info!(
        concat!(
            "Boot Info in Kernel:\n",
            "  MMAP ptr = {mmap_ptr:#018x}, len = {mmap_len}, desc size = {mmap_desc_size}, desc ver = {mmap_desc_ver}\n",
            "  FB ptr   = {fb_ptr:#018x}, size = {fb_size}, width = {fb_width}, height = {fb_height}, stride = {fb_stride}, format = {fb_fmt}\n",
            "  Kernel   = {kernel_base:#018x}, size = {kernel_size}\n",
            "  MADT     = {madt:#018x}, HPET = {hpet:#018x}, legacy input = {legacy}\n",
            "  PT pool  = {pt_base:#018x}, pages = {pt_pages}"
        ),
        mmap_ptr = boot_info.mmap.mmap_ptr,
        mmap_len = boot_info.mmap.mmap_len,
        mmap_desc_size = boot_info.mmap.mmap_desc_size,
        mmap_desc_ver = boot_info.mmap.mmap_desc_version,
        fb_ptr = boot_info.fb.framebuffer_ptr,
        fb_size = boot_info.fb.framebuffer_size,
        fb_width = boot_info.fb.framebuffer_width,
        fb_height = boot_info.fb.framebuffer_height,
        fb_stride = boot_info.fb.framebuffer_stride,
        fb_fmt = match boot_info.fb.framebuffer_format {
            BootPixelFormat::Rgb => "RGB",
            BootPixelFormat::Bgr => "BGR",
            BootPixelFormat::Bitmask => "Bitmask",
            BootPixelFormat::BltOnly => "BltOnly",
        },
        kernel_base = boot_info.kernel.physical_base,
        kernel_size = boot_info.kernel.size,
        madt = boot_info.madt_addr,
        hpet = boot_info.hpet_addr,
        legacy = boot_info.has_legacy_input(),
        pt_base = boot_info.page_tables.physical_base,
        pt_pages = boot_info.page_tables.page_count,
    );
}
