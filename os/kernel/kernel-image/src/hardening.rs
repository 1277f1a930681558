//! # Image Hardening
//!
//! Runs once, after the kernel address space has been activated. Sections
//! are processed in table order:
//!
//! | Discardable | Writable | Action |
//! |-------------|----------|--------|
//! | yes         | any      | zero-fill the loaded extent |
//! | no          | no       | clear `RW` on every covered page, invalidate each |
//! | no          | yes      | none |
//!
//! Permissions are per page: a read-only section sharing a page with a
//! writable one makes that page read-only. Linkers align sections to pages,
//! so this only matters for hand-crafted images.
//!
//! Clearing `RW` only binds ring 0 once `CR0.WP` is set.

use crate::{ImageError, LoadedImage, PeHeaders, SectionHeader};
use kernel_memory_addresses::{PAGE_SIZE, pages_for};
use kernel_vmem::{AddressSpace, ArchBackend, PhysMapper};
use log::{debug, info};

/// What a hardening pass did.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct HardeningReport {
    /// Sections in the image.
    pub sections: u16,
    pub zeroed_sections: u16,
    pub zeroed_bytes: u64,
    /// Read-only sections with at least one page changed by this pass.
    pub protected_sections: u16,
    /// Leaf entries whose writable bit this pass cleared.
    pub protected_pages: u64,
}

/// Zeroes discardable sections and write-protects read-only ones.
///
/// Every leaf entry edit is followed by an invalidation of that single
/// translation before the next page is touched. Entries that are already
/// read-only are neither written nor invalidated, so a second pass reports no
/// protected pages.
///
/// # Errors
/// - [`ImageError::BadDosSignature`]/[`ImageError::BadNtSignature`]/[`ImageError::Truncated`]
///   if the headers do not validate; nothing is modified in that case.
/// - [`ImageError::SectionOutOfBounds`] for a section extending past the
///   image; earlier sections have already been processed.
/// - [`ImageError::Unmapped`] if a read-only section covers a page that is
///   not mapped.
pub fn harden_image<M, A>(
    image: &mut LoadedImage,
    space: &mut AddressSpace<M>,
    arch: &mut A,
) -> Result<HardeningReport, ImageError>
where
    M: PhysMapper,
    A: ArchBackend,
{
    let headers = PeHeaders::parse(image.bytes())?;
    let mut report = HardeningReport {
        sections: headers.section_count(),
        ..HardeningReport::default()
    };

    for index in 0..headers.section_count() {
        let section = headers.section(image.bytes(), index)?;
        let (start, size) = section_extent(image, &section)?;
        if size == 0 {
            continue;
        }

        let characteristics = section.characteristics;
        if characteristics.mem_discardable() {
            image.bytes_mut()[start..start + size].fill(0);
            report.zeroed_sections += 1;
            report.zeroed_bytes += size as u64;
            info!(
                "Zeroed discardable section {} at {} ({size} bytes)",
                section.name,
                image.base() + start as u64
            );
        } else if !characteristics.mem_write() {
            let first = image.base() + start as u64;
            let pages = pages_for(first.page_offset() + size as u64);
            let mut changed = 0;

            for page in 0..pages {
                let va = first.page_base() + page * PAGE_SIZE;
                let pte = space.get_present_pte(va)?;
                if pte.writable() {
                    pte.set_writable(false);
                    arch.invalidate_translation(va);
                    changed += 1;
                }
            }

            if changed > 0 {
                report.protected_sections += 1;
                report.protected_pages += changed;
            }
            info!(
                "Write-protected section {} at {first} ({pages} pages, {changed} changed)",
                section.name
            );
        } else {
            debug!("Leaving writable section {} untouched", section.name);
        }
    }

    Ok(report)
}

/// Byte range of `section` within `image`, checked against the image size.
fn section_extent(
    image: &LoadedImage,
    section: &SectionHeader,
) -> Result<(usize, usize), ImageError> {
    let rva = section.virtual_address;
    let size = section.loaded_size();
    let out_of_bounds = ImageError::SectionOutOfBounds {
        name: section.name,
        rva,
        size,
    };

    let start = rva as usize;
    let end = start.checked_add(size as usize).ok_or(out_of_bounds)?;
    if end > image.len() {
        return Err(out_of_bounds);
    }
    Ok((start, size as usize))
}
