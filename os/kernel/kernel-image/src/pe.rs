//! # PE32+ Header Parsing
//!
//! Just enough of the Portable Executable layout to walk the section table:
//!
//! ```text
//! 0x00        DOS header    e_magic = "MZ", e_lfanew at 0x3C
//! e_lfanew    "PE\0\0"      NT signature
//! +4          file header   20 bytes, NumberOfSections, SizeOfOptionalHeader
//! +24         optional hdr  skipped
//! +24+opt     section table NumberOfSections × 40 bytes
//! ```
//!
//! Parsing copies headers out with `read_unaligned` and only keeps offsets,
//! so the image may be modified between section reads.

use crate::ImageError;
use bitfield_struct::bitfield;
use core::fmt;
use core::ptr::read_unaligned;

pub const IMAGE_DOS_SIGNATURE: u16 = 0x5A4D; // "MZ"
pub const IMAGE_NT_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,
    pub reserved: [u16; 29],
    pub e_lfanew: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct FileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct SectionHeader {
    pub name: SectionName,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: SectionCharacteristics,
}

const _: () = {
    assert!(size_of::<DosHeader>() == 64);
    assert!(size_of::<FileHeader>() == 20);
    assert!(size_of::<SectionHeader>() == 40);
};

impl SectionHeader {
    /// Bytes the section occupies once loaded.
    ///
    /// `VirtualSize` when the linker filled it in, the raw size otherwise.
    #[must_use]
    pub const fn loaded_size(&self) -> u32 {
        if self.virtual_size != 0 {
            self.virtual_size
        } else {
            self.size_of_raw_data
        }
    }
}

/// Fixed-width, NUL-padded section name.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, Default)]
pub struct SectionName(pub [u8; 8]);

impl SectionName {
    /// Builds a name from up to eight bytes of `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; 8];
        let len = name.len().min(8);
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self(bytes)
    }

    /// The name up to the first NUL; `"?"` if it is not UTF-8.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        core::str::from_utf8(&self.0[..len]).unwrap_or("?")
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// `IMAGE_SECTION_HEADER.Characteristics`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct SectionCharacteristics {
    #[bits(5)]
    _reserved0: u8,
    /// `IMAGE_SCN_CNT_CODE` (0x20).
    pub cnt_code: bool,
    /// `IMAGE_SCN_CNT_INITIALIZED_DATA` (0x40).
    pub cnt_initialized_data: bool,
    /// `IMAGE_SCN_CNT_UNINITIALIZED_DATA` (0x80).
    pub cnt_uninitialized_data: bool,
    pub lnk_other: bool,
    pub lnk_info: bool,
    _reserved1: bool,
    pub lnk_remove: bool,
    pub lnk_comdat: bool,
    #[bits(2)]
    _reserved2: u8,
    pub gprel: bool,
    _reserved3: bool,
    pub mem_purgeable: bool,
    pub mem_locked: bool,
    pub mem_preload: bool,
    /// `IMAGE_SCN_ALIGN_*`, object files only.
    #[bits(4)]
    pub align: u8,
    pub lnk_nreloc_ovfl: bool,
    /// `IMAGE_SCN_MEM_DISCARDABLE` (0x0200_0000).
    pub mem_discardable: bool,
    pub mem_not_cached: bool,
    pub mem_not_paged: bool,
    pub mem_shared: bool,
    /// `IMAGE_SCN_MEM_EXECUTE` (0x2000_0000).
    pub mem_execute: bool,
    /// `IMAGE_SCN_MEM_READ` (0x4000_0000).
    pub mem_read: bool,
    /// `IMAGE_SCN_MEM_WRITE` (0x8000_0000).
    pub mem_write: bool,
}

/// Location of the section table within a validated image.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PeHeaders {
    section_table: usize,
    section_count: u16,
}

fn read_at<T: Copy>(bytes: &[u8], offset: usize) -> Result<T, ImageError> {
    let needed = size_of::<T>();
    let end = offset.checked_add(needed).ok_or(ImageError::Truncated { offset, needed })?;
    if end > bytes.len() {
        return Err(ImageError::Truncated { offset, needed });
    }
    // SAFETY: Bounds checked above; headers are plain data read unaligned.
    Ok(unsafe { read_unaligned(bytes.as_ptr().add(offset).cast::<T>()) })
}

impl PeHeaders {
    /// Validates both signatures and locates the section table.
    ///
    /// # Errors
    /// - [`ImageError::BadDosSignature`] / [`ImageError::BadNtSignature`] for a
    ///   wrong magic value.
    /// - [`ImageError::Truncated`] if any header or the section table does not
    ///   fit into `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        let dos: DosHeader = read_at(bytes, 0)?;
        if dos.e_magic != IMAGE_DOS_SIGNATURE {
            return Err(ImageError::BadDosSignature { found: dos.e_magic });
        }

        let nt = dos.e_lfanew as usize;
        let signature: u32 = read_at(bytes, nt)?;
        if signature != IMAGE_NT_SIGNATURE {
            return Err(ImageError::BadNtSignature { found: signature });
        }

        let file_offset = nt + size_of::<u32>();
        let file: FileHeader = read_at(bytes, file_offset)?;
        let section_table =
            file_offset + size_of::<FileHeader>() + usize::from(file.size_of_optional_header);

        let table_len = usize::from(file.number_of_sections) * size_of::<SectionHeader>();
        if section_table + table_len > bytes.len() {
            return Err(ImageError::Truncated {
                offset: section_table,
                needed: table_len,
            });
        }

        Ok(Self {
            section_table,
            section_count: file.number_of_sections,
        })
    }

    #[inline]
    #[must_use]
    pub const fn section_count(&self) -> u16 {
        self.section_count
    }

    /// Copies out section `index`.
    ///
    /// # Errors
    /// [`ImageError::Truncated`] if `bytes` is not the image `self` was parsed
    /// from and is too short.
    pub fn section(&self, bytes: &[u8], index: u16) -> Result<SectionHeader, ImageError> {
        read_at(
            bytes,
            self.section_table + usize::from(index) * size_of::<SectionHeader>(),
        )
    }

    /// All sections, in table order.
    pub fn sections<'a>(&self, bytes: &'a [u8]) -> impl Iterator<Item = SectionHeader> + 'a {
        let headers = *self;
        (0..self.section_count).filter_map(move |i| headers.section(bytes, i).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ImageBuilder;

    #[test]
    fn characteristics_bits() {
        let text = SectionCharacteristics::from_bits(0x6000_0020);
        assert!(text.cnt_code() && text.mem_execute() && text.mem_read());
        assert!(!text.mem_write() && !text.mem_discardable());

        let reloc = SectionCharacteristics::from_bits(0x4200_0040);
        assert!(reloc.mem_discardable() && reloc.cnt_initialized_data());

        let data = SectionCharacteristics::new()
            .with_cnt_initialized_data(true)
            .with_mem_read(true)
            .with_mem_write(true);
        assert_eq!(data.into_bits(), 0xC000_0040);
    }

    #[test]
    fn names_are_nul_trimmed() {
        assert_eq!(SectionName(*b".text\0\0\0").as_str(), ".text");
        assert_eq!(SectionName(*b".rdata$z").as_str(), ".rdata$z");
        assert_eq!(SectionName::new(".reloc").to_string(), ".reloc");
        assert_eq!(SectionName([0xFF; 8]).as_str(), "?");
    }

    #[test]
    fn walks_the_section_table() {
        let image = ImageBuilder::new()
            .section(".text", 0x1000, 0x1800, 0x6000_0020, 0x90)
            .section(".data", 0x3000, 0x1000, 0xC000_0040, 0)
            .build();

        let headers = PeHeaders::parse(&image).unwrap();
        assert_eq!(headers.section_count(), 2);

        let names: Vec<_> = headers
            .sections(&image)
            .map(|s| (s.name.to_string(), s.virtual_address, s.loaded_size()))
            .collect();
        assert_eq!(
            names,
            [
                (".text".to_string(), 0x1000, 0x1800),
                (".data".to_string(), 0x3000, 0x1000)
            ]
        );
    }

    #[test]
    fn rejects_bad_signatures() {
        let image = ImageBuilder::new().dos_magic(0x4D5A).build();
        assert_eq!(
            PeHeaders::parse(&image),
            Err(ImageError::BadDosSignature { found: 0x4D5A })
        );

        let image = ImageBuilder::new().nt_signature(0x0000_454E).build();
        assert_eq!(
            PeHeaders::parse(&image),
            Err(ImageError::BadNtSignature { found: 0x0000_454E })
        );
    }

    #[test]
    fn rejects_truncated_images() {
        assert!(matches!(
            PeHeaders::parse(&[0x4D, 0x5A]),
            Err(ImageError::Truncated { offset: 0, .. })
        ));

        let image = ImageBuilder::new()
            .section(".text", 0x1000, 0x1000, 0x6000_0020, 0)
            .build();
        let headers = PeHeaders::parse(&image).unwrap();
        assert!(matches!(
            PeHeaders::parse(&image[..headers.section_table + 20]),
            Err(ImageError::Truncated { .. })
        ));
    }
}
