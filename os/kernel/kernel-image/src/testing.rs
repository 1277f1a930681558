//! Synthetic PE32+ images for tests.

use crate::pe::{
    DosHeader, FileHeader, IMAGE_DOS_SIGNATURE, IMAGE_FILE_MACHINE_AMD64, IMAGE_NT_SIGNATURE,
    SectionCharacteristics, SectionHeader, SectionName,
};
use alloc::vec;
use alloc::vec::Vec;
use core::ptr::write_unaligned;
use kernel_memory_addresses::{PAGE_SIZE, align_up};

const NT_OFFSET: usize = 0x40;
const OPTIONAL_HEADER_SIZE: u16 = 0xF0;
const PE32_PLUS_MAGIC: u16 = 0x20B;
const SIZE_OF_IMAGE_OFFSET: usize = 0x38;

struct Section {
    header: SectionHeader,
    fill: u8,
}

/// Builds an image as it would look once loaded: headers at offset 0 and
/// every section's contents at its RVA.
pub struct ImageBuilder {
    sections: Vec<Section>,
    dos_magic: u16,
    nt_signature: u32,
    size_of_image: Option<usize>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sections: Vec::new(),
            dos_magic: IMAGE_DOS_SIGNATURE,
            nt_signature: IMAGE_NT_SIGNATURE,
            size_of_image: None,
        }
    }

    /// Adds a section at `rva` of `size` bytes, each set to `fill`.
    #[must_use]
    pub fn section(mut self, name: &str, rva: u32, size: u32, characteristics: u32, fill: u8) -> Self {
        self.sections.push(Section {
            header: SectionHeader {
                name: SectionName::new(name),
                virtual_size: size,
                virtual_address: rva,
                size_of_raw_data: u32::try_from(align_up(u64::from(size), 0x200)).unwrap_or(u32::MAX),
                pointer_to_raw_data: rva,
                pointer_to_relocations: 0,
                pointer_to_linenumbers: 0,
                number_of_relocations: 0,
                number_of_linenumbers: 0,
                characteristics: SectionCharacteristics::from_bits(characteristics),
            },
            fill,
        });
        self
    }

    #[must_use]
    pub fn dos_magic(mut self, magic: u16) -> Self {
        self.dos_magic = magic;
        self
    }

    #[must_use]
    pub fn nt_signature(mut self, signature: u32) -> Self {
        self.nt_signature = signature;
        self
    }

    /// Overrides the buffer length; section contents past it are dropped.
    #[must_use]
    pub fn size_of_image(mut self, size: usize) -> Self {
        self.size_of_image = Some(size);
        self
    }

    /// # Panics
    /// If the headers do not fit into the buffer.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let natural = self
            .sections
            .iter()
            .map(|s| u64::from(s.header.virtual_address) + u64::from(s.header.virtual_size))
            .fold(PAGE_SIZE, u64::max);
        let len = self
            .size_of_image
            .unwrap_or(align_up(natural, PAGE_SIZE) as usize);
        let mut image = vec![0u8; len];

        let file_offset = NT_OFFSET + 4;
        let optional_offset = file_offset + size_of::<FileHeader>();
        let table_offset = optional_offset + usize::from(OPTIONAL_HEADER_SIZE);
        assert!(table_offset + self.sections.len() * size_of::<SectionHeader>() <= len);

        let mut dos = DosHeader {
            e_magic: self.dos_magic,
            reserved: [0; 29],
            e_lfanew: NT_OFFSET as u32,
        };
        dos.reserved[0] = 0x90;
        let file = FileHeader {
            machine: IMAGE_FILE_MACHINE_AMD64,
            number_of_sections: u16::try_from(self.sections.len()).unwrap_or(u16::MAX),
            time_date_stamp: 0,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: OPTIONAL_HEADER_SIZE,
            characteristics: 0x0022,
        };

        let base = image.as_mut_ptr();
        // SAFETY: All offsets were bounds checked against `len` above.
        unsafe {
            write_unaligned(base.cast::<DosHeader>(), dos);
            write_unaligned(base.add(NT_OFFSET).cast::<u32>(), self.nt_signature);
            write_unaligned(base.add(file_offset).cast::<FileHeader>(), file);
            write_unaligned(base.add(optional_offset).cast::<u16>(), PE32_PLUS_MAGIC);
            write_unaligned(
                base.add(optional_offset + SIZE_OF_IMAGE_OFFSET).cast::<u32>(),
                len as u32,
            );
            for (i, s) in self.sections.iter().enumerate() {
                let at = table_offset + i * size_of::<SectionHeader>();
                write_unaligned(base.add(at).cast::<SectionHeader>(), s.header);
            }
        }

        for s in &self.sections {
            let start = (s.header.virtual_address as usize).min(len);
            let end = (start + s.header.virtual_size as usize).min(len);
            image[start..end].fill(s.fill);
        }
        image
    }
}
