use crate::SectionName;
use kernel_vmem::MapError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ImageError {
    #[error("image truncated: {needed} bytes needed at offset {offset:#x}")]
    Truncated { offset: usize, needed: usize },

    #[error("bad DOS signature {found:#06x}")]
    BadDosSignature { found: u16 },

    #[error("bad PE signature {found:#010x}")]
    BadNtSignature { found: u32 },

    #[error("section {name} ({rva:#x}+{size:#x}) lies outside the image")]
    SectionOutOfBounds {
        name: SectionName,
        rva: u32,
        size: u32,
    },

    #[error("hardening touched unmapped memory: {0}")]
    Unmapped(#[from] MapError),
}
