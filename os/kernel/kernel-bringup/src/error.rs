use kernel_acpi::MadtError;
use kernel_image::ImageError;
use kernel_mmap::MemoryMapError;
use kernel_vmem::{MapError, PoolError};

/// A fatal bring-up failure. There is no recovery; the caller reports it and
/// halts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BringUpError {
    #[error("interrupt topology: {0}")]
    Topology(#[from] MadtError),
    #[error("firmware memory map: {0}")]
    MemoryMap(#[from] MemoryMapError),
    #[error("page-table pool: {0}")]
    Pool(#[from] PoolError),
    #[error("address space: {0}")]
    Map(#[from] MapError),
    #[error("kernel image: {0}")]
    Image(#[from] ImageError),
}
