//! Four-level walks over pool-owned tables.

use crate::pool::{PagePool, PoolState, TableNode};
use crate::{MapError, PageEntryBits, PageTableLevel, PhysMapper, TableIndex};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Follows the non-leaf entry `entry` found at `level` while walking `va`.
fn follow<M: PhysMapper, S: PoolState>(
    pool: &PagePool<M, S>,
    va: VirtualAddress,
    level: PageTableLevel,
    entry: PageEntryBits,
) -> Result<TableNode, MapError> {
    if entry.large_page() {
        return Err(MapError::LargePage { va, level });
    }
    let address = entry.physical_address();
    pool.node_at(address)
        .ok_or(MapError::ForeignTable { va, address })
}

/// The PT node and slot holding the leaf for `va`, without creating anything.
pub fn find_leaf<M: PhysMapper, S: PoolState>(
    pool: &PagePool<M, S>,
    va: VirtualAddress,
) -> Result<(TableNode, TableIndex), MapError> {
    let mut node = pool.root();
    for level in PageTableLevel::NON_LEAF {
        let entry = pool.table(node).get(TableIndex::of(va, level));
        if !entry.present() {
            return Err(MapError::NotMapped { va, level });
        }
        node = follow(pool, va, level, entry)?;
    }
    Ok((node, TableIndex::of(va, PageTableLevel::Pt)))
}

/// The PT node and slot for `va`, allocating missing tables from the pool.
fn ensure_leaf<M: PhysMapper, S: PoolState>(
    pool: &mut PagePool<M, S>,
    va: VirtualAddress,
) -> Result<(TableNode, TableIndex), MapError> {
    let mut node = pool.root();
    for level in PageTableLevel::NON_LEAF {
        let index = TableIndex::of(va, level);
        let entry = pool.table(node).get(index);
        node = if entry.present() {
            follow(pool, va, level, entry)?
        } else {
            let child = pool.take_page()?;
            let link = PageEntryBits::table_link(pool.node_address(child));
            pool.table_mut(node).set(index, link);
            child
        };
    }
    Ok((node, TableIndex::of(va, PageTableLevel::Pt)))
}

/// Writes a present leaf `va -> pa` with `flags`.
pub fn map_leaf<M: PhysMapper, S: PoolState>(
    pool: &mut PagePool<M, S>,
    va: VirtualAddress,
    pa: PhysicalAddress,
    flags: PageEntryBits,
) -> Result<(), MapError> {
    let (node, index) = ensure_leaf(pool, va)?;
    let leaf = flags
        .with_present(true)
        .with_large_page(false)
        .with_physical_address(pa);
    pool.table_mut(node).set(index, leaf);
    Ok(())
}
