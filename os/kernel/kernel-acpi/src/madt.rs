//! # MADT (Multiple APIC Description Table)
//!
//! Parses the interrupt-controller structures the kernel needs before it can
//! program any interrupt hardware: the local APIC register block (possibly
//! overridden to a 64-bit address), the first I/O APIC, and the APIC IDs of
//! all enabled processors.

use crate::{PhysMapRo, sum};
use kernel_memory_addresses::PhysicalAddress;
use log::{debug, trace, warn};

/// Four-byte table signature of the MADT.
pub const MADT_SIGNATURE: [u8; 4] = *b"APIC";

/// Size of the common ACPI system description table header.
const SDT_HEADER_LEN: usize = 36;

/// Offset of the first interrupt controller structure.
const ENTRIES_OFFSET: usize = SDT_HEADER_LEN + 8;

/// Upper bound of processors recorded in [`CpuTopology`].
pub const MAX_PROCESSORS: usize = 64;

const ENTRY_LOCAL_APIC: u8 = 0;
const ENTRY_IO_APIC: u8 = 1;
const ENTRY_LOCAL_APIC_OVERRIDE: u8 = 5;

/// Local APIC flag: processor is enabled.
const LAPIC_ENABLED: u32 = 1 << 0;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MadtError {
    #[error("MADT address is null")]
    Missing,
    #[error("MADT truncated: {needed} bytes needed at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("unexpected table signature {found:?}")]
    BadSignature { found: [u8; 4] },
    #[error("MADT checksum mismatch (sum {sum:#04x})")]
    BadChecksum { sum: u8 },
    #[error("MADT lists no I/O APIC")]
    NoIoApic,
}

/// Interrupt topology extracted from the MADT.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CpuTopology {
    /// Physical base of the local APIC register block.
    pub local_apic: PhysicalAddress,
    /// Physical base of the first I/O APIC.
    pub io_apic: PhysicalAddress,
    /// First global system interrupt served by [`CpuTopology::io_apic`].
    pub io_apic_gsi_base: u32,
    apic_ids: [u8; MAX_PROCESSORS],
    processor_count: usize,
}

impl CpuTopology {
    /// Validates and parses the MADT at `madt_addr`.
    ///
    /// # Errors
    /// See [`MadtError`]. Entries of unknown type are skipped.
    ///
    /// # Safety
    /// `map` must produce valid slices for the physical table at `madt_addr`.
    pub unsafe fn parse(map: &impl PhysMapRo, madt_addr: u64) -> Result<Self, MadtError> {
        if madt_addr == 0 {
            return Err(MadtError::Missing);
        }

        // SAFETY: Caller guarantees the mapping; first read the header to learn the length.
        let header = unsafe { map.map_ro(madt_addr, SDT_HEADER_LEN) };
        let length = read_u32(header, 4)? as usize;
        if length < ENTRIES_OFFSET {
            return Err(MadtError::Truncated {
                offset: 0,
                needed: ENTRIES_OFFSET,
            });
        }

        // SAFETY: As above, now for the declared table length.
        let table = unsafe { map.map_ro(madt_addr, length) };
        Self::from_bytes(table)
    }

    /// Parses an already mapped MADT.
    ///
    /// # Errors
    /// See [`MadtError`].
    pub fn from_bytes(table: &[u8]) -> Result<Self, MadtError> {
        let signature = read_array::<4>(table, 0)?;
        if signature != MADT_SIGNATURE {
            return Err(MadtError::BadSignature { found: signature });
        }

        let length = read_u32(table, 4)? as usize;
        let table = table.get(..length).ok_or(MadtError::Truncated {
            offset: 0,
            needed: length,
        })?;

        let checksum = sum(table);
        if checksum != 0 {
            return Err(MadtError::BadChecksum { sum: checksum });
        }

        let mut local_apic = u64::from(read_u32(table, SDT_HEADER_LEN)?);
        let mut io_apic = None;
        let mut apic_ids = [0u8; MAX_PROCESSORS];
        let mut processor_count = 0;

        let mut offset = ENTRIES_OFFSET;
        while offset < table.len() {
            let [kind, len] = read_array::<2>(table, offset)?;
            let len = usize::from(len);
            if len < 2 {
                return Err(MadtError::Truncated { offset, needed: 2 });
            }
            let entry = table.get(offset..offset + len).ok_or(MadtError::Truncated {
                offset,
                needed: len,
            })?;

            match kind {
                ENTRY_LOCAL_APIC => {
                    let apic_id = read_array::<1>(entry, 3)?[0];
                    let flags = read_u32(entry, 4)?;
                    if flags & LAPIC_ENABLED == 0 {
                        trace!("MADT: processor with APIC ID {apic_id} disabled");
                    } else if processor_count < MAX_PROCESSORS {
                        apic_ids[processor_count] = apic_id;
                        processor_count += 1;
                    } else {
                        warn!("MADT: ignoring processor with APIC ID {apic_id}");
                    }
                }
                ENTRY_IO_APIC if io_apic.is_none() => {
                    let address = read_u32(entry, 4)?;
                    let gsi_base = read_u32(entry, 8)?;
                    io_apic = Some((u64::from(address), gsi_base));
                }
                ENTRY_LOCAL_APIC_OVERRIDE => {
                    local_apic = read_u64(entry, 4)?;
                }
                _ => {}
            }

            offset += len;
        }

        let (io_apic, io_apic_gsi_base) = io_apic.ok_or(MadtError::NoIoApic)?;
        let topology = Self {
            local_apic: PhysicalAddress::new(local_apic),
            io_apic: PhysicalAddress::new(io_apic),
            io_apic_gsi_base,
            apic_ids,
            processor_count,
        };

        debug!(
            "MADT: LAPIC at {}, I/O APIC at {} (GSI base {}), {} processor(s)",
            topology.local_apic,
            topology.io_apic,
            topology.io_apic_gsi_base,
            topology.processor_count
        );
        Ok(topology)
    }

    /// APIC IDs of the enabled processors, in table order.
    #[must_use]
    pub fn processors(&self) -> &[u8] {
        &self.apic_ids[..self.processor_count]
    }
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], MadtError> {
    bytes
        .get(offset..offset + N)
        .and_then(|b| b.try_into().ok())
        .ok_or(MadtError::Truncated { offset, needed: N })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, MadtError> {
    read_array(bytes, offset).map(u32::from_le_bytes)
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, MadtError> {
    read_array(bytes, offset).map(u64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves a byte buffer as "physical memory" starting at address 0.
    struct BufferMap<'b>(&'b [u8]);

    impl PhysMapRo for BufferMap<'_> {
        unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8] {
            let start = paddr as usize;
            let slice = &self.0[start..start + len];
            unsafe { core::slice::from_raw_parts(slice.as_ptr(), slice.len()) }
        }
    }

    fn madt(entries: &[&[u8]]) -> Vec<u8> {
        let mut t = Vec::new();
        t.extend_from_slice(b"APIC");
        t.extend_from_slice(&0u32.to_le_bytes()); // length, patched below
        t.push(4); // revision
        t.push(0); // checksum, patched below
        t.extend_from_slice(b"OEMID ");
        t.extend_from_slice(b"TABLEID ");
        t.extend_from_slice(&[0; 12]);
        t.extend_from_slice(&0xFEE0_0000u32.to_le_bytes());
        t.extend_from_slice(&1u32.to_le_bytes());
        for e in entries {
            t.extend_from_slice(e);
        }
        let len = u32::try_from(t.len()).unwrap();
        t[4..8].copy_from_slice(&len.to_le_bytes());
        t[9] = 0u8.wrapping_sub(sum(&t));
        t
    }

    fn lapic(apic_id: u8, flags: u32) -> Vec<u8> {
        let mut e = vec![ENTRY_LOCAL_APIC, 8, apic_id, apic_id];
        e.extend_from_slice(&flags.to_le_bytes());
        e
    }

    fn ioapic(address: u32, gsi: u32) -> Vec<u8> {
        let mut e = vec![ENTRY_IO_APIC, 12, 0, 0];
        e.extend_from_slice(&address.to_le_bytes());
        e.extend_from_slice(&gsi.to_le_bytes());
        e
    }

    #[test]
    fn parses_processors_and_io_apic() {
        let table = madt(&[
            &lapic(0, 1),
            &lapic(1, 0),
            &lapic(2, 1),
            &ioapic(0xFEC0_0000, 0),
            &[9, 4, 0, 0], // unknown entry type
        ]);
        let topo = unsafe { CpuTopology::parse(&BufferMap(&table), 0) };
        // Address 0 is treated as "no table".
        assert_eq!(topo, Err(MadtError::Missing));

        let mut memory = vec![0u8; 0x100];
        memory.extend_from_slice(&table);
        let topo = unsafe { CpuTopology::parse(&BufferMap(&memory), 0x100) }.unwrap();
        assert_eq!(topo.local_apic.as_u64(), 0xFEE0_0000);
        assert_eq!(topo.io_apic.as_u64(), 0xFEC0_0000);
        assert_eq!(topo.io_apic_gsi_base, 0);
        assert_eq!(topo.processors(), &[0, 2]);
    }

    #[test]
    fn local_apic_override_wins() {
        let mut ovr = vec![ENTRY_LOCAL_APIC_OVERRIDE, 12, 0, 0];
        ovr.extend_from_slice(&0x1_FEE0_0000u64.to_le_bytes());
        let table = madt(&[&ioapic(0xFEC0_0000, 0), &ovr]);
        let topo = CpuTopology::from_bytes(&table).unwrap();
        assert_eq!(topo.local_apic.as_u64(), 0x1_FEE0_0000);
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut table = madt(&[&ioapic(0xFEC0_0000, 0)]);
        table[0..4].copy_from_slice(b"FACP");
        assert_eq!(
            CpuTopology::from_bytes(&table),
            Err(MadtError::BadSignature { found: *b"FACP" })
        );
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut table = madt(&[&ioapic(0xFEC0_0000, 0)]);
        table[9] = table[9].wrapping_add(1);
        assert!(matches!(
            CpuTopology::from_bytes(&table),
            Err(MadtError::BadChecksum { .. })
        ));
    }

    #[test]
    fn requires_an_io_apic() {
        let table = madt(&[&lapic(0, 1)]);
        assert_eq!(CpuTopology::from_bytes(&table), Err(MadtError::NoIoApic));
    }

    #[test]
    fn zero_length_entry_is_an_error() {
        let table = madt(&[&[ENTRY_LOCAL_APIC, 0]]);
        assert!(matches!(
            CpuTopology::from_bytes(&table),
            Err(MadtError::Truncated { offset: ENTRIES_OFFSET, .. })
        ));
    }

    #[test]
    fn entry_past_table_end_is_an_error() {
        let table = madt(&[&[ENTRY_IO_APIC, 12, 0, 0]]);
        assert!(matches!(
            CpuTopology::from_bytes(&table),
            Err(MadtError::Truncated { .. })
        ));
    }
}
