//! On-flash partition table format
//!
//! The reserved table region holds a small versioned header followed by
//! fixed-width records:
//!
//! ```text
//! header (8 bytes):  "PTBL" | version u8 | reserved u8 | count u16le
//! record (28 bytes): name[16] (NUL padded) | offset u32le | len u32le | flags u32le
//! ```
//!
//! An erased (all-0xFF) region fails the magic check, which is how a
//! factory-fresh device falls back to the compiled-in layout.

use crate::error::{Error, Result};

use super::types::{PartFlags, PartitionRecord, PartitionTable, MAX_PARTITIONS, PART_NAME_LEN};

/// Table region magic: "PTBL"
const TABLE_MAGIC: &[u8; 4] = b"PTBL";

/// Highest supported format version
const TABLE_VERSION: u8 = 1;

const HEADER_LEN: usize = 8;
const RECORD_LEN: usize = 28;

/// Decode and validate a partition table from the reserved region
///
/// `capacity` is the device size the decoded records must fit.
pub fn parse_table(raw: &[u8], capacity: u32) -> Result<PartitionTable> {
    if raw.len() < HEADER_LEN || &raw[0..4] != TABLE_MAGIC {
        return Err(Error::PartitionTableInvalid);
    }
    let version = raw[4];
    if version > TABLE_VERSION {
        log::warn!("partition table version {} not supported", version);
        return Err(Error::PartitionTableInvalid);
    }
    let count = u16::from_le_bytes([raw[6], raw[7]]) as usize;
    if count > MAX_PARTITIONS || raw.len() < HEADER_LEN + count * RECORD_LEN {
        return Err(Error::PartitionTableInvalid);
    }

    let mut table = PartitionTable::new();
    for i in 0..count {
        let rec = &raw[HEADER_LEN + i * RECORD_LEN..HEADER_LEN + (i + 1) * RECORD_LEN];

        let name_end = rec[..PART_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PART_NAME_LEN);
        let name = core::str::from_utf8(&rec[..name_end])
            .map_err(|_| Error::PartitionTableInvalid)?;
        if name.is_empty() {
            return Err(Error::PartitionTableInvalid);
        }

        let offset = u32::from_le_bytes([rec[16], rec[17], rec[18], rec[19]]);
        let len = u32::from_le_bytes([rec[20], rec[21], rec[22], rec[23]]);
        let flags = u32::from_le_bytes([rec[24], rec[25], rec[26], rec[27]]);

        table.push(PartitionRecord::new(
            name,
            offset,
            len,
            PartFlags::from_bits_truncate(flags),
        )?)?;
    }

    table.validate(capacity)?;
    Ok(table)
}

/// Encode a table into the on-flash format
///
/// Used by provisioning tooling and the tests; returns the number of
/// bytes written. `buf` must hold the header plus one record per entry.
pub fn encode_table(table: &PartitionTable, buf: &mut [u8]) -> Result<usize> {
    let needed = HEADER_LEN + table.len() * RECORD_LEN;
    if buf.len() < needed {
        return Err(Error::AddressOutOfRange);
    }

    buf[0..4].copy_from_slice(TABLE_MAGIC);
    buf[4] = TABLE_VERSION;
    buf[5] = 0;
    buf[6..8].copy_from_slice(&(table.len() as u16).to_le_bytes());

    for (i, r) in table.records().iter().enumerate() {
        let rec = &mut buf[HEADER_LEN + i * RECORD_LEN..HEADER_LEN + (i + 1) * RECORD_LEN];
        rec[..PART_NAME_LEN].fill(0);
        rec[..r.name.len()].copy_from_slice(r.name.as_bytes());
        rec[16..20].copy_from_slice(&r.offset.to_le_bytes());
        rec[20..24].copy_from_slice(&r.len.to_le_bytes());
        rec[24..28].copy_from_slice(&r.flags.bits().to_le_bytes());
    }
    Ok(needed)
}
