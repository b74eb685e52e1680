//! Partition record and table types

use bitflags::bitflags;
use heapless::{String, Vec};

use crate::error::{Error, Result};

/// Maximum number of partition records in a table
pub const MAX_PARTITIONS: usize = 12;

/// Maximum partition name length in bytes
pub const PART_NAME_LEN: usize = 16;

bitflags! {
    /// Per-partition flag bitfield (bit 0 = transparent encryption)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PartFlags: u32 {
        /// Contents are encrypted at rest with the device unit cipher
        const ENCRYPTED = 1 << 0;
    }
}

/// A named, bounded sub-region of the flash address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRecord {
    /// Symbolic name
    pub name: String<PART_NAME_LEN>,
    /// Absolute start offset in flash
    pub offset: u32,
    /// Length in bytes
    pub len: u32,
    /// Flag bitfield
    pub flags: PartFlags,
}

impl PartitionRecord {
    /// Create a record; names longer than [`PART_NAME_LEN`] are rejected
    pub fn new(name: &str, offset: u32, len: u32, flags: PartFlags) -> Result<Self> {
        Ok(Self {
            name: String::try_from(name).map_err(|_| Error::PartitionTableInvalid)?,
            offset,
            len,
            flags,
        })
    }

    /// End offset (exclusive), widened to avoid overflow
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.len as u64
    }

    /// Whether this record overlaps another
    pub fn overlaps(&self, other: &PartitionRecord) -> bool {
        (self.offset as u64) < other.end() && (other.offset as u64) < self.end()
    }

    /// Whether the partition carries the encryption flag
    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(PartFlags::ENCRYPTED)
    }
}

/// The partition table: a bounded, immutable-after-init list of records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    records: Vec<PartitionRecord, MAX_PARTITIONS>,
}

impl PartitionTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// The compiled-in layout for this SoC family
    ///
    /// Offsets are fixed by the boot ROM and OTA tooling; `sys_cfg`
    /// holds device settings and is the encrypted partition class.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        let entries: &[(&str, u32, u32, PartFlags)] = &[
            ("bootloader", 0x0000_0000, 0x1_1000, PartFlags::empty()),
            ("ptable", super::PARTITION_TABLE_OFFSET, super::PARTITION_TABLE_LEN, PartFlags::empty()),
            ("sys_net", 0x0001_3000, 0x2000, PartFlags::empty()),
            ("sys_cfg", 0x0001_5000, 0x8000, PartFlags::ENCRYPTED),
            ("app", 0x0001_D000, 0x9_0000, PartFlags::empty()),
            ("user", 0x000A_D000, 0x4_0000, PartFlags::empty()),
        ];
        for &(name, offset, len, flags) in entries {
            // Entries are static and within MAX_PARTITIONS
            let record = PartitionRecord::new(name, offset, len, flags).unwrap_or_else(|_| {
                unreachable!()
            });
            let _ = table.records.push(record);
        }
        table
    }

    /// Append a record (validation happens in [`PartitionTable::validate`])
    pub fn push(&mut self, record: PartitionRecord) -> Result<()> {
        self.records
            .push(record)
            .map_err(|_| Error::PartitionTableInvalid)
    }

    /// All records
    pub fn records(&self) -> &[PartitionRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by name
    pub fn resolve(&self, name: &str) -> Option<&PartitionRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// `(start, length)` of a partition
    pub fn get_info(&self, name: &str) -> Result<(u32, u32)> {
        self.resolve(name)
            .map(|r| (r.offset, r.len))
            .ok_or(Error::PartitionNotFound)
    }

    /// Check the table against the device capacity
    ///
    /// Every record must fit the device; records must not overlap or
    /// share a name. A failed check poisons the whole table - callers
    /// fall back to [`PartitionTable::builtin`].
    pub fn validate(&self, capacity: u32) -> Result<()> {
        for r in &self.records {
            if r.len == 0 || r.end() > capacity as u64 {
                log::warn!("partition '{}' outside device bounds", r.name.as_str());
                return Err(Error::PartitionTableInvalid);
            }
        }
        for (i, a) in self.records.iter().enumerate() {
            for b in self.records.iter().skip(i + 1) {
                if a.overlaps(b) {
                    log::warn!(
                        "partitions '{}' and '{}' overlap",
                        a.name.as_str(),
                        b.name.as_str()
                    );
                    return Err(Error::PartitionTableInvalid);
                }
                if a.name == b.name {
                    log::warn!("duplicate partition name '{}'", a.name.as_str());
                    return Err(Error::PartitionTableInvalid);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_layout_is_valid() {
        let table = PartitionTable::builtin();
        table.validate(0x10_0000).unwrap();
        assert_eq!(table.get_info("sys_net"), Ok((0x1_3000, 0x2000)));
        assert!(table.resolve("sys_cfg").unwrap().is_encrypted());
        assert!(!table.resolve("user").unwrap().is_encrypted());
    }

    #[test]
    fn unknown_partition() {
        let table = PartitionTable::builtin();
        assert_eq!(table.get_info("nvram"), Err(Error::PartitionNotFound));
    }

    #[test]
    fn overlap_rejected() {
        let mut table = PartitionTable::new();
        table
            .push(PartitionRecord::new("a", 0x1000, 0x2000, PartFlags::empty()).unwrap())
            .unwrap();
        table
            .push(PartitionRecord::new("b", 0x2000, 0x1000, PartFlags::empty()).unwrap())
            .unwrap();
        assert_eq!(table.validate(0x10_0000), Err(Error::PartitionTableInvalid));
    }

    #[test]
    fn out_of_bounds_rejected() {
        let mut table = PartitionTable::new();
        table
            .push(PartitionRecord::new("big", 0x1000, 0x10_0000, PartFlags::empty()).unwrap())
            .unwrap();
        assert_eq!(table.validate(0x10_0000), Err(Error::PartitionTableInvalid));
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut table = PartitionTable::new();
        table
            .push(PartitionRecord::new("x", 0x1000, 0x1000, PartFlags::empty()).unwrap())
            .unwrap();
        table
            .push(PartitionRecord::new("x", 0x3000, 0x1000, PartFlags::empty()).unwrap())
            .unwrap();
        assert_eq!(table.validate(0x10_0000), Err(Error::PartitionTableInvalid));
    }
}
