//! Logical partitions on top of the flash address space
//!
//! A partition is a named, bounded sub-region of flash. The table either
//! comes compiled in ([`PartitionTable::builtin`]) or is decoded from a
//! reserved region of flash whose own location is a compile-time
//! constant - that constant breaks the bootstrap circularity of storing
//! the table on the medium it describes.

mod image;
mod ops;
mod types;

pub use image::{encode_table, parse_table};
pub use ops::Partitions;
pub use types::{PartFlags, PartitionRecord, PartitionTable, MAX_PARTITIONS, PART_NAME_LEN};

/// Absolute flash offset of the reserved partition-table region
pub const PARTITION_TABLE_OFFSET: u32 = 0x1_1000;

/// Length of the reserved partition-table region (one erase sector)
pub const PARTITION_TABLE_LEN: u32 = 0x1000;
