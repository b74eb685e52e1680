//! Partition-level data operations
//!
//! Translates partition-relative offsets to absolute flash addresses,
//! enforces partition bounds, and interposes the unit cipher on
//! partitions flagged [`PartFlags::ENCRYPTED`]. The cipher tweak is the
//! sequential unit index within one call, so a caller resuming a
//! transfer must restart from the offset of the original call.

use crate::coord::Mailbox;
use crate::crypt::{UnitCipher, UNIT_LEN};
use crate::ctrl::FlashController;
use crate::engine::{EraseSize, Flash};
use crate::error::{Error, Result};

use super::types::{PartitionRecord, PartitionTable};

/// Partition-level view of a flash device
///
/// Wraps a validated [`PartitionTable`] plus the optional device cipher.
/// Without a cipher, operations on an encrypted partition move raw
/// ciphertext - useful for whole-image backup, useless for content.
pub struct Partitions {
    table: PartitionTable,
    cipher: Option<UnitCipher>,
}

impl Partitions {
    /// Build a view without encryption support
    pub fn new(table: PartitionTable) -> Self {
        Self { table, cipher: None }
    }

    /// Build a view with the device cipher attached
    pub fn with_cipher(table: PartitionTable, cipher: UnitCipher) -> Self {
        Self {
            table,
            cipher: Some(cipher),
        }
    }

    /// The underlying table
    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    /// `(start, length)` of a partition
    pub fn get_info(&self, name: &str) -> Result<(u32, u32)> {
        self.table.get_info(name)
    }

    /// Read from a partition at a partition-relative offset
    ///
    /// Encrypted partitions require `offset` aligned to the cipher unit;
    /// a trailing partial unit is read whole and truncated after
    /// decryption.
    pub fn read<C: FlashController, M: Mailbox>(
        &self,
        flash: &mut Flash<C, M>,
        name: &str,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<()> {
        let record = self.table.resolve(name).ok_or(Error::PartitionNotFound)?;

        match self.partition_cipher(record) {
            None => {
                let addr = checked_abs(record, offset, buf.len())?;
                flash.read_bytes(addr, buf)
            }
            Some(cipher) => {
                let addr = checked_abs_units(record, offset, buf.len())?;
                let mut unit = [0u8; UNIT_LEN];
                for (index, chunk) in buf.chunks_mut(UNIT_LEN).enumerate() {
                    flash.read_bytes(addr + (index * UNIT_LEN) as u32, &mut unit)?;
                    cipher.decrypt_unit(&mut unit, index as u32);
                    chunk.copy_from_slice(&unit[..chunk.len()]);
                }
                Ok(())
            }
        }
    }

    /// Program a partition at a partition-relative offset
    ///
    /// Encrypted partitions require `offset` aligned to the cipher unit;
    /// a trailing partial unit is padded with the erased value before
    /// encryption, and the padded end must still fit the partition.
    pub fn write<C: FlashController, M: Mailbox>(
        &self,
        flash: &mut Flash<C, M>,
        name: &str,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        let record = self.table.resolve(name).ok_or(Error::PartitionNotFound)?;

        match self.partition_cipher(record) {
            None => {
                let addr = checked_abs(record, offset, data.len())?;
                flash.write_bytes(addr, data)
            }
            Some(cipher) => {
                let addr = checked_abs_units(record, offset, data.len())?;
                for (index, chunk) in data.chunks(UNIT_LEN).enumerate() {
                    let mut unit = [0xFFu8; UNIT_LEN];
                    unit[..chunk.len()].copy_from_slice(chunk);
                    cipher.encrypt_unit(&mut unit, index as u32);
                    flash.write_bytes(addr + (index * UNIT_LEN) as u32, &unit)?;
                }
                Ok(())
            }
        }
    }

    /// Erase a partition-relative range
    ///
    /// `offset` and `len` must be sector aligned. The range is covered
    /// greedily: 64 KiB blocks where alignment and remaining length
    /// allow, then 32 KiB, then 4 KiB sectors.
    pub fn erase<C: FlashController, M: Mailbox>(
        &self,
        flash: &mut Flash<C, M>,
        name: &str,
        offset: u32,
        len: u32,
    ) -> Result<()> {
        let record = self.table.resolve(name).ok_or(Error::PartitionNotFound)?;
        let addr = checked_abs(record, offset, len as usize)?;

        let sector = EraseSize::Sector4K.bytes();
        if addr % sector != 0 || len % sector != 0 {
            return Err(Error::AddressOutOfRange);
        }

        let mut cur = addr;
        let end = addr + len;
        while cur < end {
            let remaining = end - cur;
            if cur % EraseSize::Block64K.bytes() == 0 && remaining >= EraseSize::Block64K.bytes() {
                flash.erase_64k(cur)?;
                cur += EraseSize::Block64K.bytes();
            } else if cur % EraseSize::Block32K.bytes() == 0
                && remaining >= EraseSize::Block32K.bytes()
            {
                flash.erase_32k(cur)?;
                cur += EraseSize::Block32K.bytes();
            } else {
                flash.erase(cur)?;
                cur += sector;
            }
        }
        Ok(())
    }

    fn partition_cipher(&self, record: &PartitionRecord) -> Option<&UnitCipher> {
        if record.is_encrypted() {
            self.cipher.as_ref()
        } else {
            None
        }
    }
}

/// Bounds-check a partition-relative range and return the absolute address
fn checked_abs(record: &PartitionRecord, offset: u32, len: usize) -> Result<u32> {
    if offset as u64 + len as u64 > record.len as u64 {
        return Err(Error::AddressOutOfRange);
    }
    Ok(record.offset + offset)
}

/// As [`checked_abs`], with the range widened to whole cipher units
fn checked_abs_units(record: &PartitionRecord, offset: u32, len: usize) -> Result<u32> {
    if offset as usize % UNIT_LEN != 0 {
        return Err(Error::AddressOutOfRange);
    }
    let padded = (len + UNIT_LEN - 1) & !(UNIT_LEN - 1);
    checked_abs(record, offset, padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::types::PartFlags;

    fn record(len: u32, flags: PartFlags) -> PartitionRecord {
        PartitionRecord::new("p", 0x2_0000, len, flags).unwrap()
    }

    #[test]
    fn relative_to_absolute() {
        let r = record(0x1000, PartFlags::empty());
        assert_eq!(checked_abs(&r, 0x100, 16), Ok(0x2_0100));
        assert_eq!(checked_abs(&r, 0xFF0, 16), Ok(0x2_0FF0));
        assert_eq!(checked_abs(&r, 0xFF0, 17), Err(Error::AddressOutOfRange));
    }

    #[test]
    fn unit_padding_counts_against_bounds() {
        let r = record(0x40, PartFlags::ENCRYPTED);
        // 33 bytes pad to two units, exactly filling the partition
        assert_eq!(checked_abs_units(&r, 0, 33), Ok(0x2_0000));
        // One unit in, a single byte pads to a unit past the end
        assert_eq!(checked_abs_units(&r, 0x20, 33), Err(Error::AddressOutOfRange));
        // Unaligned start
        assert_eq!(checked_abs_units(&r, 0x10, 8), Err(Error::AddressOutOfRange));
    }
}
