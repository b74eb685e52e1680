//! Chip descriptor type definitions

use bitflags::bitflags;

bitflags! {
    /// Feature flags for a flash chip
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChipFeatures: u32 {
        /// Chip supports the dual-read entry command
        const DUAL_READ  = 1 << 0;
        /// Chip supports the quad-read entry command (needs QE bit)
        const QUAD_READ  = 1 << 1;
        /// Status register is written as one command covering all bytes
        const WRSR_ALL   = 1 << 2;
        /// Chip has a top/bottom complement bit
        const CMP_BIT    = 1 << 3;
    }
}

impl Default for ChipFeatures {
    fn default() -> Self {
        ChipFeatures::empty()
    }
}

/// Width of the chip's status register in bytes (1-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLen {
    /// Single status byte
    One,
    /// Two status bytes (read/written as a 16-bit value)
    Two,
    /// Three status bytes (read/written as a 24-bit value)
    Three,
}

impl StatusLen {
    /// Number of bytes covered
    pub const fn bytes(self) -> u8 {
        match self {
            StatusLen::One => 1,
            StatusLen::Two => 2,
            StatusLen::Three => 3,
        }
    }

    /// Mask selecting the valid bits of the combined status value
    pub const fn mask(self) -> u32 {
        match self {
            StatusLen::One => 0xFF,
            StatusLen::Two => 0xFFFF,
            StatusLen::Three => 0xFF_FFFF,
        }
    }
}

/// Position of a sub-field inside the combined status register value
///
/// `mask` is the unshifted field mask (e.g. `0x1F` for a five-bit
/// block-protect field); `shift` is the bit position of its LSB. A zero
/// mask marks a field the chip does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    /// Unshifted field mask
    pub mask: u32,
    /// Bit position of the field LSB
    pub shift: u8,
}

impl BitField {
    /// Field that is not present on this chip
    pub const NONE: BitField = BitField { mask: 0, shift: 0 };

    /// Create a field descriptor
    pub const fn new(mask: u32, shift: u8) -> Self {
        Self { mask, shift }
    }

    /// Whether the chip has this field at all
    pub const fn is_present(&self) -> bool {
        self.mask != 0
    }

    /// Extract the field value from a combined status value
    pub const fn extract(&self, status: u32) -> u32 {
        (status >> self.shift) & self.mask
    }

    /// Replace the field in `status` with `value`
    pub const fn insert(&self, status: u32, value: u32) -> u32 {
        (status & !(self.mask << self.shift)) | ((value & self.mask) << self.shift)
    }
}

/// Named protection level
///
/// Each level maps, per chip, to a preset bit pattern for the
/// block-protect field and the complement bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectType {
    /// No region protected
    #[default]
    None,
    /// Whole device protected
    All,
    /// Upper half protected
    Half,
    /// Everything protected except the last block
    UnprotectLastBlock,
}

impl core::fmt::Display for ProtectType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtectType::None => write!(f, "none"),
            ProtectType::All => write!(f, "all"),
            ProtectType::Half => write!(f, "half"),
            ProtectType::UnprotectLastBlock => write!(f, "unprotect-last-block"),
        }
    }
}

/// Preset field values for one protection level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectPreset {
    /// Value of the block-protect field (unshifted)
    pub protect: u32,
    /// Value of the complement bit (ignored if the chip has none)
    pub cmp: u32,
}

impl ProtectPreset {
    /// Create a preset
    pub const fn new(protect: u32, cmp: u32) -> Self {
        Self { protect, cmp }
    }
}

/// The four canonical presets of a chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectPresets {
    /// Preset for [`ProtectType::None`]
    pub none: ProtectPreset,
    /// Preset for [`ProtectType::All`]
    pub all: ProtectPreset,
    /// Preset for [`ProtectType::Half`]
    pub half: ProtectPreset,
    /// Preset for [`ProtectType::UnprotectLastBlock`]
    pub unprotect_last_block: ProtectPreset,
}

impl ProtectPresets {
    /// Look up the preset for a protection level
    pub const fn get(&self, level: ProtectType) -> ProtectPreset {
        match level {
            ProtectType::None => self.none,
            ProtectType::All => self.all,
            ProtectType::Half => self.half,
            ProtectType::UnprotectLastBlock => self.unprotect_last_block,
        }
    }
}

/// Flash chip descriptor
///
/// Identifies one chip model and locates all the status-register
/// sub-fields the driver needs. Exactly one descriptor is selected per
/// boot by matching the chip's reported id against [`super::CHIPS`].
#[derive(Debug, Clone, Copy)]
pub struct ChipDescriptor {
    /// Chip id as reported by the read-id command
    pub id: u32,
    /// Model name (e.g. "GD25Q32C")
    pub name: &'static str,
    /// Total capacity in bytes
    pub total_size: u32,
    /// Status register width
    pub status_len: StatusLen,
    /// Block-protect field position
    pub protect: BitField,
    /// Top/bottom complement bit position
    pub cmp: BitField,
    /// Quad-enable bit position
    pub qe: BitField,
    /// Continuous-read mode pattern ("M value") for quad entry
    pub m_value: u8,
    /// Protection presets
    pub presets: ProtectPresets,
    /// Feature flags
    pub features: ChipFeatures,
}

impl ChipDescriptor {
    /// Check whether an address range lies inside the device
    pub fn is_valid_range(&self, addr: u32, len: usize) -> bool {
        if addr >= self.total_size {
            return false;
        }
        let end = addr as u64 + len as u64;
        end <= self.total_size as u64
    }
}
