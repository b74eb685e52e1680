//! Static chip descriptor table
//!
//! One entry per supported chip model. The field positions come from the
//! vendor datasheets; the presets are the four bit patterns the driver
//! ever writes into the block-protect field.

use super::types::{
    BitField, ChipDescriptor, ChipFeatures, ProtectPreset, ProtectPresets, StatusLen,
};

const PRESETS_5BP: ProtectPresets = ProtectPresets {
    none: ProtectPreset::new(0x00, 0),
    all: ProtectPreset::new(0x1F, 0),
    half: ProtectPreset::new(0x16, 0),
    unprotect_last_block: ProtectPreset::new(0x1B, 0),
};

const PRESETS_3BP: ProtectPresets = ProtectPresets {
    none: ProtectPreset::new(0x00, 0),
    all: ProtectPreset::new(0x07, 0),
    half: ProtectPreset::new(0x06, 0),
    unprotect_last_block: ProtectPreset::new(0x05, 0),
};

/// All chip models supported by this driver
pub static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor {
        id: 0xC8_4016,
        name: "GD25Q32C",
        total_size: 0x40_0000,
        status_len: StatusLen::Two,
        protect: BitField::new(0x1F, 2),
        cmp: BitField::new(0x1, 14),
        qe: BitField::new(0x1, 9),
        m_value: 0xA5,
        presets: PRESETS_5BP,
        features: ChipFeatures::DUAL_READ
            .union(ChipFeatures::QUAD_READ)
            .union(ChipFeatures::WRSR_ALL)
            .union(ChipFeatures::CMP_BIT),
    },
    ChipDescriptor {
        id: 0xC8_4015,
        name: "GD25Q16C",
        total_size: 0x20_0000,
        status_len: StatusLen::Two,
        protect: BitField::new(0x1F, 2),
        cmp: BitField::new(0x1, 14),
        qe: BitField::new(0x1, 9),
        m_value: 0xA5,
        presets: PRESETS_5BP,
        features: ChipFeatures::DUAL_READ
            .union(ChipFeatures::QUAD_READ)
            .union(ChipFeatures::WRSR_ALL)
            .union(ChipFeatures::CMP_BIT),
    },
    ChipDescriptor {
        id: 0xEF_4016,
        name: "W25Q32JV",
        total_size: 0x40_0000,
        status_len: StatusLen::Two,
        protect: BitField::new(0x1F, 2),
        cmp: BitField::new(0x1, 14),
        qe: BitField::new(0x1, 9),
        m_value: 0xA0,
        presets: PRESETS_5BP,
        features: ChipFeatures::DUAL_READ
            .union(ChipFeatures::QUAD_READ)
            .union(ChipFeatures::WRSR_ALL)
            .union(ChipFeatures::CMP_BIT),
    },
    ChipDescriptor {
        id: 0x85_6013,
        name: "P25Q40U",
        total_size: 0x08_0000,
        status_len: StatusLen::Two,
        protect: BitField::new(0x07, 2),
        cmp: BitField::NONE,
        qe: BitField::new(0x1, 9),
        m_value: 0xA0,
        presets: PRESETS_3BP,
        features: ChipFeatures::DUAL_READ
            .union(ChipFeatures::QUAD_READ)
            .union(ChipFeatures::WRSR_ALL),
    },
    ChipDescriptor {
        id: 0x0B_4014,
        name: "XT25F08B",
        total_size: 0x10_0000,
        status_len: StatusLen::One,
        protect: BitField::new(0x07, 2),
        cmp: BitField::NONE,
        qe: BitField::NONE,
        m_value: 0x00,
        presets: PRESETS_3BP,
        features: ChipFeatures::DUAL_READ,
    },
];

/// Conservative fallback descriptor for unrecognized chips
///
/// Single-wire only, smallest plausible capacity, so an unknown chip can
/// still be read but never driven with commands it may not implement.
pub static DEFAULT_CHIP: ChipDescriptor = ChipDescriptor {
    id: 0,
    name: "generic-nor",
    total_size: 0x10_0000,
    status_len: StatusLen::One,
    protect: BitField::new(0x07, 2),
    cmp: BitField::NONE,
    qe: BitField::NONE,
    m_value: 0x00,
    presets: PRESETS_3BP,
    features: ChipFeatures::empty(),
};

/// Select the descriptor for a reported chip id
///
/// Unknown ids fall back to [`DEFAULT_CHIP`] with a warning; the device
/// must still be able to read its own firmware.
pub fn lookup(id: u32) -> &'static ChipDescriptor {
    match CHIPS.iter().find(|c| c.id == id) {
        Some(chip) => chip,
        None => {
            log::warn!(
                "unknown flash id 0x{:06X}, using conservative defaults",
                id
            );
            &DEFAULT_CHIP
        }
    }
}
