//! Protection and line-mode state machine
//!
//! Derives the status-register bit pattern for a requested protection
//! level from the chip descriptor and writes it only when the live value
//! differs. Everything chip-specific (bit positions, M value, quad
//! enablement) comes from the descriptor table; nothing here is
//! hard-coded per chip.

use crate::chip::{ChipDescriptor, ChipFeatures, ProtectType};
use crate::ctrl::{BusWidth, CtrlCmd, FlashController, LineMode};

/// Resolved status-register sub-field values for one protection level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectBits {
    /// Block-protect field value (unshifted)
    pub protect: u32,
    /// Complement bit value (meaningless if the chip has no CMP bit)
    pub cmp: u32,
}

/// Look up the protect-field and complement-bit values for a level
pub fn protection_bits(desc: &ChipDescriptor, level: ProtectType) -> ProtectBits {
    let preset = desc.presets.get(level);
    ProtectBits {
        protect: preset.protect,
        cmp: preset.cmp,
    }
}

/// Write the protection bits if they differ from the live register value
///
/// Reads the status register, compares the protect-field and
/// complement-bit sub-ranges, and performs at most one status write.
/// Returns whether a write was issued. Skipping redundant writes matters:
/// every status write is a wear cycle on the register.
pub fn apply_if_changed<C: FlashController>(
    ctrl: &mut C,
    desc: &ChipDescriptor,
    bits: ProtectBits,
) -> bool {
    let live = ctrl.read_status(desc.status_len);

    let protect_same = desc.protect.extract(live) == (bits.protect & desc.protect.mask);
    let cmp_same = !desc.cmp.is_present() || desc.cmp.extract(live) == (bits.cmp & desc.cmp.mask);
    if protect_same && cmp_same {
        log::trace!("protection bits already 0x{:02X}, skipping write", bits.protect);
        return false;
    }

    let mut value = desc.protect.insert(live, bits.protect);
    if desc.cmp.is_present() {
        value = desc.cmp.insert(value, bits.cmp);
    }

    ctrl.write_command(CtrlCmd::WriteEnable, 0);
    ctrl.write_status(desc.status_len, value);
    log::debug!("status register <- 0x{:06X}", value);
    true
}

/// Switch the bus to the requested line-mode
///
/// Always clears the continuous-read latch first so the chip is back in
/// one-wire command mode regardless of what it was doing. Four-wire entry
/// programs the chip's M pattern and sets the quad-enable bit, skipping
/// the QE write cycle when the bit is already set.
pub fn set_line_mode<C: FlashController>(ctrl: &mut C, desc: &ChipDescriptor, mode: LineMode) {
    ctrl.write_command(CtrlCmd::ExitContinuousRead, 0);

    match mode {
        LineMode::One => {
            ctrl.set_bus_width(BusWidth::Single);
        }
        LineMode::Two => {
            ctrl.set_bus_width(BusWidth::Dual);
            if desc.features.contains(ChipFeatures::DUAL_READ) {
                ctrl.write_command(CtrlCmd::EnterDualRead, 0);
            }
        }
        LineMode::Four => {
            ctrl.write_mode_pattern(desc.m_value);
            ensure_quad_enabled(ctrl, desc);
            ctrl.set_bus_width(BusWidth::Quad);
            ctrl.write_command(CtrlCmd::EnterQuadRead, 0);
        }
    }
}

/// Set the chip's quad-enable bit if it is present and currently clear
fn ensure_quad_enabled<C: FlashController>(ctrl: &mut C, desc: &ChipDescriptor) {
    if !desc.qe.is_present() {
        return;
    }
    let live = ctrl.read_status(desc.status_len);
    if desc.qe.extract(live) != 0 {
        return;
    }
    let value = desc.qe.insert(live, 1);
    ctrl.write_command(CtrlCmd::WriteEnable, 0);
    ctrl.write_status(desc.status_len, value);
    log::debug!("quad-enable bit set for {}", desc.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip;

    #[test]
    fn preset_lookup_matches_descriptor() {
        let desc = chip::lookup(0xC8_4016);
        let bits = protection_bits(desc, ProtectType::All);
        assert_eq!(bits.protect, 0x1F);
        let bits = protection_bits(desc, ProtectType::None);
        assert_eq!(bits.protect, 0x00);
    }
}
