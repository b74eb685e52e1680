//! norctl-sim - In-memory flash controller simulator
//!
//! Emulates the SoC's flash controller register interface over a heap
//! buffer: AND-semantics programming, erase to 0xFF, a write-enable
//! latch, and block protection derived from the live status bits the
//! same way the real chip decodes them. Effect counters (status writes,
//! bus-width switches, per-granularity erases) let tests assert not just
//! the final image but how the driver got there.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use norctl_core::chip::{self, ChipDescriptor, ProtectType, StatusLen};
use norctl_core::ctrl::{BusWidth, CtrlCmd, FlashController, BURST_LEN};

/// Configuration for the simulated chip
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Identification word returned by the id register
    pub id: u32,
    /// Flash size in bytes
    pub size: usize,
    /// How many busy polls each operation reports before going idle
    pub busy_polls: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            id: 0xC8_4016, // GD25Q32C
            size: 4 * 1024 * 1024,
            busy_polls: 2,
        }
    }
}

/// Per-granularity erase counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EraseCounts {
    /// 4 KiB sector erases
    pub sector_4k: u32,
    /// 32 KiB block erases
    pub block_32k: u32,
    /// 64 KiB block erases
    pub block_64k: u32,
}

/// Simulated flash controller
pub struct SimController {
    config: SimConfig,
    desc: &'static ChipDescriptor,
    data: Vec<u8>,
    status: u32,
    write_enabled: bool,
    busy_countdown: u32,
    bus_width: BusWidth,
    mode_pattern: u8,
    status_writes: u32,
    width_switches: u32,
    burst_writes: u32,
    erases: EraseCounts,
}

impl SimController {
    /// Create a blank (all-0xFF) simulated chip
    pub fn new(config: SimConfig) -> Self {
        let desc = chip::lookup(config.id);
        let data = vec![0xFF; config.size];
        Self {
            config,
            desc,
            data,
            status: 0,
            write_enabled: false,
            busy_countdown: 0,
            bus_width: BusWidth::Single,
            mode_pattern: 0,
            status_writes: 0,
            width_switches: 0,
            burst_writes: 0,
            erases: EraseCounts::default(),
        }
    }

    /// Create a blank chip with the default configuration (GD25Q32C)
    pub fn new_default() -> Self {
        Self::new(SimConfig::default())
    }

    /// The flash image
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the flash image (for pre-seeding tests)
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Raw status register value
    pub fn status(&self) -> u32 {
        self.status
    }

    /// Currently latched bus width
    pub fn bus_width(&self) -> BusWidth {
        self.bus_width
    }

    /// Last programmed continuous-read mode pattern
    pub fn mode_pattern(&self) -> u8 {
        self.mode_pattern
    }

    /// Number of status register write cycles
    pub fn status_writes(&self) -> u32 {
        self.status_writes
    }

    /// Number of bus-width switches
    pub fn width_switches(&self) -> u32 {
        self.width_switches
    }

    /// Number of program bursts issued
    pub fn burst_writes(&self) -> u32 {
        self.burst_writes
    }

    /// Erase operations seen, by granularity
    pub fn erases(&self) -> EraseCounts {
        self.erases
    }

    /// Protected address range `(start, len)` decoded from the live
    /// status bits, the way the chip itself would
    fn protected_range(&self) -> (usize, usize) {
        let field = self.desc.protect.extract(self.status);
        let cmp = if self.desc.cmp.is_present() {
            self.desc.cmp.extract(self.status)
        } else {
            0
        };

        let levels = [
            ProtectType::None,
            ProtectType::All,
            ProtectType::Half,
            ProtectType::UnprotectLastBlock,
        ];
        for level in levels {
            let preset = self.desc.presets.get(level);
            if preset.protect == field && preset.cmp == cmp {
                return match level {
                    ProtectType::None => (0, 0),
                    ProtectType::All => (0, self.config.size),
                    ProtectType::Half => (self.config.size / 2, self.config.size / 2),
                    ProtectType::UnprotectLastBlock => (0, self.config.size - 4096),
                };
            }
        }
        // Patterns outside the preset set lock everything
        (0, self.config.size)
    }

    fn is_protected(&self, addr: usize, len: usize) -> bool {
        let (start, plen) = self.protected_range();
        addr < start + plen && start < addr + len
    }

    fn start_op(&mut self) {
        self.busy_countdown = self.config.busy_polls;
        self.write_enabled = false;
    }

    fn erase_range(&mut self, addr: u32, len: usize) {
        if !self.write_enabled {
            log::warn!("erase at 0x{:08X} without write-enable, ignored", addr);
            return;
        }
        let base = addr as usize & !(len - 1);
        assert!(base + len <= self.data.len(), "erase past end of image");
        if !self.is_protected(base, len) {
            self.data[base..base + len].fill(0xFF);
        }
        self.start_op();
    }
}

impl FlashController for SimController {
    fn write_command(&mut self, cmd: CtrlCmd, addr: u32) {
        match cmd {
            CtrlCmd::WriteEnable => self.write_enabled = true,
            CtrlCmd::WriteDisable => self.write_enabled = false,
            CtrlCmd::EraseSector => {
                self.erase_range(addr, 4096);
                self.erases.sector_4k += 1;
            }
            CtrlCmd::EraseBlock32 => {
                self.erase_range(addr, 32 * 1024);
                self.erases.block_32k += 1;
            }
            CtrlCmd::EraseBlock64 => {
                self.erase_range(addr, 64 * 1024);
                self.erases.block_64k += 1;
            }
            CtrlCmd::EnterDualRead | CtrlCmd::EnterQuadRead | CtrlCmd::ExitContinuousRead => {}
        }
    }

    fn read_status(&mut self, len: StatusLen) -> u32 {
        self.status & len.mask()
    }

    fn write_status(&mut self, len: StatusLen, value: u32) {
        if !self.write_enabled {
            log::warn!("status write without write-enable, ignored");
            return;
        }
        self.status = value & len.mask();
        self.status_writes += 1;
        self.start_op();
    }

    fn is_busy(&mut self) -> bool {
        if self.busy_countdown > 0 {
            self.busy_countdown -= 1;
            true
        } else {
            false
        }
    }

    fn read_id(&mut self) -> u32 {
        self.config.id
    }

    fn read_burst(&mut self, addr: u32, buf: &mut [u8; BURST_LEN]) {
        let addr = addr as usize;
        assert_eq!(addr % BURST_LEN, 0, "unaligned read burst");
        assert!(addr + BURST_LEN <= self.data.len(), "read past end of image");
        buf.copy_from_slice(&self.data[addr..addr + BURST_LEN]);
    }

    fn write_burst(&mut self, addr: u32, data: &[u8; BURST_LEN]) {
        let addr = addr as usize;
        assert_eq!(addr % BURST_LEN, 0, "unaligned write burst");
        assert!(addr + BURST_LEN <= self.data.len(), "program past end of image");
        if !self.write_enabled {
            log::warn!("program at 0x{:08X} without write-enable, ignored", addr);
            return;
        }
        if !self.is_protected(addr, BURST_LEN) {
            // NOR programming only clears bits
            for (cell, byte) in self.data[addr..addr + BURST_LEN].iter_mut().zip(data) {
                *cell &= byte;
            }
        }
        self.burst_writes += 1;
        self.start_op();
    }

    fn set_bus_width(&mut self, width: BusWidth) {
        if self.bus_width != width {
            self.width_switches += 1;
        }
        self.bus_width = width;
    }

    fn write_mode_pattern(&mut self, m_value: u8) {
        self.mode_pattern = m_value;
    }

    fn delay_us(&mut self, _us: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programming_clears_bits_only() {
        let mut sim = SimController::new_default();
        sim.write_command(CtrlCmd::WriteEnable, 0);
        sim.write_burst(0x2_0000, &[0xF0; BURST_LEN]);
        sim.write_command(CtrlCmd::WriteEnable, 0);
        sim.write_burst(0x2_0000, &[0x0F; BURST_LEN]);
        assert!(sim.data()[0x2_0000..0x2_0020].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn erase_restores_erased_value() {
        let mut sim = SimController::new_default();
        sim.write_command(CtrlCmd::WriteEnable, 0);
        sim.write_burst(0x2_0000, &[0x00; BURST_LEN]);
        sim.write_command(CtrlCmd::WriteEnable, 0);
        sim.write_command(CtrlCmd::EraseSector, 0x2_0000);
        assert!(sim.data()[0x2_0000..0x2_1000].iter().all(|&b| b == 0xFF));
        assert_eq!(sim.erases().sector_4k, 1);
    }

    #[test]
    fn writes_without_latch_are_ignored() {
        let mut sim = SimController::new_default();
        sim.write_burst(0x2_0000, &[0x00; BURST_LEN]);
        assert!(sim.data()[0x2_0000..0x2_0020].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn full_protection_blocks_programming() {
        let mut sim = SimController::new_default();
        // GD25Q32C: all-protect preset is BP=0x1F at shift 2
        sim.write_command(CtrlCmd::WriteEnable, 0);
        sim.write_status(StatusLen::Two, 0x1F << 2);
        sim.write_command(CtrlCmd::WriteEnable, 0);
        sim.write_burst(0x2_0000, &[0x00; BURST_LEN]);
        assert!(sim.data()[0x2_0000..0x2_0020].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn busy_clears_after_configured_polls() {
        let mut sim = SimController::new_default();
        sim.write_command(CtrlCmd::WriteEnable, 0);
        sim.write_burst(0x2_0000, &[0xAA; BURST_LEN]);
        assert!(sim.is_busy());
        assert!(sim.is_busy());
        assert!(!sim.is_busy());
    }
}
