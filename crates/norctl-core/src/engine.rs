//! Flash access engine
//!
//! Owns the controller peripheral and the driver state (selected chip
//! descriptor, latched protection, configured line-mode). All hardware
//! register sequences run inside a `critical_section` scope; the
//! busy-wait never does, so wait-callback subscribers run with
//! interrupts enabled while an operation is in flight.
//!
//! One invariant holds across every mutating operation: the bus
//! line-mode is restored to its configured steady state before control
//! returns, even though erase and program internally force two-wire mode
//! (those commands are only reliable on two wires on the supported
//! chips).

use crate::chip::{self, ChipDescriptor, ProtectType};
use crate::coord::{CoreLink, Mailbox, NoPeer};
use crate::ctrl::{CtrlCmd, FlashController, LineMode, BURST_LEN};
use crate::error::{Error, Result};
use crate::partition::{PARTITION_TABLE_LEN, PARTITION_TABLE_OFFSET};
use crate::protect;
use crate::waitcb::{WaitCallback, WaitRegistry};

/// End of the bootloader region at the bottom of flash
pub const BOOTLOADER_LEN: u32 = 0x1_1000;

/// Location of the security metadata sector
pub const SECURITY_META_OFFSET: u32 = 0x1_2000;
/// Length of the security metadata sector
pub const SECURITY_META_LEN: u32 = 0x1000;

/// Administrative regions that must never be erased or programmed
/// through the byte-addressed API: bootloader, partition table, and
/// security metadata. `(start, len)` pairs.
pub const FORBIDDEN_REGIONS: &[(u32, u32)] = &[
    (0, BOOTLOADER_LEN),
    (PARTITION_TABLE_OFFSET, PARTITION_TABLE_LEN),
    (SECURITY_META_OFFSET, SECURITY_META_LEN),
];

/// Erase granularity supported by the chips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseSize {
    /// 4 KiB sector
    Sector4K,
    /// 32 KiB block
    Block32K,
    /// 64 KiB block
    Block64K,
}

impl EraseSize {
    /// Size in bytes
    pub const fn bytes(self) -> u32 {
        match self {
            EraseSize::Sector4K => 4 * 1024,
            EraseSize::Block32K => 32 * 1024,
            EraseSize::Block64K => 64 * 1024,
        }
    }

    const fn cmd(self) -> CtrlCmd {
        match self {
            EraseSize::Sector4K => CtrlCmd::EraseSector,
            EraseSize::Block32K => CtrlCmd::EraseBlock32,
            EraseSize::Block64K => CtrlCmd::EraseBlock64,
        }
    }
}

/// The flash driver
///
/// There is exactly one instance per controller: the peripheral is a
/// move-only token consumed by the constructor. Construction is
/// two-phase - [`Flash::new`] builds an unprobed driver, [`Flash::init`]
/// identifies the chip and selects its descriptor. Every operation
/// before `init` fails with [`Error::NotInitialized`].
pub struct Flash<C: FlashController, M: Mailbox = NoPeer> {
    ctrl: C,
    desc: Option<&'static ChipDescriptor>,
    id: u32,
    protect: Option<ProtectType>,
    line_mode: LineMode,
    callbacks: WaitRegistry,
    link: Option<CoreLink<M>>,
}

impl<C: FlashController> Flash<C, NoPeer> {
    /// Create an unprobed driver for a single-core (or sole-owner) setup
    pub fn new(ctrl: C) -> Self {
        Self::build(ctrl, None)
    }
}

impl<C: FlashController, M: Mailbox> Flash<C, M> {
    /// Create an unprobed driver with a cross-core erase link attached
    pub fn with_peer(ctrl: C, link: CoreLink<M>) -> Self {
        Self::build(ctrl, Some(link))
    }

    fn build(ctrl: C, link: Option<CoreLink<M>>) -> Self {
        Self {
            ctrl,
            desc: None,
            id: 0,
            protect: None,
            line_mode: LineMode::One,
            callbacks: WaitRegistry::new(),
            link,
        }
    }

    /// Identify the chip and select its descriptor
    ///
    /// Also unlocks the protection bits once; the latch avoids
    /// re-locking and re-unlocking around every subsequent operation
    /// (a wear policy, not a hardware requirement). A second call fails
    /// with [`Error::AlreadyInitialized`].
    pub fn init(&mut self) -> Result<()> {
        if self.desc.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let id = critical_section::with(|_| self.ctrl.read_id());
        let desc = chip::lookup(id);
        log::debug!("flash id 0x{:06X}: {} ({} KiB)", id, desc.name, desc.total_size / 1024);
        self.id = id;
        self.desc = Some(desc);

        self.set_protect_type(ProtectType::None)?;
        Ok(())
    }

    /// Whether [`Flash::init`] has completed
    pub fn is_initialized(&self) -> bool {
        self.desc.is_some()
    }

    /// The chip id read at init
    pub fn get_flash_id(&self) -> Result<u32> {
        self.descriptor()?;
        Ok(self.id)
    }

    /// Device capacity in bytes
    pub fn capacity(&self) -> Result<u32> {
        Ok(self.descriptor()?.total_size)
    }

    /// The selected chip descriptor
    pub fn descriptor(&self) -> Result<&'static ChipDescriptor> {
        self.desc.ok_or(Error::NotInitialized)
    }

    /// Access the underlying controller
    ///
    /// For bring-up tooling and test inspection; mutating registers
    /// behind the driver's back invalidates its latched state.
    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    /// Register a busy-poll callback (e.g. a watchdog feeder)
    pub fn register_wait_callback(&mut self, cb: WaitCallback) -> Result<()> {
        self.callbacks.register(cb)
    }

    /// Remove a busy-poll callback; returns whether it was registered
    pub fn unregister_wait_callback(&mut self, cb: WaitCallback) -> bool {
        self.callbacks.unregister(cb)
    }

    /// The latched protection level, if one has been applied
    pub fn get_protect_type(&self) -> Option<ProtectType> {
        self.protect
    }

    /// Apply a protection level
    ///
    /// Idempotent at two layers: the latch skips hardware access
    /// entirely when the level is unchanged, and the state machine below
    /// skips the status write when the live bits already match.
    pub fn set_protect_type(&mut self, level: ProtectType) -> Result<()> {
        let desc = self.descriptor()?;
        if self.protect == Some(level) {
            return Ok(());
        }

        let bits = protect::protection_bits(desc, level);
        let wrote = critical_section::with(|_| protect::apply_if_changed(&mut self.ctrl, desc, bits));
        if wrote {
            self.wait_idle();
        }
        self.protect = Some(level);
        Ok(())
    }

    /// The configured steady-state line-mode
    pub fn get_line_mode(&self) -> LineMode {
        self.line_mode
    }

    /// Configure the steady-state line-mode and switch the bus to it
    pub fn set_line_mode(&mut self, mode: LineMode) -> Result<()> {
        let desc = self.descriptor()?;
        critical_section::with(|_| protect::set_line_mode(&mut self.ctrl, desc, mode));
        self.wait_idle();
        self.line_mode = mode;
        Ok(())
    }

    /// Erase the 4 KiB sector containing `addr`
    pub fn erase(&mut self, addr: u32) -> Result<()> {
        self.erase_granular(addr, EraseSize::Sector4K)
    }

    /// Erase the 32 KiB block containing `addr`
    pub fn erase_32k(&mut self, addr: u32) -> Result<()> {
        self.erase_granular(addr, EraseSize::Block32K)
    }

    /// Erase the 64 KiB block containing `addr`
    pub fn erase_64k(&mut self, addr: u32) -> Result<()> {
        self.erase_granular(addr, EraseSize::Block64K)
    }

    fn erase_granular(&mut self, addr: u32, size: EraseSize) -> Result<()> {
        let desc = self.descriptor()?;
        let base = addr & !(size.bytes() - 1);

        if !desc.is_valid_range(base, size.bytes() as usize) {
            return Err(Error::AddressOutOfRange);
        }
        check_forbidden(base, size.bytes() as usize)?;

        // Pause the peer core for the duration of the erase. A missing
        // acknowledgment degrades to a logged warning; the pending token
        // still keeps a well-behaved peer off the flash.
        if let Some(link) = &mut self.link {
            if let Err(e) = link.begin_erase() {
                log::warn!("erase at 0x{:08X} proceeding unacknowledged: {}", base, e);
            }
        }

        critical_section::with(|_| {
            protect::set_line_mode(&mut self.ctrl, desc, LineMode::Two);
            self.ctrl.write_command(CtrlCmd::WriteEnable, 0);
            self.ctrl.write_command(size.cmd(), base);
        });
        self.wait_idle();
        self.restore_line_mode(desc);

        if let Some(link) = &mut self.link {
            link.end_erase();
        }
        Ok(())
    }

    /// Program `data` starting at `addr`
    ///
    /// Data moves in 32-byte bursts aligned to the controller's buffer
    /// width; burst bytes not covered by `data` are padded with the
    /// erased value so a partial burst cannot disturb its neighbours.
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let desc = self.descriptor()?;
        if data.is_empty() {
            return Ok(());
        }
        if !desc.is_valid_range(addr, data.len()) {
            return Err(Error::AddressOutOfRange);
        }
        check_forbidden(addr, data.len())?;

        critical_section::with(|_| protect::set_line_mode(&mut self.ctrl, desc, LineMode::Two));
        self.wait_idle();

        let end = addr as usize + data.len();
        let mut base = addr as usize & !(BURST_LEN - 1);
        while base < end {
            let mut burst = [0xFFu8; BURST_LEN];
            let copy_start = base.max(addr as usize);
            let copy_end = (base + BURST_LEN).min(end);
            burst[copy_start - base..copy_end - base]
                .copy_from_slice(&data[copy_start - addr as usize..copy_end - addr as usize]);

            critical_section::with(|_| {
                self.ctrl.write_command(CtrlCmd::WriteEnable, 0);
                self.ctrl.write_burst(base as u32, &burst);
            });
            self.wait_idle();

            base += BURST_LEN;
        }

        self.restore_line_mode(desc);
        Ok(())
    }

    /// Read `buf.len()` bytes starting at `addr`
    ///
    /// Reads work in any line-mode, so no mode switch happens here.
    pub fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let desc = self.descriptor()?;
        if buf.is_empty() {
            return Ok(());
        }
        if !desc.is_valid_range(addr, buf.len()) {
            return Err(Error::AddressOutOfRange);
        }

        let end = addr as usize + buf.len();
        let mut base = addr as usize & !(BURST_LEN - 1);
        while base < end {
            let mut burst = [0u8; BURST_LEN];
            critical_section::with(|_| self.ctrl.read_burst(base as u32, &mut burst));

            let copy_start = base.max(addr as usize);
            let copy_end = (base + BURST_LEN).min(end);
            buf[copy_start - addr as usize..copy_end - addr as usize]
                .copy_from_slice(&burst[copy_start - base..copy_end - base]);

            base += BURST_LEN;
        }
        Ok(())
    }

    /// Spin until the controller reports idle, fanning out to the
    /// registered wait callbacks on every iteration.
    ///
    /// Deliberately unbounded: a controller that never goes idle hangs
    /// the calling thread, and the system watchdog (fed through one of
    /// the callbacks) is the recovery path.
    fn wait_idle(&mut self) {
        while self.ctrl.is_busy() {
            self.callbacks.invoke_all();
        }
    }

    fn restore_line_mode(&mut self, desc: &'static ChipDescriptor) {
        let mode = self.line_mode;
        critical_section::with(|_| protect::set_line_mode(&mut self.ctrl, desc, mode));
        self.wait_idle();
    }
}

/// Reject ranges overlapping an administrative region
fn check_forbidden(addr: u32, len: usize) -> Result<()> {
    let end = addr as u64 + len as u64;
    for &(start, rlen) in FORBIDDEN_REGIONS {
        let rend = start as u64 + rlen as u64;
        if (addr as u64) < rend && (start as u64) < end {
            return Err(Error::AddressForbidden);
        }
    }
    Ok(())
}
