//! Controller trait and command definitions

use crate::chip::StatusLen;

/// Width of the controller's internal data buffer in bytes
///
/// Program and read operations move through the controller in bursts of
/// this size, aligned to this boundary.
pub const BURST_LEN: usize = 32;

/// Commands the controller can issue to the chip
///
/// These map one-to-one onto command-register values; the controller
/// handles the wire encoding itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCmd {
    /// Set the write-enable latch
    WriteEnable,
    /// Clear the write-enable latch
    WriteDisable,
    /// Erase the 4 KiB sector containing the address
    EraseSector,
    /// Erase the 32 KiB block containing the address
    EraseBlock32,
    /// Erase the 64 KiB block containing the address
    EraseBlock64,
    /// Enter dual-read (two-wire) mode
    EnterDualRead,
    /// Enter quad-read (four-wire) mode
    EnterQuadRead,
    /// Clear any continuous-read / quad latch back to one-wire commands
    ExitContinuousRead,
}

/// Number of parallel data wires on the flash bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusWidth {
    /// One-wire (standard) transfers
    #[default]
    Single,
    /// Two-wire transfers
    Dual,
    /// Four-wire transfers
    Quad,
}

impl BusWidth {
    /// Number of data lines used
    pub const fn lines(self) -> u8 {
        match self {
            BusWidth::Single => 1,
            BusWidth::Dual => 2,
            BusWidth::Quad => 4,
        }
    }
}

/// Steady-state bus line-mode requested by configuration
///
/// The driver restores this mode after every operation that temporarily
/// forces the bus elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineMode {
    /// One-wire reads
    #[default]
    One,
    /// Two-wire reads
    Two,
    /// Four-wire reads (requires the chip's QE bit)
    Four,
}

impl LineMode {
    /// The raw bus width this mode uses
    pub const fn bus_width(self) -> BusWidth {
        match self {
            LineMode::One => BusWidth::Single,
            LineMode::Two => BusWidth::Dual,
            LineMode::Four => BusWidth::Quad,
        }
    }
}

impl core::fmt::Display for LineMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LineMode::One => write!(f, "one-wire"),
            LineMode::Two => write!(f, "two-wire"),
            LineMode::Four => write!(f, "four-wire"),
        }
    }
}

/// Register-level access to the flash controller
///
/// Implementations mutate hardware registers directly; none of these
/// methods are reentrant from two cores without the engine's critical
/// region around them. No timeouts exist at this layer - bounding total
/// time is the callers' concern (see [`crate::waitcb`]).
pub trait FlashController {
    /// Issue a command, with the target address where the command takes one
    fn write_command(&mut self, cmd: CtrlCmd, addr: u32);

    /// Read the combined status register value (low byte first)
    fn read_status(&mut self, len: StatusLen) -> u32;

    /// Write the combined status register value
    ///
    /// The write-enable latch is the caller's responsibility.
    fn write_status(&mut self, len: StatusLen, value: u32);

    /// Whether the controller reports an operation in progress
    fn is_busy(&mut self) -> bool;

    /// Read the chip's identification word
    fn read_id(&mut self) -> u32;

    /// Read one aligned burst into `buf`
    fn read_burst(&mut self, addr: u32, buf: &mut [u8; BURST_LEN]);

    /// Program one aligned burst from `data`
    ///
    /// The write-enable latch must already be set.
    fn write_burst(&mut self, addr: u32, data: &[u8; BURST_LEN]);

    /// Latch the bus width used for data transfers
    fn set_bus_width(&mut self, width: BusWidth);

    /// Program the continuous-read mode pattern ("M value")
    fn write_mode_pattern(&mut self, m_value: u8);

    /// Delay for the given number of microseconds
    fn delay_us(&mut self, us: u32);
}
