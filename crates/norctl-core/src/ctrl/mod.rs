//! Flash controller abstraction
//!
//! The SoC exposes the chip through a memory-mapped controller: software
//! writes a command register and polls a busy bit instead of driving SPI
//! frames directly. [`FlashController`] is the seam between the driver
//! logic and that hardware (or the in-memory simulator used by tests).

mod traits;

pub use traits::{BusWidth, CtrlCmd, FlashController, LineMode, BURST_LEN};
