//! norctl-core - Serial NOR flash driver for the norctl SoC family
//!
//! This crate drives the on-chip serial flash controller: chip
//! identification, block protection, bus line-mode management, erase,
//! program, and read, plus a partition layer with transparent at-rest
//! encryption for flagged partitions. It is `no_std` for use on the
//! target; the `std` feature exists for host-side tests and tooling.
//!
//! # Example
//!
//! ```ignore
//! use norctl_core::ctrl::FlashController;
//! use norctl_core::engine::Flash;
//!
//! fn bring_up<C: FlashController>(ctrl: C) {
//!     let mut flash = Flash::new(ctrl);
//!     match flash.init() {
//!         Ok(()) => log::info!("flash id 0x{:06X}", flash.get_flash_id().unwrap_or(0)),
//!         Err(e) => log::error!("flash init failed: {}", e),
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod chip;
pub mod coord;
pub mod crypt;
pub mod ctrl;
pub mod engine;
pub mod error;
pub mod partition;
pub mod protect;
pub mod waitcb;

pub use error::{Error, Result};
