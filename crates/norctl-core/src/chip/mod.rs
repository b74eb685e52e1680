//! Flash chip descriptors
//!
//! Almost every supported chip family encodes its protection field,
//! complement bit, and quad-enable bit differently. The descriptor table
//! isolates that variance as data so the state machine in
//! [`crate::protect`] stays table-driven.

mod table;
mod types;

pub use table::{lookup, CHIPS, DEFAULT_CHIP};
pub use types::{
    BitField, ChipDescriptor, ChipFeatures, ProtectPreset, ProtectPresets, ProtectType, StatusLen,
};
