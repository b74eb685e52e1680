//! Error types for norctl-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Driver lifecycle errors
    /// Operation attempted before the driver was initialized
    NotInitialized,
    /// The driver was already initialized (second init attempt)
    AlreadyInitialized,

    // Address/bounds errors
    /// Request exceeds device or partition bounds
    AddressOutOfRange,
    /// Request targets a protected administrative region
    AddressForbidden,

    // Partition errors
    /// Unknown symbolic partition id
    PartitionNotFound,
    /// The on-flash partition table failed validation
    PartitionTableInvalid,

    // Registry errors
    /// The wait-callback pool is exhausted
    WaitCallbackPoolFull,

    // Cross-core errors
    /// The peer core did not acknowledge an erase pause in time.
    /// Non-fatal: the engine logs this and proceeds with the erase.
    CrossCoreAckTimeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "flash driver not initialized"),
            Self::AlreadyInitialized => write!(f, "flash driver already initialized"),
            Self::AddressOutOfRange => write!(f, "address out of range"),
            Self::AddressForbidden => write!(f, "address in protected administrative region"),
            Self::PartitionNotFound => write!(f, "partition not found"),
            Self::PartitionTableInvalid => write!(f, "partition table validation failed"),
            Self::WaitCallbackPoolFull => write!(f, "wait-callback pool full"),
            Self::CrossCoreAckTimeout => {
                write!(f, "peer core did not acknowledge erase pause in time")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
