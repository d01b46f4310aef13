//! Error taxonomy for the allocator engine.
//!
//! The engine never terminates the process. Every failure is surfaced as a
//! value and classified with `is_fatal()`; the driver decides whether a
//! fatal-class error aborts the run.

use thiserror::Error;

use crate::region::RegionHandle;

/// Failure reported by a [`RegionSource`](crate::region::RegionSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("region source cannot supply a zero-byte region")]
    ZeroSize,
    #[error("region budget exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted { requested: usize, remaining: usize },
    #[error("region of {requested} bytes exceeds the {limit}-byte single-region limit")]
    TooLarge { requested: usize, limit: usize },
    #[error("host allocation of {requested} bytes failed")]
    HostAllocationFailed { requested: usize },
    #[error("address space exhausted while reserving {requested} bytes")]
    AddressOverflow { requested: usize },
    #[error("region arena is full ({capacity} regions)")]
    SlotSpace { capacity: usize },
}

/// Failure of an allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The request could not be classified (zero bytes).
    #[error("invalid chunk size: {requested}")]
    InvalidSize { requested: usize },
    /// The region source could not supply backing memory.
    #[error("region exhausted while reserving {size} bytes: {source}")]
    RegionExhausted {
        size: usize,
        #[source]
        source: RegionError,
    },
}

impl AllocError {
    /// `RegionExhausted` has no local recovery; `InvalidSize` leaves state untouched.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::RegionExhausted { .. })
    }
}

/// Failure of a deallocation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeallocError {
    /// Argument-less deallocation with an empty allocation history.
    #[error("no memory to deallocate")]
    NothingToFree,
    /// The target is not in the allocated set.
    #[error("attempt to free un-allocated memory ({handle})")]
    InvalidFree { handle: RegionHandle },
}

impl DeallocError {
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidFree { .. })
    }
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("partition size table is empty")]
    EmptyPartitionTable,
    #[error("partition size at index {index} is zero")]
    ZeroPartition { index: usize },
    #[error("partition sizes must be strictly ascending: {previous} followed by {next}")]
    NotAscending { previous: usize, next: usize },
    #[error("unknown placement strategy '{0}' (expected first-fit or best-fit)")]
    UnknownStrategy(String),
    #[error("unknown runtime mode '{0}' (expected strict or hardened)")]
    UnknownMode(String),
}

/// Failure while constructing an engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Pre-population could not reserve its regions.
    #[error("pre-population failed: {0}")]
    Prepopulate(#[from] AllocError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification_matches_taxonomy() {
        assert!(!AllocError::InvalidSize { requested: 0 }.is_fatal());
        assert!(
            AllocError::RegionExhausted {
                size: 64,
                source: RegionError::Exhausted {
                    requested: 64,
                    remaining: 0
                },
            }
            .is_fatal()
        );
        assert!(!DeallocError::NothingToFree.is_fatal());
        assert!(
            DeallocError::InvalidFree {
                handle: RegionHandle::from_raw(3)
            }
            .is_fatal()
        );
    }

    #[test]
    fn messages_name_the_offending_value() {
        let err = DeallocError::InvalidFree {
            handle: RegionHandle::from_raw(7),
        };
        assert_eq!(
            err.to_string(),
            "attempt to free un-allocated memory (region#7)"
        );
        let err = ConfigError::NotAscending {
            previous: 64,
            next: 32,
        };
        assert!(err.to_string().contains("64 followed by 32"));
    }
}
