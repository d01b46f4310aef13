//! Partition classes for small requests.
//!
//! A request is rounded up to the first partition class that can hold it.
//! Requests larger than the biggest class skip classification entirely and
//! are reserved at their exact size (no rounding).

use serde::Serialize;

use crate::error::{AllocError, ConfigError};

/// Default partition classes (bytes), ascending.
pub const PARTITION_SIZES: [usize; 5] = [32, 64, 128, 256, 512];

/// Number of default partition classes.
pub const NUM_PARTITION_CLASSES: usize = PARTITION_SIZES.len();

/// Largest default partition class. Above this, requests are oversized.
pub const MAX_PARTITION_SIZE: usize = PARTITION_SIZES[NUM_PARTITION_CLASSES - 1];

/// How much memory a request reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reservation {
    /// Rounded up to the partition class at `index`.
    Class { index: usize, size: usize },
    /// Larger than every class; reserved at exactly this many bytes.
    Oversized { size: usize },
}

impl Reservation {
    /// Bytes reserved for the request.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Class { size, .. } | Self::Oversized { size } => size,
        }
    }

    /// Class index, or `None` for oversized requests.
    #[must_use]
    pub const fn class_index(self) -> Option<usize> {
        match self {
            Self::Class { index, .. } => Some(index),
            Self::Oversized { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_oversized(self) -> bool {
        matches!(self, Self::Oversized { .. })
    }
}

/// Maps requested byte counts onto a fixed partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeClassifier {
    sizes: Vec<usize>,
}

impl SizeClassifier {
    /// Builds a classifier over `sizes`.
    ///
    /// The table must be non-empty, free of zeros, and strictly ascending,
    /// since classification returns the first class that fits.
    pub fn new(sizes: &[usize]) -> Result<Self, ConfigError> {
        if sizes.is_empty() {
            return Err(ConfigError::EmptyPartitionTable);
        }
        for (index, &size) in sizes.iter().enumerate() {
            if size == 0 {
                return Err(ConfigError::ZeroPartition { index });
            }
            if index > 0 && sizes[index - 1] >= size {
                return Err(ConfigError::NotAscending {
                    previous: sizes[index - 1],
                    next: size,
                });
            }
        }
        Ok(Self {
            sizes: sizes.to_vec(),
        })
    }

    /// Classifies a request.
    ///
    /// Zero-byte requests fail with `InvalidSize`. Requests above the largest
    /// class are `Oversized` and keep their exact size.
    pub fn classify(&self, requested: usize) -> Result<Reservation, AllocError> {
        if requested == 0 {
            return Err(AllocError::InvalidSize { requested });
        }
        match self.class_index(requested) {
            Some(index) => Ok(Reservation::Class {
                index,
                size: self.sizes[index],
            }),
            None => Ok(Reservation::Oversized { size: requested }),
        }
    }

    /// Index of the first class `>= requested`, or `None` past the largest class.
    #[must_use]
    pub fn class_index(&self, requested: usize) -> Option<usize> {
        // Tables are tiny; a linear scan keeps the first-fit tie-break obvious.
        self.sizes.iter().position(|&size| requested <= size)
    }

    /// Size of class `index`. Returns 0 for out-of-range indices.
    #[must_use]
    pub fn class_size(&self, index: usize) -> usize {
        self.sizes.get(index).copied().unwrap_or(0)
    }

    /// Largest partition class.
    #[must_use]
    pub fn largest(&self) -> usize {
        self.sizes.last().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }
}

impl Default for SizeClassifier {
    fn default() -> Self {
        Self {
            sizes: PARTITION_SIZES.to_vec(),
        }
    }
}

/// Reservation size for `requested` under the default partition table.
///
/// Returns `None` for zero-byte requests.
#[must_use]
pub fn classify(requested: usize) -> Option<usize> {
    SizeClassifier::default()
        .classify(requested)
        .ok()
        .map(Reservation::size)
}
