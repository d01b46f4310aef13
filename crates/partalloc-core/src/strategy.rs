//! Placement strategies over the free collection.
//!
//! Both strategies only read the free chunks and return the index of the
//! winner; moving it is the pool's job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::ConfigError;

/// Placement policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// First chunk in insertion order that is large enough.
    #[default]
    FirstFit,
    /// Smallest chunk that is large enough; earliest wins ties.
    BestFit,
}

impl Strategy {
    /// Index of the winning free chunk for a reservation of `actual` bytes.
    #[must_use]
    pub fn select(self, free: &[Chunk], actual: usize) -> Option<usize> {
        match self {
            Self::FirstFit => first_fit(free, actual),
            Self::BestFit => best_fit(free, actual),
        }
    }

    /// Machine label (`first-fit`, `best-fit`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstFit => "first-fit",
            Self::BestFit => "best-fit",
        }
    }

    /// Human label used in console narration.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstFit => "First Fit",
            Self::BestFit => "Best Fit",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "first-fit" | "firstfit" | "first" | "ff" => Ok(Self::FirstFit),
            "best-fit" | "bestfit" | "best" | "bf" => Ok(Self::BestFit),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// First chunk with `requested >= actual`. Stops at the first hit.
#[must_use]
pub fn first_fit(free: &[Chunk], actual: usize) -> Option<usize> {
    free.iter().position(|chunk| chunk.requested >= actual)
}

/// Feasible chunk with the smallest `requested`.
///
/// Scans everything, since the tightest fit can sit anywhere. The strict `<`
/// keeps the earliest chunk among equal sizes.
#[must_use]
pub fn best_fit(free: &[Chunk], actual: usize) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, chunk) in free.iter().enumerate() {
        if chunk.requested < actual {
            continue;
        }
        if best.is_none_or(|(_, size)| chunk.requested < size) {
            best = Some((index, chunk.requested));
        }
    }
    best.map(|(index, _)| index)
}
