//! Raw region acquisition and the region arena.
//!
//! A [`RegionSource`] hands out address ranges that are never returned:
//! once reserved, a region stays reserved for the lifetime of the engine
//! that owns it. Regions are stored in a [`RegionArena`] and referred to by
//! a stable [`RegionHandle`] index, so handles never alias raw memory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegionError;

/// Base address for simulated regions. Starts high to stay clear of null.
const SIMULATED_BASE: usize = 0x1_0000;

/// Alignment applied to simulated region bases.
const SIMULATED_ALIGN: usize = 16;

/// Rounds `size` up to the simulated alignment.
fn align_up(size: usize) -> Option<usize> {
    size.checked_add(SIMULATED_ALIGN - 1)
        .map(|v| v & !(SIMULATED_ALIGN - 1))
}

/// Stable identity of a reserved region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionHandle(u32);

impl RegionHandle {
    /// Builds a handle from its raw index.
    ///
    /// A handle that was not issued by an engine is simply unknown to it;
    /// freeing one reports `InvalidFree`.
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// A region handed out by a source.
#[derive(Debug)]
pub struct RegionGrant {
    /// Address of the first byte, for reporting.
    pub base: usize,
    /// Reserved length in bytes.
    pub len: usize,
    /// Owned backing bytes, if the source provides real memory.
    backing: Option<Box<[u8]>>,
}

impl RegionGrant {
    /// A grant with no backing memory (address bookkeeping only).
    #[must_use]
    pub fn detached(base: usize, len: usize) -> Self {
        Self {
            base,
            len,
            backing: None,
        }
    }

    /// A grant that owns its bytes. The base is the buffer's address.
    #[must_use]
    pub fn backed(buffer: Box<[u8]>) -> Self {
        Self {
            base: buffer.as_ptr() as usize,
            len: buffer.len(),
            backing: Some(buffer),
        }
    }

    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.backing.as_deref()
    }

    #[must_use]
    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.backing.as_deref_mut()
    }
}

/// Provider of raw, never-reused regions.
///
/// One failed acquisition is final for the request that triggered it; the
/// engine does not retry.
pub trait RegionSource {
    /// Reserves a region of exactly `size` bytes.
    fn acquire(&mut self, size: usize) -> Result<RegionGrant, RegionError>;

    /// Total bytes handed out so far.
    fn reserved_bytes(&self) -> usize;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

fn check_budget(budget: Option<usize>, reserved: usize, size: usize) -> Result<(), RegionError> {
    if size == 0 {
        return Err(RegionError::ZeroSize);
    }
    if let Some(budget) = budget {
        let remaining = budget.saturating_sub(reserved);
        if size > remaining {
            return Err(RegionError::Exhausted {
                requested: size,
                remaining,
            });
        }
    }
    Ok(())
}

/// Largest single region [`HeapRegionSource`] hands out by default (256 MiB).
pub const DEFAULT_MAX_HEAP_REGION: usize = 256 * 1024 * 1024;

/// Acquires zeroed buffers from the global heap.
///
/// Zero-filling touches every page of the region. Under memory overcommit a
/// reservation can succeed and the fill still exhaust physical memory, so
/// single regions are capped at `max_region` bytes and larger requests fail
/// with [`RegionError::TooLarge`] before any memory is reserved.
#[derive(Debug)]
pub struct HeapRegionSource {
    budget: Option<usize>,
    max_region: usize,
    reserved: usize,
}

impl HeapRegionSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            budget: None,
            max_region: DEFAULT_MAX_HEAP_REGION,
            reserved: 0,
        }
    }

    /// Caps the total bytes this source will hand out.
    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }

    /// Overrides the single-region cap.
    #[must_use]
    pub fn with_max_region(mut self, max_region: usize) -> Self {
        self.max_region = max_region;
        self
    }
}

impl Default for HeapRegionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionSource for HeapRegionSource {
    fn acquire(&mut self, size: usize) -> Result<RegionGrant, RegionError> {
        check_budget(self.budget, self.reserved, size)?;
        if size > self.max_region {
            return Err(RegionError::TooLarge {
                requested: size,
                limit: self.max_region,
            });
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| RegionError::HostAllocationFailed { requested: size })?;
        buffer.resize(size, 0u8);
        self.reserved += size;
        Ok(RegionGrant::backed(buffer.into_boxed_slice()))
    }

    fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    fn name(&self) -> &'static str {
        "heap"
    }
}

/// Deterministic bump-address source with no backing memory.
///
/// Addresses start at a fixed base and advance by the aligned region size,
/// which makes reports reproducible across runs.
#[derive(Debug)]
pub struct SimulatedRegionSource {
    next_base: usize,
    budget: Option<usize>,
    reserved: usize,
}

impl SimulatedRegionSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_base: SIMULATED_BASE,
            budget: None,
            reserved: 0,
        }
    }

    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }
}

impl Default for SimulatedRegionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionSource for SimulatedRegionSource {
    fn acquire(&mut self, size: usize) -> Result<RegionGrant, RegionError> {
        check_budget(self.budget, self.reserved, size)?;
        let stride = align_up(size).ok_or(RegionError::AddressOverflow { requested: size })?;
        let base = self.next_base;
        self.next_base = base
            .checked_add(stride)
            .ok_or(RegionError::AddressOverflow { requested: size })?;
        self.reserved += size;
        Ok(RegionGrant::detached(base, size))
    }

    fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Owns every region an engine has reserved, indexed by handle.
#[derive(Debug, Default)]
pub struct RegionArena {
    grants: Vec<RegionGrant>,
}

impl RegionArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a grant and returns its handle.
    pub fn insert(&mut self, grant: RegionGrant) -> Result<RegionHandle, RegionError> {
        let index = u32::try_from(self.grants.len()).map_err(|_| RegionError::SlotSpace {
            capacity: u32::MAX as usize,
        })?;
        self.grants.push(grant);
        Ok(RegionHandle(index))
    }

    #[must_use]
    pub fn get(&self, handle: RegionHandle) -> Option<&RegionGrant> {
        self.grants.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: RegionHandle) -> Option<&mut RegionGrant> {
        self.grants.get_mut(handle.index())
    }

    /// Base address of `handle`, or 0 if the arena never issued it.
    #[must_use]
    pub fn address_of(&self, handle: RegionHandle) -> usize {
        self.get(handle).map_or(0, |grant| grant.base)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Sum of all reserved region lengths.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.grants.iter().map(|grant| grant.len).sum()
    }
}
