//! Chunk records and the free/allocated pool.
//!
//! The pool owns two insertion-ordered collections. A chunk lives in exactly
//! one of them; every move between them happens inside a single `&mut self`
//! call, so no caller can observe a chunk in neither or both.

use serde::Serialize;

use crate::region::RegionHandle;

/// Bookkeeping for one reserved region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Reservation size: a partition class, or the exact oversized size.
    pub requested: usize,
    /// Bytes used by the current occupant. Stale while the chunk is free.
    pub used: usize,
    /// Identity of the backing region. Never changes.
    pub handle: RegionHandle,
}

impl Chunk {
    /// A pre-populated free chunk.
    #[must_use]
    pub const fn vacant(requested: usize, handle: RegionHandle) -> Self {
        Self {
            requested,
            used: 0,
            handle,
        }
    }
}

/// Read-only view of a chunk for status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkView {
    pub handle: RegionHandle,
    pub address: usize,
    pub requested_size: usize,
    pub used_size: usize,
}

/// Free and allocated chunk collections.
#[derive(Debug, Default)]
pub struct ChunkPool {
    free: Vec<Chunk>,
    allocated: Vec<Chunk>,
}

impl ChunkPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk to the free collection.
    pub fn insert_free(&mut self, chunk: Chunk) {
        debug_assert!(
            !self.contains(chunk.handle),
            "{} is already pooled",
            chunk.handle
        );
        self.free.push(chunk);
    }

    /// Appends a chunk to the allocated collection.
    pub fn insert_allocated(&mut self, chunk: Chunk) {
        debug_assert!(
            !self.contains(chunk.handle),
            "{} is already pooled",
            chunk.handle
        );
        self.allocated.push(chunk);
    }

    /// Removes and returns the free chunk at `index`, preserving the order of
    /// the rest.
    pub fn remove_free(&mut self, index: usize) -> Option<Chunk> {
        (index < self.free.len()).then(|| self.free.remove(index))
    }

    /// Removes and returns the allocated chunk with `handle`.
    pub fn remove_allocated(&mut self, handle: RegionHandle) -> Option<Chunk> {
        let index = self.position_allocated(handle)?;
        Some(self.allocated.remove(index))
    }

    /// Moves the free chunk at `index` to the allocated collection, recording
    /// `used` bytes for the new occupant.
    pub fn promote(&mut self, index: usize, used: usize) -> Option<Chunk> {
        let mut chunk = self.remove_free(index)?;
        chunk.used = used;
        self.allocated.push(chunk);
        Some(chunk)
    }

    /// Moves the allocated chunk with `handle` back to the free collection.
    ///
    /// `requested` is kept; `used` is left as it was.
    pub fn release(&mut self, handle: RegionHandle) -> Option<Chunk> {
        let chunk = self.remove_allocated(handle)?;
        self.free.push(chunk);
        Some(chunk)
    }

    /// Free chunks, oldest insertion first.
    #[must_use]
    pub fn free_chunks(&self) -> &[Chunk] {
        &self.free
    }

    pub fn iter_free(&self) -> impl Iterator<Item = &Chunk> {
        self.free.iter()
    }

    pub fn iter_allocated(&self) -> impl Iterator<Item = &Chunk> {
        self.allocated.iter()
    }

    #[must_use]
    pub fn position_allocated(&self, handle: RegionHandle) -> Option<usize> {
        self.allocated.iter().position(|chunk| chunk.handle == handle)
    }

    #[must_use]
    pub fn is_allocated(&self, handle: RegionHandle) -> bool {
        self.position_allocated(handle).is_some()
    }

    #[must_use]
    pub fn is_free(&self, handle: RegionHandle) -> bool {
        self.free.iter().any(|chunk| chunk.handle == handle)
    }

    #[must_use]
    pub fn contains(&self, handle: RegionHandle) -> bool {
        self.is_allocated(handle) || self.is_free(handle)
    }

    /// Number of free chunks whose reservation is exactly `size`.
    #[must_use]
    pub fn free_count_for_size(&self, size: usize) -> usize {
        self.free.iter().filter(|chunk| chunk.requested == size).count()
    }

    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn allocated_len(&self) -> usize {
        self.allocated.len()
    }
}
