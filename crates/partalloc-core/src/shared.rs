//! Engine behind a single lock.
//!
//! Allocation and deallocation both read then write the free/allocated
//! partition and the history, so all three sit under one
//! `parking_lot::Mutex`. A chunk mid-move is never visible to another thread.

use parking_lot::Mutex;

use crate::engine::{Allocation, AllocatorEngine, EngineStats, Release, StatusSnapshot};
use crate::error::{AllocError, DeallocError};
use crate::log::EngineLogRecord;
use crate::region::{RegionHandle, RegionSource};
use crate::strategy::Strategy;

/// Thread-safe wrapper around an [`AllocatorEngine`].
pub struct SharedEngine<S> {
    inner: Mutex<AllocatorEngine<S>>,
}

impl<S: RegionSource> SharedEngine<S> {
    #[must_use]
    pub fn new(engine: AllocatorEngine<S>) -> Self {
        Self {
            inner: Mutex::new(engine),
        }
    }

    pub fn allocate(&self, requested: usize) -> Result<RegionHandle, AllocError> {
        self.inner.lock().allocate(requested)
    }

    pub fn allocate_with(
        &self,
        requested: usize,
        strategy: Strategy,
    ) -> Result<Allocation, AllocError> {
        self.inner.lock().allocate_with(requested, strategy)
    }

    pub fn deallocate(&self, target: Option<RegionHandle>) -> Result<Release, DeallocError> {
        self.inner.lock().deallocate(target)
    }

    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.inner.lock().status()
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.inner.lock().stats()
    }

    /// Takes the engine's retained lifecycle records.
    pub fn drain_logs(&self) -> Vec<EngineLogRecord> {
        self.inner.lock().drain_logs()
    }

    /// Runs `f` with the lock held, for compound operations.
    pub fn with<R>(&self, f: impl FnOnce(&mut AllocatorEngine<S>) -> R) -> R {
        f(&mut *self.inner.lock())
    }

    pub fn into_inner(self) -> AllocatorEngine<S> {
        self.inner.into_inner()
    }
}
