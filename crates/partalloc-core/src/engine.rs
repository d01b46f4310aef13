//! Allocator engine.
//!
//! Composes the size classifier, chunk pool, placement strategy, and
//! allocation history into the allocate/free contract. Each engine owns its
//! state outright, so independent engines never share pools.

use std::collections::VecDeque;
use std::collections::vec_deque;

use serde::Serialize;

use crate::chunk::{Chunk, ChunkPool, ChunkView};
use crate::config::{EngineConfig, RuntimeMode};
use crate::error::{AllocError, DeallocError, InitError};
use crate::history::AllocationHistory;
use crate::log::{EngineLogLevel, EngineLogRecord};
use crate::region::{HeapRegionSource, RegionArena, RegionGrant, RegionHandle, RegionSource};
use crate::size_class::{Reservation, SizeClassifier};
use crate::strategy::Strategy;

/// Read-only snapshot of both collections, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub allocated: Vec<ChunkView>,
    pub free: Vec<ChunkView>,
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Successful allocations.
    pub allocations: u64,
    /// Allocations served from the free collection.
    pub reuse_hits: u64,
    /// Regions reserved from the source (pre-population included).
    pub fresh_regions: u64,
    /// Successful deallocations.
    pub deallocations: u64,
    /// Bytes reserved from the source.
    pub reserved_bytes: usize,
    /// Current allocation history depth.
    pub history_depth: usize,
    /// Lifecycle records evicted because the log buffer was full.
    pub dropped_log_records: u64,
}

/// How an allocation was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// An existing free chunk was reused.
    Reused,
    /// A new region was reserved.
    Fresh,
}

/// Result of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub handle: RegionHandle,
    pub address: usize,
    /// Bytes reserved for the chunk.
    pub reserved: usize,
    /// Bytes the caller asked for.
    pub used: usize,
    pub placement: Placement,
    pub strategy: Strategy,
}

/// Result of a successful deallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Release {
    pub handle: RegionHandle,
    pub address: usize,
    pub reserved: usize,
    /// True when the target came from the allocation history.
    pub from_history: bool,
}

/// Fixed-partition allocator engine.
pub struct AllocatorEngine<S = HeapRegionSource> {
    classifier: SizeClassifier,
    pool: ChunkPool,
    history: AllocationHistory,
    regions: RegionArena,
    source: S,
    strategy: Strategy,
    mode: RuntimeMode,
    stats: EngineStats,
    /// Monotonic lifecycle decision id.
    next_decision_id: u64,
    lifecycle_logs: VecDeque<EngineLogRecord>,
    log_capacity: usize,
}

impl AllocatorEngine<HeapRegionSource> {
    /// Default partition table, 5 free chunks per class, heap-backed regions.
    pub fn with_defaults() -> Result<Self, InitError> {
        Self::new(EngineConfig::default(), HeapRegionSource::new())
    }
}

impl<S: RegionSource> AllocatorEngine<S> {
    /// Builds an engine and pre-populates its free collection.
    ///
    /// Pre-population runs class-major: every chunk of the smallest class is
    /// inserted before any chunk of the next class.
    pub fn new(config: EngineConfig, source: S) -> Result<Self, InitError> {
        let classifier = config.classifier()?;
        let mut engine = Self {
            classifier,
            pool: ChunkPool::new(),
            history: AllocationHistory::new(),
            regions: RegionArena::new(),
            source,
            strategy: config.strategy,
            mode: config.mode,
            stats: EngineStats::default(),
            next_decision_id: 1,
            lifecycle_logs: VecDeque::new(),
            log_capacity: config.log_capacity,
        };
        engine.prepopulate(config.prepopulate_per_class)?;
        Ok(engine)
    }

    fn prepopulate(&mut self, per_class: usize) -> Result<(), AllocError> {
        if per_class == 0 {
            return Ok(());
        }
        let sizes = self.classifier.sizes().to_vec();
        for &size in &sizes {
            for _ in 0..per_class {
                let handle = self.reserve_region(size, "prepopulate")?;
                self.pool.insert_free(Chunk::vacant(size, handle));
            }
        }
        self.record_lifecycle(
            EngineLogLevel::Info,
            "prepopulate",
            "populate_free_list",
            None,
            None,
            None,
            "success",
            format!("per_class={} classes={}", per_class, sizes.len()),
        );
        Ok(())
    }

    fn next_log_decision_id(&mut self) -> u64 {
        let id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn record_lifecycle(
        &mut self,
        level: EngineLogLevel,
        symbol: &'static str,
        event: &'static str,
        handle: Option<RegionHandle>,
        size: Option<usize>,
        class: Option<usize>,
        outcome: &'static str,
        details: impl Into<String>,
    ) {
        let decision_id = self.next_log_decision_id();
        if self.log_capacity == 0 {
            return;
        }
        if self.lifecycle_logs.len() >= self.log_capacity {
            self.lifecycle_logs.pop_front();
            self.stats.dropped_log_records += 1;
        }
        let trace_id = format!("core::partalloc::{}::{:016x}", symbol, decision_id);
        self.lifecycle_logs.push_back(EngineLogRecord {
            decision_id,
            trace_id,
            level,
            symbol,
            event,
            handle,
            size,
            class,
            outcome,
            details: details.into(),
            allocated_count: self.pool.allocated_len(),
            free_count: self.pool.free_len(),
        });
    }

    /// Reserves a fresh region and stores it in the arena.
    ///
    /// On failure nothing has been inserted into either collection.
    fn reserve_region(
        &mut self,
        size: usize,
        symbol: &'static str,
    ) -> Result<RegionHandle, AllocError> {
        let reserved: Result<RegionGrant, _> = self.source.acquire(size);
        let handle = reserved.and_then(|grant| self.regions.insert(grant));
        match handle {
            Ok(handle) => {
                self.stats.fresh_regions += 1;
                self.stats.reserved_bytes += size;
                Ok(handle)
            }
            Err(source) => {
                self.record_lifecycle(
                    EngineLogLevel::Error,
                    symbol,
                    "region_exhausted",
                    None,
                    None,
                    Some(size),
                    "fatal",
                    format!("source={} error={}", self.source.name(), source),
                );
                Err(AllocError::RegionExhausted { size, source })
            }
        }
    }

    /// Allocates `requested` bytes with the configured strategy.
    pub fn allocate(&mut self, requested: usize) -> Result<RegionHandle, AllocError> {
        self.allocate_with(requested, self.strategy)
            .map(|allocation| allocation.handle)
    }

    /// Allocates `requested` bytes with an explicit strategy.
    ///
    /// A free chunk large enough for the reservation is reused; otherwise a
    /// new region of exactly the reservation size is reserved and goes
    /// straight to the allocated set.
    pub fn allocate_with(
        &mut self,
        requested: usize,
        strategy: Strategy,
    ) -> Result<Allocation, AllocError> {
        let reservation = match self.classifier.classify(requested) {
            Ok(reservation) => reservation,
            Err(err) => {
                self.record_lifecycle(
                    EngineLogLevel::Warn,
                    "allocate",
                    "invalid_size",
                    None,
                    Some(requested),
                    None,
                    "denied",
                    "classification_failed",
                );
                return Err(err);
            }
        };
        let actual = reservation.size();

        if let Some(index) = strategy.select(self.pool.free_chunks(), actual)
            && let Some(chunk) = self.pool.promote(index, requested)
        {
            self.history.push(chunk.handle);
            self.stats.allocations += 1;
            self.stats.reuse_hits += 1;
            self.record_lifecycle(
                EngineLogLevel::Trace,
                "allocate",
                "alloc_reuse",
                Some(chunk.handle),
                Some(requested),
                Some(actual),
                "success",
                format!(
                    "strategy={} chunk_size={} free_index={}",
                    strategy, chunk.requested, index
                ),
            );
            return Ok(Allocation {
                handle: chunk.handle,
                address: self.regions.address_of(chunk.handle),
                reserved: chunk.requested,
                used: requested,
                placement: Placement::Reused,
                strategy,
            });
        }

        let handle = self.reserve_region(actual, "allocate")?;
        self.pool.insert_allocated(Chunk {
            requested: actual,
            used: requested,
            handle,
        });
        self.history.push(handle);
        self.stats.allocations += 1;
        self.record_lifecycle(
            EngineLogLevel::Trace,
            "allocate",
            "alloc_fresh",
            Some(handle),
            Some(requested),
            Some(actual),
            "success",
            format!(
                "strategy={} oversized={}",
                strategy,
                matches!(reservation, Reservation::Oversized { .. })
            ),
        );
        Ok(Allocation {
            handle,
            address: self.regions.address_of(handle),
            reserved: actual,
            used: requested,
            placement: Placement::Fresh,
            strategy,
        })
    }

    /// Frees `target`, or the most recent allocation when `target` is `None`.
    ///
    /// An explicit target bypasses the history. In strict mode the history
    /// keeps any entry for that handle, so a later argument-less free may
    /// land on an already-freed region and report `InvalidFree`. Hardened
    /// mode purges those entries when the explicit free succeeds.
    pub fn deallocate(&mut self, target: Option<RegionHandle>) -> Result<Release, DeallocError> {
        let (handle, from_history) = match target {
            Some(handle) => (handle, false),
            None => match self.history.pop() {
                Some(handle) => (handle, true),
                None => {
                    self.record_lifecycle(
                        EngineLogLevel::Info,
                        "deallocate",
                        "nothing_to_free",
                        None,
                        None,
                        None,
                        "noop",
                        "history_empty",
                    );
                    return Err(DeallocError::NothingToFree);
                }
            },
        };

        let Some(chunk) = self.pool.release(handle) else {
            self.record_lifecycle(
                EngineLogLevel::Error,
                "deallocate",
                "invalid_free",
                Some(handle),
                None,
                None,
                "fatal",
                format!(
                    "from_history={} handle_issued={}",
                    from_history,
                    handle.index() < self.regions.len()
                ),
            );
            return Err(DeallocError::InvalidFree { handle });
        };

        let purged = if !from_history && self.mode.purges_history() {
            self.history.purge(handle)
        } else {
            0
        };
        self.stats.deallocations += 1;
        self.record_lifecycle(
            EngineLogLevel::Trace,
            "deallocate",
            "free",
            Some(handle),
            Some(chunk.used),
            Some(chunk.requested),
            "success",
            format!("from_history={} purged={}", from_history, purged),
        );
        Ok(Release {
            handle,
            address: self.regions.address_of(handle),
            reserved: chunk.requested,
            from_history,
        })
    }

    /// Frees the most recent allocation.
    pub fn deallocate_latest(&mut self) -> Result<Release, DeallocError> {
        self.deallocate(None)
    }

    /// Frees a specific region.
    pub fn deallocate_handle(&mut self, handle: RegionHandle) -> Result<Release, DeallocError> {
        self.deallocate(Some(handle))
    }

    fn view(&self, chunk: &Chunk) -> ChunkView {
        ChunkView {
            handle: chunk.handle,
            address: self.regions.address_of(chunk.handle),
            requested_size: chunk.requested,
            used_size: chunk.used,
        }
    }

    /// Snapshot of the allocated and free collections.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            allocated: self
                .pool
                .iter_allocated()
                .map(|chunk| self.view(chunk))
                .collect(),
            free: self.pool.iter_free().map(|chunk| self.view(chunk)).collect(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            history_depth: self.history.len(),
            ..self.stats
        }
    }

    /// Free chunks whose reservation is exactly `size`.
    #[must_use]
    pub fn free_count_for_class(&self, size: usize) -> usize {
        self.pool.free_count_for_size(size)
    }

    #[must_use]
    pub fn is_allocated(&self, handle: RegionHandle) -> bool {
        self.pool.is_allocated(handle)
    }

    #[must_use]
    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    #[must_use]
    pub fn history(&self) -> &AllocationHistory {
        &self.history
    }

    #[must_use]
    pub fn classifier(&self) -> &SizeClassifier {
        &self.classifier
    }

    /// Base address of a region, or 0 if this engine never issued it.
    #[must_use]
    pub fn address_of(&self, handle: RegionHandle) -> usize {
        self.regions.address_of(handle)
    }

    /// Backing bytes of an allocated region, when the source provides them.
    pub fn region_bytes_mut(&mut self, handle: RegionHandle) -> Option<&mut [u8]> {
        if !self.pool.is_allocated(handle) {
            return None;
        }
        self.regions.get_mut(handle)?.bytes_mut()
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[must_use]
    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// Retained lifecycle records, oldest first.
    ///
    /// At most `log_capacity` records are kept; older ones are evicted and
    /// counted in [`EngineStats::dropped_log_records`].
    pub fn logs(&self) -> vec_deque::Iter<'_, EngineLogRecord> {
        self.lifecycle_logs.iter()
    }

    /// Takes all retained lifecycle records.
    pub fn drain_logs(&mut self) -> Vec<EngineLogRecord> {
        self.lifecycle_logs.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegionError;
    use crate::region::SimulatedRegionSource;

    fn engine(prepopulate: usize, mode: RuntimeMode) -> AllocatorEngine<SimulatedRegionSource> {
        let config = EngineConfig::empty()
            .with_prepopulate(prepopulate)
            .with_mode(mode);
        AllocatorEngine::new(config, SimulatedRegionSource::new()).unwrap()
    }

    #[test]
    fn prepopulation_is_class_major() {
        let engine = engine(2, RuntimeMode::Strict);
        let sizes: Vec<_> = engine
            .status()
            .free
            .iter()
            .map(|view| view.requested_size)
            .collect();
        assert_eq!(sizes, vec![32, 32, 64, 64, 128, 128, 256, 256, 512, 512]);
        assert!(engine.status().allocated.is_empty());
        assert_eq!(engine.stats().fresh_regions, 10);
        assert!(engine.history().is_empty());
    }

    #[test]
    fn reuse_sets_used_to_caller_size() {
        let mut engine = engine(1, RuntimeMode::Strict);
        let allocation = engine.allocate_with(100, Strategy::FirstFit).unwrap();
        assert_eq!(allocation.placement, Placement::Reused);
        assert_eq!(allocation.reserved, 128);
        assert_eq!(allocation.used, 100);
        let status = engine.status();
        assert_eq!(status.allocated.len(), 1);
        assert_eq!(status.allocated[0].used_size, 100);
        assert_eq!(status.allocated[0].requested_size, 128);
    }

    #[test]
    fn growth_when_no_free_chunk_fits() {
        let mut engine = engine(0, RuntimeMode::Strict);
        let allocation = engine.allocate_with(10, Strategy::BestFit).unwrap();
        assert_eq!(allocation.placement, Placement::Fresh);
        assert_eq!(allocation.reserved, 32);
        assert!(engine.status().free.is_empty());
        assert_eq!(engine.stats().reserved_bytes, 32);
    }

    #[test]
    fn zero_size_changes_nothing() {
        let mut engine = engine(1, RuntimeMode::Strict);
        let before = engine.status();
        assert_eq!(
            engine.allocate(0),
            Err(AllocError::InvalidSize { requested: 0 })
        );
        assert_eq!(engine.status(), before);
        assert!(engine.history().is_empty());
        assert_eq!(engine.logs().next_back().unwrap().event, "invalid_size");
    }

    #[test]
    fn region_exhaustion_leaves_no_dangling_chunk() {
        let config = EngineConfig::empty().with_mode(RuntimeMode::Strict);
        let mut engine =
            AllocatorEngine::new(config, SimulatedRegionSource::with_budget(64)).unwrap();
        engine.allocate(64).unwrap();
        let err = engine.allocate(1).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, AllocError::RegionExhausted { size: 32, .. }));
        assert_eq!(engine.status().allocated.len(), 1);
        assert!(engine.status().free.is_empty());
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn prepopulation_failure_is_reported() {
        let config = EngineConfig::default().with_mode(RuntimeMode::Strict);
        let result = AllocatorEngine::new(config, SimulatedRegionSource::with_budget(100));
        assert!(matches!(
            result,
            Err(InitError::Prepopulate(AllocError::RegionExhausted { .. }))
        ));
    }

    #[test]
    fn deallocate_on_empty_history_is_nothing_to_free() {
        let mut engine = engine(1, RuntimeMode::Strict);
        assert_eq!(engine.deallocate(None), Err(DeallocError::NothingToFree));
        assert_eq!(engine.status().free.len(), 5);
    }

    #[test]
    fn unknown_handle_is_invalid_free() {
        let mut engine = engine(1, RuntimeMode::Strict);
        let handle = RegionHandle::from_raw(4_000);
        let err = engine.deallocate(Some(handle)).unwrap_err();
        assert_eq!(err, DeallocError::InvalidFree { handle });
        assert!(err.is_fatal());
    }

    #[test]
    fn freeing_a_free_chunk_is_invalid() {
        let mut engine = engine(1, RuntimeMode::Strict);
        let free_handle = engine.status().free[0].handle;
        assert!(matches!(
            engine.deallocate_handle(free_handle),
            Err(DeallocError::InvalidFree { .. })
        ));
    }

    #[test]
    fn strict_mode_leaves_history_stale() {
        let mut engine = engine(0, RuntimeMode::Strict);
        let a = engine.allocate(10).unwrap();
        let b = engine.allocate(20).unwrap();
        engine.deallocate_handle(a).unwrap();
        assert!(engine.history().contains(a));

        assert_eq!(engine.deallocate_latest().unwrap().handle, b);
        assert_eq!(
            engine.deallocate_latest(),
            Err(DeallocError::InvalidFree { handle: a })
        );
    }

    #[test]
    fn hardened_mode_purges_history_on_explicit_free() {
        let mut engine = engine(0, RuntimeMode::Hardened);
        let a = engine.allocate(10).unwrap();
        let b = engine.allocate(20).unwrap();
        engine.deallocate_handle(a).unwrap();
        assert!(!engine.history().contains(a));

        assert_eq!(engine.deallocate_latest().unwrap().handle, b);
        assert_eq!(engine.deallocate_latest(), Err(DeallocError::NothingToFree));
    }

    #[test]
    fn release_reports_history_origin() {
        let mut engine = engine(1, RuntimeMode::Strict);
        let a = engine.allocate(10).unwrap();
        let release = engine.deallocate(None).unwrap();
        assert_eq!(release.handle, a);
        assert!(release.from_history);
        assert_eq!(release.reserved, 32);
    }

    #[test]
    fn heap_backed_regions_are_writable_while_allocated() {
        let config = EngineConfig::empty().with_mode(RuntimeMode::Strict);
        let mut engine = AllocatorEngine::new(config, HeapRegionSource::new()).unwrap();
        let handle = engine.allocate(40).unwrap();
        let bytes = engine.region_bytes_mut(handle).unwrap();
        assert_eq!(bytes.len(), 64);
        bytes[63] = 7;
        engine.deallocate_handle(handle).unwrap();
        assert!(engine.region_bytes_mut(handle).is_none());
    }

    #[test]
    fn huge_heap_request_is_region_exhaustion() {
        let config = EngineConfig::empty().with_mode(RuntimeMode::Strict);
        let mut engine = AllocatorEngine::new(config, HeapRegionSource::new()).unwrap();
        let err = engine.allocate(usize::MAX / 2).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            AllocError::RegionExhausted {
                source: RegionError::TooLarge { .. },
                ..
            }
        ));
        assert!(engine.status().allocated.is_empty());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn lifecycle_logs_drain() {
        let mut engine = engine(1, RuntimeMode::Strict);
        engine.allocate(10).unwrap();
        engine.deallocate(None).unwrap();
        let logs = engine.drain_logs();
        let events: Vec<_> = logs.iter().map(|record| record.event).collect();
        assert_eq!(events, vec!["populate_free_list", "alloc_reuse", "free"]);
        assert!(logs[1].trace_id.starts_with("core::partalloc::allocate::"));
        assert!(logs.windows(2).all(|w| w[0].decision_id < w[1].decision_id));
        assert_eq!(engine.logs().len(), 0);
    }

    #[test]
    fn lifecycle_log_buffer_is_bounded() {
        let config = EngineConfig::empty()
            .with_mode(RuntimeMode::Strict)
            .with_log_capacity(8);
        let mut engine = AllocatorEngine::new(config, SimulatedRegionSource::new()).unwrap();
        for _ in 0..1_000 {
            let handle = engine.allocate(40).unwrap();
            engine.deallocate(None).unwrap();
            assert!(!engine.is_allocated(handle));
        }
        assert_eq!(engine.logs().len(), 8);
        assert_eq!(engine.stats().dropped_log_records, 2_000 - 8);
        // The newest records survive eviction.
        assert_eq!(engine.logs().next_back().unwrap().event, "free");
        let ids: Vec<u64> = engine.logs().map(|record| record.decision_id).collect();
        assert_eq!(ids, (1_993..=2_000).collect::<Vec<u64>>());
    }

    #[test]
    fn zero_log_capacity_disables_collection() {
        let config = EngineConfig::default()
            .with_mode(RuntimeMode::Strict)
            .with_log_capacity(0);
        let mut engine = AllocatorEngine::new(config, SimulatedRegionSource::new()).unwrap();
        engine.allocate(10).unwrap();
        engine.deallocate(None).unwrap();
        assert_eq!(engine.logs().len(), 0);
        assert_eq!(engine.stats().dropped_log_records, 0);
        assert!(engine.drain_logs().is_empty());
    }
}
