//! # partalloc-core
//!
//! A user-space allocator simulator built on fixed partition classes.
//!
//! Requests are rounded up to one of the partition classes (32, 64, 128,
//! 256, 512 bytes by default) and served from a pool of free chunks using a
//! pluggable placement strategy (first-fit or best-fit). When nothing fits,
//! a new region is reserved from a [`RegionSource`] and never returned to it.
//! Freed chunks go back to the pool for reuse; there is no coalescing,
//! splitting, or compaction.
//!
//! ```text
//!   allocate(n) -> classify -> strategy over free list -> hit:  promote to allocated
//!                                                       -> miss: reserve region
//!   deallocate(None)    -> pop allocation history (LIFO) -> release to free list
//!   deallocate(Some(h)) -> release h to free list
//! ```

#![deny(unsafe_code)]

pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod log;
pub mod region;
pub mod shared;
pub mod size_class;
pub mod strategy;

pub use chunk::{Chunk, ChunkPool, ChunkView};
pub use config::{
    DEFAULT_LOG_CAPACITY, DEFAULT_PREPOPULATE_PER_CLASS, EngineConfig, MODE_ENV_VAR, RuntimeMode,
    runtime_mode,
};
pub use engine::{Allocation, AllocatorEngine, EngineStats, Placement, Release, StatusSnapshot};
pub use error::{AllocError, ConfigError, DeallocError, InitError, RegionError};
pub use history::AllocationHistory;
pub use log::{EngineLogLevel, EngineLogRecord};
pub use region::{
    DEFAULT_MAX_HEAP_REGION, HeapRegionSource, RegionArena, RegionGrant, RegionHandle, RegionSource,
    SimulatedRegionSource,
};
pub use shared::SharedEngine;
pub use size_class::{Reservation, SizeClassifier, classify};
pub use strategy::Strategy;
