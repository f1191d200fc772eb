//! # VIDC Fence Synchronization
//!
//! Buffer release synchronization between the video core and other devices.
//! Each session owns two [`Timeline`]s. The client allocates a wait/signal
//! [`SyncFence`] pair per frame, binds it to a buffer index, and the
//! [`SynxTracker`] retires pairs as buffers come back from firmware.
//!
//! ## Ownership
//!
//! ```text
//!   SynxTracker ──Arc──► Timeline ◄──Arc── SyncFence ◄──Arc── external holders
//!        │                  │                  ▲             (exported handle,
//!        │                  └─ submit list ────┘              synx import)
//!        └─ buffer bindings ───────────────────┘
//! ```
//!
//! A fence keeps its timeline alive; a timeline goes away only after the
//! session released it and its last fence dropped.
//!
//! ## Locking
//!
//! The tracker lock may be held while taking a timeline lock, never the
//! other way round. Fence state has its own lock and nothing is taken while
//! holding it.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod exporter;
pub mod fence;
pub mod synx;
pub mod timeline;

pub use exporter::{ExportHandle, FenceExporter, SynxHandle};
pub use fence::{FenceStatus, SyncFence, SyncFlags};
pub use synx::{FencePair, SynxBuffer, SynxTracker};
pub use timeline::{Timeline, TimelineKind};
