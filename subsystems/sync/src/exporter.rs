//! # Fence Exporter
//!
//! Fences leave the driver twice: as an exported handle that user space can
//! poll, and as an import into the synx domain used by other cores. Both
//! live outside this crate and are reached through [`FenceExporter`].

use alloc::sync::Arc;

use vidc_core::Result;

use crate::fence::SyncFence;

/// Exported (poll/wait-able) fence handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExportHandle(pub i32);

/// Handle of a fence imported into the synx domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SynxHandle(pub u64);

/// Export and import backend for fences
///
/// An exporter may keep its own references to the fence until the matching
/// release call; the fence only drops once every holder let go.
pub trait FenceExporter: Send + Sync {
    /// Create an external handle for `fence`
    fn export(&self, fence: &Arc<SyncFence>) -> Result<ExportHandle>;

    /// Release a handle returned by [`export`](Self::export)
    fn release_export(&self, fence: &SyncFence, handle: ExportHandle) -> Result<()>;

    /// Import `fence` into the synx domain
    fn import_synx(&self, fence: &Arc<SyncFence>) -> Result<SynxHandle>;

    /// Release a handle returned by [`import_synx`](Self::import_synx)
    fn release_synx(&self, fence: &SyncFence, handle: SynxHandle) -> Result<()>;
}
