//! # Sync Fences
//!
//! A [`SyncFence`] is a single-shot completion object stamped with a
//! sequence number of its [`Timeline`]. The driver keeps one reference in
//! its trackers and every external holder (exported handle, synx import)
//! keeps another. The fence holds a timeline reference until it drops.

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;
use spin::Mutex;

use crate::exporter::{ExportHandle, SynxHandle};
use crate::timeline::Timeline;

bitflags! {
    /// Tracking flags shared by fences and buffer bindings
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SyncFlags: u32 {
        /// Signal with an error status when destroyed
        const ERROR    = 0x1;
        /// Created ahead of the buffer it belongs to
        const DEFERRED = 0x2;
        /// Buffer handed to firmware
        const QUEUED   = 0x4;
    }
}

/// Completion status of a fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// Not signaled yet
    Pending,
    /// Signaled normally
    Signaled,
    /// Signaled with an error so waiters can recover
    Error,
}

#[derive(Debug)]
struct FenceState {
    flags: SyncFlags,
    status: FenceStatus,
    export: Option<ExportHandle>,
    synx: Option<SynxHandle>,
}

/// Fence on a [`Timeline`]
pub struct SyncFence {
    seqno: u64,
    context: u64,
    name: String,
    timeline: Arc<Timeline>,
    state: Mutex<FenceState>,
}

impl SyncFence {
    pub(crate) fn new(timeline: Arc<Timeline>, seqno: u64, name: String) -> Self {
        Self {
            seqno,
            context: timeline.context(),
            name,
            timeline,
            state: Mutex::new(FenceState {
                flags: SyncFlags::empty(),
                status: FenceStatus::Pending,
                export: None,
                synx: None,
            }),
        }
    }

    /// Sequence number on the owning timeline
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// Identity of the owning timeline
    pub fn context(&self) -> u64 {
        self.context
    }

    /// Name used in log messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning timeline
    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    /// Current tracking flags
    pub fn flags(&self) -> SyncFlags {
        self.state.lock().flags
    }

    /// Set tracking flags
    pub fn insert_flags(&self, flags: SyncFlags) {
        self.state.lock().flags.insert(flags);
    }

    /// Exported handle, if exported
    pub fn export_handle(&self) -> Option<ExportHandle> {
        self.state.lock().export
    }

    /// Synx import handle, if imported
    pub fn synx_handle(&self) -> Option<SynxHandle> {
        self.state.lock().synx
    }

    pub(crate) fn set_export_handle(&self, handle: Option<ExportHandle>) {
        self.state.lock().export = handle;
    }

    pub(crate) fn set_synx_handle(&self, handle: Option<SynxHandle>) {
        self.state.lock().synx = handle;
    }

    pub(crate) fn take_synx_handle(&self) -> Option<SynxHandle> {
        self.state.lock().synx.take()
    }

    pub(crate) fn take_export_handle(&self) -> Option<ExportHandle> {
        self.state.lock().export.take()
    }

    /// Completion status
    pub fn status(&self) -> FenceStatus {
        self.state.lock().status
    }

    /// Signal the fence
    ///
    /// Returns `false` when it was already signaled; a fence signals once.
    pub fn signal(&self) -> bool {
        self.signal_with(FenceStatus::Signaled)
    }

    /// Signal the fence with an error status
    pub fn signal_error(&self) -> bool {
        self.signal_with(FenceStatus::Error)
    }

    fn signal_with(&self, status: FenceStatus) -> bool {
        let mut state = self.state.lock();
        if state.status != FenceStatus::Pending {
            return false;
        }
        state.status = status;
        true
    }

    /// Whether waiters on this fence may proceed
    ///
    /// A pending fence reports signaled while its session is in an error
    /// state, so other devices are not left waiting on frames that will
    /// never be processed. A session that is already gone reports pending.
    pub fn signaled(&self) -> bool {
        if self.status() != FenceStatus::Pending {
            return true;
        }

        let Some(session) = self.timeline.session() else {
            log::error!("{}: session gone", self.name);
            return false;
        };
        let signal = session.is_session_error();
        if signal {
            log::error!("{}: signaled due to session error", self.name);
        }
        signal
    }
}

impl Drop for SyncFence {
    fn drop(&mut self) {
        self.timeline.forget_released(self.seqno);
        let pending = Arc::strong_count(&self.timeline) - 1;
        if self.timeline.is_session_closed() {
            log::error!("release {}: timeline refs pending {}", self.name, pending);
        } else {
            log::debug!("release {}: timeline refs pending {}", self.name, pending);
        }
    }
}

impl fmt::Debug for SyncFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SyncFence")
            .field("ctx", &self.context)
            .field("seq", &self.seqno)
            .field("flags", &state.flags)
            .field("status", &state.status)
            .field("export", &state.export)
            .field("synx", &state.synx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{tests::TestSession, TimelineKind};
    use vidc_core::SessionHealth;

    #[test]
    fn test_signal_once() {
        let session = TestSession::new(1);
        let session_dyn: Arc<dyn SessionHealth> = session.clone();
        let timeline = Timeline::new(TimelineKind::Signal, &session_dyn);
        let fence = timeline.create_fence();

        assert_eq!(fence.status(), FenceStatus::Pending);
        assert!(!fence.signaled());
        assert!(fence.signal());
        assert!(!fence.signal_error());
        assert_eq!(fence.status(), FenceStatus::Signaled);
        assert!(fence.signaled());
    }

    #[test]
    fn test_signaled_follows_session_error() {
        let session = TestSession::new(2);
        let session_dyn: Arc<dyn SessionHealth> = session.clone();
        let timeline = Timeline::new(TimelineKind::Wait, &session_dyn);
        let fence = timeline.create_fence();

        assert!(!fence.signaled());
        session.set_error(true);
        assert!(fence.signaled());
        // the query does not signal the fence itself
        assert_eq!(fence.status(), FenceStatus::Pending);
    }

    #[test]
    fn test_signaled_after_session_drop() {
        let session = TestSession::new(3);
        session.set_error(true);
        let session_dyn: Arc<dyn SessionHealth> = session;
        let timeline = Timeline::new(TimelineKind::Wait, &session_dyn);
        let fence = timeline.create_fence();
        drop(session_dyn);

        assert!(!fence.signaled());
    }

    #[test]
    fn test_flags() {
        let session = TestSession::new(4);
        let session_dyn: Arc<dyn SessionHealth> = session;
        let timeline = Timeline::new(TimelineKind::Signal, &session_dyn);
        let fence = timeline.create_fence();

        assert!(fence.flags().is_empty());
        fence.insert_flags(SyncFlags::ERROR);
        assert!(fence.flags().contains(SyncFlags::ERROR));
        assert_eq!(fence.context(), timeline.context());
        assert!(fence.name().ends_with("seq 1"));
    }
}
