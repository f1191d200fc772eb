//! # Fence Timelines
//!
//! Every session owns a wait timeline and a signal timeline. A timeline
//! hands out monotonically increasing sequence numbers and tracks its fences
//! on two lists:
//!
//! ```text
//!   create_fence ──► submit list ──take_first (FIFO)──► buffer binding
//!                                                          │ destroy
//!                                                          ▼
//!                    release list ◄──────────────── mark_released
//!                         │
//!                         └── entry removed when the fence finally drops
//! ```
//!
//! Fences on the submit list are owned by the timeline. Fences on the
//! release list are only observed; whoever still holds them decides when
//! they drop. The session keeps one timeline reference and every live fence
//! keeps another.

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;
use vidc_core::SessionHealth;

use crate::fence::SyncFence;

/// Next free fence context, shared by every timeline
static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

fn alloc_context() -> u64 {
    NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)
}

/// Role of a timeline within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineKind {
    /// Fences the hardware waits on before processing a buffer
    Wait,
    /// Fences signaled once a buffer is processed
    Signal,
}

impl TimelineKind {
    fn label(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Signal => "signal",
        }
    }
}

#[derive(Default)]
struct TimelineLists {
    next_value: u64,
    submit: VecDeque<Arc<SyncFence>>,
    release: Vec<(u64, Weak<SyncFence>)>,
}

/// Sequence-number source for one family of fences
pub struct Timeline {
    kind: TimelineKind,
    context: u64,
    name: String,
    fence_prefix: String,
    session: Weak<dyn SessionHealth>,
    session_closed: AtomicBool,
    lists: Mutex<TimelineLists>,
}

impl Timeline {
    /// Create a timeline owned by `session`
    pub fn new(kind: TimelineKind, session: &Arc<dyn SessionHealth>) -> Arc<Self> {
        let context = alloc_context();
        let label = format!("{:08x}", session.session_id());
        let timeline = Arc::new(Self {
            kind,
            context,
            name: format!("{}: {}_timeline: ctx {}", label, kind.label(), context),
            fence_prefix: format!("{}: {}_fence: ctx {}", label, kind.label(), context),
            session: Arc::downgrade(session),
            session_closed: AtomicBool::new(false),
            lists: Mutex::new(TimelineLists::default()),
        });
        log::debug!("{}: created", timeline.name);
        timeline
    }

    /// Role of the timeline
    pub fn kind(&self) -> TimelineKind {
        self.kind
    }

    /// Fence context shared by every fence of this timeline
    pub fn context(&self) -> u64 {
        self.context
    }

    /// Name used in log messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last sequence number handed out
    pub fn current_value(&self) -> u64 {
        self.lists.lock().next_value
    }

    pub(crate) fn session(&self) -> Option<Arc<dyn SessionHealth>> {
        self.session.upgrade()
    }

    /// Whether the owning session has closed
    pub fn is_session_closed(&self) -> bool {
        self.session_closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_session_closed(&self) {
        self.session_closed.store(true, Ordering::Release);
    }

    /// Allocate the next fence and append it to the submit list
    pub fn create_fence(self: &Arc<Self>) -> Arc<SyncFence> {
        let mut lists = self.lists.lock();
        lists.next_value += 1;
        let seqno = lists.next_value;
        let fence = Arc::new(SyncFence::new(
            self.clone(),
            seqno,
            format!("{} seq {}", self.fence_prefix, seqno),
        ));
        lists.submit.push_back(fence.clone());
        fence
    }

    /// Remove the oldest fence of the submit list
    pub fn take_first(&self) -> Option<Arc<SyncFence>> {
        self.lists.lock().submit.pop_front()
    }

    /// Remove a specific fence from the submit list
    pub(crate) fn take_submitted(&self, seqno: u64) -> Option<Arc<SyncFence>> {
        let mut lists = self.lists.lock();
        let pos = lists.submit.iter().position(|f| f.seqno() == seqno)?;
        lists.submit.remove(pos)
    }

    /// Move the whole submit list out
    pub(crate) fn drain_submit(&self) -> VecDeque<Arc<SyncFence>> {
        core::mem::take(&mut self.lists.lock().submit)
    }

    /// Record a fence as a release candidate
    pub(crate) fn mark_released(&self, fence: &Arc<SyncFence>) {
        self.lists
            .lock()
            .release
            .push((fence.seqno(), Arc::downgrade(fence)));
    }

    /// Drop the release entry of a fence that is going away
    pub(crate) fn forget_released(&self, seqno: u64) {
        self.lists.lock().release.retain(|(seq, _)| *seq != seqno);
    }

    /// Fences destroyed by the driver but still held elsewhere
    pub fn released(&self) -> Vec<Arc<SyncFence>> {
        self.lists
            .lock()
            .release
            .iter()
            .filter_map(|(_, fence)| fence.upgrade())
            .collect()
    }

    /// Number of fences on the submit list
    pub fn submit_len(&self) -> usize {
        self.lists.lock().submit.len()
    }

    /// Number of fences on the release list
    pub fn release_len(&self) -> usize {
        self.lists.lock().release.len()
    }
}

impl Drop for Timeline {
    fn drop(&mut self) {
        if self.is_session_closed() {
            log::debug!("{}: destroyed", self.name);
        } else {
            log::error!("{}: destroyed before session close", self.name);
        }
    }
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("name", &self.name)
            .field("closed", &self.is_session_closed())
            .finish_non_exhaustive()
    }
}
