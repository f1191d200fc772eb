//! # Synx Buffer Tracker
//!
//! Pairs queued buffers with the fences created for them and retires the
//! pairs as buffers complete.
//!
//! The client creates a wait/signal fence pair per frame and binds the pair
//! to a buffer index. The first buffers of a stream have no wait dependency,
//! so the wait fences lag the signal fences by the pipeline depth:
//!
//! ```text
//!   idx    wait   signal
//!   ───    ────   ──────
//!    0      -       s1
//!    1      -       s2
//!    2      w1      s3     buffer 2 done: w1 matches s1, buffer 0 retires
//!    3      w2      s4     buffer 3 done: w2 matches s2, buffer 1 retires
//! ```
//!
//! Completion moves a binding from the submit list to the release list; the
//! binding whose signal fence matches the completed buffer's wait fence is
//! the one no consumer can still be waiting for, and it is destroyed.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;
use vidc_core::{Error, Result, SessionHealth};

use crate::exporter::{ExportHandle, FenceExporter};
use crate::fence::{SyncFence, SyncFlags};
use crate::timeline::{Timeline, TimelineKind};

// =============================================================================
// BUFFER BINDING
// =============================================================================

/// Fences bound to one queued buffer
pub struct SynxBuffer {
    index: u32,
    wait: Option<Arc<SyncFence>>,
    signal: Option<Arc<SyncFence>>,
    flags: SyncFlags,
}

impl SynxBuffer {
    /// Buffer index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Fence the hardware waits on, absent for the first buffers
    pub fn wait(&self) -> Option<&Arc<SyncFence>> {
        self.wait.as_ref()
    }

    /// Fence signaled when the buffer is done
    pub fn signal(&self) -> Option<&Arc<SyncFence>> {
        self.signal.as_ref()
    }

    /// Tracking flags
    pub fn flags(&self) -> SyncFlags {
        self.flags
    }
}

impl fmt::Debug for SynxBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynxBuffer")
            .field("idx", &self.index)
            .field("wait", &self.wait)
            .field("signal", &self.signal)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Fences returned by [`SynxTracker::create_fence_pair`]
#[derive(Debug, Clone)]
pub struct FencePair {
    /// Fence on the wait timeline
    pub wait: Arc<SyncFence>,
    /// Fence on the signal timeline
    pub signal: Arc<SyncFence>,
}

// =============================================================================
// TRACKER
// =============================================================================

#[derive(Default)]
struct TrackerState {
    wait: Option<Arc<Timeline>>,
    signal: Option<Arc<Timeline>>,
    submit: Vec<SynxBuffer>,
    release: Vec<SynxBuffer>,
}

impl TrackerState {
    fn timelines(&self) -> Result<(Arc<Timeline>, Arc<Timeline>)> {
        match (&self.wait, &self.signal) {
            (Some(wait), Some(signal)) => Ok((wait.clone(), signal.clone())),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Per-session fence timelines and buffer bindings
pub struct SynxTracker {
    session_id: u32,
    session: Weak<dyn SessionHealth>,
    exporter: Arc<dyn FenceExporter>,
    state: Mutex<TrackerState>,
}

impl SynxTracker {
    /// Tracker for `session`; timelines are created by
    /// [`init_timelines`](Self::init_timelines)
    pub fn new(session: &Arc<dyn SessionHealth>, exporter: Arc<dyn FenceExporter>) -> Self {
        Self {
            session_id: session.session_id(),
            session: Arc::downgrade(session),
            exporter,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Create the wait and signal timelines
    pub fn init_timelines(&self) -> Result<()> {
        let Some(session) = self.session.upgrade() else {
            log::error!("{:08x}: init timelines: session gone", self.session_id);
            return Err(Error::InvalidState);
        };

        let mut state = self.state.lock();
        if state.wait.is_some() || state.signal.is_some() {
            log::error!("{:08x}: timelines already initialized", self.session_id);
            return Err(Error::InvalidState);
        }

        let wait = Timeline::new(TimelineKind::Wait, &session);
        let signal = Timeline::new(TimelineKind::Signal, &session);
        log::info!("init {} and {}", wait.name(), signal.name());
        state.wait = Some(wait);
        state.signal = Some(signal);
        Ok(())
    }

    /// Mark both timelines closed and drop the session's references
    ///
    /// A timeline goes away once its last fence is released.
    pub fn deinit_timelines(&self) {
        let mut state = self.state.lock();
        for timeline in [state.wait.take(), state.signal.take()].into_iter().flatten() {
            timeline.mark_session_closed();
            log::debug!(
                "deinit {}, {} refs outstanding",
                timeline.name(),
                Arc::strong_count(&timeline) - 1
            );
        }
    }

    /// Wait and signal timelines, if initialized
    pub fn timelines(&self) -> Option<(Arc<Timeline>, Arc<Timeline>)> {
        self.state.lock().timelines().ok()
    }

    /// Allocate, export and import one fence on each timeline
    ///
    /// Both fences stay on their timeline's submit list until a buffer is
    /// bound to them. If any step fails nothing is left allocated.
    pub fn create_fence_pair(&self) -> Result<FencePair> {
        let state = self.state.lock();
        let (wait_tl, signal_tl) = state.timelines().map_err(|e| {
            log::error!("{:08x}: create fence: timelines not initialized", self.session_id);
            e
        })?;

        let wait = self.allocate_fence(&wait_tl).map_err(|e| {
            log::error!("{}: wait fence allocation failed", wait_tl.name());
            e
        })?;

        let signal = match self.allocate_fence(&signal_tl) {
            Ok(fence) => fence,
            Err(e) => {
                log::error!("{}: signal fence allocation failed", signal_tl.name());
                if let Some(wait) = wait_tl.take_submitted(wait.seqno()) {
                    self.destroy_fence(wait);
                }
                return Err(e);
            }
        };
        drop(state);

        log::info!(
            "synx: create: wait: ctx {} seq {} fd {:?} synx {:?}, signal: ctx {} seq {} fd {:?} synx {:?}",
            wait.context(),
            wait.seqno(),
            wait.export_handle(),
            wait.synx_handle(),
            signal.context(),
            signal.seqno(),
            signal.export_handle(),
            signal.synx_handle()
        );

        Ok(FencePair { wait, signal })
    }

    fn allocate_fence(&self, timeline: &Arc<Timeline>) -> Result<Arc<SyncFence>> {
        let fence = timeline.create_fence();

        let export = match self.exporter.export(&fence) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("{}: failed to export: {}", fence.name(), e);
                timeline.take_submitted(fence.seqno());
                return Err(e);
            }
        };
        fence.set_export_handle(Some(export));

        match self.exporter.import_synx(&fence) {
            Ok(handle) => fence.set_synx_handle(Some(handle)),
            Err(e) => {
                log::error!("{}: synx import failed: {}", fence.name(), e);
                self.release_export(&fence);
                timeline.take_submitted(fence.seqno());
                return Err(e);
            }
        }

        Ok(fence)
    }

    fn release_export(&self, fence: &SyncFence) {
        if let Some(handle) = fence.take_export_handle() {
            if let Err(e) = self.exporter.release_export(fence, handle) {
                log::error!("{}: export release failed: {}", fence.name(), e);
            }
        }
    }

    /// Retire a fence: release its external handles and drop the driver's
    /// reference. An errored fence is signaled with an error first.
    fn destroy_fence(&self, fence: Arc<SyncFence>) {
        fence.timeline().mark_released(&fence);

        if let Some(handle) = fence.take_synx_handle() {
            if let Err(e) = self.exporter.release_synx(&fence, handle) {
                log::error!("{}: synx release failed: {}", fence.name(), e);
            }
        }
        self.release_export(&fence);

        if fence.flags().contains(SyncFlags::ERROR) {
            fence.signal_error();
        }
    }

    fn destroy_buffer(&self, mut buf: SynxBuffer) {
        if let Some(wait) = buf.wait.take() {
            self.destroy_fence(wait);
        }
        if let Some(signal) = buf.signal.take() {
            self.destroy_fence(signal);
        }
    }

    /// Bind the oldest unbound fences to buffer `index`
    ///
    /// `wait` is the wait fence handle the client passed along; `None` marks
    /// one of the first buffers, which take no wait fence.
    pub fn bind_buffer_fences(&self, index: u32, wait: Option<ExportHandle>) -> Result<()> {
        let mut state = self.state.lock();
        let (wait_tl, signal_tl) = state.timelines().map_err(|e| {
            log::error!("{:08x}: bind: timelines not initialized", self.session_id);
            e
        })?;

        if state.submit.iter().any(|b| b.index == index) {
            log::error!("{:08x}: bind: index {} already bound", self.session_id, index);
            return Err(Error::InvalidArgument);
        }
        if signal_tl.submit_len() == 0 || (wait.is_some() && wait_tl.submit_len() == 0) {
            log::error!("{:08x}: bind: no fence pending for index {}", self.session_id, index);
            return Err(Error::InvalidState);
        }

        let signal = signal_tl.take_first();
        let wait_fence = match wait {
            Some(_) => wait_tl.take_first(),
            None => None,
        };
        if let (Some(handle), Some(fence)) = (wait, &wait_fence) {
            if fence.export_handle() != Some(handle) {
                log::warn!("{}: bound to idx {} via fd {:?}", fence.name(), index, handle);
            }
        }

        let buf = SynxBuffer {
            index,
            wait: wait_fence,
            signal,
            flags: SyncFlags::DEFERRED,
        };
        log::debug!("synx: bind: {:?}", buf);
        state.submit.push(buf);
        Ok(())
    }

    /// Mark buffer `index` as handed to firmware
    pub fn mark_queued(&self, index: u32) -> Result<()> {
        let mut state = self.state.lock();
        let Some(buf) = state.submit.iter_mut().find(|b| b.index == index) else {
            log::error!("{:08x}: queue: index not found {}", self.session_id, index);
            return Err(Error::UnknownIndex);
        };
        buf.flags.insert(SyncFlags::QUEUED);
        Ok(())
    }

    /// Buffer `index` came back from firmware with `bytes_used` bytes
    ///
    /// An empty buffer (flush, error) marks its signal fence errored so
    /// waiters are released instead of hanging.
    pub fn release_on_buffer_done(&self, index: u32, bytes_used: u32) -> Result<()> {
        let mut state = self.state.lock();

        let Some(pos) = state.submit.iter().position(|b| b.index == index) else {
            log::error!("{:08x}: release: index not found {}", self.session_id, index);
            return Err(Error::UnknownIndex);
        };
        if !state.submit[pos].flags.contains(SyncFlags::QUEUED) {
            log::error!("synx: not yet queued: {:?}", state.submit[pos]);
            return Err(Error::NotQueued);
        }

        let mut buf = state.submit.remove(pos);
        buf.flags.remove(SyncFlags::QUEUED);
        if bytes_used == 0 {
            if let Some(signal) = &buf.signal {
                signal.insert_flags(SyncFlags::ERROR);
            }
        }

        log::trace!("synx: move to release: {:?}", buf);
        let wait_seqno = buf.wait.as_ref().map(|w| w.seqno());
        state.release.push(buf);

        let Some(wait_seqno) = wait_seqno else {
            return Ok(());
        };

        let Some(rpos) = state
            .release
            .iter()
            .position(|b| b.signal.as_ref().is_some_and(|s| s.seqno() == wait_seqno))
        else {
            log::error!(
                "{:08x}: no synx buffer with signal seqno {}",
                self.session_id,
                wait_seqno
            );
            return Err(Error::OrphanedFence);
        };

        let rbuf = state.release.remove(rpos);
        log::debug!("synx: release: {:?}", rbuf);
        self.destroy_buffer(rbuf);
        Ok(())
    }

    /// Destroy every binding and unbound fence of the session
    ///
    /// Signal fences are errored first so external waiters wake up.
    /// Returns how many destroyed fences are still held elsewhere; those are
    /// logged as leaks.
    pub fn teardown(&self) -> usize {
        let mut state = self.state.lock();

        let submit = core::mem::take(&mut state.submit);
        for buf in submit {
            if let Some(signal) = &buf.signal {
                signal.insert_flags(SyncFlags::ERROR);
            }
            log::info!("synx: destroy: submit: {:?}", buf);
            self.destroy_buffer(buf);
        }

        let release = core::mem::take(&mut state.release);
        for buf in release {
            if let Some(signal) = &buf.signal {
                signal.insert_flags(SyncFlags::ERROR);
            }
            log::info!("synx: destroy: release: {:?}", buf);
            self.destroy_buffer(buf);
        }

        let mut leaked = 0;
        let timelines = [state.wait.clone(), state.signal.clone()];
        drop(state);

        for timeline in timelines.into_iter().flatten() {
            let is_signal = timeline.kind() == TimelineKind::Signal;
            for fence in timeline.drain_submit() {
                if is_signal {
                    fence.insert_flags(SyncFlags::ERROR);
                }
                log::info!("synx: destroy: submit: {:?}", fence);
                self.destroy_fence(fence);
            }

            for fence in timeline.released() {
                log::error!("synx: leaked: {} {:?}", timeline.name(), fence);
                leaked += 1;
            }
        }

        leaked
    }

    /// Number of bindings waiting for buffer completion
    pub fn submit_len(&self) -> usize {
        self.state.lock().submit.len()
    }

    /// Number of completed bindings not yet retired
    pub fn release_len(&self) -> usize {
        self.state.lock().release.len()
    }

    /// Buffer indices of the completed bindings, oldest first
    pub fn released_indices(&self) -> Vec<u32> {
        self.state.lock().release.iter().map(|b| b.index).collect()
    }

    /// Flags of the pending binding for buffer `index`
    pub fn buffer_flags(&self, index: u32) -> Option<SyncFlags> {
        self.state
            .lock()
            .submit
            .iter()
            .find(|b| b.index == index)
            .map(|b| b.flags)
    }
}

impl Drop for SynxTracker {
    fn drop(&mut self) {
        if self.timelines().is_some() {
            log::warn!("{:08x}: tracker dropped with live timelines", self.session_id);
            self.teardown();
            self.deinit_timelines();
        }
    }
}

impl fmt::Debug for SynxTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynxTracker")
            .field("session", &format_args!("{:08x}", self.session_id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::SynxHandle;
    use crate::fence::FenceStatus;
    use crate::timeline::tests::TestSession;
    use alloc::vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Exporter double; an exported handle keeps a fence reference until
    /// it is released
    #[derive(Default)]
    struct MockExporter {
        calls: AtomicUsize,
        fail_export_at: Option<usize>,
        fail_import_at: Option<usize>,
        held: Mutex<Vec<(ExportHandle, Arc<SyncFence>)>>,
        released: Mutex<Vec<u64>>,
        synx_released: AtomicUsize,
    }

    impl MockExporter {
        fn released_signal_seqnos(&self) -> Vec<u64> {
            self.released.lock().clone()
        }
    }

    impl FenceExporter for MockExporter {
        fn export(&self, fence: &Arc<SyncFence>) -> Result<ExportHandle> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_export_at == Some(call) {
                return Err(Error::Resource);
            }
            let handle = ExportHandle(100 + call as i32);
            self.held.lock().push((handle, fence.clone()));
            Ok(handle)
        }

        fn release_export(&self, fence: &SyncFence, handle: ExportHandle) -> Result<()> {
            let mut held = self.held.lock();
            let pos = held
                .iter()
                .position(|(h, _)| *h == handle)
                .ok_or(Error::InvalidArgument)?;
            let (_, held_fence) = held.remove(pos);
            drop(held);
            if held_fence.timeline().kind() == TimelineKind::Signal {
                self.released.lock().push(fence.seqno());
            }
            Ok(())
        }

        fn import_synx(&self, fence: &Arc<SyncFence>) -> Result<SynxHandle> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_import_at == Some(call) {
                return Err(Error::Resource);
            }
            Ok(SynxHandle((fence.context() << 32) | fence.seqno()))
        }

        fn release_synx(&self, _fence: &SyncFence, _handle: SynxHandle) -> Result<()> {
            self.synx_released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Rig {
        session: Arc<TestSession>,
        exporter: Arc<MockExporter>,
        tracker: SynxTracker,
    }

    fn rig_with(exporter: MockExporter) -> Rig {
        let session = TestSession::new(0x10);
        let session_dyn: Arc<dyn SessionHealth> = session.clone();
        let exporter = Arc::new(exporter);
        let tracker = SynxTracker::new(&session_dyn, exporter.clone());
        tracker.init_timelines().unwrap();
        Rig {
            session,
            exporter,
            tracker,
        }
    }

    fn rig() -> Rig {
        rig_with(MockExporter::default())
    }

    /// Create a pair, bind buffer `index` to the oldest unbound fences and
    /// queue it. `waits_on` is the earlier pair whose wait fence the client
    /// hands back.
    fn queue(rig: &Rig, index: u32, waits_on: Option<&FencePair>) -> FencePair {
        let pair = rig.tracker.create_fence_pair().unwrap();
        let wait = waits_on.and_then(|p| p.wait.export_handle());
        rig.tracker.bind_buffer_fences(index, wait).unwrap();
        rig.tracker.mark_queued(index).unwrap();
        pair
    }

    #[test]
    fn test_requires_timelines() {
        let session: Arc<dyn SessionHealth> = TestSession::new(1);
        let tracker = SynxTracker::new(&session, Arc::new(MockExporter::default()));
        assert_eq!(
            tracker.create_fence_pair().map(|_| ()),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            tracker.bind_buffer_fences(0, None),
            Err(Error::InvalidArgument)
        );

        tracker.init_timelines().unwrap();
        assert_eq!(tracker.init_timelines(), Err(Error::InvalidState));
    }

    #[test]
    fn test_fence_pair_sequence() {
        let rig = rig();
        let first = rig.tracker.create_fence_pair().unwrap();
        let second = rig.tracker.create_fence_pair().unwrap();

        assert_eq!((first.wait.seqno(), first.signal.seqno()), (1, 1));
        assert_eq!((second.wait.seqno(), second.signal.seqno()), (2, 2));
        assert_ne!(first.wait.context(), first.signal.context());
        assert!(first.wait.export_handle().is_some());
        assert!(first.signal.synx_handle().is_some());

        let (wait_tl, signal_tl) = rig.tracker.timelines().unwrap();
        assert_eq!(wait_tl.submit_len(), 2);
        assert_eq!(signal_tl.submit_len(), 2);
    }

    #[test]
    fn test_bind_takes_oldest_fences() {
        let rig = rig();
        let p1 = rig.tracker.create_fence_pair().unwrap();
        let p2 = rig.tracker.create_fence_pair().unwrap();

        rig.tracker.bind_buffer_fences(0, None).unwrap();
        rig.tracker
            .bind_buffer_fences(1, p1.wait.export_handle())
            .unwrap();

        assert_eq!(rig.tracker.buffer_flags(0), Some(SyncFlags::DEFERRED));
        let (wait_tl, signal_tl) = rig.tracker.timelines().unwrap();
        // w2 is still unbound, both signal fences are bound
        assert_eq!(wait_tl.submit_len(), 1);
        assert_eq!(signal_tl.submit_len(), 0);
        assert!(Arc::ptr_eq(&wait_tl.take_first().unwrap(), &p2.wait));

        assert_eq!(
            rig.tracker.bind_buffer_fences(0, None),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            rig.tracker.bind_buffer_fences(2, None),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn test_fifo_retirement_with_interleaved_completions() {
        let rig = rig();
        let p0 = queue(&rig, 0, None);
        let p1 = queue(&rig, 1, None);
        let p2 = queue(&rig, 2, Some(&p0));
        let p3 = queue(&rig, 3, Some(&p1));
        let p4 = queue(&rig, 4, Some(&p2));
        drop((p0, p1, p2, p3, p4));

        rig.tracker.release_on_buffer_done(1, 64).unwrap();
        rig.tracker.release_on_buffer_done(0, 64).unwrap();
        assert_eq!(rig.tracker.released_indices(), vec![1, 0]);

        // buffer 3 waited on w2, the partner of s2 on buffer 1
        rig.tracker.release_on_buffer_done(3, 64).unwrap();
        assert_eq!(rig.tracker.released_indices(), vec![0, 3]);

        rig.tracker.release_on_buffer_done(2, 64).unwrap();
        assert_eq!(rig.tracker.released_indices(), vec![3, 2]);

        rig.tracker.release_on_buffer_done(4, 64).unwrap();
        assert_eq!(rig.tracker.released_indices(), vec![3, 4]);

        // retired in pairing order, not in completion order
        assert_eq!(rig.exporter.released_signal_seqnos(), vec![2, 1, 3]);
        assert_eq!(rig.tracker.submit_len(), 0);
    }

    #[test]
    fn test_release_errors() {
        let rig = rig();
        rig.tracker.create_fence_pair().unwrap();
        rig.tracker.bind_buffer_fences(0, None).unwrap();

        assert_eq!(
            rig.tracker.release_on_buffer_done(0, 64),
            Err(Error::NotQueued)
        );
        assert_eq!(rig.tracker.submit_len(), 1);

        assert_eq!(
            rig.tracker.release_on_buffer_done(7, 64),
            Err(Error::UnknownIndex)
        );
        assert_eq!(rig.tracker.mark_queued(7), Err(Error::UnknownIndex));

        rig.tracker.mark_queued(0).unwrap();
        assert_eq!(
            rig.tracker.buffer_flags(0),
            Some(SyncFlags::DEFERRED | SyncFlags::QUEUED)
        );
        rig.tracker.release_on_buffer_done(0, 64).unwrap();
        assert_eq!(rig.tracker.released_indices(), vec![0]);
    }

    #[test]
    fn test_orphaned_wait_fence() {
        let rig = rig();
        let p1 = rig.tracker.create_fence_pair().unwrap();
        rig.tracker.create_fence_pair().unwrap();
        rig.tracker.bind_buffer_fences(0, None).unwrap();
        rig.tracker
            .bind_buffer_fences(1, p1.wait.export_handle())
            .unwrap();
        rig.tracker.mark_queued(1).unwrap();

        // s1 is bound to buffer 0, which never completed
        assert_eq!(
            rig.tracker.release_on_buffer_done(1, 64),
            Err(Error::OrphanedFence)
        );
        assert_eq!(rig.tracker.released_indices(), vec![1]);
    }

    #[test]
    fn test_empty_buffer_errors_signal_fence() {
        let rig = rig();
        let p1 = queue(&rig, 0, None);
        rig.tracker.release_on_buffer_done(0, 0).unwrap();
        assert!(p1.signal.flags().contains(SyncFlags::ERROR));
        assert_eq!(p1.signal.status(), FenceStatus::Pending);

        queue(&rig, 1, Some(&p1));
        rig.tracker.release_on_buffer_done(1, 64).unwrap();
        assert_eq!(p1.signal.status(), FenceStatus::Error);
        assert!(p1.signal.signaled());
    }

    #[test]
    fn test_teardown_errors_signal_fences_and_reports_leaks() {
        let rig = rig();
        let p1 = queue(&rig, 0, None);
        let p2 = rig.tracker.create_fence_pair().unwrap();
        let s2 = p2.signal.clone();
        drop(p2);

        let (wait_tl, signal_tl) = rig.tracker.timelines().unwrap();
        let (wait_weak, signal_weak) = (Arc::downgrade(&wait_tl), Arc::downgrade(&signal_tl));
        drop((wait_tl, signal_tl));

        // w1, s1 and s2 are still held here
        assert_eq!(rig.tracker.teardown(), 3);
        assert_eq!(p1.signal.status(), FenceStatus::Error);
        assert_eq!(s2.status(), FenceStatus::Error);
        assert_eq!(p1.wait.status(), FenceStatus::Pending);
        assert_eq!(rig.tracker.submit_len(), 0);
        assert_eq!(rig.tracker.release_len(), 0);
        assert!(rig.exporter.held.lock().is_empty());
        assert_eq!(rig.exporter.synx_released.load(Ordering::SeqCst), 4);

        rig.tracker.deinit_timelines();
        assert!(rig.tracker.timelines().is_none());
        assert!(wait_weak.upgrade().unwrap().is_session_closed());

        drop((p1, s2));
        assert!(wait_weak.upgrade().is_none());
        assert!(signal_weak.upgrade().is_none());
    }

    #[test]
    fn test_signaled_under_session_error() {
        let rig = rig();
        let pair = queue(&rig, 0, None);
        assert!(!pair.signal.signaled());

        rig.session.set_error(true);
        assert!(pair.signal.signaled());
        assert!(pair.wait.signaled());
    }

    #[test]
    fn test_import_failure_unwinds_pair() {
        // calls: wait export 0, wait import 1, signal export 2, signal import 3
        let rig = rig_with(MockExporter {
            fail_import_at: Some(3),
            ..MockExporter::default()
        });

        assert_eq!(
            rig.tracker.create_fence_pair().map(|_| ()),
            Err(Error::Resource)
        );
        let (wait_tl, signal_tl) = rig.tracker.timelines().unwrap();
        assert_eq!(wait_tl.submit_len(), 0);
        assert_eq!(signal_tl.submit_len(), 0);
        assert_eq!(wait_tl.release_len(), 0);
        assert!(rig.exporter.held.lock().is_empty());
        assert_eq!(rig.exporter.synx_released.load(Ordering::SeqCst), 1);
        // only the tracker and this test hold the timelines
        assert_eq!(Arc::strong_count(&wait_tl), 2);
        assert_eq!(Arc::strong_count(&signal_tl), 2);
    }

    #[test]
    fn test_export_failure_unwinds_fence() {
        let rig = rig_with(MockExporter {
            fail_export_at: Some(0),
            ..MockExporter::default()
        });

        assert_eq!(
            rig.tracker.create_fence_pair().map(|_| ()),
            Err(Error::Resource)
        );
        let (wait_tl, signal_tl) = rig.tracker.timelines().unwrap();
        assert_eq!(wait_tl.submit_len(), 0);
        assert_eq!(signal_tl.current_value(), 0);
    }
}
