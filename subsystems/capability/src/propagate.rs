//! # Adjust, Propagate, Commit
//!
//! A value change on one capability can change every capability derived
//! from it. While the session is streaming, a client change is handled in
//! two steps:
//!
//! ```text
//!   propagate(id, value)                      commit(sink)
//!   ────────────────────                      ────────────
//!   adjust(id) ──► changed? ──► children ──►  pop firmware queue in order
//!        │             │        queue (FIFO)  and call each `set`
//!        ▼             ▼           │
//!   firmware queue ◄── re-adjust child, record it and
//!                      queue its children when its value moved
//! ```
//!
//! Any failure while propagating drops both queues so the firmware never
//! sees half of a change.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use vidc_core::{CoreConfig, Error, Result};

use crate::cap::{CapFlags, CapId, Capability, CapabilityTable, MAX_CAP_CHILDREN};
use crate::session::SessionProps;

/// Property channel from a session to the firmware
pub trait PropertySink {
    /// Send one property value
    fn set_property(&mut self, id: CapId, value: i32) -> Result<()>;
}

// =============================================================================
// ADJUST CONTEXT
// =============================================================================

/// Read-only view handed to an [`AdjustFn`](crate::cap::AdjustFn)
pub struct AdjustCtx<'a> {
    cap: &'a Capability,
    table: &'a CapabilityTable,
    props: &'a SessionProps,
    config: &'a CoreConfig,
}

impl<'a> AdjustCtx<'a> {
    /// Capability being adjusted
    pub fn id(&self) -> CapId {
        self.cap.id
    }

    /// Capability being adjusted
    pub fn cap(&self) -> &'a Capability {
        self.cap
    }

    /// Whole table
    pub fn table(&self) -> &'a CapabilityTable {
        self.table
    }

    /// Session properties
    pub fn props(&self) -> &'a SessionProps {
        self.props
    }

    /// Device configuration
    pub fn config(&self) -> &'a CoreConfig {
        self.config
    }

    /// Value of any capability, 0 when it does not exist
    pub fn value(&self, id: CapId) -> i32 {
        self.table.value_or_zero(id)
    }

    /// Value of a declared parent
    pub fn parent_value(&self, parent: CapId) -> Result<i32> {
        if !self.cap.parents.contains(&parent) {
            log::error!("{}: {} is not a parent", self.cap.id, parent);
            return Err(Error::InvalidArgument);
        }
        self.table.value(parent).ok_or(Error::UnknownCapability)
    }
}

// =============================================================================
// SESSION CAPABILITY STATE
// =============================================================================

/// Capability state of one session
///
/// Owned by [`CapabilitySession`](crate::session::CapabilitySession) behind
/// the session lock.
#[derive(Debug)]
pub struct CapabilityState {
    pub(crate) table: CapabilityTable,
    pub(crate) props: SessionProps,
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) order: Option<Vec<CapId>>,
    children: VecDeque<CapId>,
    firmware: VecDeque<CapId>,
}

impl CapabilityState {
    /// State for a freshly opened session
    pub fn new(props: SessionProps, table: CapabilityTable, config: Arc<CoreConfig>) -> Self {
        Self {
            table,
            props,
            config,
            order: None,
            children: VecDeque::new(),
            firmware: VecDeque::new(),
        }
    }

    /// Capability table
    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Capability table for direct updates
    pub fn table_mut(&mut self) -> &mut CapabilityTable {
        &mut self.table
    }

    /// Session properties
    pub fn props(&self) -> &SessionProps {
        &self.props
    }

    /// Session properties for updates (format, streaming state)
    pub fn props_mut(&mut self) -> &mut SessionProps {
        &mut self.props
    }

    /// Device configuration
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Ids waiting for [`commit`](Self::commit), in commit order
    pub fn pending_commits(&self) -> Vec<CapId> {
        self.firmware.iter().copied().collect()
    }

    /// Recompute one capability
    ///
    /// Runs the capability's adjust function when it has one. Otherwise an
    /// explicit value is stored as is and no value leaves it untouched.
    pub fn adjust(&mut self, id: CapId, explicit: Option<i32>) -> Result<()> {
        let Some(cap) = self.table.get(id) else {
            log::error!("adjust: invalid capability {}", id);
            return Err(Error::UnknownCapability);
        };

        let value = match cap.adjust {
            Some(adjust) => {
                let ctx = AdjustCtx {
                    cap,
                    table: &self.table,
                    props: &self.props,
                    config: &self.config,
                };
                adjust(&ctx, explicit).map_err(|e| {
                    log::error!("adjust: {} failed: {}", id, e);
                    e
                })?
            }
            None => match explicit {
                Some(value) => value,
                None => return Ok(()),
            },
        };

        self.table.update_value(id, value, "adjust")
    }

    /// Apply a client value while streaming and collect what has to be sent
    ///
    /// The capability must allow dynamic changes. On failure nothing stays
    /// queued.
    pub fn propagate(&mut self, id: CapId, value: i32) -> Result<()> {
        let rc = self.propagate_inner(id, value);
        if rc.is_err() {
            self.discard_pending();
        }
        rc
    }

    fn propagate_inner(&mut self, id: CapId, value: i32) -> Result<()> {
        let cap = self.table.get(id).ok_or(Error::UnknownCapability)?;
        if !cap.is_dynamic() {
            log::info!("propagate: dynamic setting of {} is not allowed", id);
            return Err(Error::NotDynamic);
        }
        let suppress = cap.flags.contains(CapFlags::SUPPRESS_REDUNDANT_COMMIT);
        let prev = cap.value;
        log::debug!("propagate: {}", id);

        self.adjust(id, Some(value))?;

        let changed = self.table.value_or_zero(id) != prev;
        if !changed && suppress {
            log::debug!("propagate: {} unchanged, not sent", id);
            return Ok(());
        }

        self.record(id);
        if !changed {
            return Ok(());
        }
        self.enqueue_children(id);

        // Upper bound on child visits for an acyclic table.
        let mut budget = CapId::COUNT * MAX_CAP_CHILDREN;
        while let Some(child) = self.children.pop_front() {
            if budget == 0 {
                log::error!("propagate: {} keeps changing, dependency loop", child);
                return Err(Error::DependencyCycle);
            }
            budget -= 1;

            let cap = self.table.get(child).ok_or(Error::UnknownCapability)?;
            if cap.adjust.is_none() {
                log::error!("propagate: child {} must have an adjust function", child);
                return Err(Error::MissingAdjustFn);
            }
            let prev = cap.value;

            self.adjust(child, None)?;

            if self.table.value_or_zero(child) != prev {
                self.record(child);
                self.enqueue_children(child);
            }
        }

        Ok(())
    }

    /// Send every recorded capability to the firmware, in record order
    ///
    /// Stops at the first failing setter and drops the rest of the queue.
    pub fn commit(&mut self, sink: &mut dyn PropertySink) -> Result<()> {
        while let Some(id) = self.firmware.pop_front() {
            if let Err(e) = self.set_cap(id, sink) {
                for dropped in self.firmware.drain(..) {
                    log::error!("commit: dropping {}", dropped);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Adjust every capability, then set every capability, in dependency order
    pub fn adjust_set_all(&mut self, sink: &mut dyn PropertySink) -> Result<()> {
        let order = self.build_dependency_order()?.to_vec();

        for id in &order {
            log::trace!("adjust_set_all: adjust {}", id);
            self.adjust(*id, None)?;
        }

        for id in &order {
            self.set_cap(*id, sink)?;
        }

        Ok(())
    }

    fn set_cap(&self, id: CapId, sink: &mut dyn PropertySink) -> Result<()> {
        let Some(cap) = self.table.get(id) else {
            return Ok(());
        };
        match cap.set {
            Some(set) => set(cap, sink).map_err(|e| {
                log::error!("set: {} failed: {}", id, e);
                e
            }),
            None => Ok(()),
        }
    }

    fn record(&mut self, id: CapId) {
        if self.firmware.contains(&id) {
            log::trace!("{} already queued for firmware", id);
            return;
        }
        self.firmware.push_back(id);
    }

    fn enqueue_children(&mut self, id: CapId) {
        let Some(cap) = self.table.get(id) else {
            return;
        };
        for child in &cap.children {
            if self.table.contains(*child) {
                self.children.push_back(*child);
            }
        }
    }

    fn discard_pending(&mut self) {
        for id in self.children.drain(..) {
            log::error!("propagate: dropping child {}", id);
        }
        for id in self.firmware.drain(..) {
            log::error!("propagate: dropping firmware entry {}", id);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cap::set_u32;
    use crate::session::Codec;
    use alloc::vec;
    use vidc_core::SessionKind;

    /// Sink that records every property and can fail on one id
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) sent: Vec<(CapId, i32)>,
        pub(crate) fail_on: Option<CapId>,
    }

    impl PropertySink for RecordingSink {
        fn set_property(&mut self, id: CapId, value: i32) -> Result<()> {
            if self.fail_on == Some(id) {
                return Err(Error::Timeout);
            }
            self.sent.push((id, value));
            Ok(())
        }
    }

    const A: CapId = CapId::BitRate;
    const B: CapId = CapId::BitrateBoost;
    const C: CapId = CapId::QualityMode;

    fn b_from_a(ctx: &AdjustCtx<'_>, _: Option<i32>) -> Result<i32> {
        Ok(ctx.parent_value(A)? + 1)
    }

    fn c_from_b(ctx: &AdjustCtx<'_>, _: Option<i32>) -> Result<i32> {
        Ok(ctx.parent_value(B)? * 2)
    }

    fn failing(_: &AdjustCtx<'_>, _: Option<i32>) -> Result<i32> {
        Err(Error::InvalidArgument)
    }

    fn abc_table() -> CapabilityTable {
        let mut table = CapabilityTable::new();
        table.insert(
            Capability::new(A, 0, 1000, 1, 5)
                .with_flags(CapFlags::DYNAMIC_ALLOWED)
                .with_set(set_u32),
        );
        table.insert(
            Capability::new(B, 0, 1000, 1, 6)
                .with_adjust(b_from_a)
                .with_set(set_u32),
        );
        table.insert(
            Capability::new(C, 0, 1000, 1, 12)
                .with_adjust(c_from_b)
                .with_set(set_u32),
        );
        table.link(A, B).unwrap();
        table.link(B, C).unwrap();
        table
    }

    pub(crate) fn state_with(table: CapabilityTable) -> CapabilityState {
        CapabilityState::new(
            SessionProps::new(SessionKind::Encode, Codec::H264),
            table,
            Arc::new(CoreConfig::default()),
        )
    }

    #[test]
    fn test_propagate_cascades_in_order() {
        let mut state = state_with(abc_table());
        state.propagate(A, 10).unwrap();

        assert_eq!(state.pending_commits(), vec![A, B, C]);
        assert_eq!(state.table().value(B), Some(11));
        assert_eq!(state.table().value(C), Some(22));

        let mut sink = RecordingSink::default();
        state.commit(&mut sink).unwrap();
        assert_eq!(sink.sent, vec![(A, 10), (B, 11), (C, 22)]);
        assert!(state.pending_commits().is_empty());
    }

    #[test]
    fn test_unchanged_value_commits_only_itself() {
        let mut state = state_with(abc_table());
        state.propagate(A, 5).unwrap();
        assert_eq!(state.pending_commits(), vec![A]);
    }

    #[test]
    fn test_suppress_redundant_commit() {
        let mut table = abc_table();
        table
            .get_mut(A)
            .unwrap()
            .flags
            .insert(CapFlags::SUPPRESS_REDUNDANT_COMMIT);
        let mut state = state_with(table);

        state.propagate(A, 5).unwrap();
        assert!(state.pending_commits().is_empty());

        state.propagate(A, 7).unwrap();
        assert_eq!(state.pending_commits(), vec![A, B, C]);
    }

    #[test]
    fn test_unchanged_child_not_recorded() {
        let mut state = state_with(abc_table());
        // B already matches A + 1 after this, so C is never reached
        state.table_mut().update_value(B, 8, "test").unwrap();
        state.propagate(A, 7).unwrap();
        assert_eq!(state.pending_commits(), vec![A]);
    }

    #[test]
    fn test_propagate_rejects_static_capability() {
        let mut table = abc_table();
        table.get_mut(A).unwrap().flags = CapFlags::empty();
        let mut state = state_with(table);

        assert_eq!(state.propagate(A, 10), Err(Error::NotDynamic));
        assert_eq!(state.table().value(A), Some(5));
    }

    #[test]
    fn test_missing_adjust_discards_batch() {
        let mut table = abc_table();
        table.get_mut(C).unwrap().adjust = None;
        let mut state = state_with(table);

        assert_eq!(state.propagate(A, 10), Err(Error::MissingAdjustFn));
        assert!(state.pending_commits().is_empty());

        // a later request starts clean
        let mut sink = RecordingSink::default();
        state.commit(&mut sink).unwrap();
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn test_child_adjust_failure_discards_batch() {
        let mut table = abc_table();
        table.get_mut(B).unwrap().adjust = Some(failing);
        let mut state = state_with(table);

        assert_eq!(state.propagate(A, 10), Err(Error::InvalidArgument));
        assert!(state.pending_commits().is_empty());
    }

    #[test]
    fn test_commit_stops_at_first_failure() {
        let mut state = state_with(abc_table());
        state.propagate(A, 10).unwrap();

        let mut sink = RecordingSink {
            fail_on: Some(B),
            ..RecordingSink::default()
        };
        assert_eq!(state.commit(&mut sink), Err(Error::Timeout));
        assert_eq!(sink.sent, vec![(A, 10)]);
        assert!(state.pending_commits().is_empty());
    }

    #[test]
    fn test_adjust_unknown_and_plain_store() {
        let mut state = state_with(abc_table());
        assert_eq!(
            state.adjust(CapId::GopSize, Some(1)),
            Err(Error::UnknownCapability)
        );

        state.adjust(A, None).unwrap();
        assert_eq!(state.table().value(A), Some(5));
        state.adjust(A, Some(9)).unwrap();
        assert_eq!(state.table().value(A), Some(9));
    }

    #[test]
    fn test_adjust_set_all_follows_dependency_order() {
        let mut state = state_with(abc_table());
        state.table_mut().update_value(A, 20, "test").unwrap();

        let mut sink = RecordingSink::default();
        state.adjust_set_all(&mut sink).unwrap();
        assert_eq!(sink.sent, vec![(A, 20), (B, 21), (C, 42)]);
    }

    #[test]
    fn test_parent_value_requires_declared_parent() {
        let mut table = abc_table();
        table.get_mut(C).unwrap().adjust = Some(b_from_a);
        let mut state = state_with(table);
        assert_eq!(state.adjust(C, None), Err(Error::InvalidArgument));
    }
}
