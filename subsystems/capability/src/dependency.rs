//! # Dependency Order
//!
//! Orders the capabilities of a session so that every capability comes
//! after all of its parents. The order is computed once per session with
//! Kahn's algorithm and reused by every later `adjust_set_all`.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use vidc_core::{Error, Result};

use crate::cap::{CapId, CapabilityTable};
use crate::propagate::CapabilityState;

/// Topological order of the capabilities in `table`
///
/// Parents that do not exist in the table are ignored. Roots keep id order
/// and the queue is FIFO, so equal inputs give equal orders.
pub fn dependency_order(table: &CapabilityTable) -> Result<Vec<CapId>> {
    let mut in_degree = [0usize; CapId::COUNT];
    let mut dependents: Vec<Vec<CapId>> = (0..CapId::COUNT).map(|_| Vec::new()).collect();
    let mut nodes = 0;

    for id in table.ids() {
        nodes += 1;
        if let Some(cap) = table.get(id) {
            for parent in cap.parents.iter().filter(|p| table.contains(**p)) {
                in_degree[id.index()] += 1;
                dependents[parent.index()].push(id);
            }
        }
    }

    let mut queue: VecDeque<CapId> = table
        .ids()
        .filter(|id| in_degree[id.index()] == 0)
        .collect();
    let mut order = Vec::with_capacity(nodes);

    while let Some(current) = queue.pop_front() {
        order.push(current);
        for dependent in &dependents[current.index()] {
            let degree = &mut in_degree[dependent.index()];
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(*dependent);
            }
        }
    }

    if order.len() != nodes {
        for id in table.ids().filter(|id| in_degree[id.index()] != 0) {
            log::error!("dependency loop involves {}", id);
        }
        return Err(Error::DependencyCycle);
    }

    Ok(order)
}

impl CapabilityState {
    /// Build the session dependency order
    ///
    /// Later calls return the order built by the first successful call.
    pub fn build_dependency_order(&mut self) -> Result<&[CapId]> {
        if self.order.is_none() {
            let order = dependency_order(&self.table)?;
            log::debug!("dependency order built, {} capabilities", order.len());
            self.order = Some(order);
        }
        Ok(self.order.as_deref().unwrap_or(&[]))
    }

    /// Dependency order, if built
    pub fn dependency_list(&self) -> Option<&[CapId]> {
        self.order.as_deref()
    }
}
