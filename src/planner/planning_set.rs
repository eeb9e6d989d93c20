//! Per-query planning state.
//!
//! One [`Wrapper`] per fragment, held in an insertion-ordered arena.
//! Wrappers reference each other (dependencies) and their fragment by
//! id, never by owning pointers, so the dependency graph can be an
//! arbitrary DAG without lifetime gymnastics.

use crate::endpoint::NodeEndpoint;
use crate::error::{PlannerError, Result};
use crate::plan::fragment::{FragmentTree, MajorFragmentId};
use crate::planner::stats::FragmentStats;
use std::collections::HashMap;

pub type WrapperId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    New,
    StatsCollected,
    Sized,
    Assigned,
}

/// Mutable planning state of one major fragment.
#[derive(Debug)]
pub struct Wrapper {
    major_id: MajorFragmentId,
    /// Wrappers that must be sized before this one.
    pub dependencies: Vec<WrapperId>,
    stats: Option<FragmentStats>,
    width: usize,
    assigned_endpoints: Vec<NodeEndpoint>,
    /// Scan split ids dealt to each minor fragment; read back during
    /// materialization.
    split_sets: Vec<Vec<u64>>,
    initial_allocation: u64,
    max_allocation: u64,
    state: WrapperState,
}

impl Wrapper {
    fn new(major_id: MajorFragmentId) -> Self {
        Self {
            major_id,
            dependencies: Vec::new(),
            stats: None,
            width: 0,
            assigned_endpoints: Vec::new(),
            split_sets: Vec::new(),
            initial_allocation: 0,
            max_allocation: 0,
            state: WrapperState::New,
        }
    }

    pub fn major_id(&self) -> MajorFragmentId {
        self.major_id
    }

    pub fn state(&self) -> WrapperState {
        self.state
    }

    pub fn stats(&self) -> Result<&FragmentStats> {
        self.stats.as_ref().ok_or_else(|| {
            PlannerError::Internal(format!(
                "stats not collected for major fragment {}",
                self.major_id
            ))
        })
    }

    pub fn set_stats(&mut self, stats: FragmentStats) {
        debug_assert_eq!(self.state, WrapperState::New);
        self.stats = Some(stats);
        self.state = WrapperState::StatsCollected;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Freeze the parallelization width. Set once.
    pub fn set_width(&mut self, width: usize) {
        debug_assert_eq!(self.state, WrapperState::StatsCollected);
        self.width = width;
        self.state = WrapperState::Sized;
    }

    pub fn assigned_endpoints(&self) -> &[NodeEndpoint] {
        &self.assigned_endpoints
    }

    pub fn assigned_endpoint(&self, minor_fragment_id: u32) -> Result<&NodeEndpoint> {
        self.assigned_endpoints
            .get(minor_fragment_id as usize)
            .ok_or_else(|| {
                PlannerError::Internal(format!(
                    "no endpoint for minor fragment {}:{}",
                    self.major_id, minor_fragment_id
                ))
            })
    }

    /// Freeze the endpoint assignment. Set once, after the width.
    pub fn assign_endpoints(&mut self, endpoints: Vec<NodeEndpoint>, split_sets: Vec<Vec<u64>>) {
        debug_assert_eq!(self.state, WrapperState::Sized);
        debug_assert_eq!(endpoints.len(), self.width);
        self.assigned_endpoints = endpoints;
        self.split_sets = split_sets;
        self.state = WrapperState::Assigned;
    }

    pub fn split_set(&self, minor_fragment_id: u32) -> &[u64] {
        self.split_sets
            .get(minor_fragment_id as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reset_allocation(&mut self) {
        self.initial_allocation = 0;
        self.max_allocation = 0;
    }

    pub fn add_allocation(&mut self, initial: u64, max: u64) {
        self.initial_allocation += initial;
        self.max_allocation += max;
    }

    pub fn initial_allocation(&self) -> u64 {
        self.initial_allocation
    }

    pub fn max_allocation(&self) -> u64 {
        self.max_allocation
    }
}

/// Insertion-ordered wrapper arena; entries are created lazily on
/// first lookup.
#[derive(Debug, Default)]
pub struct PlanningSet {
    wrappers: Vec<Wrapper>,
    by_major: HashMap<MajorFragmentId, WrapperId>,
}

impl PlanningSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, major_id: MajorFragmentId) -> WrapperId {
        if let Some(&id) = self.by_major.get(&major_id) {
            return id;
        }
        let id = self.wrappers.len();
        self.wrappers.push(Wrapper::new(major_id));
        self.by_major.insert(major_id, id);
        id
    }

    pub fn lookup(&self, major_id: MajorFragmentId) -> Result<WrapperId> {
        self.by_major.get(&major_id).copied().ok_or_else(|| {
            PlannerError::Internal(format!("major fragment {} not in planning set", major_id))
        })
    }

    pub fn wrapper(&self, id: WrapperId) -> &Wrapper {
        &self.wrappers[id]
    }

    pub fn wrapper_mut(&mut self, id: WrapperId) -> &mut Wrapper {
        &mut self.wrappers[id]
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// Wrappers in first-encounter order.
    pub fn iter(&self) -> impl Iterator<Item = &Wrapper> {
        self.wrappers.iter()
    }

    pub fn ids(&self) -> std::ops::Range<WrapperId> {
        0..self.wrappers.len()
    }
}

/// Walk the fragment tree depth-first from the root toward senders,
/// creating one wrapper per fragment in encounter order. A fragment
/// revisited while still on the traversal stack means the exchange
/// edges form a cycle.
pub fn init_wrappers(tree: &FragmentTree, set: &mut PlanningSet) -> Result<()> {
    let mut in_progress = vec![false; tree.len()];
    let mut done = vec![false; tree.len()];
    visit(tree, tree.root().major_id, set, &mut in_progress, &mut done)
}

fn visit(
    tree: &FragmentTree,
    major_id: MajorFragmentId,
    set: &mut PlanningSet,
    in_progress: &mut [bool],
    done: &mut [bool],
) -> Result<()> {
    let fragment = tree.fragment(major_id)?;
    let idx = major_id as usize;
    if done[idx] {
        return Ok(());
    }
    if in_progress[idx] {
        return Err(PlannerError::Cycle { major_id });
    }
    in_progress[idx] = true;
    set.get_or_create(major_id);
    for pair in &fragment.receiving_exchanges {
        visit(tree, pair.other, set, in_progress, done)?;
    }
    in_progress[idx] = false;
    done[idx] = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::fragment::{ExchangePair, Fragment};
    use crate::plan::operator::{DistributionAffinity, ExchangeKind, PhysicalOperator};

    fn scan_fragment(major_id: MajorFragmentId) -> Fragment {
        Fragment {
            major_id,
            root: PhysicalOperator::Scan {
                table: "t".to_string(),
                splits: Vec::new(),
                distribution: DistributionAffinity::None,
                min_width: 1,
            },
            sending_exchange: None,
            receiving_exchanges: Vec::new(),
        }
    }

    fn pair(kind: ExchangeKind, other: MajorFragmentId) -> ExchangePair {
        ExchangePair {
            kind,
            spooling: false,
            supports_out_of_order: false,
            other,
        }
    }

    #[test]
    fn create_on_miss_keeps_order() {
        let mut set = PlanningSet::new();
        let a = set.get_or_create(7);
        let b = set.get_or_create(3);
        let a2 = set.get_or_create(7);
        assert_eq!(a, a2);
        assert_ne!(a, b);
        let majors: Vec<_> = set.iter().map(|w| w.major_id()).collect();
        assert_eq!(majors, vec![7, 3]);
    }

    #[test]
    fn ingest_walks_receiving_edges() {
        let mut root = scan_fragment(0);
        root.receiving_exchanges.push(pair(ExchangeKind::Gather, 1));
        let mut mid = scan_fragment(1);
        mid.sending_exchange = Some(pair(ExchangeKind::Gather, 0));
        mid.receiving_exchanges
            .push(pair(ExchangeKind::HashPartition, 2));
        let mut leaf = scan_fragment(2);
        leaf.sending_exchange = Some(pair(ExchangeKind::HashPartition, 1));

        let tree = FragmentTree::from_fragments(vec![root, mid, leaf]).unwrap();
        let mut set = PlanningSet::new();
        init_wrappers(&tree, &mut set).unwrap();
        let majors: Vec<_> = set.iter().map(|w| w.major_id()).collect();
        assert_eq!(majors, vec![0, 1, 2]);
    }

    #[test]
    fn ingest_rejects_exchange_cycle() {
        let mut a = scan_fragment(0);
        a.receiving_exchanges.push(pair(ExchangeKind::Gather, 1));
        let mut b = scan_fragment(1);
        b.receiving_exchanges.push(pair(ExchangeKind::Gather, 0));

        let tree = FragmentTree::from_fragments(vec![a, b]).unwrap();
        let mut set = PlanningSet::new();
        match init_wrappers(&tree, &mut set) {
            Err(PlannerError::Cycle { major_id }) => assert_eq!(major_id, 0),
            other => panic!("expected cycle, got {:?}", other),
        }
    }
}
