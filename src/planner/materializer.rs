//! Minor-fragment materialization.
//!
//! Once every wrapper has its endpoints, each (major, minor) pair gets
//! its own copy of the operator tree with the minor-dependent pieces
//! resolved: senders learn their destination minors, receivers their
//! incoming minors, scans keep only the splits dealt to this minor.
//! Memory reservations are accumulated along the walk.

use crate::error::{PlannerError, Result};
use crate::plan::fragment::Fragment;
use crate::plan::operator::{
    ExchangeKind, FunctionLookup, MinorFragmentEndpoint, PhysicalOperator,
};
use crate::planner::planning_set::{PlanningSet, Wrapper};

// Memory reservations per operator, summed into the fragment's
// initial/max allocation.
const SCAN_RESERVATION: (u64, u64) = (1 << 20, 1 << 28);
const BUFFERED_RESERVATION: (u64, u64) = (8 << 20, 2 << 30);
const EXCHANGE_RESERVATION: (u64, u64) = (1 << 20, 1 << 26);
const DEFAULT_RESERVATION: (u64, u64) = (1 << 20, 1 << 26);

/// Deal every scan split of the fragment to a minor: split `i` goes to
/// minor `i % width`. The result is stored on the wrapper and read
/// back while materializing.
pub fn deal_splits(root: &PhysicalOperator, width: usize) -> Vec<Vec<u64>> {
    let mut sets = vec![Vec::new(); width];
    root.for_each(&mut |op| {
        if let PhysicalOperator::Scan { splits, .. } = op {
            for (i, split) in splits.iter().enumerate() {
                sets[i % width].push(split.id);
            }
        }
    });
    sets
}

pub struct Materializer<'a> {
    functions: &'a dyn FunctionLookup,
    set: &'a PlanningSet,
}

impl<'a> Materializer<'a> {
    pub fn new(functions: &'a dyn FunctionLookup, set: &'a PlanningSet) -> Self {
        Self { functions, set }
    }

    /// Produce the operator tree of one minor fragment together with
    /// its accumulated (initial, max) memory reservation.
    pub fn materialize(
        &self,
        fragment: &Fragment,
        wrapper: &Wrapper,
        minor_fragment_id: u32,
    ) -> Result<(PhysicalOperator, u64, u64)> {
        let mut mem = (0u64, 0u64);
        let root = self.rewrite(&fragment.root, wrapper, minor_fragment_id, &mut mem)?;
        Ok((root, mem.0, mem.1))
    }

    fn rewrite(
        &self,
        op: &PhysicalOperator,
        wrapper: &Wrapper,
        minor: u32,
        mem: &mut (u64, u64),
    ) -> Result<PhysicalOperator> {
        match op {
            PhysicalOperator::Screen { child } => {
                charge(mem, DEFAULT_RESERVATION);
                Ok(PhysicalOperator::Screen {
                    child: Box::new(self.rewrite(child, wrapper, minor, mem)?),
                })
            }
            PhysicalOperator::Sender {
                kind,
                opposite_major_id,
                child,
                ..
            } => {
                charge(mem, EXCHANGE_RESERVATION);
                let destinations = self.sender_destinations(*kind, *opposite_major_id, minor)?;
                Ok(PhysicalOperator::Sender {
                    kind: *kind,
                    opposite_major_id: *opposite_major_id,
                    child: Box::new(self.rewrite(child, wrapper, minor, mem)?),
                    destinations,
                })
            }
            PhysicalOperator::Receiver {
                kind,
                opposite_major_id,
                spooling,
                supports_out_of_order,
                ..
            } => {
                charge(mem, EXCHANGE_RESERVATION);
                let incoming =
                    self.receiver_incoming(*kind, *opposite_major_id, wrapper.width(), minor)?;
                Ok(PhysicalOperator::Receiver {
                    kind: *kind,
                    opposite_major_id: *opposite_major_id,
                    spooling: *spooling,
                    supports_out_of_order: *supports_out_of_order,
                    incoming,
                })
            }
            PhysicalOperator::Scan {
                table,
                splits,
                distribution,
                min_width,
            } => {
                charge(mem, SCAN_RESERVATION);
                let assigned = wrapper.split_set(minor);
                Ok(PhysicalOperator::Scan {
                    table: table.clone(),
                    splits: splits
                        .iter()
                        .filter(|s| assigned.contains(&s.id))
                        .cloned()
                        .collect(),
                    distribution: *distribution,
                    min_width: *min_width,
                })
            }
            PhysicalOperator::Filter {
                child,
                cost,
                predicate_fn,
            } => {
                charge(mem, DEFAULT_RESERVATION);
                if let Some(name) = predicate_fn {
                    if !self.functions.contains(name) {
                        return Err(PlannerError::UnknownFunction { name: name.clone() });
                    }
                }
                Ok(PhysicalOperator::Filter {
                    child: Box::new(self.rewrite(child, wrapper, minor, mem)?),
                    cost: *cost,
                    predicate_fn: predicate_fn.clone(),
                })
            }
            PhysicalOperator::Project { child, cost } => {
                charge(mem, DEFAULT_RESERVATION);
                Ok(PhysicalOperator::Project {
                    child: Box::new(self.rewrite(child, wrapper, minor, mem)?),
                    cost: *cost,
                })
            }
            PhysicalOperator::HashAggregate { child, cost } => {
                charge(mem, BUFFERED_RESERVATION);
                Ok(PhysicalOperator::HashAggregate {
                    child: Box::new(self.rewrite(child, wrapper, minor, mem)?),
                    cost: *cost,
                })
            }
            PhysicalOperator::HashJoin { left, right, cost } => {
                charge(mem, BUFFERED_RESERVATION);
                Ok(PhysicalOperator::HashJoin {
                    left: Box::new(self.rewrite(left, wrapper, minor, mem)?),
                    right: Box::new(self.rewrite(right, wrapper, minor, mem)?),
                    cost: *cost,
                })
            }
            PhysicalOperator::Exchange { .. } => Err(PlannerError::Internal(format!(
                "unsplit exchange inside major fragment {}",
                wrapper.major_id()
            ))),
        }
    }

    fn sender_destinations(
        &self,
        kind: ExchangeKind,
        receiver_major: u32,
        minor: u32,
    ) -> Result<Vec<MinorFragmentEndpoint>> {
        let receiver = self.set.wrapper(self.set.lookup(receiver_major)?);
        let assigned = receiver.assigned_endpoints();
        let all = || {
            assigned
                .iter()
                .enumerate()
                .map(|(i, ep)| MinorFragmentEndpoint {
                    endpoint: ep.clone(),
                    minor_fragment_id: i as u32,
                })
                .collect::<Vec<_>>()
        };
        match kind {
            ExchangeKind::Gather | ExchangeKind::Broadcast | ExchangeKind::HashPartition => {
                Ok(all())
            }
            ExchangeKind::Demux => {
                let target = minor;
                Ok(vec![MinorFragmentEndpoint {
                    endpoint: receiver.assigned_endpoint(target)?.clone(),
                    minor_fragment_id: target,
                }])
            }
            ExchangeKind::Mux => {
                let target = minor % receiver.width() as u32;
                Ok(vec![MinorFragmentEndpoint {
                    endpoint: receiver.assigned_endpoint(target)?.clone(),
                    minor_fragment_id: target,
                }])
            }
        }
    }

    fn receiver_incoming(
        &self,
        kind: ExchangeKind,
        sender_major: u32,
        own_width: usize,
        minor: u32,
    ) -> Result<Vec<MinorFragmentEndpoint>> {
        let sender = self.set.wrapper(self.set.lookup(sender_major)?);
        let assigned = sender.assigned_endpoints();
        let pick = |pred: &dyn Fn(u32) -> bool| {
            assigned
                .iter()
                .enumerate()
                .filter(|(i, _)| pred(*i as u32))
                .map(|(i, ep)| MinorFragmentEndpoint {
                    endpoint: ep.clone(),
                    minor_fragment_id: i as u32,
                })
                .collect::<Vec<_>>()
        };
        match kind {
            ExchangeKind::Gather | ExchangeKind::Broadcast | ExchangeKind::HashPartition => {
                Ok(pick(&|_| true))
            }
            ExchangeKind::Demux => Ok(pick(&|i| i == minor)),
            ExchangeKind::Mux => Ok(pick(&|i| i % own_width as u32 == minor)),
        }
    }
}

fn charge(mem: &mut (u64, u64), reservation: (u64, u64)) {
    mem.0 += reservation.0;
    mem.1 += reservation.1;
}
