//! Physical operator trees.
//!
//! The parallelizer sees an already-optimized physical plan as an
//! owned operator tree. `Exchange` nodes only exist in the input tree;
//! building the fragment tree splits each one into a `Sender` (root of
//! the sending fragment) and a `Receiver` (leaf of the receiving
//! fragment). `Sender.destinations` and `Receiver.incoming` stay empty
//! until materialization fills them per minor fragment.

use crate::endpoint::NodeEndpoint;
use serde::{Deserialize, Serialize};

/// Strength of a fragment's placement preference.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DistributionAffinity {
    #[default]
    None,
    Soft,
    Hard,
}

/// Sizing order constraint imposed by an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelizationDependency {
    ReceiverDependsOnSender,
    SenderDependsOnReceiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Funnel every sender minor into a single receiver.
    Gather,
    /// Replicate every sender minor to every receiver minor.
    Broadcast,
    /// Repartition rows by hash across receiver minors.
    HashPartition,
    /// Fold sender minors onto fewer receivers; the receiver width
    /// follows the sender width.
    Mux,
    /// Fan one sender minor out per receiver minor; the sender width
    /// follows the receiver width.
    Demux,
}

impl ExchangeKind {
    pub fn parallelization_dependency(&self) -> Option<ParallelizationDependency> {
        match self {
            ExchangeKind::Mux => Some(ParallelizationDependency::ReceiverDependsOnSender),
            ExchangeKind::Demux => Some(ParallelizationDependency::SenderDependsOnReceiver),
            ExchangeKind::Gather | ExchangeKind::Broadcast | ExchangeKind::HashPartition => None,
        }
    }
}

/// One scan work item with its locality hints. Split ids must be
/// unique within their fragment; the split-dealing step keys on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSplit {
    pub id: u64,
    pub size_bytes: u64,
    pub affinity: Vec<(NodeEndpoint, f64)>,
}

/// A (endpoint, minor id) pair: one concrete peer of an exchange half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinorFragmentEndpoint {
    pub endpoint: NodeEndpoint,
    pub minor_fragment_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysicalOperator {
    /// Query sink; root operator of the root fragment.
    Screen { child: Box<PhysicalOperator> },

    /// Fragment boundary marker in the input tree.
    Exchange {
        kind: ExchangeKind,
        spooling: bool,
        supports_out_of_order: bool,
        child: Box<PhysicalOperator>,
    },

    /// Sending half of an exchange; root operator of a non-root
    /// fragment.
    Sender {
        kind: ExchangeKind,
        opposite_major_id: u32,
        child: Box<PhysicalOperator>,
        destinations: Vec<MinorFragmentEndpoint>,
    },

    /// Receiving half of an exchange; a leaf in the receiving
    /// fragment's tree.
    Receiver {
        kind: ExchangeKind,
        opposite_major_id: u32,
        spooling: bool,
        supports_out_of_order: bool,
        incoming: Vec<MinorFragmentEndpoint>,
    },

    Scan {
        table: String,
        splits: Vec<ScanSplit>,
        distribution: DistributionAffinity,
        min_width: usize,
    },

    Filter {
        child: Box<PhysicalOperator>,
        cost: f64,
        predicate_fn: Option<String>,
    },

    Project {
        child: Box<PhysicalOperator>,
        cost: f64,
    },

    HashAggregate {
        child: Box<PhysicalOperator>,
        cost: f64,
    },

    HashJoin {
        left: Box<PhysicalOperator>,
        right: Box<PhysicalOperator>,
        cost: f64,
    },
}

impl PhysicalOperator {
    /// Whether this operator may sit at the top of a materialized
    /// minor fragment.
    pub fn is_fragment_root(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::Screen { .. } | PhysicalOperator::Sender { .. }
        )
    }

    pub fn children(&self) -> Vec<&PhysicalOperator> {
        match self {
            PhysicalOperator::Screen { child }
            | PhysicalOperator::Exchange { child, .. }
            | PhysicalOperator::Sender { child, .. }
            | PhysicalOperator::Filter { child, .. }
            | PhysicalOperator::Project { child, .. }
            | PhysicalOperator::HashAggregate { child, .. } => vec![child],
            PhysicalOperator::HashJoin { left, right, .. } => vec![left, right],
            PhysicalOperator::Receiver { .. } | PhysicalOperator::Scan { .. } => Vec::new(),
        }
    }

    /// Preorder walk over the tree.
    pub fn for_each<'a>(&'a self, f: &mut impl FnMut(&'a PhysicalOperator)) {
        f(self);
        for child in self.children() {
            child.for_each(f);
        }
    }
}

/// Scalar-function resolution used while materializing filters.
pub trait FunctionLookup {
    fn contains(&self, name: &str) -> bool;
}

/// Accepts every function name.
#[derive(Debug, Default)]
pub struct NoopFunctions;

impl FunctionLookup for NoopFunctions {
    fn contains(&self, _name: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_ordering_is_none_soft_hard() {
        assert!(DistributionAffinity::None < DistributionAffinity::Soft);
        assert!(DistributionAffinity::Soft < DistributionAffinity::Hard);
        assert_eq!(
            DistributionAffinity::Soft.max(DistributionAffinity::Hard),
            DistributionAffinity::Hard
        );
    }

    #[test]
    fn dependency_per_exchange_kind() {
        assert_eq!(
            ExchangeKind::Mux.parallelization_dependency(),
            Some(ParallelizationDependency::ReceiverDependsOnSender)
        );
        assert_eq!(
            ExchangeKind::Demux.parallelization_dependency(),
            Some(ParallelizationDependency::SenderDependsOnReceiver)
        );
        assert_eq!(ExchangeKind::Gather.parallelization_dependency(), None);
        assert_eq!(ExchangeKind::Broadcast.parallelization_dependency(), None);
        assert_eq!(
            ExchangeKind::HashPartition.parallelization_dependency(),
            None
        );
    }

    #[test]
    fn fragment_roots() {
        let scan = PhysicalOperator::Scan {
            table: "t".to_string(),
            splits: Vec::new(),
            distribution: DistributionAffinity::None,
            min_width: 1,
        };
        assert!(!scan.is_fragment_root());
        let screen = PhysicalOperator::Screen {
            child: Box::new(scan.clone()),
        };
        assert!(screen.is_fragment_root());
        let sender = PhysicalOperator::Sender {
            kind: ExchangeKind::Gather,
            opposite_major_id: 0,
            child: Box::new(scan),
            destinations: Vec::new(),
        };
        assert!(sender.is_fragment_root());
    }

    #[test]
    fn preorder_walk_visits_all() {
        let tree = PhysicalOperator::HashJoin {
            left: Box::new(PhysicalOperator::Scan {
                table: "a".to_string(),
                splits: Vec::new(),
                distribution: DistributionAffinity::None,
                min_width: 1,
            }),
            right: Box::new(PhysicalOperator::Scan {
                table: "b".to_string(),
                splits: Vec::new(),
                distribution: DistributionAffinity::None,
                min_width: 1,
            }),
            cost: 10.0,
        };
        let mut seen = 0;
        tree.for_each(&mut |_| seen += 1);
        assert_eq!(seen, 3);
    }
}
