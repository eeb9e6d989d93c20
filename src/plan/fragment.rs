//! Fragment tree construction.
//!
//! Exchange operators are fragment boundaries: everything below an
//! `Exchange` becomes a separate fragment whose root is the sending
//! half, while the receiving half stays behind as a leaf of the parent
//! fragment. Fragments live in an arena indexed by major id, so
//! exchange pairs reference each other by id rather than by owning
//! pointers.

use crate::error::{PlannerError, Result};
use crate::plan::operator::{ExchangeKind, PhysicalOperator};
use std::collections::BTreeMap;

pub type MajorFragmentId = u32;

/// Directed edge between two fragments, kept on both ends: the sender
/// stores it as its sending exchange, the receiver in its receiving
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangePair {
    pub kind: ExchangeKind,
    pub spooling: bool,
    pub supports_out_of_order: bool,
    pub other: MajorFragmentId,
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub major_id: MajorFragmentId,
    pub root: PhysicalOperator,
    /// None iff this is the query root.
    pub sending_exchange: Option<ExchangePair>,
    /// Empty iff this is a leaf fragment.
    pub receiving_exchanges: Vec<ExchangePair>,
}

impl Fragment {
    pub fn is_leaf(&self) -> bool {
        self.receiving_exchanges.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FragmentTree {
    fragments: Vec<Fragment>,
}

impl FragmentTree {
    /// Split an operator tree into fragments at its exchange
    /// boundaries. Major ids are assigned in discovery order with the
    /// query root at 0.
    pub fn build(root_op: PhysicalOperator) -> Result<FragmentTree> {
        let mut builder = TreeBuilder {
            next_major: 1,
            built: Vec::new(),
            receiving: BTreeMap::new(),
        };
        let root = builder.split(root_op, 0)?;
        builder.built.push(Fragment {
            major_id: 0,
            root,
            sending_exchange: None,
            receiving_exchanges: Vec::new(),
        });
        builder.built.sort_by_key(|f| f.major_id);
        for fragment in &mut builder.built {
            fragment.receiving_exchanges = builder
                .receiving
                .remove(&fragment.major_id)
                .unwrap_or_default();
        }
        Ok(FragmentTree {
            fragments: builder.built,
        })
    }

    /// Assemble a tree from pre-built fragments. Intended for callers
    /// that already carry fragment metadata; fragment positions must
    /// match their major ids.
    pub fn from_fragments(fragments: Vec<Fragment>) -> Result<FragmentTree> {
        for (i, fragment) in fragments.iter().enumerate() {
            if fragment.major_id as usize != i {
                return Err(PlannerError::Internal(format!(
                    "fragment at position {} has major id {}",
                    i, fragment.major_id
                )));
            }
        }
        Ok(FragmentTree { fragments })
    }

    pub fn root(&self) -> &Fragment {
        &self.fragments[0]
    }

    pub fn fragment(&self, id: MajorFragmentId) -> Result<&Fragment> {
        self.fragments
            .get(id as usize)
            .ok_or_else(|| PlannerError::Internal(format!("unknown major fragment {}", id)))
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

struct TreeBuilder {
    next_major: MajorFragmentId,
    built: Vec<Fragment>,
    receiving: BTreeMap<MajorFragmentId, Vec<ExchangePair>>,
}

impl TreeBuilder {
    fn split(
        &mut self,
        op: PhysicalOperator,
        current: MajorFragmentId,
    ) -> Result<PhysicalOperator> {
        match op {
            PhysicalOperator::Exchange {
                kind,
                spooling,
                supports_out_of_order,
                child,
            } => {
                let child_major = self.next_major;
                self.next_major += 1;

                let inner = self.split(*child, child_major)?;
                self.built.push(Fragment {
                    major_id: child_major,
                    root: PhysicalOperator::Sender {
                        kind,
                        opposite_major_id: current,
                        child: Box::new(inner),
                        destinations: Vec::new(),
                    },
                    sending_exchange: Some(ExchangePair {
                        kind,
                        spooling,
                        supports_out_of_order,
                        other: current,
                    }),
                    receiving_exchanges: Vec::new(),
                });
                self.receiving.entry(current).or_default().push(ExchangePair {
                    kind,
                    spooling,
                    supports_out_of_order,
                    other: child_major,
                });

                Ok(PhysicalOperator::Receiver {
                    kind,
                    opposite_major_id: child_major,
                    spooling,
                    supports_out_of_order,
                    incoming: Vec::new(),
                })
            }
            PhysicalOperator::Screen { child } => Ok(PhysicalOperator::Screen {
                child: Box::new(self.split(*child, current)?),
            }),
            PhysicalOperator::Filter {
                child,
                cost,
                predicate_fn,
            } => Ok(PhysicalOperator::Filter {
                child: Box::new(self.split(*child, current)?),
                cost,
                predicate_fn,
            }),
            PhysicalOperator::Project { child, cost } => Ok(PhysicalOperator::Project {
                child: Box::new(self.split(*child, current)?),
                cost,
            }),
            PhysicalOperator::HashAggregate { child, cost } => {
                Ok(PhysicalOperator::HashAggregate {
                    child: Box::new(self.split(*child, current)?),
                    cost,
                })
            }
            PhysicalOperator::HashJoin { left, right, cost } => Ok(PhysicalOperator::HashJoin {
                left: Box::new(self.split(*left, current)?),
                right: Box::new(self.split(*right, current)?),
                cost,
            }),
            PhysicalOperator::Sender { .. } | PhysicalOperator::Receiver { .. } => {
                Err(PlannerError::Internal(
                    "input plan already contains exchange halves".to_string(),
                ))
            }
            leaf @ PhysicalOperator::Scan { .. } => Ok(leaf),
        }
    }
}
