//! Per-fragment statistics.
//!
//! One walk over a fragment's operator tree yields everything the
//! width decision and endpoint assignment need: total cost, the
//! hardest min/max width constraints, endpoint affinity projected
//! onto the active set, and the strongest distribution affinity tag.
//! Collection runs after the fragment's dependencies are sized, so
//! exchange halves pinned to the opposite fragment's width always see
//! a frozen value.

use crate::endpoint::{ExecutionNodeMap, NodeEndpoint};
use crate::error::{PlannerError, Result};
use crate::plan::fragment::Fragment;
use crate::plan::operator::{DistributionAffinity, ExchangeKind, PhysicalOperator};
use crate::planner::planning_set::{PlanningSet, WrapperState};

#[derive(Debug, Clone)]
pub struct FragmentStats {
    pub cost: f64,
    pub min_width: usize,
    pub max_width: usize,
    /// Affinity weights summed per endpoint, active endpoints only,
    /// in active-set order.
    pub affinity: Vec<(NodeEndpoint, f64)>,
    pub distribution: DistributionAffinity,
}

struct Accumulator {
    cost: f64,
    min_width: usize,
    max_width: usize,
    raw_affinity: Vec<(NodeEndpoint, f64)>,
    distribution: DistributionAffinity,
}

pub fn collect_stats(
    fragment: &Fragment,
    set: &PlanningSet,
    node_map: &ExecutionNodeMap,
) -> Result<FragmentStats> {
    let mut acc = Accumulator {
        cost: 0.0,
        min_width: 1,
        max_width: usize::MAX,
        raw_affinity: Vec::new(),
        distribution: DistributionAffinity::None,
    };
    visit(&fragment.root, fragment.major_id, set, &mut acc)?;

    if acc.distribution == DistributionAffinity::Hard {
        for (endpoint, weight) in &acc.raw_affinity {
            if *weight > 0.0 && !node_map.is_active(endpoint) {
                return Err(PlannerError::UnavailablePinnedEndpoint {
                    major_id: fragment.major_id,
                    endpoint: endpoint.address(),
                });
            }
        }
    }

    Ok(FragmentStats {
        cost: acc.cost,
        min_width: acc.min_width,
        max_width: acc.max_width,
        affinity: node_map.project_affinity(&acc.raw_affinity),
        distribution: acc.distribution,
    })
}

fn visit(
    op: &PhysicalOperator,
    major_id: u32,
    set: &PlanningSet,
    acc: &mut Accumulator,
) -> Result<()> {
    match op {
        PhysicalOperator::Screen { .. } => {
            acc.max_width = acc.max_width.min(1);
        }
        PhysicalOperator::Scan {
            splits,
            distribution,
            min_width,
            ..
        } => {
            acc.cost += splits.iter().map(|s| s.size_bytes as f64).sum::<f64>();
            acc.max_width = acc.max_width.min(splits.len().max(1));
            acc.min_width = acc.min_width.max(*min_width);
            acc.distribution = acc.distribution.max(*distribution);
            for split in splits {
                acc.raw_affinity.extend(split.affinity.iter().cloned());
            }
        }
        PhysicalOperator::Receiver {
            kind,
            opposite_major_id,
            ..
        } => match kind {
            ExchangeKind::Gather => acc.max_width = acc.max_width.min(1),
            ExchangeKind::Mux => {
                let width = opposite_width(*opposite_major_id, major_id, set)?;
                acc.min_width = acc.min_width.max(width);
                acc.max_width = acc.max_width.min(width);
            }
            _ => {}
        },
        PhysicalOperator::Sender {
            kind,
            opposite_major_id,
            ..
        } => {
            if *kind == ExchangeKind::Demux {
                let width = opposite_width(*opposite_major_id, major_id, set)?;
                acc.min_width = acc.min_width.max(width);
                acc.max_width = acc.max_width.min(width);
            }
        }
        PhysicalOperator::Filter { cost, .. }
        | PhysicalOperator::Project { cost, .. }
        | PhysicalOperator::HashAggregate { cost, .. }
        | PhysicalOperator::HashJoin { cost, .. } => {
            acc.cost += cost;
        }
        PhysicalOperator::Exchange { .. } => {
            return Err(PlannerError::Internal(format!(
                "unsplit exchange inside major fragment {}",
                major_id
            )))
        }
    }
    for child in op.children() {
        visit(child, major_id, set, acc)?;
    }
    Ok(())
}

/// Width of the fragment on the other side of a pinned exchange. The
/// dependency graph guarantees it was sized first.
fn opposite_width(opposite_major_id: u32, major_id: u32, set: &PlanningSet) -> Result<usize> {
    let wrapper = set.wrapper(set.lookup(opposite_major_id)?);
    match wrapper.state() {
        WrapperState::Sized | WrapperState::Assigned => Ok(wrapper.width()),
        _ => Err(PlannerError::Internal(format!(
            "major fragment {} pinned to {} which is not sized yet",
            major_id, opposite_major_id
        ))),
    }
}
