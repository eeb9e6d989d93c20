//! Width decision.
//!
//! The preferred width is cost-driven (`cost / slice_target`), then
//! clamped by the fragment's own min/max hints, the per-node ceiling
//! scaled by the cluster size, the remaining global budget, and hard
//! affinity. The global ceiling bounds the *sum* of widths over the
//! whole query, so the budget reserves one slot for every fragment
//! that still has to be sized.

use crate::config::ParallelizeOptions;
use crate::error::{PlannerError, Result};
use crate::plan::operator::DistributionAffinity;
use crate::planner::stats::FragmentStats;
use tracing::debug;

/// Width ledger shared across one parallelization call.
#[derive(Debug)]
pub struct GlobalBudget {
    ceiling: usize,
    total_fragments: usize,
    used: usize,
    sized: usize,
}

impl GlobalBudget {
    pub fn new(ceiling: usize, total_fragments: usize) -> Self {
        Self {
            ceiling,
            total_fragments,
            used: 0,
            sized: 0,
        }
    }

    /// Widest this fragment may go while leaving one slot for each
    /// fragment not sized yet.
    fn available(&self) -> usize {
        let reserved = self.total_fragments.saturating_sub(self.sized + 1);
        self.ceiling.saturating_sub(self.used + reserved)
    }

    fn consume(&mut self, width: usize) {
        self.used += width;
        self.sized += 1;
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

pub fn decide_width(
    major_id: u32,
    is_root: bool,
    stats: &FragmentStats,
    options: &ParallelizeOptions,
    active_endpoint_count: usize,
    budget: &mut GlobalBudget,
) -> Result<usize> {
    let available = budget.available();

    if is_root {
        if available < 1 {
            return Err(unsatisfiable(major_id, "global width budget exhausted"));
        }
        budget.consume(1);
        return Ok(1);
    }

    let cost_width = (stats.cost / options.slice_target.max(1) as f64).ceil() as usize;

    let mut max_width = stats.max_width;
    max_width = max_width.min(
        options
            .max_width_per_node
            .saturating_mul(active_endpoint_count),
    );
    max_width = max_width.min(available);
    if stats.distribution == DistributionAffinity::Hard {
        let eligible = stats.affinity.iter().filter(|(_, w)| *w > 0.0).count();
        max_width = max_width.min(eligible);
    }
    let min_width = stats.min_width.max(1);

    if max_width < min_width {
        return Err(unsatisfiable(
            major_id,
            &format!("min width {} exceeds effective max {}", min_width, max_width),
        ));
    }

    let width = cost_width.clamp(min_width, max_width);
    debug!(major_id, cost = stats.cost, width, "fragment width decided");
    budget.consume(width);
    Ok(width)
}

fn unsatisfiable(major_id: u32, detail: &str) -> PlannerError {
    PlannerError::WidthUnsatisfiable {
        major_id,
        detail: detail.to_string(),
    }
}
