//! Planning observer hooks.
//!
//! Push-only, fire-and-forget notifications around the
//! parallelization pipeline. Implementations must not mutate planner
//! state; the default no-op observer is what tests use.

use crate::planner::planning_set::PlanningSet;
use crate::workunit::PlanFragment;

pub trait PlanObserver: Send + Sync {
    fn plan_parallel_start(&self) {}

    fn plan_parallelized(&self, _planning_set: &PlanningSet) {}

    fn plan_assignment_time(&self, _elapsed_ms: u64) {}

    fn plan_generation_time(&self, _elapsed_ms: u64) {}

    fn plans_distribution_complete(&self, _fragments: &[PlanFragment]) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl PlanObserver for NoopObserver {}
