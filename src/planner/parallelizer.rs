//! The parallelizer entry point.
//!
//! Determines the degree of parallelism of each fragment from the cost
//! of its operators, then assigns minor fragments to execution
//! endpoints by affinity. Live system load is not consulted; the
//! whole computation is a deterministic function of its inputs.

use crate::config::ParallelizeOptions;
use crate::endpoint::{ExecutionNodeMap, NodeEndpoint};
use crate::error::{PlannerError, Result};
use crate::observer::PlanObserver;
use crate::plan::fragment::FragmentTree;
use crate::plan::operator::FunctionLookup;
use crate::planner::assignment::assign_endpoints;
use crate::planner::dependency::build_dependency_graph;
use crate::planner::emitter::generate_work_units;
use crate::planner::materializer::deal_splits;
use crate::planner::planning_set::{init_wrappers, PlanningSet, WrapperId, WrapperState};
use crate::planner::stats::collect_stats;
use crate::planner::width::{decide_width, GlobalBudget};
use crate::wire::PlanWriter;
use crate::workunit::{PlanFragment, QueryContextInfo, SessionIdentity, SessionOption};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Parallelizer {
    options: ParallelizeOptions,
    node_map: ExecutionNodeMap,
    observer: Arc<dyn PlanObserver>,
}

impl Parallelizer {
    pub fn new(
        options: ParallelizeOptions,
        active_endpoints: &[NodeEndpoint],
        observer: Arc<dyn PlanObserver>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            node_map: ExecutionNodeMap::new(active_endpoints),
            options,
            observer,
        })
    }

    /// Compatibility constructor without an endpoint snapshot. With an
    /// empty node map every affinity projection comes back empty, so
    /// placement degrades to plain round-robin.
    pub fn with_options(
        options: ParallelizeOptions,
        observer: Arc<dyn PlanObserver>,
    ) -> Result<Self> {
        options.validate()?;
        warn!("parallelizer built without an endpoint snapshot; affinity projection is disabled");
        Ok(Self {
            node_map: ExecutionNodeMap::empty(),
            options,
            observer,
        })
    }

    pub fn options(&self) -> &ParallelizeOptions {
        &self.options
    }

    /// Parallelize a fragment tree into dispatchable plan fragments.
    ///
    /// All-or-nothing: on error no fragments are returned. The output
    /// is deterministic for a fixed input, including the iteration
    /// order of `active_endpoints`.
    #[allow(clippy::too_many_arguments)]
    pub fn get_fragments(
        &self,
        session_options: &[SessionOption],
        foreman: &NodeEndpoint,
        query_id: Uuid,
        active_endpoints: &[NodeEndpoint],
        writer: &PlanWriter,
        tree: &FragmentTree,
        session: &SessionIdentity,
        query_info: &QueryContextInfo,
        functions: &dyn FunctionLookup,
    ) -> Result<Vec<PlanFragment>> {
        if active_endpoints.is_empty() {
            return Err(PlannerError::InvalidOption(
                "no active endpoints to plan against".to_string(),
            ));
        }

        self.observer.plan_parallel_start();
        let assignment_clock = Instant::now();

        let mut set = PlanningSet::new();
        init_wrappers(tree, &mut set)?;
        let roots = build_dependency_graph(tree, &mut set)?;

        let mut budget = GlobalBudget::new(self.options.max_global_width, set.len());
        for root in roots {
            self.parallelize_fragment(root, tree, &mut set, active_endpoints, &mut budget)?;
        }
        for wrapper in set.iter() {
            if wrapper.state() != WrapperState::Assigned {
                return Err(PlannerError::Internal(format!(
                    "major fragment {} was never parallelized",
                    wrapper.major_id()
                )));
            }
        }

        self.observer.plan_parallelized(&set);
        self.observer
            .plan_assignment_time(assignment_clock.elapsed().as_millis() as u64);

        let generation_clock = Instant::now();
        let fragments = generate_work_units(
            tree,
            &mut set,
            writer,
            session_options,
            foreman,
            query_id,
            session,
            query_info,
            functions,
        )?;
        self.observer
            .plan_generation_time(generation_clock.elapsed().as_millis() as u64);
        self.observer.plans_distribution_complete(&fragments);

        info!(
            query_id = %query_id,
            major_fragments = set.len(),
            plan_fragments = fragments.len(),
            "query parallelized"
        );
        Ok(fragments)
    }

    /// Size and place one wrapper, its dependencies first. Idempotent
    /// through the wrapper state, so shared dependencies are sized
    /// exactly once.
    fn parallelize_fragment(
        &self,
        wid: WrapperId,
        tree: &FragmentTree,
        set: &mut PlanningSet,
        active_endpoints: &[NodeEndpoint],
        budget: &mut GlobalBudget,
    ) -> Result<()> {
        if set.wrapper(wid).state() == WrapperState::Assigned {
            return Ok(());
        }

        let dependencies = set.wrapper(wid).dependencies.clone();
        for dependency in dependencies {
            self.parallelize_fragment(dependency, tree, set, active_endpoints, budget)?;
        }

        let major_id = set.wrapper(wid).major_id();
        let fragment = tree.fragment(major_id)?;

        let stats = collect_stats(fragment, set, &self.node_map)?;
        set.wrapper_mut(wid).set_stats(stats);

        let is_root = major_id == tree.root().major_id;
        let width = decide_width(
            major_id,
            is_root,
            set.wrapper(wid).stats()?,
            &self.options,
            active_endpoints.len(),
            budget,
        )?;
        set.wrapper_mut(wid).set_width(width);

        let split_sets = deal_splits(&fragment.root, width);
        let assigned = assign_endpoints(
            major_id,
            width,
            set.wrapper(wid).stats()?,
            active_endpoints,
            &self.options,
        )?;
        debug!(
            major_id,
            width,
            endpoints = assigned.len(),
            "fragment parallelized"
        );
        set.wrapper_mut(wid).assign_endpoints(assigned, split_sets);
        Ok(())
    }
}
