//! Work-unit emission.
//!
//! Runs after every wrapper is assigned. Emission order is planning
//! set iteration order, minor ids ascending within each fragment, and
//! is all-or-nothing: any failure aborts the whole call with no
//! fragments returned.

use crate::endpoint::NodeEndpoint;
use crate::error::{PlannerError, Result};
use crate::plan::fragment::FragmentTree;
use crate::plan::operator::{FunctionLookup, PhysicalOperator};
use crate::planner::materializer::Materializer;
use crate::planner::planning_set::{PlanningSet, WrapperState};
use crate::wire::PlanWriter;
use crate::workunit::{
    Collector, FragmentHandle, PlanFragment, QueryContextInfo, SessionIdentity, SessionOption,
};
use tracing::trace;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub fn generate_work_units(
    tree: &FragmentTree,
    set: &mut PlanningSet,
    writer: &PlanWriter,
    session_options: &[SessionOption],
    foreman: &NodeEndpoint,
    query_id: Uuid,
    session: &SessionIdentity,
    query_info: &QueryContextInfo,
    functions: &dyn FunctionLookup,
) -> Result<Vec<PlanFragment>> {
    let options_bytes = writer.write_options(session_options)?;
    let root_major = tree.root().major_id;
    let mut fragments = Vec::new();

    for wid in set.ids() {
        let (major_id, width, state) = {
            let wrapper = set.wrapper(wid);
            (wrapper.major_id(), wrapper.width(), wrapper.state())
        };
        if state != WrapperState::Assigned {
            return Err(PlannerError::Internal(format!(
                "major fragment {} was never assigned",
                major_id
            )));
        }

        let fragment = tree.fragment(major_id)?;
        if major_id == root_major && width != 1 {
            return Err(PlannerError::RootWidth { width });
        }
        let leaf_fragment = fragment.is_leaf();

        for minor in 0..width as u32 {
            let (root_op, mem_initial, mem_max) = {
                let materializer = Materializer::new(functions, set);
                materializer.materialize(fragment, set.wrapper(wid), minor)?
            };
            if !root_op.is_fragment_root() {
                return Err(PlannerError::RootTypeMismatch { major_id });
            }

            {
                let wrapper = set.wrapper_mut(wid);
                wrapper.reset_allocation();
                wrapper.add_allocation(mem_initial, mem_max);
            }
            let wrapper = set.wrapper(wid);

            let fragment_bytes = writer.write_plan(&root_op)?;
            let collectors = collect_receivers(&root_op);
            let assignment = wrapper.assigned_endpoint(minor)?.clone();

            trace!(
                major_id,
                minor,
                endpoint = %assignment,
                bytes = fragment_bytes.len(),
                "emitting plan fragment"
            );

            fragments.push(PlanFragment {
                handle: FragmentHandle {
                    query_id,
                    major_fragment_id: major_id,
                    minor_fragment_id: minor,
                },
                foreman: foreman.clone(),
                assignment,
                mem_initial: wrapper.initial_allocation(),
                mem_max: wrapper.max_allocation(),
                fragment_bytes,
                options_bytes: options_bytes.clone(),
                credentials: session.clone(),
                collectors,
                leaf_fragment,
                priority: query_info.priority,
                codec: writer.codec(),
                context: query_info.clone(),
            });
        }
    }

    Ok(fragments)
}

/// One collector per receiver in the materialized subtree, in
/// preorder.
fn collect_receivers(root: &PhysicalOperator) -> Vec<Collector> {
    let mut collectors = Vec::new();
    root.for_each(&mut |op| {
        if let PhysicalOperator::Receiver {
            opposite_major_id,
            spooling,
            supports_out_of_order,
            incoming,
            ..
        } = op
        {
            collectors.push(Collector {
                opposite_major_id: *opposite_major_id,
                is_spooling: *spooling,
                supports_out_of_order: *supports_out_of_order,
                incoming_minor_fragments: incoming.clone(),
            });
        }
    });
    collectors
}
