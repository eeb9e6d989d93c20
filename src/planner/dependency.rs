//! Fragment dependency graph.
//!
//! The sending exchange of each fragment may force a sizing order
//! between the two fragments it connects. This module turns those
//! per-exchange tags into wrapper-level dependency edges, rejects
//! cyclic orders, and reports the roots the parallelizer starts from.

use crate::error::{PlannerError, Result};
use crate::plan::fragment::FragmentTree;
use crate::plan::operator::ParallelizationDependency;
use crate::planner::planning_set::{PlanningSet, WrapperId};

/// Record dependency edges on the wrappers and return the roots:
/// wrappers that appear in nobody's dependency list.
pub fn build_dependency_graph(
    tree: &FragmentTree,
    set: &mut PlanningSet,
) -> Result<Vec<WrapperId>> {
    let mut edges: Vec<(WrapperId, WrapperId)> = Vec::new();

    for id in set.ids() {
        let major_id = set.wrapper(id).major_id();
        let fragment = tree.fragment(major_id)?;
        let Some(sending) = &fragment.sending_exchange else {
            continue;
        };
        if sending.other == major_id {
            return Err(PlannerError::Cycle { major_id });
        }
        let receiver = set.lookup(sending.other)?;
        match sending.kind.parallelization_dependency() {
            Some(ParallelizationDependency::ReceiverDependsOnSender) => {
                edges.push((receiver, id));
            }
            Some(ParallelizationDependency::SenderDependsOnReceiver) => {
                edges.push((id, receiver));
            }
            None => {}
        }
    }

    let mut depended_upon = vec![false; set.len()];
    for (dependent, dependency) in edges {
        set.wrapper_mut(dependent).dependencies.push(dependency);
        depended_upon[dependency] = true;
    }

    check_acyclic(set)?;

    Ok(set
        .ids()
        .filter(|id| !depended_upon[*id])
        .collect())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Gray,
    Black,
}

fn check_acyclic(set: &PlanningSet) -> Result<()> {
    let mut marks = vec![Mark::White; set.len()];
    for id in set.ids() {
        if marks[id] == Mark::White {
            dfs(set, id, &mut marks)?;
        }
    }
    Ok(())
}

fn dfs(set: &PlanningSet, id: WrapperId, marks: &mut [Mark]) -> Result<()> {
    marks[id] = Mark::Gray;
    for &dep in &set.wrapper(id).dependencies {
        match marks[dep] {
            Mark::Gray => {
                return Err(PlannerError::Cycle {
                    major_id: set.wrapper(dep).major_id(),
                })
            }
            Mark::White => dfs(set, dep, marks)?,
            Mark::Black => {}
        }
    }
    marks[id] = Mark::Black;
    Ok(())
}
