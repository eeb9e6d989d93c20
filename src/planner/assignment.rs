//! Endpoint assignment.
//!
//! Two interchangeable creators map `(width, affinity, ordered active
//! endpoints, options)` to one endpoint per minor fragment. The legacy
//! creator round-robins over endpoints sorted by affinity; the
//! balanced creator computes per-endpoint target counts from an
//! affinity/uniform blend and levels them with a balance factor. Both
//! are pure and deterministic for a fixed endpoint iteration order.

use crate::config::ParallelizeOptions;
use crate::endpoint::NodeEndpoint;
use crate::error::{PlannerError, Result};
use crate::plan::operator::DistributionAffinity;
use crate::planner::stats::FragmentStats;
use std::cmp::Ordering;

pub fn assign_endpoints(
    major_id: u32,
    width: usize,
    stats: &FragmentStats,
    active: &[NodeEndpoint],
    options: &ParallelizeOptions,
) -> Result<Vec<NodeEndpoint>> {
    if stats.distribution == DistributionAffinity::Hard {
        return assign_hard(major_id, width, stats);
    }
    if options.use_new_assignment_creator {
        assign_balanced(major_id, width, stats, active, options)
    } else {
        assign_round_robin(major_id, width, stats, active, options.max_width_per_node)
    }
}

/// Hard affinity mandates the eligible endpoints outright; the width
/// decision already shrank the width to the eligible count, so each
/// eligible endpoint hosts at most one minor. The per-node ceiling
/// does not apply to a pinned endpoint.
fn assign_hard(major_id: u32, width: usize, stats: &FragmentStats) -> Result<Vec<NodeEndpoint>> {
    let eligible: Vec<&NodeEndpoint> = stats
        .affinity
        .iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(ep, _)| ep)
        .collect();
    if eligible.is_empty() {
        return Err(PlannerError::Internal(format!(
            "major fragment {} has hard affinity but no eligible endpoints",
            major_id
        )));
    }
    Ok((0..width)
        .map(|minor| eligible[minor % eligible.len()].clone())
        .collect())
}

/// Active endpoints sorted by descending affinity weight; ties keep
/// the caller's endpoint order.
fn sorted_by_affinity(active: &[NodeEndpoint], stats: &FragmentStats) -> Vec<NodeEndpoint> {
    let weight = |ep: &NodeEndpoint| -> f64 {
        stats
            .affinity
            .iter()
            .find(|(a, _)| a == ep)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    };
    let mut sorted = active.to_vec();
    sorted.sort_by(|a, b| {
        weight(b)
            .partial_cmp(&weight(a))
            .unwrap_or(Ordering::Equal)
    });
    sorted
}

fn assign_round_robin(
    major_id: u32,
    width: usize,
    stats: &FragmentStats,
    active: &[NodeEndpoint],
    max_width_per_node: usize,
) -> Result<Vec<NodeEndpoint>> {
    let order = sorted_by_affinity(active, stats);
    let n = order.len();
    let mut counts = vec![0usize; n];
    let mut out = Vec::with_capacity(width);
    let mut cursor = 0usize;

    for _minor in 0..width {
        let mut scanned = 0;
        while counts[cursor % n] >= max_width_per_node {
            cursor += 1;
            scanned += 1;
            if scanned > n {
                // The width clamp keeps this feasible.
                return Err(PlannerError::WidthUnsatisfiable {
                    major_id,
                    detail: "per-node capacity exhausted during assignment".to_string(),
                });
            }
        }
        counts[cursor % n] += 1;
        out.push(order[cursor % n].clone());
        cursor += 1;
    }
    Ok(out)
}

fn assign_balanced(
    major_id: u32,
    width: usize,
    stats: &FragmentStats,
    active: &[NodeEndpoint],
    options: &ParallelizeOptions,
) -> Result<Vec<NodeEndpoint>> {
    let order = sorted_by_affinity(active, stats);
    let n = order.len();

    let weights: Vec<f64> = order
        .iter()
        .map(|ep| {
            stats
                .affinity
                .iter()
                .find(|(a, _)| a == ep)
                .map(|(_, w)| *w)
                .unwrap_or(0.0)
        })
        .collect();
    let total: f64 = weights.iter().sum();
    let uniform = 1.0 / n as f64;

    // Blend the affinity share with a uniform spread.
    let raw: Vec<f64> = weights
        .iter()
        .map(|w| {
            let share = if total > 0.0 { w / total } else { uniform };
            width as f64
                * (options.affinity_factor * share + (1.0 - options.affinity_factor) * uniform)
        })
        .collect();
    let mut targets: Vec<usize> = raw.iter().map(|r| r.round() as usize).collect();

    repair_rounding(&mut targets, &raw, width);

    // Level out: nobody above ceil(mean * balance_factor), nobody
    // above the per-node ceiling.
    let mean = width as f64 / n as f64;
    let balance_cap = ((mean * options.assignment_creator_balance_factor).ceil() as usize).max(1);
    let cap = balance_cap.min(options.max_width_per_node);
    level_to_cap(&mut targets, cap, major_id)?;

    // Interleave so consecutive minor ids land on different nodes.
    let mut out = Vec::with_capacity(width);
    let mut remaining = targets;
    while out.len() < width {
        let before = out.len();
        for (i, slot) in remaining.iter_mut().enumerate() {
            if *slot > 0 {
                *slot -= 1;
                out.push(order[i].clone());
                if out.len() == width {
                    break;
                }
            }
        }
        if out.len() == before {
            return Err(PlannerError::Internal(format!(
                "balanced assignment for major fragment {} lost target counts",
                major_id
            )));
        }
    }
    Ok(out)
}

/// Nudge rounded targets until they sum to the width: bump the largest
/// fractional remainders up, pull the smallest down.
fn repair_rounding(targets: &mut [usize], raw: &[f64], width: usize) {
    let frac = |i: usize| raw[i] - raw[i].floor();

    let mut sum: usize = targets.iter().sum();
    if sum < width {
        let mut by_frac: Vec<usize> = (0..targets.len()).collect();
        by_frac.sort_by(|&a, &b| frac(b).partial_cmp(&frac(a)).unwrap_or(Ordering::Equal));
        let mut i = 0;
        while sum < width {
            targets[by_frac[i % by_frac.len()]] += 1;
            sum += 1;
            i += 1;
        }
    } else if sum > width {
        let mut by_frac: Vec<usize> = (0..targets.len()).collect();
        by_frac.sort_by(|&a, &b| frac(a).partial_cmp(&frac(b)).unwrap_or(Ordering::Equal));
        let mut i = 0;
        while sum > width {
            let idx = by_frac[i % by_frac.len()];
            if targets[idx] > 0 {
                targets[idx] -= 1;
                sum -= 1;
            }
            i += 1;
        }
    }
}

/// Push excess above the cap onto the least-loaded endpoints.
fn level_to_cap(targets: &mut [usize], cap: usize, major_id: u32) -> Result<()> {
    for i in 0..targets.len() {
        while targets[i] > cap {
            let recipient = targets
                .iter()
                .enumerate()
                .filter(|(j, &t)| *j != i && t < cap)
                .min_by_key(|(_, &t)| t)
                .map(|(j, _)| j);
            match recipient {
                Some(j) => {
                    targets[i] -= 1;
                    targets[j] += 1;
                }
                None => {
                    // The width clamp keeps cap * n >= width.
                    return Err(PlannerError::WidthUnsatisfiable {
                        major_id,
                        detail: "per-node capacity exhausted during balancing".to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str) -> NodeEndpoint {
        NodeEndpoint::new(name, 9060)
    }

    fn endpoints(names: &[&str]) -> Vec<NodeEndpoint> {
        names.iter().map(|n| endpoint(n)).collect()
    }

    fn stats_with(affinity: Vec<(NodeEndpoint, f64)>, distribution: DistributionAffinity) -> FragmentStats {
        FragmentStats {
            cost: 0.0,
            min_width: 1,
            max_width: usize::MAX,
            affinity,
            distribution,
        }
    }

    fn options(per_node: usize, use_new: bool) -> ParallelizeOptions {
        ParallelizeOptions {
            max_width_per_node: per_node,
            use_new_assignment_creator: use_new,
            ..ParallelizeOptions::default()
        }
    }

    #[test]
    fn round_robin_without_affinity_keeps_endpoint_order() {
        let active = endpoints(&["e1", "e2"]);
        let stats = stats_with(Vec::new(), DistributionAffinity::None);
        let assigned =
            assign_endpoints(0, 4, &stats, &active, &options(4, false)).unwrap();
        assert_eq!(
            assigned,
            endpoints(&["e1", "e2", "e1", "e2"])
        );
    }

    #[test]
    fn round_robin_prefers_higher_affinity_first() {
        let active = endpoints(&["e1", "e2", "e3"]);
        let stats = stats_with(
            vec![(endpoint("e3"), 5.0), (endpoint("e2"), 1.0)],
            DistributionAffinity::Soft,
        );
        let assigned =
            assign_endpoints(0, 3, &stats, &active, &options(4, false)).unwrap();
        assert_eq!(assigned, endpoints(&["e3", "e2", "e1"]));
    }

    #[test]
    fn round_robin_skips_saturated_endpoints() {
        let active = endpoints(&["e1", "e2"]);
        let stats = stats_with(Vec::new(), DistributionAffinity::None);
        let assigned =
            assign_endpoints(0, 4, &stats, &active, &options(3, false)).unwrap();
        // Fourth minor cycles back to e1; nobody exceeds the cap.
        let on_e1 = assigned.iter().filter(|e| e.host == "e1").count();
        let on_e2 = assigned.iter().filter(|e| e.host == "e2").count();
        assert!(on_e1 <= 3 && on_e2 <= 3);
        assert_eq!(on_e1 + on_e2, 4);
    }

    #[test]
    fn balanced_uniform_when_no_affinity() {
        let active = endpoints(&["e1", "e2", "e3", "e4"]);
        let stats = stats_with(Vec::new(), DistributionAffinity::None);
        let assigned =
            assign_endpoints(0, 8, &stats, &active, &options(4, true)).unwrap();
        for name in ["e1", "e2", "e3", "e4"] {
            assert_eq!(assigned.iter().filter(|e| e.host == name).count(), 2);
        }
    }

    #[test]
    fn balanced_respects_balance_factor_cap() {
        let active = endpoints(&["e1", "e2"]);
        // All affinity on e1 would put everything there; the balance
        // cap levels it.
        let stats = stats_with(vec![(endpoint("e1"), 10.0)], DistributionAffinity::Soft);
        let opts = ParallelizeOptions {
            max_width_per_node: 100,
            use_new_assignment_creator: true,
            affinity_factor: 1.0,
            assignment_creator_balance_factor: 1.5,
            ..ParallelizeOptions::default()
        };
        let assigned = assign_endpoints(0, 8, &stats, &active, &opts).unwrap();
        // mean = 4, cap = ceil(4 * 1.5) = 6.
        let on_e1 = assigned.iter().filter(|e| e.host == "e1").count();
        assert_eq!(assigned.len(), 8);
        assert_eq!(on_e1, 6);
    }

    #[test]
    fn balanced_enforces_node_ceiling() {
        let active = endpoints(&["e1", "e2", "e3", "e4"]);
        let stats = stats_with(Vec::new(), DistributionAffinity::None);
        let assigned =
            assign_endpoints(0, 12, &stats, &active, &options(3, true)).unwrap();
        for name in ["e1", "e2", "e3", "e4"] {
            assert!(assigned.iter().filter(|e| e.host == name).count() <= 3);
        }
    }

    #[test]
    fn hard_affinity_uses_only_eligible_endpoints() {
        let stats = stats_with(vec![(endpoint("e3"), 2.0)], DistributionAffinity::Hard);
        let active = endpoints(&["e1", "e2", "e3", "e4"]);
        let assigned =
            assign_endpoints(0, 1, &stats, &active, &options(4, true)).unwrap();
        assert_eq!(assigned, endpoints(&["e3"]));
    }

    #[test]
    fn both_creators_are_deterministic() {
        let active = endpoints(&["e1", "e2", "e3"]);
        let stats = stats_with(
            vec![(endpoint("e2"), 3.0), (endpoint("e1"), 1.0)],
            DistributionAffinity::Soft,
        );
        for use_new in [false, true] {
            let opts = options(8, use_new);
            let a = assign_endpoints(0, 7, &stats, &active, &opts).unwrap();
            let b = assign_endpoints(0, 7, &stats, &active, &opts).unwrap();
            assert_eq!(a, b);
        }
    }
}
