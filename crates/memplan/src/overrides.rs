//! User-forced reconfiguration edges.
//!
//! Overrides win over policy computation: every override edge lands in the
//! final reconfig set unconditionally, and a resolved chain that still holds
//! an override edge internally is split at the edge and both halves re-planned
//! from scratch. The chain builder already breaks at override edges, so for
//! pipeline-produced chains the split here is a no-op safety net.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::graph::{Edge, ModuleGraph};
use crate::planner::{plan_chain, PlanOutcome, PlannerError};
use crate::policy::ResidencyPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    /// The requested edge does not exist in the graph; upstream handed the
    /// analysis a stale or mistyped override.
    #[error("override edge {edge} does not exist in the graph")]
    UnknownEdge { edge: Edge },
}

/// Checks that every override edge names a real producer→consumer relation.
pub fn validate_overrides(
    graph: &ModuleGraph,
    overrides: &BTreeSet<Edge>,
) -> Result<(), OverrideError> {
    for edge in overrides {
        if !graph.contains_edge(edge) {
            return Err(OverrideError::UnknownEdge { edge: *edge });
        }
    }
    Ok(())
}

/// Splits any resolved segment that contains an override edge internally and
/// re-plans both halves. Returns the number of splits performed.
pub fn apply_overrides(
    graph: &ModuleGraph,
    outcomes: &mut [PlanOutcome],
    overrides: &BTreeSet<Edge>,
    budget_bytes: u64,
    policy: &dyn ResidencyPolicy,
) -> Result<u32, PlannerError> {
    let mut splits = 0u32;
    for edge in overrides {
        'search: for outcome in outcomes.iter_mut() {
            for seg_idx in 0..outcome.segments.len() {
                let segment = &outcome.segments[seg_idx];
                if !segment.contains(edge.producer) || !segment.contains(edge.consumer) {
                    continue;
                }
                let ops = segment.ops().to_vec();
                let Some(cut) = ops.iter().position(|op| *op == edge.consumer) else {
                    continue;
                };
                for op in &ops {
                    outcome.chosen.remove(op);
                    outcome.spilled.remove(op);
                }
                let left = plan_chain(graph, &ops[..cut], budget_bytes, policy)?;
                let right = plan_chain(graph, &ops[cut..], budget_bytes, policy)?;
                outcome.segments.splice(
                    seg_idx..=seg_idx,
                    left.segments.into_iter().chain(right.segments),
                );
                outcome.chosen.extend(left.chosen);
                outcome.chosen.extend(right.chosen);
                outcome.spilled.extend(left.spilled);
                outcome.spilled.extend(right.spilled);
                outcome.evictions += left.evictions + right.evictions;
                splits += 1;
                break 'search;
            }
        }
    }
    Ok(splits)
}
