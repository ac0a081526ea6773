//! Capacity planner: per-chain config assignment under the L1 byte budget.
//!
//! Liveness is tracked explicitly with full lookahead over the chain (an
//! offline replacement scheme, not a runtime LRU): an allocation is live from
//! the step its producer executes until its last in-chain consumer executes.
//! On overflow the planner evicts the earliest-produced live allocation that
//! is not an operand of the current op, spilling that producer to DRAM.
//! Eviction is always preferred over spilling the current op; only when no
//! evictable allocation remains does the current op spill, splitting the
//! chain at that point.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::chain::{L1ChainConfig, OpL1MemSpec};
use crate::config::MemoryTier;
use crate::graph::{ModuleGraph, OpId};
use crate::policy::ResidencyPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    /// Spilling is always legal by contract, so the legality pass owes every
    /// op at least one DRAM config; a missing fallback is an upstream bug.
    #[error("operation {op} must spill but has no DRAM config in its legal set")]
    NoDramFallback { op: OpId },
}

/// Result of planning one candidate chain. Splits turn a single candidate
/// into several resolved segments; membership is preserved across all of
/// them.
#[derive(Debug, Clone, Default)]
pub struct PlanOutcome {
    pub segments: Vec<L1ChainConfig>,
    /// Chosen config index per op, L1 or DRAM.
    pub chosen: BTreeMap<OpId, usize>,
    pub spilled: BTreeSet<OpId>,
    pub evictions: u32,
}

#[derive(Debug, Clone, Copy)]
struct LiveAlloc {
    pos: usize,
    op: OpId,
    bytes: u64,
    last_use: usize,
}

/// Assigns configs to one candidate chain, spilling and splitting as needed
/// to respect `budget_bytes`.
pub fn plan_chain(
    graph: &ModuleGraph,
    ops: &[OpId],
    budget_bytes: u64,
    policy: &dyn ResidencyPolicy,
) -> Result<PlanOutcome, PlannerError> {
    let pos_of: HashMap<OpId, usize> = ops.iter().enumerate().map(|(i, op)| (*op, i)).collect();
    let last_use: Vec<usize> = ops
        .iter()
        .enumerate()
        .map(|(i, op)| {
            graph
                .users_of(*op)
                .iter()
                .filter_map(|user| pos_of.get(user).copied())
                .max()
                .unwrap_or(i)
        })
        .collect();

    let mut out = PlanOutcome::default();
    let mut live: Vec<LiveAlloc> = Vec::new();
    let mut seg_start = 0usize;

    for (i, &op) in ops.iter().enumerate() {
        live.retain(|alloc| alloc.last_use >= i);
        let node = graph.node(op);
        let ranked = policy.rank(node, &node.legal_configs);
        debug_assert_eq!(ranked.len(), node.legal_configs.len());

        let Some(l1_idx) = ranked
            .iter()
            .copied()
            .find(|&idx| node.legal_configs[idx].is_l1())
        else {
            split_at(graph, ops, &mut out, &mut seg_start, i, policy)?;
            live.clear();
            continue;
        };

        let bytes = node.legal_configs[l1_idx].size_bytes;
        let placed = loop {
            let live_bytes = live
                .iter()
                .fold(0u64, |acc, alloc| acc.saturating_add(alloc.bytes));
            if live_bytes.saturating_add(bytes) <= budget_bytes {
                break true;
            }
            let victim = live
                .iter()
                .enumerate()
                .filter(|(_, alloc)| !node.operands.contains(&alloc.op))
                .min_by_key(|(_, alloc)| alloc.pos)
                .map(|(idx, _)| idx);
            match victim {
                Some(idx) => {
                    let alloc = live.remove(idx);
                    let fallback = dram_fallback(graph, alloc.op, policy)?;
                    out.chosen.insert(alloc.op, fallback);
                    out.spilled.insert(alloc.op);
                    out.evictions += 1;
                }
                None => break false,
            }
        };

        if placed {
            out.chosen.insert(op, l1_idx);
            live.push(LiveAlloc {
                pos: i,
                op,
                bytes,
                last_use: last_use[i],
            });
        } else {
            split_at(graph, ops, &mut out, &mut seg_start, i, policy)?;
            live.clear();
        }
    }

    if seg_start < ops.len() {
        emit_segment(graph, &ops[seg_start..], &mut out);
    }
    Ok(out)
}

/// Closes the open segment before `i`, emits the spilled op as its own
/// (failed) segment, and restarts planning after it.
fn split_at(
    graph: &ModuleGraph,
    ops: &[OpId],
    out: &mut PlanOutcome,
    seg_start: &mut usize,
    i: usize,
    policy: &dyn ResidencyPolicy,
) -> Result<(), PlannerError> {
    let op = ops[i];
    let fallback = dram_fallback(graph, op, policy)?;
    out.chosen.insert(op, fallback);
    out.spilled.insert(op);

    if *seg_start < i {
        emit_segment(graph, &ops[*seg_start..i], out);
    }
    emit_segment(graph, &ops[i..=i], out);
    *seg_start = i + 1;
    Ok(())
}

fn emit_segment(graph: &ModuleGraph, ops: &[OpId], out: &mut PlanOutcome) {
    let specs: Vec<OpL1MemSpec> = ops
        .iter()
        .map(|op| OpL1MemSpec {
            op: *op,
            config_index: out.chosen[op],
        })
        .collect();
    let any_l1 = specs
        .iter()
        .any(|spec| graph.legal_configs(spec.op)[spec.config_index].is_l1());
    let mut segment = L1ChainConfig::from_ops(ops.to_vec());
    segment.resolve(specs, any_l1);
    out.segments.push(segment);
}

/// Cheapest DRAM config of `op` under the active policy.
fn dram_fallback(
    graph: &ModuleGraph,
    op: OpId,
    policy: &dyn ResidencyPolicy,
) -> Result<usize, PlannerError> {
    graph
        .legal_configs(op)
        .iter()
        .enumerate()
        .filter(|(_, cfg)| cfg.tier == MemoryTier::Dram)
        .min_by_key(|(idx, cfg)| (policy.cost(cfg), *idx))
        .map(|(idx, _)| idx)
        .ok_or(PlannerError::NoDramFallback { op })
}

/// Recomputes the peak concurrent L1 footprint of a resolved op run by the
/// same liveness rule the planner uses. Exposed for validation and tests.
pub fn peak_l1_usage(graph: &ModuleGraph, ops: &[OpId], chosen: &BTreeMap<OpId, usize>) -> u64 {
    let pos_of: HashMap<OpId, usize> = ops.iter().enumerate().map(|(i, op)| (*op, i)).collect();
    let mut peak = 0u64;
    let mut live: Vec<(u64, usize)> = Vec::new();
    for (i, &op) in ops.iter().enumerate() {
        live.retain(|(_, last_use)| *last_use >= i);
        let cfg = &graph.legal_configs(op)[chosen[&op]];
        if !cfg.is_l1() {
            continue;
        }
        let last_use = graph
            .users_of(op)
            .iter()
            .filter_map(|user| pos_of.get(user).copied())
            .max()
            .unwrap_or(i);
        live.push((cfg.size_bytes, last_use));
        let total = live
            .iter()
            .fold(0u64, |acc, (bytes, _)| acc.saturating_add(*bytes));
        peak = peak.max(total);
    }
    peak
}
