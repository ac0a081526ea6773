//! Candidate L1 residency chains.
//!
//! A chain is a maximal contiguous run of a function's program order whose
//! operations could plausibly keep their outputs on-chip end-to-end. The
//! builder only judges plausibility (shared on-chip-compatible configs); the
//! capacity planner later decides what actually fits the budget.

use std::collections::BTreeSet;

use crate::config::layouts_compatible;
use crate::graph::{Edge, ModuleGraph, OpId, OpNode};

/// Lifecycle of a chain candidate through the analysis phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Being grown by the chain builder.
    InBuild,
    /// Membership frozen, configs not yet assigned.
    Built,
    /// Per-op configs assigned by the capacity planner.
    Resolved,
    /// Folded into the final result.
    Completed,
    /// Every member spilled; the chain holds no L1 residency.
    Failed,
}

/// Chosen config for one chain member: an index into the op's legal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpL1MemSpec {
    pub op: OpId,
    pub config_index: usize,
}

/// A candidate run of operations considered for shared L1 residency.
#[derive(Debug, Clone)]
pub struct L1ChainConfig {
    state: ChainState,
    ops: Vec<OpId>,
    specs: Vec<OpL1MemSpec>,
}

impl L1ChainConfig {
    pub fn new() -> Self {
        Self {
            state: ChainState::InBuild,
            ops: Vec::new(),
            specs: Vec::new(),
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn ops(&self) -> &[OpId] {
        &self.ops
    }

    pub fn specs(&self) -> &[OpL1MemSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn first_op(&self) -> Option<OpId> {
        self.ops.first().copied()
    }

    pub fn contains(&self, op: OpId) -> bool {
        self.ops.binary_search(&op).is_ok()
    }

    pub fn push(&mut self, op: OpId) {
        debug_assert_eq!(self.state, ChainState::InBuild);
        debug_assert!(self.ops.last().map_or(true, |last| *last < op));
        self.ops.push(op);
    }

    /// Freezes membership: `InBuild -> Built`.
    pub fn build(&mut self) {
        debug_assert_eq!(self.state, ChainState::InBuild);
        debug_assert!(!self.ops.is_empty());
        self.state = ChainState::Built;
    }

    /// Records the planner's config assignment: `Built -> Resolved`, or
    /// `Built -> Failed` when no member kept an L1 placement.
    pub fn resolve(&mut self, specs: Vec<OpL1MemSpec>, any_l1: bool) {
        debug_assert!(matches!(self.state, ChainState::Built | ChainState::InBuild));
        debug_assert_eq!(specs.len(), self.ops.len());
        self.specs = specs;
        self.state = if any_l1 {
            ChainState::Resolved
        } else {
            ChainState::Failed
        };
    }

    /// Marks the chain folded into the final result: `Resolved -> Completed`.
    pub fn complete(&mut self) {
        debug_assert!(matches!(
            self.state,
            ChainState::Resolved | ChainState::Failed
        ));
        if self.state == ChainState::Resolved {
            self.state = ChainState::Completed;
        }
    }

    /// Rebuilds a frozen chain from an op run produced by splitting, keeping
    /// program order.
    pub(crate) fn from_ops(ops: Vec<OpId>) -> Self {
        let mut chain = Self::new();
        for op in ops {
            chain.push(op);
        }
        chain.build();
        chain
    }
}

impl Default for L1ChainConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` when the producer/consumer pair shares at least one
/// on-chip-compatible config pair, i.e. both sides can stay in L1 across the
/// edge without leaving the fast tier.
pub fn joinable(graph: &ModuleGraph, producer: OpId, consumer: OpId) -> bool {
    let p_cfgs = graph.legal_configs(producer);
    let c_cfgs = graph.legal_configs(consumer);
    p_cfgs.iter().filter(|cfg| cfg.is_l1()).any(|p| {
        c_cfgs
            .iter()
            .filter(|cfg| cfg.is_l1())
            .any(|c| layouts_compatible(p.mem_layout, c.mem_layout))
    })
}

/// Partitions one function into maximal candidate chains.
///
/// A forward walk over program order grows one open chain at a time. An op
/// extends the open chain only when it has an L1 config at all, consumes at
/// least one value produced inside the chain, every such in-chain edge is
/// [`joinable`], and no in-chain edge is a user-forced reconfiguration
/// (overrides are hard chain breaks). Anything else closes the chain and
/// starts a fresh one, so singleton chains are the natural fallback.
pub fn build_chains(
    graph: &ModuleGraph,
    ops: &[OpNode],
    overrides: &BTreeSet<Edge>,
) -> Vec<L1ChainConfig> {
    let mut chains: Vec<L1ChainConfig> = Vec::new();
    let mut open: Option<L1ChainConfig> = None;

    for node in ops {
        let extends = open
            .as_ref()
            .is_some_and(|chain| can_extend(graph, chain, node, overrides));
        if extends {
            if let Some(chain) = open.as_mut() {
                chain.push(node.id);
            }
        } else {
            if let Some(mut done) = open.take() {
                done.build();
                chains.push(done);
            }
            let mut chain = L1ChainConfig::new();
            chain.push(node.id);
            open = Some(chain);
        }
    }
    if let Some(mut done) = open.take() {
        done.build();
        chains.push(done);
    }
    chains
}

fn can_extend(
    graph: &ModuleGraph,
    chain: &L1ChainConfig,
    node: &OpNode,
    overrides: &BTreeSet<Edge>,
) -> bool {
    if !node.has_l1_config() {
        return false;
    }
    let mut connected = false;
    for (slot, operand) in node.operands.iter().enumerate() {
        if !chain.contains(*operand) {
            continue;
        }
        if overrides.contains(&Edge::new(*operand, node.id, slot as u32)) {
            return false;
        }
        if !joinable(graph, *operand, node.id) {
            return false;
        }
        connected = true;
    }
    connected
}
