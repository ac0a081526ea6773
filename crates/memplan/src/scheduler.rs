//! Top-level orchestrator.
//!
//! Drives the analysis through its one-way phases
//! (`Uninitialized → ChainsBuilt → ConfigsAssigned → OverridesApplied →
//! ScheduleEmitted`), running independent functions in parallel and merging
//! their results deterministically by function id. Out-of-order phase
//! invocation is a contract violation and fails the run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::{build_chains, L1ChainConfig};
use crate::config::{layouts_compatible, MemoryTier, OpConfig, PolicyKind};
use crate::env;
use crate::graph::{Edge, FuncId, ModuleGraph, OpId};
use crate::overrides::{self, OverrideError};
use crate::planner::{plan_chain, PlanOutcome, PlannerError};
use crate::policy::policy_for;

/// Everything the analysis consumes besides the graph itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisInput {
    /// Bytes of L1 usable for concurrent output allocations, fixed for the
    /// whole run.
    pub budget_bytes: u64,
    pub policy: PolicyKind,
    /// Edges the user forces into the reconfig set regardless of policy.
    pub override_reconfig_edges: BTreeSet<Edge>,
}

impl AnalysisInput {
    pub fn new(budget_bytes: u64, policy: PolicyKind) -> Self {
        Self {
            budget_bytes,
            policy,
            override_reconfig_edges: BTreeSet::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = Edge>) -> Self {
        self.override_reconfig_edges.extend(overrides);
        self
    }
}

/// Run counters, printed to stderr when `MEMPLAN_ANALYSIS_STATS` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub candidate_chains: u32,
    pub resolved_segments: u32,
    pub evictions: u32,
    pub override_splits: u32,
    pub spilled_ops: u32,
    pub reconfig_edges: u32,
    pub scheduled_ops: u32,
}

impl fmt::Display for AnalysisStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chains={} segments={} evictions={} override_splits={} spills={} reconfigs={} ops={}",
            self.candidate_chains,
            self.resolved_segments,
            self.evictions,
            self.override_splits,
            self.spilled_ops,
            self.reconfig_edges,
            self.scheduled_ops
        )
    }
}

/// Output artifacts of one analysis run, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Final chosen config per operation; feeds code lowering.
    pub chosen_configs: BTreeMap<OpId, OpConfig>,
    /// Edges that must have a tier/layout-conversion op materialized.
    pub reconfig_edges: BTreeSet<Edge>,
    /// Operations whose output was forced off-chip.
    pub spilled_ops: BTreeSet<OpId>,
    /// Final linear execution order per function.
    pub schedule: BTreeMap<FuncId, Vec<OpId>>,
    pub stats: AnalysisStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Override(#[from] OverrideError),
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error("analysis phase `{phase}` invoked in state `{state}`")]
    InvalidTransition {
        phase: &'static str,
        state: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisState {
    Uninitialized,
    ChainsBuilt,
    ConfigsAssigned,
    OverridesApplied,
    ScheduleEmitted,
}

impl AnalysisState {
    fn name(self) -> &'static str {
        match self {
            AnalysisState::Uninitialized => "uninitialized",
            AnalysisState::ChainsBuilt => "chains-built",
            AnalysisState::ConfigsAssigned => "configs-assigned",
            AnalysisState::OverridesApplied => "overrides-applied",
            AnalysisState::ScheduleEmitted => "schedule-emitted",
        }
    }
}

/// Memory-residency analysis over one module graph.
pub struct MemoryLayoutAnalysis<'g> {
    graph: &'g ModuleGraph,
    input: AnalysisInput,
    state: AnalysisState,
    candidates: Vec<(FuncId, Vec<L1ChainConfig>)>,
    outcomes: Vec<(FuncId, Vec<PlanOutcome>)>,
    override_splits: u32,
}

impl<'g> MemoryLayoutAnalysis<'g> {
    pub fn new(graph: &'g ModuleGraph, input: AnalysisInput) -> Self {
        Self {
            graph,
            input,
            state: AnalysisState::Uninitialized,
            candidates: Vec::new(),
            outcomes: Vec::new(),
            override_splits: 0,
        }
    }

    /// Runs all phases in order and emits the final result.
    pub fn run(mut self) -> Result<AnalysisResult, AnalysisError> {
        self.build_chains()?;
        self.assign_configs()?;
        self.apply_overrides()?;
        self.emit_schedule()
    }

    /// Phase 1: partition every function into candidate chains.
    pub fn build_chains(&mut self) -> Result<(), AnalysisError> {
        self.advance("build_chains", AnalysisState::Uninitialized)?;
        overrides::validate_overrides(self.graph, &self.input.override_reconfig_edges)?;

        let funcs: Vec<FuncId> = self.graph.funcs().collect();
        self.candidates = funcs
            .par_iter()
            .map(|func| {
                let chains = build_chains(
                    self.graph,
                    self.graph.ops_in(*func),
                    &self.input.override_reconfig_edges,
                );
                (*func, chains)
            })
            .collect();
        self.state = AnalysisState::ChainsBuilt;
        Ok(())
    }

    /// Phase 2: run the capacity planner over every candidate chain.
    pub fn assign_configs(&mut self) -> Result<(), AnalysisError> {
        self.advance("assign_configs", AnalysisState::ChainsBuilt)?;
        let policy = policy_for(self.input.policy);
        let budget = self.input.budget_bytes;

        self.outcomes = self
            .candidates
            .par_iter()
            .map(|(func, chains)| -> Result<_, AnalysisError> {
                let planned = chains
                    .iter()
                    .map(|chain| plan_chain(self.graph, chain.ops(), budget, &*policy))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((*func, planned))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.state = AnalysisState::ConfigsAssigned;
        Ok(())
    }

    /// Phase 3: merge user-forced reconfiguration edges.
    pub fn apply_overrides(&mut self) -> Result<(), AnalysisError> {
        self.advance("apply_overrides", AnalysisState::ConfigsAssigned)?;
        let policy = policy_for(self.input.policy);
        for (_, outcomes) in self.outcomes.iter_mut() {
            self.override_splits += overrides::apply_overrides(
                self.graph,
                outcomes,
                &self.input.override_reconfig_edges,
                self.input.budget_bytes,
                &*policy,
            )?;
        }
        self.state = AnalysisState::OverridesApplied;
        Ok(())
    }

    /// Phase 4 (terminal): linearize chains and assemble the result.
    pub fn emit_schedule(&mut self) -> Result<AnalysisResult, AnalysisError> {
        self.advance("emit_schedule", AnalysisState::OverridesApplied)?;
        let graph = self.graph;

        let mut chosen_configs = BTreeMap::new();
        let mut spilled_ops = BTreeSet::new();
        let mut chain_of: HashMap<OpId, usize> = HashMap::new();
        let mut schedule = BTreeMap::new();
        let mut stats = AnalysisStats {
            candidate_chains: self
                .candidates
                .iter()
                .map(|(_, chains)| chains.len() as u32)
                .sum(),
            override_splits: self.override_splits,
            ..AnalysisStats::default()
        };

        let mut ordinal = 0usize;
        for (func, outcomes) in self.outcomes.iter_mut() {
            let mut segments: Vec<&mut L1ChainConfig> = outcomes
                .iter_mut()
                .flat_map(|outcome| outcome.segments.iter_mut())
                .collect();
            segments.sort_by_key(|segment| {
                segment
                    .first_op()
                    .map(|op| graph.topo_position(op))
                    .unwrap_or(usize::MAX)
            });

            let mut order = Vec::new();
            for segment in segments {
                segment.complete();
                for op in segment.ops() {
                    chain_of.insert(*op, ordinal);
                    order.push(*op);
                }
                ordinal += 1;
                stats.resolved_segments += 1;
            }
            stats.scheduled_ops += order.len() as u32;
            schedule.insert(*func, order);

            for outcome in outcomes.iter() {
                for (op, idx) in &outcome.chosen {
                    chosen_configs.insert(*op, graph.legal_configs(*op)[*idx]);
                }
                spilled_ops.extend(outcome.spilled.iter().copied());
                stats.evictions += outcome.evictions;
            }
        }

        let mut reconfig_edges = self.input.override_reconfig_edges.clone();
        for edge in graph.edges() {
            let producer_cfg = &chosen_configs[&edge.producer];
            let consumer_cfg = &chosen_configs[&edge.consumer];
            let same_chain = chain_of.get(&edge.producer) == chain_of.get(&edge.consumer);
            if needs_reconfig(same_chain, producer_cfg, consumer_cfg) {
                reconfig_edges.insert(edge);
            }
        }

        stats.spilled_ops = spilled_ops.len() as u32;
        stats.reconfig_edges = reconfig_edges.len() as u32;
        if env::analysis_stats_enabled() {
            eprintln!("memplan analysis: {stats}");
        }

        self.state = AnalysisState::ScheduleEmitted;
        Ok(AnalysisResult {
            chosen_configs,
            reconfig_edges,
            spilled_ops,
            schedule,
            stats,
        })
    }

    fn advance(
        &self,
        phase: &'static str,
        expected: AnalysisState,
    ) -> Result<(), AnalysisError> {
        if self.state != expected {
            return Err(AnalysisError::InvalidTransition {
                phase,
                state: self.state.name(),
            });
        }
        Ok(())
    }
}

/// Decides whether an edge needs a materialized tier/layout conversion given
/// both endpoints' final configs.
///
/// L1 residency is only shared within a chain: an L1 output consumed outside
/// its chain must be converted out, and an in-chain L1 handoff still reshards
/// when the chosen layouts disagree. A DRAM output is read directly unless
/// the consumer chose a sharded placement, which requires staging the operand
/// on-chip in the matching shard grid.
fn needs_reconfig(same_chain: bool, producer: &OpConfig, consumer: &OpConfig) -> bool {
    match (producer.tier, consumer.tier) {
        (MemoryTier::L1, MemoryTier::L1) => {
            if same_chain {
                !layouts_compatible(producer.mem_layout, consumer.mem_layout)
            } else {
                true
            }
        }
        (MemoryTier::L1, MemoryTier::Dram) => !same_chain,
        (MemoryTier::Dram, MemoryTier::L1) => consumer.mem_layout.is_sharded(),
        (MemoryTier::Dram, MemoryTier::Dram) => false,
    }
}
