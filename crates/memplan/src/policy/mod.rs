//! Pluggable residency policies.
//!
//! A policy only steers preference order and tie-breaks; legality (budget,
//! legal-config membership) is enforced by the capacity planner regardless of
//! the active policy.

mod df_sharding;
mod greedy_interleaved;

pub use df_sharding::DfShardingPolicy;
pub use greedy_interleaved::GreedyInterleavedPolicy;

use crate::config::{OpConfig, PolicyKind};
use crate::graph::OpNode;

/// Ordering heuristic and cost model driving the capacity planner.
pub trait ResidencyPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the indices of `configs` in preference order, most preferred
    /// first. Must be a permutation of `0..configs.len()`.
    fn rank(&self, node: &OpNode, configs: &[OpConfig]) -> Vec<usize>;

    /// Scalar cost of placing `config`; lower is better.
    fn cost(&self, config: &OpConfig) -> i64;
}

/// Instantiates the policy variant named by the selector.
pub fn policy_for(kind: PolicyKind) -> Box<dyn ResidencyPolicy> {
    match kind {
        PolicyKind::DfSharding => Box::new(DfShardingPolicy),
        PolicyKind::GreedyInterleaved => Box::new(GreedyInterleavedPolicy),
    }
}
