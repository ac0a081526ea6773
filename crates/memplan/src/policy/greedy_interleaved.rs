use crate::config::{MemoryTier, OpConfig};
use crate::graph::OpNode;

use super::ResidencyPolicy;

/// Penalty charged on sharded placements so interleaved L1 wins ties: a
/// sharded output constrains every consumer to the same shard grid, which
/// tends to force reshards downstream.
const SHARD_PENALTY: i64 = 1 << 20;

/// Greedy interleaved heuristic: favors interleaved L1 placements, taking a
/// sharded config only when it is strictly cheaper even after the reshard
/// penalty.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyInterleavedPolicy;

impl ResidencyPolicy for GreedyInterleavedPolicy {
    fn name(&self) -> &'static str {
        "greedy-interleaved"
    }

    fn rank(&self, _node: &OpNode, configs: &[OpConfig]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..configs.len()).collect();
        order.sort_by_key(|&idx| {
            let cfg = &configs[idx];
            let tier_rank = match cfg.tier {
                MemoryTier::L1 => 0,
                MemoryTier::Dram => 1,
            };
            (tier_rank, self.cost(cfg), idx)
        });
        order
    }

    fn cost(&self, config: &OpConfig) -> i64 {
        let base = config.size_bytes as i64;
        if config.mem_layout.is_sharded() {
            base + SHARD_PENALTY
        } else {
            base
        }
    }
}
