use crate::config::{MemoryTier, OpConfig};
use crate::graph::OpNode;

use super::ResidencyPolicy;

/// Depth-first sharding heuristic: keep outputs sharded in L1 whenever a
/// sharded config exists, preferring tighter footprints, then interleaved L1,
/// then DRAM as the last resort.
#[derive(Debug, Default, Clone, Copy)]
pub struct DfShardingPolicy;

impl ResidencyPolicy for DfShardingPolicy {
    fn name(&self) -> &'static str {
        "df-sharding"
    }

    fn rank(&self, _node: &OpNode, configs: &[OpConfig]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..configs.len()).collect();
        order.sort_by_key(|&idx| {
            let cfg = &configs[idx];
            let tier_rank = match cfg.tier {
                MemoryTier::L1 => 0,
                MemoryTier::Dram => 1,
            };
            let layout_rank = if cfg.mem_layout.is_sharded() { 0 } else { 1 };
            (tier_rank, layout_rank, self.cost(cfg), idx)
        });
        order
    }

    fn cost(&self, config: &OpConfig) -> i64 {
        config.size_bytes as i64
    }
}
