//! Output-configuration vocabulary shared by every analysis stage.
//!
//! An [`OpConfig`] is one admissible (tier, layout) choice for an operation's
//! output, together with its byte footprint. Legal-config sets are computed by
//! an upstream legality pass and consumed here as immutable input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory tier an operation's output can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryTier {
    /// Small, fast, capacity-limited on-chip memory.
    L1,
    /// Large off-chip memory, always available, reachable via explicit transfer.
    Dram,
}

impl MemoryTier {
    /// Returns `true` when the tier is the capacity-limited on-chip tier.
    pub fn is_on_chip(self) -> bool {
        matches!(self, MemoryTier::L1)
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTier::L1 => write!(f, "l1"),
            MemoryTier::Dram => write!(f, "dram"),
        }
    }
}

/// Page layout of an operation's output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TensorMemoryLayout {
    Interleaved,
    HeightSharded,
    WidthSharded,
    BlockSharded,
}

impl TensorMemoryLayout {
    /// Returns `true` for any sharded layout. Sharded layouts are only
    /// meaningful in L1.
    pub fn is_sharded(self) -> bool {
        !matches!(self, TensorMemoryLayout::Interleaved)
    }
}

impl fmt::Display for TensorMemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TensorMemoryLayout::Interleaved => "interleaved",
            TensorMemoryLayout::HeightSharded => "height_sharded",
            TensorMemoryLayout::WidthSharded => "width_sharded",
            TensorMemoryLayout::BlockSharded => "block_sharded",
        };
        write!(f, "{s}")
    }
}

/// Returns `true` when a consumer can read the producer's output without an
/// inserted layout conversion. Interleaved pages are readable by any consumer
/// layout; sharded pages require the exact same sharding.
pub fn layouts_compatible(producer: TensorMemoryLayout, consumer: TensorMemoryLayout) -> bool {
    producer == TensorMemoryLayout::Interleaved || producer == consumer
}

/// One legal (tier, layout) choice for an operation's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpConfig {
    pub tier: MemoryTier,
    pub mem_layout: TensorMemoryLayout,
    /// Output footprint in bytes, as computed from shape/dtype/layout by the
    /// upstream legality pass.
    pub size_bytes: u64,
}

impl OpConfig {
    pub fn l1_interleaved(size_bytes: u64) -> Self {
        Self {
            tier: MemoryTier::L1,
            mem_layout: TensorMemoryLayout::Interleaved,
            size_bytes,
        }
    }

    pub fn l1_sharded(mem_layout: TensorMemoryLayout, size_bytes: u64) -> Self {
        Self {
            tier: MemoryTier::L1,
            mem_layout,
            size_bytes,
        }
    }

    pub fn dram_interleaved(size_bytes: u64) -> Self {
        Self {
            tier: MemoryTier::Dram,
            mem_layout: TensorMemoryLayout::Interleaved,
            size_bytes,
        }
    }

    /// Returns `true` when the config keeps the output on-chip.
    pub fn is_l1(&self) -> bool {
        self.tier.is_on_chip()
    }
}

impl fmt::Display for OpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}B", self.tier, self.mem_layout, self.size_bytes)
    }
}

/// Selects the residency policy driving chain construction and capacity
/// planning. Exactly one selector is active per analysis run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
pub enum PolicyKind {
    /// Depth-first sharding heuristic: prefers sharded L1 configs.
    #[default]
    DfSharding,
    /// Greedy heuristic that favors interleaved L1 placement.
    GreedyInterleaved,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::DfSharding => write!(f, "df-sharding"),
            PolicyKind::GreedyInterleaved => write!(f, "greedy-interleaved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown residency policy `{0}`, expected `df-sharding` or `greedy-interleaved`")]
pub struct ParsePolicyError(String);

impl FromStr for PolicyKind {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "df-sharding" => Ok(PolicyKind::DfSharding),
            "greedy-interleaved" => Ok(PolicyKind::GreedyInterleaved),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}
