//! Compile-time memory-residency scheduler for accelerators with a small
//! fast on-chip tier (L1) and a large off-chip tier (DRAM).
//!
//! Given a dataflow graph whose operations each carry a set of legal output
//! configs, a fixed L1 byte budget, a policy selector, and optional
//! user-forced reconfiguration edges, the analysis decides which config every
//! operation uses, which runs of operations keep their outputs on-chip
//! end-to-end, which edges need a materialized tier/layout conversion, which
//! outputs spill to DRAM, and the final linear schedule per function.
//!
//! ```
//! use memplan::{
//!     AnalysisInput, GraphBuilder, MemoryLayoutAnalysis, OpConfig, PolicyKind,
//! };
//!
//! let mut builder = GraphBuilder::new();
//! builder.begin_func("main");
//! let a = builder
//!     .add_op("a", &[], vec![OpConfig::l1_interleaved(40), OpConfig::dram_interleaved(40)])
//!     .unwrap();
//! let _b = builder
//!     .add_op("b", &[a], vec![OpConfig::l1_interleaved(40), OpConfig::dram_interleaved(40)])
//!     .unwrap();
//! let graph = builder.finish();
//!
//! let input = AnalysisInput::new(100, PolicyKind::DfSharding);
//! let result = MemoryLayoutAnalysis::new(&graph, input).run().unwrap();
//! assert!(result.spilled_ops.is_empty());
//! ```

pub mod chain;
pub mod config;
mod env;
pub mod graph;
pub mod overrides;
pub mod planner;
pub mod policy;
pub mod scheduler;

pub use config::{
    layouts_compatible, MemoryTier, OpConfig, ParsePolicyError, PolicyKind, TensorMemoryLayout,
};
pub use graph::{Edge, FuncId, GraphBuilder, GraphError, ModuleGraph, OpId, OpNode};
pub use scheduler::{
    AnalysisError, AnalysisInput, AnalysisResult, AnalysisStats, MemoryLayoutAnalysis,
};
