//! Read-only dataflow graph model.
//!
//! Operations are stored in program order, which is required (and validated)
//! to be a topological order of the def-use edges. The analysis borrows the
//! graph immutably and indexes operations by [`OpId`]; result structures never
//! alias back into the graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::config::{MemoryTier, OpConfig};

/// Stable identifier of an operation: its position in the module's op table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Identifier of a function within the module.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FuncId(pub u32);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Directed producer→consumer relation, identified by the consumer's input
/// slot so multi-edges between the same pair of ops stay distinct.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Edge {
    pub producer: OpId,
    pub consumer: OpId,
    pub input_slot: u32,
}

impl Edge {
    pub fn new(producer: OpId, consumer: OpId, input_slot: u32) -> Self {
        Self {
            producer,
            consumer,
            input_slot,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (slot {})",
            self.producer, self.consumer, self.input_slot
        )
    }
}

/// One operation node: ordered input operands, one output, and the legal
/// output configs supplied by the upstream legality pass.
#[derive(Debug, Clone)]
pub struct OpNode {
    pub id: OpId,
    pub func: FuncId,
    pub name: String,
    pub operands: SmallVec<[OpId; 2]>,
    pub legal_configs: Vec<OpConfig>,
}

impl OpNode {
    /// Returns `true` when at least one legal config keeps the output in L1.
    pub fn has_l1_config(&self) -> bool {
        self.legal_configs.iter().any(OpConfig::is_l1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("operation {op} (`{name}`) has an empty legal-config set")]
    EmptyLegalConfigs { op: OpId, name: String },
    #[error("operand {operand} of operation {op} is not defined before use")]
    UndefinedOperand { op: OpId, operand: OpId },
    #[error("operand {operand} of operation {op} belongs to a different function")]
    CrossFunctionOperand { op: OpId, operand: OpId },
    #[error("operation {op} declares a sharded layout in DRAM")]
    ShardedDramConfig { op: OpId },
    #[error("operation added before any function was opened")]
    NoOpenFunction,
}

#[derive(Debug, Clone)]
struct FuncEntry {
    name: String,
    start: u32,
    end: u32,
}

/// Immutable module graph: every function's operations in program order plus
/// a users index built once at construction.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    ops: Vec<OpNode>,
    funcs: Vec<FuncEntry>,
    users: Vec<SmallVec<[OpId; 4]>>,
}

impl ModuleGraph {
    pub fn node(&self, op: OpId) -> &OpNode {
        &self.ops[op.0 as usize]
    }

    /// Consumers of `op`'s output, in program order.
    pub fn users_of(&self, op: OpId) -> &[OpId] {
        &self.users[op.0 as usize]
    }

    pub fn legal_configs(&self, op: OpId) -> &[OpConfig] {
        &self.node(op).legal_configs
    }

    /// Position of `op` in the module-wide topological enumeration.
    pub fn topo_position(&self, op: OpId) -> usize {
        op.0 as usize
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    pub fn func_count(&self) -> usize {
        self.funcs.len()
    }

    pub fn funcs(&self) -> impl Iterator<Item = FuncId> {
        (0..self.funcs.len() as u32).map(FuncId)
    }

    pub fn func_name(&self, func: FuncId) -> &str {
        &self.funcs[func.0 as usize].name
    }

    /// Operations of `func` in program (topological) order.
    pub fn ops_in(&self, func: FuncId) -> &[OpNode] {
        let entry = &self.funcs[func.0 as usize];
        &self.ops[entry.start as usize..entry.end as usize]
    }

    /// Returns `true` when the edge exists in the graph, i.e. the consumer's
    /// input slot actually reads the named producer.
    pub fn contains_edge(&self, edge: &Edge) -> bool {
        if edge.consumer.0 as usize >= self.ops.len() {
            return false;
        }
        self.node(edge.consumer)
            .operands
            .get(edge.input_slot as usize)
            .is_some_and(|p| *p == edge.producer)
    }

    /// All def-use edges of the module, in consumer program order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.ops.iter().flat_map(|node| {
            node.operands
                .iter()
                .enumerate()
                .map(move |(slot, producer)| Edge::new(*producer, node.id, slot as u32))
        })
    }
}

/// Builds a [`ModuleGraph`], validating the analysis contract op by op:
/// program order must be topological, every operand must be function-local,
/// and every operation must carry a non-empty, tier-consistent legal set.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    ops: Vec<OpNode>,
    funcs: Vec<FuncEntry>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new function; subsequent `add_op` calls land in it.
    pub fn begin_func(&mut self, name: impl Into<String>) -> FuncId {
        self.close_open_func();
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(FuncEntry {
            name: name.into(),
            start: self.ops.len() as u32,
            end: u32::MAX,
        });
        id
    }

    pub fn add_op(
        &mut self,
        name: impl Into<String>,
        operands: &[OpId],
        legal_configs: Vec<OpConfig>,
    ) -> Result<OpId, GraphError> {
        let Some(entry) = self.funcs.last() else {
            return Err(GraphError::NoOpenFunction);
        };
        debug_assert_eq!(entry.end, u32::MAX, "function already closed");
        let id = OpId(self.ops.len() as u32);
        let func = FuncId(self.funcs.len() as u32 - 1);
        let name = name.into();

        if legal_configs.is_empty() {
            return Err(GraphError::EmptyLegalConfigs { op: id, name });
        }
        if legal_configs
            .iter()
            .any(|cfg| cfg.tier == MemoryTier::Dram && cfg.mem_layout.is_sharded())
        {
            return Err(GraphError::ShardedDramConfig { op: id });
        }
        for operand in operands {
            if operand.0 >= id.0 {
                return Err(GraphError::UndefinedOperand {
                    op: id,
                    operand: *operand,
                });
            }
            if operand.0 < entry.start {
                return Err(GraphError::CrossFunctionOperand {
                    op: id,
                    operand: *operand,
                });
            }
        }

        self.ops.push(OpNode {
            id,
            func,
            name,
            operands: SmallVec::from_slice(operands),
            legal_configs,
        });
        Ok(id)
    }

    pub fn finish(mut self) -> ModuleGraph {
        self.close_open_func();
        let mut users: Vec<SmallVec<[OpId; 4]>> = vec![SmallVec::new(); self.ops.len()];
        for node in &self.ops {
            for operand in &node.operands {
                users[operand.0 as usize].push(node.id);
            }
        }
        ModuleGraph {
            ops: self.ops,
            funcs: self.funcs,
            users,
        }
    }

    fn close_open_func(&mut self) {
        let next_start = self.ops.len() as u32;
        if let Some(entry) = self.funcs.last_mut() {
            if entry.end == u32::MAX {
                entry.end = next_start;
            }
        }
    }
}
