use std::collections::BTreeSet;

use memplan::overrides::{apply_overrides, validate_overrides, OverrideError};
use memplan::planner::plan_chain;
use memplan::policy::policy_for;
use memplan::{
    AnalysisError, AnalysisInput, Edge, GraphBuilder, MemoryLayoutAnalysis, ModuleGraph, OpConfig,
    OpId, PolicyKind,
};

fn both(size: u64) -> Vec<OpConfig> {
    vec![
        OpConfig::l1_interleaved(size),
        OpConfig::dram_interleaved(size),
    ]
}

fn linear_graph(sizes: &[u64]) -> (ModuleGraph, Vec<OpId>) {
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let mut ids = Vec::new();
    let mut prev: Option<OpId> = None;
    for (i, size) in sizes.iter().enumerate() {
        let operands: Vec<OpId> = prev.into_iter().collect();
        let id = builder
            .add_op(format!("op{i}"), &operands, both(*size))
            .unwrap();
        ids.push(id);
        prev = Some(id);
    }
    (builder.finish(), ids)
}

#[test]
fn unknown_override_edge_fails_the_run() {
    let (graph, ids) = linear_graph(&[40, 40]);
    // Slot 3 does not exist on op1.
    let bogus = Edge::new(ids[0], ids[1], 3);
    let input = AnalysisInput::new(100, PolicyKind::DfSharding).with_overrides([bogus]);

    let err = MemoryLayoutAnalysis::new(&graph, input).run().unwrap_err();
    assert_eq!(
        err,
        AnalysisError::Override(OverrideError::UnknownEdge { edge: bogus })
    );
}

#[test]
fn validate_accepts_real_edges() {
    let (graph, ids) = linear_graph(&[40, 40]);
    let mut overrides = BTreeSet::new();
    overrides.insert(Edge::new(ids[0], ids[1], 0));
    assert!(validate_overrides(&graph, &overrides).is_ok());
}

#[test]
fn override_edge_always_lands_in_the_reconfig_set() {
    // The whole 4-op run would fit the budget on-chip; the forced B->C edge
    // still splits it and must appear in the final reconfig set.
    let (graph, ids) = linear_graph(&[40, 40, 40, 40]);
    let forced = Edge::new(ids[1], ids[2], 0);
    let input = AnalysisInput::new(100, PolicyKind::DfSharding).with_overrides([forced]);

    let result = MemoryLayoutAnalysis::new(&graph, input).run().unwrap();
    assert!(result.reconfig_edges.contains(&forced));
    // The A->B edge stays an ordinary in-chain L1 handoff.
    assert!(!result
        .reconfig_edges
        .contains(&Edge::new(ids[0], ids[1], 0)));
    // Linear order is untouched by the split.
    assert_eq!(result.schedule[&memplan::FuncId(0)], ids);
}

#[test]
fn resolver_splits_a_segment_that_contains_the_edge() {
    // Drive the planner directly so the chain builder never sees the
    // override; the resolver must split the resolved segment itself.
    let (graph, ids) = linear_graph(&[40, 40, 40, 40]);
    let policy = policy_for(PolicyKind::DfSharding);
    let outcome = plan_chain(&graph, &ids, 100, &*policy).unwrap();
    assert_eq!(outcome.segments.len(), 1);

    let mut overrides = BTreeSet::new();
    overrides.insert(Edge::new(ids[1], ids[2], 0));
    let mut outcomes = vec![outcome];
    let splits = apply_overrides(&graph, &mut outcomes, &overrides, 100, &*policy).unwrap();

    assert_eq!(splits, 1);
    let segs: Vec<&[OpId]> = outcomes[0].segments.iter().map(|s| s.ops()).collect();
    assert_eq!(segs, vec![&ids[..2], &ids[2..]]);
    assert!(outcomes[0].spilled.is_empty());
    assert_eq!(outcomes[0].chosen.len(), 4);
}

#[test]
fn override_on_a_chain_boundary_is_a_no_op_split() {
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let a = builder.add_op("a", &[], both(40)).unwrap();
    let b = builder
        .add_op("b", &[a], vec![OpConfig::dram_interleaved(40)])
        .unwrap();
    let graph = builder.finish();

    let forced = Edge::new(a, b, 0);
    let input = AnalysisInput::new(100, PolicyKind::DfSharding).with_overrides([forced]);
    let result = MemoryLayoutAnalysis::new(&graph, input).run().unwrap();

    assert_eq!(result.stats.override_splits, 0);
    assert!(result.reconfig_edges.contains(&forced));
}
