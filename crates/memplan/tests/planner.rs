use memplan::chain::ChainState;
use memplan::planner::{peak_l1_usage, plan_chain, PlannerError};
use memplan::policy::policy_for;
use memplan::{GraphBuilder, MemoryTier, ModuleGraph, OpConfig, OpId, PolicyKind};

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
fn four_op_chain_fits_hundred_byte_budget() {
    // A->B->C->D at 40 bytes each: at any step only the incoming value and
    // the new output are live, so the peak is 80 and everything stays in L1.
    let (graph, ids) = linear_graph(&[40, 40, 40, 40]);
    let policy = policy_for(PolicyKind::DfSharding);
    let outcome = plan_chain(&graph, &ids, 100, &*policy).unwrap();

    assert!(outcome.spilled.is_empty());
    assert_eq!(outcome.evictions, 0);
    assert_eq!(outcome.segments.len(), 1);
    assert_eq!(outcome.segments[0].state(), ChainState::Resolved);
    let peak = peak_l1_usage(&graph, &ids, &outcome.chosen);
    assert_eq!(peak, 80);
}

#[test]
fn oversized_tail_spills_and_splits_the_chain() {
    // D's 70 bytes on top of live C (40) exceeds 100, and C is an operand of
    // D so it cannot be evicted: D itself spills and becomes a chain
    // boundary.
    let (graph, ids) = linear_graph(&[40, 40, 40, 70]);
    let policy = policy_for(PolicyKind::DfSharding);
    let outcome = plan_chain(&graph, &ids, 100, &*policy).unwrap();

    assert_eq!(outcome.spilled.iter().copied().collect::<Vec<_>>(), vec![ids[3]]);
    assert_eq!(outcome.segments.len(), 2);
    assert_eq!(outcome.segments[0].ops(), &ids[..3]);
    assert_eq!(outcome.segments[1].ops(), &ids[3..]);
    assert_eq!(outcome.segments[1].state(), ChainState::Failed);

    let chosen_d = graph.legal_configs(ids[3])[outcome.chosen[&ids[3]]];
    assert_eq!(chosen_d.tier, MemoryTier::Dram);
    assert!(peak_l1_usage(&graph, &ids, &outcome.chosen) <= 100);
}

#[test]
fn long_lived_value_is_evicted_before_the_new_op_spills() {
    // A feeds both B and D, so A stays live while C executes. Placing C would
    // hit 120 bytes; A is not an operand of C and is evicted to DRAM, after
    // which the rest of the chain fits.
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let a = builder.add_op("a", &[], both(40)).unwrap();
    let b = builder.add_op("b", &[a], both(40)).unwrap();
    let c = builder.add_op("c", &[b], both(40)).unwrap();
    let d = builder.add_op("d", &[c, a], both(40)).unwrap();
    let graph = builder.finish();
    let ops = [a, b, c, d];

    let policy = policy_for(PolicyKind::DfSharding);
    let outcome = plan_chain(&graph, &ops, 100, &*policy).unwrap();

    assert_eq!(outcome.evictions, 1);
    assert_eq!(outcome.spilled.iter().copied().collect::<Vec<_>>(), vec![a]);
    assert_eq!(outcome.segments.len(), 1);
    for op in [b, c, d] {
        let cfg = graph.legal_configs(op)[outcome.chosen[&op]];
        assert_eq!(cfg.tier, MemoryTier::L1);
    }
    assert!(peak_l1_usage(&graph, &ops, &outcome.chosen) <= 100);
}

#[test]
fn single_oversized_op_becomes_a_failed_segment() {
    let (graph, ids) = linear_graph(&[300]);
    let policy = policy_for(PolicyKind::DfSharding);
    let outcome = plan_chain(&graph, &ids, 100, &*policy).unwrap();

    assert_eq!(outcome.segments.len(), 1);
    assert_eq!(outcome.segments[0].state(), ChainState::Failed);
    assert_eq!(outcome.spilled.iter().copied().collect::<Vec<_>>(), vec![ids[0]]);
}

#[test]
fn huge_footprints_do_not_overflow_accounting() {
    // Footprints near u64::MAX must not wrap the live-set sum; the second op
    // simply fails to fit and spills.
    let budget = u64::MAX - 1;
    let (graph, ids) = linear_graph(&[budget, budget]);
    let policy = policy_for(PolicyKind::DfSharding);
    let outcome = plan_chain(&graph, &ids, budget, &*policy).unwrap();

    assert_eq!(outcome.spilled.iter().copied().collect::<Vec<_>>(), vec![ids[1]]);
    assert_eq!(outcome.segments.len(), 2);
    assert!(peak_l1_usage(&graph, &ids, &outcome.chosen) <= budget);
}

#[test]
fn missing_dram_fallback_is_a_contract_violation() {
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let a = builder
        .add_op("a", &[], vec![OpConfig::l1_interleaved(300)])
        .unwrap();
    let graph = builder.finish();

    let policy = policy_for(PolicyKind::DfSharding);
    let err = plan_chain(&graph, &[a], 100, &*policy).unwrap_err();
    assert_eq!(err, PlannerError::NoDramFallback { op: a });
}
