use anyhow::Result;
use memplan::{
    GraphBuilder, GraphError, OpConfig, OpId, TensorMemoryLayout,
};

fn both(size: u64) -> Vec<OpConfig> {
    vec![
        OpConfig::l1_interleaved(size),
        OpConfig::dram_interleaved(size),
    ]
}

#[test]
fn empty_legal_config_set_is_fatal() {
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let err = builder.add_op("bad", &[], Vec::new()).unwrap_err();
    assert!(matches!(err, GraphError::EmptyLegalConfigs { .. }));
}

#[test]
fn sharded_dram_config_is_fatal() {
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let err = builder
        .add_op(
            "bad",
            &[],
            vec![OpConfig {
                tier: memplan::MemoryTier::Dram,
                mem_layout: TensorMemoryLayout::BlockSharded,
                size_bytes: 40,
            }],
        )
        .unwrap_err();
    assert!(matches!(err, GraphError::ShardedDramConfig { .. }));
}

#[test]
fn forward_reference_is_fatal() {
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let err = builder.add_op("bad", &[OpId(5)], both(40)).unwrap_err();
    assert!(matches!(
        err,
        GraphError::UndefinedOperand {
            operand: OpId(5),
            ..
        }
    ));
}

#[test]
fn operand_from_another_function_is_fatal() -> Result<()> {
    let mut builder = GraphBuilder::new();
    builder.begin_func("first");
    let a = builder.add_op("a", &[], both(40))?;
    builder.begin_func("second");
    let err = builder.add_op("b", &[a], both(40)).unwrap_err();
    assert!(matches!(
        err,
        GraphError::CrossFunctionOperand { operand, .. } if operand == a
    ));
    Ok(())
}

#[test]
fn op_outside_any_function_is_fatal() {
    let mut builder = GraphBuilder::new();
    let err = builder.add_op("stray", &[], both(40)).unwrap_err();
    assert!(matches!(err, GraphError::NoOpenFunction));
}

#[test]
fn valid_module_builds_and_indexes_users() -> Result<()> {
    let mut builder = GraphBuilder::new();
    builder.begin_func("main");
    let a = builder.add_op("a", &[], both(40))?;
    let b = builder.add_op("b", &[a], both(40))?;
    let c = builder.add_op("c", &[a, b], both(40))?;
    let graph = builder.finish();

    assert_eq!(graph.users_of(a), &[b, c]);
    assert_eq!(graph.users_of(c), &[] as &[OpId]);
    assert!(graph.contains_edge(&memplan::Edge::new(a, c, 0)));
    assert!(!graph.contains_edge(&memplan::Edge::new(b, c, 0)));
    Ok(())
}
