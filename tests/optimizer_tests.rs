//! Estimation, join strategy characterization, and rewriting.

use flowc::analyzer::master_join::SELECTION_ELEMENT;
use flowc::analyzer::MasterJoinKind;
use flowc::core::config::EstimatorOptions;
use flowc::core::description::{
    AnnotationDescription, ClassDescription, MethodDescription, TypeDescription, ValueDescription,
};
use flowc::core::diagnostic::{EntityRef, Level};
use flowc::core::id::OperatorId;
use flowc::graph::{
    CoreOperatorKind, DataSize, ExternalInputInfo, Operator, OperatorConstraint, OperatorGraph,
    OperatorKind,
};
use flowc::optimizer::{
    EstimatorChain, EstimatorContext, ExternalInputEstimator, JoinStrategy, OperatorEstimator,
    Optimizer, PropagatingSizeEstimator, SizeClass,
};

fn options() -> EstimatorOptions {
    EstimatorOptions {
        tiny_limit_bytes: 1_000.0,
        small_limit_bytes: 100_000.0,
    }
}

fn input(name: &str, size: DataSize) -> Operator {
    let info = ExternalInputInfo {
        description_class: ClassDescription::new("com.example.Input"),
        module_name: "files".into(),
        data_model: ClassDescription::new("com.example.Item"),
        data_size: size,
        contents: None,
    };
    Operator::external_input(name, TypeDescription::class("com.example.Item"), Some(info))
}

fn join(constraints: &[OperatorConstraint]) -> Operator {
    Operator::user(
        AnnotationDescription::marker(MasterJoinKind::MasterJoin.annotation_class())
            .with_element(SELECTION_ELEMENT, ValueDescription::string("-")),
        MethodDescription::new(ClassDescription::new("com.example.Ops"), "join"),
        ClassDescription::new("com.example.OpsImpl"),
    )
    .input("master", TypeDescription::class("com.example.Item"))
    .input("tx", TypeDescription::class("com.example.Order"))
    .output("joined", TypeDescription::class("com.example.Joined"))
    .constraints(constraints.iter().copied())
    .build()
    .unwrap()
}

/// master -> join <- tx, join -> out
fn join_graph(master: DataSize, constraints: &[OperatorConstraint]) -> (OperatorGraph, OperatorId) {
    let mut g = OperatorGraph::new();
    let m = g.add(input("master", master));
    let t = g.add(input("tx", DataSize::Large));
    let j = g.add(join(constraints));
    let o = g.add(Operator::external_output(
        "out",
        TypeDescription::class("com.example.Joined"),
        None,
    ));
    g.connect_by_name(m, "port", j, "master").unwrap();
    g.connect_by_name(t, "port", j, "tx").unwrap();
    g.connect_by_name(j, "joined", o, "port").unwrap();
    (g, j)
}

#[test]
fn test_estimates_cover_every_operator() {
    let (g, j) = join_graph(DataSize::Tiny, &[]);
    let opts = options();
    let ctx = EstimatorContext::new(&g, &opts);
    let ids = g.operators();
    let map = EstimatorChain::standard().estimate(&ctx, &ids);
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), ids);
    let members: [&dyn OperatorEstimator; 2] =
        [&ExternalInputEstimator, &PropagatingSizeEstimator];
    for estimator in members {
        let partial = estimator.estimate(&ctx, &ids);
        assert_eq!(
            partial.keys().copied().collect::<Vec<_>>(),
            ids,
            "{} is not total",
            estimator.name()
        );
    }
    // output follows the transaction side
    assert_eq!(map[&j].output_size("joined"), Some(f64::INFINITY));
    assert_eq!(
        SizeClass::of_bytes(map[&j].input_size("master").unwrap(), &opts),
        SizeClass::Tiny
    );
}

#[test]
fn test_tiny_master_is_broadcast() {
    let (g, j) = join_graph(DataSize::Tiny, &[]);
    let report = Optimizer::new(options()).analyze(&g, None);
    assert_eq!(report.join_strategies.get(&j), Some(&JoinStrategy::Broadcast));
    assert_eq!(report.join_strategies.len(), 1);
    assert!(!report.has_errors());
}

#[test]
fn test_large_master_is_partitioned() {
    let (g, j) = join_graph(DataSize::Large, &[]);
    let report = Optimizer::new(options()).analyze(&g, None);
    assert_eq!(report.join_strategies[&j], JoinStrategy::Partitioned);
}

#[test]
fn test_unpartitionable_join_needs_tiny_master() {
    let (g, j) = join_graph(DataSize::Small, &[OperatorConstraint::Unpartitionable]);
    let report = Optimizer::new(options()).analyze(&g, Some(EntityRef::jobflow("b", "f")));
    assert_eq!(report.join_strategies[&j], JoinStrategy::Broadcast);
    assert!(report.has_errors());
    let error = &report.diagnostics[0];
    assert_eq!(error.level, Level::Error);
    assert!(error.message.contains("cannot be partitioned"));
    let entity = error.entity.as_ref().unwrap().to_string();
    assert!(entity.contains("f"), "{entity}");
}

#[test]
fn test_analysis_is_deterministic() {
    let (g, _) = join_graph(DataSize::Small, &[]);
    let optimizer = Optimizer::new(options());
    let first = optimizer.analyze(&g, None);
    let second = optimizer.analyze(&g, None);
    assert_eq!(first.join_strategies, second.join_strategies);
    assert_eq!(first.estimates, second.estimates);
}

#[test]
fn test_rewrite_removes_dead_branches() {
    let (mut g, _) = join_graph(DataSize::Tiny, &[]);
    let m = g.find_external_input("master").unwrap();
    let dead = g.add(
        Operator::core(CoreOperatorKind::Checkpoint)
            .input("in", TypeDescription::class("com.example.Item"))
            .output("out", TypeDescription::class("com.example.Item"))
            .build()
            .unwrap(),
    );
    g.connect_by_name(m, "port", dead, "in").unwrap();

    let removed = Optimizer::new(options()).rewrite(&mut g).unwrap();
    assert!(removed >= 1);
    assert!(!g.contains(dead));
    assert_eq!(g.operators_of(OperatorKind::User).len(), 1);
    g.validate().unwrap();
}
