use criterion::{criterion_group, criterion_main, Criterion};
use flowc::core::config::EstimatorOptions;
use flowc::core::description::{ClassDescription, TypeDescription};
use flowc::graph::{
    CoreOperatorKind, DataSize, ExternalInputInfo, Operator, OperatorGraph,
};
use flowc::optimizer::Optimizer;

fn model() -> TypeDescription {
    TypeDescription::class("com.example.Stock")
}

fn stage(kind: CoreOperatorKind) -> Operator {
    Operator::core(kind)
        .input("in", model())
        .output("out", model())
        .build()
        .unwrap()
}

/// `in -> project x depth -> out` as a flow part.
fn part(depth: usize) -> OperatorGraph {
    let mut g = OperatorGraph::new();
    let mut prev = g.add(Operator::external_input("in", model(), None));
    let mut port = "port";
    for _ in 0..depth {
        let p = g.add(stage(CoreOperatorKind::Project));
        g.connect_by_name(prev, port, p, "in").unwrap();
        prev = p;
        port = "out";
    }
    let o = g.add(Operator::external_output("out", model(), None));
    g.connect_by_name(prev, port, o, "port").unwrap();
    g
}

/// `width` parallel chains of flow parts fed by one sized input.
fn make_graph(width: usize, depth: usize) -> OperatorGraph {
    let mut g = OperatorGraph::new();
    let info = ExternalInputInfo {
        description_class: ClassDescription::new("com.example.StockInput"),
        module_name: "files".into(),
        data_model: ClassDescription::new("com.example.Stock"),
        data_size: DataSize::Small,
        contents: None,
    };
    let src = g.add(Operator::external_input("source", model(), Some(info)));
    for i in 0..width {
        let f = g.add(
            Operator::flow(ClassDescription::new("com.example.Part"), part(depth))
                .input("in", model())
                .output("out", model())
                .build()
                .unwrap(),
        );
        let dst = g.add(Operator::external_output(format!("sink{i}"), model(), None));
        g.connect_by_name(src, "port", f, "in").unwrap();
        g.connect_by_name(f, "out", dst, "port").unwrap();
    }
    g
}

fn bench_flatten(c: &mut Criterion) {
    let graph = make_graph(32, 16);
    c.bench_function("flatten", |b| {
        b.iter(|| {
            let mut g = graph.copy();
            g.flatten().unwrap();
        })
    });
}

fn bench_estimation(c: &mut Criterion) {
    let mut graph = make_graph(32, 16);
    graph.flatten().unwrap();
    let optimizer = Optimizer::new(EstimatorOptions::default());
    c.bench_function("analyze", |b| {
        b.iter(|| {
            let _ = optimizer.analyze(&graph, None);
        })
    });
}

criterion_group!(compiler, bench_flatten, bench_estimation);
criterion_main!(compiler);
