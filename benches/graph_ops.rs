//! Benchmarks for inference-graph operations.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use frank::alist::{Alist, AttrValue, State, attr};
use frank::graph::InferenceGraph;
use frank::reduce::{self, Reduce};

fn query() -> Alist {
    let mut a = Alist::from_json(&json!({
        "h": "value", "v": "?y", "s": "Ghana", "p": "population", "o": "?y"
    }))
    .unwrap();
    a.check_variables();
    a
}

fn bench_parse(c: &mut Criterion) {
    let text = json!({
        "h": "value", "v": "?y", "s": "Ghana", "p": "population", "o": "?y",
        "cx": {"place": "Ghana", "trust": "high"}
    })
    .to_string();

    c.bench_function("parse_query", |bench| {
        bench.iter(|| {
            let mut a = Alist::from_json_str(black_box(&text)).unwrap();
            a.check_variables();
            black_box(a)
        })
    });
}

fn bench_subdivide(c: &mut Criterion) {
    let root = query();

    c.bench_function("subdivide_8", |bench| {
        bench.iter(|| {
            let mut g = InferenceGraph::new();
            g.add_alist(&mut root.clone(), true);
            let head = root.copy(false);
            let reduce = root.copy(false);
            let children: Vec<Alist> = (0..8).map(|_| root.copy(false)).collect();
            black_box(
                g.subdivide("0", "0_", head, vec![reduce], children, false, false)
                    .unwrap(),
            )
        })
    });
}

fn bench_frontier(c: &mut Criterion) {
    let root = query();
    let mut g = InferenceGraph::new();
    g.add_alist(&mut root.clone(), true);
    let children: Vec<Alist> = (0..64).map(|_| root.copy(false)).collect();
    g.subdivide("0", "0_", root.copy(false), vec![root.copy(false)], children, false, false)
        .unwrap();

    c.bench_function("frontier_64", |bench| {
        bench.iter(|| black_box(g.frontier(State::Unexplored, None)))
    });
}

fn bench_value_reduce(c: &mut Criterion) {
    let node = query();
    let children: Vec<Alist> = (0..16)
        .map(|n| {
            let mut child = query();
            child.set(attr::OPVALUE, AttrValue::Num(1_000_000.0 + n as f64));
            child
        })
        .collect();
    let reducer = reduce::lookup("value").unwrap();

    c.bench_function("value_reduce_16", |bench| {
        bench.iter(|| {
            let mut g = InferenceGraph::new();
            let mut n = node.clone();
            black_box(reducer.reduce(&mut n, &children, &mut g))
        })
    });
}

criterion_group!(benches, bench_parse, bench_subdivide, bench_frontier, bench_value_reduce);
criterion_main!(benches);
