//! # Update Benchmarks
//!
//! Performance benchmarks for bitprop-core node updates.
//!
//! Run with: `cargo bench -p bitprop-core`

use bitprop_core::{
    DomainMode, FunctionId, FunctionUpdater, Gate, GraphBuilder, GraphStore, Scratch, VariableId,
    VariableUpdater,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// A single gate over `bits` bits with uniform messages.
fn gate_graph(bits: u32, gate: Gate) -> (GraphStore, FunctionId) {
    let mut b = GraphBuilder::new(bits).expect("builder");
    let table: Vec<u32> = (0..1u32 << bits).rev().collect();
    b.add_table(&table).expect("table");
    let a = b.add_uniform_variable(DomainMode::Linear);
    let c = b.add_uniform_variable(DomainMode::Linear);
    let out = b.add_uniform_variable(DomainMode::Linear);
    let inputs: Vec<VariableId> = if gate.arity() == 2 { vec![a, c] } else { vec![a] };
    let f = b.add_function(gate, &inputs, out).expect("gate");
    (b.build().expect("build"), f)
}

/// A variable with `fan_out` consumers.
fn star_graph(bits: u32, fan_out: usize, mode: DomainMode) -> (GraphStore, VariableId) {
    let mut b = GraphBuilder::new(bits).expect("builder");
    let hub = b.add_uniform_variable(mode);
    for _ in 0..fan_out {
        let spoke = b.add_uniform_variable(DomainMode::Linear);
        b.add_function(Gate::Not, &[hub], spoke).expect("spoke");
    }
    (b.build().expect("build"), hub)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_xor(c: &mut Criterion) {
    let mut group = c.benchmark_group("xor_update");

    for bits in [4u32, 8, 12, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(bits), bits, |b, &bits| {
            let (mut graph, f) = gate_graph(bits, Gate::Xor);
            let mut scratch = Scratch::for_graph(&graph);
            b.iter(|| {
                FunctionUpdater::update(&mut graph, black_box(f), &mut scratch).expect("update");
            });
        });
    }

    group.finish();
}

fn bench_and(c: &mut Criterion) {
    let mut group = c.benchmark_group("and_update");

    for bits in [4u32, 6, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(bits), bits, |b, &bits| {
            let (mut graph, f) = gate_graph(bits, Gate::And);
            let mut scratch = Scratch::for_graph(&graph);
            b.iter(|| {
                FunctionUpdater::update(&mut graph, black_box(f), &mut scratch).expect("update");
            });
        });
    }

    group.finish();
}

fn bench_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_update");

    for bits in [8u32, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(bits), bits, |b, &bits| {
            let gate = Gate::Table {
                table: bitprop_core::TableId(0),
            };
            let (mut graph, f) = gate_graph(bits, gate);
            let mut scratch = Scratch::for_graph(&graph);
            b.iter(|| {
                FunctionUpdater::update(&mut graph, black_box(f), &mut scratch).expect("update");
            });
        });
    }

    group.finish();
}

fn bench_variable(c: &mut Criterion) {
    let mut group = c.benchmark_group("variable_update");

    for (name, mode) in [("log", DomainMode::Log), ("linear", DomainMode::Linear)] {
        for fan_out in [2usize, 8].iter() {
            group.bench_with_input(
                BenchmarkId::new(name, fan_out),
                fan_out,
                |b, &fan_out| {
                    let (mut graph, v) = star_graph(8, fan_out, mode);
                    let mut scratch = Scratch::for_graph(&graph);
                    b.iter(|| {
                        VariableUpdater::update(&mut graph, black_box(v), &mut scratch)
                            .expect("update");
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_xor, bench_and, bench_table, bench_variable);
criterion_main!(benches);
