//! # Property-Based Tests
//!
//! Invariants of the update rules over random distributions: produced
//! messages are normalized, variables exclude the recipient, the XOR
//! transform agrees with direct convolution, and updates are deterministic.

use bitprop_core::{
    DomainMode, FunctionId, FunctionUpdater, Gate, GraphBuilder, GraphStore, Scratch, VariableId,
    VariableUpdater, kernel,
};
use proptest::collection::vec;
use proptest::prelude::*;

const BITS: u32 = 3;
const N: usize = 1 << BITS;

fn distribution() -> impl Strategy<Value = Vec<f64>> {
    vec(0.001f64..1.0, N).prop_map(|mut v| {
        kernel::normalize(&mut v, 1.0).expect("normalize");
        v
    })
}

fn gate() -> impl Strategy<Value = Gate> {
    prop_oneof![
        Just(Gate::And),
        Just(Gate::Xor),
        Just(Gate::Not),
        (0u32..N as u32).prop_map(|offset| Gate::XorConst { offset }),
        (0u32..32).prop_map(|amount| Gate::RotateLeft { amount }),
        Just(Gate::Table {
            table: bitprop_core::TableId(0)
        }),
    ]
}

/// A single gate wired to fresh linear variables, with the given incoming
/// messages installed.
fn gate_graph(gate: Gate, in0: &[f64], in1: &[f64], out: &[f64]) -> (GraphStore, FunctionId) {
    let mut b = GraphBuilder::new(BITS).expect("builder");
    b.add_table(&[3, 7, 1, 0, 6, 2, 5, 4]).expect("table");
    let a = b.add_uniform_variable(DomainMode::Linear);
    let c = b.add_uniform_variable(DomainMode::Linear);
    let o = b.add_uniform_variable(DomainMode::Linear);
    let inputs: Vec<VariableId> = if gate.arity() == 2 { vec![a, c] } else { vec![a] };
    let f = b.add_function(gate, &inputs, o).expect("gate");
    let mut graph = b.build().expect("build");
    graph.set_variable_message(a, 0, in0).expect("a");
    if gate.arity() == 2 {
        graph.set_variable_message(c, 0, in1).expect("c");
    }
    graph.set_variable_message(o, 0, out).expect("o");
    (graph, f)
}

fn normalized(v: &[f64]) -> bool {
    (v.iter().sum::<f64>() - 1.0).abs() < 1e-6 && v.iter().all(|&x| x >= 0.0)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Every message a gate produces sums to 1.
    #[test]
    fn function_messages_are_normalized(
        gate in gate(),
        in0 in distribution(),
        in1 in distribution(),
        out in distribution(),
    ) {
        let (mut graph, f) = gate_graph(gate, &in0, &in1, &out);
        let mut scratch = Scratch::for_graph(&graph);
        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");

        let node = graph.function(f).expect("f");
        prop_assert!(normalized(node.output_message().expect("out")));
        for i in 0..node.inputs().len() {
            prop_assert!(normalized(node.input_message(i).expect("in")));
        }
    }

    /// XOR output through the transform equals the direct convolution.
    #[test]
    fn xor_matches_direct_convolution(in0 in distribution(), in1 in distribution()) {
        let (mut graph, f) = gate_graph(Gate::Xor, &in0, &in1, &[1.0 / N as f64; N]);
        let mut scratch = Scratch::for_graph(&graph);
        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");

        let mut direct = [0.0; N];
        for x in 0..N {
            for y in 0..N {
                direct[x ^ y] += in0[x] * in1[y];
            }
        }
        let got = graph.function(f).expect("f").output_message().expect("out");
        for (g, d) in got.iter().zip(direct) {
            prop_assert!((g - d).abs() < 1e-9);
        }
    }

    /// A variable message to one neighbor is the prior times the other one.
    #[test]
    fn variable_excludes_recipient(
        prior in distribution(),
        m1 in distribution(),
        m2 in distribution(),
        log in any::<bool>(),
    ) {
        let mode = if log { DomainMode::Log } else { DomainMode::Linear };
        let mut b = GraphBuilder::new(BITS).expect("builder");
        let x = b.add_variable(prior.clone(), mode).expect("x");
        let y = b.add_uniform_variable(DomainMode::Linear);
        let z = b.add_uniform_variable(DomainMode::Linear);
        b.add_function(Gate::Not, &[x], y).expect("f0");
        b.add_function(Gate::Not, &[x], z).expect("f1");
        let mut graph = b.build().expect("build");
        graph.set_function_message(FunctionId(0), 1, &m1).expect("m1");
        graph.set_function_message(FunctionId(1), 1, &m2).expect("m2");

        let mut scratch = Scratch::for_graph(&graph);
        VariableUpdater::update(&mut graph, x, &mut scratch).expect("update");

        let mut want: Vec<f64> = prior.iter().zip(&m2).map(|(p, m)| p * m).collect();
        kernel::normalize(&mut want, 1.0).expect("normalize");
        let got = graph.variable(x).expect("x").output_message(0).expect("to f0");
        for (g, w) in got.iter().zip(&want) {
            prop_assert!((g - w).abs() < 1e-9);
        }
    }

    /// Identical graphs and inputs give bit-identical results.
    #[test]
    fn updates_are_deterministic(
        gate in gate(),
        in0 in distribution(),
        in1 in distribution(),
        out in distribution(),
    ) {
        let (mut first, f) = gate_graph(gate, &in0, &in1, &out);
        let mut second = first.clone();
        let mut scratch = Scratch::for_graph(&first);

        FunctionUpdater::update(&mut first, f, &mut scratch).expect("first");
        FunctionUpdater::update(&mut second, f, &mut scratch).expect("second");
        prop_assert_eq!(first, second);
    }
}
