//! # Function Node Updates
//!
//! Recomputes a gate's outgoing messages from the messages its input and
//! output variables currently send it.
//!
//! | Gate | Inputs | Kernel |
//! |------|--------|--------|
//! | XOR | 2 | Walsh-Hadamard exchange, tiled at the graph's XOR period |
//! | AND | 2 | direct convolution, quadratic in the domain size |
//! | NOT, XOR-const, rotate, table | 1 | exact pull-back through the bijection |
//!
//! The gate and its parameters are checked before any buffer is touched.
//! Messages are computed in scratch, normalized, and copied into the node
//! only once every row is finished.

use crate::graph::{FunctionContext, FunctionNode, GraphStore, VariableNode};
use crate::kernel::{self, index};
use crate::primitives::{MAX_FUNCTION_INPUTS, ROTATE_WORD_BITS};
use crate::scratch::Scratch;
use crate::tables::LookupTables;
use crate::{Domain, FunctionId, Gate, NodeRef, PropagationError};

/// Stateless entry points for function node updates.
pub struct FunctionUpdater;

impl FunctionUpdater {
    /// Full-distribution update, dispatched on the gate kind.
    pub fn update(
        graph: &mut GraphStore,
        id: FunctionId,
        scratch: &mut Scratch,
    ) -> Result<(), PropagationError> {
        let FunctionContext {
            node,
            variables,
            tables,
            domain,
            xor_period,
        } = graph.split_function(id)?;
        let n = domain.size();
        let arity = node.inputs.len();

        check_gate(id, node.gate, arity, domain, tables)?;
        let from_output = output_row(id, node, variables, n)?;
        let from_inputs = input_rows(id, node, variables, n)?;

        let rows = arity + 1;
        scratch.reserve(n, rows);
        let Scratch {
            staging, transform, ..
        } = scratch;
        let staging = &mut staging[..rows * n];

        match node.gate {
            Gate::Xor => {
                let (to_out, rest) = staging.split_at_mut(n);
                let (to_in0, to_in1) = rest.split_at_mut(n);
                let p = xor_period;
                kernel::xor_exchange(
                    from_inputs[0],
                    from_inputs[1],
                    from_output,
                    &mut to_out[..p],
                    &mut to_in0[..p],
                    &mut to_in1[..p],
                    transform,
                );
                kernel::tile(to_out, p);
                kernel::tile(to_in0, p);
                kernel::tile(to_in1, p);
            }
            Gate::And => {
                let (to_out, rest) = staging.split_at_mut(n);
                let (to_in0, to_in1) = rest.split_at_mut(n);
                kernel::and_exchange(
                    from_inputs[0],
                    from_inputs[1],
                    from_output,
                    to_out,
                    to_in0,
                    to_in1,
                );
            }
            gate => {
                let map = UnaryMap::resolve(id, gate, domain, tables)?;
                staging.fill(0.0);
                let (to_out, to_in) = staging.split_at_mut(n);
                let from_input = from_inputs[0];
                for i0 in 0..n {
                    let o = map.apply(i0 as u32);
                    to_out[o] += from_input[i0];
                    to_in[i0] += from_output[o];
                }
            }
        }

        for r in 0..rows {
            kernel::normalize(&mut staging[index(r, 0, n)..index(r + 1, 0, n)], 1.0)
                .map_err(|_| PropagationError::NonFinite(NodeRef::Function(id)))?;
        }
        node.messages.copy_from_slice(staging);
        Ok(())
    }

    /// Information-mode update over index 0 of every vector.
    ///
    /// To the output: the product of all inputs' values, clamped to 1. To
    /// each input: the output's value times every other input's value,
    /// clamped to 1. Other entries are left untouched.
    pub fn update_information(
        graph: &mut GraphStore,
        id: FunctionId,
    ) -> Result<(), PropagationError> {
        let FunctionContext {
            node,
            variables,
            domain,
            ..
        } = graph.split_function(id)?;
        let n = domain.size();
        let arity = node.inputs.len();
        if arity == 0 || arity > MAX_FUNCTION_INPUTS {
            return Err(PropagationError::gate(
                id,
                format!("{} inputs (expected 1 or 2)", arity),
            ));
        }

        let from_output = output_row(id, node, variables, n)?[0];
        let from_inputs: Vec<f64> = input_rows(id, node, variables, n)?
            .iter()
            .map(|row| row[0])
            .collect();

        let to_output: f64 = from_inputs.iter().product();
        let to_inputs: Vec<f64> = (0..arity)
            .map(|i| {
                from_inputs
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .fold(from_output, |acc, (_, v)| acc * v)
            })
            .collect();
        if !to_output.is_finite() || !kernel::all_finite(&to_inputs) {
            return Err(PropagationError::NonFinite(NodeRef::Function(id)));
        }

        node.messages[0] = to_output.min(1.0);
        for (i, value) in to_inputs.into_iter().enumerate() {
            node.messages[index(i + 1, 0, n)] = value.min(1.0);
        }
        Ok(())
    }
}

/// Check that `gate` accepts `inputs` inputs and that its parameters fit
/// the domain and the table store.
pub(crate) fn check_gate(
    id: FunctionId,
    gate: Gate,
    inputs: usize,
    domain: Domain,
    tables: &LookupTables,
) -> Result<(), PropagationError> {
    if gate.arity() != inputs {
        return Err(PropagationError::gate(
            id,
            format!("{} gate cannot take {} input(s)", gate.name(), inputs),
        ));
    }
    match gate {
        Gate::XorConst { offset } if offset > domain.mask() => Err(PropagationError::gate(
            id,
            format!("offset {:#x} outside a {}-bit domain", offset, domain.bits()),
        )),
        Gate::Table { table } if tables.row(table).is_none() => Err(PropagationError::gate(
            id,
            format!("unknown lookup table {}", table.0),
        )),
        _ => Ok(()),
    }
}

/// The message the output variable sends to this gate.
fn output_row<'a>(
    id: FunctionId,
    node: &FunctionNode,
    variables: &'a [VariableNode],
    n: usize,
) -> Result<&'a [f64], PropagationError> {
    variables
        .get(node.output.0)
        .filter(|v| v.input == Some(id))
        .and_then(|v| v.messages.get(..n))
        .ok_or(PropagationError::MissingNeighbor {
            node: NodeRef::Function(id),
            neighbor: NodeRef::Variable(node.output),
        })
}

/// The messages each input variable sends to this gate, in input order.
fn input_rows<'a>(
    id: FunctionId,
    node: &FunctionNode,
    variables: &'a [VariableNode],
    n: usize,
) -> Result<Vec<&'a [f64]>, PropagationError> {
    node.inputs
        .iter()
        .enumerate()
        .map(|(i, edge)| {
            variables
                .get(edge.variable.0)
                .filter(|v| {
                    let base = usize::from(v.input.is_some());
                    edge.slot
                        .checked_sub(base)
                        .and_then(|k| v.outputs.get(k))
                        .is_some_and(|back| back.function == id && back.slot == i)
                })
                .and_then(|v| v.messages.get(index(edge.slot, 0, n)..index(edge.slot + 1, 0, n)))
                .ok_or(PropagationError::MissingNeighbor {
                    node: NodeRef::Function(id),
                    neighbor: NodeRef::Variable(edge.variable),
                })
        })
        .collect()
}

/// A single-input gate as a bijection over the domain.
enum UnaryMap<'a> {
    Not { mask: u32 },
    XorConst { offset: u32 },
    Rotate { amount: u32, bits: u32 },
    Rotl16 { amount: u32 },
    Table { row: &'a [u32] },
}

impl<'a> UnaryMap<'a> {
    fn resolve(
        id: FunctionId,
        gate: Gate,
        domain: Domain,
        tables: &'a LookupTables,
    ) -> Result<Self, PropagationError> {
        match gate {
            Gate::Not => Ok(Self::Not {
                mask: domain.mask(),
            }),
            Gate::XorConst { offset } => Ok(Self::XorConst { offset }),
            Gate::RotateLeft { amount } if domain.bits() == ROTATE_WORD_BITS => {
                Ok(Self::Rotl16 { amount })
            }
            Gate::RotateLeft { amount } => Ok(Self::Rotate {
                amount,
                bits: domain.bits(),
            }),
            Gate::Table { table } => tables
                .row(table)
                .map(|row| Self::Table { row })
                .ok_or_else(|| {
                    PropagationError::gate(id, format!("unknown lookup table {}", table.0))
                }),
            Gate::And | Gate::Xor => Err(PropagationError::gate(
                id,
                format!("{} gate cannot take 1 input(s)", gate.name()),
            )),
        }
    }

    #[inline]
    fn apply(&self, x: u32) -> usize {
        match self {
            Self::Not { mask } => (!x & mask) as usize,
            Self::XorConst { offset } => (x ^ offset) as usize,
            Self::Rotate { amount, bits } => kernel::rotate_left(x, *amount, *bits) as usize,
            Self::Rotl16 { amount } => kernel::rotl16(x, *amount) as usize,
            Self::Table { row } => row[x as usize] as usize,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DomainMode, GraphBuilder, TableId, VariableId};

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6, "{:?} != {:?}", a, b);
        }
    }

    fn assert_normalized(graph: &GraphStore, id: FunctionId) {
        let node = graph.function(id).expect("function");
        for r in 0..=node.inputs().len() {
            let row = if r == 0 {
                node.output_message()
            } else {
                node.input_message(r - 1)
            }
            .expect("row");
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        }
    }

    /// `out = gate(a, b)` over a 2-bit domain.
    fn binary(gate: Gate) -> (GraphStore, FunctionId, [VariableId; 3]) {
        let mut b = GraphBuilder::new(2).expect("builder");
        let a = b.add_uniform_variable(DomainMode::Linear);
        let c = b.add_uniform_variable(DomainMode::Linear);
        let out = b.add_uniform_variable(DomainMode::Linear);
        let f = b.add_function(gate, &[a, c], out).expect("gate");
        (b.build().expect("build"), f, [a, c, out])
    }

    /// `out = gate(a)` over a domain of `bits` bits, with one table.
    fn unary(
        gate: Gate,
        bits: u32,
        table: Option<&[u32]>,
    ) -> (GraphStore, FunctionId, [VariableId; 2]) {
        let mut b = GraphBuilder::new(bits).expect("builder");
        if let Some(values) = table {
            b.add_table(values).expect("table");
        }
        let a = b.add_uniform_variable(DomainMode::Linear);
        let out = b.add_uniform_variable(DomainMode::Linear);
        let f = b.add_function(gate, &[a], out).expect("gate");
        (b.build().expect("build"), f, [a, out])
    }

    #[test]
    fn xor_of_point_masses() {
        let (mut graph, f, [a, c, _]) = binary(Gate::Xor);
        graph.set_variable_message(a, 0, &[1.0, 0.0, 0.0, 0.0]).expect("a");
        graph.set_variable_message(c, 0, &[0.0, 1.0, 0.0, 0.0]).expect("c");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        let node = graph.function(f).expect("f");
        assert_close(node.output_message().expect("out"), &[0.0, 1.0, 0.0, 0.0]);
        // output is uniform, so both inputs learn nothing
        assert_close(node.input_message(0).expect("in0"), &[0.25; 4]);
        assert_normalized(&graph, f);
    }

    #[test]
    fn xor_pulls_output_back_to_inputs() {
        let (mut graph, f, [a, _, out]) = binary(Gate::Xor);
        graph.set_variable_message(a, 0, &[0.0, 0.0, 1.0, 0.0]).expect("a");
        graph.set_variable_message(out, 0, &[0.0, 0.0, 0.0, 1.0]).expect("out");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        // 2 ^ x == 3  =>  x == 1
        let node = graph.function(f).expect("f");
        assert_close(node.input_message(1).expect("in1"), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn xor_tiles_at_period() {
        let mut b = GraphBuilder::new(3)
            .expect("builder")
            .xor_period(4)
            .expect("period");
        let a = b.add_uniform_variable(DomainMode::Linear);
        let c = b.add_uniform_variable(DomainMode::Linear);
        let out = b.add_uniform_variable(DomainMode::Linear);
        let f = b.add_function(Gate::Xor, &[a, c], out).expect("xor");
        let mut graph = b.build().expect("build");
        let half = [0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0];
        graph.set_variable_message(a, 0, &half).expect("a");
        graph.set_variable_message(c, 0, &[0.0, 0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0]).expect("c");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        let node = graph.function(f).expect("f");
        assert_close(
            node.output_message().expect("out"),
            &[0.0, 0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0],
        );
        assert_normalized(&graph, f);
    }

    #[test]
    fn and_with_certain_zero() {
        let (mut graph, f, [a, c, _]) = binary(Gate::And);
        graph.set_variable_message(a, 0, &[1.0, 0.0, 0.0, 0.0]).expect("a");
        graph.set_variable_message(c, 0, &[0.1, 0.2, 0.3, 0.4]).expect("c");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        let node = graph.function(f).expect("f");
        assert_close(node.output_message().expect("out"), &[1.0, 0.0, 0.0, 0.0]);
        assert_normalized(&graph, f);
    }

    #[test]
    fn and_of_uniform_inputs() {
        let (mut graph, f, _) = binary(Gate::And);
        let mut scratch = Scratch::for_graph(&graph);
        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        // Over 2 bits, each output bit is 1 with probability 1/4.
        let node = graph.function(f).expect("f");
        assert_close(
            node.output_message().expect("out"),
            &[9.0 / 16.0, 3.0 / 16.0, 3.0 / 16.0, 1.0 / 16.0],
        );
    }

    #[test]
    fn not_complements_within_domain() {
        let (mut graph, f, [a, out]) = unary(Gate::Not, 2, None);
        graph.set_variable_message(a, 0, &[1.0, 0.0, 0.0, 0.0]).expect("a");
        graph.set_variable_message(out, 0, &[0.0, 0.0, 1.0, 0.0]).expect("out");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        let node = graph.function(f).expect("f");
        assert_close(node.output_message().expect("out"), &[0.0, 0.0, 0.0, 1.0]);
        // NOT^-1(2) == 1
        assert_close(node.input_message(0).expect("in"), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn xor_const_shifts_mass() {
        let (mut graph, f, [a, _]) = unary(Gate::XorConst { offset: 0b101 }, 3, None);
        let mut point = [0.0; 8];
        point[0b011] = 1.0;
        graph.set_variable_message(a, 0, &point).expect("a");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        let out = graph.function(f).expect("f").output_message().expect("out").to_vec();
        assert!((out[0b110] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rotate_moves_mass() {
        let (mut graph, f, [a, out]) = unary(Gate::RotateLeft { amount: 1 }, 2, None);
        graph.set_variable_message(a, 0, &[0.0, 0.7, 0.3, 0.0]).expect("a");
        graph.set_variable_message(out, 0, &[0.0, 1.0, 0.0, 0.0]).expect("out");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        let node = graph.function(f).expect("f");
        // rotl(1) = 2, rotl(2) = 1
        assert_close(node.output_message().expect("out"), &[0.0, 0.3, 0.7, 0.0]);
        assert_close(node.input_message(0).expect("in"), &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn table_lookup_is_exact_pull_back() {
        let table = [2, 0, 3, 1];
        let (mut graph, f, [a, out]) = unary(Gate::Table { table: TableId(0) }, 2, Some(&table));
        graph.set_variable_message(a, 0, &[0.1, 0.2, 0.3, 0.4]).expect("a");
        graph.set_variable_message(out, 0, &[0.4, 0.3, 0.2, 0.1]).expect("out");
        let mut scratch = Scratch::for_graph(&graph);

        FunctionUpdater::update(&mut graph, f, &mut scratch).expect("update");
        let node = graph.function(f).expect("f");
        assert_close(node.output_message().expect("out"), &[0.2, 0.4, 0.1, 0.3]);
        assert_close(node.input_message(0).expect("in"), &[0.2, 0.4, 0.1, 0.3]);
    }

    #[test]
    fn unsupported_binary_gate_publishes_nothing() {
        let (mut graph, f, _) = binary(Gate::Not);
        let sentinel = [0.7, 0.1, 0.1, 0.1];
        for row in 0..3 {
            graph.set_function_message(f, row, &sentinel).expect("seed");
        }
        let before = graph.function(f).expect("f").clone();
        let mut scratch = Scratch::for_graph(&graph);

        let result = FunctionUpdater::update(&mut graph, f, &mut scratch);
        assert!(matches!(
            result,
            Err(PropagationError::Configuration { node: NodeRef::Function(id), .. }) if id == f
        ));
        assert_eq!(graph.function(f).expect("f"), &before);
    }

    #[test]
    fn binary_gate_with_one_input_is_rejected() {
        let (mut graph, f, _) = unary(Gate::Xor, 2, None);
        let mut scratch = Scratch::for_graph(&graph);
        assert!(matches!(
            FunctionUpdater::update(&mut graph, f, &mut scratch),
            Err(PropagationError::Configuration { .. })
        ));
    }

    #[test]
    fn bad_parameters_are_rejected() {
        let (mut graph, f, _) = unary(Gate::XorConst { offset: 4 }, 2, None);
        let mut scratch = Scratch::for_graph(&graph);
        assert!(FunctionUpdater::update(&mut graph, f, &mut scratch).is_err());

        let (mut graph, f, _) = unary(Gate::Table { table: TableId(3) }, 2, None);
        assert!(FunctionUpdater::update(&mut graph, f, &mut scratch).is_err());
    }

    #[test]
    fn detached_output_is_missing_neighbor() {
        let (mut graph, f, [_, out]) = unary(Gate::Not, 2, None);
        graph.variables[out.0].input = None;
        let mut scratch = Scratch::for_graph(&graph);
        assert!(matches!(
            FunctionUpdater::update(&mut graph, f, &mut scratch),
            Err(PropagationError::MissingNeighbor {
                neighbor: NodeRef::Variable(v),
                ..
            }) if v == out
        ));
    }

    #[test]
    fn information_products_clamp() {
        let (mut graph, f, [a, c, out]) = binary(Gate::And);
        graph.set_variable_message(a, 0, &[0.5, 0.1, 0.2, 0.2]).expect("a");
        graph.set_variable_message(c, 0, &[0.4, 0.2, 0.2, 0.2]).expect("c");
        graph.set_variable_message(out, 0, &[2.0, 0.0, 0.0, 0.0]).expect("out");

        FunctionUpdater::update_information(&mut graph, f).expect("update");
        let node = graph.function(f).expect("f");
        assert!((node.output_message().expect("out")[0] - 0.2).abs() < 1e-12);
        assert!((node.input_message(0).expect("in0")[0] - 0.8).abs() < 1e-12);
        // 2.0 * 0.5 == 1.0, clamped to exactly 1
        assert_eq!(node.input_message(1).expect("in1")[0], 1.0);
        // entries past index 0 untouched
        assert_eq!(node.output_message().expect("out")[1], 0.25);
    }
}
