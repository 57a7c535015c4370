//! # Variable Node Updates
//!
//! Recomputes a variable node's outgoing messages and belief from the
//! messages its neighboring function nodes currently send it.
//!
//! Three algorithms, all exclude-self sum-product:
//! - **log domain**: additive in log10 space with max-shift before
//!   exponentiation. The belief is left as a shifted log total.
//! - **linear domain**: multiplicative on probabilities.
//! - **information**: tracks only index 0 of every vector, summing single
//!   event probabilities and clamping at 1. The node is marked
//!   [`BeliefState::Information`] so its belief is never read as a
//!   distribution.
//!
//! ## Reads and writes
//!
//! An update reads neighbor buffers and writes only the node's own
//! `messages` and `belief`. Neighbor messages are converted to log10 into
//! scratch, never in place, so no update ever mutates another node.

use crate::graph::{FunctionNode, GraphStore, VariableNode};
use crate::kernel::{self, index};
use crate::scratch::Scratch;
use crate::{BeliefState, DomainMode, NodeRef, PropagationError, VariableId};

/// Stateless entry points for variable node updates.
pub struct VariableUpdater;

impl VariableUpdater {
    /// Update a variable with the algorithm selected by its [`DomainMode`].
    pub fn update(
        graph: &mut GraphStore,
        id: VariableId,
        scratch: &mut Scratch,
    ) -> Result<(), PropagationError> {
        match graph.variable(id)?.mode() {
            DomainMode::Log => Self::update_log(graph, id, scratch),
            DomainMode::Linear => Self::update_linear(graph, id, scratch),
        }
    }

    /// Log-domain update.
    ///
    /// `total = log10(prior) + sum of log10(incoming)`. Each outgoing
    /// message is `total` minus that edge's own contribution, shifted by its
    /// maximum, exponentiated and normalized. The belief is `total` shifted
    /// by its maximum and stays in the log domain.
    pub fn update_log(
        graph: &mut GraphStore,
        id: VariableId,
        scratch: &mut Scratch,
    ) -> Result<(), PropagationError> {
        let n = graph.domain().size();
        let (node, functions) = graph.split_variable(id)?;
        let rows = incoming(id, node, functions, n)?;
        let edges = rows.len();

        scratch.reserve(n, edges);
        let Scratch {
            total,
            incoming: logs,
            staging,
            ..
        } = scratch;
        let total = &mut total[..n];

        kernel::apply_log10(total, &node.prior);
        for (e, row) in rows.iter().enumerate() {
            let log = &mut logs[index(e, 0, n)..index(e + 1, 0, n)];
            kernel::apply_log10(log, row);
            kernel::add_assign(total, log);
        }

        for e in 0..edges {
            let range = index(e, 0, n)..index(e + 1, 0, n);
            let out = &mut staging[range.clone()];
            kernel::sub_into(out, total, &logs[range]);
            let shift = kernel::max(out);
            kernel::add_constant(out, -shift);
            kernel::apply_pow10_in_place(out);
            kernel::normalize(out, 1.0).map_err(|_| non_finite(id))?;
        }

        let shift = kernel::max(total);
        kernel::add_constant(total, -shift);
        if !kernel::all_finite(total) {
            return Err(non_finite(id));
        }

        node.messages.copy_from_slice(&staging[..edges * n]);
        node.belief.copy_from_slice(total);
        node.state = BeliefState::Distribution;
        Ok(())
    }

    /// Linear-domain update.
    ///
    /// Each outgoing message is `normalize(prior * product of the other
    /// edges' incoming messages)`; the belief is the normalized product over
    /// all edges.
    pub fn update_linear(
        graph: &mut GraphStore,
        id: VariableId,
        scratch: &mut Scratch,
    ) -> Result<(), PropagationError> {
        let n = graph.domain().size();
        let (node, functions) = graph.split_variable(id)?;
        let rows = incoming(id, node, functions, n)?;
        let edges = rows.len();

        scratch.reserve(n, edges);
        let Scratch { total, staging, .. } = scratch;
        let total = &mut total[..n];

        for e in 0..edges {
            let out = &mut staging[index(e, 0, n)..index(e + 1, 0, n)];
            out.copy_from_slice(&node.prior);
            for (j, row) in rows.iter().enumerate() {
                if j != e {
                    kernel::mul_assign(out, row);
                }
            }
            kernel::normalize(out, 1.0).map_err(|_| non_finite(id))?;
        }

        total.copy_from_slice(&node.prior);
        for row in &rows {
            kernel::mul_assign(total, row);
        }
        kernel::normalize(total, 1.0).map_err(|_| non_finite(id))?;

        node.messages.copy_from_slice(&staging[..edges * n]);
        node.belief.copy_from_slice(total);
        node.state = BeliefState::Distribution;
        Ok(())
    }

    /// Information-mode update over index 0 of every vector.
    ///
    /// `total = prior[0] + sum of incoming[0]`; `belief[0] = min(total, 1)`
    /// and each outgoing `message[0] = min(total - own, 1)`. Other entries
    /// are left untouched.
    pub fn update_information(
        graph: &mut GraphStore,
        id: VariableId,
    ) -> Result<(), PropagationError> {
        let n = graph.domain().size();
        let (node, functions) = graph.split_variable(id)?;
        let rows = incoming(id, node, functions, n)?;

        let total = node.prior[0] + rows.iter().map(|row| row[0]).sum::<f64>();
        if !total.is_finite() {
            return Err(non_finite(id));
        }

        node.belief[0] = total.min(1.0);
        node.state = BeliefState::Information;
        for (e, row) in rows.iter().enumerate() {
            node.messages[index(e, 0, n)] = (total - row[0]).min(1.0);
        }
        Ok(())
    }
}

/// Resolve the incoming message of every edge, in edge order.
///
/// Each neighbor must exist and point back at `id` through the recorded
/// slot, otherwise `MissingNeighbor` is returned before anything is written.
fn incoming<'a>(
    id: VariableId,
    node: &VariableNode,
    functions: &'a [FunctionNode],
    n: usize,
) -> Result<Vec<&'a [f64]>, PropagationError> {
    let missing = |f| PropagationError::MissingNeighbor {
        node: NodeRef::Variable(id),
        neighbor: NodeRef::Function(f),
    };

    let mut rows = Vec::with_capacity(node.edge_count());
    if let Some(f) = node.input {
        let row = functions
            .get(f.0)
            .filter(|producer| producer.output == id)
            .and_then(|producer| producer.messages.get(..n))
            .ok_or_else(|| missing(f))?;
        rows.push(row);
    }
    for edge in &node.outputs {
        let r = edge.slot + 1;
        let row = functions
            .get(edge.function.0)
            .filter(|consumer| {
                consumer
                    .inputs
                    .get(edge.slot)
                    .is_some_and(|e| e.variable == id)
            })
            .and_then(|consumer| consumer.messages.get(index(r, 0, n)..index(r + 1, 0, n)))
            .ok_or_else(|| missing(edge.function))?;
        rows.push(row);
    }
    Ok(rows)
}

fn non_finite(id: VariableId) -> PropagationError {
    PropagationError::NonFinite(NodeRef::Variable(id))
}

// =============================================================================
// TESTS
// =============================================================================
