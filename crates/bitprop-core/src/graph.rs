//! # Graph Store
//!
//! Owns the bipartite factor graph: variable nodes, function nodes, the
//! global domain, the lookup tables and every message buffer.
//!
//! ## Layout
//!
//! - A variable's messages hold one domain-sized row per edge: the input
//!   edge first (if the variable has a producer), then its output edges in
//!   order.
//! - A function's messages hold row 0 for the output edge, then one row per
//!   input.
//! - Each edge records a relative slot on both sides: an [`OutputEdge`]
//!   stores the input index inside the consuming function, an [`InputEdge`]
//!   stores the message row inside the variable. The two always agree;
//!   [`GraphBuilder::build`] computes both at once.
//!
//! Topology is immutable once built. Only messages and beliefs change, and
//! only through the node updaters.

use crate::function::check_gate;
use crate::kernel::{self, index};
use crate::primitives::{MAX_FUNCTION_INPUTS, NORMALIZATION_TOLERANCE};
use crate::tables::LookupTables;
use crate::{
    BeliefState, Domain, DomainMode, FunctionId, Gate, NodeRef, PropagationError, TableId,
    VariableId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// EDGES
// =============================================================================

/// Edge from a variable to a function that consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEdge {
    /// The consuming function.
    pub function: FunctionId,
    /// Index of this variable in the function's input list.
    pub slot: usize,
}

/// Edge from a function to one of its input variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEdge {
    /// The input variable.
    pub variable: VariableId,
    /// Row of this edge in the variable's message buffer.
    pub slot: usize,
}

// =============================================================================
// VARIABLE NODE
// =============================================================================

/// One intermediate value of the circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableNode {
    pub(crate) prior: Vec<f64>,
    pub(crate) mode: DomainMode,
    pub(crate) input: Option<FunctionId>,
    pub(crate) outputs: Vec<OutputEdge>,
    pub(crate) messages: Vec<f64>,
    pub(crate) belief: Vec<f64>,
    pub(crate) state: BeliefState,
}

impl VariableNode {
    /// The fixed linear-domain prior.
    #[must_use]
    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    /// Update algorithm selected for this node.
    #[must_use]
    pub fn mode(&self) -> DomainMode {
        self.mode
    }

    /// The function producing this variable, if any.
    #[must_use]
    pub fn input(&self) -> Option<FunctionId> {
        self.input
    }

    /// The functions consuming this variable.
    #[must_use]
    pub fn outputs(&self) -> &[OutputEdge] {
        &self.outputs
    }

    /// Number of edges (input edge included).
    #[must_use]
    pub fn edge_count(&self) -> usize {
        usize::from(self.input.is_some()) + self.outputs.len()
    }

    /// All outgoing messages, row-major.
    #[must_use]
    pub fn messages(&self) -> &[f64] {
        &self.messages
    }

    /// Outgoing message on edge `row`.
    #[must_use]
    pub fn message(&self, row: usize) -> Option<&[f64]> {
        let n = self.prior.len();
        self.messages.get(index(row, 0, n)..index(row + 1, 0, n))
    }

    /// Outgoing message on the `i`-th output edge.
    #[must_use]
    pub fn output_message(&self, i: usize) -> Option<&[f64]> {
        self.message(usize::from(self.input.is_some()) + i)
    }

    /// Whether the belief was last written by a full or an information
    /// update.
    #[must_use]
    pub fn state(&self) -> BeliefState {
        self.state
    }

    /// Current belief.
    ///
    /// In log mode this is the log10 total shifted by its maximum, neither
    /// exponentiated nor normalized. After an information update only entry
    /// 0 is meaningful. Use [`GraphStore::marginal`] or
    /// [`GraphStore::probability`] to read it.
    #[must_use]
    pub fn belief(&self) -> &[f64] {
        &self.belief
    }

    fn reset(&mut self) {
        let n = self.prior.len();
        self.messages.fill(1.0 / n as f64);
        self.state = BeliefState::Distribution;
        match self.mode {
            DomainMode::Linear => self.belief.copy_from_slice(&self.prior),
            DomainMode::Log => {
                kernel::apply_log10(&mut self.belief, &self.prior);
                let m = kernel::max(&self.belief);
                kernel::add_constant(&mut self.belief, -m);
            }
        }
    }
}

// =============================================================================
// FUNCTION NODE
// =============================================================================

/// One gate of the circuit: one or two inputs, exactly one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub(crate) gate: Gate,
    pub(crate) inputs: Vec<InputEdge>,
    pub(crate) output: VariableId,
    pub(crate) messages: Vec<f64>,
}

impl FunctionNode {
    /// The gate kind and its parameters.
    #[must_use]
    pub fn gate(&self) -> Gate {
        self.gate
    }

    /// Input edges in order.
    #[must_use]
    pub fn inputs(&self) -> &[InputEdge] {
        &self.inputs
    }

    /// The variable this gate produces.
    #[must_use]
    pub fn output(&self) -> VariableId {
        self.output
    }

    /// All outgoing messages, row-major (output row first).
    #[must_use]
    pub fn messages(&self) -> &[f64] {
        &self.messages
    }

    fn row(&self, row: usize) -> Option<&[f64]> {
        let rows = self.inputs.len() + 1;
        let n = self.messages.len() / rows;
        self.messages.get(index(row, 0, n)..index(row + 1, 0, n))
    }

    /// Message sent to the output variable.
    #[must_use]
    pub fn output_message(&self) -> Option<&[f64]> {
        self.row(0)
    }

    /// Message sent to input `i`.
    #[must_use]
    pub fn input_message(&self, i: usize) -> Option<&[f64]> {
        if i >= self.inputs.len() {
            return None;
        }
        self.row(i + 1)
    }
}

// =============================================================================
// GRAPH STORE
// =============================================================================

/// The factor graph and all propagation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStore {
    domain: Domain,
    xor_period: usize,
    pub(crate) variables: Vec<VariableNode>,
    pub(crate) functions: Vec<FunctionNode>,
    tables: LookupTables,
}

/// Mutable view of one function node alongside everything it reads.
pub(crate) struct FunctionContext<'a> {
    pub node: &'a mut FunctionNode,
    pub variables: &'a [VariableNode],
    pub tables: &'a LookupTables,
    pub domain: Domain,
    pub xor_period: usize,
}

impl GraphStore {
    /// The global symbol domain.
    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Repeat period of XOR messages (equals the domain size unless tiled).
    #[must_use]
    pub fn xor_period(&self) -> usize {
        self.xor_period
    }

    /// All variable nodes by index.
    #[must_use]
    pub fn variables(&self) -> &[VariableNode] {
        &self.variables
    }

    /// All function nodes by index.
    #[must_use]
    pub fn functions(&self) -> &[FunctionNode] {
        &self.functions
    }

    /// The lookup table store.
    #[must_use]
    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    /// Lookup a variable node.
    pub fn variable(&self, id: VariableId) -> Result<&VariableNode, PropagationError> {
        self.variables
            .get(id.0)
            .ok_or(PropagationError::NodeNotFound(NodeRef::Variable(id)))
    }

    /// Lookup a function node.
    pub fn function(&self, id: FunctionId) -> Result<&FunctionNode, PropagationError> {
        self.functions
            .get(id.0)
            .ok_or(PropagationError::NodeNotFound(NodeRef::Function(id)))
    }

    /// Get the total number of variable nodes.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Get the total number of function nodes.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Get the total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.functions.iter().map(|f| f.inputs.len() + 1).sum()
    }

    /// Information if any variable was last written by an information
    /// update, otherwise distribution.
    #[must_use]
    pub fn belief_state(&self) -> BeliefState {
        if self
            .variables
            .iter()
            .any(|v| v.state == BeliefState::Information)
        {
            BeliefState::Information
        } else {
            BeliefState::Distribution
        }
    }

    /// Linear-domain marginal of a variable.
    ///
    /// Log-mode beliefs are exponentiated and normalized here; the stored
    /// belief is left as it is. A belief written by an information update
    /// has no distribution and is reported as `Configuration`.
    pub fn marginal(&self, id: VariableId) -> Result<Vec<f64>, PropagationError> {
        let node = self.variable(id)?;
        if node.state == BeliefState::Information {
            return Err(PropagationError::Configuration {
                node: NodeRef::Variable(id),
                reason: "belief holds an information-mode probability, not a distribution"
                    .to_string(),
            });
        }
        let mut out = vec![0.0; node.belief.len()];
        match node.mode {
            DomainMode::Log => kernel::apply_pow10(&mut out, &node.belief),
            DomainMode::Linear => out.copy_from_slice(&node.belief),
        }
        kernel::normalize(&mut out, 1.0)
            .map_err(|_| PropagationError::NonFinite(NodeRef::Variable(id)))?;
        Ok(out)
    }

    /// Probability of value 0 for a variable.
    ///
    /// Read directly from an information-mode belief, or from the marginal
    /// of a distribution.
    pub fn probability(&self, id: VariableId) -> Result<f64, PropagationError> {
        let node = self.variable(id)?;
        match node.state {
            BeliefState::Information => Ok(node.belief[0]),
            BeliefState::Distribution => Ok(self.marginal(id)?[0]),
        }
    }

    /// Restore every message to the uniform distribution and every belief to
    /// its prior.
    pub fn reset_messages(&mut self) {
        for v in &mut self.variables {
            v.reset();
        }
        let uniform = 1.0 / self.domain.size() as f64;
        for f in &mut self.functions {
            f.messages.fill(uniform);
        }
    }

    /// Overwrite the message a variable sends on edge `row`.
    pub fn set_variable_message(
        &mut self,
        id: VariableId,
        row: usize,
        values: &[f64],
    ) -> Result<(), PropagationError> {
        let n = self.domain.size();
        let node = self
            .variables
            .get_mut(id.0)
            .ok_or(PropagationError::NodeNotFound(NodeRef::Variable(id)))?;
        let dst = node
            .messages
            .get_mut(index(row, 0, n)..index(row + 1, 0, n))
            .ok_or(PropagationError::Configuration {
                node: NodeRef::Variable(id),
                reason: format!("no message row {}", row),
            })?;
        copy_row(dst, values, NodeRef::Variable(id))
    }

    /// Overwrite the message a function sends on row `row` (0 = output).
    pub fn set_function_message(
        &mut self,
        id: FunctionId,
        row: usize,
        values: &[f64],
    ) -> Result<(), PropagationError> {
        let n = self.domain.size();
        let node = self
            .functions
            .get_mut(id.0)
            .ok_or(PropagationError::NodeNotFound(NodeRef::Function(id)))?;
        let dst = node
            .messages
            .get_mut(index(row, 0, n)..index(row + 1, 0, n))
            .ok_or_else(|| PropagationError::gate(id, format!("no message row {}", row)))?;
        copy_row(dst, values, NodeRef::Function(id))
    }

    pub(crate) fn split_variable(
        &mut self,
        id: VariableId,
    ) -> Result<(&mut VariableNode, &[FunctionNode]), PropagationError> {
        let node = self
            .variables
            .get_mut(id.0)
            .ok_or(PropagationError::NodeNotFound(NodeRef::Variable(id)))?;
        Ok((node, &self.functions))
    }

    pub(crate) fn split_function(
        &mut self,
        id: FunctionId,
    ) -> Result<FunctionContext<'_>, PropagationError> {
        let node = self
            .functions
            .get_mut(id.0)
            .ok_or(PropagationError::NodeNotFound(NodeRef::Function(id)))?;
        Ok(FunctionContext {
            node,
            variables: &self.variables,
            tables: &self.tables,
            domain: self.domain,
            xor_period: self.xor_period,
        })
    }

    /// Check the whole graph: buffer sizes and contents, priors, slot cross
    /// references, gate arities and gate parameters.
    ///
    /// Drivers call this once before a run; updates re-check only what they
    /// touch.
    pub fn validate(&self) -> Result<(), PropagationError> {
        let n = self.domain.size();
        check_xor_period(self.xor_period, self.domain)?;
        self.tables.validate(self.domain)?;

        for (v, node) in self.variables.iter().enumerate() {
            let id = VariableId(v);
            let here = NodeRef::Variable(id);
            check_prior(id, &node.prior, n)?;
            if node.belief.len() != n || node.messages.len() != node.edge_count() * n {
                return Err(PropagationError::Configuration {
                    node: here,
                    reason: "message or belief buffer has the wrong size".to_string(),
                });
            }
            if !kernel::all_finite(&node.messages) || !kernel::all_finite(&node.belief) {
                return Err(PropagationError::NonFinite(here));
            }
            if node.state == BeliefState::Information && !(0.0..=1.0).contains(&node.belief[0]) {
                return Err(PropagationError::Configuration {
                    node: here,
                    reason: format!("information belief {} is not a probability", node.belief[0]),
                });
            }
            if let Some(f) = node.input {
                let producer = self.functions.get(f.0).ok_or(PropagationError::MissingNeighbor {
                    node: here,
                    neighbor: NodeRef::Function(f),
                })?;
                if producer.output != id {
                    return Err(PropagationError::MissingNeighbor {
                        node: here,
                        neighbor: NodeRef::Function(f),
                    });
                }
            }
            let base = usize::from(node.input.is_some());
            for (i, edge) in node.outputs.iter().enumerate() {
                let back = self
                    .functions
                    .get(edge.function.0)
                    .and_then(|f| f.inputs.get(edge.slot));
                if !back.is_some_and(|e| e.variable == id && e.slot == base + i) {
                    return Err(PropagationError::MissingNeighbor {
                        node: here,
                        neighbor: NodeRef::Function(edge.function),
                    });
                }
            }
        }

        for (f, node) in self.functions.iter().enumerate() {
            let id = FunctionId(f);
            let here = NodeRef::Function(id);
            if node.inputs.is_empty() || node.inputs.len() > MAX_FUNCTION_INPUTS {
                return Err(PropagationError::gate(
                    id,
                    format!("{} inputs (expected 1 or 2)", node.inputs.len()),
                ));
            }
            check_gate(id, node.gate, node.inputs.len(), self.domain, &self.tables)?;
            if node.messages.len() != (node.inputs.len() + 1) * n {
                return Err(PropagationError::gate(id, "message buffer has the wrong size"));
            }
            if !kernel::all_finite(&node.messages) {
                return Err(PropagationError::NonFinite(here));
            }
            let output = self.variables.get(node.output.0).ok_or(PropagationError::MissingNeighbor {
                node: here,
                neighbor: NodeRef::Variable(node.output),
            })?;
            if output.input != Some(id) {
                return Err(PropagationError::MissingNeighbor {
                    node: here,
                    neighbor: NodeRef::Variable(node.output),
                });
            }
            for (i, edge) in node.inputs.iter().enumerate() {
                let missing = PropagationError::MissingNeighbor {
                    node: here,
                    neighbor: NodeRef::Variable(edge.variable),
                };
                let var = self.variables.get(edge.variable.0).ok_or(missing)?;
                let base = usize::from(var.input.is_some());
                let back = edge.slot.checked_sub(base).and_then(|k| var.outputs.get(k));
                if !back.is_some_and(|e| e.function == id && e.slot == i) {
                    return Err(PropagationError::MissingNeighbor {
                        node: here,
                        neighbor: NodeRef::Variable(edge.variable),
                    });
                }
            }
        }
        Ok(())
    }
}

fn copy_row(dst: &mut [f64], values: &[f64], node: NodeRef) -> Result<(), PropagationError> {
    if values.len() != dst.len() {
        return Err(PropagationError::Configuration {
            node,
            reason: format!("message has {} entries, expected {}", values.len(), dst.len()),
        });
    }
    if !kernel::all_finite(values) {
        return Err(PropagationError::NonFinite(node));
    }
    dst.copy_from_slice(values);
    Ok(())
}

fn check_prior(id: VariableId, prior: &[f64], n: usize) -> Result<(), PropagationError> {
    if prior.len() != n {
        return Err(PropagationError::InvalidPrior(
            id,
            format!("{} entries, expected {}", prior.len(), n),
        ));
    }
    if prior.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(PropagationError::InvalidPrior(
            id,
            "entries must be finite and non-negative".to_string(),
        ));
    }
    let sum: f64 = prior.iter().sum();
    if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
        return Err(PropagationError::InvalidPrior(
            id,
            format!("sums to {}, expected 1", sum),
        ));
    }
    Ok(())
}

fn check_xor_period(period: usize, domain: Domain) -> Result<(), PropagationError> {
    if period == 0 || !period.is_power_of_two() || period > domain.size() {
        return Err(PropagationError::Configuration {
            node: NodeRef::Graph,
            reason: format!(
                "XOR period {} must be a power of two no larger than {}",
                period,
                domain.size()
            ),
        });
    }
    Ok(())
}

// =============================================================================
// BUILDER
// =============================================================================

#[derive(Debug, Clone)]
struct PendingVariable {
    prior: Vec<f64>,
    mode: DomainMode,
}

#[derive(Debug, Clone)]
struct PendingFunction {
    gate: Gate,
    inputs: Vec<VariableId>,
    output: VariableId,
}

/// Assembles a [`GraphStore`].
///
/// The builder checks node references, priors and producer uniqueness.
/// Gate arity and parameters are checked by [`GraphStore::validate`] and by
/// every function update, so a malformed gate can still be built and will
/// fail when used.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    domain: Domain,
    xor_period: usize,
    tables: LookupTables,
    variables: Vec<PendingVariable>,
    functions: Vec<PendingFunction>,
}

impl GraphBuilder {
    /// Start a graph over a domain of `domain_bits` bits.
    pub fn new(domain_bits: u32) -> Result<Self, PropagationError> {
        let domain = Domain::new(domain_bits)?;
        Ok(Self {
            domain,
            xor_period: domain.size(),
            tables: LookupTables::new(domain),
            variables: Vec::new(),
            functions: Vec::new(),
        })
    }

    /// Set the repeat period of XOR messages.
    pub fn xor_period(mut self, period: usize) -> Result<Self, PropagationError> {
        check_xor_period(period, self.domain)?;
        self.xor_period = period;
        Ok(self)
    }

    /// Register a bijective lookup table.
    pub fn add_table(&mut self, values: &[u32]) -> Result<TableId, PropagationError> {
        self.tables.insert(values)
    }

    /// Add a variable with the given linear-domain prior.
    pub fn add_variable(
        &mut self,
        prior: Vec<f64>,
        mode: DomainMode,
    ) -> Result<VariableId, PropagationError> {
        let id = VariableId(self.variables.len());
        check_prior(id, &prior, self.domain.size())?;
        self.variables.push(PendingVariable { prior, mode });
        Ok(id)
    }

    /// Add a variable with a uniform prior.
    pub fn add_uniform_variable(&mut self, mode: DomainMode) -> VariableId {
        let n = self.domain.size();
        let id = VariableId(self.variables.len());
        self.variables.push(PendingVariable {
            prior: vec![1.0 / n as f64; n],
            mode,
        });
        id
    }

    /// Add a gate producing `output` from `inputs`.
    pub fn add_function(
        &mut self,
        gate: Gate,
        inputs: &[VariableId],
        output: VariableId,
    ) -> Result<FunctionId, PropagationError> {
        let id = FunctionId(self.functions.len());
        if inputs.is_empty() || inputs.len() > MAX_FUNCTION_INPUTS {
            return Err(PropagationError::gate(
                id,
                format!("{} inputs (expected 1 or 2)", inputs.len()),
            ));
        }
        for &v in inputs.iter().chain(std::iter::once(&output)) {
            if v.0 >= self.variables.len() {
                return Err(PropagationError::MissingNeighbor {
                    node: NodeRef::Function(id),
                    neighbor: NodeRef::Variable(v),
                });
            }
        }
        if let Some(existing) = self.functions.iter().position(|f| f.output == output) {
            return Err(PropagationError::Configuration {
                node: NodeRef::Variable(output),
                reason: format!("already produced by function {}", existing),
            });
        }
        self.functions.push(PendingFunction {
            gate,
            inputs: inputs.to_vec(),
            output,
        });
        Ok(id)
    }

    /// Wire both sides of every edge and allocate message buffers.
    ///
    /// All messages start uniform; beliefs start at the prior.
    pub fn build(self) -> Result<GraphStore, PropagationError> {
        let n = self.domain.size();

        let mut producers: Vec<Option<FunctionId>> = vec![None; self.variables.len()];
        for (f, pending) in self.functions.iter().enumerate() {
            producers[pending.output.0] = Some(FunctionId(f));
        }

        let mut outputs: Vec<Vec<OutputEdge>> = vec![Vec::new(); self.variables.len()];
        let mut functions = Vec::with_capacity(self.functions.len());
        for (f, pending) in self.functions.into_iter().enumerate() {
            let mut edges = Vec::with_capacity(pending.inputs.len());
            for (i, &v) in pending.inputs.iter().enumerate() {
                let row = usize::from(producers[v.0].is_some()) + outputs[v.0].len();
                outputs[v.0].push(OutputEdge {
                    function: FunctionId(f),
                    slot: i,
                });
                edges.push(InputEdge {
                    variable: v,
                    slot: row,
                });
            }
            functions.push(FunctionNode {
                gate: pending.gate,
                messages: vec![0.0; (edges.len() + 1) * n],
                inputs: edges,
                output: pending.output,
            });
        }

        let variables = self
            .variables
            .into_iter()
            .zip(producers)
            .zip(outputs)
            .map(|((pending, input), outputs)| {
                let edges = usize::from(input.is_some()) + outputs.len();
                VariableNode {
                    prior: pending.prior,
                    mode: pending.mode,
                    input,
                    outputs,
                    messages: vec![0.0; edges * n],
                    belief: vec![0.0; n],
                    state: BeliefState::Distribution,
                }
            })
            .collect();

        let mut graph = GraphStore {
            domain: self.domain,
            xor_period: self.xor_period,
            variables,
            functions,
            tables: self.tables,
        };
        graph.reset_messages();
        Ok(graph)
    }
}

// =============================================================================
// TESTS
// =============================================================================
