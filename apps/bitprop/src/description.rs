//! # Graph Description
//!
//! JSON description of a circuit, turned into a [`GraphStore`] through the
//! core's builder. Variables are referenced by name.
//!
//! ```json
//! {
//!   "domain_bits": 4,
//!   "tables": [[3, 0, 1, 2, 7, 4, 5, 6, 11, 8, 9, 10, 15, 12, 13, 14]],
//!   "variables": [
//!     { "name": "k", "log": true },
//!     { "name": "p", "prior": [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0] },
//!     { "name": "x" },
//!     { "name": "y" }
//!   ],
//!   "functions": [
//!     { "gate": "xor", "inputs": ["k", "p"], "output": "x" },
//!     { "gate": "table", "table": 0, "inputs": ["x"], "output": "y" }
//!   ]
//! }
//! ```

use bitprop_core::{
    DomainMode, Gate, GraphBuilder, GraphStore, NodeRef, PropagationError, TableId, VariableId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Maximum accepted description file size (100 MB).
const MAX_DESCRIPTION_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDescription {
    pub domain_bits: u32,
    /// Repeat period of XOR messages; the domain size when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xor_period: Option<usize>,
    #[serde(default)]
    pub tables: Vec<Vec<u32>>,
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    pub name: String,
    /// Linear-domain prior; uniform when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<Vec<f64>>,
    /// Update this variable in the log domain.
    #[serde(default)]
    pub log: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    #[serde(flatten)]
    pub gate: GateSpec,
    pub inputs: Vec<String>,
    pub output: String,
}

/// Gate tag and its parameters, as written in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "kebab-case")]
pub enum GateSpec {
    And,
    Xor,
    Not,
    XorConst { offset: u32 },
    RotateLeft { amount: u32 },
    Table { table: usize },
}

impl From<GateSpec> for Gate {
    fn from(spec: GateSpec) -> Self {
        match spec {
            GateSpec::And => Gate::And,
            GateSpec::Xor => Gate::Xor,
            GateSpec::Not => Gate::Not,
            GateSpec::XorConst { offset } => Gate::XorConst { offset },
            GateSpec::RotateLeft { amount } => Gate::RotateLeft { amount },
            GateSpec::Table { table } => Gate::Table {
                table: TableId(table),
            },
        }
    }
}

/// A built graph with the variable names it was described with.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub graph: GraphStore,
    /// Indexed by [`VariableId`].
    pub names: Vec<String>,
}

impl GraphDescription {
    pub fn from_json_str(text: &str) -> Result<Self, PropagationError> {
        serde_json::from_str(text).map_err(|e| {
            PropagationError::DeserializationError(format!("Invalid graph description: {}", e))
        })
    }

    /// Read and parse a JSON description file.
    pub fn load(path: &Path) -> Result<Self, PropagationError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            PropagationError::IoError(format!("Cannot read file metadata: {}", e))
        })?;
        if metadata.len() > MAX_DESCRIPTION_FILE_SIZE {
            return Err(PropagationError::IoError(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_DESCRIPTION_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| PropagationError::IoError(format!("Read file: {}", e)))?;
        Self::from_json_str(&text)
    }

    /// Build and validate the described graph.
    pub fn build(&self) -> Result<LoadedGraph, PropagationError> {
        let mut builder = GraphBuilder::new(self.domain_bits)?;
        if let Some(period) = self.xor_period {
            builder = builder.xor_period(period)?;
        }
        for table in &self.tables {
            builder.add_table(table)?;
        }

        let mut ids: BTreeMap<&str, VariableId> = BTreeMap::new();
        let mut names = Vec::with_capacity(self.variables.len());
        for spec in &self.variables {
            let mode = if spec.log {
                DomainMode::Log
            } else {
                DomainMode::Linear
            };
            let id = match &spec.prior {
                Some(prior) => builder.add_variable(prior.clone(), mode)?,
                None => builder.add_uniform_variable(mode),
            };
            if ids.insert(spec.name.as_str(), id).is_some() {
                return Err(description_error(format!(
                    "variable '{}' is declared twice",
                    spec.name
                )));
            }
            names.push(spec.name.clone());
        }

        let resolve = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| description_error(format!("unknown variable '{}'", name)))
        };
        for spec in &self.functions {
            let inputs = spec
                .inputs
                .iter()
                .map(|name| resolve(name))
                .collect::<Result<Vec<_>, _>>()?;
            let output = resolve(&spec.output)?;
            builder.add_function(spec.gate.into(), &inputs, output)?;
        }

        let graph = builder.build()?;
        graph.validate()?;
        Ok(LoadedGraph { graph, names })
    }
}

impl LoadedGraph {
    /// Wrap a graph that carries no names (a snapshot); variables are
    /// named by index.
    #[must_use]
    pub fn unnamed(graph: GraphStore) -> Self {
        let names = (0..graph.variable_count()).map(|v| format!("v{}", v)).collect();
        Self { graph, names }
    }

    /// Name of a variable, or its index when out of range.
    #[must_use]
    pub fn name(&self, id: VariableId) -> String {
        self.names
            .get(id.0)
            .cloned()
            .unwrap_or_else(|| format!("v{}", id.0))
    }
}

fn description_error(reason: String) -> PropagationError {
    PropagationError::Configuration {
        node: NodeRef::Graph,
        reason,
    }
}
