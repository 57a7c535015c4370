//! # Core Type Definitions
//!
//! This module contains all core types for the propagation core:
//! - Node and table identifiers (`VariableId`, `FunctionId`, `TableId`, `NodeRef`)
//! - The symbol domain (`Domain`)
//! - Variable update mode (`DomainMode`)
//! - Gate kinds with their parameters (`Gate`)
//! - Error types (`PropagationError`)
//!
//! ## Addressing
//!
//! Identifiers are plain indices into the arrays owned by the
//! [`GraphStore`](crate::GraphStore). Updates never traverse the graph; they
//! resolve neighbors through these stored indices only.

use crate::primitives::MAX_DOMAIN_BITS;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Index of a variable node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(pub usize);

/// Index of a function (gate) node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub usize);

/// Index of a lookup table in the table store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub usize);

/// A reference to any addressable element of the graph, used in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    /// The graph as a whole (domain, tiling period).
    Graph,
    Variable(VariableId),
    Function(FunctionId),
    Table(TableId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Graph => write!(f, "graph"),
            NodeRef::Variable(id) => write!(f, "variable {}", id.0),
            NodeRef::Function(id) => write!(f, "function {}", id.0),
            NodeRef::Table(id) => write!(f, "table {}", id.0),
        }
    }
}

// =============================================================================
// DOMAIN
// =============================================================================

/// The global symbol domain shared by every variable of a graph.
///
/// A domain of `bits` bits ranges over `0..2^bits`. Power-of-two sizes are
/// required by the Walsh-Hadamard XOR kernel and by bitwise gates.
///
/// Deserialization goes through [`Domain::new`], so a decoded domain is
/// always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Domain {
    bits: u32,
}

impl Domain {
    /// Create a domain of the given bit width (`1..=MAX_DOMAIN_BITS`).
    pub fn new(bits: u32) -> Result<Self, PropagationError> {
        if bits == 0 || bits > MAX_DOMAIN_BITS {
            return Err(PropagationError::Configuration {
                node: NodeRef::Graph,
                reason: format!("domain width {} outside 1..={}", bits, MAX_DOMAIN_BITS),
            });
        }
        Ok(Self { bits })
    }

    /// Width of a symbol in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.bits
    }

    /// Number of symbol values (`Nk`).
    #[must_use]
    pub const fn size(self) -> usize {
        1usize << self.bits
    }

    /// Bit mask selecting a symbol's bits.
    #[must_use]
    pub const fn mask(self) -> u32 {
        ((1u64 << self.bits) - 1) as u32
    }
}

impl TryFrom<u32> for Domain {
    type Error = PropagationError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::new(bits)
    }
}

impl From<Domain> for u32 {
    fn from(domain: Domain) -> Self {
        domain.bits
    }
}

// =============================================================================
// DOMAIN MODE
// =============================================================================

/// Update algorithm used by a variable node. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DomainMode {
    /// Additive sum-product in log10 space with max-shift stabilization.
    #[default]
    Log,
    /// Multiplicative sum-product on linear probabilities.
    Linear,
}

/// What a variable's belief currently holds.
///
/// Full updates write a distribution (log-shifted or linear, per
/// [`DomainMode`]). Information updates overwrite only entry 0 with a
/// single event probability, which leaves the rest of the vector stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BeliefState {
    #[default]
    Distribution,
    Information,
}

impl BeliefState {
    /// Byte tag used in snapshot headers.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Distribution => 0,
            Self::Information => 1,
        }
    }

    /// Inverse of [`BeliefState::tag`].
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Distribution),
            1 => Some(Self::Information),
            _ => None,
        }
    }
}

// =============================================================================
// GATES
// =============================================================================

/// Operation performed by a function node, with its constant parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    /// Bitwise AND of two inputs.
    And,
    /// Bitwise XOR of two inputs.
    Xor,
    /// Bitwise complement of one input, masked to the domain width.
    Not,
    /// XOR of one input with a public constant.
    XorConst { offset: u32 },
    /// Left rotation of one input by a constant amount.
    RotateLeft { amount: u32 },
    /// Bijective table lookup of one input.
    Table { table: TableId },
}

impl Gate {
    /// Short lowercase name of the gate kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Gate::And => "and",
            Gate::Xor => "xor",
            Gate::Not => "not",
            Gate::XorConst { .. } => "xor-const",
            Gate::RotateLeft { .. } => "rotate-left",
            Gate::Table { .. } => "table",
        }
    }

    /// Number of inputs this gate kind operates on.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Gate::And | Gate::Xor => 2,
            Gate::Not | Gate::XorConst { .. } | Gate::RotateLeft { .. } | Gate::Table { .. } => 1,
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::XorConst { offset } => write!(f, "xor-const({:#x})", offset),
            Gate::RotateLeft { amount } => write!(f, "rotate-left({})", amount),
            Gate::Table { table } => write!(f, "table({})", table.0),
            other => f.write_str(other.name()),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the propagation core.
///
/// - No silent failures
/// - Use `Result<T, PropagationError>` for fallible operations
/// - An update that returns an error has published nothing
#[derive(Debug, Error)]
pub enum PropagationError {
    /// The graph describes an unsupported gate, arity or parameter.
    #[error("Configuration error at {node}: {reason}")]
    Configuration { node: NodeRef, reason: String },

    /// The requested node or table does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeRef),

    /// An expected neighbor index is absent or does not point back.
    #[error("Missing neighbor of {node}: {neighbor}")]
    MissingNeighbor { node: NodeRef, neighbor: NodeRef },

    /// A produced vector holds NaN or infinite values.
    #[error("Non-finite values produced at {0}")]
    NonFinite(NodeRef),

    /// A prior distribution is malformed.
    #[error("Invalid prior for {0:?}: {1}")]
    InvalidPrior(VariableId, String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl PropagationError {
    /// Shorthand for a configuration error on a function node.
    pub(crate) fn gate(function: FunctionId, reason: impl Into<String>) -> Self {
        Self::Configuration {
            node: NodeRef::Function(function),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
