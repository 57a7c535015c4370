//! # bitprop-core
//!
//! Loopy belief propagation over factor graphs of bitwise circuits.
//!
//! Variable nodes hold distributions over a `2^bits`-value domain. Function
//! nodes are gates (AND, XOR, NOT, XOR with a constant, left rotation, and
//! table lookup) that exchange messages with the variables they connect.
//! This crate provides the per-node update rules. Iteration order and
//! convergence are left to the caller.
//!
//! ## Layout
//!
//! - `graph`: node storage, the builder, and topology validation
//! - `variable` / `function`: the update rules
//! - `kernel`: vector arithmetic, Walsh-Hadamard transform, AND convolution
//! - `formats`: binary snapshots
//!
//! Pure Rust: no I/O, no async, no logging.

// =============================================================================
// MODULES
// =============================================================================

pub mod formats;
pub mod function;
pub mod graph;
pub mod kernel;
pub mod primitives;
pub mod scratch;
pub mod tables;
pub mod types;
pub mod variable;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    BeliefState, Domain, DomainMode, FunctionId, Gate, NodeRef, PropagationError, TableId,
    VariableId,
};

// =============================================================================
// RE-EXPORTS: Graph and Updates
// =============================================================================

pub use function::FunctionUpdater;
pub use graph::{FunctionNode, GraphBuilder, GraphStore, InputEdge, OutputEdge, VariableNode};
pub use scratch::Scratch;
pub use tables::LookupTables;
pub use variable::VariableUpdater;

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{SnapshotHeader, graph_from_bytes, graph_to_bytes, read_header};
