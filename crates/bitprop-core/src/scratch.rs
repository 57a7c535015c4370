//! # Scratch Memory
//!
//! Temporary buffers for node updates, allocated once per run and reused by
//! every update call.
//!
//! An update computes into scratch and copies the finished rows into the
//! node only when it succeeds, so nothing partial is ever published. The
//! buffers are plain owned vectors; releasing them is ordinary drop, on
//! every exit path.

use crate::graph::GraphStore;

/// Reusable working memory for variable and function updates.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    /// Running total (log or linear) over all edges.
    pub(crate) total: Vec<f64>,
    /// Per-edge incoming rows in the working domain.
    pub(crate) incoming: Vec<f64>,
    /// Finished outgoing rows, waiting to be published.
    pub(crate) staging: Vec<f64>,
    /// Transform workspace for the XOR kernel.
    pub(crate) transform: Vec<f64>,
}

impl Scratch {
    /// Create scratch memory for updates over `domain_size` symbols with up
    /// to `max_edges` edges per node.
    #[must_use]
    pub fn new(domain_size: usize, max_edges: usize) -> Self {
        let mut scratch = Self::default();
        scratch.reserve(domain_size, max_edges);
        scratch
    }

    /// Create scratch memory large enough for every node of `graph`.
    #[must_use]
    pub fn for_graph(graph: &GraphStore) -> Self {
        let max_variable = graph
            .variables()
            .iter()
            .map(|v| v.edge_count())
            .max()
            .unwrap_or(0);
        let max_function = graph
            .functions()
            .iter()
            .map(|f| f.inputs().len() + 1)
            .max()
            .unwrap_or(0);
        Self::new(graph.domain().size(), max_variable.max(max_function))
    }

    /// Grow the buffers if needed. Never shrinks.
    pub(crate) fn reserve(&mut self, domain_size: usize, rows: usize) {
        grow(&mut self.total, domain_size);
        grow(&mut self.incoming, rows * domain_size);
        grow(&mut self.staging, rows * domain_size);
        grow(&mut self.transform, 3 * domain_size);
    }

    /// Total number of `f64` entries held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.total.len() + self.incoming.len() + self.staging.len() + self.transform.len()
    }
}

fn grow(buf: &mut Vec<f64>, len: usize) {
    if buf.len() < len {
        buf.resize(len, 0.0);
    }
}
