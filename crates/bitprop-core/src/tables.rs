//! # Lookup Table Store
//!
//! Flat storage of precomputed bijections consumed by table-lookup gates.
//!
//! Table `t` maps `x -> table[t][x]` for every domain value `x`. Tables are
//! stored row-major in one buffer, one domain-sized row per id.
//!
//! Only bijections are accepted: the table gate pulls output beliefs back
//! onto its input through the inverse image, which is exact only for a
//! permutation of the domain.

use crate::kernel::index;
use crate::{Domain, NodeRef, PropagationError, TableId};
use serde::{Deserialize, Serialize};

/// Row-major store of domain-sized permutation tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTables {
    /// Row length (the domain size at insertion time).
    width: usize,
    /// All tables, concatenated.
    entries: Vec<u32>,
}

impl LookupTables {
    /// Create an empty store for the given domain.
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        Self {
            width: domain.size(),
            entries: Vec::new(),
        }
    }

    /// Append a table. Returns its id.
    ///
    /// Returns `Configuration` if the table has the wrong length or is not a
    /// permutation of `0..width`.
    pub fn insert(&mut self, values: &[u32]) -> Result<TableId, PropagationError> {
        let id = TableId(self.len());
        check_bijection(values, self.width).map_err(|reason| PropagationError::Configuration {
            node: NodeRef::Table(id),
            reason,
        })?;
        self.entries.extend_from_slice(values);
        Ok(id)
    }

    /// Number of stored tables.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.entries.len() / self.width
        }
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow a whole table row.
    #[must_use]
    pub fn row(&self, id: TableId) -> Option<&[u32]> {
        if id.0 >= self.len() {
            return None;
        }
        let start = index(id.0, 0, self.width);
        Some(&self.entries[start..start + self.width])
    }

    /// Re-check every stored table against the expected domain.
    pub fn validate(&self, domain: Domain) -> Result<(), PropagationError> {
        if !self.entries.is_empty() && self.width != domain.size() {
            return Err(PropagationError::Configuration {
                node: NodeRef::Graph,
                reason: format!(
                    "lookup tables have width {} but domain has {} values",
                    self.width,
                    domain.size()
                ),
            });
        }
        if self.width > 0 && self.entries.len() % self.width != 0 {
            return Err(PropagationError::Configuration {
                node: NodeRef::Graph,
                reason: "lookup table buffer holds a partial row".to_string(),
            });
        }
        for t in 0..self.len() {
            let start = index(t, 0, self.width);
            check_bijection(&self.entries[start..start + self.width], self.width).map_err(
                |reason| PropagationError::Configuration {
                    node: NodeRef::Table(TableId(t)),
                    reason,
                },
            )?;
        }
        Ok(())
    }
}

fn check_bijection(values: &[u32], width: usize) -> Result<(), String> {
    if values.len() != width {
        return Err(format!(
            "table has {} entries, expected {}",
            values.len(),
            width
        ));
    }
    let mut seen = vec![false; width];
    for (x, &y) in values.iter().enumerate() {
        let y = y as usize;
        if y >= width {
            return Err(format!("entry {} maps outside the domain ({})", x, y));
        }
        if seen[y] {
            return Err(format!("value {} appears twice; table is not a bijection", y));
        }
        seen[y] = true;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
