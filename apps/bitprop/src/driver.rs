//! # Sweep Driver
//!
//! Runs loopy belief propagation over a [`GraphStore`] by calling the core's
//! node updates in a fixed order, one node at a time.
//!
//! A sweep updates every function node and then every variable node, or the
//! reverse under [`Schedule::VariablesFirst`]. After each sweep the driver
//! compares every message with the previous sweep and stops early once the
//! largest change is below the configured tolerance.

use crate::config::{RunConfig, Schedule, UpdateMode};
use bitprop_core::{
    BeliefState, FunctionId, FunctionUpdater, GraphStore, PropagationError, Scratch, VariableId,
    VariableUpdater,
};
use serde::Serialize;

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Sweeps actually performed.
    pub sweeps: usize,
    /// Whether the tolerance was reached before the sweep limit.
    pub converged: bool,
    /// Largest change of any message during the last sweep.
    pub last_delta: f64,
}

pub struct Driver {
    config: RunConfig,
}

impl Driver {
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Validate the graph, then sweep until convergence or the sweep limit.
    ///
    /// The first failing update aborts the run; the graph keeps the state of
    /// every update that succeeded before it.
    pub fn run(&self, graph: &mut GraphStore) -> Result<RunReport, PropagationError> {
        self.config.validate()?;
        graph.validate()?;

        let mut scratch = Scratch::for_graph(graph);
        tracing::debug!("Allocated {} scratch entries", scratch.capacity());
        let mut previous = observe(graph);
        let mut report = RunReport {
            sweeps: 0,
            converged: false,
            last_delta: f64::INFINITY,
        };

        tracing::info!(
            "Starting propagation: {} variables, {} functions, up to {} sweeps ({:?}, {:?})",
            graph.variable_count(),
            graph.function_count(),
            self.config.iterations,
            self.config.mode,
            self.config.schedule
        );

        for sweep in 1..=self.config.iterations {
            self.sweep(graph, &mut scratch)?;
            let current = observe(graph);
            let delta = max_change(&previous, &current);
            previous = current;

            report.sweeps = sweep;
            report.last_delta = delta;
            tracing::debug!("Sweep {}: max change {:e}", sweep, delta);

            if self.config.tolerance > 0.0 && delta < self.config.tolerance {
                report.converged = true;
                break;
            }
        }

        tracing::info!(
            "Propagation finished after {} sweeps (converged: {}, last change {:e})",
            report.sweeps,
            report.converged,
            report.last_delta
        );
        Ok(report)
    }

    /// One sweep over every node, in schedule order.
    pub fn sweep(
        &self,
        graph: &mut GraphStore,
        scratch: &mut Scratch,
    ) -> Result<(), PropagationError> {
        match self.config.schedule {
            Schedule::FunctionsFirst => {
                self.update_functions(graph, scratch)?;
                self.update_variables(graph, scratch)
            }
            Schedule::VariablesFirst => {
                self.update_variables(graph, scratch)?;
                self.update_functions(graph, scratch)
            }
        }
    }

    fn update_functions(
        &self,
        graph: &mut GraphStore,
        scratch: &mut Scratch,
    ) -> Result<(), PropagationError> {
        for f in 0..graph.function_count() {
            let id = FunctionId(f);
            let result = match self.config.mode {
                UpdateMode::Full => FunctionUpdater::update(graph, id, scratch),
                UpdateMode::Information => FunctionUpdater::update_information(graph, id),
            };
            result.inspect_err(|e| tracing::error!("Update of function {} failed: {}", f, e))?;
        }
        Ok(())
    }

    fn update_variables(
        &self,
        graph: &mut GraphStore,
        scratch: &mut Scratch,
    ) -> Result<(), PropagationError> {
        for v in 0..graph.variable_count() {
            let id = VariableId(v);
            let result = match self.config.mode {
                UpdateMode::Full => VariableUpdater::update(graph, id, scratch),
                UpdateMode::Information => VariableUpdater::update_information(graph, id),
            };
            result.inspect_err(|e| tracing::error!("Update of variable {} failed: {}", v, e))?;
        }
        Ok(())
    }
}

/// What can be reported about one variable after a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Linear distribution over the domain.
    Marginal(Vec<f64>),
    /// Probability of value 0, left by information updates.
    Probability(f64),
}

impl Reading {
    /// Read a variable according to what its belief currently holds.
    pub fn of(graph: &GraphStore, id: VariableId) -> Result<Self, PropagationError> {
        match graph.variable(id)?.state() {
            BeliefState::Distribution => graph.marginal(id).map(Self::Marginal),
            BeliefState::Information => graph.probability(id).map(Self::Probability),
        }
    }
}

/// Readings of every variable, in id order.
pub fn readings(graph: &GraphStore) -> Result<Vec<Reading>, PropagationError> {
    (0..graph.variable_count())
        .map(|v| Reading::of(graph, VariableId(v)))
        .collect()
}

/// Every message of every node, variables first.
fn observe(graph: &GraphStore) -> Vec<f64> {
    let variables = graph.variables().iter().flat_map(|v| v.messages().iter().copied());
    let functions = graph.functions().iter().flat_map(|f| f.messages().iter().copied());
    variables.chain(functions).collect()
}

fn max_change(previous: &[f64], current: &[f64]) -> f64 {
    previous
        .iter()
        .zip(current)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitprop_core::{DomainMode, Gate, GraphBuilder};

    /// out = a XOR b with a known and out observed; b is recovered.
    fn recover_key() -> (GraphStore, VariableId) {
        let mut b = GraphBuilder::new(2).expect("builder");
        let a = b
            .add_variable(vec![0.0, 0.0, 1.0, 0.0], DomainMode::Linear)
            .expect("a");
        let key = b.add_uniform_variable(DomainMode::Log);
        let out = b
            .add_variable(vec![0.0, 0.0, 0.0, 1.0], DomainMode::Linear)
            .expect("out");
        b.add_function(Gate::Xor, &[a, key], out).expect("xor");
        (b.build().expect("build"), key)
    }

    #[test]
    fn tree_converges_to_exact_marginal() {
        let (mut graph, key) = recover_key();
        let driver = Driver::new(RunConfig {
            iterations: 10,
            tolerance: 1e-12,
            ..RunConfig::default()
        });
        let report = driver.run(&mut graph).expect("run");
        assert!(report.converged);
        assert!(report.sweeps < 10);

        let marginal = graph.marginal(key).expect("marginal");
        // 2 ^ k == 3  =>  k == 1
        assert!((marginal[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_tolerance_runs_every_sweep() {
        let (mut graph, _) = recover_key();
        let driver = Driver::new(RunConfig {
            iterations: 4,
            schedule: Schedule::VariablesFirst,
            ..RunConfig::default()
        });
        let report = driver.run(&mut graph).expect("run");
        assert_eq!(report.sweeps, 4);
        assert!(!report.converged);
    }

    #[test]
    fn invalid_graph_is_rejected_before_any_sweep() {
        let mut b = GraphBuilder::new(2).expect("builder");
        let x = b.add_uniform_variable(DomainMode::Linear);
        let y = b.add_uniform_variable(DomainMode::Linear);
        let z = b.add_uniform_variable(DomainMode::Linear);
        b.add_function(Gate::Not, &[x, y], z).expect("malformed");
        let mut graph = b.build().expect("build");
        let before = graph.clone();

        assert!(Driver::new(RunConfig::default()).run(&mut graph).is_err());
        assert_eq!(graph, before);
    }

    #[test]
    fn readings_follow_the_update_mode() {
        let (mut graph, key) = recover_key();
        Driver::new(RunConfig {
            iterations: 2,
            ..RunConfig::default()
        })
        .run(&mut graph)
        .expect("full run");
        assert!(matches!(Reading::of(&graph, key), Ok(Reading::Marginal(_))));

        Driver::new(RunConfig {
            iterations: 2,
            mode: UpdateMode::Information,
            ..RunConfig::default()
        })
        .run(&mut graph)
        .expect("information run");
        for reading in readings(&graph).expect("readings") {
            assert!(
                matches!(reading, Reading::Probability(p) if (0.0..=1.0).contains(&p)),
                "{:?}",
                reading
            );
        }
    }

    #[test]
    fn max_change_is_largest_difference() {
        assert_eq!(max_change(&[0.5, 0.5], &[0.25, 0.75]), 0.25);
        assert_eq!(max_change(&[], &[]), 0.0);
    }
}
