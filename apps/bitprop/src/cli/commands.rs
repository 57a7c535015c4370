//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{RunConfig, Schedule, UpdateMode};
use crate::description::{GraphDescription, LoadedGraph};
use crate::driver::{Driver, Reading, RunReport, readings};
use bitprop_core::{
    GraphStore, PropagationError, VariableId, formats::MAX_SNAPSHOT_PAYLOAD_SIZE,
    graph_from_bytes, graph_to_bytes,
};
use std::path::{Path, PathBuf};

/// How command results are printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

/// Run settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub mode: Option<UpdateMode>,
    pub schedule: Option<Schedule>,
}

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), PropagationError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| PropagationError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(PropagationError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, PropagationError> {
    let canonical = path.canonicalize().map_err(|e| {
        PropagationError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(PropagationError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Canonicalize the parent of an output path; the file itself may not exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, PropagationError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| {
        PropagationError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    if !canonical_parent.is_dir() {
        return Err(PropagationError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }
    let filename = path
        .file_name()
        .ok_or_else(|| PropagationError::IoError("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Propagate over a graph and report the result.
pub fn cmd_run(
    graph_path: &Path,
    snapshot: bool,
    snapshot_out: Option<&Path>,
    config: RunConfig,
    output: Output,
) -> Result<(), PropagationError> {
    let mut loaded = if snapshot {
        LoadedGraph::unnamed(read_snapshot(graph_path)?)
    } else {
        load_description(graph_path)?
    };
    tracing::info!("Loaded graph from {:?}", graph_path);

    let driver = Driver::new(config);
    let mode = driver.config().mode;
    let report = driver.run(&mut loaded.graph)?;

    if let Some(path) = snapshot_out {
        let written = write_snapshot(&loaded.graph, path)?;
        tracing::info!("Wrote {} byte snapshot to {:?}", written, path);
    }

    let results = readings(&loaded.graph)?;
    if output.json {
        let variables: Vec<_> = results
            .iter()
            .enumerate()
            .map(|(v, reading)| reading_json(&loaded.name(VariableId(v)), reading))
            .collect();
        let out = serde_json::json!({
            "report": report,
            "mode": mode,
            "variables": variables,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    print_report(&report);
    println!();
    for (v, reading) in results.iter().enumerate() {
        print_reading(&loaded.name(VariableId(v)), reading);
    }
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Build a description and report its size.
pub fn cmd_validate(graph_path: &Path, output: Output) -> Result<(), PropagationError> {
    let loaded = load_description(graph_path)?;
    let graph = &loaded.graph;

    if output.json {
        let out = serde_json::json!({
            "valid": true,
            "domain_bits": graph.domain().bits(),
            "xor_period": graph.xor_period(),
            "variable_count": graph.variable_count(),
            "function_count": graph.function_count(),
            "edge_count": graph.edge_count(),
            "table_count": graph.tables().len(),
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }
    if !output.quiet {
        println!("Graph is valid");
        print_structure(graph);
    }
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Show a snapshot's structure and per-variable state.
pub fn cmd_inspect(snapshot_path: &Path, output: Output) -> Result<(), PropagationError> {
    let graph = read_snapshot(snapshot_path)?;
    let rows = readings(&graph)?;

    if output.json {
        let functions: Vec<_> = graph
            .functions()
            .iter()
            .map(|f| {
                serde_json::json!({
                    "gate": f.gate().to_string(),
                    "inputs": f.inputs().iter().map(|e| e.variable.0).collect::<Vec<_>>(),
                    "output": f.output().0,
                })
            })
            .collect();
        let variables: Vec<_> = graph
            .variables()
            .iter()
            .zip(&rows)
            .enumerate()
            .map(|(i, (v, reading))| {
                let mut entry = reading_json(&format!("v{}", i), reading);
                entry["mode"] = serde_json::json!(v.mode());
                entry["state"] = serde_json::json!(v.state());
                entry["input"] = serde_json::json!(v.input().map(|f| f.0));
                entry["outputs"] = serde_json::json!(v.outputs().len());
                entry
            })
            .collect();
        let out = serde_json::json!({
            "domain_bits": graph.domain().bits(),
            "xor_period": graph.xor_period(),
            "belief_state": graph.belief_state(),
            "functions": functions,
            "variables": variables,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    println!("Bitprop Snapshot");
    println!("================");
    print_structure(&graph);
    println!("Beliefs:   {:?}", graph.belief_state());
    println!();
    println!("Functions:");
    for (f, node) in graph.functions().iter().enumerate() {
        let inputs: Vec<String> = node
            .inputs()
            .iter()
            .map(|e| format!("v{}", e.variable.0))
            .collect();
        println!(
            "  f{:<4} v{} = {}({})",
            f,
            node.output().0,
            node.gate(),
            inputs.join(", ")
        );
    }
    println!();
    println!("Variables:");
    for (v, reading) in rows.iter().enumerate() {
        print_reading(&format!("v{}", v), reading);
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Merge the configuration file (if any) with command-line overrides.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &RunOverrides,
) -> Result<RunConfig, PropagationError> {
    let mut config = match path {
        Some(p) => RunConfig::load(&validate_file_path(p)?)?,
        None => RunConfig::default(),
    };
    if let Some(iterations) = overrides.iterations {
        config.iterations = iterations;
    }
    if let Some(tolerance) = overrides.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(mode) = overrides.mode {
        config.mode = mode;
    }
    if let Some(schedule) = overrides.schedule {
        config.schedule = schedule;
    }
    config.validate()?;
    Ok(config)
}

/// Load and build a JSON graph description.
pub fn load_description(path: &Path) -> Result<LoadedGraph, PropagationError> {
    let validated = validate_file_path(path)?;
    GraphDescription::load(&validated)?.build()
}

/// Read and decode a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<GraphStore, PropagationError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_SNAPSHOT_PAYLOAD_SIZE as u64)?;
    let data = std::fs::read(&validated)
        .map_err(|e| PropagationError::IoError(format!("Read file: {}", e)))?;
    graph_from_bytes(&data)
}

/// Encode and write a snapshot file. Returns the number of bytes written.
pub fn write_snapshot(graph: &GraphStore, path: &Path) -> Result<usize, PropagationError> {
    let validated = validate_output_path(path)?;
    let data = graph_to_bytes(graph)?;
    std::fs::write(&validated, &data)
        .map_err(|e| PropagationError::IoError(format!("Write file: {}", e)))?;
    Ok(data.len())
}

fn reading_json(name: &str, reading: &Reading) -> serde_json::Value {
    match reading {
        Reading::Marginal(marginal) => serde_json::json!({
            "name": name,
            "marginal": marginal,
        }),
        Reading::Probability(p) => serde_json::json!({
            "name": name,
            "probability": p,
        }),
    }
}

fn print_reading(name: &str, reading: &Reading) {
    match reading {
        Reading::Marginal(marginal) => {
            let (best, p) = argmax(marginal);
            println!("  {:<16} most likely {:#x} (p = {:.6})", name, best, p);
        }
        Reading::Probability(p) => println!("  {:<16} P(0) = {:.6}", name, p),
    }
}

fn argmax(v: &[f64]) -> (usize, f64) {
    v.iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
}

fn print_report(report: &RunReport) {
    println!("Bitprop Run");
    println!("===========");
    println!("Sweeps:      {}", report.sweeps);
    println!("Converged:   {}", report.converged);
    println!("Last change: {:e}", report.last_delta);
}

fn print_structure(graph: &GraphStore) {
    println!("Domain:    {} bits", graph.domain().bits());
    println!("XOR period: {}", graph.xor_period());
    println!("Variables: {}", graph.variable_count());
    println!("Functions: {}", graph.function_count());
    println!("Edges:     {}", graph.edge_count());
    println!("Tables:    {}", graph.tables().len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.6, 0.3]), (1, 0.6));
        assert_eq!(argmax(&[0.5, 0.5]), (0, 0.5));
    }

    #[test]
    fn reading_json_names_the_quantity() {
        let marginal = reading_json("k", &Reading::Marginal(vec![0.25, 0.75]));
        assert_eq!(marginal["name"], "k");
        assert_eq!(marginal["marginal"][1], 0.75);
        assert!(marginal.get("probability").is_none());

        let scalar = reading_json("k", &Reading::Probability(0.4));
        assert_eq!(scalar["probability"], 0.4);
        assert!(scalar.get("marginal").is_none());
    }

    #[test]
    fn overrides_win_over_defaults() {
        let overrides = RunOverrides {
            iterations: Some(3),
            mode: Some(UpdateMode::Information),
            ..RunOverrides::default()
        };
        let config = resolve_config(None, &overrides).expect("config");
        assert_eq!(config.iterations, 3);
        assert_eq!(config.mode, UpdateMode::Information);
        assert_eq!(config.schedule, Schedule::FunctionsFirst);
    }

    #[test]
    fn zero_iterations_override_rejected() {
        let overrides = RunOverrides {
            iterations: Some(0),
            ..RunOverrides::default()
        };
        assert!(resolve_config(None, &overrides).is_err());
    }
}
