//! JSON parameter files.

use crate::sim::params::SimulationParams;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads and validates a parameter file.
///
/// # Example
/// ```no_run
/// use melt3d::io::read_params;
/// use std::path::Path;
///
/// let params = read_params(Path::new("params/sphere.json")).unwrap();
/// println!("End time: {}", params.end_time);
/// ```
pub fn read_params(path: &Path) -> Result<SimulationParams> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open parameter file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let params: SimulationParams = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse parameters from: {}", path.display()))?;
    params
        .validate()
        .with_context(|| format!("Invalid parameters in: {}", path.display()))?;

    Ok(params)
}

/// Parses and validates parameters from a JSON string.
pub fn parse_params(json: &str) -> Result<SimulationParams> {
    let params: SimulationParams =
        serde_json::from_str(json).context("Failed to parse parameters from JSON")?;
    params.validate()?;
    Ok(params)
}

/// Writes parameters as pretty JSON. The binary stores the effective
/// parameters of a run in its output directory.
pub fn write_params(path: &Path, params: &SimulationParams) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, params)
        .with_context(|| format!("Failed to serialize parameters to: {}", path.display()))?;
    Ok(())
}
