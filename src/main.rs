use anyhow::Result;
use clap::Parser;
use log::info;
use melt3d::io::{VtkSeriesWriter, read_params, write_params};
use melt3d::logging::init_logging;
use melt3d::{Simulation, generate_sphere_mesh};
use std::path::PathBuf;
use std::sync::Arc;

/// Melt migration in a sphere under a straining flow.
#[derive(Parser, Debug)]
#[command(about)]
struct Cli {
    /// JSON parameter file
    param_file: PathBuf,

    /// Override the mesh resolution from the parameter file
    #[arg(short, long)]
    resolution: Option<usize>,

    /// Override the output directory from the parameter file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut params = read_params(&cli.param_file)?;
    if let Some(resolution) = cli.resolution {
        params.resolution = resolution;
    }
    if let Some(dir) = cli.output_dir {
        params.output_dir = dir;
    }
    params.validate()?;

    init_logging(&params.logfile)?;
    info!("Parameters: {:?}", params);

    let mesh = Arc::new(generate_sphere_mesh(params.resolution));
    let sink = VtkSeriesWriter::new(&params.output_dir, mesh.clone())?;
    let output_dir = sink.dir().to_path_buf();
    let params_copy = output_dir.join("params.json");
    write_params(&params_copy, &params)?;
    info!("Effective parameters written to {}", params_copy.display());

    let mut sim = Simulation::new(params, mesh, sink)?;
    let summary = sim.run()?;

    println!(
        "Finished {} steps at t = {}; velocity L2 error {:.3e} (relative {:.3e}); output in {}",
        summary.steps,
        summary.final_time,
        summary.benchmark.l2_error,
        summary.benchmark.relative_l2_error,
        output_dir.display()
    );
    Ok(())
}
