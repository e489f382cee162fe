//! Melt-flow physics and the operator-split time loop.

pub mod boundary;
pub mod diagnostics;
pub mod forms;
pub mod params;
pub mod stepping;

pub use boundary::{SURFACE_TOLERANCE, straining_flow, straining_flow_bc};
pub use diagnostics::{L2Error, courant_number, velocity_l2_error};
pub use forms::{PorosityForms, StokesForms, mass_conservation, momentum_conservation};
pub use params::{ParamsError, PhysicalParams, SimulationParams};
pub use stepping::{
    AnalyticCoefficients, BenchmarkReport, CoefficientSource, Phase, PorosityState, RunSummary,
    Simulation, StepReport, TimeState, ZeroCoefficients, initial_porosity,
};
