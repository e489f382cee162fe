//! Operator-split time loop.
//!
//! Each step advects the porosity with the velocity of the previous step,
//! commits it, and then re-solves the flow at the new porosity:
//!
//! ```text
//! Initializing -> SteadyInitialSolve -> Stepping (repeat) -> Done
//! ```

use crate::Point;
use crate::fem::assembly::{assemble_preconditioner, assemble_system};
use crate::fem::bc::DirichletBc;
use crate::fem::field::{Field, MixedField};
use crate::fem::space::{LagrangeSpace, Spaces, build_spaces};
use crate::geom::mesh::TetrahedralMesh;
use crate::io::sink::{NamedField, OutputSink, OutputTag};
use crate::linalg::backend::BackendCapabilities;
use crate::linalg::solver::{KrylovSolver, SolverConfig};
use crate::sim::boundary::{SURFACE_TOLERANCE, straining_flow, straining_flow_bc};
use crate::sim::diagnostics::{courant_number, velocity_l2_error};
use crate::sim::forms::{mass_conservation, momentum_conservation};
use crate::sim::params::SimulationParams;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;

/// Initial porosity profile.
pub fn initial_porosity(p: Point) -> f64 {
    0.01 + 0.001 * p.x * p.y
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    SteadyInitialSolve,
    Stepping,
    Done,
}

/// Current time, step size and step counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeState {
    pub t: f64,
    pub dt: f64,
    /// 1-based index of the next step.
    pub step: usize,
    pub end_time: f64,
}

impl TimeState {
    pub fn new(end_time: f64, dt: f64) -> Self {
        assert!(end_time > 0.0, "end time must be > 0");
        assert!(dt > 0.0, "time step must be > 0");
        Self {
            t: 0.0,
            dt,
            step: 1,
            end_time,
        }
    }

    /// Round-off allowance when comparing times against `end_time`.
    fn slack(&self) -> f64 {
        1e-12 * self.end_time.abs().max(1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.t >= self.end_time
    }

    /// Shrinks `dt` so that the step ends exactly on `end_time`.
    ///
    /// Returns `true` if `dt` was changed.
    pub fn clamp_step(&mut self) -> bool {
        if self.t + self.dt >= self.end_time - self.slack() {
            let clamped = self.end_time - self.t;
            let changed = clamped != self.dt;
            self.dt = clamped;
            changed
        } else {
            false
        }
    }

    /// Time at the end of the current step. Lands exactly on `end_time`
    /// when within round-off of it.
    pub fn next_time(&self) -> f64 {
        let next = self.t + self.dt;
        if next >= self.end_time - self.slack() {
            self.end_time
        } else {
            next
        }
    }

    pub fn advance(&mut self) {
        self.t = self.next_time();
        self.step += 1;
    }
}

/// Porosity at the previous and the next time level.
#[derive(Debug, Clone)]
pub struct PorosityState {
    prev: Field,
    next: Field,
}

impl PorosityState {
    pub fn new(initial: Field) -> Self {
        Self {
            next: initial.clone(),
            prev: initial,
        }
    }

    /// Accepted porosity, used by the flow solve.
    pub fn current(&self) -> &Field {
        &self.prev
    }

    /// Latest advection result, not yet committed.
    pub fn next(&self) -> &Field {
        &self.next
    }

    pub fn set_next(&mut self, field: Field) {
        assert!(
            field.space().is_compatible(self.prev.space()),
            "advected porosity lives on a different space"
        );
        self.next = field;
    }

    /// `phi_prev <- phi_next`
    pub fn commit(&mut self) {
        self.prev.assign(&self.next);
    }
}

/// Supplies the melting rate and buoyancy fields, re-read every step.
pub trait CoefficientSource {
    fn melting_rate(&mut self, space: &Arc<LagrangeSpace>, t: f64) -> Field;

    fn buoyancy(&mut self, space: &Arc<LagrangeSpace>, t: f64) -> Field;
}

/// No melting and no buoyancy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCoefficients;

impl CoefficientSource for ZeroCoefficients {
    fn melting_rate(&mut self, space: &Arc<LagrangeSpace>, _t: f64) -> Field {
        Field::zeros(space.clone())
    }

    fn buoyancy(&mut self, space: &Arc<LagrangeSpace>, _t: f64) -> Field {
        Field::zeros(space.clone())
    }
}

/// Coefficients given as functions of position and time.
pub struct AnalyticCoefficients<G, B> {
    pub melting_rate: G,
    pub buoyancy: B,
}

impl<G, B> CoefficientSource for AnalyticCoefficients<G, B>
where
    G: Fn(Point, f64) -> f64,
    B: Fn(Point, f64) -> f64,
{
    fn melting_rate(&mut self, space: &Arc<LagrangeSpace>, t: f64) -> Field {
        Field::interpolate(space.clone(), |p| (self.melting_rate)(p, t))
    }

    fn buoyancy(&mut self, space: &Arc<LagrangeSpace>, t: f64) -> Field {
        Field::interpolate(space.clone(), |p| (self.buoyancy)(p, t))
    }
}

/// Result of the initial flow solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkReport {
    pub iterations: usize,
    /// L2 error of the velocity against the straining flow.
    pub l2_error: f64,
    pub relative_l2_error: f64,
}

/// What happened in one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub t_before: f64,
    pub t_after: f64,
    /// Effective step size (after clamping).
    pub dt: f64,
    pub clamped: bool,
    pub porosity_iterations: usize,
    pub flow_iterations: usize,
    pub courant: f64,
    /// Mean of the advection result.
    pub advected_porosity_mean: f64,
    /// Mean of the porosity the flow system was assembled with.
    pub flow_porosity_mean: f64,
    pub output_written: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub final_time: f64,
    pub benchmark: BenchmarkReport,
    /// Total number of sink writes, initial fields included.
    pub outputs_written: usize,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Owns the whole state of a melt-flow run.
pub struct Simulation<S: OutputSink> {
    params: SimulationParams,
    mesh: Arc<TetrahedralMesh>,
    spaces: Spaces,
    bc: DirichletBc,
    initial_flow_solver: KrylovSolver,
    flow_solver: KrylovSolver,
    porosity_solver: KrylovSolver,
    coefficients: Box<dyn CoefficientSource>,
    sink: S,
    phase: Phase,
    time: TimeState,
    porosity: PorosityState,
    melting_rate: Field,
    buoyancy: Field,
    state: MixedField,
    benchmark: Option<BenchmarkReport>,
    history: Vec<StepReport>,
    outputs_written: usize,
}

impl<S: OutputSink> Simulation<S> {
    /// Zero melting rate and buoyancy on the native backend.
    pub fn new(params: SimulationParams, mesh: Arc<TetrahedralMesh>, sink: S) -> Result<Self> {
        Self::with_backend(
            params,
            mesh,
            sink,
            Box::new(ZeroCoefficients),
            &BackendCapabilities::native(),
        )
    }

    pub fn with_coefficients(
        params: SimulationParams,
        mesh: Arc<TetrahedralMesh>,
        sink: S,
        coefficients: Box<dyn CoefficientSource>,
    ) -> Result<Self> {
        Self::with_backend(
            params,
            mesh,
            sink,
            coefficients,
            &BackendCapabilities::native(),
        )
    }

    /// Runs the `Initializing` phase: capability check, spaces, boundary
    /// condition, initial fields and their one-off output.
    pub fn with_backend(
        params: SimulationParams,
        mesh: Arc<TetrahedralMesh>,
        sink: S,
        mut coefficients: Box<dyn CoefficientSource>,
        capabilities: &BackendCapabilities,
    ) -> Result<Self> {
        params.validate()?;
        let methods = capabilities
            .negotiate()
            .context("Linear-algebra backend check failed")?;

        let spaces = build_spaces(mesh.clone());
        let bc = straining_flow_bc(&spaces.mixed, &mesh, SURFACE_TOLERANCE);
        info!(
            "Mesh: {} vertices, {} tetrahedra; flow DOFs: {}, porosity DOFs: {}, constrained: {}",
            mesh.vertex_count(),
            mesh.tetrahedra_count(),
            spaces.mixed.dimension(),
            spaces.porosity.dimension(),
            bc.len()
        );

        let porosity = PorosityState::new(Field::interpolate(
            spaces.porosity.clone(),
            initial_porosity,
        ));
        let melting_rate = coefficients.melting_rate(&spaces.melting_rate, 0.0);
        let buoyancy = coefficients.buoyancy(&spaces.buoyancy, 0.0);
        let state = MixedField::zeros(spaces.mixed.clone());
        let time = TimeState::new(params.end_time, params.dt);

        let mut sim = Self {
            initial_flow_solver: KrylovSolver::new(SolverConfig::initial_flow(methods.flow)),
            flow_solver: KrylovSolver::new(SolverConfig::per_step_flow(methods.flow)),
            porosity_solver: KrylovSolver::new(SolverConfig::porosity(methods.transport)),
            params,
            mesh,
            spaces,
            bc,
            coefficients,
            sink,
            phase: Phase::Initializing,
            time,
            porosity,
            melting_rate,
            buoyancy,
            state,
            benchmark: None,
            history: Vec::new(),
            outputs_written: 0,
        };

        let tag = OutputTag { step: 0, time: 0.0 };
        let initial = [
            ("initial_porosity", sim.porosity.current().clone()),
            ("gamma", sim.melting_rate.clone()),
            ("buoyancy", sim.buoyancy.clone()),
        ];
        for (series, field) in initial {
            sim.write_scalar(series, &field, tag)?;
        }

        sim.phase = Phase::SteadyInitialSolve;
        Ok(sim)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time(&self) -> &TimeState {
        &self.time
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn mesh(&self) -> &Arc<TetrahedralMesh> {
        &self.mesh
    }

    pub fn spaces(&self) -> &Spaces {
        &self.spaces
    }

    pub fn state(&self) -> &MixedField {
        &self.state
    }

    pub fn porosity(&self) -> &PorosityState {
        &self.porosity
    }

    pub fn history(&self) -> &[StepReport] {
        &self.history
    }

    pub fn benchmark(&self) -> Option<&BenchmarkReport> {
        self.benchmark.as_ref()
    }

    /// Settings of the per-step flow solve.
    pub fn flow_solver_config(&self) -> &SolverConfig {
        self.flow_solver.config()
    }

    /// Replaces the settings of the per-step flow solve.
    pub fn set_flow_solver_config(&mut self, config: SolverConfig) {
        self.flow_solver = KrylovSolver::new(config);
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Assembles and solves the flow system at the accepted porosity.
    fn solve_flow(&self, solver: &KrylovSolver) -> Result<(MixedField, usize)> {
        let mixed = self.spaces.mixed.as_ref();
        let forms = momentum_conservation(
            mixed,
            &self.params.physics,
            self.porosity.current(),
            &self.melting_rate,
            &self.buoyancy,
        );
        let system = assemble_system(&forms.a, &forms.l, Some(&self.bc));
        let precond = assemble_preconditioner(&forms.b, Some(&self.bc));

        let mut x = self.state.values().to_vec();
        let stats = solver
            .solve(&system.matrix, &precond, &system.rhs, &mut x)
            .with_context(|| format!("Flow solve failed at t = {}", self.time.t))?;
        Ok((MixedField::from_values(self.spaces.mixed.clone(), x), stats.iterations))
    }

    /// Assembles and solves the porosity transport over the current `dt`.
    fn advect_porosity(&self) -> Result<(Field, usize)> {
        let space = &self.spaces.porosity;
        let forms = mass_conservation(
            space,
            &self.params.physics,
            self.state.velocity(),
            self.porosity.current(),
            &self.melting_rate,
            self.time.dt,
        );
        let system = assemble_system(&forms.a, &forms.l, None);
        let precond = assemble_preconditioner(&forms.b, None);

        let mut x = self.porosity.current().values().to_vec();
        let stats = self
            .porosity_solver
            .solve(&system.matrix, &precond, &system.rhs, &mut x)
            .with_context(|| format!("Porosity solve failed at t = {}", self.time.t))?;
        Ok((Field::from_values(space.clone(), x), stats.iterations))
    }

    /// Runs the `SteadyInitialSolve` phase.
    pub fn initial_solve(&mut self) -> Result<BenchmarkReport> {
        assert_eq!(
            self.phase,
            Phase::SteadyInitialSolve,
            "initial solve must run exactly once, before stepping"
        );
        let (state, iterations) = self.solve_flow(&self.initial_flow_solver)?;
        self.state = state;

        let err = velocity_l2_error(&self.state.velocity(), straining_flow);
        info!(
            "Initial flow solve: {} iterations, velocity L2 error {:.3e} (relative {:.3e})",
            iterations, err.absolute, err.relative
        );
        let report = BenchmarkReport {
            iterations,
            l2_error: err.absolute,
            relative_l2_error: err.relative,
        };
        self.benchmark = Some(report);
        self.phase = if self.time.is_finished() {
            Phase::Done
        } else {
            Phase::Stepping
        };
        Ok(report)
    }

    /// Runs one iteration of the `Stepping` phase.
    pub fn step(&mut self) -> Result<StepReport> {
        assert_eq!(self.phase, Phase::Stepping, "step called outside the stepping phase");

        let clamped = self.time.clamp_step();
        let t_before = self.time.t;
        let dt = self.time.dt;
        let step = self.time.step;
        info!("t = {t_before}: Solve phi and U (step {step}, dt = {dt})");

        self.melting_rate = self
            .coefficients
            .melting_rate(&self.spaces.melting_rate, t_before);
        self.buoyancy = self.coefficients.buoyancy(&self.spaces.buoyancy, t_before);

        let courant = courant_number(&self.state.velocity(), dt);
        if courant > self.params.cfl {
            warn!(
                "Courant number {courant:.3} exceeds cfl = {} at t = {t_before}",
                self.params.cfl
            );
        }

        let (phi_next, porosity_iterations) = self.advect_porosity()?;
        let advected_porosity_mean = mean(phi_next.values());
        self.porosity.set_next(phi_next);
        self.porosity.commit();

        let flow_porosity_mean = mean(self.porosity.current().values());
        let (state, flow_iterations) = self.solve_flow(&self.flow_solver)?;
        self.state = state;

        let output_written = step % self.params.out_freq == 0;
        if output_written {
            self.write_state(OutputTag {
                step,
                time: self.time.next_time(),
            })?;
        }
        self.time.advance();

        debug!(
            "Step {step}: porosity {porosity_iterations} it, flow {flow_iterations} it, \
             mean porosity {flow_porosity_mean:.6e}, Courant {courant:.3e}"
        );
        info!("New time step dt = {}", self.time.dt);
        info!("New time t = {}", self.time.t);

        let report = StepReport {
            step,
            t_before,
            t_after: self.time.t,
            dt,
            clamped,
            porosity_iterations,
            flow_iterations,
            courant,
            advected_porosity_mean,
            flow_porosity_mean,
            output_written,
        };
        self.history.push(report.clone());
        if self.time.is_finished() {
            self.phase = Phase::Done;
        }
        Ok(report)
    }

    /// Runs the remaining phases to completion.
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.phase == Phase::SteadyInitialSolve {
            self.initial_solve()?;
        }
        while self.phase == Phase::Stepping {
            self.step()?;
        }
        let benchmark = self
            .benchmark
            .context("run finished without an initial solve")?;

        let summary = RunSummary {
            steps: self.history.len(),
            final_time: self.time.t,
            benchmark,
            outputs_written: self.outputs_written,
        };
        info!(
            "Done: {} steps, t = {}, {} outputs written",
            summary.steps, summary.final_time, summary.outputs_written
        );
        Ok(summary)
    }

    fn write_scalar(&mut self, series: &str, field: &Field, tag: OutputTag) -> Result<()> {
        let named = NamedField::scalar(series, field.view().vertex_values().to_vec());
        self.write(series, &named, tag)
    }

    fn write(&mut self, series: &str, field: &NamedField, tag: OutputTag) -> Result<()> {
        self.sink
            .write(series, field, tag)
            .with_context(|| format!("Failed to write `{series}` at step {}", tag.step))?;
        self.outputs_written += 1;
        Ok(())
    }

    fn write_state(&mut self, tag: OutputTag) -> Result<()> {
        let fields = [
            NamedField::vector("velocity", self.state.velocity().vertex_vectors()),
            NamedField::scalar("pressure", self.state.pressure().vertex_values().to_vec()),
            NamedField::scalar(
                "compaction",
                self.state.compaction().vertex_values().to_vec(),
            ),
            NamedField::scalar(
                "porosity",
                self.porosity.current().view().vertex_values().to_vec(),
            ),
        ];
        for field in &fields {
            self.write(&field.name, field, tag)?;
        }
        Ok(())
    }
}
