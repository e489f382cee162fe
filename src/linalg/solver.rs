use crate::linalg::amg::AmgPreconditioner;
use crate::linalg::backend::{KrylovMethod, PreconditionerKind};
use crate::linalg::krylov::{SolveStats, minres, tfqmr};
use crate::linalg::preconditioner::{JacobiPreconditioner, Preconditioner};
use crate::linalg::SolverError;
use log::debug;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

/// Krylov solver settings for one physics block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub method: KrylovMethod,
    pub preconditioner: PreconditionerKind,
    pub relative_tolerance: f64,
    pub max_iterations: usize,
    /// Start from the contents of `x` instead of zero.
    pub nonzero_initial_guess: bool,
    /// Log the residual of every iteration at debug level.
    pub monitor_convergence: bool,
}

impl SolverConfig {
    /// First flow solve, before any time step.
    pub fn initial_flow(method: KrylovMethod) -> Self {
        Self {
            method,
            preconditioner: PreconditionerKind::Amg,
            relative_tolerance: 1e-6,
            max_iterations: 3000,
            nonzero_initial_guess: false,
            monitor_convergence: false,
        }
    }

    /// Flow solve inside the time loop, warm-started from the previous state.
    pub fn per_step_flow(method: KrylovMethod) -> Self {
        Self {
            max_iterations: 200,
            nonzero_initial_guess: true,
            ..Self::initial_flow(method)
        }
    }

    /// Porosity advection solve, started from the previous porosity.
    pub fn porosity(method: KrylovMethod) -> Self {
        Self {
            nonzero_initial_guess: true,
            monitor_convergence: true,
            ..Self::initial_flow(method)
        }
    }
}

/// Preconditioned Krylov solver for one physics block.
#[derive(Debug, Clone)]
pub struct KrylovSolver {
    config: SolverConfig,
}

impl KrylovSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solves `A x = rhs`, preconditioned from `preconditioner_matrix`.
    ///
    /// `x` holds the initial guess when `nonzero_initial_guess` is set.
    pub fn solve(
        &self,
        system_matrix: &CsMat<f64>,
        preconditioner_matrix: &CsMat<f64>,
        rhs: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats, SolverError> {
        assert_eq!(
            system_matrix.shape(),
            preconditioner_matrix.shape(),
            "system and preconditioner matrices differ in shape"
        );
        let precond: Box<dyn Preconditioner> = match self.config.preconditioner {
            PreconditionerKind::Amg => Box::new(AmgPreconditioner::new(preconditioner_matrix)),
            PreconditionerKind::Jacobi => {
                Box::new(JacobiPreconditioner::from_matrix(preconditioner_matrix))
            }
        };

        let stats = match self.config.method {
            KrylovMethod::Minres => minres(system_matrix, precond.as_ref(), rhs, x, &self.config),
            KrylovMethod::Tfqmr => tfqmr(system_matrix, precond.as_ref(), rhs, x, &self.config),
        }?;
        debug!(
            "{} + {} converged in {} iterations (relative residual {:.3e}, {} unknowns)",
            self.config.method,
            precond.name(),
            stats.iterations,
            stats.relative_residual,
            rhs.len()
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    #[test]
    fn test_block_configs() {
        let initial = SolverConfig::initial_flow(KrylovMethod::Minres);
        let step = SolverConfig::per_step_flow(KrylovMethod::Minres);
        let phi = SolverConfig::porosity(KrylovMethod::Tfqmr);
        assert_eq!(initial.max_iterations, 3000);
        assert_eq!(step.max_iterations, 200);
        assert!(step.nonzero_initial_guess && !initial.nonzero_initial_guess);
        assert_eq!(phi.max_iterations, 3000);
        assert!(phi.monitor_convergence && phi.nonzero_initial_guess);
        assert!([initial, step, phi]
            .iter()
            .all(|c| c.relative_tolerance == 1e-6 && c.preconditioner == PreconditionerKind::Amg));
    }

    #[test]
    fn test_solve_with_jacobi() {
        let n = 50;
        let mut tri = TriMat::new((n, n));
        for i in 0..n {
            tri.add_triplet(i, i, 4.0);
            if i > 0 {
                tri.add_triplet(i, i - 1, -1.0);
                tri.add_triplet(i - 1, i, -1.0);
            }
        }
        let a: CsMat<f64> = tri.to_csr();
        let config = SolverConfig {
            preconditioner: PreconditionerKind::Jacobi,
            ..SolverConfig::initial_flow(KrylovMethod::Minres)
        };
        let mut x = vec![0.0; n];
        let stats = KrylovSolver::new(config)
            .solve(&a, &a, &vec![1.0; n], &mut x)
            .unwrap();
        assert!(stats.iterations > 0 && stats.iterations < 100);
        // Interior rows: 4 - 2 = 2 => x ~ 0.5
        assert!((x[n / 2] - 0.5).abs() < 1e-4);
    }
}
