//! Sparse iterative linear algebra: Krylov solvers and preconditioners.

pub mod amg;
pub mod backend;
pub mod krylov;
pub mod preconditioner;
pub mod solver;
pub mod sparse;

pub use amg::{AmgConfig, AmgPreconditioner};
pub use backend::{BackendCapabilities, KrylovMethod, NegotiatedMethods, PreconditionerKind};
pub use krylov::{SolveStats, minres, tfqmr};
pub use preconditioner::{JacobiPreconditioner, Preconditioner};
pub use solver::{KrylovSolver, SolverConfig};

use thiserror::Error;

/// Failures of the linear-algebra layer. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("linear-algebra backend is missing a required capability: {0}")]
    Capability(String),

    #[error(
        "{method} did not converge in {iterations} iterations \
         (relative residual {relative_residual:.3e}, tolerance {tolerance:.1e})"
    )]
    NotConverged {
        method: KrylovMethod,
        iterations: usize,
        relative_residual: f64,
        tolerance: f64,
    },

    #[error("{method} broke down at iteration {iteration}: {reason}")]
    Breakdown {
        method: KrylovMethod,
        iteration: usize,
        reason: &'static str,
    },
}
