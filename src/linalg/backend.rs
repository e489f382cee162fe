//! Capability negotiation for the linear-algebra backend.

use crate::linalg::SolverError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KrylovMethod {
    /// Minimum residual, for symmetric (possibly indefinite) systems.
    Minres,
    /// Transpose-free quasi-minimal residual, for general systems.
    Tfqmr,
}

impl fmt::Display for KrylovMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KrylovMethod::Minres => write!(f, "MINRES"),
            KrylovMethod::Tfqmr => write!(f, "TFQMR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreconditionerKind {
    Amg,
    Jacobi,
}

impl fmt::Display for PreconditionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionerKind::Amg => write!(f, "AMG"),
            PreconditionerKind::Jacobi => write!(f, "Jacobi"),
        }
    }
}

/// What the backend can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Multi-threaded sparse assembly and mat-vec.
    pub parallel: bool,
    pub preconditioners: Vec<PreconditionerKind>,
    pub methods: Vec<KrylovMethod>,
}

/// Krylov methods chosen for each physics block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedMethods {
    pub flow: KrylovMethod,
    pub transport: KrylovMethod,
}

impl BackendCapabilities {
    /// The in-crate backend: rayon-parallel `sprs` kernels with both
    /// preconditioners and both Krylov methods.
    pub fn native() -> Self {
        Self {
            parallel: rayon::current_num_threads() > 0,
            preconditioners: vec![PreconditionerKind::Amg, PreconditionerKind::Jacobi],
            methods: vec![KrylovMethod::Minres, KrylovMethod::Tfqmr],
        }
    }

    pub fn supports(&self, method: KrylovMethod) -> bool {
        self.methods.contains(&method)
    }

    /// Checks the startup requirements and picks the Krylov methods.
    ///
    /// The flow system prefers MINRES and falls back to TFQMR. The
    /// nonsymmetric transport system prefers TFQMR.
    pub fn negotiate(&self) -> Result<NegotiatedMethods, SolverError> {
        if !self.parallel {
            return Err(SolverError::Capability(
                "no parallel sparse linear-algebra implementation".to_string(),
            ));
        }
        if !self.preconditioners.contains(&PreconditionerKind::Amg) {
            return Err(SolverError::Capability(
                "no algebraic multigrid preconditioner".to_string(),
            ));
        }

        let flow = if self.supports(KrylovMethod::Minres) {
            KrylovMethod::Minres
        } else if self.supports(KrylovMethod::Tfqmr) {
            KrylovMethod::Tfqmr
        } else {
            return Err(SolverError::Capability(
                "neither MINRES nor TFQMR is available".to_string(),
            ));
        };
        let transport = if self.supports(KrylovMethod::Tfqmr) {
            KrylovMethod::Tfqmr
        } else {
            warn!("TFQMR unavailable, porosity transport falls back to {flow}");
            flow
        };

        info!(
            "Linear algebra: {} threads, flow solver {flow}, transport solver {transport}, AMG preconditioning",
            rayon::current_num_threads()
        );
        Ok(NegotiatedMethods { flow, transport })
    }
}
