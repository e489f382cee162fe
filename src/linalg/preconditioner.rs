use crate::linalg::sparse::diagonal;
use sprs::CsMat;

/// Approximate inverse `z = M^-1 r`, assumed symmetric positive definite.
pub trait Preconditioner: Send + Sync {
    fn apply(&self, r: &[f64], z: &mut [f64]);

    fn name(&self) -> &'static str;
}

/// Diagonal scaling. Zero diagonal entries are left unscaled.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    pub fn from_matrix(matrix: &CsMat<f64>) -> Self {
        Self {
            inv_diag: inverse_diagonal(matrix),
        }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        for ((zi, &ri), &d) in z.iter_mut().zip(r.iter()).zip(self.inv_diag.iter()) {
            *zi = d * ri;
        }
    }

    fn name(&self) -> &'static str {
        "jacobi"
    }
}

/// Reciprocal of `|a_ii|`, or 1 where the diagonal vanishes.
pub(crate) fn inverse_diagonal(matrix: &CsMat<f64>) -> Vec<f64> {
    diagonal(matrix)
        .into_iter()
        .map(|d| if d.abs() > 0.0 { 1.0 / d.abs() } else { 1.0 })
        .collect()
}
