use crate::fem::assembly::LinearSystem;
use sprs::{CsMat, TriMat};

/// Prescribed values on a set of global DOFs.
///
/// Applied symmetrically: constrained rows and columns are removed from the
/// operator, the known values are moved to the right-hand side and an
/// identity row enforces `x_i = g_i`. Symmetric systems stay symmetric,
/// which MINRES relies on.
#[derive(Debug, Clone, Default)]
pub struct DirichletBc {
    dofs: Vec<usize>,
    values: Vec<f64>,
}

impl DirichletBc {
    /// Builds a condition from `(dof, value)` pairs. Duplicate DOFs keep the
    /// first value.
    pub fn new(mut pairs: Vec<(usize, f64)>) -> Self {
        pairs.sort_by_key(|&(d, _)| d);
        pairs.dedup_by_key(|&mut (d, _)| d);
        let (dofs, values) = pairs.into_iter().unzip();
        Self { dofs, values }
    }

    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    fn prescribed(&self, n: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; n];
        for (&d, &v) in self.dofs.iter().zip(self.values.iter()) {
            assert!(d < n, "constrained DOF {d} out of range ({n} DOFs)");
            out[d] = Some(v);
        }
        out
    }

    pub fn apply(&self, system: &LinearSystem) -> LinearSystem {
        let (matrix, rhs) = self.eliminate(&system.matrix, Some(system.rhs.as_slice()));
        LinearSystem { matrix, rhs }
    }

    /// Same elimination as [`DirichletBc::apply`] without a right-hand side.
    pub fn apply_to_matrix(&self, matrix: &CsMat<f64>) -> CsMat<f64> {
        self.eliminate(matrix, None).0
    }

    fn eliminate(&self, matrix: &CsMat<f64>, rhs: Option<&[f64]>) -> (CsMat<f64>, Vec<f64>) {
        assert!(matrix.is_csr(), "Dirichlet elimination expects a CSR matrix");
        let n = matrix.rows();
        let fixed = self.prescribed(n);
        let mut rhs = rhs.map(|r| r.to_vec()).unwrap_or_default();

        let mut tri = TriMat::with_capacity(matrix.shape(), matrix.nnz());
        for (i, row) in matrix.outer_iterator().enumerate() {
            if let Some(gi) = fixed[i] {
                tri.add_triplet(i, i, 1.0);
                if !rhs.is_empty() {
                    rhs[i] = gi;
                }
                continue;
            }
            for (j, &v) in row.iter() {
                match fixed[j] {
                    Some(gj) => {
                        if !rhs.is_empty() {
                            rhs[i] -= v * gj;
                        }
                    }
                    None => tri.add_triplet(i, j, v),
                }
            }
        }
        (tri.to_csr(), rhs)
    }
}
