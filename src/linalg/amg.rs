//! Smoothed-aggregation algebraic multigrid.
//!
//! The hierarchy is built from a symmetric positive definite matrix (the
//! auxiliary preconditioner form, not the indefinite system). One V-cycle
//! with damped Jacobi smoothing and an exact dense solve on the coarsest
//! level is applied per preconditioner call. Pre- and post-smoothing are
//! identical, so the cycle is a symmetric operator.

use crate::linalg::preconditioner::{Preconditioner, inverse_diagonal};
use crate::linalg::sparse::{residual, spgemm, spmv, transpose};
use log::debug;
use ndarray::{Array1, Array2};
use sprs::{CsMat, TriMat};

#[derive(Debug, Clone, Copy)]
pub struct AmgConfig {
    /// Strength-of-connection threshold.
    pub strength_threshold: f64,
    /// Stop coarsening below this many unknowns.
    pub max_coarse_size: usize,
    pub max_levels: usize,
    /// Largest coarse matrix factorized densely.
    pub max_dense_size: usize,
    pub smoothing_sweeps: usize,
    /// Jacobi sweeps used when the coarse matrix cannot be factorized.
    pub coarse_jacobi_sweeps: usize,
}

impl Default for AmgConfig {
    fn default() -> Self {
        Self {
            strength_threshold: 0.08,
            max_coarse_size: 300,
            max_levels: 10,
            max_dense_size: 2000,
            smoothing_sweeps: 1,
            coarse_jacobi_sweeps: 20,
        }
    }
}

#[derive(Debug)]
struct Level {
    a: CsMat<f64>,
    inv_diag: Vec<f64>,
    omega: f64,
    p: CsMat<f64>,
    r: CsMat<f64>,
}

#[derive(Debug)]
enum CoarseSolver {
    Dense(DenseLu),
    Jacobi {
        a: CsMat<f64>,
        inv_diag: Vec<f64>,
        omega: f64,
        sweeps: usize,
    },
}

#[derive(Debug)]
pub struct AmgPreconditioner {
    levels: Vec<Level>,
    coarse: CoarseSolver,
    smoothing_sweeps: usize,
}

impl AmgPreconditioner {
    pub fn new(matrix: &CsMat<f64>) -> Self {
        Self::with_config(matrix, AmgConfig::default())
    }

    pub fn with_config(matrix: &CsMat<f64>, config: AmgConfig) -> Self {
        assert_eq!(matrix.rows(), matrix.cols(), "AMG needs a square matrix");
        assert!(matrix.is_csr(), "AMG expects a CSR matrix");
        let mut a = matrix.clone();
        let mut levels = Vec::new();

        while a.rows() > config.max_coarse_size && levels.len() + 1 < config.max_levels {
            let n = a.rows();
            let inv_diag = inverse_diagonal(&a);
            let omega = 4.0 / (3.0 * jacobi_spectral_bound(&a, &inv_diag));
            let (aggregates, num_aggregates) = aggregate(&a, config.strength_threshold);
            if num_aggregates == 0 || num_aggregates * 10 > n * 9 {
                // No useful coarsening left
                break;
            }
            let tentative = tentative_prolongator(&aggregates, num_aggregates);
            let p = smooth_prolongator(&a, &inv_diag, omega, &tentative);
            let r = transpose(&p);
            let coarse = spgemm(&spgemm(&r, &a), &p);
            debug!("AMG level {}: {} -> {} unknowns", levels.len(), n, coarse.rows());
            levels.push(Level {
                a,
                inv_diag,
                omega,
                p,
                r,
            });
            a = coarse;
        }

        let coarse = if a.rows() <= config.max_dense_size {
            DenseLu::factorize(&a).map(CoarseSolver::Dense)
        } else {
            None
        };
        let coarse = coarse.unwrap_or_else(|| {
            debug!("AMG coarse level ({} unknowns) uses Jacobi sweeps", a.rows());
            let inv_diag = inverse_diagonal(&a);
            let omega = 4.0 / (3.0 * jacobi_spectral_bound(&a, &inv_diag));
            CoarseSolver::Jacobi {
                a,
                inv_diag,
                omega,
                sweeps: config.coarse_jacobi_sweeps,
            }
        });

        Self {
            levels,
            coarse,
            smoothing_sweeps: config.smoothing_sweeps.max(1),
        }
    }

    /// Number of levels including the coarsest.
    pub fn num_levels(&self) -> usize {
        self.levels.len() + 1
    }

    fn vcycle(&self, level: usize, b: &[f64], x: &mut [f64]) {
        let Some(lvl) = self.levels.get(level) else {
            self.coarse.solve(b, x);
            return;
        };
        let n = b.len();
        let mut r = vec![0.0; n];

        // Pre-smoothing from a zero guess
        for (xi, (&bi, &d)) in x.iter_mut().zip(b.iter().zip(lvl.inv_diag.iter())) {
            *xi = lvl.omega * d * bi;
        }
        for _ in 1..self.smoothing_sweeps {
            jacobi_sweep(&lvl.a, &lvl.inv_diag, lvl.omega, b, x, &mut r);
        }

        residual(&lvl.a, x, b, &mut r);
        let mut rc = vec![0.0; lvl.r.rows()];
        spmv(&lvl.r, &r, &mut rc);
        let mut xc = vec![0.0; rc.len()];
        self.vcycle(level + 1, &rc, &mut xc);
        let mut correction = vec![0.0; n];
        spmv(&lvl.p, &xc, &mut correction);
        for (xi, ci) in x.iter_mut().zip(correction.iter()) {
            *xi += ci;
        }

        for _ in 0..self.smoothing_sweeps {
            jacobi_sweep(&lvl.a, &lvl.inv_diag, lvl.omega, b, x, &mut r);
        }
    }
}

impl Preconditioner for AmgPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        self.vcycle(0, r, z);
    }

    fn name(&self) -> &'static str {
        "amg"
    }
}

impl CoarseSolver {
    fn solve(&self, b: &[f64], x: &mut [f64]) {
        match self {
            CoarseSolver::Dense(lu) => lu.solve(b, x),
            CoarseSolver::Jacobi {
                a,
                inv_diag,
                omega,
                sweeps,
            } => {
                x.iter_mut().for_each(|xi| *xi = 0.0);
                let mut r = vec![0.0; b.len()];
                for _ in 0..*sweeps {
                    jacobi_sweep(a, inv_diag, *omega, b, x, &mut r);
                }
            }
        }
    }
}

/// `x += omega D^-1 (b - A x)`
fn jacobi_sweep(
    a: &CsMat<f64>,
    inv_diag: &[f64],
    omega: f64,
    b: &[f64],
    x: &mut [f64],
    r: &mut [f64],
) {
    residual(a, x, b, r);
    for ((xi, &ri), &d) in x.iter_mut().zip(r.iter()).zip(inv_diag.iter()) {
        *xi += omega * d * ri;
    }
}

/// Gershgorin bound on the spectral radius of `D^-1 A`.
fn jacobi_spectral_bound(a: &CsMat<f64>, inv_diag: &[f64]) -> f64 {
    a.outer_iterator()
        .enumerate()
        .map(|(i, row)| inv_diag[i] * row.iter().map(|(_, v)| v.abs()).sum::<f64>())
        .fold(1.0, f64::max)
}

/// Greedy aggregation on the strength graph.
///
/// Returns the aggregate of each node (`None` for isolated nodes such as
/// eliminated Dirichlet rows) and the number of aggregates.
fn aggregate(a: &CsMat<f64>, theta: f64) -> (Vec<Option<usize>>, usize) {
    let n = a.rows();
    let diag: Vec<f64> = (0..n)
        .map(|i| a.get(i, i).map_or(0.0, |v| v.abs()))
        .collect();
    let strong: Vec<Vec<usize>> = a
        .outer_iterator()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .filter(|&(j, &v)| j != i && v.abs() >= theta * (diag[i] * diag[j]).sqrt())
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let mut agg: Vec<Option<usize>> = vec![None; n];
    let mut count = 0;

    // Pass 1: seed aggregates from nodes whose whole neighbourhood is free
    for i in 0..n {
        if agg[i].is_some() || strong[i].is_empty() {
            continue;
        }
        if strong[i].iter().all(|&j| agg[j].is_none()) {
            agg[i] = Some(count);
            for &j in &strong[i] {
                agg[j] = Some(count);
            }
            count += 1;
        }
    }

    // Pass 2: attach leftovers to a neighbouring aggregate
    let snapshot = agg.clone();
    for i in 0..n {
        if agg[i].is_none() {
            if let Some(target) = strong[i].iter().find_map(|&j| snapshot[j]) {
                agg[i] = Some(target);
            }
        }
    }

    // Pass 3: whatever remains forms new aggregates
    for i in 0..n {
        if agg[i].is_some() || strong[i].is_empty() {
            continue;
        }
        agg[i] = Some(count);
        for &j in &strong[i] {
            if agg[j].is_none() {
                agg[j] = Some(count);
            }
        }
        count += 1;
    }

    (agg, count)
}

/// Piecewise-constant prolongator with orthonormal columns.
fn tentative_prolongator(aggregates: &[Option<usize>], num_aggregates: usize) -> CsMat<f64> {
    let mut sizes = vec![0usize; num_aggregates];
    for a in aggregates.iter().flatten() {
        sizes[*a] += 1;
    }
    let mut tri = TriMat::with_capacity((aggregates.len(), num_aggregates), aggregates.len());
    for (i, a) in aggregates.iter().enumerate() {
        if let Some(a) = *a {
            tri.add_triplet(i, a, 1.0 / (sizes[a] as f64).sqrt());
        }
    }
    tri.to_csr()
}

/// `P = (I - omega D^-1 A) T`
fn smooth_prolongator(
    a: &CsMat<f64>,
    inv_diag: &[f64],
    omega: f64,
    tentative: &CsMat<f64>,
) -> CsMat<f64> {
    let at = spgemm(a, tentative);
    let mut tri = TriMat::with_capacity(tentative.shape(), tentative.nnz() + at.nnz());
    for (i, row) in tentative.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            tri.add_triplet(i, j, v);
        }
    }
    for (i, row) in at.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            tri.add_triplet(i, j, -omega * inv_diag[i] * v);
        }
    }
    tri.to_csr()
}

/// Dense LU factorization with partial pivoting.
#[derive(Debug)]
struct DenseLu {
    lu: Array2<f64>,
    pivots: Vec<usize>,
}

impl DenseLu {
    /// Returns `None` for a numerically singular matrix.
    fn factorize(a: &CsMat<f64>) -> Option<Self> {
        let n = a.rows();
        let mut lu = Array2::<f64>::zeros((n, n));
        for (i, row) in a.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                lu[[i, j]] += v;
            }
        }
        let scale = lu.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let mut pivots: Vec<usize> = (0..n).collect();

        for k in 0..n {
            let (p, pmax) = (k..n)
                .map(|i| (i, lu[[i, k]].abs()))
                .fold((k, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
            if pmax <= 1e-14 * scale {
                return None;
            }
            if p != k {
                for j in 0..n {
                    lu.swap([k, j], [p, j]);
                }
                pivots.swap(k, p);
            }
            let pivot = lu[[k, k]];
            for i in (k + 1)..n {
                let factor = lu[[i, k]] / pivot;
                lu[[i, k]] = factor;
                if factor != 0.0 {
                    for j in (k + 1)..n {
                        lu[[i, j]] -= factor * lu[[k, j]];
                    }
                }
            }
        }
        Some(Self { lu, pivots })
    }

    fn solve(&self, b: &[f64], x: &mut [f64]) {
        let n = b.len();
        let mut y: Array1<f64> = self.pivots.iter().map(|&p| b[p]).collect();
        for i in 0..n {
            let mut s = y[i];
            for j in 0..i {
                s -= self.lu[[i, j]] * y[j];
            }
            y[i] = s;
        }
        for i in (0..n).rev() {
            let mut s = y[i];
            for j in (i + 1)..n {
                s -= self.lu[[i, j]] * y[j];
            }
            y[i] = s / self.lu[[i, i]];
        }
        for (xi, yi) in x.iter_mut().zip(y.iter()) {
            *xi = *yi;
        }
    }
}
