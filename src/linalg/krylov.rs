//! Preconditioned Krylov methods.
//!
//! Both methods honour `SolverConfig::nonzero_initial_guess` and measure
//! convergence relative to the right-hand side, so a good initial guess
//! lets them return after very few iterations.

use crate::linalg::backend::KrylovMethod;
use crate::linalg::preconditioner::Preconditioner;
use crate::linalg::solver::SolverConfig;
use crate::linalg::sparse::{axpy, dot, l2_norm, residual, spmv};
use crate::linalg::SolverError;
use log::debug;
use sprs::CsMat;
use std::mem::swap;

/// Outcome of a converged solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    /// Final residual estimate relative to the right-hand side.
    pub relative_residual: f64,
}

fn check_dimensions(a: &CsMat<f64>, b: &[f64], x: &[f64]) {
    assert_eq!(a.rows(), a.cols(), "Krylov solvers need a square matrix");
    assert_eq!(a.rows(), b.len(), "right-hand side has the wrong length");
    assert_eq!(a.rows(), x.len(), "solution vector has the wrong length");
}

/// Preconditioned MINRES for symmetric (indefinite) systems.
///
/// The preconditioner must be symmetric positive definite. Convergence is
/// tested in the norm induced by the preconditioner:
/// `||r||_{M^-1} <= rtol * ||b||_{M^-1}`.
pub fn minres(
    a: &CsMat<f64>,
    precond: &dyn Preconditioner,
    b: &[f64],
    x: &mut [f64],
    config: &SolverConfig,
) -> Result<SolveStats, SolverError> {
    check_dimensions(a, b, x);
    let method = KrylovMethod::Minres;
    let n = b.len();
    let tol = config.relative_tolerance;
    if !config.nonzero_initial_guess {
        x.fill(0.0);
    }

    let breakdown = |iteration, reason| SolverError::Breakdown {
        method,
        iteration,
        reason,
    };

    let mut z = vec![0.0; n];
    precond.apply(b, &mut z);
    let b_norm_sq = dot(&z, b);
    if b_norm_sq < 0.0 {
        return Err(breakdown(0, "preconditioner is not positive definite"));
    }
    let b_norm = b_norm_sq.sqrt();
    if b_norm == 0.0 {
        x.fill(0.0);
        return Ok(SolveStats {
            iterations: 0,
            relative_residual: 0.0,
        });
    }

    let mut v = vec![0.0; n];
    residual(a, x, b, &mut v);
    precond.apply(&v, &mut z);
    let gamma_sq = dot(&z, &v);
    if gamma_sq < 0.0 {
        return Err(breakdown(0, "preconditioner is not positive definite"));
    }
    let mut gamma = gamma_sq.sqrt();
    let mut eta = gamma;
    if gamma <= tol * b_norm {
        return Ok(SolveStats {
            iterations: 0,
            relative_residual: gamma / b_norm,
        });
    }

    let mut v_old = vec![0.0; n];
    let mut v_new = vec![0.0; n];
    let mut z_new = vec![0.0; n];
    let mut w = vec![0.0; n];
    let mut w_old = vec![0.0; n];
    let mut w_new = vec![0.0; n];
    let mut az = vec![0.0; n];
    let (mut gamma_old, mut c_old, mut c, mut s_old, mut s) = (1.0, 1.0, 1.0, 0.0, 0.0);

    for it in 1..=config.max_iterations {
        // Lanczos step
        z.iter_mut().for_each(|zi| *zi /= gamma);
        spmv(a, &z, &mut az);
        let delta = dot(&az, &z);
        for i in 0..n {
            v_new[i] = az[i] - (delta / gamma) * v[i] - (gamma / gamma_old) * v_old[i];
        }
        precond.apply(&v_new, &mut z_new);
        let gamma_new_sq = dot(&z_new, &v_new);
        if gamma_new_sq < -1e-12 * b_norm_sq {
            return Err(breakdown(it, "preconditioner is not positive definite"));
        }
        let gamma_new = gamma_new_sq.max(0.0).sqrt();

        // Givens rotations
        let alpha0 = c * delta - c_old * s * gamma;
        let alpha1 = (alpha0 * alpha0 + gamma_new * gamma_new).sqrt();
        let alpha2 = s * delta + c_old * c * gamma;
        let alpha3 = s_old * gamma;
        if alpha1 == 0.0 {
            return Err(breakdown(it, "singular Lanczos tridiagonal"));
        }
        let c_new = alpha0 / alpha1;
        let s_new = gamma_new / alpha1;

        for i in 0..n {
            w_new[i] = (z[i] - alpha3 * w_old[i] - alpha2 * w[i]) / alpha1;
        }
        axpy(c_new * eta, &w_new, x);
        eta = -s_new * eta;

        let relative = eta.abs() / b_norm;
        if config.monitor_convergence {
            debug!("{method} iteration {it}: relative residual {relative:.3e}");
        }
        if relative <= tol {
            return Ok(SolveStats {
                iterations: it,
                relative_residual: relative,
            });
        }
        if gamma_new == 0.0 {
            return Err(breakdown(it, "Krylov space exhausted before convergence"));
        }

        swap(&mut v_old, &mut v);
        swap(&mut v, &mut v_new);
        swap(&mut z, &mut z_new);
        swap(&mut w_old, &mut w);
        swap(&mut w, &mut w_new);
        gamma_old = gamma;
        gamma = gamma_new;
        c_old = c;
        c = c_new;
        s_old = s;
        s = s_new;
    }

    Err(SolverError::NotConverged {
        method,
        iterations: config.max_iterations,
        relative_residual: eta.abs() / b_norm,
        tolerance: tol,
    })
}

/// Right-preconditioned TFQMR for general systems.
///
/// Iterates on `A M^-1 y = r0` and recovers `x = x0 + M^-1 y`, so the
/// monitored quantity bounds the true residual `||b - A x||_2`.
pub fn tfqmr(
    a: &CsMat<f64>,
    precond: &dyn Preconditioner,
    b: &[f64],
    x: &mut [f64],
    config: &SolverConfig,
) -> Result<SolveStats, SolverError> {
    check_dimensions(a, b, x);
    let method = KrylovMethod::Tfqmr;
    let n = b.len();
    let tol = config.relative_tolerance;
    if !config.nonzero_initial_guess {
        x.fill(0.0);
    }

    let b_norm = l2_norm(b);
    if b_norm == 0.0 {
        x.fill(0.0);
        return Ok(SolveStats {
            iterations: 0,
            relative_residual: 0.0,
        });
    }
    let errtol = tol * b_norm;

    let mut r0 = vec![0.0; n];
    residual(a, x, b, &mut r0);
    let mut tau = l2_norm(&r0);
    if tau <= errtol {
        return Ok(SolveStats {
            iterations: 0,
            relative_residual: tau / b_norm,
        });
    }

    let mut tmp = vec![0.0; n];
    // out = A M^-1 v
    let mut apply_op = |v: &[f64], out: &mut [f64]| {
        precond.apply(v, &mut tmp);
        spmv(a, &tmp, out);
    };

    let mut w = r0.clone();
    let mut y1 = r0.clone();
    let mut y2 = vec![0.0; n];
    let mut u1 = vec![0.0; n];
    let mut u2 = vec![0.0; n];
    apply_op(&y1, &mut u1);
    let mut v = u1.clone();
    let mut d = vec![0.0; n];
    let mut x_hat = vec![0.0; n];
    let rtilde = r0;

    let (mut theta, mut eta) = (0.0_f64, 0.0_f64);
    let mut rho = tau * tau;
    let mut bound = tau;
    let mut converged_at = None;

    'outer: for k in 1..=config.max_iterations {
        let sigma = dot(&rtilde, &v);
        if sigma == 0.0 {
            return Err(SolverError::Breakdown {
                method,
                iteration: k,
                reason: "sigma vanished",
            });
        }
        let alpha = rho / sigma;

        for j in 0..2 {
            if j == 1 {
                for i in 0..n {
                    y2[i] = y1[i] - alpha * v[i];
                }
                apply_op(&y2, &mut u2);
            }
            let (yj, uj) = if j == 0 { (&y1, &u1) } else { (&y2, &u2) };
            let m = 2 * k - 1 + j;

            axpy(-alpha, uj, &mut w);
            let coef = theta * theta * eta / alpha;
            for i in 0..n {
                d[i] = yj[i] + coef * d[i];
            }
            theta = l2_norm(&w) / tau;
            let c = 1.0 / (1.0 + theta * theta).sqrt();
            tau *= theta * c;
            eta = c * c * alpha;
            axpy(eta, &d, &mut x_hat);

            bound = tau * ((m + 1) as f64).sqrt();
            if config.monitor_convergence {
                debug!(
                    "{method} iteration {k}.{j}: relative residual bound {:.3e}",
                    bound / b_norm
                );
            }
            if bound <= errtol {
                converged_at = Some(k);
                break 'outer;
            }
        }

        let rho_new = dot(&rtilde, &w);
        if rho_new == 0.0 {
            return Err(SolverError::Breakdown {
                method,
                iteration: k,
                reason: "rho vanished",
            });
        }
        let beta = rho_new / rho;
        rho = rho_new;
        for i in 0..n {
            y1[i] = w[i] + beta * y2[i];
        }
        apply_op(&y1, &mut u1);
        for i in 0..n {
            v[i] = u1[i] + beta * (u2[i] + beta * v[i]);
        }
    }

    let mut correction = vec![0.0; n];
    precond.apply(&x_hat, &mut correction);
    axpy(1.0, &correction, x);

    match converged_at {
        Some(iterations) => Ok(SolveStats {
            iterations,
            relative_residual: bound / b_norm,
        }),
        None => Err(SolverError::NotConverged {
            method,
            iterations: config.max_iterations,
            relative_residual: bound / b_norm,
            tolerance: tol,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::amg::AmgPreconditioner;
    use crate::linalg::preconditioner::JacobiPreconditioner;
    use sprs::TriMat;

    fn config(method: KrylovMethod, max_iterations: usize) -> SolverConfig {
        SolverConfig {
            max_iterations,
            ..SolverConfig::initial_flow(method)
        }
    }

    fn true_relative_residual(a: &CsMat<f64>, x: &[f64], b: &[f64]) -> f64 {
        let mut r = vec![0.0; b.len()];
        residual(a, x, b, &mut r);
        l2_norm(&r) / l2_norm(b)
    }

    /// Saddle point `[[K, B^T], [B, -eps I]]` with a 1D Laplacian `K`.
    fn saddle_point(n: usize) -> (CsMat<f64>, CsMat<f64>) {
        let m = n / 2;
        let mut a = TriMat::new((n + m, n + m));
        let mut p = TriMat::new((n + m, n + m));
        for i in 0..n {
            a.add_triplet(i, i, 2.0);
            p.add_triplet(i, i, 2.0);
            if i > 0 {
                a.add_triplet(i, i - 1, -1.0);
                a.add_triplet(i - 1, i, -1.0);
                p.add_triplet(i, i - 1, -1.0);
                p.add_triplet(i - 1, i, -1.0);
            }
        }
        for k in 0..m {
            let (row, col) = (n + k, 2 * k);
            a.add_triplet(row, col, 1.0);
            a.add_triplet(col, row, 1.0);
            a.add_triplet(row, col + 1, -0.5);
            a.add_triplet(col + 1, row, -0.5);
            a.add_triplet(row, row, -1e-2);
            p.add_triplet(row, row, 1.0);
        }
        (a.to_csr(), p.to_csr())
    }

    fn convection_diffusion(n: usize) -> CsMat<f64> {
        let mut a = TriMat::new((n, n));
        for i in 0..n {
            a.add_triplet(i, i, 2.5);
            if i > 0 {
                a.add_triplet(i, i - 1, -1.5);
            }
            if i + 1 < n {
                a.add_triplet(i, i + 1, -0.5);
            }
        }
        a.to_csr()
    }

    #[test]
    fn test_minres_solves_saddle_point() {
        let (a, p) = saddle_point(60);
        let b: Vec<f64> = (0..a.rows()).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut x = vec![0.0; b.len()];
        let amg = AmgPreconditioner::new(&p);
        let stats = minres(&a, &amg, &b, &mut x, &config(KrylovMethod::Minres, 500)).unwrap();
        assert!(stats.iterations > 0);
        assert!(
            true_relative_residual(&a, &x, &b) < 1e-4,
            "residual {}",
            true_relative_residual(&a, &x, &b)
        );
    }

    #[test]
    fn test_minres_exact_initial_guess_needs_no_iterations() {
        let (a, p) = saddle_point(20);
        let x_exact: Vec<f64> = (0..a.rows()).map(|i| i as f64).collect();
        let mut b = vec![0.0; a.rows()];
        spmv(&a, &x_exact, &mut b);
        let mut x = x_exact.clone();
        let cfg = SolverConfig {
            nonzero_initial_guess: true,
            ..config(KrylovMethod::Minres, 10)
        };
        let stats = minres(&a, &JacobiPreconditioner::from_matrix(&p), &b, &mut x, &cfg).unwrap();
        assert_eq!(stats.iterations, 0);
        assert_eq!(x, x_exact);
    }

    #[test]
    fn test_minres_reports_non_convergence() {
        let (a, p) = saddle_point(80);
        let b = vec![1.0; a.rows()];
        let mut x = vec![0.0; b.len()];
        let err = minres(
            &a,
            &JacobiPreconditioner::from_matrix(&p),
            &b,
            &mut x,
            &config(KrylovMethod::Minres, 2),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::NotConverged { iterations: 2, .. }));
    }

    #[test]
    fn test_tfqmr_solves_nonsymmetric_system() {
        let a = convection_diffusion(100);
        let b: Vec<f64> = (0..100).map(|i| 1.0 + (i % 3) as f64).collect();
        let mut x = vec![0.0; 100];
        let jacobi = JacobiPreconditioner::from_matrix(&a);
        let stats = tfqmr(&a, &jacobi, &b, &mut x, &config(KrylovMethod::Tfqmr, 500)).unwrap();
        assert!(stats.relative_residual <= 1e-6);
        assert!(true_relative_residual(&a, &x, &b) < 1e-5);
    }

    #[test]
    fn test_tfqmr_reports_vanishing_rho() {
        // After one sweep w = (0, 1, -2), orthogonal to r0 = e1
        let mut tri = TriMat::new((3, 3));
        for (i, j, v) in [
            (0, 0, 1.0),
            (0, 1, 1.0),
            (0, 2, 1.0),
            (1, 0, 1.0),
            (1, 1, 2.0),
            (2, 0, -1.0),
            (2, 2, 3.0),
        ] {
            tri.add_triplet(i, j, v);
        }
        let a: CsMat<f64> = tri.to_csr();
        let identity = JacobiPreconditioner::from_matrix(&CsMat::eye(3));
        let mut x = vec![0.0; 3];
        let err = tfqmr(
            &a,
            &identity,
            &[1.0, 0.0, 0.0],
            &mut x,
            &config(KrylovMethod::Tfqmr, 50),
        )
        .unwrap_err();
        assert!(
            matches!(err, SolverError::Breakdown { iteration: 1, .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_tfqmr_porosity_config_keeps_initial_guess() {
        let a = convection_diffusion(30);
        let x_exact: Vec<f64> = (0..30).map(|i| 0.01 + 1e-3 * i as f64).collect();
        let mut b = vec![0.0; 30];
        spmv(&a, &x_exact, &mut b);
        let mut x = x_exact.clone();
        let jacobi = JacobiPreconditioner::from_matrix(&a);
        let stats = tfqmr(
            &a,
            &jacobi,
            &b,
            &mut x,
            &SolverConfig::porosity(KrylovMethod::Tfqmr),
        )
        .unwrap();
        assert_eq!(stats.iterations, 0);
        assert_eq!(x, x_exact);
    }

    #[test]
    fn test_zero_rhs_gives_zero_solution() {
        let a = convection_diffusion(10);
        let mut x = vec![1.0; 10];
        let jacobi = JacobiPreconditioner::from_matrix(&a);
        let stats = tfqmr(&a, &jacobi, &[0.0; 10], &mut x, &config(KrylovMethod::Tfqmr, 5)).unwrap();
        assert_eq!(stats.iterations, 0);
        assert!(x.iter().all(|&v| v == 0.0));
    }
}
