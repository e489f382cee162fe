//! Helpers on top of `sprs` CSR matrices.

use rayon::prelude::*;
use sprs::{CsMat, TriMat};

/// `y = A x`, rows computed in parallel.
pub fn spmv(a: &CsMat<f64>, x: &[f64], y: &mut [f64]) {
    assert!(a.is_csr(), "spmv expects a CSR matrix");
    assert_eq!(a.cols(), x.len(), "spmv: x has the wrong length");
    assert_eq!(a.rows(), y.len(), "spmv: y has the wrong length");
    y.par_iter_mut().enumerate().for_each(|(i, yi)| {
        *yi = a
            .outer_view(i)
            .map_or(0.0, |row| row.iter().map(|(j, &v)| v * x[j]).sum());
    });
}

/// `r = b - A x`.
pub fn residual(a: &CsMat<f64>, x: &[f64], b: &[f64], r: &mut [f64]) {
    spmv(a, x, r);
    for (ri, &bi) in r.iter_mut().zip(b.iter()) {
        *ri = bi - *ri;
    }
}

pub fn diagonal(a: &CsMat<f64>) -> Vec<f64> {
    (0..a.rows())
        .map(|i| a.get(i, i).copied().unwrap_or(0.0))
        .collect()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `y += alpha * x`
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

pub fn transpose(a: &CsMat<f64>) -> CsMat<f64> {
    let mut tri = TriMat::with_capacity((a.cols(), a.rows()), a.nnz());
    for (i, row) in a.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            tri.add_triplet(j, i, v);
        }
    }
    tri.to_csr()
}

/// Sparse product `A B` using a dense row accumulator.
pub fn spgemm(a: &CsMat<f64>, b: &CsMat<f64>) -> CsMat<f64> {
    assert!(a.is_csr() && b.is_csr(), "spgemm expects CSR matrices");
    assert_eq!(a.cols(), b.rows(), "spgemm: inner dimensions differ");

    let ncols = b.cols();
    let mut acc = vec![0.0; ncols];
    let mut marker = vec![usize::MAX; ncols];
    let mut row_cols: Vec<usize> = Vec::new();

    let mut indptr = Vec::with_capacity(a.rows() + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);

    for (i, arow) in a.outer_iterator().enumerate() {
        row_cols.clear();
        for (k, &aik) in arow.iter() {
            if let Some(brow) = b.outer_view(k) {
                for (j, &bkj) in brow.iter() {
                    if marker[j] != i {
                        marker[j] = i;
                        acc[j] = 0.0;
                        row_cols.push(j);
                    }
                    acc[j] += aik * bkj;
                }
            }
        }
        row_cols.sort_unstable();
        for &j in &row_cols {
            indices.push(j);
            data.push(acc[j]);
        }
        indptr.push(indices.len());
    }

    CsMat::new((a.rows(), ncols), indptr, indices, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> CsMat<f64> {
        // [1 2 0]
        // [0 3 4]
        let mut tri = TriMat::new((2, 3));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 1, 2.0);
        tri.add_triplet(1, 1, 3.0);
        tri.add_triplet(1, 2, 4.0);
        tri.to_csr()
    }

    #[test]
    fn test_spmv_and_residual() {
        let a = small();
        let mut y = vec![0.0; 2];
        spmv(&a, &[1.0, 1.0, 1.0], &mut y);
        assert_eq!(y, vec![3.0, 7.0]);

        let mut r = vec![0.0; 2];
        residual(&a, &[1.0, 1.0, 1.0], &[3.0, 10.0], &mut r);
        assert_eq!(r, vec![0.0, 3.0]);
    }

    #[test]
    fn test_transpose_and_product() {
        let a = small();
        let at = transpose(&a);
        assert_eq!(at.shape(), (3, 2));
        assert_eq!(at.get(2, 1), Some(&4.0));

        // A A^T = [[5, 6], [6, 25]]
        let aat = spgemm(&a, &at);
        assert_eq!(aat.get(0, 0), Some(&5.0));
        assert_eq!(aat.get(0, 1), Some(&6.0));
        assert_eq!(aat.get(1, 0), Some(&6.0));
        assert_eq!(aat.get(1, 1), Some(&25.0));
        assert_eq!(diagonal(&aat), vec![5.0, 25.0]);
    }

    #[test]
    fn test_vector_ops() {
        let mut y = vec![1.0, 2.0];
        axpy(2.0, &[3.0, 4.0], &mut y);
        assert_eq!(y, vec![7.0, 10.0]);
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-15);
    }
}
