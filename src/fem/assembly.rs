//! Cell-wise assembly of bilinear and linear forms.
//!
//! Element contributions are computed in parallel and then accumulated
//! sequentially into a triplet matrix, which sums duplicate entries when
//! converted to CSR.

use crate::fem::bc::DirichletBc;
use crate::fem::space::{LagrangeSpace, MixedSpace};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

/// A space that can be assembled over: global size and per-cell DOF map.
pub trait FormSpace: Sync {
    fn dimension(&self) -> usize;

    fn num_cells(&self) -> usize;

    fn local_to_global(&self, cell: usize) -> Vec<usize>;
}

impl FormSpace for LagrangeSpace {
    fn dimension(&self) -> usize {
        LagrangeSpace::dimension(self)
    }

    fn num_cells(&self) -> usize {
        LagrangeSpace::num_cells(self)
    }

    fn local_to_global(&self, cell: usize) -> Vec<usize> {
        self.cell_dofs(cell).to_vec()
    }
}

impl FormSpace for MixedSpace {
    fn dimension(&self) -> usize {
        MixedSpace::dimension(self)
    }

    fn num_cells(&self) -> usize {
        MixedSpace::num_cells(self)
    }

    fn local_to_global(&self, cell: usize) -> Vec<usize> {
        self.cell_dofs(cell).to_vec()
    }
}

/// Bilinear form with identical trial and test spaces.
pub trait BilinearForm: Sync {
    type Space: FormSpace;

    fn space(&self) -> &Self::Space;

    /// Local matrix, row = test function, column = trial function.
    fn cell_matrix(&self, cell: usize) -> Array2<f64>;
}

pub trait LinearForm: Sync {
    type Space: FormSpace;

    fn space(&self) -> &Self::Space;

    fn cell_vector(&self, cell: usize) -> Array1<f64>;
}

/// Assembled matrix with its right-hand side.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub matrix: CsMat<f64>,
    pub rhs: Vec<f64>,
}

impl LinearSystem {
    pub fn dimension(&self) -> usize {
        self.rhs.len()
    }
}

pub fn assemble_matrix<A: BilinearForm>(form: &A) -> CsMat<f64> {
    let space = form.space();
    let n = space.dimension();

    let locals: Vec<(Vec<usize>, Array2<f64>)> = (0..space.num_cells())
        .into_par_iter()
        .map(|cell| (space.local_to_global(cell), form.cell_matrix(cell)))
        .collect();

    let nnz = locals.iter().map(|(d, _)| d.len() * d.len()).sum();
    let mut tri = TriMat::with_capacity((n, n), nnz);
    for (dofs, local) in &locals {
        assert_eq!(
            local.dim(),
            (dofs.len(), dofs.len()),
            "cell matrix shape does not match the DOF map"
        );
        for (i, &gi) in dofs.iter().enumerate() {
            for (j, &gj) in dofs.iter().enumerate() {
                let v = local[[i, j]];
                if v != 0.0 {
                    tri.add_triplet(gi, gj, v);
                }
            }
        }
    }
    tri.to_csr()
}

pub fn assemble_vector<L: LinearForm>(form: &L) -> Vec<f64> {
    let space = form.space();

    let locals: Vec<(Vec<usize>, Array1<f64>)> = (0..space.num_cells())
        .into_par_iter()
        .map(|cell| (space.local_to_global(cell), form.cell_vector(cell)))
        .collect();

    let mut out = vec![0.0; space.dimension()];
    for (dofs, local) in &locals {
        assert_eq!(local.len(), dofs.len(), "cell vector length does not match the DOF map");
        for (&g, &v) in dofs.iter().zip(local.iter()) {
            out[g] += v;
        }
    }
    out
}

/// Assembles `a` and `l` and applies `bc` symmetrically.
pub fn assemble_system<A, L>(a: &A, l: &L, bc: Option<&DirichletBc>) -> LinearSystem
where
    A: BilinearForm,
    L: LinearForm,
{
    let matrix = assemble_matrix(a);
    let rhs = assemble_vector(l);
    assert_eq!(
        matrix.rows(),
        rhs.len(),
        "bilinear and linear forms live on different spaces"
    );
    let system = LinearSystem { matrix, rhs };
    match bc {
        Some(bc) => bc.apply(&system),
        None => system,
    }
}

/// Assembles a preconditioner form with the same constraints as the system.
pub fn assemble_preconditioner<B: BilinearForm>(b: &B, bc: Option<&DirichletBc>) -> CsMat<f64> {
    let matrix = assemble_matrix(b);
    match bc {
        Some(bc) => bc.apply_to_matrix(&matrix),
        None => matrix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::element::CellGeometry;
    use crate::fem::quadrature::QuadratureRule;
    use crate::fem::space::build_spaces;
    use crate::geom::mesh::generate_sphere_mesh;
    use std::sync::Arc;

    struct Mass<'a>(&'a LagrangeSpace);

    impl BilinearForm for Mass<'_> {
        type Space = LagrangeSpace;

        fn space(&self) -> &LagrangeSpace {
            self.0
        }

        fn cell_matrix(&self, cell: usize) -> Array2<f64> {
            let geo = CellGeometry::new(self.0.mesh(), cell);
            let mut m = Array2::zeros((4, 4));
            for (l, w) in QuadratureRule::assembly().iter() {
                for i in 0..4 {
                    for j in 0..4 {
                        m[[i, j]] += w * geo.volume * l[i] * l[j];
                    }
                }
            }
            m
        }
    }

    struct One<'a>(&'a LagrangeSpace);

    impl LinearForm for One<'_> {
        type Space = LagrangeSpace;

        fn space(&self) -> &LagrangeSpace {
            self.0
        }

        fn cell_vector(&self, cell: usize) -> Array1<f64> {
            let geo = CellGeometry::new(self.0.mesh(), cell);
            Array1::from_elem(4, geo.volume / 4.0)
        }
    }

    #[test]
    fn test_mass_matrix_sums_to_volume() {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(3)));
        let space = spaces.porosity.as_ref();
        let m = assemble_matrix(&Mass(space));
        let total: f64 = m.iter().map(|(&v, _)| v).sum();
        let volume = space.mesh().volume();
        assert!((total - volume).abs() < 1e-12, "{total} vs {volume}");

        let b = assemble_vector(&One(space));
        assert!((b.iter().sum::<f64>() - volume).abs() < 1e-12);
    }

    #[test]
    fn test_assembled_mass_is_symmetric() {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(2)));
        let m = assemble_matrix(&Mass(spaces.porosity.as_ref()));
        for (i, row) in m.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                let t = m.get(j, i).copied().unwrap_or(0.0);
                assert!((v - t).abs() < 1e-15);
            }
        }
    }
}
