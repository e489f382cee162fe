//! Lagrange finite elements on tetrahedral meshes.
//!
//! Only what the melt-flow model needs is provided: P1 and P2 scalar spaces,
//! the mixed (P2^3, P1, P1) space, cell-wise parallel assembly into `sprs`
//! matrices and symmetric Dirichlet elimination.

pub mod assembly;
pub mod bc;
pub mod element;
pub mod field;
pub mod quadrature;
pub mod space;

pub use assembly::{
    BilinearForm, FormSpace, LinearForm, LinearSystem, assemble_matrix, assemble_preconditioner,
    assemble_system, assemble_vector,
};
pub use bc::DirichletBc;
pub use element::CellGeometry;
pub use field::{Field, MixedField, ScalarView, VelocityView};
pub use quadrature::QuadratureRule;
pub use space::{LagrangeSpace, MixedSpace, Spaces, build_spaces};
