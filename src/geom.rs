//! Geometry of the spherical domain: points, vectors, tetrahedra and meshes.

pub mod mesh;
pub mod point;
pub mod tetrahedron;
pub mod vector;

/// Geometric precision
const EPS: f64 = 1e-13;
