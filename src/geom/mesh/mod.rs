//! Volumetric tetrahedral meshes.

pub mod sphere;
pub mod topology;

use crate::Point;
use crate::geom::tetrahedron::{tetrahedron_centroid, tetrahedron_signed_volume};

pub use sphere::{generate_sphere_mesh, is_on_sphere_surface};
pub use topology::{BoundaryFacet, EDGE_VERTICES, FACET_VERTICES, MeshTopology};

/// A tetrahedron defined by four point indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TetrahedronIndex(pub usize, pub usize, pub usize, pub usize);

impl TetrahedronIndex {
    pub fn as_array(&self) -> [usize; 4] {
        [self.0, self.1, self.2, self.3]
    }
}

/// Immutable tetrahedral mesh.
///
/// Every tetrahedron is stored with positive orientation, so that the
/// barycentric gradients computed from the vertex order are consistent
/// across the mesh.
#[derive(Debug, Clone)]
pub struct TetrahedralMesh {
    pub vertices: Vec<Point>,
    pub tetrahedra: Vec<TetrahedronIndex>,
}

impl TetrahedralMesh {
    /// Creates a new tetrahedral mesh, flipping negatively oriented
    /// tetrahedra.
    ///
    /// Panics on out-of-bounds vertex indices or degenerate tetrahedra.
    pub fn new(vertices: Vec<Point>, tetrahedra: Vec<TetrahedronIndex>) -> Self {
        let tetrahedra = tetrahedra
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                assert!(
                    t.as_array().iter().all(|&v| v < vertices.len()),
                    "tetrahedron {i} has an out-of-bounds vertex index"
                );
                let vol = tetrahedron_signed_volume(
                    vertices[t.0],
                    vertices[t.1],
                    vertices[t.2],
                    vertices[t.3],
                );
                assert!(vol.abs() > 1e-14, "tetrahedron {i} is degenerate");
                if vol < 0.0 {
                    TetrahedronIndex(t.0, t.1, t.3, t.2)
                } else {
                    t
                }
            })
            .collect();

        Self {
            vertices,
            tetrahedra,
        }
    }

    /// Returns the number of tetrahedra.
    pub fn tetrahedra_count(&self) -> usize {
        self.tetrahedra.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Gets a specific tetrahedron's vertices.
    pub fn get_tetrahedron(&self, idx: usize) -> Option<[Point; 4]> {
        self.tetrahedra.get(idx).map(|t| {
            [
                self.vertices[t.0],
                self.vertices[t.1],
                self.vertices[t.2],
                self.vertices[t.3],
            ]
        })
    }

    /// Returns the total volume of the tetrahedral mesh.
    pub fn volume(&self) -> f64 {
        self.tetrahedra
            .iter()
            .map(|t| {
                tetrahedron_signed_volume(
                    self.vertices[t.0],
                    self.vertices[t.1],
                    self.vertices[t.2],
                    self.vertices[t.3],
                )
            })
            .sum()
    }

    pub fn cell_centroid(&self, idx: usize) -> Point {
        let t = self.tetrahedra[idx];
        tetrahedron_centroid(
            self.vertices[t.0],
            self.vertices[t.1],
            self.vertices[t.2],
            self.vertices[t.3],
        )
    }
}
