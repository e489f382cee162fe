use crate::Point;
use crate::Vector;
use crate::geom::mesh::{EDGE_VERTICES, TetrahedralMesh};

/// Number of P1 basis functions on a tetrahedron.
pub const P1_DOFS: usize = 4;
/// Number of P2 basis functions on a tetrahedron (4 vertices + 6 edges).
pub const P2_DOFS: usize = 10;

/// Affine geometry of a single tetrahedron.
#[derive(Debug, Clone, Copy)]
pub struct CellGeometry {
    pub vertices: [Point; 4],
    /// Constant gradients of the barycentric coordinates.
    pub grad_lambda: [Vector; 4],
    pub volume: f64,
}

impl CellGeometry {
    pub fn new(mesh: &TetrahedralMesh, cell: usize) -> Self {
        let t = mesh.tetrahedra[cell];
        Self::from_vertices([
            mesh.vertices[t.0],
            mesh.vertices[t.1],
            mesh.vertices[t.2],
            mesh.vertices[t.3],
        ])
    }

    /// Panics on a degenerate tetrahedron.
    pub fn from_vertices(vertices: [Point; 4]) -> Self {
        let e1 = vertices[1] - vertices[0];
        let e2 = vertices[2] - vertices[0];
        let e3 = vertices[3] - vertices[0];
        let det = e1.dot(e2.cross(e3));
        assert!(det.abs() > 1e-14, "degenerate tetrahedron, det = {det}");

        // Rows of the inverse Jacobian
        let g1 = e2.cross(e3) * (1.0 / det);
        let g2 = e3.cross(e1) * (1.0 / det);
        let g3 = e1.cross(e2) * (1.0 / det);
        let g0 = (g1 + g2 + g3) * -1.0;

        Self {
            vertices,
            grad_lambda: [g0, g1, g2, g3],
            volume: det.abs() / 6.0,
        }
    }

    /// Maps barycentric coordinates to a physical point.
    pub fn map(&self, lambda: &[f64; 4]) -> Point {
        let mut p = Point::origin();
        for (l, v) in lambda.iter().zip(self.vertices.iter()) {
            p.x += l * v.x;
            p.y += l * v.y;
            p.z += l * v.z;
        }
        p
    }

    pub fn min_edge_length(&self) -> f64 {
        EDGE_VERTICES
            .iter()
            .map(|&(a, b)| self.vertices[a].distance(&self.vertices[b]))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Values of the quadratic basis at barycentric point `lambda`.
///
/// Vertex functions come first, then edge functions in `EDGE_VERTICES` order.
pub fn p2_values(lambda: &[f64; 4]) -> [f64; P2_DOFS] {
    let mut out = [0.0; P2_DOFS];
    for i in 0..4 {
        out[i] = lambda[i] * (2.0 * lambda[i] - 1.0);
    }
    for (e, &(a, b)) in EDGE_VERTICES.iter().enumerate() {
        out[4 + e] = 4.0 * lambda[a] * lambda[b];
    }
    out
}

/// Physical gradients of the quadratic basis at `lambda`.
pub fn p2_gradients(lambda: &[f64; 4], grad_lambda: &[Vector; 4]) -> [Vector; P2_DOFS] {
    let mut out = [Vector::zero(); P2_DOFS];
    for i in 0..4 {
        out[i] = grad_lambda[i] * (4.0 * lambda[i] - 1.0);
    }
    for (e, &(a, b)) in EDGE_VERTICES.iter().enumerate() {
        out[4 + e] = (grad_lambda[b] * lambda[a] + grad_lambda[a] * lambda[b]) * 4.0;
    }
    out
}
