//! Tetrahedral mesh of the unit sphere.
//!
//! The cube `[-1, 1]^3` is split into `resolution^3` sub-cubes, each cut into
//! six tetrahedra along its main diagonal (Kuhn subdivision), and every vertex
//! is then pushed radially so that the cube surface lands on the unit sphere:
//! `p -> p * |p|_inf / |p|_2`. The map is continuous and piecewise smooth, so
//! the tetrahedra stay valid and conforming.

use crate::Point;
use crate::geom::mesh::{TetrahedralMesh, TetrahedronIndex};

/// Vertex orderings of the six Kuhn tetrahedra as axis permutations.
const AXIS_PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Generates a volumetric tetrahedral mesh of the unit sphere.
///
/// `resolution` is the number of cells along each axis of the underlying
/// cube grid. All boundary vertices lie exactly on the unit sphere.
///
/// Panics if `resolution` is zero.
pub fn generate_sphere_mesh(resolution: usize) -> TetrahedralMesh {
    assert!(resolution > 0, "sphere mesh resolution must be > 0");

    let n = resolution;
    let np = n + 1;
    let h = 2.0 / n as f64;
    let index = |i: usize, j: usize, k: usize| i + np * (j + np * k);

    let mut vertices = Vec::with_capacity(np * np * np);
    for k in 0..np {
        for j in 0..np {
            for i in 0..np {
                let p = Point::new(
                    -1.0 + h * i as f64,
                    -1.0 + h * j as f64,
                    -1.0 + h * k as f64,
                );
                vertices.push(cube_to_sphere(p));
            }
        }
    }

    let mut tetrahedra = Vec::with_capacity(6 * n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                for perm in AXIS_PERMUTATIONS {
                    let mut ijk = [i, j, k];
                    let mut path = [0; 4];
                    path[0] = index(ijk[0], ijk[1], ijk[2]);
                    for (step, &axis) in perm.iter().enumerate() {
                        ijk[axis] += 1;
                        path[step + 1] = index(ijk[0], ijk[1], ijk[2]);
                    }
                    tetrahedra.push(TetrahedronIndex(path[0], path[1], path[2], path[3]));
                }
            }
        }
    }

    TetrahedralMesh::new(vertices, tetrahedra)
}

/// Returns `true` if the point's distance from the origin is within
/// `tolerance` of 1.
pub fn is_on_sphere_surface(point: Point, tolerance: f64) -> bool {
    (point.radius() - 1.0).abs() < tolerance
}

fn cube_to_sphere(p: Point) -> Point {
    let r = p.radius();
    if r < 1e-14 {
        return p;
    }
    p.scale(p.max_norm() / r)
}
