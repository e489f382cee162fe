use crate::Point;
use crate::Vector;
use crate::fem::bc::DirichletBc;
use crate::fem::space::MixedSpace;
use crate::geom::mesh::{TetrahedralMesh, is_on_sphere_surface};

/// Radial tolerance of the surface-membership test.
pub const SURFACE_TOLERANCE: f64 = 0.05;

/// Pure straining flow `(0.05 x, 0.05 y, -0.1 z)`. Divergence free.
pub fn straining_flow(p: Point) -> Vector {
    Vector::new(0.05 * p.x, 0.05 * p.y, -0.1 * p.z)
}

/// Dirichlet condition imposing [`straining_flow`] on the velocity DOFs of
/// every boundary facet whose vertices all lie on the sphere surface.
///
/// Pressure and compaction are left free.
pub fn straining_flow_bc(space: &MixedSpace, mesh: &TetrahedralMesh, tolerance: f64) -> DirichletBc {
    let vs = space.velocity_space();
    assert_eq!(
        mesh.vertex_count(),
        vs.mesh().vertex_count(),
        "boundary mesh does not match the function space"
    );

    let coords = vs.dof_coordinates();
    let mut pairs = Vec::new();
    for facet in &vs.topology().boundary_facets {
        let on_surface = facet
            .vertices
            .iter()
            .all(|&v| is_on_sphere_surface(mesh.vertices[v], tolerance));
        if !on_surface {
            continue;
        }
        for dof in vs.facet_dofs(&facet.vertices) {
            let value = straining_flow(coords[dof]);
            for k in 0..3 {
                pairs.push((space.velocity_offset(k) + dof, value.component(k)));
            }
        }
    }
    DirichletBc::new(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::space::build_spaces;
    use crate::geom::mesh::generate_sphere_mesh;
    use std::sync::Arc;

    #[test]
    fn test_straining_flow_is_divergence_free() {
        let u = straining_flow(Point::new(1.0, 2.0, 3.0));
        assert!(u.is_close(&Vector::new(0.05, 0.1, -0.3)));

        // Finite-difference divergence
        let h = 1e-3;
        let p = Point::new(0.3, -0.2, 0.5);
        let d = |axis: usize| {
            let mut a = p;
            let mut b = p;
            match axis {
                0 => (a.x, b.x) = (p.x - h, p.x + h),
                1 => (a.y, b.y) = (p.y - h, p.y + h),
                _ => (a.z, b.z) = (p.z - h, p.z + h),
            }
            (straining_flow(b).component(axis) - straining_flow(a).component(axis)) / (2.0 * h)
        };
        assert!((d(0) + d(1) + d(2)).abs() < 1e-12);
    }

    #[test]
    fn test_bc_constrains_all_surface_velocity_dofs() {
        let mesh = Arc::new(generate_sphere_mesh(3));
        let spaces = build_spaces(mesh.clone());
        let bc = straining_flow_bc(&spaces.mixed, &mesh, SURFACE_TOLERANCE);

        let vs = spaces.mixed.velocity_space();
        let n_surface_dofs = {
            let mut dofs: Vec<usize> = vs
                .topology()
                .boundary_facets
                .iter()
                .flat_map(|f| vs.facet_dofs(&f.vertices))
                .collect();
            dofs.sort_unstable();
            dofs.dedup();
            dofs.len()
        };
        assert_eq!(bc.len(), 3 * n_surface_dofs);
        assert!(bc.dofs().iter().all(|&d| d < spaces.mixed.pressure_offset()));

        // Values match the analytic field at the DOF coordinates
        for (&d, &v) in bc.dofs().iter().zip(bc.values()) {
            let n2 = vs.dimension();
            let (k, local) = (d / n2, d % n2);
            let expected = straining_flow(vs.dof_coordinates()[local]).component(k);
            assert!((v - expected).abs() < 1e-15);
        }
    }

    #[test]
    fn test_tight_tolerance_excludes_nothing_on_exact_sphere() {
        let mesh = Arc::new(generate_sphere_mesh(2));
        let spaces = build_spaces(mesh.clone());
        let loose = straining_flow_bc(&spaces.mixed, &mesh, SURFACE_TOLERANCE);
        let tight = straining_flow_bc(&spaces.mixed, &mesh, 1e-9);
        assert_eq!(loose.len(), tight.len());
        let none = straining_flow_bc(&spaces.mixed, &mesh, 0.0);
        assert!(none.is_empty());
    }
}
