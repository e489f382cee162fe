use crate::Point;
use crate::Vector;
use crate::fem::element::CellGeometry;
use crate::fem::field::VelocityView;
use crate::fem::quadrature::QuadratureRule;
use rayon::prelude::*;

/// L2 norm of a velocity error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L2Error {
    pub absolute: f64,
    /// Error divided by the L2 norm of the reference field.
    pub relative: f64,
}

/// `||u_h - u||_L2` over the mesh, integrated with the degree-5 rule.
pub fn velocity_l2_error<F>(velocity: &VelocityView<'_>, exact: F) -> L2Error
where
    F: Fn(Point) -> Vector + Sync,
{
    let space = velocity.component(0).space();
    let mesh = space.mesh();
    let rule = QuadratureRule::accurate();

    let (err_sq, ref_sq) = (0..mesh.tetrahedra_count())
        .into_par_iter()
        .map(|cell| {
            let geo = CellGeometry::new(mesh, cell);
            rule.iter().fold((0.0, 0.0), |(e, r), (lambda, w)| {
                let u_ex = exact(geo.map(lambda));
                let diff = velocity.eval(cell, lambda) - u_ex;
                let wq = w * geo.volume;
                (e + wq * diff.dot(diff), r + wq * u_ex.dot(u_ex))
            })
        })
        .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

    let absolute = err_sq.sqrt();
    let relative = if ref_sq > 0.0 {
        absolute / ref_sq.sqrt()
    } else {
        absolute
    };
    L2Error { absolute, relative }
}

/// Largest cell Courant number `|u| dt / h_min`, with `|u|` taken at the
/// cell vertices.
pub fn courant_number(velocity: &VelocityView<'_>, dt: f64) -> f64 {
    let mesh = velocity.component(0).space().mesh();
    let u = velocity.vertex_vectors();
    (0..mesh.tetrahedra_count())
        .into_par_iter()
        .map(|cell| {
            let geo = CellGeometry::new(mesh, cell);
            let speed = mesh.tetrahedra[cell]
                .as_array()
                .iter()
                .map(|&v| Vector::from(u[v]).length())
                .fold(0.0, f64::max);
            speed * dt / geo.min_edge_length()
        })
        .reduce(|| 0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::field::MixedField;
    use crate::fem::space::build_spaces;
    use crate::geom::mesh::generate_sphere_mesh;
    use crate::sim::boundary::straining_flow;
    use std::sync::Arc;

    fn interpolated_state(f: impl Fn(Point) -> Vector) -> MixedField {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(2)));
        let mixed = spaces.mixed.clone();
        let mut values = vec![0.0; mixed.dimension()];
        for (i, &p) in mixed.velocity_space().dof_coordinates().iter().enumerate() {
            let u = f(p);
            for k in 0..3 {
                values[mixed.velocity_offset(k) + i] = u.component(k);
            }
        }
        MixedField::from_values(mixed, values)
    }

    #[test]
    fn test_exact_field_has_zero_error() {
        let state = interpolated_state(straining_flow);
        let err = velocity_l2_error(&state.velocity(), straining_flow);
        assert!(err.absolute < 1e-14 && err.relative < 1e-12);
    }

    #[test]
    fn test_zero_field_has_unit_relative_error() {
        let state = interpolated_state(|_| Vector::zero());
        let err = velocity_l2_error(&state.velocity(), straining_flow);
        assert!((err.relative - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_courant_number_scales_with_dt() {
        let state = interpolated_state(|_| Vector::new(1.0, 0.0, 0.0));
        let c1 = courant_number(&state.velocity(), 0.1);
        let c2 = courant_number(&state.velocity(), 0.2);
        assert!(c1 > 0.0);
        assert!((c2 - 2.0 * c1).abs() < 1e-14);
    }
}
