use crate::Point;
use crate::Vector;
use crate::fem::element::{p2_gradients, p2_values};
use crate::fem::space::{LagrangeSpace, MixedSpace};
use std::sync::Arc;

/// Scalar finite-element function on a [`LagrangeSpace`].
#[derive(Debug, Clone)]
pub struct Field {
    space: Arc<LagrangeSpace>,
    values: Vec<f64>,
}

impl Field {
    pub fn zeros(space: Arc<LagrangeSpace>) -> Self {
        let n = space.dimension();
        Self {
            space,
            values: vec![0.0; n],
        }
    }

    /// Nodal interpolation of an analytic expression.
    pub fn interpolate<F: Fn(Point) -> f64>(space: Arc<LagrangeSpace>, f: F) -> Self {
        let values = space.dof_coordinates().iter().map(|&p| f(p)).collect();
        Self { space, values }
    }

    /// Panics if `values` does not match the space dimension.
    pub fn from_values(space: Arc<LagrangeSpace>, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            space.dimension(),
            "field has {} values but the space has {} DOFs",
            values.len(),
            space.dimension()
        );
        Self { space, values }
    }

    pub fn space(&self) -> &Arc<LagrangeSpace> {
        &self.space
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Copies the coefficients of `other`, which must live on a compatible space.
    pub fn assign(&mut self, other: &Field) {
        assert!(
            self.space.is_compatible(&other.space),
            "cannot assign a field from an incompatible space"
        );
        self.values.copy_from_slice(&other.values);
    }

    pub fn view(&self) -> ScalarView<'_> {
        ScalarView {
            space: &self.space,
            values: &self.values,
        }
    }

    pub fn eval(&self, cell: usize, lambda: &[f64; 4]) -> f64 {
        self.view().eval(cell, lambda)
    }
}

/// Read-only scalar function over a slice of coefficients.
#[derive(Debug, Clone, Copy)]
pub struct ScalarView<'a> {
    space: &'a LagrangeSpace,
    values: &'a [f64],
}

impl<'a> ScalarView<'a> {
    pub fn new(space: &'a LagrangeSpace, values: &'a [f64]) -> Self {
        assert_eq!(
            values.len(),
            space.dimension(),
            "view has {} values but the space has {} DOFs",
            values.len(),
            space.dimension()
        );
        Self { space, values }
    }

    pub fn space(&self) -> &'a LagrangeSpace {
        self.space
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    /// Values at the mesh vertices (the first DOFs of both P1 and P2).
    pub fn vertex_values(&self) -> &'a [f64] {
        &self.values[..self.space.mesh().vertex_count()]
    }

    pub fn eval(&self, cell: usize, lambda: &[f64; 4]) -> f64 {
        let dofs = self.space.cell_dofs(cell);
        match self.space.degree() {
            1 => dofs
                .iter()
                .zip(lambda.iter())
                .map(|(&d, &l)| l * self.values[d])
                .sum(),
            _ => dofs
                .iter()
                .zip(p2_values(lambda).iter())
                .map(|(&d, &n)| n * self.values[d])
                .sum(),
        }
    }

    pub fn gradient(&self, cell: usize, lambda: &[f64; 4], grad_lambda: &[Vector; 4]) -> Vector {
        let dofs = self.space.cell_dofs(cell);
        match self.space.degree() {
            1 => dofs
                .iter()
                .zip(grad_lambda.iter())
                .fold(Vector::zero(), |acc, (&d, &g)| acc + g * self.values[d]),
            _ => dofs
                .iter()
                .zip(p2_gradients(lambda, grad_lambda).iter())
                .fold(Vector::zero(), |acc, (&d, &g)| acc + g * self.values[d]),
        }
    }
}

/// Read-only velocity projection of a [`MixedField`].
#[derive(Debug, Clone, Copy)]
pub struct VelocityView<'a> {
    components: [ScalarView<'a>; 3],
}

impl<'a> VelocityView<'a> {
    pub fn component(&self, i: usize) -> ScalarView<'a> {
        self.components[i]
    }

    pub fn eval(&self, cell: usize, lambda: &[f64; 4]) -> Vector {
        Vector::new(
            self.components[0].eval(cell, lambda),
            self.components[1].eval(cell, lambda),
            self.components[2].eval(cell, lambda),
        )
    }

    pub fn divergence(&self, cell: usize, lambda: &[f64; 4], grad_lambda: &[Vector; 4]) -> f64 {
        (0..3)
            .map(|k| {
                self.components[k]
                    .gradient(cell, lambda, grad_lambda)
                    .component(k)
            })
            .sum()
    }

    /// Value and divergence at the same point.
    pub fn eval_with_divergence(
        &self,
        cell: usize,
        lambda: &[f64; 4],
        grad_lambda: &[Vector; 4],
    ) -> (Vector, f64) {
        (
            self.eval(cell, lambda),
            self.divergence(cell, lambda, grad_lambda),
        )
    }

    /// Velocity vectors at the mesh vertices.
    pub fn vertex_vectors(&self) -> Vec<[f64; 3]> {
        let [x, y, z] = self.components.map(|c| c.vertex_values());
        x.iter()
            .zip(y.iter())
            .zip(z.iter())
            .map(|((&a, &b), &c)| [a, b, c])
            .collect()
    }
}

/// Coefficient vector over the mixed (velocity, pressure, compaction) space.
#[derive(Debug, Clone)]
pub struct MixedField {
    space: Arc<MixedSpace>,
    values: Vec<f64>,
}

impl MixedField {
    pub fn zeros(space: Arc<MixedSpace>) -> Self {
        let n = space.dimension();
        Self {
            space,
            values: vec![0.0; n],
        }
    }

    pub fn from_values(space: Arc<MixedSpace>, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            space.dimension(),
            "mixed field has {} values but the space has {} DOFs",
            values.len(),
            space.dimension()
        );
        Self { space, values }
    }

    pub fn space(&self) -> &Arc<MixedSpace> {
        &self.space
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn velocity(&self) -> VelocityView<'_> {
        let vs = self.space.velocity_space();
        let n2 = vs.dimension();
        let component = |k: usize| {
            let off = self.space.velocity_offset(k);
            ScalarView::new(vs, &self.values[off..off + n2])
        };
        VelocityView {
            components: [component(0), component(1), component(2)],
        }
    }

    pub fn pressure(&self) -> ScalarView<'_> {
        let ss = self.space.scalar_space();
        let off = self.space.pressure_offset();
        ScalarView::new(ss, &self.values[off..off + ss.dimension()])
    }

    pub fn compaction(&self) -> ScalarView<'_> {
        let ss = self.space.scalar_space();
        let off = self.space.compaction_offset();
        ScalarView::new(ss, &self.values[off..off + ss.dimension()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::element::CellGeometry;
    use crate::fem::space::build_spaces;
    use crate::geom::mesh::generate_sphere_mesh;

    #[test]
    fn test_interpolate_and_eval_p1() {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(2)));
        let f = |p: Point| 1.0 + 2.0 * p.x - p.z;
        let field = Field::interpolate(spaces.porosity.clone(), f);
        let mesh = spaces.porosity.mesh();
        let lambda = [0.1, 0.2, 0.3, 0.4];
        for cell in 0..mesh.tetrahedra_count() {
            let x = CellGeometry::new(mesh, cell).map(&lambda);
            assert!((field.eval(cell, &lambda) - f(x)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_assign_copies_values() {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(2)));
        let mut a = Field::zeros(spaces.porosity.clone());
        let b = Field::interpolate(spaces.melting_rate.clone(), |p| p.y);
        a.assign(&b);
        assert_eq!(a.values(), b.values());
    }

    #[test]
    #[should_panic(expected = "field has")]
    fn test_wrong_length_panics() {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(2)));
        let _ = Field::from_values(spaces.porosity.clone(), vec![0.0; 3]);
    }

    #[test]
    fn test_mixed_views_project_blocks() {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(2)));
        let mixed = spaces.mixed.clone();
        let vs = mixed.velocity_space();
        let ss = mixed.scalar_space();

        // u = (x, 2y, -3z), p = 7, c = -1
        let mut values = vec![0.0; mixed.dimension()];
        for (i, p) in vs.dof_coordinates().iter().enumerate() {
            values[mixed.velocity_offset(0) + i] = p.x;
            values[mixed.velocity_offset(1) + i] = 2.0 * p.y;
            values[mixed.velocity_offset(2) + i] = -3.0 * p.z;
        }
        for i in 0..ss.dimension() {
            values[mixed.pressure_offset() + i] = 7.0;
            values[mixed.compaction_offset() + i] = -1.0;
        }
        let u = MixedField::from_values(mixed.clone(), values);

        let mesh = mixed.mesh();
        let lambda = [0.3, 0.3, 0.2, 0.2];
        let geo = CellGeometry::new(mesh, 3);
        let x = geo.map(&lambda);
        let (vel, div) = u.velocity().eval_with_divergence(3, &lambda, &geo.grad_lambda);
        assert!(vel.is_close(&Vector::new(x.x, 2.0 * x.y, -3.0 * x.z)));
        assert!(div.abs() < 1e-12);
        assert!((u.pressure().eval(3, &lambda) - 7.0).abs() < 1e-14);
        assert!((u.compaction().eval(3, &lambda) + 1.0).abs() < 1e-14);
        assert_eq!(u.velocity().vertex_vectors().len(), mesh.vertex_count());
    }
}
