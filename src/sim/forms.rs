//! Weak forms of the two physics blocks.
//!
//! Momentum and compaction (trial `(u, p, c)`, test `(v, q, w)`):
//!
//! ```text
//! a = ∫ 2η ε(u):ε(v) − ∫ p ∇·v − ∫ c ∇·v − ∫ q ∇·u − ∫ k(φ) ∇p·∇q − ∫ w ∇·u − ∫ c w / ζ(φ)
//! L = ∫ B b v_z − ∫ Da Γ q
//! b = ∫ η ∇u:∇v + ∫ (p q / η + k(φ) ∇p·∇q) + ∫ (1/η + 1/ζ(φ)) c w
//! ```
//!
//! Porosity transport, backward Euler with frozen velocity:
//!
//! ```text
//! a_φ  = ∫ φ ψ + dt ∫ (u·∇φ) ψ + dt ∫ (∇·u) φ ψ
//! L_φ  = ∫ φ_prev ψ + dt ∫ (∇·u + Da Γ) ψ
//! bb_φ = ∫ φ ψ
//! ```
//!
//! `b` and `bb_φ` are only used to build preconditioners.

use crate::fem::assembly::{BilinearForm, LinearForm};
use crate::fem::element::{CellGeometry, P1_DOFS, P2_DOFS, p2_gradients, p2_values};
use crate::fem::field::{Field, VelocityView};
use crate::fem::quadrature::QuadratureRule;
use crate::fem::space::{LagrangeSpace, MIXED_DOFS_PER_CELL, MixedSpace};
use crate::sim::params::PhysicalParams;
use ndarray::{Array1, Array2};

/// Local offset of the pressure block in the mixed element.
const P_OFF: usize = 3 * P2_DOFS;
/// Local offset of the compaction block in the mixed element.
const C_OFF: usize = 3 * P2_DOFS + P1_DOFS;

/// Saddle-point operator `a`.
pub struct StokesOperator<'a> {
    space: &'a MixedSpace,
    physics: PhysicalParams,
    porosity: &'a Field,
    rule: QuadratureRule,
}

/// Right-hand side `L`.
pub struct StokesLoad<'a> {
    space: &'a MixedSpace,
    physics: PhysicalParams,
    melting_rate: &'a Field,
    buoyancy: &'a Field,
    rule: QuadratureRule,
}

/// Block-diagonal preconditioner form `b`.
pub struct StokesPreconditioner<'a> {
    space: &'a MixedSpace,
    physics: PhysicalParams,
    porosity: &'a Field,
    rule: QuadratureRule,
}

pub struct StokesForms<'a> {
    pub a: StokesOperator<'a>,
    pub l: StokesLoad<'a>,
    pub b: StokesPreconditioner<'a>,
}

fn assert_p1_coefficient(space: &MixedSpace, field: &Field, name: &str) {
    assert!(
        field.space().degree() == 1
            && field.space().dimension() == space.scalar_space().dimension(),
        "{name} must be a P1 field on the flow mesh"
    );
}

/// Forms of the momentum/compaction system at the given coefficients.
///
/// Panics if a coefficient field does not live on the flow mesh.
pub fn momentum_conservation<'a>(
    space: &'a MixedSpace,
    physics: &PhysicalParams,
    porosity: &'a Field,
    melting_rate: &'a Field,
    buoyancy: &'a Field,
) -> StokesForms<'a> {
    assert_p1_coefficient(space, porosity, "porosity");
    assert_p1_coefficient(space, melting_rate, "melting rate");
    assert_p1_coefficient(space, buoyancy, "buoyancy");

    let rule = QuadratureRule::assembly();
    StokesForms {
        a: StokesOperator {
            space,
            physics: *physics,
            porosity,
            rule: rule.clone(),
        },
        l: StokesLoad {
            space,
            physics: *physics,
            melting_rate,
            buoyancy,
            rule: rule.clone(),
        },
        b: StokesPreconditioner {
            space,
            physics: *physics,
            porosity,
            rule,
        },
    }
}

impl BilinearForm for StokesOperator<'_> {
    type Space = MixedSpace;

    fn space(&self) -> &MixedSpace {
        self.space
    }

    fn cell_matrix(&self, cell: usize) -> Array2<f64> {
        let geo = CellGeometry::new(self.space.mesh(), cell);
        let eta = self.physics.shear_viscosity();
        let mut m = Array2::zeros((MIXED_DOFS_PER_CELL, MIXED_DOFS_PER_CELL));

        for (lambda, w) in self.rule.iter() {
            let wq = w * geo.volume;
            let phi = self.porosity.eval(cell, lambda);
            let k = self.physics.permeability(phi);
            let inv_zeta = 1.0 / self.physics.bulk_viscosity(phi);
            let g = p2_gradients(lambda, &geo.grad_lambda);

            // 2 eta eps(u):eps(v) = eta (delta_ab grad N_i . grad N_j + d_b N_i d_a N_j)
            for j in 0..P2_DOFS {
                for b in 0..3 {
                    let row = b * P2_DOFS + j;
                    for i in 0..P2_DOFS {
                        let gij = g[i].dot(g[j]);
                        for a in 0..3 {
                            let mut v = g[i].component(b) * g[j].component(a);
                            if a == b {
                                v += gij;
                            }
                            m[[row, a * P2_DOFS + i]] += wq * eta * v;
                        }
                    }
                }
            }

            // -p div v, -c div v and their transposes
            for j in 0..P2_DOFS {
                for b in 0..3 {
                    let vel = b * P2_DOFS + j;
                    let div = g[j].component(b);
                    for s in 0..P1_DOFS {
                        let coupling = -wq * lambda[s] * div;
                        m[[vel, P_OFF + s]] += coupling;
                        m[[P_OFF + s, vel]] += coupling;
                        m[[vel, C_OFF + s]] += coupling;
                        m[[C_OFF + s, vel]] += coupling;
                    }
                }
            }

            for s in 0..P1_DOFS {
                for t in 0..P1_DOFS {
                    let stiff = geo.grad_lambda[s].dot(geo.grad_lambda[t]);
                    m[[P_OFF + s, P_OFF + t]] -= wq * k * stiff;
                    m[[C_OFF + s, C_OFF + t]] -= wq * inv_zeta * lambda[s] * lambda[t];
                }
            }
        }
        m
    }
}

impl LinearForm for StokesLoad<'_> {
    type Space = MixedSpace;

    fn space(&self) -> &MixedSpace {
        self.space
    }

    fn cell_vector(&self, cell: usize) -> Array1<f64> {
        let geo = CellGeometry::new(self.space.mesh(), cell);
        let mut f = Array1::zeros(MIXED_DOFS_PER_CELL);

        for (lambda, w) in self.rule.iter() {
            let wq = w * geo.volume;
            let body = self.physics.buoyancy_number * self.buoyancy.eval(cell, lambda);
            let source = self.physics.da * self.melting_rate.eval(cell, lambda);

            if body != 0.0 {
                // Vertical component only
                for (j, n) in p2_values(lambda).iter().enumerate() {
                    f[2 * P2_DOFS + j] += wq * body * n;
                }
            }
            for s in 0..P1_DOFS {
                f[P_OFF + s] -= wq * source * lambda[s];
            }
        }
        f
    }
}

impl BilinearForm for StokesPreconditioner<'_> {
    type Space = MixedSpace;

    fn space(&self) -> &MixedSpace {
        self.space
    }

    fn cell_matrix(&self, cell: usize) -> Array2<f64> {
        let geo = CellGeometry::new(self.space.mesh(), cell);
        let eta = self.physics.shear_viscosity();
        let mut m = Array2::zeros((MIXED_DOFS_PER_CELL, MIXED_DOFS_PER_CELL));

        for (lambda, w) in self.rule.iter() {
            let wq = w * geo.volume;
            let phi = self.porosity.eval(cell, lambda);
            let k = self.physics.permeability(phi);
            let inv_zeta = 1.0 / self.physics.bulk_viscosity(phi);
            let g = p2_gradients(lambda, &geo.grad_lambda);

            for j in 0..P2_DOFS {
                for i in 0..P2_DOFS {
                    let v = wq * eta * g[i].dot(g[j]);
                    for a in 0..3 {
                        m[[a * P2_DOFS + j, a * P2_DOFS + i]] += v;
                    }
                }
            }
            for s in 0..P1_DOFS {
                for t in 0..P1_DOFS {
                    let mass = lambda[s] * lambda[t];
                    let stiff = geo.grad_lambda[s].dot(geo.grad_lambda[t]);
                    m[[P_OFF + s, P_OFF + t]] += wq * (mass / eta + k * stiff);
                    m[[C_OFF + s, C_OFF + t]] += wq * (1.0 / eta + inv_zeta) * mass;
                }
            }
        }
        m
    }
}

/// Transport operator `a_phi`.
pub struct AdvectionOperator<'a> {
    space: &'a LagrangeSpace,
    velocity: VelocityView<'a>,
    dt: f64,
    rule: QuadratureRule,
}

/// Transport right-hand side `L_phi`.
pub struct AdvectionLoad<'a> {
    space: &'a LagrangeSpace,
    velocity: VelocityView<'a>,
    phi_prev: &'a Field,
    melting_rate: &'a Field,
    da: f64,
    dt: f64,
    rule: QuadratureRule,
}

/// P1 mass matrix `bb_phi`.
pub struct PorosityMass<'a> {
    space: &'a LagrangeSpace,
    rule: QuadratureRule,
}

pub struct PorosityForms<'a> {
    pub a: AdvectionOperator<'a>,
    pub l: AdvectionLoad<'a>,
    pub b: PorosityMass<'a>,
}

/// Forms of the porosity transport step over `dt` with frozen `velocity`.
///
/// Panics if the fields do not share the porosity space layout.
pub fn mass_conservation<'a>(
    space: &'a LagrangeSpace,
    physics: &PhysicalParams,
    velocity: VelocityView<'a>,
    phi_prev: &'a Field,
    melting_rate: &'a Field,
    dt: f64,
) -> PorosityForms<'a> {
    assert_eq!(space.degree(), 1, "porosity must use a P1 space");
    assert!(
        phi_prev.space().is_compatible(space) && melting_rate.space().is_compatible(space),
        "porosity and melting rate must live on the porosity space"
    );
    assert_eq!(
        velocity.component(0).space().num_cells(),
        space.num_cells(),
        "velocity and porosity live on different meshes"
    );
    assert!(dt > 0.0, "time step must be > 0");

    let rule = QuadratureRule::assembly();
    PorosityForms {
        a: AdvectionOperator {
            space,
            velocity,
            dt,
            rule: rule.clone(),
        },
        l: AdvectionLoad {
            space,
            velocity,
            phi_prev,
            melting_rate,
            da: physics.da,
            dt,
            rule: rule.clone(),
        },
        b: PorosityMass { space, rule },
    }
}

impl BilinearForm for AdvectionOperator<'_> {
    type Space = LagrangeSpace;

    fn space(&self) -> &LagrangeSpace {
        self.space
    }

    fn cell_matrix(&self, cell: usize) -> Array2<f64> {
        let geo = CellGeometry::new(self.space.mesh(), cell);
        let mut m = Array2::zeros((P1_DOFS, P1_DOFS));
        for (lambda, w) in self.rule.iter() {
            let wq = w * geo.volume;
            let (u, div) = self
                .velocity
                .eval_with_divergence(cell, lambda, &geo.grad_lambda);
            for s in 0..P1_DOFS {
                for t in 0..P1_DOFS {
                    let mass = lambda[t] * lambda[s];
                    let advection = u.dot(geo.grad_lambda[t]) * lambda[s];
                    m[[s, t]] += wq * (mass + self.dt * (advection + div * mass));
                }
            }
        }
        m
    }
}

impl LinearForm for AdvectionLoad<'_> {
    type Space = LagrangeSpace;

    fn space(&self) -> &LagrangeSpace {
        self.space
    }

    fn cell_vector(&self, cell: usize) -> Array1<f64> {
        let geo = CellGeometry::new(self.space.mesh(), cell);
        let mut f = Array1::zeros(P1_DOFS);
        for (lambda, w) in self.rule.iter() {
            let wq = w * geo.volume;
            let div = self.velocity.divergence(cell, lambda, &geo.grad_lambda);
            let phi_prev = self.phi_prev.eval(cell, lambda);
            let gamma = self.melting_rate.eval(cell, lambda);
            let value = phi_prev + self.dt * (div + self.da * gamma);
            for s in 0..P1_DOFS {
                f[s] += wq * value * lambda[s];
            }
        }
        f
    }
}

impl BilinearForm for PorosityMass<'_> {
    type Space = LagrangeSpace;

    fn space(&self) -> &LagrangeSpace {
        self.space
    }

    fn cell_matrix(&self, cell: usize) -> Array2<f64> {
        let geo = CellGeometry::new(self.space.mesh(), cell);
        let mut m = Array2::zeros((P1_DOFS, P1_DOFS));
        for (lambda, w) in self.rule.iter() {
            for s in 0..P1_DOFS {
                for t in 0..P1_DOFS {
                    m[[s, t]] += w * geo.volume * lambda[s] * lambda[t];
                }
            }
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::assembly::{assemble_matrix, assemble_vector};
    use crate::fem::field::MixedField;
    use crate::fem::space::{Spaces, build_spaces};
    use crate::geom::mesh::generate_sphere_mesh;
    use crate::linalg::sparse::spmv;
    use std::sync::Arc;

    fn physics() -> PhysicalParams {
        PhysicalParams {
            da: 2.0,
            viscosity_ratio: 1.0,
            buoyancy_number: 3.0,
            theta: 20.0,
            compaction_length: 0.5,
        }
    }

    fn setup() -> (Spaces, Field, Field, Field) {
        let spaces = build_spaces(Arc::new(generate_sphere_mesh(2)));
        let phi = Field::interpolate(spaces.porosity.clone(), |p| 0.01 + 0.001 * p.x * p.y);
        let gamma = Field::interpolate(spaces.melting_rate.clone(), |_| 0.0);
        let buoy = Field::interpolate(spaces.buoyancy.clone(), |_| 0.0);
        (spaces, phi, gamma, buoy)
    }

    fn is_symmetric(m: &sprs::CsMat<f64>) -> bool {
        m.iter().all(|(&v, (i, j))| {
            let t = m.get(j, i).copied().unwrap_or(0.0);
            (v - t).abs() <= 1e-12 * v.abs().max(1.0)
        })
    }

    #[test]
    fn test_stokes_operator_is_symmetric() {
        let (spaces, phi, gamma, buoy) = setup();
        let forms = momentum_conservation(&spaces.mixed, &physics(), &phi, &gamma, &buoy);
        assert!(is_symmetric(&assemble_matrix(&forms.a)));
        assert!(is_symmetric(&assemble_matrix(&forms.b)));
    }

    #[test]
    fn test_straining_flow_is_in_the_kernel() {
        // Linear, divergence-free velocity with p = c = 0 gives A x = 0 on
        // every row whose test function vanishes on the boundary.
        let (spaces, phi, gamma, buoy) = setup();
        let mixed = spaces.mixed.clone();
        let forms = momentum_conservation(&mixed, &physics(), &phi, &gamma, &buoy);
        let a = assemble_matrix(&forms.a);

        let vs = mixed.velocity_space();
        let mut x = vec![0.0; mixed.dimension()];
        for (i, p) in vs.dof_coordinates().iter().enumerate() {
            x[mixed.velocity_offset(0) + i] = 0.05 * p.x;
            x[mixed.velocity_offset(1) + i] = 0.05 * p.y;
            x[mixed.velocity_offset(2) + i] = -0.1 * p.z;
        }
        let mut y = vec![0.0; x.len()];
        spmv(&a, &x, &mut y);

        // Pressure and compaction rows test with div u = 0
        for i in mixed.pressure_offset()..mixed.dimension() {
            assert!(y[i].abs() < 1e-12, "row {i}: {}", y[i]);
        }
        // Interior velocity rows
        let topo = vs.topology();
        let mut on_boundary = vec![false; vs.dimension()];
        for f in &topo.boundary_facets {
            for d in vs.facet_dofs(&f.vertices) {
                on_boundary[d] = true;
            }
        }
        for k in 0..3 {
            for (i, &b) in on_boundary.iter().enumerate() {
                if !b {
                    let r = mixed.velocity_offset(k) + i;
                    assert!(y[r].abs() < 1e-12, "row {r}: {}", y[r]);
                }
            }
        }
    }

    #[test]
    fn test_stokes_load() {
        let (spaces, phi, _, _) = setup();
        let gamma = Field::interpolate(spaces.melting_rate.clone(), |_| 1.0);
        let buoy = Field::interpolate(spaces.buoyancy.clone(), |_| 1.0);
        let p = physics();
        let forms = momentum_conservation(&spaces.mixed, &p, &phi, &gamma, &buoy);
        let f = assemble_vector(&forms.l);
        let mixed = &spaces.mixed;
        let volume = mixed.mesh().volume();

        let sum = |range: std::ops::Range<usize>| f[range].iter().sum::<f64>();
        let n2 = mixed.velocity_space().dimension();
        // P2 basis is a partition of unity
        assert!((sum(mixed.velocity_offset(2)..mixed.velocity_offset(2) + n2) - p.buoyancy_number * volume).abs() < 1e-12);
        assert!(sum(0..mixed.velocity_offset(2)).abs() < 1e-15);
        assert!((sum(mixed.pressure_offset()..mixed.compaction_offset()) + p.da * volume).abs() < 1e-12);
        assert!(sum(mixed.compaction_offset()..mixed.dimension()).abs() < 1e-15);
    }

    #[test]
    fn test_porosity_forms_without_flow() {
        let (spaces, phi, gamma, _) = setup();
        let state = MixedField::zeros(spaces.mixed.clone());
        let p = physics();
        let forms = mass_conservation(&spaces.porosity, &p, state.velocity(), &phi, &gamma, 0.1);

        // No velocity and no melting: a_phi == bb_phi and L_phi == M phi_prev
        let a = assemble_matrix(&forms.a);
        let b = assemble_matrix(&forms.b);
        for (&v, (i, j)) in a.iter() {
            assert!((v - b.get(i, j).copied().unwrap_or(0.0)).abs() < 1e-15);
        }
        let l = assemble_vector(&forms.l);
        let mut m_phi = vec![0.0; l.len()];
        spmv(&b, phi.values(), &mut m_phi);
        for (x, y) in l.iter().zip(m_phi.iter()) {
            assert!((x - y).abs() < 1e-14);
        }
    }

    #[test]
    fn test_advection_row_sums_conserve_mass() {
        // Sum over test functions of a_phi(phi = 1) = ∫ 1 + dt ∫ div u for u = (x, 0, 0)
        let (spaces, phi, gamma, _) = setup();
        let mixed = spaces.mixed.clone();
        let mut values = vec![0.0; mixed.dimension()];
        for (i, p) in mixed.velocity_space().dof_coordinates().iter().enumerate() {
            values[mixed.velocity_offset(0) + i] = p.x;
        }
        let state = MixedField::from_values(mixed.clone(), values);
        let dt = 0.25;
        let forms = mass_conservation(&spaces.porosity, &physics(), state.velocity(), &phi, &gamma, dt);
        let a = assemble_matrix(&forms.a);
        let ones = vec![1.0; a.cols()];
        let mut y = vec![0.0; a.rows()];
        spmv(&a, &ones, &mut y);
        let volume = mixed.mesh().volume();
        assert!((y.iter().sum::<f64>() - volume * (1.0 + dt)).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "porosity must be a P1 field")]
    fn test_malformed_coefficient_panics() {
        let (spaces, _, gamma, buoy) = setup();
        let topo = Arc::new(crate::geom::mesh::MeshTopology::new(spaces.porosity.mesh()));
        let mesh = Arc::new(spaces.porosity.mesh().clone());
        let p2 = Arc::new(LagrangeSpace::new(mesh, topo, 2));
        let wrong = Field::zeros(p2);
        let _ = momentum_conservation(&spaces.mixed, &physics(), &wrong, &gamma, &buoy);
    }
}
