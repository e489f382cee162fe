use crate::Point;
use crate::fem::element::{P1_DOFS, P2_DOFS};
use crate::geom::mesh::{MeshTopology, TetrahedralMesh};
use std::sync::Arc;

/// Local DOF count of the mixed element: 3 x P2 velocity + P1 pressure + P1 compaction.
pub const MIXED_DOFS_PER_CELL: usize = 3 * P2_DOFS + 2 * P1_DOFS;

/// Scalar continuous Lagrange space of degree 1 or 2.
///
/// P1 DOFs are the mesh vertices. P2 DOFs are the vertices followed by the
/// edge midpoints, numbered `vertex_count + edge_index`.
#[derive(Debug, Clone)]
pub struct LagrangeSpace {
    mesh: Arc<TetrahedralMesh>,
    topology: Arc<MeshTopology>,
    degree: usize,
    /// Flattened `dofs_per_cell` entries per cell.
    cell_dofs: Vec<usize>,
    dof_coordinates: Vec<Point>,
}

impl LagrangeSpace {
    pub fn new(mesh: Arc<TetrahedralMesh>, topology: Arc<MeshTopology>, degree: usize) -> Self {
        assert!(
            degree == 1 || degree == 2,
            "Lagrange degree {degree} is not supported"
        );
        let nv = mesh.vertex_count();
        let per_cell = if degree == 1 { P1_DOFS } else { P2_DOFS };

        let mut cell_dofs = Vec::with_capacity(per_cell * mesh.tetrahedra_count());
        for (cell, tet) in mesh.tetrahedra.iter().enumerate() {
            cell_dofs.extend_from_slice(&tet.as_array());
            if degree == 2 {
                cell_dofs.extend(topology.cell_edges[cell].iter().map(|&e| nv + e));
            }
        }

        let mut dof_coordinates = mesh.vertices.clone();
        if degree == 2 {
            dof_coordinates.extend(topology.edges.iter().map(|&[a, b]| {
                Point::new_between_2_points(mesh.vertices[a], mesh.vertices[b], 0.5)
            }));
        }

        Self {
            mesh,
            topology,
            degree,
            cell_dofs,
            dof_coordinates,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn dofs_per_cell(&self) -> usize {
        if self.degree == 1 { P1_DOFS } else { P2_DOFS }
    }

    /// Number of global DOFs.
    pub fn dimension(&self) -> usize {
        self.dof_coordinates.len()
    }

    pub fn num_cells(&self) -> usize {
        self.mesh.tetrahedra_count()
    }

    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        let n = self.dofs_per_cell();
        &self.cell_dofs[cell * n..(cell + 1) * n]
    }

    pub fn dof_coordinates(&self) -> &[Point] {
        &self.dof_coordinates
    }

    pub fn mesh(&self) -> &TetrahedralMesh {
        &self.mesh
    }

    pub fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    /// Global DOFs lying on a boundary facet (its vertices and, for P2, its edges).
    pub fn facet_dofs(&self, facet: &[usize; 3]) -> Vec<usize> {
        let mut dofs = facet.to_vec();
        if self.degree == 2 {
            let nv = self.mesh.vertex_count();
            for (a, b) in [(0, 1), (0, 2), (1, 2)] {
                if let Some(e) = self.topology.edge_index(facet[a], facet[b]) {
                    dofs.push(nv + e);
                }
            }
        }
        dofs
    }

    /// Returns `true` when both spaces share the same layout.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.degree == other.degree && Arc::ptr_eq(&self.mesh, &other.mesh)
    }
}

/// Mixed space for (velocity, pressure, compaction) with degrees (2, 1, 1).
///
/// Global layout: `[ux | uy | uz | p | c]`, each velocity block of size
/// `n2` and each scalar block of size `n1`.
#[derive(Debug, Clone)]
pub struct MixedSpace {
    velocity: LagrangeSpace,
    scalar: LagrangeSpace,
}

impl MixedSpace {
    pub fn new(mesh: Arc<TetrahedralMesh>, topology: Arc<MeshTopology>) -> Self {
        Self {
            velocity: LagrangeSpace::new(mesh.clone(), topology.clone(), 2),
            scalar: LagrangeSpace::new(mesh, topology, 1),
        }
    }

    /// Scalar P2 space used for every velocity component.
    pub fn velocity_space(&self) -> &LagrangeSpace {
        &self.velocity
    }

    /// P1 space shared by pressure and compaction.
    pub fn scalar_space(&self) -> &LagrangeSpace {
        &self.scalar
    }

    pub fn velocity_offset(&self, component: usize) -> usize {
        assert!(component < 3, "velocity component {component} out of range");
        component * self.velocity.dimension()
    }

    pub fn pressure_offset(&self) -> usize {
        3 * self.velocity.dimension()
    }

    pub fn compaction_offset(&self) -> usize {
        self.pressure_offset() + self.scalar.dimension()
    }

    pub fn dimension(&self) -> usize {
        3 * self.velocity.dimension() + 2 * self.scalar.dimension()
    }

    pub fn num_cells(&self) -> usize {
        self.velocity.num_cells()
    }

    pub fn mesh(&self) -> &TetrahedralMesh {
        self.velocity.mesh()
    }

    /// Local-to-global map in local order `ux(10) uy(10) uz(10) p(4) c(4)`.
    pub fn cell_dofs(&self, cell: usize) -> [usize; MIXED_DOFS_PER_CELL] {
        let mut dofs = [0; MIXED_DOFS_PER_CELL];
        let v = self.velocity.cell_dofs(cell);
        for comp in 0..3 {
            let off = self.velocity_offset(comp);
            for (i, &d) in v.iter().enumerate() {
                dofs[comp * P2_DOFS + i] = off + d;
            }
        }
        let s = self.scalar.cell_dofs(cell);
        for (i, &d) in s.iter().enumerate() {
            dofs[3 * P2_DOFS + i] = self.pressure_offset() + d;
            dofs[3 * P2_DOFS + P1_DOFS + i] = self.compaction_offset() + d;
        }
        dofs
    }
}

/// All function spaces of the melt-flow problem.
#[derive(Debug, Clone)]
pub struct Spaces {
    pub mixed: Arc<MixedSpace>,
    pub porosity: Arc<LagrangeSpace>,
    pub melting_rate: Arc<LagrangeSpace>,
    pub buoyancy: Arc<LagrangeSpace>,
}

/// Builds the mixed flow space and the three P1 coefficient spaces.
pub fn build_spaces(mesh: Arc<TetrahedralMesh>) -> Spaces {
    let topology = Arc::new(MeshTopology::new(&mesh));
    let p1 = || Arc::new(LagrangeSpace::new(mesh.clone(), topology.clone(), 1));
    Spaces {
        mixed: Arc::new(MixedSpace::new(mesh.clone(), topology.clone())),
        porosity: p1(),
        melting_rate: p1(),
        buoyancy: p1(),
    }
}
