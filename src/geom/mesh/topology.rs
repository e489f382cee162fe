use crate::geom::mesh::TetrahedralMesh;
use std::collections::HashMap;

/// Local vertex pairs of the six tetrahedron edges.
///
/// The order fixes the numbering of the quadratic edge nodes.
pub const EDGE_VERTICES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Local vertex triples of the four facets; facet `i` is opposite vertex `i`.
pub const FACET_VERTICES: [[usize; 3]; 4] = [[1, 2, 3], [0, 2, 3], [0, 1, 3], [0, 1, 2]];

/// A triangle on the mesh boundary (owned by exactly one tetrahedron).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryFacet {
    /// Sorted global vertex indices.
    pub vertices: [usize; 3],
    /// Index of the adjacent tetrahedron.
    pub cell: usize,
}

/// Edge numbering and boundary facets derived from a tetrahedral mesh.
#[derive(Debug, Clone)]
pub struct MeshTopology {
    pub edges: Vec<[usize; 2]>,
    pub cell_edges: Vec<[usize; 6]>,
    pub boundary_facets: Vec<BoundaryFacet>,
    edge_lookup: HashMap<[usize; 2], usize>,
}

impl MeshTopology {
    /// Builds edges in order of first appearance and collects unmatched
    /// facets as the boundary.
    ///
    /// Panics if a facet is shared by more than two tetrahedra.
    pub fn new(mesh: &TetrahedralMesh) -> Self {
        let mut edges: Vec<[usize; 2]> = Vec::new();
        let mut edge_lookup: HashMap<[usize; 2], usize> = HashMap::new();
        let mut cell_edges = Vec::with_capacity(mesh.tetrahedra.len());
        let mut facet_owners: HashMap<[usize; 3], (usize, usize)> = HashMap::new();

        for (cell, tet) in mesh.tetrahedra.iter().enumerate() {
            let v = tet.as_array();

            let mut local = [0; 6];
            for (e, &(a, b)) in EDGE_VERTICES.iter().enumerate() {
                let key = sorted_edge_key(v[a], v[b]);
                let next = edges.len();
                let idx = *edge_lookup.entry(key).or_insert(next);
                if idx == next {
                    edges.push(key);
                }
                local[e] = idx;
            }
            cell_edges.push(local);

            for facet in FACET_VERTICES {
                let key = sorted_facet_key([v[facet[0]], v[facet[1]], v[facet[2]]]);
                let entry = facet_owners.entry(key).or_insert((cell, 0));
                entry.1 += 1;
                assert!(
                    entry.1 <= 2,
                    "Non-manifold tetrahedral mesh: facet {:?} is shared by more than 2 cells",
                    key
                );
            }
        }

        let mut boundary_facets: Vec<BoundaryFacet> = facet_owners
            .into_iter()
            .filter(|(_, (_, count))| *count == 1)
            .map(|(vertices, (cell, _))| BoundaryFacet { vertices, cell })
            .collect();
        boundary_facets.sort_unstable_by_key(|f| f.vertices);

        Self {
            edges,
            cell_edges,
            boundary_facets,
            edge_lookup,
        }
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Global index of the edge joining two vertices, if it exists.
    pub fn edge_index(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_lookup.get(&sorted_edge_key(a, b)).copied()
    }
}

fn sorted_edge_key(a: usize, b: usize) -> [usize; 2] {
    if a < b { [a, b] } else { [b, a] }
}

fn sorted_facet_key(mut facet: [usize; 3]) -> [usize; 3] {
    facet.sort_unstable();
    facet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;
    use crate::geom::mesh::TetrahedronIndex;

    fn two_tetra_mesh() -> TetrahedralMesh {
        // Two tetrahedra sharing facet (0,1,2) in z=0 plane.
        let vertices = vec![
            Point::new(0.0, 0.0, 0.0),  // 0
            Point::new(1.0, 0.0, 0.0),  // 1
            Point::new(0.0, 1.0, 0.0),  // 2
            Point::new(0.0, 0.0, 1.0),  // 3
            Point::new(0.0, 0.0, -1.0), // 4
        ];
        TetrahedralMesh::new(
            vertices,
            vec![TetrahedronIndex(0, 1, 2, 3), TetrahedronIndex(0, 1, 2, 4)],
        )
    }

    #[test]
    fn test_single_tetra_topology() {
        let mesh = TetrahedralMesh::new(
            vec![
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(0.0, 1.0, 0.0),
                Point::new(0.0, 0.0, 1.0),
            ],
            vec![TetrahedronIndex(0, 1, 2, 3)],
        );
        let topo = MeshTopology::new(&mesh);
        assert_eq!(topo.num_edges(), 6);
        assert_eq!(topo.boundary_facets.len(), 4);
        assert_eq!(topo.cell_edges[0], [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_two_tetra_share_one_facet() {
        let topo = MeshTopology::new(&two_tetra_mesh());
        // 6 + 6 edges, 3 shared
        assert_eq!(topo.num_edges(), 9);
        // 8 local facets, one shared pair
        assert_eq!(topo.boundary_facets.len(), 6);
        assert!(topo.boundary_facets.iter().all(|f| f.vertices != [0, 1, 2]));
        assert!(topo.edge_index(2, 0).is_some());
        assert!(topo.edge_index(3, 4).is_none());
    }

    #[test]
    #[should_panic(expected = "Non-manifold tetrahedral mesh")]
    fn test_non_manifold_facet_panics() {
        let vertices = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(0.0, 0.0, -1.0),
            Point::new(0.0, 0.0, 2.0),
        ];
        let mesh = TetrahedralMesh::new(
            vertices,
            vec![
                TetrahedronIndex(0, 1, 2, 3),
                TetrahedronIndex(0, 1, 2, 4),
                TetrahedronIndex(0, 1, 2, 5),
            ],
        );
        let _ = MeshTopology::new(&mesh);
    }
}
