use nalgebra::DMatrix;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;

// ============================================================================
// GRAPH REPRESENTATION
// ============================================================================

/// Contact graph over atom indices. Nodes carry the atom index they stand for.
pub struct ContactGraph {
    pub graph: UnGraph<usize, ()>,
}

impl ContactGraph {
    /// Links every pair whose entry in `distances` is at most `threshold`.
    ///
    /// `distances` is expected to be the radii-corrected periodic distance matrix of
    /// [`distance_matrix_radii_pbc`](crate::geometry::distance_matrix_radii_pbc), so the
    /// threshold reads as a bond tolerance on top of covalent contact.
    pub fn from_distances(distances: &DMatrix<f64>, threshold: f64) -> Self {
        let n = distances.nrows().min(distances.ncols());
        let mut graph = UnGraph::<usize, ()>::with_capacity(n, n * 3);
        let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();

        for i in 0..n {
            for j in (i + 1)..n {
                if distances[(i, j)] <= threshold {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }
        Self { graph }
    }

    /// Connected components as sorted index lists, ordered by their smallest member.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let n = self.graph.node_count();
        let mut sets = UnionFind::<usize>::new(n);
        for edge in self.graph.edge_references() {
            sets.union(self.graph[edge.source()], self.graph[edge.target()]);
        }

        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (atom_index, root) in sets.into_labeling().into_iter().enumerate() {
            by_root.entry(root).or_default().push(atom_index);
        }
        let mut components: Vec<Vec<usize>> = by_root.into_values().collect();
        components.sort_unstable_by_key(|c| c[0]);
        components
    }
}

/// Species-aware clusters: groups of atoms chained together by covalent contacts.
///
/// Density clustering with a single minimum sample reduces to connected components of
/// the contact graph, which is what is computed here.
pub fn clusters(dist_matrix_radii_pbc: &DMatrix<f64>, bond_threshold: f64) -> Vec<Vec<usize>> {
    ContactGraph::from_distances(dist_matrix_radii_pbc, bond_threshold).connected_components()
}
