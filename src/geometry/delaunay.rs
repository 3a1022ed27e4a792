use crate::core::structure::Structure;
use delaunay::core::builder::DelaunayTriangulationBuilder;
use delaunay::core::vertex::{Vertex, VertexBuilder};
use delaunay::geometry::kernel::RobustKernel;
use delaunay::geometry::point::Point;
use delaunay::geometry::traits::coordinate::Coordinate;
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

const BARYCENTRIC_TOLERANCE: f64 = 1e-6;

// ============================================================================
// TRIANGULATION
// ============================================================================

/// Delaunay tetrahedralization of `points`, returned as quadruples of input indices.
///
/// Each vertex carries its input index as payload so that cells map back onto `points`.
/// A construction failure is logged and yields no tetrahedra.
fn triangulate(points: &[Vector3<f64>]) -> Vec<[usize; 4]> {
    if points.len() < 4 {
        return Vec::new();
    }
    let vertices: Vec<Vertex<f64, usize, 3>> = match points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            VertexBuilder::default()
                .point(Point::new([p.x, p.y, p.z]))
                .data(i)
                .build()
        })
        .collect::<Result<_, _>>()
    {
        Ok(vertices) => vertices,
        Err(e) => {
            warn!("could not build triangulation vertices: {e}");
            return Vec::new();
        }
    };

    let kernel = RobustKernel::new();
    let dt = match DelaunayTriangulationBuilder::from_vertices(&vertices)
        .build_with_kernel::<_, ()>(&kernel)
    {
        Ok(dt) => dt,
        Err(e) => {
            warn!("delaunay triangulation of {} points failed: {e}", points.len());
            return Vec::new();
        }
    };

    let tds = dt.tds();
    tds.cell_keys()
        .filter_map(|ck| {
            let cell = tds.get_cell(ck)?;
            let indices = cell
                .vertices()
                .iter()
                .map(|vk| tds.get_vertex_by_key(*vk).and_then(|v| v.data))
                .collect::<Option<Vec<usize>>>()?;
            <[usize; 4]>::try_from(indices).ok()
        })
        .collect()
}

// ============================================================================
// DECOMPOSITION
// ============================================================================

/// A retained tetrahedron with its precomputed barycentric map.
#[derive(Debug, Clone)]
pub struct Simplex {
    pub vertices: [usize; 4],
    origin: Vector3<f64>,
    inverse: Matrix3<f64>,
}

impl Simplex {
    fn contains(&self, p: &Vector3<f64>) -> bool {
        let l = self.inverse * (p - self.origin);
        let l0 = 1.0 - l.x - l.y - l.z;
        l0 >= -BARYCENTRIC_TOLERANCE && l.iter().all(|&c| c >= -BARYCENTRIC_TOLERANCE)
    }
}

/// Tetrahedral decomposition of a point cloud restricted to tetrahedra whose edges are
/// all shorter than a threshold. Used as a volume-membership test.
#[derive(Debug, Clone)]
pub struct TetrahedraDecomposition {
    points: Vec<Vector3<f64>>,
    simplices: Vec<Simplex>,
}

impl TetrahedraDecomposition {
    pub fn new(points: &[Vector3<f64>], max_edge: f64) -> Self {
        let mut simplices = Vec::new();
        for v in triangulate(points) {
            let p: Vec<Vector3<f64>> = v.iter().map(|&i| points[i]).collect();
            let short_edges = (0..4)
                .flat_map(|a| ((a + 1)..4).map(move |b| (a, b)))
                .all(|(a, b)| (p[a] - p[b]).norm() <= max_edge);
            if !short_edges {
                continue;
            }
            let edges = Matrix3::from_columns(&[p[1] - p[0], p[2] - p[0], p[3] - p[0]]);
            if edges.determinant().abs() < 1e-10 {
                continue;
            }
            if let Some(inverse) = edges.try_inverse() {
                simplices.push(Simplex {
                    vertices: v,
                    origin: p[0],
                    inverse,
                });
            }
        }
        debug!(
            "tetrahedral decomposition: {} points, {} simplices kept",
            points.len(),
            simplices.len()
        );
        Self {
            points: points.to_vec(),
            simplices,
        }
    }

    /// Decomposition of the atoms at `indices`, padded with the periodic images that fall
    /// within `max_edge` of the cell along its periodic axes.
    pub fn for_structure(structure: &Structure, indices: &[usize], max_edge: f64) -> Self {
        let lattice = &structure.lattice;
        let wrapped = structure.wrapped();
        let mut margin = [0.0; 3];
        for axis in 0..3 {
            if structure.pbc[axis] {
                margin[axis] = max_edge * lattice.reciprocal_matrix.column(axis).norm();
            }
        }
        let range = |axis: usize| if structure.pbc[axis] { -1..=1 } else { 0..=0 };

        let mut points = Vec::with_capacity(indices.len() * 4);
        for &idx in indices {
            if let Some(atom) = wrapped.atoms.get(idx) {
                points.push(lattice.to_cartesian(&atom.fractional_coords));
            }
        }
        for i in range(0) {
            for j in range(1) {
                for k in range(2) {
                    if i == 0 && j == 0 && k == 0 {
                        continue;
                    }
                    let shift = Vector3::new(i as f64, j as f64, k as f64);
                    for &idx in indices {
                        let Some(atom) = wrapped.atoms.get(idx) else {
                            continue;
                        };
                        let f = atom.fractional_coords + shift;
                        let within =
                            (0..3).all(|a| f[a] >= -margin[a] && f[a] <= 1.0 + margin[a]);
                        if within {
                            points.push(lattice.to_cartesian(&f));
                        }
                    }
                }
            }
        }
        Self::new(&points, max_edge)
    }

    /// Index of a simplex containing `point`, if any.
    pub fn find_simplex(&self, point: &Vector3<f64>) -> Option<usize> {
        self.simplices.iter().position(|s| s.contains(point))
    }

    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        self.find_simplex(point).is_some()
    }

    pub fn simplices(&self) -> &[Simplex] {
        &self.simplices
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.simplices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simplices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube(a: f64) -> Vec<Vector3<f64>> {
        let mut pts = Vec::new();
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    pts.push(Vector3::new(i as f64, j as f64, k as f64) * a);
                }
            }
        }
        pts
    }

    fn total_volume(d: &TetrahedraDecomposition) -> f64 {
        d.simplices()
            .iter()
            .map(|s| {
                let p: Vec<_> = s.vertices.iter().map(|&i| d.points()[i]).collect();
                Matrix3::from_columns(&[p[1] - p[0], p[2] - p[0], p[3] - p[0]])
                    .determinant()
                    .abs()
                    / 6.0
            })
            .sum()
    }

    #[test]
    fn cube_is_tiled_without_gaps() {
        let d = TetrahedraDecomposition::new(&cube(2.0), 10.0);
        assert!(d.len() >= 5);
        assert_relative_eq!(total_volume(&d), 8.0, epsilon = 1e-4);
        assert!(d.contains(&Vector3::new(1.0, 1.0, 1.0)));
        assert!(d.contains(&Vector3::new(0.1, 1.9, 0.5)));
        assert!(!d.contains(&Vector3::new(2.5, 1.0, 1.0)));
    }

    #[test]
    fn flat_grids_fill_their_hull() {
        for (nx, ny, nz, spacing) in [(5, 5, 2, 1.0), (8, 8, 2, 2.5), (10, 10, 3, 2.0)] {
            let mut pts = Vec::new();
            for i in 0..nx {
                for j in 0..ny {
                    for k in 0..nz {
                        pts.push(Vector3::new(i as f64, j as f64, k as f64) * spacing);
                    }
                }
            }
            let hull = ((nx - 1) * (ny - 1) * (nz - 1)) as f64 * spacing.powi(3);
            let d = TetrahedraDecomposition::new(&pts, 100.0);
            assert_relative_eq!(total_volume(&d), hull, max_relative = 1e-6);
        }
    }

    #[test]
    fn long_edges_are_discarded() {
        let d = TetrahedraDecomposition::new(&cube(2.0), 1.0);
        assert!(d.is_empty());
        assert_eq!(d.find_simplex(&Vector3::new(1.0, 1.0, 1.0)), None);
    }

    #[test]
    fn too_few_points_give_an_empty_decomposition() {
        let d = TetrahedraDecomposition::new(&cube(1.0)[..3], 5.0);
        assert!(d.is_empty());
    }
}
