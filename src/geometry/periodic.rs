use crate::chemistry::elements::covalent_radius;
use crate::core::structure::{Lattice, Structure};
use nalgebra::{DMatrix, Vector3};

/// Values closer than this to 0 or 1 after wrapping are snapped to 0.
pub const WRAP_PRECISION: f64 = 1e-5;

// ============================================================================
// WRAPPING
// ============================================================================

pub fn wrap_coordinate(value: f64) -> f64 {
    wrap_coordinate_with(value, WRAP_PRECISION)
}

/// Maps `value` into [0, 1), snapping values within `precision` of either end to 0.
pub fn wrap_coordinate_with(value: f64, precision: f64) -> f64 {
    let wrapped = value.rem_euclid(1.0);
    if wrapped < precision || (1.0 - wrapped) < precision {
        0.0
    } else {
        wrapped
    }
}

/// Wraps fractional positions along the periodic axes.
pub fn wrap_positions(
    positions: &[Vector3<f64>],
    pbc: [bool; 3],
    precision: f64,
) -> Vec<Vector3<f64>> {
    positions
        .iter()
        .map(|p| {
            let mut out = *p;
            for axis in 0..3 {
                if pbc[axis] {
                    out[axis] = wrap_coordinate_with(p[axis], precision);
                }
            }
            out
        })
        .collect()
}

// ============================================================================
// DISPLACEMENTS & DISTANCES
// ============================================================================

/// Dense `rows x cols` table of displacement vectors `pos1[i] - pos2[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementTensor {
    rows: usize,
    cols: usize,
    data: Vec<Vector3<f64>>,
}

impl DisplacementTensor {
    pub fn get(&self, i: usize, j: usize) -> Vector3<f64> {
        self.data[i * self.cols + j]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn norms(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows, self.cols, |i, j| self.get(i, j).norm())
    }
}

/// Pairwise cartesian displacements `pos1[i] - pos2[j]`.
///
/// With `mic` set, every displacement is replaced by its shortest periodic image along
/// the axes flagged in `pbc`.
pub fn displacement_tensor(
    pos1: &[Vector3<f64>],
    pos2: &[Vector3<f64>],
    lattice: &Lattice,
    pbc: [bool; 3],
    mic: bool,
) -> DisplacementTensor {
    let use_mic = mic && pbc.iter().any(|&p| p);
    let frac1: Vec<Vector3<f64>> = pos1.iter().map(|p| lattice.to_fractional(p)).collect();
    let frac2: Vec<Vector3<f64>> = pos2.iter().map(|p| lattice.to_fractional(p)).collect();

    let mut data = Vec::with_capacity(pos1.len() * pos2.len());
    for (i, p1) in pos1.iter().enumerate() {
        for (j, p2) in pos2.iter().enumerate() {
            if use_mic {
                data.push(lattice.shortest_distance_vector(&frac2[j], &frac1[i], pbc));
            } else {
                data.push(p1 - p2);
            }
        }
    }
    DisplacementTensor {
        rows: pos1.len(),
        cols: pos2.len(),
        data,
    }
}

/// Plain (non-periodic) displacements between all atoms of `structure`.
pub fn displacement_tensor_finite(structure: &Structure) -> DisplacementTensor {
    let positions = structure.cartesian_positions();
    displacement_tensor(&positions, &positions, &structure.lattice, structure.pbc, false)
}

pub fn distance_matrix(
    pos1: &[Vector3<f64>],
    pos2: &[Vector3<f64>],
    lattice: &Lattice,
    pbc: [bool; 3],
    mic: bool,
) -> DMatrix<f64> {
    displacement_tensor(pos1, pos2, lattice, pbc, mic).norms()
}

/// Minimum-image distances with both covalent radii removed, floored at zero.
pub fn distance_matrix_radii_pbc(structure: &Structure) -> DMatrix<f64> {
    let positions = structure.cartesian_positions();
    let radii: Vec<f64> = structure
        .atoms
        .iter()
        .map(|a| covalent_radius(a.number))
        .collect();
    let distances = distance_matrix(&positions, &positions, &structure.lattice, structure.pbc, true);
    DMatrix::from_fn(distances.nrows(), distances.ncols(), |i, j| {
        if i == j {
            0.0
        } else {
            (distances[(i, j)] - radii[i] - radii[j]).max(0.0)
        }
    })
}

// ============================================================================
// NEIGHBOURING CELLS
// ============================================================================

/// Integer translation factors whose images can hold points within `cutoff` of the cell.
///
/// The number of images along a periodic axis is the cutoff divided by the spacing of the
/// lattice planes spanned by the other two vectors, rounded up. Non-periodic axes get zero.
pub fn neighbour_cells(lattice: &Lattice, cutoff: f64, pbc: [bool; 3]) -> Vec<Vector3<i32>> {
    let mut reach = [0_i32; 3];
    for axis in 0..3 {
        if pbc[axis] {
            let inverse_spacing = lattice.reciprocal_matrix.column(axis).norm();
            reach[axis] = (cutoff * inverse_spacing).ceil().max(0.0) as i32;
        }
    }
    let mut factors = Vec::new();
    for i in -reach[0]..=reach[0] {
        for j in -reach[1]..=reach[1] {
            for k in -reach[2]..=reach[2] {
                factors.push(Vector3::new(i, j, k));
            }
        }
    }
    factors
}

pub fn translations(lattice: &Lattice, factors: &[Vector3<i32>]) -> Vec<Vector3<f64>> {
    factors
        .iter()
        .map(|f| lattice.to_cartesian(&f.cast::<f64>()))
        .collect()
}

// ============================================================================
// THICKNESS
// ============================================================================

/// Unit normal of the plane spanned by the two basis vectors other than `axis`.
pub fn axis_normal(lattice: &Lattice, axis: usize) -> Vector3<f64> {
    let a = lattice.vector((axis + 1) % 3);
    let b = lattice.vector((axis + 2) % 3);
    let n = a.cross(&b);
    let n = n / n.norm();
    if n.dot(&lattice.vector(axis)) < 0.0 {
        -n
    } else {
        n
    }
}

/// Extent of the atoms along the normal of the plane opposite to `axis`.
pub fn thickness(structure: &Structure, axis: usize) -> f64 {
    let normal = axis_normal(&structure.lattice, axis);
    let heights: Vec<f64> = structure
        .cartesian_positions()
        .iter()
        .map(|p| p.dot(&normal))
        .collect();
    let max = heights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = heights.iter().copied().fold(f64::INFINITY, f64::min);
    if heights.is_empty() {
        0.0
    } else {
        max - min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn wrapping_snaps_values_near_the_cell_edges() {
        assert_abs_diff_eq!(wrap_coordinate(1.25), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_coordinate(-0.25), 0.75, epsilon = 1e-12);
        assert_eq!(wrap_coordinate(0.999999), 0.0);
        assert_eq!(wrap_coordinate(-0.000001), 0.0);
        assert_eq!(wrap_coordinate(1.0), 0.0);
    }

    #[test]
    fn displacement_with_partial_periodicity() {
        let lattice = Lattice::cubic(1.0).unwrap();
        let pos1 = [Vector3::new(0.0, 0.0, 0.0)];
        let pos2 = [Vector3::new(1.0, 1.0, 1.0)];

        let plain = displacement_tensor(&pos1, &pos2, &lattice, [true, false, false], false);
        assert_relative_eq!(plain.get(0, 0), Vector3::new(-1.0, -1.0, -1.0));

        let folded = displacement_tensor(&pos1, &pos2, &lattice, [true, false, false], true);
        assert_abs_diff_eq!(folded.get(0, 0), Vector3::new(0.0, -1.0, -1.0), epsilon = 1e-12);

        let full = displacement_tensor(&pos1, &pos2, &lattice, [true, true, true], true);
        assert_abs_diff_eq!(full.get(0, 0), Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn neighbour_cells_cover_the_cutoff() {
        let lattice = Lattice::cubic(2.0).unwrap();
        let factors = neighbour_cells(&lattice, 3.0, [true, true, false]);
        // ceil(3 / 2) = 2 images each way in a and b, none along c.
        assert_eq!(factors.len(), 25);
        assert!(factors.iter().all(|f| f.z == 0));
        assert!(factors.contains(&Vector3::new(-2, 2, 0)));
    }

    #[test]
    fn thickness_follows_the_plane_normal() {
        let lattice =
            Lattice::from_rows([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [1.0, 0.0, 10.0]]).unwrap();
        let s = Structure::from_cartesian(
            lattice,
            &[6, 6],
            &[Vector3::new(0.0, 0.0, 1.0), Vector3::new(3.0, 1.0, 2.5)],
            [true, true, false],
        )
        .unwrap();
        assert_relative_eq!(thickness(&s, 2), 1.5, epsilon = 1e-12);
    }
}
