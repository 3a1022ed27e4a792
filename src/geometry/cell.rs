use crate::chemistry::elements::covalent_radius;
use crate::core::error::StructureError;
use crate::core::structure::{Lattice, Structure};
use crate::geometry::intervals::Intervals;
use crate::geometry::periodic::{wrap_coordinate, wrap_coordinate_with, WRAP_PRECISION};

/// Distance between the two lattice planes bounding the cell along `axis`.
pub fn plane_spacing(lattice: &Lattice, axis: usize) -> f64 {
    1.0 / lattice.reciprocal_matrix.column(axis).norm()
}

/// Largest empty span of the wrapped fractional coordinates along `axis`, including the
/// span that crosses the cell boundary. Returned as (lower, upper) with `upper` possibly
/// beyond 1.
fn largest_fractional_gap(structure: &Structure, axis: usize) -> Option<(f64, f64)> {
    let mut intervals = Intervals::new();
    for atom in &structure.atoms {
        let f = wrap_coordinate(atom.fractional_coords[axis]);
        intervals.add_interval(f, f);
        intervals.add_interval(f + 1.0, f + 1.0);
    }
    intervals.largest_gap()
}

/// Flags the axes along which some empty slab of at least `threshold` separates the
/// covalent spheres of the atoms and their periodic copies.
pub fn vacuum_directions(structure: &Structure, threshold: f64) -> [bool; 3] {
    let mut out = [false; 3];
    for (axis, flag) in out.iter_mut().enumerate() {
        let spacing = plane_spacing(&structure.lattice, axis);
        let mut intervals = Intervals::new();
        for atom in &structure.atoms {
            let h = wrap_coordinate(atom.fractional_coords[axis]) * spacing;
            let r = covalent_radius(atom.number);
            intervals.add_interval(h - r, h + r);
            intervals.add_interval(h + spacing - r, h + spacing + r);
        }
        *flag = intervals.max_distance_between() >= threshold;
    }
    out
}

/// Extent of the material along each axis.
///
/// Axes marked in `vacuum_gaps` report the thickness of the atoms measured across the
/// widest gap; the others report the full plane spacing of the cell.
pub fn dimensions(structure: &Structure, vacuum_gaps: [bool; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for axis in 0..3 {
        let spacing = plane_spacing(&structure.lattice, axis);
        out[axis] = if vacuum_gaps[axis] {
            match largest_fractional_gap(structure, axis) {
                Some((lo, hi)) => (1.0 - (hi - lo)) * spacing,
                None => 0.0,
            }
        } else {
            spacing
        };
    }
    out
}

/// Shrinks the cell along `axis` until it just encloses the atoms.
///
/// The widest vacuum gap along the axis is closed: the lowest atom above the gap moves
/// to fractional height 0 and the basis vector is scaled to the material extent, but never
/// shorter than `min_size`. The returned structure is non-periodic along `axis`.
pub fn minimized_cell(
    structure: &Structure,
    axis: usize,
    min_size: f64,
) -> Result<Structure, StructureError> {
    let (bottom, extent) = match largest_fractional_gap(structure, axis) {
        Some((lo, hi)) => (wrap_coordinate(hi), 1.0 - (hi - lo)),
        None => match structure.atoms.first() {
            Some(atom) => (wrap_coordinate(atom.fractional_coords[axis]), 0.0),
            None => return Ok(structure.clone()),
        },
    };

    let length = structure.lattice.vector(axis).norm();
    let scale = extent.max(min_size / length);

    let mut matrix = structure.lattice.matrix;
    let scaled = matrix.column(axis) * scale;
    matrix.set_column(axis, &scaled);
    let lattice = Lattice::new(matrix)?;

    let mut atoms = structure.atoms.clone();
    for atom in &mut atoms {
        let shifted = wrap_coordinate_with(atom.fractional_coords[axis] - bottom, WRAP_PRECISION);
        atom.fractional_coords[axis] = shifted / scale;
    }

    let mut pbc = structure.pbc;
    pbc[axis] = false;
    Ok(Structure::new(lattice, atoms, pbc))
}

/// Sets the length of the basis vector `axis` while keeping the atoms together.
///
/// The material is first made contiguous across its widest gap along the axis and is then
/// centred in the resized cell. Other axes are untouched.
pub fn with_axis_length(
    structure: &Structure,
    axis: usize,
    length: f64,
) -> Result<Structure, StructureError> {
    let (bottom, extent) = match largest_fractional_gap(structure, axis) {
        Some((lo, hi)) => (wrap_coordinate(hi), 1.0 - (hi - lo)),
        None => (0.0, 0.0),
    };
    let old_length = structure.lattice.vector(axis).norm();
    let ratio = old_length / length;
    let offset = 0.5 * (1.0 - extent * ratio);

    let mut matrix = structure.lattice.matrix;
    let resized = matrix.column(axis) * (length / old_length);
    matrix.set_column(axis, &resized);
    let lattice = Lattice::new(matrix)?;

    let mut atoms = structure.atoms.clone();
    for atom in &mut atoms {
        let height = wrap_coordinate(atom.fractional_coords[axis] - bottom);
        atom.fractional_coords[axis] = height * ratio + offset;
    }
    Ok(Structure::new(lattice, atoms, structure.pbc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn slab() -> Structure {
        // Two carbon layers 1.5 Å apart, straddling the cell boundary along c.
        let lattice = Lattice::from_rows([[2.5, 0.0, 0.0], [0.0, 2.5, 0.0], [0.0, 0.0, 20.0]])
            .unwrap();
        Structure::from_cartesian(
            lattice,
            &[6, 6],
            &[Vector3::new(0.0, 0.0, 19.5), Vector3::new(1.25, 1.25, 1.0)],
            [true, true, true],
        )
        .unwrap()
    }

    #[test]
    fn detects_vacuum_only_along_the_open_axis() {
        assert_eq!(vacuum_directions(&slab(), 7.0), [false, false, true]);
    }

    #[test]
    fn dimensions_measure_across_the_gap() {
        let dims = dimensions(&slab(), [false, false, true]);
        assert_relative_eq!(dims[0], 2.5, epsilon = 1e-9);
        assert_relative_eq!(dims[2], 1.5, epsilon = 1e-9);
    }

    #[test]
    fn minimized_cell_closes_the_vacuum() {
        let cell = minimized_cell(&slab(), 2, 1.0).unwrap();
        assert_relative_eq!(cell.lattice.vector(2).norm(), 1.5, epsilon = 1e-9);
        assert_eq!(cell.pbc, [true, true, false]);
        assert_relative_eq!(cell.atoms[0].fractional_coords.z, 0.0, epsilon = 1e-9);
        assert_relative_eq!(cell.atoms[1].fractional_coords.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn resized_axis_keeps_the_slab_intact_and_centred() {
        let resized = with_axis_length(&slab(), 2, 6.0).unwrap();
        assert_relative_eq!(resized.lattice.vector(2).norm(), 6.0, epsilon = 1e-9);
        let z: Vec<f64> = resized.cartesian_positions().iter().map(|p| p.z).collect();
        assert_relative_eq!((z[1] - z[0]).abs(), 1.5, epsilon = 1e-9);
        assert_relative_eq!(0.5 * (z[0] + z[1]), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn minimized_cell_respects_the_minimum_size() {
        let lattice = Lattice::cubic(10.0).unwrap();
        let s = Structure::from_cartesian(lattice, &[6], &[Vector3::new(1.0, 1.0, 4.0)], [true; 3])
            .unwrap();
        let cell = minimized_cell(&s, 2, 1.0).unwrap();
        assert_relative_eq!(cell.lattice.vector(2).norm(), 1.0, epsilon = 1e-9);
    }
}
