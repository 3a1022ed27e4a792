use crate::core::error::StructureError;
use nalgebra::{Matrix3, Vector3};

// ============================================================================
// LATTICE
// ============================================================================

/// Periodic lattice. Basis vectors are stored as the *columns* of `matrix`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub matrix: Matrix3<f64>,
    pub reciprocal_matrix: Matrix3<f64>,
}

impl Lattice {
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, StructureError> {
        if matrix.determinant().abs() < 1e-6 {
            return Err(StructureError::DegenerateLattice);
        }
        let reciprocal_matrix = matrix
            .try_inverse()
            .ok_or(StructureError::DegenerateLattice)?
            .transpose();
        Ok(Self {
            matrix,
            reciprocal_matrix,
        })
    }

    /// Builds a lattice from basis vectors given as rows, the usual file layout.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self, StructureError> {
        let matrix = Matrix3::from_fn(|r, c| rows[c][r]);
        Self::new(matrix)
    }

    pub fn cubic(a: f64) -> Result<Self, StructureError> {
        Self::new(Matrix3::from_diagonal_element(a))
    }

    pub fn vector(&self, axis: usize) -> Vector3<f64> {
        self.matrix.column(axis).into_owned()
    }

    /// Basis vectors as rows.
    pub fn rows(&self) -> Matrix3<f64> {
        self.matrix.transpose()
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    pub fn lengths(&self) -> Vector3<f64> {
        Vector3::new(
            self.matrix.column(0).norm(),
            self.matrix.column(1).norm(),
            self.matrix.column(2).norm(),
        )
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * frac
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.reciprocal_matrix.transpose() * cart
    }

    /// Cartesian vector from `f1` to the closest periodic image of `f2`.
    ///
    /// Only axes flagged in `pbc` are folded. Rounding the fractional difference is exact
    /// for orthogonal cells; the neighbouring images are scanned afterwards so that skewed
    /// cells also return the true minimum image.
    pub fn shortest_distance_vector(
        &self,
        f1: &Vector3<f64>,
        f2: &Vector3<f64>,
        pbc: [bool; 3],
    ) -> Vector3<f64> {
        let mut d = f2 - f1;
        for axis in 0..3 {
            if pbc[axis] {
                d[axis] -= d[axis].round();
            }
        }
        let mut best = self.to_cartesian(&d);
        let range = |axis: usize| if pbc[axis] { -1..=1 } else { 0..=0 };
        for i in range(0) {
            for j in range(1) {
                for k in range(2) {
                    if i == 0 && j == 0 && k == 0 {
                        continue;
                    }
                    let shift = Vector3::new(i as f64, j as f64, k as f64);
                    let candidate = self.to_cartesian(&(d + shift));
                    if candidate.norm_squared() < best.norm_squared() - 1e-12 {
                        best = candidate;
                    }
                }
            }
        }
        best
    }
}

// ============================================================================
// ATOMS & STRUCTURES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Atomic number, used as the species identifier throughout.
    pub number: u8,
    pub fractional_coords: Vector3<f64>,
}

impl Atom {
    pub fn new(number: u8, fractional_coords: Vector3<f64>) -> Self {
        Self {
            number,
            fractional_coords,
        }
    }
}

/// An ordered set of atoms inside a lattice with per-axis periodicity.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub lattice: Lattice,
    pub atoms: Vec<Atom>,
    pub pbc: [bool; 3],
}

impl Structure {
    pub fn new(lattice: Lattice, atoms: Vec<Atom>, pbc: [bool; 3]) -> Self {
        Self {
            lattice,
            atoms,
            pbc,
        }
    }

    pub fn from_fractional(
        lattice: Lattice,
        numbers: &[u8],
        positions: &[Vector3<f64>],
        pbc: [bool; 3],
    ) -> Result<Self, StructureError> {
        if numbers.len() != positions.len() {
            return Err(StructureError::LengthMismatch {
                species: numbers.len(),
                positions: positions.len(),
            });
        }
        let atoms = numbers
            .iter()
            .zip(positions)
            .map(|(&number, frac)| Atom::new(number, *frac))
            .collect();
        Ok(Self::new(lattice, atoms, pbc))
    }

    pub fn from_cartesian(
        lattice: Lattice,
        numbers: &[u8],
        positions: &[Vector3<f64>],
        pbc: [bool; 3],
    ) -> Result<Self, StructureError> {
        let fractional: Vec<Vector3<f64>> =
            positions.iter().map(|p| lattice.to_fractional(p)).collect();
        Self::from_fractional(lattice, numbers, &fractional, pbc)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn numbers(&self) -> Vec<u8> {
        self.atoms.iter().map(|a| a.number).collect()
    }

    pub fn fractional_positions(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.fractional_coords).collect()
    }

    pub fn cartesian_positions(&self) -> Vec<Vector3<f64>> {
        self.atoms
            .iter()
            .map(|a| self.lattice.to_cartesian(&a.fractional_coords))
            .collect()
    }

    pub fn cartesian_position(&self, index: usize) -> Option<Vector3<f64>> {
        self.atoms
            .get(index)
            .map(|a| self.lattice.to_cartesian(&a.fractional_coords))
    }

    pub fn n_periodic(&self) -> usize {
        self.pbc.iter().filter(|&&p| p).count()
    }

    pub fn volume(&self) -> f64 {
        self.lattice.volume()
    }

    /// New structure holding only the atoms at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, StructureError> {
        let mut atoms = Vec::with_capacity(indices.len());
        for &i in indices {
            let atom = self.atoms.get(i).ok_or(StructureError::AtomIndexOutOfRange {
                index: i,
                len: self.atoms.len(),
            })?;
            atoms.push(atom.clone());
        }
        Ok(Self::new(self.lattice.clone(), atoms, self.pbc))
    }

    /// Copy with fractional coordinates wrapped into [0, 1) along periodic axes.
    pub fn wrapped(&self) -> Self {
        let mut out = self.clone();
        for atom in &mut out.atoms {
            for axis in 0..3 {
                if self.pbc[axis] {
                    atom.fractional_coords[axis] =
                        crate::geometry::periodic::wrap_coordinate(atom.fractional_coords[axis]);
                }
            }
        }
        out
    }
}
