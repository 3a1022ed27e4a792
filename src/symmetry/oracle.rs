//! Boundary to the numerical symmetry finder.
//!
//! The finder is opaque: it receives a cell and a tolerance and either returns a full
//! dataset or nothing. [`run_isolated`] executes it on a dedicated worker thread so that
//! a panic on pathological geometry surfaces as [`SymmetryError::Normalization`].

use crate::core::error::SymmetryError;
use crate::core::structure::Lattice;
use log::{debug, warn};
use moyo::base::{AngleTolerance, Cell};
use moyo::data::{hall_symbol_entry, Setting};
use moyo::MoyoDataset;
use nalgebra::{Matrix3, Vector3};
use std::thread;

// ============================================================================
// BOUNDARY TYPES
// ============================================================================

/// Input handed to the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleCell {
    pub lattice: Lattice,
    pub positions: Vec<Vector3<f64>>,
    pub numbers: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOperation {
    pub rotation: Matrix3<i32>,
    pub translation: Vector3<f64>,
}

/// Everything the engine needs from one oracle run.
///
/// The `std_*` fields describe the conventional (standardized) cell. Its Wyckoff letters,
/// orbits and mapping onto the primitive standardized cell are indexed by conventional
/// atom.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleDataset {
    pub number: u16,
    pub hall_number: u16,
    pub international_short: String,
    pub hall_symbol: String,
    pub operations: Vec<SymmetryOperation>,
    pub transformation_matrix: Matrix3<f64>,
    pub origin_shift: Vector3<f64>,
    pub wyckoffs: Vec<char>,
    pub equivalent_atoms: Vec<usize>,
    pub std_lattice: Lattice,
    pub std_positions: Vec<Vector3<f64>>,
    pub std_numbers: Vec<u8>,
    pub std_wyckoffs: Vec<char>,
    pub std_equivalent_atoms: Vec<usize>,
    pub std_mapping_to_primitive: Vec<usize>,
}

pub trait SymmetryOracle: Sync {
    fn find_symmetry(&self, cell: &OracleCell, tolerance: f64) -> Option<OracleDataset>;
}

/// Runs the oracle on its own worker thread and joins it.
///
/// A panic inside the oracle and an empty result both come back as
/// [`SymmetryError::Normalization`].
pub fn run_isolated<O: SymmetryOracle + ?Sized>(
    oracle: &O,
    cell: &OracleCell,
    tolerance: f64,
) -> Result<OracleDataset, SymmetryError> {
    let outcome = thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("symmetry-oracle".into())
            .spawn_scoped(scope, || oracle.find_symmetry(cell, tolerance))
            .map_err(|e| SymmetryError::Normalization(format!("could not start worker: {e}")))?;
        handle.join().map_err(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("symmetry oracle aborted: {reason}");
            SymmetryError::Normalization(format!("symmetry routine aborted: {reason}"))
        })
    })?;
    outcome.ok_or_else(|| {
        SymmetryError::Normalization("symmetry routine returned no dataset".to_string())
    })
}

// ============================================================================
// MOYO BACKEND
// ============================================================================

/// Oracle backed by the `moyo` crate (spglib conventions).
#[derive(Debug, Clone, Copy, Default)]
pub struct MoyoOracle;

impl MoyoOracle {
    fn to_moyo(lattice: &Lattice, positions: &[Vector3<f64>], numbers: &[u8]) -> Cell {
        let moyo_lattice = moyo::base::Lattice::new(lattice.rows());
        let numbers = numbers.iter().map(|&n| n as i32).collect();
        Cell::new(moyo_lattice, positions.to_vec(), numbers)
    }

    fn dataset(cell: &Cell, tolerance: f64) -> Option<MoyoDataset> {
        // Keep the input orientation so the standardized lattice can be compared with the
        // original basis.
        match MoyoDataset::new(cell, tolerance, AngleTolerance::Default, Setting::Spglib, false) {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                debug!("moyo failed: {e:?}");
                None
            }
        }
    }
}

impl SymmetryOracle for MoyoOracle {
    fn find_symmetry(&self, cell: &OracleCell, tolerance: f64) -> Option<OracleDataset> {
        let input = Self::to_moyo(&cell.lattice, &cell.positions, &cell.numbers);
        let dataset = Self::dataset(&input, tolerance)?;

        // The per-atom data of a second pass over the standardized cell is indexed by
        // conventional atom.
        let std_dataset = Self::dataset(&dataset.std_cell, tolerance)?;

        let entry = hall_symbol_entry(dataset.hall_number)?;
        let std_lattice = Lattice::new(dataset.std_cell.lattice.basis).ok()?;
        let std_numbers = dataset
            .std_cell
            .numbers
            .iter()
            .map(|&n| u8::try_from(n).ok())
            .collect::<Option<Vec<u8>>>()?;

        Some(OracleDataset {
            number: u16::try_from(dataset.number).ok()?,
            hall_number: u16::try_from(dataset.hall_number).ok()?,
            international_short: entry.hm_short.replace(' ', ""),
            hall_symbol: entry.hall_symbol.to_string(),
            operations: dataset
                .operations
                .iter()
                .map(|op| SymmetryOperation {
                    rotation: op.rotation,
                    translation: op.translation,
                })
                .collect(),
            transformation_matrix: dataset.std_linear,
            origin_shift: dataset.std_origin_shift,
            wyckoffs: dataset.wyckoffs.clone(),
            equivalent_atoms: dataset.orbits.clone(),
            std_lattice,
            std_positions: dataset.std_cell.positions.clone(),
            std_numbers,
            std_wyckoffs: std_dataset.wyckoffs.clone(),
            std_equivalent_atoms: std_dataset.orbits.clone(),
            std_mapping_to_primitive: std_dataset.mapping_std_prim.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicking;

    impl SymmetryOracle for Panicking {
        fn find_symmetry(&self, _: &OracleCell, _: f64) -> Option<OracleDataset> {
            panic!("coincident atoms");
        }
    }

    struct Empty;

    impl SymmetryOracle for Empty {
        fn find_symmetry(&self, _: &OracleCell, _: f64) -> Option<OracleDataset> {
            None
        }
    }

    fn cell() -> OracleCell {
        OracleCell {
            lattice: Lattice::cubic(3.0).unwrap(),
            positions: vec![Vector3::zeros()],
            numbers: vec![1],
        }
    }

    #[test]
    fn panics_become_normalization_errors() {
        let err = run_isolated(&Panicking, &cell(), 0.1).unwrap_err();
        match err {
            SymmetryError::Normalization(msg) => assert!(msg.contains("coincident atoms")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_results_become_normalization_errors() {
        assert!(matches!(
            run_isolated(&Empty, &cell(), 0.1),
            Err(SymmetryError::Normalization(_))
        ));
    }
}
