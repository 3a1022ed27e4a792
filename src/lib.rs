// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
pub mod analysis;
pub mod chemistry;
pub mod core;
pub mod geometry;
pub mod math;
pub mod symmetry;

// ============================================================================
// RE-EXPORTS (Public API)
// ============================================================================
pub use crate::analysis::linked_units::{
    DefectReport, LatticeIndex, LinkedUnit, LinkedUnitCollection, Substitution, Vacancy,
};
pub use crate::chemistry::environment::ChemicalEnvironment;
pub use crate::core::error::{ExpressionError, RegionError, StructureError, SymmetryError};
pub use crate::core::structure::{Atom, Lattice, Structure};
pub use crate::symmetry::analyzer::{
    ConventionalCell, IdealizedCell, PrimitiveCell, SymmetryAnalyzer, SymmetryDataset,
};
pub use crate::symmetry::oracle::{MoyoOracle, SymmetryOperation, SymmetryOracle};
pub use crate::symmetry::tables::{CrystalSystem, SymmetryTables};
pub use crate::symmetry::wyckoff::WyckoffGroup;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tolerances of the symmetry normalization engine. Lengths are in Å.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetryConfig {
    /// Position tolerance handed to the symmetry finder.
    pub symmetry_tol: f64,
    /// Wyckoff positions must be reproduced within this fraction of `symmetry_tol`.
    pub position_accuracy_factor: f64,
    pub min_non_periodic_length: f64,
    /// The open axis of a 2D structure is resized to this multiple of its thickness.
    pub non_periodic_thickness_factor: f64,
    /// A 2D structure thinner than this fraction of `symmetry_tol` counts as flat.
    pub flatness_factor: f64,
    pub minimized_cell_min_size: f64,
}

impl Default for SymmetryConfig {
    fn default() -> Self {
        Self {
            symmetry_tol: 0.1,
            position_accuracy_factor: 0.5,
            min_non_periodic_length: 5.0,
            non_periodic_thickness_factor: 3.0,
            flatness_factor: 0.5,
            minimized_cell_min_size: 1.0,
        }
    }
}

/// Thresholds of the defect classification engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefectConfig {
    /// Longest tetrahedron edge kept in the basis volume (Å).
    pub delaunay_threshold: f64,
    /// Largest gap between covalent spheres that still counts as a bond (Å).
    pub bond_threshold: f64,
    /// Tiling atoms whose chemical distance to their slot falls below this are rejected.
    pub chemical_similarity_threshold: f64,
}

impl Default for DefectConfig {
    fn default() -> Self {
        Self {
            delaunay_threshold: 7.0,
            bond_threshold: 0.65,
            chemical_similarity_threshold: 0.4,
        }
    }
}

// ============================================================================
// HIGH-LEVEL INTERFACE
// ============================================================================

/// Canonical symmetry dataset of a structure periodic in two or three axes, using the
/// `moyo` backend.
pub fn normalize(
    structure: Structure,
    tolerance: f64,
    tables: Arc<SymmetryTables>,
) -> Result<SymmetryDataset, SymmetryError> {
    let config = SymmetryConfig {
        symmetry_tol: tolerance,
        ..SymmetryConfig::default()
    };
    let mut analyzer = SymmetryAnalyzer::new(structure, tables, config)?;
    Ok(analyzer.dataset()?.clone())
}

/// Classifies every atom of `system` against a tiling by the prototype `cell`.
pub fn classify_defects(
    system: Structure,
    cell: Structure,
    is_2d: bool,
    units: impl IntoIterator<Item = (LatticeIndex, LinkedUnit)>,
    config: DefectConfig,
) -> Result<DefectReport, RegionError> {
    let mut collection = LinkedUnitCollection::from_structures(system, cell, is_2d, config);
    for (index, unit) in units {
        collection.insert(index, unit)?;
    }
    Ok(collection.report())
}
