use crate::analysis::linked_units::LatticeIndex;
use thiserror::Error;

/// Errors raised while building or slicing a [`Structure`](crate::Structure).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("lattice has zero or near-zero volume")]
    DegenerateLattice,

    #[error("{positions} positions given for {species} species")]
    LengthMismatch { species: usize, positions: usize },

    #[error("atom index {index} is out of range for a structure of {len} atoms")]
    AtomIndexOutOfRange { index: usize, len: usize },
}

/// Errors from compiling or evaluating a Wyckoff position expression.
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("variable '{variable}' is not declared for '{expression}'")]
    UndeclaredVariable { expression: String, variable: String },

    #[error("function '{function}' is not allowed in '{expression}'")]
    Function { expression: String, function: String },

    #[error(transparent)]
    Evaluation(#[from] evalexpr::EvalexprError),
}

/// Failures of the symmetry normalization engine.
#[derive(Debug, Error)]
pub enum SymmetryError {
    #[error("symmetry analysis needs 2 or 3 periodic axes, got {n_periodic}")]
    UnsupportedPeriodicity { n_periodic: usize },

    #[error("cell normalization failed: {0}")]
    Normalization(String),

    #[error("could not select a unique Wyckoff ground state for space group {space_group}")]
    AmbiguousGroundState { space_group: u16 },

    #[error(
        "no consistent free parameters for Wyckoff letter '{letter}' (species {number}) in space group {space_group}"
    )]
    WyckoffResolution {
        space_group: u16,
        letter: char,
        number: u8,
    },

    #[error("no reference data for {what} in space group {space_group}")]
    MissingReferenceData { space_group: u16, what: String },

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// Failures while assembling or querying a [`LinkedUnitCollection`](crate::LinkedUnitCollection).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegionError {
    #[error("lattice index {0} is already occupied")]
    DuplicateUnit(LatticeIndex),

    #[error("unit at {index} has {found} basis slots, the prototype cell has {expected}")]
    SlotCountMismatch {
        index: LatticeIndex,
        expected: usize,
        found: usize,
    },

    #[error("atom index {index} is out of range for a structure of {len} atoms")]
    AtomIndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Structure(#[from] StructureError),
}
