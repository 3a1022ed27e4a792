//! Symmetry normalization engine.
//!
//! A [`SymmetryAnalyzer`] is bound to one structure at a time. Every derived quantity is
//! computed on first access and cached; [`SymmetryAnalyzer::set_system`] rebinds the
//! analyzer and drops all caches together.

use crate::core::error::{StructureError, SymmetryError};
use crate::core::structure::{Atom, Lattice, Structure};
use crate::geometry::cell::{minimized_cell, with_axis_length};
use crate::geometry::periodic::{thickness, wrap_coordinate, wrap_positions, WRAP_PRECISION};
use crate::math::fraction::rationalize_matrix;
use crate::symmetry::ground_state::select_ground_state;
use crate::symmetry::oracle::{
    run_isolated, MoyoOracle, OracleCell, OracleDataset, SymmetryOracle, SymmetryOperation,
};
use crate::symmetry::tables::{
    bravais_lattice, point_group_symbol, CrystalSystem, RigidTransformation, SymmetryTables,
};
use crate::symmetry::wyckoff::{wyckoff_groups, WyckoffGroup};
use crate::SymmetryConfig;
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// RESULTS
// ============================================================================

/// Canonical symmetry description of the bound structure.
///
/// `wyckoff_letters` are already expressed in the canonical setting chosen by the
/// ground-state search. `transformation_matrix` and `origin_shift` are the oracle's own
/// values: they map original fractional coordinates onto the oracle's standardized cell
/// (`x' = P x + s`), before the ground-state transformation is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryDataset {
    pub number: u16,
    pub international_short: String,
    pub hall_symbol: String,
    pub hall_number: u16,
    pub point_group: String,
    pub crystal_system: CrystalSystem,
    pub bravais_lattice: Option<String>,
    pub operations: Vec<SymmetryOperation>,
    pub transformation_matrix: Matrix3<f64>,
    pub origin_shift: Vector3<f64>,
    pub wyckoff_letters: Vec<char>,
    pub equivalent_atoms: Vec<usize>,
}

/// A symmetry-idealized cell with its own per-atom Wyckoff data.
#[derive(Debug, Clone, PartialEq)]
pub struct IdealizedCell {
    pub structure: Structure,
    pub wyckoff_letters: Vec<char>,
    pub equivalent_atoms: Vec<usize>,
}

pub type ConventionalCell = IdealizedCell;
pub type PrimitiveCell = IdealizedCell;

/// Outcome of the ground-state search. `ideal` is the conventional cell before any
/// minimization along a non-periodic axis.
#[derive(Debug, Clone)]
struct GroundState {
    transformation: RigidTransformation,
    ideal: IdealizedCell,
    conventional: IdealizedCell,
}

#[derive(Debug, Default)]
struct Cache {
    oracle: Option<OracleDataset>,
    ground_state: Option<GroundState>,
    dataset: Option<SymmetryDataset>,
    primitive: Option<PrimitiveCell>,
    wyckoff_groups: Option<Vec<WyckoffGroup>>,
    lattice_fit: Option<Lattice>,
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct SymmetryAnalyzer<O: SymmetryOracle = MoyoOracle> {
    oracle: O,
    tables: Arc<SymmetryTables>,
    config: SymmetryConfig,
    original: Structure,
    analyzed: Structure,
    cache: Cache,
}

impl SymmetryAnalyzer<MoyoOracle> {
    pub fn new(
        system: Structure,
        tables: Arc<SymmetryTables>,
        config: SymmetryConfig,
    ) -> Result<Self, SymmetryError> {
        Self::with_oracle(MoyoOracle, system, tables, config)
    }
}

impl<O: SymmetryOracle> SymmetryAnalyzer<O> {
    pub fn with_oracle(
        oracle: O,
        system: Structure,
        tables: Arc<SymmetryTables>,
        config: SymmetryConfig,
    ) -> Result<Self, SymmetryError> {
        let analyzed = Self::prepare(&system, &config)?;
        Ok(Self {
            oracle,
            tables,
            config,
            original: system,
            analyzed,
            cache: Cache::default(),
        })
    }

    /// Binds a new structure. On error the previous binding is kept.
    pub fn set_system(&mut self, system: Structure) -> Result<(), SymmetryError> {
        let analyzed = Self::prepare(&system, &self.config)?;
        self.reset();
        self.original = system;
        self.analyzed = analyzed;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.cache = Cache::default();
    }

    /// Cell handed to the oracle. Structures periodic in two axes get their open axis
    /// resized so that the oracle cannot find spurious translations along it.
    fn prepare(system: &Structure, config: &SymmetryConfig) -> Result<Structure, SymmetryError> {
        match system.n_periodic() {
            3 => Ok(system.clone()),
            2 => {
                let axis = system.pbc.iter().position(|&p| !p).unwrap_or(2);
                let length = config
                    .min_non_periodic_length
                    .max(config.non_periodic_thickness_factor * thickness(system, axis));
                debug!("resizing non-periodic axis {axis} to {length:.3} Å");
                Ok(with_axis_length(system, axis, length)?)
            }
            n_periodic => Err(SymmetryError::UnsupportedPeriodicity { n_periodic }),
        }
    }

    pub fn original_system(&self) -> &Structure {
        &self.original
    }

    /// The structure actually passed to the oracle.
    pub fn analyzed_system(&self) -> &Structure {
        &self.analyzed
    }

    pub fn config(&self) -> &SymmetryConfig {
        &self.config
    }

    pub fn tables(&self) -> &SymmetryTables {
        &self.tables
    }

    pub fn non_periodic_axis(&self) -> Option<usize> {
        self.original.pbc.iter().position(|&p| !p)
    }

    /// Extent of the original atoms along the non-periodic axis, for 2D structures.
    pub fn thickness(&self) -> Option<f64> {
        self.non_periodic_axis()
            .map(|axis| thickness(&self.original, axis))
    }

    /// A 2D structure is flat when all atoms lie in one plane within tolerance.
    pub fn is_flat(&self) -> bool {
        self.thickness()
            .map_or(false, |t| t < self.config.flatness_factor * self.config.symmetry_tol)
    }

    fn position_accuracy(&self) -> f64 {
        self.config.position_accuracy_factor * self.config.symmetry_tol
    }

    // ------------------------------------------------------------------------
    // Oracle
    // ------------------------------------------------------------------------

    fn oracle_dataset(&mut self) -> Result<&OracleDataset, SymmetryError> {
        let dataset = match self.cache.oracle.take() {
            Some(dataset) => dataset,
            None => {
                let cell = OracleCell {
                    lattice: self.analyzed.lattice.clone(),
                    positions: self.analyzed.fractional_positions(),
                    numbers: self.analyzed.numbers(),
                };
                let dataset = run_isolated(&self.oracle, &cell, self.config.symmetry_tol)?;
                if dataset.wyckoffs.len() != cell.numbers.len()
                    || dataset.std_wyckoffs.len() != dataset.std_positions.len()
                    || dataset.std_mapping_to_primitive.len() != dataset.std_positions.len()
                {
                    return Err(SymmetryError::Normalization(
                        "symmetry routine returned inconsistent per-atom data".to_string(),
                    ));
                }
                debug!(
                    "oracle: space group {} ({}), {} operations",
                    dataset.number,
                    dataset.international_short,
                    dataset.operations.len()
                );
                dataset
            }
        };
        Ok(self.cache.oracle.insert(dataset))
    }

    // ------------------------------------------------------------------------
    // Ground state & conventional cell
    // ------------------------------------------------------------------------

    fn ground_state(&mut self) -> Result<&GroundState, SymmetryError> {
        let state = match self.cache.ground_state.take() {
            Some(state) => state,
            None => {
                let raw = self.oracle_dataset()?.clone();
                self.find_ground_state(&raw)?
            }
        };
        Ok(self.cache.ground_state.insert(state))
    }

    fn find_ground_state(&self, raw: &OracleDataset) -> Result<GroundState, SymmetryError> {
        let number = raw.number;
        let std_cell = Structure::from_fractional(
            raw.std_lattice.clone(),
            &raw.std_numbers,
            &raw.std_positions,
            [true; 3],
        )?;

        let mut candidates = vec![RigidTransformation::identity()];
        candidates.extend_from_slice(self.tables.proper_rigid_transformations(number));
        if self.is_flat() {
            candidates.extend_from_slice(self.tables.improper_rigid_transformations(number));
        }
        let chosen = select_ground_state(&candidates, &raw.std_wyckoffs, &raw.std_numbers, number)?;
        let transformation = candidates.swap_remove(chosen);
        debug!(
            "space group {number}: ground state {chosen} of {} candidates",
            candidates.len() + 1
        );

        let wyckoff_letters = permute_letters(&transformation, &raw.std_wyckoffs);
        let structure = if transformation.is_identity() {
            std_cell
        } else {
            let atoms = std_cell
                .atoms
                .iter()
                .map(|atom| {
                    let moved = transformation.apply(&atom.fractional_coords);
                    Atom::new(atom.number, moved.map(wrap_coordinate))
                })
                .collect();
            Structure::new(std_cell.lattice, atoms, std_cell.pbc)
        };
        let ideal = IdealizedCell {
            structure,
            wyckoff_letters,
            equivalent_atoms: raw.std_equivalent_atoms.clone(),
        };

        let conventional = match self.non_periodic_axis() {
            None => ideal.clone(),
            Some(axis) => {
                let open = self.analyzed.lattice.vector(axis).normalize();
                let conv_axis = most_parallel_axis(&ideal.structure.lattice, &open);
                IdealizedCell {
                    structure: minimized_cell(
                        &ideal.structure,
                        conv_axis,
                        self.config.minimized_cell_min_size,
                    )?,
                    ..ideal.clone()
                }
            }
        };

        Ok(GroundState {
            transformation,
            ideal,
            conventional,
        })
    }

    /// The conventional cell in the canonical Wyckoff setting. For 2D structures the cell
    /// is shrunk to the material along its non-periodic axis.
    pub fn conventional_system(&mut self) -> Result<&ConventionalCell, SymmetryError> {
        Ok(&self.ground_state()?.conventional)
    }

    // ------------------------------------------------------------------------
    // Dataset & scalar accessors
    // ------------------------------------------------------------------------

    pub fn dataset(&mut self) -> Result<&SymmetryDataset, SymmetryError> {
        let dataset = match self.cache.dataset.take() {
            Some(dataset) => dataset,
            None => {
                let raw = self.oracle_dataset()?.clone();
                let transformation = self.ground_state()?.transformation.clone();
                build_dataset(raw, &transformation)?
            }
        };
        Ok(self.cache.dataset.insert(dataset))
    }

    pub fn space_group_number(&mut self) -> Result<u16, SymmetryError> {
        Ok(self.dataset()?.number)
    }

    pub fn international_short(&mut self) -> Result<&str, SymmetryError> {
        Ok(&self.dataset()?.international_short)
    }

    pub fn hall_symbol(&mut self) -> Result<&str, SymmetryError> {
        Ok(&self.dataset()?.hall_symbol)
    }

    pub fn hall_number(&mut self) -> Result<u16, SymmetryError> {
        Ok(self.dataset()?.hall_number)
    }

    pub fn point_group(&mut self) -> Result<&str, SymmetryError> {
        Ok(&self.dataset()?.point_group)
    }

    pub fn crystal_system(&mut self) -> Result<CrystalSystem, SymmetryError> {
        Ok(self.dataset()?.crystal_system)
    }

    /// Pearson-style Bravais lattice symbol, one-face centrings merged into `S`.
    pub fn bravais_lattice(&mut self) -> Result<Option<&str>, SymmetryError> {
        Ok(self.dataset()?.bravais_lattice.as_deref())
    }

    pub fn symmetry_operations(&mut self) -> Result<&[SymmetryOperation], SymmetryError> {
        Ok(&self.dataset()?.operations)
    }

    /// True when every operation is proper.
    pub fn is_chiral(&mut self) -> Result<bool, SymmetryError> {
        Ok(self
            .symmetry_operations()?
            .iter()
            .all(|op| op.rotation.cast::<f64>().determinant() > 0.0))
    }

    pub fn wyckoff_letters_original(&mut self) -> Result<&[char], SymmetryError> {
        Ok(&self.dataset()?.wyckoff_letters)
    }

    pub fn equivalent_atoms_original(&mut self) -> Result<&[usize], SymmetryError> {
        Ok(&self.dataset()?.equivalent_atoms)
    }

    pub fn has_free_wyckoff_parameters(&mut self) -> Result<bool, SymmetryError> {
        let number = self.space_group_number()?;
        let mut letters = self.wyckoff_letters_original()?.to_vec();
        letters.sort_unstable();
        letters.dedup();
        for letter in letters {
            let set = self.tables.wyckoff_set(number, letter).ok_or_else(|| {
                SymmetryError::MissingReferenceData {
                    space_group: number,
                    what: format!("Wyckoff letter '{letter}'"),
                }
            })?;
            if set.has_free_variables() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ------------------------------------------------------------------------
    // Derived cells
    // ------------------------------------------------------------------------

    pub fn primitive_system(&mut self) -> Result<&PrimitiveCell, SymmetryError> {
        let primitive = match self.cache.primitive.take() {
            Some(primitive) => primitive,
            None => {
                let mapping = self.oracle_dataset()?.std_mapping_to_primitive.clone();
                let centring = self
                    .international_short()?
                    .chars()
                    .next()
                    .unwrap_or('P');
                let conventional = self.conventional_system()?;
                primitive_cell(conventional, centring, &mapping)?
            }
        };
        Ok(self.cache.primitive.insert(primitive))
    }

    /// Wyckoff groups of the conventional cell, sorted by (letter, atomic number).
    pub fn wyckoff_groups_conventional(&mut self) -> Result<&[WyckoffGroup], SymmetryError> {
        let groups = match self.cache.wyckoff_groups.take() {
            Some(groups) => groups,
            None => {
                let number = self.space_group_number()?;
                let accuracy = self.position_accuracy();
                let tables = Arc::clone(&self.tables);
                let ideal = &self.ground_state()?.ideal;
                wyckoff_groups(
                    &ideal.structure,
                    &ideal.wyckoff_letters,
                    &ideal.equivalent_atoms,
                    number,
                    tables.space_group(number),
                    accuracy,
                )?
            }
        };
        Ok(self.cache.wyckoff_groups.insert(groups))
    }

    /// The conventional lattice rebuilt from the original basis.
    ///
    /// The coefficients relating the two bases are snapped to fractions with denominators
    /// of at most 10 and the result is scaled so that its volume per atom equals that of
    /// the analysed structure.
    pub fn conventional_lattice_fit(&mut self) -> Result<&Lattice, SymmetryError> {
        let fit = match self.cache.lattice_fit.take() {
            Some(fit) => fit,
            None => {
                let original = self.analyzed.clone();
                let conventional = &self.conventional_system()?.structure;
                lattice_fit(&original, conventional)?
            }
        };
        Ok(self.cache.lattice_fit.insert(fit))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn permute_letters(transformation: &RigidTransformation, letters: &[char]) -> Vec<char> {
    letters
        .iter()
        .map(|&letter| {
            if !transformation.permutations.is_empty()
                && !transformation.permutations.contains_key(&letter)
            {
                warn!("Wyckoff letter '{letter}' missing from permutation table, kept as is");
            }
            transformation.permute(letter)
        })
        .collect()
}

fn most_parallel_axis(lattice: &Lattice, direction: &Vector3<f64>) -> usize {
    (0..3)
        .map(|axis| (axis, lattice.vector(axis).normalize().dot(direction).abs()))
        .fold((2, f64::NEG_INFINITY), |best, (axis, cos)| {
            if cos > best.1 {
                (axis, cos)
            } else {
                best
            }
        })
        .0
}

fn build_dataset(
    raw: OracleDataset,
    transformation: &RigidTransformation,
) -> Result<SymmetryDataset, SymmetryError> {
    let number = raw.number;
    let missing = |what: &str| SymmetryError::MissingReferenceData {
        space_group: number,
        what: what.to_string(),
    };
    let point_group = point_group_symbol(number).ok_or_else(|| missing("point group"))?;
    let crystal_system =
        CrystalSystem::from_space_group(number).ok_or_else(|| missing("crystal system"))?;
    let bravais = raw
        .international_short
        .chars()
        .next()
        .and_then(|centring| bravais_lattice(number, centring));

    Ok(SymmetryDataset {
        number,
        wyckoff_letters: permute_letters(transformation, &raw.wyckoffs),
        international_short: raw.international_short,
        hall_symbol: raw.hall_symbol,
        hall_number: raw.hall_number,
        point_group: point_group.to_string(),
        crystal_system,
        bravais_lattice: bravais,
        operations: raw.operations,
        transformation_matrix: raw.transformation_matrix,
        origin_shift: raw.origin_shift,
        equivalent_atoms: raw.equivalent_atoms,
    })
}

/// Conventional-to-primitive basis change for a centring letter. Column `i` holds the
/// conventional coordinates of primitive vector `i`.
fn centring_transformation(centring: char) -> Option<Matrix3<f64>> {
    let (h, t) = (0.5, 1.0 / 3.0);
    #[rustfmt::skip]
    let m = match centring {
        'P' => Matrix3::identity(),
        'A' => Matrix3::new(
            1.0, 0.0, 0.0,
            0.0, h,   -h,
            0.0, h,   h,
        ),
        'C' => Matrix3::new(
            h,   h,   0.0,
            -h,  h,   0.0,
            0.0, 0.0, 1.0,
        ),
        'R' => Matrix3::new(
            2.0 * t, -t, -t,
            t,       t,  -2.0 * t,
            t,       t,  t,
        ),
        'I' => Matrix3::new(
            -h, h,  h,
            h,  -h, h,
            h,  h,  -h,
        ),
        'F' => Matrix3::new(
            0.0, h,   h,
            h,   0.0, h,
            h,   h,   0.0,
        ),
        _ => return None,
    };
    Some(m)
}

/// Reduces a conventional cell to its primitive cell, keeping the first conventional
/// atom mapped onto each primitive atom.
fn primitive_cell(
    conventional: &ConventionalCell,
    centring: char,
    mapping: &[usize],
) -> Result<PrimitiveCell, SymmetryError> {
    if centring == 'P' {
        return Ok(conventional.clone());
    }
    let transform = centring_transformation(centring).ok_or_else(|| {
        SymmetryError::Normalization(format!("unknown centring '{centring}'"))
    })?;
    let structure = &conventional.structure;
    if mapping.len() != structure.len() {
        return Err(SymmetryError::Normalization(
            "primitive mapping does not cover the conventional cell".to_string(),
        ));
    }

    let lattice = Lattice::new(structure.lattice.matrix * transform)?;
    let mut representatives: BTreeMap<usize, usize> = BTreeMap::new();
    for (i, &p) in mapping.iter().enumerate() {
        representatives.entry(p).or_insert(i);
    }
    let keep: Vec<usize> = representatives.into_values().collect();

    let fractional: Vec<Vector3<f64>> = keep
        .iter()
        .map(|&i| {
            let cartesian = structure.lattice.to_cartesian(&structure.atoms[i].fractional_coords);
            lattice.to_fractional(&cartesian)
        })
        .collect();
    let wrapped = wrap_positions(&fractional, structure.pbc, WRAP_PRECISION);
    let atoms = keep
        .iter()
        .zip(wrapped)
        .map(|(&i, p)| Atom::new(structure.atoms[i].number, p))
        .collect();
    debug!(
        "primitive cell ({centring}): {} of {} atoms",
        keep.len(),
        structure.len()
    );

    Ok(PrimitiveCell {
        structure: Structure::new(lattice, atoms, structure.pbc),
        wyckoff_letters: keep.iter().map(|&i| conventional.wyckoff_letters[i]).collect(),
        equivalent_atoms: keep.iter().map(|&i| conventional.equivalent_atoms[i]).collect(),
    })
}

fn lattice_fit(original: &Structure, conventional: &Structure) -> Result<Lattice, SymmetryError> {
    let original_rows = original.lattice.rows();
    let inverse = original_rows
        .try_inverse()
        .ok_or(StructureError::DegenerateLattice)?;
    let coefficients = rationalize_matrix(&(conventional.lattice.rows() * inverse), 10);
    let rows = coefficients * original_rows;

    let per_atom_original = original.volume() / original.len().max(1) as f64;
    let per_atom_fit = rows.determinant().abs() / conventional.len().max(1) as f64;
    if per_atom_fit < f64::EPSILON {
        return Err(StructureError::DegenerateLattice.into());
    }
    let scale = (per_atom_original / per_atom_fit).cbrt();
    Ok(Lattice::new((rows * scale).transpose())?)
}
