use crate::analysis::clustering;
use crate::chemistry::elements::covalent_radius;
use crate::chemistry::environment::{chemical_environment, ChemicalEnvironment};
use crate::core::error::{RegionError, StructureError};
use crate::core::structure::Structure;
use crate::geometry::delaunay::TetrahedraDecomposition;
use crate::geometry::periodic::{
    displacement_tensor_finite, distance_matrix_radii_pbc, neighbour_cells, translations,
    wrap_coordinate, DisplacementTensor,
};
use crate::DefectConfig;
use log::debug;
use nalgebra::{DMatrix, Vector3};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// TILING RECORDS
// ============================================================================

/// Integer position of one repetition of the prototype cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LatticeIndex(pub [i32; 3]);

impl From<[i32; 3]> for LatticeIndex {
    fn from(value: [i32; 3]) -> Self {
        Self(value)
    }
}

impl fmt::Display for LatticeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0[0], self.0[1], self.0[2])
    }
}

/// An occupied prototype slot holding a different species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substitution {
    pub index: usize,
    pub original_number: u8,
    pub substitutional_number: u8,
}

/// A prototype slot left empty. `position` is cartesian.
#[derive(Debug, Clone, PartialEq)]
pub struct Vacancy {
    pub number: u8,
    pub position: Vector3<f64>,
}

/// One repetition of the prototype cell as found in the structure.
///
/// `basis_indices` has one entry per prototype atom: the matching atom index, or `None`
/// when the slot is empty or holds a substitution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedUnit {
    pub basis_indices: Vec<Option<usize>>,
    pub substitutions: Vec<Substitution>,
    pub vacancies: Vec<Vacancy>,
}

// ============================================================================
// COLLECTION
// ============================================================================

#[derive(Debug, Default)]
struct ClassificationCache {
    ideal_environments: Option<Vec<ChemicalEnvironment>>,
    basis_indices: Option<Vec<usize>>,
    decomposition: Option<TetrahedraDecomposition>,
    inside_outside: Option<(Vec<usize>, Vec<usize>)>,
    substitutions: Option<Vec<Substitution>>,
    vacancies: Option<Vec<Vacancy>>,
    interstitials: Option<Vec<usize>>,
    adsorbates: Option<Vec<usize>>,
    unknowns: Option<Vec<usize>>,
    clusters: Option<Vec<Vec<usize>>>,
}

/// Snapshot of every classification a collection produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectReport {
    pub basis_indices: Vec<usize>,
    pub substitutions: Vec<Substitution>,
    pub vacancies: Vec<Vacancy>,
    pub interstitials: Vec<usize>,
    pub adsorbates: Vec<usize>,
    pub unknowns: Vec<usize>,
    pub adsorbate_clusters: Vec<Vec<usize>>,
}

/// A structure tiled by repetitions of a prototype cell, classifying every atom that
/// does not fit the tiling.
///
/// Classifications are computed on first access and cached. Inserting a unit clears
/// the caches.
#[derive(Debug)]
pub struct LinkedUnitCollection {
    system: Structure,
    cell: Structure,
    is_2d: bool,
    config: DefectConfig,
    dist_matrix_radii_pbc: DMatrix<f64>,
    disp_tensor_finite: DisplacementTensor,
    units: BTreeMap<LatticeIndex, LinkedUnit>,
    cache: ClassificationCache,
}

impl LinkedUnitCollection {
    /// `dist_matrix_radii_pbc` is the minimum-image distance matrix minus covalent radii and
    /// `disp_tensor_finite` the plain displacement tensor of `system`.
    pub fn new(
        system: Structure,
        cell: Structure,
        is_2d: bool,
        config: DefectConfig,
        dist_matrix_radii_pbc: DMatrix<f64>,
        disp_tensor_finite: DisplacementTensor,
    ) -> Self {
        Self {
            system,
            cell,
            is_2d,
            config,
            dist_matrix_radii_pbc,
            disp_tensor_finite,
            units: BTreeMap::new(),
            cache: ClassificationCache::default(),
        }
    }

    /// Same as [`new`](Self::new) with both distance inputs computed from `system`.
    pub fn from_structures(
        system: Structure,
        cell: Structure,
        is_2d: bool,
        config: DefectConfig,
    ) -> Self {
        let dist = distance_matrix_radii_pbc(&system);
        let disp = displacement_tensor_finite(&system);
        Self::new(system, cell, is_2d, config, dist, disp)
    }

    /// Adds the unit at `index`. Occupied indices are never overwritten.
    pub fn insert(
        &mut self,
        index: impl Into<LatticeIndex>,
        unit: LinkedUnit,
    ) -> Result<(), RegionError> {
        let index = index.into();
        if self.units.contains_key(&index) {
            return Err(RegionError::DuplicateUnit(index));
        }
        if unit.basis_indices.len() != self.cell.len() {
            return Err(RegionError::SlotCountMismatch {
                index,
                expected: self.cell.len(),
                found: unit.basis_indices.len(),
            });
        }
        let len = self.system.len();
        let referenced = unit
            .basis_indices
            .iter()
            .flatten()
            .copied()
            .chain(unit.substitutions.iter().map(|s| s.index));
        for atom in referenced {
            if atom >= len {
                return Err(RegionError::AtomIndexOutOfRange { index: atom, len });
            }
        }
        self.units.insert(index, unit);
        self.cache = ClassificationCache::default();
        Ok(())
    }

    pub fn get(&self, index: &LatticeIndex) -> Option<&LinkedUnit> {
        self.units.get(index)
    }

    pub fn units(&self) -> impl Iterator<Item = (&LatticeIndex, &LinkedUnit)> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn system(&self) -> &Structure {
        &self.system
    }

    pub fn cell(&self) -> &Structure {
        &self.cell
    }

    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    // ------------------------------------------------------------------------
    // Chemical environments
    // ------------------------------------------------------------------------

    fn max_radius(structure: &Structure) -> f64 {
        structure
            .atoms
            .iter()
            .map(|a| covalent_radius(a.number))
            .fold(0.0, f64::max)
    }

    /// Ideal environment of every prototype slot.
    pub fn ideal_environments(&mut self) -> &[ChemicalEnvironment] {
        let envs = match self.cache.ideal_environments.take() {
            Some(envs) => envs,
            None => {
                let cell = &self.cell;
                let cutoff = Self::max_radius(cell) + self.config.bond_threshold;
                // The prototype of a 2D material never repeats along c.
                let pbc = [true, true, !self.is_2d];
                let factors = neighbour_cells(&cell.lattice, cutoff, pbc);
                let shifts = translations(&cell.lattice, &factors);
                let disp = displacement_tensor_finite(cell);
                let envs: Vec<ChemicalEnvironment> = (0..cell.len())
                    .map(|i| {
                        chemical_environment(i, cell, &disp, &shifts, self.config.bond_threshold)
                    })
                    .collect();
                for (slot, env) in envs.iter().enumerate() {
                    if env.total() == 0 {
                        log::warn!("prototype slot {slot} has no neighbours within the bond threshold");
                    }
                }
                envs
            }
        };
        self.cache.ideal_environments.insert(envs)
    }

    /// Environment of atom `index` in the full structure.
    pub fn real_environment(&self, index: usize) -> ChemicalEnvironment {
        let system = &self.system;
        let cutoff = Self::max_radius(system) + self.config.bond_threshold;
        let factors = neighbour_cells(&system.lattice, cutoff, system.pbc);
        let shifts = translations(&system.lattice, &factors);
        chemical_environment(
            index,
            system,
            &self.disp_tensor_finite,
            &shifts,
            self.config.bond_threshold,
        )
    }

    // ------------------------------------------------------------------------
    // Basis and spatial membership
    // ------------------------------------------------------------------------

    /// Tiling atoms whose environment is chemically close enough to their prototype slot.
    pub fn basis_indices(&mut self) -> &[usize] {
        let basis = match self.cache.basis_indices.take() {
            Some(basis) => basis,
            None => self.find_basis_indices(),
        };
        self.cache.basis_indices.insert(basis)
    }

    fn find_basis_indices(&mut self) -> Vec<usize> {
        let ideal = self.ideal_environments().to_vec();

        let mut accepted = BTreeSet::new();
        for unit in self.units.values() {
            for (slot, atom) in unit.basis_indices.iter().enumerate() {
                let Some(atom) = *atom else { continue };
                let real = self.real_environment(atom);
                let distance = ideal[slot].chemical_distance(&real);
                if distance >= self.config.chemical_similarity_threshold {
                    accepted.insert(atom);
                } else {
                    debug!("atom {atom} rejected from the basis, chemical distance {distance:.2}");
                }
            }
        }
        accepted.into_iter().collect()
    }

    /// Tetrahedral decomposition spanned by the accepted basis atoms.
    pub fn tetrahedra_decomposition(&mut self) -> &TetrahedraDecomposition {
        let decomposition = match self.cache.decomposition.take() {
            Some(d) => d,
            None => {
                let basis = self.basis_indices().to_vec();
                TetrahedraDecomposition::for_structure(
                    &self.system,
                    &basis,
                    self.config.delaunay_threshold,
                )
            }
        };
        self.cache.decomposition.insert(decomposition)
    }

    /// Cartesian position folded into the cell along the periodic axes, matching the
    /// frame the decomposition is built in.
    fn folded(&self, cartesian: &Vector3<f64>) -> Vector3<f64> {
        let lattice = &self.system.lattice;
        let mut frac = lattice.to_fractional(cartesian);
        for axis in 0..3 {
            if self.system.pbc[axis] {
                frac[axis] = wrap_coordinate(frac[axis]);
            }
        }
        lattice.to_cartesian(&frac)
    }

    fn is_inside(&mut self, cartesian: &Vector3<f64>) -> bool {
        let point = self.folded(cartesian);
        self.tetrahedra_decomposition().contains(&point)
    }

    /// Non-basis atoms split into those inside the basis volume and those outside.
    pub fn inside_and_outside(&mut self) -> (&[usize], &[usize]) {
        let split = match self.cache.inside_outside.take() {
            Some(split) => split,
            None => {
                let basis: BTreeSet<usize> = self.basis_indices().iter().copied().collect();
                let mut inside = Vec::new();
                let mut outside = Vec::new();
                for i in (0..self.system.len()).filter(|i| !basis.contains(i)) {
                    let position = self.system.cartesian_position(i).unwrap_or_else(Vector3::zeros);
                    if self.is_inside(&position) {
                        inside.push(i);
                    } else {
                        outside.push(i);
                    }
                }
                (inside, outside)
            }
        };
        let (inside, outside) = self.cache.inside_outside.insert(split);
        (inside.as_slice(), outside.as_slice())
    }

    // ------------------------------------------------------------------------
    // Defect categories
    // ------------------------------------------------------------------------

    pub fn substitutions(&mut self) -> &[Substitution] {
        let substitutions = match self.cache.substitutions.take() {
            Some(s) => s,
            None => {
                let candidates: Vec<Substitution> = self
                    .units
                    .values()
                    .flat_map(|u| u.substitutions.iter().copied())
                    .collect();
                if self.is_2d {
                    candidates
                } else {
                    let mut kept = Vec::with_capacity(candidates.len());
                    for s in candidates {
                        let position = self.system.cartesian_position(s.index).unwrap_or_else(Vector3::zeros);
                        if self.is_inside(&position) {
                            kept.push(s);
                        }
                    }
                    kept
                }
            }
        };
        self.cache.substitutions.insert(substitutions)
    }

    pub fn vacancies(&mut self) -> &[Vacancy] {
        let vacancies = match self.cache.vacancies.take() {
            Some(v) => v,
            None => {
                let candidates: Vec<Vacancy> = self
                    .units
                    .values()
                    .flat_map(|u| u.vacancies.iter().cloned())
                    .collect();
                if self.is_2d {
                    candidates
                } else {
                    let mut kept = Vec::with_capacity(candidates.len());
                    for v in candidates {
                        if self.is_inside(&v.position) {
                            kept.push(v);
                        }
                    }
                    kept
                }
            }
        };
        self.cache.vacancies.insert(vacancies)
    }

    fn substitution_indices(&mut self) -> BTreeSet<usize> {
        self.substitutions().iter().map(|s| s.index).collect()
    }

    /// Atoms inside the basis volume that are not substitutions.
    pub fn interstitials(&mut self) -> &[usize] {
        let interstitials = match self.cache.interstitials.take() {
            Some(i) => i,
            None => {
                let substituted = self.substitution_indices();
                let (inside, _) = self.inside_and_outside();
                inside
                    .iter()
                    .copied()
                    .filter(|i| !substituted.contains(i))
                    .collect()
            }
        };
        self.cache.interstitials.insert(interstitials)
    }

    /// Atoms outside the basis volume that are not substitutions.
    pub fn adsorbates(&mut self) -> &[usize] {
        let adsorbates = match self.cache.adsorbates.take() {
            Some(a) => a,
            None => {
                let substituted = self.substitution_indices();
                let (_, outside) = self.inside_and_outside();
                outside
                    .iter()
                    .copied()
                    .filter(|i| !substituted.contains(i))
                    .collect()
            }
        };
        self.cache.adsorbates.insert(adsorbates)
    }

    /// Atoms that fall in no other category.
    pub fn unknowns(&mut self) -> &[usize] {
        let unknowns = match self.cache.unknowns.take() {
            Some(u) => u,
            None => {
                let mut known: BTreeSet<usize> = self.basis_indices().iter().copied().collect();
                known.extend(self.interstitials().iter().copied());
                known.extend(self.adsorbates().iter().copied());
                known.extend(self.substitution_indices());
                (0..self.system.len()).filter(|i| !known.contains(i)).collect()
            }
        };
        self.cache.unknowns.insert(unknowns)
    }

    // ------------------------------------------------------------------------
    // Clusters & reconstruction
    // ------------------------------------------------------------------------

    /// Covalently connected groups of atoms over the whole structure.
    pub fn clusters(&mut self) -> &[Vec<usize>] {
        let clusters = match self.cache.clusters.take() {
            Some(c) => c,
            None => clustering::clusters(&self.dist_matrix_radii_pbc, self.config.bond_threshold),
        };
        self.cache.clusters.insert(clusters)
    }

    /// Clusters restricted to adsorbate atoms, dropping those with no adsorbate member.
    pub fn adsorbate_clusters(&mut self) -> Vec<Vec<usize>> {
        let adsorbates: BTreeSet<usize> = self.adsorbates().iter().copied().collect();
        self.clusters()
            .iter()
            .map(|c| {
                c.iter()
                    .copied()
                    .filter(|i| adsorbates.contains(i))
                    .collect::<Vec<_>>()
            })
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// The structure holding only the validated basis atoms.
    pub fn recreate_valid(&mut self) -> Result<Structure, StructureError> {
        let basis = self.basis_indices().to_vec();
        self.system.subset(&basis)
    }

    pub fn report(&mut self) -> DefectReport {
        let report = DefectReport {
            basis_indices: self.basis_indices().to_vec(),
            substitutions: self.substitutions().to_vec(),
            vacancies: self.vacancies().to_vec(),
            interstitials: self.interstitials().to_vec(),
            adsorbates: self.adsorbates().to_vec(),
            unknowns: self.unknowns().to_vec(),
            adsorbate_clusters: self.adsorbate_clusters(),
        };
        debug!(
            "classified {} atoms: {} basis, {} substitutions, {} vacancies, {} interstitials, {} adsorbates, {} unknown",
            self.system.len(),
            report.basis_indices.len(),
            report.substitutions.len(),
            report.vacancies.len(),
            report.interstitials.len(),
            report.adsorbates.len(),
            report.unknowns.len()
        );
        report
    }
}
