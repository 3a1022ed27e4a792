use crate::chemistry::elements::covalent_radius;
use crate::core::structure::Structure;
use crate::geometry::periodic::DisplacementTensor;
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// Neighbour counts per species around one atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChemicalEnvironment {
    counts: BTreeMap<u8, usize>,
}

impl ChemicalEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: impl IntoIterator<Item = (u8, usize)>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
        }
    }

    pub fn add(&mut self, number: u8) {
        *self.counts.entry(number).or_insert(0) += 1;
    }

    pub fn count(&self, number: u8) -> usize {
        self.counts.get(&number).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        self.counts.iter().map(|(&k, &v)| (k, v))
    }

    /// Overlap with `real`, taking `self` as the ideal environment.
    ///
    /// Returns sum(min(ideal, real)) / sum(ideal): 1.0 for a perfect match, 0.0 for no
    /// overlap. An ideal environment without neighbours matches anything.
    pub fn chemical_distance(&self, real: &ChemicalEnvironment) -> f64 {
        let max_score = self.total();
        if max_score == 0 {
            return 1.0;
        }
        let score: usize = self
            .counts
            .iter()
            .map(|(number, &ideal)| ideal.min(real.count(*number)))
            .sum();
        score as f64 / max_score as f64
    }
}

/// Counts the neighbours of atom `index` within `bond_threshold` of covalent contact.
///
/// `displacements` holds `pos[index] - pos[j]` for every atom `j` of `structure` and each of
/// the cartesian `translations` is added on top. The atom itself is skipped for the zero
/// translation.
pub fn chemical_environment(
    index: usize,
    structure: &Structure,
    displacements: &DisplacementTensor,
    translations: &[Vector3<f64>],
    bond_threshold: f64,
) -> ChemicalEnvironment {
    let mut environment = ChemicalEnvironment::new();
    let Some(center) = structure.atoms.get(index) else {
        return environment;
    };
    let r_center = covalent_radius(center.number);

    for (j, neighbour) in structure.atoms.iter().enumerate() {
        let r_sum = r_center + covalent_radius(neighbour.number);
        let d = displacements.get(index, j);
        for t in translations {
            if j == index && t.norm_squared() < 1e-12 {
                continue;
            }
            if (d + t).norm() - r_sum <= bond_threshold {
                environment.add(neighbour.number);
            }
        }
    }
    environment
}
