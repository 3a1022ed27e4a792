use crystal_classifier::{
    classify_defects, DefectConfig, DefectReport, LatticeIndex, Lattice, LinkedUnit,
    LinkedUnitCollection, Structure, Substitution, Vacancy,
};
use nalgebra::Vector3;

// ============================================================================
// TILING HELPERS
// ============================================================================

enum Site {
    Keep,
    Vacant,
    Substitute(u8),
}

#[derive(Default)]
struct Tiling {
    numbers: Vec<u8>,
    positions: Vec<Vector3<f64>>,
    units: Vec<(LatticeIndex, LinkedUnit)>,
}

impl Tiling {
    fn push_atom(&mut self, number: u8, position: Vector3<f64>) -> usize {
        self.numbers.push(number);
        self.positions.push(position);
        self.numbers.len() - 1
    }

    fn into_system(self, lattice: Lattice) -> (Structure, Vec<(LatticeIndex, LinkedUnit)>) {
        let system =
            Structure::from_cartesian(lattice, &self.numbers, &self.positions, [true; 3]).unwrap();
        (system, self.units)
    }
}

/// Repeats `cell` `reps` times from `origin`, recording one linked unit per repetition.
fn tile(
    cell: &Structure,
    reps: [i32; 3],
    origin: Vector3<f64>,
    site: impl Fn([i32; 3], usize) -> Site,
) -> Tiling {
    let mut tiling = Tiling::default();
    for i in 0..reps[0] {
        for j in 0..reps[1] {
            for k in 0..reps[2] {
                let shift = Vector3::new(i as f64, j as f64, k as f64);
                let mut unit = LinkedUnit::default();
                for (slot, atom) in cell.atoms.iter().enumerate() {
                    let position = cell.lattice.to_cartesian(&(atom.fractional_coords + shift)) + origin;
                    match site([i, j, k], slot) {
                        Site::Keep => {
                            let index = tiling.push_atom(atom.number, position);
                            unit.basis_indices.push(Some(index));
                        }
                        Site::Vacant => {
                            unit.basis_indices.push(None);
                            unit.vacancies.push(Vacancy {
                                number: atom.number,
                                position,
                            });
                        }
                        Site::Substitute(number) => {
                            let index = tiling.push_atom(number, position);
                            unit.basis_indices.push(None);
                            unit.substitutions.push(Substitution {
                                index,
                                original_number: atom.number,
                                substitutional_number: number,
                            });
                        }
                    }
                }
                tiling.units.push((LatticeIndex([i, j, k]), unit));
            }
        }
    }
    tiling
}

fn assert_partition(report: &DefectReport, n_atoms: usize) {
    let mut all: Vec<usize> = report
        .basis_indices
        .iter()
        .chain(&report.interstitials)
        .chain(&report.adsorbates)
        .chain(&report.unknowns)
        .copied()
        .chain(report.substitutions.iter().map(|s| s.index))
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..n_atoms).collect::<Vec<_>>(), "every atom must be counted once");
}

// ============================================================================
// PROTOTYPES
// ============================================================================

fn diamond_si() -> Structure {
    let positions = [
        [0.0, 0.0, 0.0],
        [0.0, 0.5, 0.5],
        [0.5, 0.0, 0.5],
        [0.5, 0.5, 0.0],
        [0.25, 0.25, 0.25],
        [0.25, 0.75, 0.75],
        [0.75, 0.25, 0.75],
        [0.75, 0.75, 0.25],
    ]
    .map(|p| Vector3::new(p[0], p[1], p[2]));
    Structure::from_fractional(Lattice::cubic(5.43).unwrap(), &[14; 8], &positions, [true; 3])
        .unwrap()
}

fn bcc_fe() -> Structure {
    Structure::from_fractional(
        Lattice::cubic(2.87).unwrap(),
        &[26, 26],
        &[Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
        [true; 3],
    )
    .unwrap()
}

fn rock_salt() -> Structure {
    let positions = [
        [0.0, 0.0, 0.0],
        [0.0, 0.5, 0.5],
        [0.5, 0.0, 0.5],
        [0.5, 0.5, 0.0],
        [0.5, 0.0, 0.0],
        [0.0, 0.5, 0.0],
        [0.0, 0.0, 0.5],
        [0.5, 0.5, 0.5],
    ]
    .map(|p| Vector3::new(p[0], p[1], p[2]));
    Structure::from_fractional(
        Lattice::cubic(5.64).unwrap(),
        &[11, 11, 11, 11, 17, 17, 17, 17],
        &positions,
        [true; 3],
    )
    .unwrap()
}

// ============================================================================
// BULK SCENARIOS
// ============================================================================

#[test]
fn pristine_diamond_has_no_defects() {
    let cell = diamond_si();
    let (system, units) =
        tile(&cell, [1, 1, 1], Vector3::zeros(), |_, _| Site::Keep).into_system(cell.lattice.clone());

    let report = classify_defects(system, cell, false, units, DefectConfig::default()).unwrap();
    assert_eq!(report.basis_indices, (0..8).collect::<Vec<_>>());
    assert!(report.vacancies.is_empty());
    assert!(report.substitutions.is_empty());
    assert!(report.interstitials.is_empty());
    assert!(report.adsorbates.is_empty());
    assert!(report.unknowns.is_empty());
}

#[test]
fn diamond_with_one_atom_removed_has_one_vacancy() {
    let cell = diamond_si();
    let (system, units) = tile(&cell, [1, 1, 1], Vector3::zeros(), |_, slot| {
        if slot == 7 {
            Site::Vacant
        } else {
            Site::Keep
        }
    })
    .into_system(cell.lattice.clone());
    assert_eq!(system.len(), 7);

    let report = classify_defects(system, cell, false, units, DefectConfig::default()).unwrap();
    assert_eq!(report.vacancies.len(), 1);
    assert_eq!(report.vacancies[0].number, 14);
    assert!(report.interstitials.is_empty());
    assert!(report.substitutions.is_empty());
    assert!(report.unknowns.is_empty());
    assert_partition(&report, 7);
}

#[test]
fn diamond_with_one_swapped_species_has_one_substitution() {
    let cell = diamond_si();
    let (system, units) = tile(&cell, [1, 1, 1], Vector3::zeros(), |_, slot| {
        if slot == 4 {
            Site::Substitute(32)
        } else {
            Site::Keep
        }
    })
    .into_system(cell.lattice.clone());

    let report = classify_defects(system, cell, false, units, DefectConfig::default()).unwrap();
    assert_eq!(
        report.substitutions,
        vec![Substitution {
            index: 4,
            original_number: 14,
            substitutional_number: 32
        }]
    );
    assert!(report.vacancies.is_empty());
    assert!(report.interstitials.is_empty());
    assert!(report.unknowns.is_empty());
    assert_eq!(report.basis_indices.len(), 7);
    assert_partition(&report, 8);
}

// ============================================================================
// SURFACE SCENARIOS
// ============================================================================

#[test]
fn foreign_atom_above_bcc_surface_is_an_adsorbate() {
    let cell = bcc_fe();
    let a = 2.87;
    let mut tiling = tile(&cell, [2, 2, 3], Vector3::new(0.0, 0.0, 10.0), |_, _| Site::Keep);
    let top = 10.0 + 2.0 * a + 0.5 * a;
    let oxygen = tiling.push_atom(8, Vector3::new(0.5 * a, 0.5 * a, top + 4.0));
    let lattice = Lattice::from_rows([[2.0 * a, 0.0, 0.0], [0.0, 2.0 * a, 0.0], [0.0, 0.0, 30.0]])
        .unwrap();
    let (system, units) = tiling.into_system(lattice);
    let n_atoms = system.len();

    let mut collection =
        LinkedUnitCollection::from_structures(system, cell, false, DefectConfig::default());
    for (index, unit) in units {
        collection.insert(index, unit).unwrap();
    }

    assert_eq!(collection.basis_indices().len(), 24);
    assert_eq!(collection.adsorbates(), &[oxygen]);
    assert_eq!(collection.adsorbate_clusters(), vec![vec![oxygen]]);
    assert!(collection.vacancies().is_empty());
    assert!(collection.substitutions().is_empty());
    assert!(collection.interstitials().is_empty());
    assert!(collection.unknowns().is_empty());
    assert_partition(&collection.report(), n_atoms);

    let valid = collection.recreate_valid().unwrap();
    assert_eq!(valid.len(), 24);
    assert!(valid.numbers().iter().all(|&z| z == 26));
}

#[test]
fn rock_salt_slab_with_vacancy_substitution_and_water() {
    let cell = rock_salt();
    let a = 5.64;
    let mut tiling = tile(&cell, [2, 2, 3], Vector3::new(0.0, 0.0, 10.0), |index, slot| {
        match (index, slot) {
            ([0, 0, 1], 0) => Site::Vacant,
            ([1, 0, 1], 1) => Site::Substitute(15),
            _ => Site::Keep,
        }
    });

    // Water 3.5 Å above a surface Na.
    let top = 10.0 + 2.0 * a + 0.5 * a;
    let o = Vector3::new(0.0, 0.5 * a, top + 3.5);
    let water = [
        tiling.push_atom(8, o),
        tiling.push_atom(1, o + Vector3::new(0.757, 0.0, 0.586)),
        tiling.push_atom(1, o + Vector3::new(-0.757, 0.0, 0.586)),
    ];
    let lattice = Lattice::from_rows([[2.0 * a, 0.0, 0.0], [0.0, 2.0 * a, 0.0], [0.0, 0.0, 40.0]])
        .unwrap();
    let (system, units) = tiling.into_system(lattice);
    let n_atoms = system.len();

    let report = classify_defects(system, cell, false, units, DefectConfig::default()).unwrap();
    assert_eq!(report.vacancies.len(), 1);
    assert_eq!(report.vacancies[0].number, 11);
    assert_eq!(report.substitutions.len(), 1);
    assert_eq!(report.substitutions[0].original_number, 11);
    assert_eq!(report.substitutions[0].substitutional_number, 15);
    assert!(report.interstitials.is_empty());
    assert!(report.unknowns.is_empty());
    assert_eq!(report.adsorbates, water.to_vec());
    assert_eq!(report.adsorbate_clusters, vec![water.to_vec()]);
    assert_partition(&report, n_atoms);
}

#[test]
fn two_dimensional_defects_skip_the_volume_test() {
    // A single atomic layer has no volume, so its vacancy can only be accepted unconditionally.
    let lattice = Lattice::from_rows([[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 20.0]]).unwrap();
    let cell = Structure::from_fractional(lattice, &[6], &[Vector3::new(0.0, 0.0, 0.5)], [true, true, false])
        .unwrap();
    let tiling = tile(&cell, [3, 3, 1], Vector3::zeros(), |index, _| {
        if index == [1, 1, 0] {
            Site::Vacant
        } else {
            Site::Keep
        }
    });
    let big = Lattice::from_rows([[9.0, 0.0, 0.0], [0.0, 9.0, 0.0], [0.0, 0.0, 20.0]]).unwrap();
    let system =
        Structure::from_cartesian(big, &tiling.numbers, &tiling.positions, [true, true, false])
            .unwrap();

    let mut collection =
        LinkedUnitCollection::from_structures(system, cell, true, DefectConfig::default());
    for (index, unit) in tiling.units {
        collection.insert(index, unit).unwrap();
    }
    assert_eq!(collection.vacancies().len(), 1);
    assert!(collection.tetrahedra_decomposition().is_empty());
}
