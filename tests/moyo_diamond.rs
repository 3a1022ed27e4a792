use approx::assert_relative_eq;
use crystal_classifier::{
    normalize, CrystalSystem, Lattice, Structure, SymmetryAnalyzer, SymmetryConfig,
    SymmetryTables,
};
use nalgebra::Vector3;
use std::sync::Arc;

/// Fd-3m in origin choice 1. The shift by (1/2, 1/2, 1/2) swaps 8a and 8b.
const TABLES_227: &str = r#"{
    "227": {
        "wyckoff_sets": {
            "a": {"expressions": [["0", "0", "0"], ["3/4", "1/4", "3/4"]]},
            "b": {"expressions": [["1/2", "1/2", "1/2"], ["1/4", "3/4", "1/4"]]}
        },
        "centring_translations": [[0, 0, 0], [0, 0.5, 0.5], [0.5, 0, 0.5], [0.5, 0.5, 0]],
        "proper_rigid_transformations": [
            {
                "transformation": [[1,0,0,0.5],[0,1,0,0.5],[0,0,1,0.5],[0,0,0,1]],
                "permutations": {"a": "b", "b": "a"}
            }
        ]
    }
}"#;

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

fn tables() -> Arc<SymmetryTables> {
    Arc::new(SymmetryTables::from_json_str(TABLES_227).unwrap())
}

#[test]
fn diamond_silicon_normalizes_to_fd3m() {
    let dataset = normalize(diamond_si(), 0.1, tables()).unwrap();
    assert_eq!(dataset.number, 227);
    assert_eq!(dataset.international_short, "Fd-3m");
    assert_eq!(dataset.point_group, "m-3m");
    assert_eq!(dataset.crystal_system, CrystalSystem::Cubic);
    assert_eq!(dataset.bravais_lattice.as_deref(), Some("cF"));
    assert_eq!(dataset.operations.len(), 192);
    assert_eq!(dataset.wyckoff_letters, vec!['a'; 8]);
    assert!(dataset.equivalent_atoms.iter().all(|&e| e == dataset.equivalent_atoms[0]));
}

#[test]
fn diamond_silicon_derived_cells() {
    let original = diamond_si();
    let mut analyzer =
        SymmetryAnalyzer::new(original.clone(), tables(), SymmetryConfig::default()).unwrap();

    let conventional = analyzer.conventional_system().unwrap().clone();
    assert_eq!(conventional.structure.len(), 8);
    assert_eq!(conventional.wyckoff_letters, vec!['a'; 8]);

    let groups = analyzer.wyckoff_groups_conventional().unwrap().to_vec();
    assert_eq!(groups.len(), 1);
    assert_eq!((groups[0].letter, groups[0].number), ('a', 14));
    assert_eq!(groups[0].multiplicity(), 8);
    assert!(!groups[0].has_free_parameters());

    let primitive = analyzer.primitive_system().unwrap().clone();
    assert_eq!(primitive.structure.len(), 2);
    assert_relative_eq!(
        primitive.structure.volume(),
        conventional.structure.volume() / 4.0,
        max_relative = 1e-8
    );

    let fit = analyzer.conventional_lattice_fit().unwrap().clone();
    assert_relative_eq!(
        fit.volume() / conventional.structure.len() as f64,
        original.volume() / original.len() as f64,
        max_relative = 1e-8
    );
}

#[test]
fn renormalizing_the_conventional_cell_is_stable() {
    let mut analyzer =
        SymmetryAnalyzer::new(diamond_si(), tables(), SymmetryConfig::default()).unwrap();
    let number = analyzer.space_group_number().unwrap();
    let point_group = analyzer.point_group().unwrap().to_string();
    let conventional = analyzer.conventional_system().unwrap().clone();

    analyzer.set_system(conventional.structure.clone()).unwrap();
    assert_eq!(analyzer.space_group_number().unwrap(), number);
    assert_eq!(analyzer.point_group().unwrap(), point_group);
    assert_eq!(
        analyzer.conventional_system().unwrap().wyckoff_letters,
        conventional.wyckoff_letters
    );
}

#[test]
fn shifted_origin_lands_on_the_same_letters() {
    let mut shifted = diamond_si();
    for atom in &mut shifted.atoms {
        atom.fractional_coords += Vector3::new(0.5, 0.5, 0.5);
    }
    let dataset = normalize(shifted.wrapped(), 0.1, tables()).unwrap();
    assert_eq!(dataset.number, 227);
    assert_eq!(dataset.wyckoff_letters, vec!['a'; 8]);
}
