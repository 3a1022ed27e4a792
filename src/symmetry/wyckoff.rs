use crate::core::error::{ExpressionError, SymmetryError};
use crate::core::structure::{Lattice, Structure};
use crate::geometry::periodic::wrap_coordinate;
use crate::symmetry::tables::{SpaceGroupData, WyckoffSet};
use log::debug;
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// Atoms of one species sharing one Wyckoff orbit.
#[derive(Debug, Clone, PartialEq)]
pub struct WyckoffGroup {
    pub letter: char,
    pub number: u8,
    pub indices: Vec<usize>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl WyckoffGroup {
    pub fn multiplicity(&self) -> usize {
        self.indices.len()
    }

    pub fn has_free_parameters(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.z.is_some()
    }
}

/// Index of the position in `candidates` closest to `target` under periodic wrapping, if
/// that cartesian distance is within `accuracy`.
pub fn search_periodic_position(
    target: &Vector3<f64>,
    candidates: &[Vector3<f64>],
    lattice: &Lattice,
    accuracy: f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in candidates.iter().enumerate() {
        let mut d = target - c;
        for axis in 0..3 {
            d[axis] -= d[axis].round();
        }
        let distance = lattice.to_cartesian(&d).norm();
        if best.map_or(true, |(_, b)| distance < b) {
            best = Some((i, distance));
        }
    }
    best.filter(|&(_, d)| d <= accuracy).map(|(i, _)| i)
}

/// Every position the Wyckoff set generates for `values`, centring translations included.
fn orbit(
    set: &WyckoffSet,
    translations: &[Vector3<f64>],
    values: &Vector3<f64>,
) -> Result<Vec<Vector3<f64>>, ExpressionError> {
    let zero = [Vector3::zeros()];
    let shifts: &[Vector3<f64>] = if translations.is_empty() {
        &zero
    } else {
        translations
    };
    let mut out = Vec::with_capacity(set.expressions.len() * shifts.len());
    for i in 0..set.expressions.len() {
        if let Some(p) = set.position(i, values)? {
            for t in shifts {
                out.push((p + t).map(wrap_coordinate));
            }
        }
    }
    Ok(out)
}

/// Values of the free variables reproducing `members`, or `None` for fixed positions.
///
/// Each member's own coordinates are tried as (x, y, z). A trial passes when every
/// position of the orbit lands on some member. Among passing trials the lexicographically
/// smallest (x, y, z) wins. No passing trial is a [`SymmetryError::WyckoffResolution`]
/// for species `number` in `space_group`.
pub fn resolve_free_parameters(
    set: &WyckoffSet,
    translations: &[Vector3<f64>],
    members: &[Vector3<f64>],
    lattice: &Lattice,
    accuracy: f64,
    (space_group, number): (u16, u8),
) -> Result<Option<Vector3<f64>>, SymmetryError> {
    if !set.has_free_variables() {
        return Ok(None);
    }
    let mut passing: Vec<Vector3<f64>> = Vec::new();
    for member in members {
        let trial = member.map(wrap_coordinate);
        let consistent = orbit(set, translations, &trial)?
            .iter()
            .all(|p| search_periodic_position(p, members, lattice, accuracy).is_some());
        if consistent {
            passing.push(trial);
        }
    }
    passing
        .into_iter()
        .min_by(|a, b| {
            a.x.total_cmp(&b.x)
                .then(a.y.total_cmp(&b.y))
                .then(a.z.total_cmp(&b.z))
        })
        .map(Some)
        .ok_or(SymmetryError::WyckoffResolution {
            space_group,
            letter: set.letter,
            number,
        })
}

/// Groups the atoms of a conventional cell by equivalence class and resolves the free
/// Wyckoff parameters of each group. Groups come out sorted by (letter, atomic number).
pub fn wyckoff_groups(
    cell: &Structure,
    letters: &[char],
    equivalent_atoms: &[usize],
    space_group: u16,
    data: Option<&SpaceGroupData>,
    accuracy: f64,
) -> Result<Vec<WyckoffGroup>, SymmetryError> {
    let missing = |what: String| SymmetryError::MissingReferenceData { space_group, what };
    let data = data.ok_or_else(|| missing("Wyckoff positions".to_string()))?;

    let mut classes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &class) in equivalent_atoms.iter().enumerate().take(cell.len()) {
        classes.entry(class).or_default().push(i);
    }

    let mut groups = Vec::with_capacity(classes.len());
    for indices in classes.into_values() {
        let first = indices[0];
        let letter = letters[first];
        let number = cell.atoms[first].number;
        let set = data
            .wyckoff_sets
            .get(&letter)
            .ok_or_else(|| missing(format!("Wyckoff letter '{letter}'")))?;

        let members: Vec<Vector3<f64>> = indices
            .iter()
            .map(|&i| cell.atoms[i].fractional_coords)
            .collect();
        let values = resolve_free_parameters(
            set,
            &data.centring_translations,
            &members,
            &cell.lattice,
            accuracy,
            (space_group, number),
        )?;

        let pick = |axis: usize, name: char| {
            values
                .filter(|_| set.variables.contains(&name))
                .map(|v| v[axis])
        };
        groups.push(WyckoffGroup {
            letter,
            number,
            x: pick(0, 'x'),
            y: pick(1, 'y'),
            z: pick(2, 'z'),
            indices,
        });
    }
    groups.sort_by(|a, b| {
        (a.letter, a.number, a.indices[0]).cmp(&(b.letter, b.number, b.indices[0]))
    });
    debug!("space group {space_group}: {} Wyckoff groups", groups.len());
    Ok(groups)
}
