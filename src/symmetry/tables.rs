//! Per-space-group reference data: Wyckoff position expressions and the alternative
//! rigid transformations used to pick a canonical Wyckoff setting. The crystal-system,
//! point-group and Bravais lookups are built in.

use crate::core::error::ExpressionError;
use crate::math::expression::Expression;
use anyhow::{Context, Result};
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// ============================================================================
// SERIALIZED FORM
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawWyckoffSet {
    #[serde(default)]
    variables: Vec<char>,
    expressions: Vec<[String; 3]>,
}

#[derive(Debug, Deserialize)]
struct RawRigidTransformation {
    transformation: [[f64; 4]; 4],
    #[serde(default)]
    permutations: BTreeMap<char, char>,
}

#[derive(Debug, Deserialize)]
struct RawSpaceGroup {
    #[serde(default)]
    wyckoff_sets: BTreeMap<char, RawWyckoffSet>,
    #[serde(default)]
    centring_translations: Vec<[f64; 3]>,
    #[serde(default)]
    proper_rigid_transformations: Vec<RawRigidTransformation>,
    #[serde(default)]
    improper_rigid_transformations: Vec<RawRigidTransformation>,
}

// ============================================================================
// COMPILED TABLES
// ============================================================================

/// The orbit of one Wyckoff letter as compiled expressions.
#[derive(Debug, Clone)]
pub struct WyckoffSet {
    pub letter: char,
    pub variables: Vec<char>,
    pub expressions: Vec<[Expression; 3]>,
}

impl WyckoffSet {
    pub fn has_free_variables(&self) -> bool {
        !self.variables.is_empty()
    }

    /// Fractional position produced by expression `i` for the given (x, y, z).
    pub fn position(
        &self,
        i: usize,
        values: &Vector3<f64>,
    ) -> Result<Option<Vector3<f64>>, ExpressionError> {
        self.expressions
            .get(i)
            .map(|[ex, ey, ez]| {
                Ok(Vector3::new(ex.eval(values)?, ey.eval(values)?, ez.eval(values)?))
            })
            .transpose()
    }
}

/// A symmetry-preserving change of setting and the Wyckoff-letter permutation it induces.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidTransformation {
    pub transformation: Matrix4<f64>,
    pub permutations: BTreeMap<char, char>,
}

impl RigidTransformation {
    pub fn identity() -> Self {
        Self {
            transformation: Matrix4::identity(),
            permutations: BTreeMap::new(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.transformation == Matrix4::identity()
            && self.permutations.iter().all(|(from, to)| from == to)
    }

    /// Letter `letter` is mapped to. Letters absent from the table are left alone.
    pub fn permute(&self, letter: char) -> char {
        self.permutations.get(&letter).copied().unwrap_or(letter)
    }

    /// Applies the homogeneous transform to a fractional position.
    pub fn apply(&self, position: &Vector3<f64>) -> Vector3<f64> {
        let h = self.transformation * position.push(1.0);
        Vector3::new(h.x, h.y, h.z)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpaceGroupData {
    pub wyckoff_sets: BTreeMap<char, WyckoffSet>,
    pub centring_translations: Vec<Vector3<f64>>,
    pub proper_rigid_transformations: Vec<RigidTransformation>,
    pub improper_rigid_transformations: Vec<RigidTransformation>,
}

/// Read-only reference tables keyed by space-group number.
#[derive(Debug, Clone, Default)]
pub struct SymmetryTables {
    groups: BTreeMap<u16, SpaceGroupData>,
}

fn compile_rigid(raw: RawRigidTransformation) -> RigidTransformation {
    let m = raw.transformation;
    RigidTransformation {
        transformation: Matrix4::from_fn(|r, c| m[r][c]),
        permutations: raw.permutations,
    }
}

impl SymmetryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON form and compiles every position expression.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: BTreeMap<u16, RawSpaceGroup> =
            serde_json::from_str(json).context("malformed symmetry reference tables")?;

        let mut groups = BTreeMap::new();
        for (number, group) in raw {
            let mut wyckoff_sets = BTreeMap::new();
            for (letter, set) in group.wyckoff_sets {
                let mut expressions = Vec::with_capacity(set.expressions.len());
                for [x, y, z] in &set.expressions {
                    let compile = |source: &String| {
                        Expression::parse(source, &set.variables).with_context(|| {
                            format!("space group {number}, Wyckoff letter '{letter}'")
                        })
                    };
                    expressions.push([compile(x)?, compile(y)?, compile(z)?]);
                }
                wyckoff_sets.insert(
                    letter,
                    WyckoffSet {
                        letter,
                        variables: set.variables,
                        expressions,
                    },
                );
            }
            groups.insert(
                number,
                SpaceGroupData {
                    wyckoff_sets,
                    centring_translations: group
                        .centring_translations
                        .iter()
                        .map(|t| Vector3::new(t[0], t[1], t[2]))
                        .collect(),
                    proper_rigid_transformations: group
                        .proper_rigid_transformations
                        .into_iter()
                        .map(compile_rigid)
                        .collect(),
                    improper_rigid_transformations: group
                        .improper_rigid_transformations
                        .into_iter()
                        .map(compile_rigid)
                        .collect(),
                },
            );
        }
        Ok(Self { groups })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read symmetry tables from {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("while loading {}", path.display()))
    }

    pub fn insert(&mut self, number: u16, data: SpaceGroupData) {
        self.groups.insert(number, data);
    }

    pub fn space_group(&self, number: u16) -> Option<&SpaceGroupData> {
        self.groups.get(&number)
    }

    pub fn wyckoff_set(&self, number: u16, letter: char) -> Option<&WyckoffSet> {
        self.groups.get(&number)?.wyckoff_sets.get(&letter)
    }

    pub fn proper_rigid_transformations(&self, number: u16) -> &[RigidTransformation] {
        self.groups
            .get(&number)
            .map(|g| g.proper_rigid_transformations.as_slice())
            .unwrap_or(&[])
    }

    pub fn improper_rigid_transformations(&self, number: u16) -> &[RigidTransformation] {
        self.groups
            .get(&number)
            .map(|g| g.improper_rigid_transformations.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// ============================================================================
// BUILT-IN LOOKUPS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrystalSystem {
    Triclinic,
    Monoclinic,
    Orthorhombic,
    Tetragonal,
    Trigonal,
    Hexagonal,
    Cubic,
}

impl CrystalSystem {
    pub fn from_space_group(number: u16) -> Option<Self> {
        let system = match number {
            1..=2 => Self::Triclinic,
            3..=15 => Self::Monoclinic,
            16..=74 => Self::Orthorhombic,
            75..=142 => Self::Tetragonal,
            143..=167 => Self::Trigonal,
            168..=194 => Self::Hexagonal,
            195..=230 => Self::Cubic,
            _ => return None,
        };
        Some(system)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Triclinic => "triclinic",
            Self::Monoclinic => "monoclinic",
            Self::Orthorhombic => "orthorhombic",
            Self::Tetragonal => "tetragonal",
            Self::Trigonal => "trigonal",
            Self::Hexagonal => "hexagonal",
            Self::Cubic => "cubic",
        }
    }

    /// First letter of the Bravais lattice symbol. Trigonal groups share the hexagonal family.
    fn family_letter(self) -> char {
        match self {
            Self::Triclinic => 'a',
            Self::Monoclinic => 'm',
            Self::Orthorhombic => 'o',
            Self::Tetragonal => 't',
            Self::Trigonal | Self::Hexagonal => 'h',
            Self::Cubic => 'c',
        }
    }
}

impl fmt::Display for CrystalSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hermann-Mauguin symbol of the crystallographic point group of a space group.
pub fn point_group_symbol(number: u16) -> Option<&'static str> {
    let symbol = match number {
        1 => "1",
        2 => "-1",
        3..=5 => "2",
        6..=9 => "m",
        10..=15 => "2/m",
        16..=24 => "222",
        25..=46 => "mm2",
        47..=74 => "mmm",
        75..=80 => "4",
        81..=82 => "-4",
        83..=88 => "4/m",
        89..=98 => "422",
        99..=110 => "4mm",
        111..=122 => "-42m",
        123..=142 => "4/mmm",
        143..=146 => "3",
        147..=148 => "-3",
        149..=155 => "32",
        156..=161 => "3m",
        162..=167 => "-3m",
        168..=173 => "6",
        174 => "-6",
        175..=176 => "6/m",
        177..=182 => "622",
        183..=186 => "6mm",
        187..=190 => "-6m2",
        191..=194 => "6/mmm",
        195..=199 => "23",
        200..=206 => "m-3",
        207..=214 => "432",
        215..=220 => "-43m",
        221..=230 => "m-3m",
        _ => return None,
    };
    Some(symbol)
}

/// Bravais lattice symbol (e.g. "cF", "oS", "hR") from the space-group number and the
/// centring letter leading the international symbol.
pub fn bravais_lattice(number: u16, centring: char) -> Option<String> {
    let system = CrystalSystem::from_space_group(number)?;
    let lattice = match (system, centring) {
        (CrystalSystem::Monoclinic, 'A' | 'B' | 'C' | 'I') => 'C',
        (CrystalSystem::Orthorhombic, 'A' | 'B' | 'C') => 'S',
        (_, c @ ('P' | 'I' | 'F' | 'R')) => c,
        _ => return None,
    };
    Some(format!("{}{}", system.family_letter(), lattice))
}
