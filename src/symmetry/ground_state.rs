use crate::core::error::SymmetryError;
use crate::symmetry::tables::RigidTransformation;
use std::collections::{BTreeMap, BTreeSet};

/// Atom count per (Wyckoff letter, atomic number).
pub type LetterCounts = BTreeMap<(char, u8), usize>;

pub fn letter_counts(
    transformation: &RigidTransformation,
    letters: &[char],
    numbers: &[u8],
) -> LetterCounts {
    let mut counts = LetterCounts::new();
    for (&letter, &number) in letters.iter().zip(numbers) {
        *counts
            .entry((transformation.permute(letter), number))
            .or_insert(0) += 1;
    }
    counts
}

/// Picks the canonical Wyckoff setting among `candidates`.
///
/// Keys are visited in (letter, atomic number) order and at each key only the candidates
/// reaching the highest count survive. Narrowing stops at a single survivor. When the keys
/// run out with several left, they must all produce the same counts and the first one is
/// returned; otherwise the tabulated transformations are inconsistent.
pub fn select_ground_state(
    candidates: &[RigidTransformation],
    letters: &[char],
    numbers: &[u8],
    space_group: u16,
) -> Result<usize, SymmetryError> {
    if candidates.is_empty() {
        return Err(SymmetryError::AmbiguousGroundState { space_group });
    }
    let counts: Vec<LetterCounts> = candidates
        .iter()
        .map(|t| letter_counts(t, letters, numbers))
        .collect();
    let keys: BTreeSet<(char, u8)> = counts.iter().flat_map(|c| c.keys().copied()).collect();

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    for key in keys {
        if remaining.len() == 1 {
            break;
        }
        let count_of = |i: usize| counts[i].get(&key).copied().unwrap_or(0);
        let best = remaining.iter().map(|&i| count_of(i)).max().unwrap_or(0);
        remaining.retain(|&i| count_of(i) == best);
    }

    let first = remaining[0];
    if remaining.iter().all(|&i| counts[i] == counts[first]) {
        Ok(first)
    } else {
        Err(SymmetryError::AmbiguousGroundState { space_group })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix4;

    fn swap(pairs: &[(char, char)]) -> RigidTransformation {
        RigidTransformation {
            transformation: Matrix4::identity(),
            permutations: pairs.iter().copied().collect(),
        }
    }

    #[test]
    fn prefers_early_letters() {
        let candidates = vec![RigidTransformation::identity(), swap(&[('a', 'b'), ('b', 'a')])];
        // Identity puts everything on 'b'; the swap moves it onto 'a'.
        let chosen = select_ground_state(&candidates, &['b', 'b'], &[14, 14], 227).unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn lighter_species_decide_ties_on_a_letter() {
        let candidates = vec![RigidTransformation::identity(), swap(&[('a', 'b'), ('b', 'a')])];
        // Na on 'a', Cl on 'b' under the identity; the swap puts Cl on 'a' instead.
        let chosen = select_ground_state(&candidates, &['a', 'b'], &[11, 17], 225).unwrap();
        assert_eq!(chosen, 0);
    }

    #[test]
    fn equivalent_candidates_resolve_to_the_first() {
        let candidates = vec![RigidTransformation::identity(), swap(&[('c', 'd'), ('d', 'c')])];
        let chosen = select_ground_state(&candidates, &['a', 'a'], &[6, 6], 191).unwrap();
        assert_eq!(chosen, 0);
    }

    #[test]
    fn no_candidates_is_ambiguous() {
        assert!(matches!(
            select_ground_state(&[], &['a'], &[1], 1),
            Err(SymmetryError::AmbiguousGroundState { space_group: 1 })
        ));
    }
}
