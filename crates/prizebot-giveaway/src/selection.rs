//! Winner selection.
//!
//! A pure function over the participant list and a caller-supplied random
//! source, so tests can pin the outcome with a seeded RNG.

use rand::Rng;

/// Pick one participant uniformly at random.
///
/// # Panics
///
/// Panics if `participants` is empty. Callers must handle the no-participant
/// case before drawing.
pub fn select_winner<'a, R: Rng + ?Sized>(participants: &'a [String], rng: &mut R) -> &'a str {
    assert!(
        !participants.is_empty(),
        "select_winner called with an empty participant list"
    );
    let idx = rng.gen_range(0..participants.len());
    &participants[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn people(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_participant_always_wins() {
        let mut rng = StdRng::seed_from_u64(7);
        let list = people(&["alice"]);
        for _ in 0..20 {
            assert_eq!(select_winner(&list, &mut rng), "alice");
        }
    }

    #[test]
    fn same_seed_same_winner() {
        let list = people(&["alice", "bob", "carol", "dave"]);
        let a = select_winner(&list, &mut StdRng::seed_from_u64(42)).to_string();
        let b = select_winner(&list, &mut StdRng::seed_from_u64(42)).to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn winner_frequencies_converge_to_uniform() {
        let list = people(&["alice", "bob", "carol", "dave"]);
        let mut rng = StdRng::seed_from_u64(1234);
        let trials = 40_000;
        let mut counts = [0usize; 4];
        for _ in 0..trials {
            let w = select_winner(&list, &mut rng);
            let idx = list.iter().position(|p| p == w).unwrap();
            counts[idx] += 1;
        }
        let expected = 1.0 / list.len() as f64;
        for (name, count) in list.iter().zip(counts) {
            let freq = count as f64 / trials as f64;
            assert!(
                (freq - expected).abs() < 0.015,
                "{name} drawn with frequency {freq}, expected ~{expected}"
            );
        }
    }

    #[test]
    #[should_panic(expected = "empty participant list")]
    fn empty_list_panics() {
        let mut rng = StdRng::seed_from_u64(0);
        select_winner(&[], &mut rng);
    }
}
