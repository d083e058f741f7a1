//! Weighted backend selection over a published routing snapshot.

use rand::Rng;

use crate::domain::backend::Backend;
use crate::domain::routing::WeightMap;

/// Picks a backend with probability proportional to its weight.
///
/// Returns `None` if the hostgroup is empty or every weight is zero.
pub fn select_weighted<'a, R: Rng>(weights: &'a WeightMap, rng: &mut R) -> Option<&'a Backend> {
    let total: u64 = weights.values().map(|w| u64::from(*w)).sum();
    if total == 0 {
        return None;
    }

    let mut roll = rng.gen_range(0..total);
    for (backend, weight) in weights {
        let weight = u64::from(*weight);
        if roll < weight {
            return Some(backend);
        }
        roll -= weight;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn empty_or_zero_weight_groups_select_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(select_weighted(&WeightMap::new(), &mut rng).is_none());

        let zeros = WeightMap::from([(Backend::new("a", 3306), 0)]);
        assert!(select_weighted(&zeros, &mut rng).is_none());
    }

    #[test]
    fn selection_follows_weights() {
        let fast = Backend::new("fast", 3306);
        let slow = Backend::new("slow", 3306);
        let weights = WeightMap::from([(fast.clone(), 90), (slow.clone(), 10)]);

        let mut rng = StdRng::seed_from_u64(42);
        let picks = 10_000;
        let fast_picks =
            (0..picks).filter(|_| select_weighted(&weights, &mut rng) == Some(&fast)).count();

        // 90% expected; the tolerance is far outside sampling noise at this size
        assert!((8_500..=9_500).contains(&fast_picks), "fast picked {fast_picks} times");
    }
}
