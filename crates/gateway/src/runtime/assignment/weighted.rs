//! Weighted random selection.

use rand::Rng;

use rd_domain::config::Employee;

/// Draw one member with probability `weight / Σweight`.
///
/// Weight-0 members are dropped before the draw.  `r` is uniform in
/// `[0, Σw)` and the first member whose running sum reaches `r` wins.
pub fn weighted_pick<'a, R>(pool: &[&'a Employee], rng: &mut R) -> Option<&'a Employee>
where
    R: Rng,
{
    let active: Vec<&'a Employee> = pool.iter().copied().filter(|e| e.weight > 0).collect();
    let total: u64 = active.iter().map(|e| u64::from(e.weight)).sum();
    if total == 0 {
        return None;
    }
    let r = rng.gen_range(0.0..total as f64);
    let mut cumulative = 0.0;
    for e in &active {
        cumulative += f64::from(e.weight);
        if cumulative >= r {
            return Some(e);
        }
    }
    active.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn employee(name: &str, weight: u32) -> Employee {
        Employee {
            name: name.into(),
            phone: String::new(),
            weight,
            role: "sales".into(),
            group: None,
        }
    }

    #[test]
    fn converges_to_weight_ratio() {
        let a = employee("a", 1);
        let b = employee("b", 3);
        let pool = [&a, &b];
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 100_000;
        let hits = (0..trials)
            .filter(|_| weighted_pick(&pool, &mut rng).map(|e| e.name.as_str()) == Some("b"))
            .count();
        let share = hits as f64 / trials as f64;
        assert!((share - 0.75).abs() <= 0.02, "share was {share}");
    }

    #[test]
    fn zero_weight_is_never_picked() {
        let idle = employee("idle", 0);
        let busy = employee("busy", 1);
        let pool = [&idle, &busy];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1_000 {
            assert_eq!(weighted_pick(&pool, &mut rng).unwrap().name, "busy");
        }
    }

    #[test]
    fn empty_or_all_inactive_pool_yields_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(weighted_pick(&[], &mut rng).is_none());
        let idle = employee("idle", 0);
        assert!(weighted_pick(&[&idle], &mut rng).is_none());
    }
}
