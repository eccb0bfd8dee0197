//! Seeded random helpers.

use rand::Rng;

use crate::link::IdentityMap;

/// Pick one item with probability proportional to `weight`. Items with a
/// non-positive weight are never picked.
pub fn weighted_pick<'a, T, R: Rng + ?Sized>(
    rng: &mut R,
    items: &'a [T],
    weight: impl Fn(&T) -> f32,
) -> Option<&'a T> {
    let total: f32 = items.iter().map(|i| weight(i).max(0.0)).sum();
    if total <= 0.0 {
        return None;
    }
    let mut roll = rng.gen_range(0.0..total);
    for item in items {
        let w = weight(item).max(0.0);
        if w <= 0.0 {
            continue;
        }
        if roll < w {
            return Some(item);
        }
        roll -= w;
    }
    // Float rounding can leave `roll` just past the last bucket.
    items.iter().rev().find(|i| weight(i) > 0.0)
}

/// A non-zero id not currently in `identities`.
pub fn unique_id<R: Rng + ?Sized>(rng: &mut R, identities: &IdentityMap) -> u64 {
    loop {
        let id: u64 = rng.gen();
        if id != 0 && !identities.contains(id) {
            return id;
        }
    }
}
