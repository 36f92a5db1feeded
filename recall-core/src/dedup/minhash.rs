//! MinHash signatures and LSH banding over character shingles.

use crate::constants::defaults;
use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Fixed seed so signatures are stable across runs and restarts.
const PERMUTATION_SEED: u64 = 0x5143_9df2_f3a8_1c07;

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// The `(a, b)` multipliers for each of the permutation hash functions.
fn permutations(n: usize) -> Vec<(u64, u64)> {
    let mut state = PERMUTATION_SEED;
    (0..n)
        .map(|_| {
            let a = splitmix64(&mut state) | 1; // odd multiplier
            let b = splitmix64(&mut state);
            (a, b)
        })
        .collect()
}

fn hash_shingle(shingle: &[char]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for c in shingle {
        c.hash(&mut hasher);
    }
    hasher.finish()
}

/// Hashed character shingles of the (already normalized) text.
#[must_use]
pub fn shingles(text: &str) -> BTreeSet<u64> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < defaults::MINHASH_SHINGLE_SIZE {
        let mut set = BTreeSet::new();
        if !chars.is_empty() {
            set.insert(hash_shingle(&chars));
        }
        return set;
    }
    chars
        .windows(defaults::MINHASH_SHINGLE_SIZE)
        .map(hash_shingle)
        .collect()
}

/// MinHash signature: one minimum per permutation.
#[must_use]
pub fn signature(text: &str) -> Vec<u64> {
    let shingle_set = shingles(text);
    let perms = permutations(defaults::MINHASH_PERMUTATIONS);
    perms
        .iter()
        .map(|(a, b)| {
            shingle_set
                .iter()
                .map(|s| a.wrapping_mul(*s).wrapping_add(*b))
                .min()
                .unwrap_or(u64::MAX)
        })
        .collect()
}

/// Jaccard similarity estimated from two signatures.
#[must_use]
pub fn estimate_jaccard(a: &[u64], b: &[u64]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let equal = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    equal as f32 / a.len() as f32
}

/// LSH bucket keys: one hash per band of the signature.
#[must_use]
pub fn band_keys(signature: &[u64]) -> Vec<(usize, u64)> {
    let rows = signature.len() / defaults::LSH_BANDS;
    if rows == 0 {
        return Vec::new();
    }
    (0..defaults::LSH_BANDS)
        .map(|band| {
            let mut hasher = DefaultHasher::new();
            for value in &signature[band * rows..(band + 1) * rows] {
                value.hash(&mut hasher);
            }
            (band, hasher.finish())
        })
        .collect()
}
