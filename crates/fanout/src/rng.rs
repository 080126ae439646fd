//! Derived random streams.
//!
//! Every random decision draws from a stream keyed by the request seed and
//! the position of the decision (hop, edge type, node), so the outcome does
//! not depend on which thread makes it or in what order.

use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

/// SplitMix64 finalizer.
pub(crate) fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Fold `parts` into `seed`.
pub(crate) fn derive_seed(seed: u64, parts: &[u64]) -> u64 {
    parts.iter().fold(mix(seed), |acc, &p| mix(acc ^ p))
}

/// Stream for one keyed decision.
pub(crate) fn stream(seed: u64, parts: &[u64]) -> XorShiftRng {
    XorShiftRng::seed_from_u64(derive_seed(seed, parts))
}
