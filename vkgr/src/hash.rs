// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Deterministic content hashing.
//!
//! Cache keys are 64-bit hashes of the relevant state. They must be identical for identical
//! content within the process, so the hasher is seeded with a fixed value instead of a random one.

use foldhash::quality::FixedState;
use std::hash::{BuildHasher, Hash};

const HASH_SEED: u64 = 0x6a09_e667_f3bc_c908;

/// Hashes `value` with the fixed seed.
#[inline]
pub(crate) fn compute_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    FixedState::with_seed(HASH_SEED).hash_one(value)
}

/// Hashes `value` and folds it into `seed`.
#[inline]
pub(crate) fn append_hash<T: Hash + ?Sized>(value: &T, seed: u64) -> u64 {
    FixedState::with_seed(seed ^ HASH_SEED).hash_one(value)
}

#[cfg(test)]
mod tests {
    use super::{append_hash, compute_hash};

    #[test]
    fn stable_within_process() {
        assert_eq!(compute_hash(&(1u32, 2u64)), compute_hash(&(1u32, 2u64)));
        assert_ne!(compute_hash(&(1u32, 2u64)), compute_hash(&(2u32, 1u64)));
    }

    #[test]
    fn append_depends_on_seed() {
        let a = compute_hash(&1u32);
        let b = compute_hash(&2u32);

        assert_ne!(append_hash(&3u32, a), append_hash(&3u32, b));
    }
}
