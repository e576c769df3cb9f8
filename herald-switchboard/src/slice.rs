//! Deterministic keyspace partitioning.
//!
//! Runner processes drain one logical queue in parallel without any
//! shared locking: each is configured with `(slice, num_slices)` and only
//! claims keys whose slice matches. The hash uses fixed seeds so every
//! process computes the same partition.

use ahash::RandomState;

use crate::types::ItemKey;

// Fixed seeds: the partition must agree across processes.
const SEEDS: (u64, u64, u64, u64) = (
    0x6865_7261_6c64_0001,
    0x7377_6974_6368_0002,
    0x626f_6172_6400_0003,
    0x736c_6963_6572_0004,
);

/// Map a key to its slice in `[0, num_slices)`.
///
/// Total and deterministic: for a fixed `num_slices`, every key maps to
/// exactly one slice. `num_slices` of zero or one puts everything in
/// slice 0.
#[must_use]
pub fn slice_of(key: &ItemKey, num_slices: usize) -> usize {
    if num_slices <= 1 {
        return 0;
    }
    let state = RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3);
    let hash = state.hash_one(key.ulid().0);
    usize::try_from(hash % num_slices as u64).unwrap_or_default()
}

/// Whether `key` belongs to the given slice.
#[must_use]
pub fn in_slice(key: &ItemKey, slice: usize, num_slices: usize) -> bool {
    slice_of(key, num_slices) == slice
}
