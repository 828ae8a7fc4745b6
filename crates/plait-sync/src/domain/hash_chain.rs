//! Rolling state-hash chain.
//!
//! Each integrated mutation advances a 32-bit fingerprint carried forward
//! from the previous one, so two replicas can compare converged history by
//! exchanging a single integer instead of full state. The combiner is a
//! cheap shift-add fold, order-sensitive so that the same mutations
//! integrated in different orders yield different hashes. It is not a
//! security mechanism.

use plait_types::StateHash;

/// Fingerprint of one mutation id: `h = 31·h + unit` over the id's UTF-16
/// code units, wrapping at 32 bits.
pub fn fingerprint(mutation_id: &str) -> StateHash {
    let mut hash: StateHash = 0;
    for unit in mutation_id.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(StateHash::from(unit));
    }
    hash
}

/// Advance the chain past one mutation: `31·previous + fingerprint(id)`,
/// wrapping at 32 bits. An object with no integrated mutations starts the
/// chain at zero.
pub fn advance(previous: StateHash, mutation_id: &str) -> StateHash {
    (previous << 5)
        .wrapping_sub(previous)
        .wrapping_add(fingerprint(mutation_id))
}
