//! Canonical mutation ordering.
//!
//! Every node sorts an object's mutations with this comparator and nothing
//! else; convergence depends on all replicas computing the identical
//! total order. Two mutations are equal exactly when they share a
//! mutation id.

use plait_types::Mutation;
use std::cmp::Ordering;

/// Compare two mutations under the canonical total order.
///
/// Primary key is `created`; ties break on the originator's canonical
/// address string, then on the mutation id so the order stays total even
/// for distinct mutations stamped identically.
pub fn compare(a: &Mutation, b: &Mutation) -> Ordering {
    if a.mutation_id == b.mutation_id {
        return Ordering::Equal;
    }
    a.created
        .cmp(&b.created)
        .then_with(|| {
            a.originator
                .canonical_string()
                .cmp(&b.originator.canonical_string())
        })
        .then_with(|| a.mutation_id.cmp(&b.mutation_id))
}

/// True when `a` is ordered strictly before `b`.
pub fn precedes(a: &Mutation, b: &Mutation) -> bool {
    compare(a, b) == Ordering::Less
}
