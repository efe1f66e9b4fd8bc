//! Join-semilattice merge for replicated directory values
//!
//! Laws every implementation must satisfy:
//! - Commutative: `a ⊔ b = b ⊔ a`
//! - Associative: `(a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)`
//! - Idempotent: `a ⊔ a = a`
//!
//! Replicas converge by exchanging state and joining, in any order, any
//! number of times.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::identifiers::ReplicaId;

/// State that merges by least upper bound
pub trait JoinSemilattice: Clone {
    /// Least upper bound of `self` and `other`
    fn join(&self, other: &Self) -> Self;

    /// Join `other` into `self` in place
    fn join_assign(&mut self, other: &Self) {
        *self = self.join(other);
    }
}

/// Last-writer-wins register: a value plus the witness of the write that produced it.
///
/// The witness `(timestamp, writer)` is totally ordered, so `join` always has a
/// deterministic winner even when two writers race on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister<T> {
    value: T,
    timestamp: u64,
    writer: ReplicaId,
}

impl<T> LwwRegister<T> {
    /// Record a write of `value` by `writer` at `timestamp` (milliseconds)
    pub fn new(value: T, timestamp: u64, writer: ReplicaId) -> Self {
        Self {
            value,
            timestamp,
            writer,
        }
    }

    /// Current value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the register and return the value
    pub fn into_value(self) -> T {
        self.value
    }

    /// Timestamp of the winning write
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Writer of the winning write
    pub fn writer(&self) -> ReplicaId {
        self.writer
    }

    /// Compare write witnesses: timestamp first, writer id as tiebreak
    pub fn witness_cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.writer.cmp(&other.writer))
    }
}

impl<T: Clone> JoinSemilattice for LwwRegister<T> {
    fn join(&self, other: &Self) -> Self {
        // Equal witnesses denote the same write; keep the receiver.
        match self.witness_cmp(other) {
            Ordering::Less => other.clone(),
            Ordering::Equal | Ordering::Greater => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn writer(n: u128) -> ReplicaId {
        ReplicaId::new(Uuid::from_u128(n))
    }

    #[test]
    fn later_timestamp_wins() {
        let old = LwwRegister::new("old", 10, writer(9));
        let new = LwwRegister::new("new", 11, writer(1));
        assert_eq!(*old.join(&new).value(), "new");
        assert_eq!(*new.join(&old).value(), "new");
    }

    #[test]
    fn writer_breaks_timestamp_ties() {
        let a = LwwRegister::new("a", 10, writer(1));
        let b = LwwRegister::new("b", 10, writer(2));
        assert_eq!(*a.join(&b).value(), "b");
        assert_eq!(*b.join(&a).value(), "b");
    }

    #[test]
    fn join_assign_updates_in_place() {
        let mut a = LwwRegister::new(1, 5, writer(1));
        a.join_assign(&LwwRegister::new(2, 6, writer(1)));
        assert_eq!(*a.value(), 2);
        assert_eq!(a.timestamp(), 6);
    }

    fn arb_register() -> impl Strategy<Value = LwwRegister<u32>> {
        // Value is a function of the witness, as it is for real single writes.
        (0u64..8, 0u128..4).prop_map(|(ts, w)| LwwRegister::new((ts as u32) * 10 + w as u32, ts, writer(w)))
    }

    proptest! {
        #[test]
        fn join_is_commutative(a in arb_register(), b in arb_register()) {
            prop_assert_eq!(a.join(&b), b.join(&a));
        }

        #[test]
        fn join_is_associative(a in arb_register(), b in arb_register(), c in arb_register()) {
            prop_assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
        }

        #[test]
        fn join_is_idempotent(a in arb_register()) {
            prop_assert_eq!(a.join(&a), a);
        }
    }
}
