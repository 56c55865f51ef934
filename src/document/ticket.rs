//! Totally ordered operation identifiers.

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::document::ActorId;

/// The largest delimiter value, used when a ticket must dominate every
/// other ticket sharing its lamport and actor.
pub const MAX_DELIMITER: u32 = u32::MAX;

/// A totally ordered identifier of a single operation.
///
/// Tickets order by lamport first, then actor, then delimiter. The total
/// order is what lets tombstone garbage collection pick a single horizon
/// across all actors without vector clocks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeTicket {
    lamport: u64,
    delimiter: u32,
    actor: ActorId,
}

impl TimeTicket {
    /// The ticket denoting "the beginning of time". Nothing sorts below
    /// it, so using it as a GC horizon retains everything.
    pub const INITIAL: TimeTicket = TimeTicket {
        lamport: 0,
        delimiter: 0,
        actor: ActorId::INITIAL,
    };

    /// Create a ticket.
    pub const fn new(lamport: u64, delimiter: u32, actor: ActorId) -> Self {
        TimeTicket {
            lamport,
            delimiter,
            actor,
        }
    }

    /// The lamport component.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// The delimiter component.
    pub fn delimiter(&self) -> u32 {
        self.delimiter
    }

    /// The actor component.
    pub fn actor(&self) -> ActorId {
        self.actor
    }
}

impl Ord for TimeTicket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.actor.cmp(&other.actor))
            .then_with(|| self.delimiter.cmp(&other.delimiter))
    }
}

impl PartialOrd for TimeTicket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.lamport, self.actor, self.delimiter)
    }
}

impl fmt::Debug for TimeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeTicket({self})")
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ticket(lamport: u64, delimiter: u32, actor_byte: u8) -> TimeTicket {
        TimeTicket::new(lamport, delimiter, ActorId::from_bytes([actor_byte; 12]))
    }

    #[test]
    fn lamport_dominates_actor_and_delimiter() {
        assert!(ticket(1, 9, 9) < ticket(2, 0, 0));
        assert!(ticket(3, 0, 1) < ticket(3, 9, 2));
        assert!(ticket(3, 1, 1) < ticket(3, 2, 1));
    }

    #[test]
    fn initial_is_minimal() {
        assert!(TimeTicket::INITIAL <= ticket(0, 0, 0));
        assert!(TimeTicket::INITIAL < ticket(0, 0, 1));
        assert!(TimeTicket::INITIAL < ticket(0, 1, 0));
    }

    proptest! {
        /// The order is total and antisymmetric over arbitrary tickets.
        #[test]
        fn order_is_total(
            (l1, d1, a1) in (0u64..100, 0u32..10, 0u8..4),
            (l2, d2, a2) in (0u64..100, 0u32..10, 0u8..4),
        ) {
            let t1 = ticket(l1, d1, a1);
            let t2 = ticket(l2, d2, a2);
            match t1.cmp(&t2) {
                std::cmp::Ordering::Equal => prop_assert_eq!(t1, t2),
                std::cmp::Ordering::Less => prop_assert!(t2 > t1),
                std::cmp::Ordering::Greater => prop_assert!(t2 < t1),
            }
        }
    }
}
