//! Aggregate root trait and optimistic concurrency expectations.

/// Aggregate root marker + minimal interface.
///
/// An aggregate owns a consistency boundary: everything it owns is committed
/// together or not at all (an invoice owns its items and payments).
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing row version.
    ///
    /// Bumped by the store on every committed update; used to detect
    /// concurrent writers.
    fn version(&self) -> u64;
}

/// Row version a writer read and expects to still be current at commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectedVersion(pub u64);

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_must_match_exactly() {
        assert!(ExpectedVersion(3).matches(3));
        assert!(!ExpectedVersion(3).matches(4));
    }
}
