//! Per-session change watermark for poll-style observers.

use crate::Scope;

/// Last hub counter value a pull session has rendered for its scope.
///
/// Counters only grow, so "changed" is simply "the counter moved past what we
/// saw". Extra bumps only cause an extra recompute, never a missed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    scope: Scope,
    seen: u64,
}

impl Watermark {
    pub fn at(scope: Scope, seen: u64) -> Self {
        Self { scope, seen }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// The counter value to refresh up to, if anything changed.
    pub fn pending(&self, current: u64) -> Option<u64> {
        (current > self.seen).then_some(current)
    }

    /// Record that everything up to `observed` has been rendered.
    pub fn advance(&mut self, observed: u64) {
        self.seen = self.seen.max(observed);
    }
}
