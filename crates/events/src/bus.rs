//! Change notification seam between the ledger engine and live observers.
//!
//! The engine calls [`Notifier::notify`] once per committed operation, after
//! the commit. A notifier is a fan-out, not a store:
//!
//! - **Never fails the write**: `notify` returns nothing; delivery problems
//!   stay inside the notifier
//! - **Best-effort**: disconnected observers miss changes; pull observers
//!   catch up by recomputing
//! - **Non-blocking**: must not wait on slow consumers while the caller holds
//!   a request open

use std::sync::Arc;

use crate::ChangeEvent;

/// Receives committed ledger changes.
pub trait Notifier: Send + Sync {
    fn notify(&self, change: &ChangeEvent);
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, change: &ChangeEvent) {
        (**self).notify(change)
    }
}
