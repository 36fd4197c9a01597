//! `posledger-events`: committed-change notifications and their live fan-out.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod hub;
pub mod scope;
pub mod watermark;

pub use bus::Notifier;
pub use envelope::{PushEnvelope, PushEventType};
pub use event::{ChangeEvent, ChangeKind, EntityKind};
pub use hub::{ChangeHub, HubStats, PullSessionGuard, PushSubscription};
pub use scope::{GroupName, Scope, Topic};
pub use watermark::Watermark;
