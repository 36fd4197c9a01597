//! Process-wide change hub.
//!
//! Holds the push broadcast groups and the per-scope change counters that
//! pull sessions compare their watermarks against. Created once when the
//! gateways start and shut down with the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use posledger_core::{BranchId, SessionId};

use crate::{ChangeEvent, GroupName, Notifier, PushEnvelope, Scope, Topic, Watermark};

const DEFAULT_MEMBER_BUFFER: usize = 64;

type Members = HashMap<SessionId, mpsc::Sender<PushEnvelope>>;

#[derive(Debug)]
struct HubInner {
    groups: DashMap<GroupName, Members>,
    global_counter: AtomicU64,
    branch_counters: DashMap<BranchId, u64>,
    push_sessions: AtomicUsize,
    pull_sessions: AtomicUsize,
    delivered: AtomicU64,
    dropped: AtomicU64,
    member_buffer: usize,
    shutdown: CancellationToken,
}

/// Snapshot of hub activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub push_sessions: usize,
    pub pull_sessions: usize,
    pub groups: usize,
    pub global_version: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// Broadcast groups + change counters. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    inner: Arc<HubInner>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(DEFAULT_MEMBER_BUFFER)
    }
}

impl ChangeHub {
    /// `member_buffer` bounds how many envelopes may queue per push session
    /// before further ones are dropped for that session.
    pub fn new(member_buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                groups: DashMap::new(),
                global_counter: AtomicU64::new(0),
                branch_counters: DashMap::new(),
                push_sessions: AtomicUsize::new(0),
                pull_sessions: AtomicUsize::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                member_buffer: member_buffer.max(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Join `groups` as a new push session.
    ///
    /// The returned subscription leaves every group when dropped, whether the
    /// session ended cleanly or not. An empty `groups` yields a session that
    /// receives nothing.
    pub fn subscribe(&self, groups: &[GroupName]) -> PushSubscription {
        let session = SessionId::new();
        let (tx, rx) = mpsc::channel(self.inner.member_buffer);

        if !self.is_shut_down() {
            for group in groups {
                self.inner
                    .groups
                    .entry(*group)
                    .or_default()
                    .insert(session, tx.clone());
            }
        }
        self.inner.push_sessions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = %session, groups = groups.len(), "push session joined");

        PushSubscription {
            session,
            receiver: rx,
            membership: Membership {
                hub: Arc::clone(&self.inner),
                session,
                groups: groups.to_vec(),
            },
        }
    }

    /// Register a live pull session for the lifetime of the guard.
    pub fn track_pull_session(&self) -> PullSessionGuard {
        self.inner.pull_sessions.fetch_add(1, Ordering::Relaxed);
        PullSessionGuard {
            hub: Arc::clone(&self.inner),
        }
    }

    /// Current change counter for `scope`.
    pub fn version(&self, scope: Scope) -> u64 {
        match scope {
            Scope::Global => self.inner.global_counter.load(Ordering::Acquire),
            Scope::Branch(b) => self.inner.branch_counters.get(&b).map(|v| *v).unwrap_or(0),
        }
    }

    /// A watermark positioned at the current counter of `scope`.
    pub fn watermark(&self, scope: Scope) -> Watermark {
        Watermark::at(scope, self.version(scope))
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            push_sessions: self.inner.push_sessions.load(Ordering::Relaxed),
            pull_sessions: self.inner.pull_sessions.load(Ordering::Relaxed),
            groups: self.inner.groups.len(),
            global_version: self.version(Scope::Global),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Token cancelled on shutdown; sessions select on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Close every session and forget all groups.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.groups.clear();
        tracing::info!("change hub shut down");
    }

    fn bump(&self, branch: BranchId) {
        *self.inner.branch_counters.entry(branch).or_insert(0) += 1;
        self.inner.global_counter.fetch_add(1, Ordering::AcqRel);
    }

    fn deliver(&self, group: GroupName, envelope: &PushEnvelope) {
        let Some(members) = self.inner.groups.get(&group) else {
            return;
        };
        for (session, tx) in members.iter() {
            match tx.try_send(envelope.clone()) {
                Ok(()) => {
                    self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        session = %session,
                        group = %group,
                        invoice_id = %envelope.invoice_id,
                        "push session is not keeping up; dropping notification"
                    );
                }
                // Session is going away; its membership guard removes it.
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
}

impl Notifier for ChangeHub {
    fn notify(&self, change: &ChangeEvent) {
        if self.is_shut_down() {
            tracing::debug!(invoice_id = %change.invoice_id, "hub is shut down; change not fanned out");
            return;
        }

        self.bump(change.branch_id);

        let envelope = PushEnvelope::from(change);
        for topic in Topic::ALL {
            self.deliver(GroupName::new(topic, Scope::Global), &envelope);
            self.deliver(GroupName::new(topic, Scope::Branch(change.branch_id)), &envelope);
        }
    }
}

/// Group membership of one push session. Leaves all groups on drop.
#[derive(Debug)]
struct Membership {
    hub: Arc<HubInner>,
    session: SessionId,
    groups: Vec<GroupName>,
}

impl Drop for Membership {
    fn drop(&mut self) {
        for group in &self.groups {
            if let Some(mut members) = self.hub.groups.get_mut(group) {
                members.remove(&self.session);
            }
            self.hub.groups.remove_if(group, |_, members| members.is_empty());
        }
        self.hub.push_sessions.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(session = %self.session, "push session left");
    }
}

/// Receiving end of a push session.
#[derive(Debug)]
pub struct PushSubscription {
    session: SessionId,
    receiver: mpsc::Receiver<PushEnvelope>,
    membership: Membership,
}

impl PushSubscription {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn groups(&self) -> &[GroupName] {
        &self.membership.groups
    }

    /// Next envelope; `None` once the hub has dropped this session (shutdown)
    /// or the session belongs to no group.
    pub async fn recv(&mut self) -> Option<PushEnvelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PushEnvelope> {
        self.receiver.try_recv().ok()
    }
}

/// Keeps a pull session counted while alive.
#[derive(Debug)]
pub struct PullSessionGuard {
    hub: Arc<HubInner>,
}

impl Drop for PullSessionGuard {
    fn drop(&mut self) {
        self.hub.pull_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeKind, EntityKind, PushEventType};
    use chrono::Utc;
    use posledger_core::InvoiceId;
    use posledger_invoicing::PaymentStatus;

    fn branch(id: i64) -> BranchId {
        BranchId::new(id)
    }

    fn change(invoice: i64, branch_id: i64, entity: EntityKind, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            entity,
            change: kind,
            invoice_id: InvoiceId::new(invoice),
            branch_id: branch(branch_id),
            status: Some(PaymentStatus::Unpaid),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn fans_out_to_global_and_matching_branch_groups() {
        let hub = ChangeHub::default();
        let mut global = hub.subscribe(&[GroupName::new(Topic::KitchenOrders, Scope::Global)]);
        let mut b1 = hub.subscribe(&[GroupName::new(Topic::Orders, Scope::Branch(branch(1)))]);
        let mut b2 = hub.subscribe(&[GroupName::new(Topic::Orders, Scope::Branch(branch(2)))]);

        hub.notify(&change(10, 1, EntityKind::Invoice, ChangeKind::Created));

        let seen = global.try_recv().unwrap();
        assert_eq!(seen.event_type, PushEventType::InvoiceCreated);
        assert_eq!(seen.invoice_id, InvoiceId::new(10));
        assert!(b1.try_recv().is_some());
        assert!(b2.try_recv().is_none());
        assert!(global.try_recv().is_none());
    }

    #[test]
    fn a_session_in_two_groups_gets_one_copy_per_group() {
        let hub = ChangeHub::default();
        let mut both = hub.subscribe(&[
            GroupName::new(Topic::KitchenOrders, Scope::Global),
            GroupName::new(Topic::Orders, Scope::Global),
        ]);
        hub.notify(&change(1, 1, EntityKind::Payment, ChangeKind::Created));
        assert!(both.try_recv().is_some());
        assert!(both.try_recv().is_some());
        assert!(both.try_recv().is_none());
    }

    #[test]
    fn counters_are_per_scope_and_monotonic() {
        let hub = ChangeHub::default();
        hub.notify(&change(1, 1, EntityKind::Invoice, ChangeKind::Created));
        hub.notify(&change(1, 1, EntityKind::Payment, ChangeKind::Created));
        hub.notify(&change(2, 2, EntityKind::Invoice, ChangeKind::Created));

        assert_eq!(hub.version(Scope::Branch(branch(1))), 2);
        assert_eq!(hub.version(Scope::Branch(branch(2))), 1);
        assert_eq!(hub.version(Scope::Branch(branch(3))), 0);
        assert_eq!(hub.version(Scope::Global), 3);

        let w = hub.watermark(Scope::Branch(branch(1)));
        hub.notify(&change(2, 2, EntityKind::Payment, ChangeKind::Created));
        assert_eq!(w.pending(hub.version(w.scope())), None);
        hub.notify(&change(1, 1, EntityKind::InvoiceItem, ChangeKind::Deleted));
        assert_eq!(w.pending(hub.version(w.scope())), Some(3));
    }

    #[test]
    fn dropping_a_subscription_leaves_every_group() {
        let hub = ChangeHub::default();
        let sub = hub.subscribe(&[
            GroupName::new(Topic::KitchenOrders, Scope::Global),
            GroupName::new(Topic::Orders, Scope::Branch(branch(1))),
        ]);
        assert_eq!(hub.stats().groups, 2);
        assert_eq!(hub.stats().push_sessions, 1);

        drop(sub);
        let stats = hub.stats();
        assert_eq!(stats.groups, 0);
        assert_eq!(stats.push_sessions, 0);

        hub.notify(&change(1, 1, EntityKind::Invoice, ChangeKind::Created));
        assert_eq!(hub.stats().delivered, 0);
    }

    #[test]
    fn slow_sessions_drop_instead_of_blocking() {
        let hub = ChangeHub::new(1);
        let mut slow = hub.subscribe(&[GroupName::new(Topic::Orders, Scope::Global)]);
        for i in 0..3 {
            hub.notify(&change(i, 1, EntityKind::Payment, ChangeKind::Created));
        }
        let stats = hub.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(slow.try_recv().map(|e| e.invoice_id), Some(InvoiceId::new(0)));
    }

    #[test]
    fn anonymous_sessions_receive_nothing() {
        let hub = ChangeHub::default();
        let mut anon = hub.subscribe(&[]);
        hub.notify(&change(1, 1, EntityKind::Invoice, ChangeKind::Created));
        assert!(anon.try_recv().is_none());
        assert!(anon.groups().is_empty());
    }

    #[test]
    fn pull_sessions_are_counted_while_guarded() {
        let hub = ChangeHub::default();
        let guard = hub.track_pull_session();
        assert_eq!(hub.stats().pull_sessions, 1);
        drop(guard);
        assert_eq!(hub.stats().pull_sessions, 0);
    }

    #[tokio::test]
    async fn shutdown_closes_push_sessions() {
        let hub = ChangeHub::default();
        let mut sub = hub.subscribe(&[GroupName::new(Topic::Orders, Scope::Global)]);
        let token = hub.shutdown_token();

        hub.shutdown();

        assert!(token.is_cancelled());
        assert_eq!(sub.recv().await, None);
        assert_eq!(hub.stats().groups, 0);

        hub.notify(&change(1, 1, EntityKind::Invoice, ChangeKind::Created));
        assert_eq!(hub.version(Scope::Global), 0);
    }
}
