//! Dashboard pull stream (SSE).
//!
//! Each session emits `connected`, an initial `dashboard_update`, then polls
//! the hub counter for its scope every poll interval and recomputes only when
//! the counter moved. A `: heartbeat` comment goes out on its own timer so a
//! slow recompute never delays it.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

use posledger_auth::{authorize, authorize_branch, AuthzError, Caller, Operation};
use posledger_core::BranchId;
use posledger_events::Scope;
use posledger_infra::projections::{compute_snapshot, DashboardSnapshot};

use crate::app::dto::DashboardParams;
use crate::app::errors;
use crate::app::routes::common::query;
use crate::app::services::{AppServices, SharedStore};
use crate::config::DashboardSettings;
use crate::context::CallerContext;

type SseSender = mpsc::Sender<Result<SseEvent, Infallible>>;

const SESSION_BUFFER: usize = 16;

pub fn router() -> Router {
    Router::new().route("/dashboard/stream", get(stream_dashboard))
}

/// GET /dashboard/stream[?branch_id=]
pub async fn stream_dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    params: Result<Query<DashboardParams>, QueryRejection>,
) -> Response {
    let params = match query(params) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let scope = match dashboard_scope(ctx.caller(), params.branch_id) {
        Ok(scope) => scope,
        Err(e) => return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
    };

    let (tx, rx) = mpsc::channel(SESSION_BUFFER);
    tokio::spawn(pull_session(services, scope, tx));

    Sse::new(ReceiverStream::new(rx)).into_response()
}

/// Scope of a dashboard session.
///
/// Global staff see everything unless they pick a branch; branch managers
/// see their own branch; everyone else is refused.
pub fn dashboard_scope(caller: &Caller, requested: Option<BranchId>) -> Result<Scope, AuthzError> {
    let decision = authorize(caller, Operation::ViewDashboard)?;
    if let Some(branch) = requested {
        authorize_branch(caller, Operation::ViewDashboard, branch)?;
        return Ok(Scope::Branch(branch));
    }
    Ok(Scope::from_branch_filter(decision.branch_filter()))
}

/// A recompute in flight, tagged with the counter value read before it started.
struct Recompute {
    observed: u64,
    handle: JoinHandle<Result<DashboardSnapshot, String>>,
}

impl Recompute {
    fn start(store: &SharedStore, scope: Scope, observed: u64, settings: DashboardSettings) -> Self {
        let store = Arc::clone(store);
        let handle = tokio::spawn(async move {
            match timeout(
                settings.snapshot_timeout,
                compute_snapshot(store.as_ref(), scope, Utc::now()),
            )
            .await
            {
                Ok(Ok(snapshot)) => Ok(snapshot),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "snapshot took longer than {:?}",
                    settings.snapshot_timeout
                )),
            }
        });
        Self { observed, handle }
    }
}

async fn finished(
    recompute: &mut Option<Recompute>,
) -> Result<Result<DashboardSnapshot, String>, tokio::task::JoinError> {
    match recompute {
        Some(r) => (&mut r.handle).await,
        None => std::future::pending().await,
    }
}

async fn pull_session(services: Arc<AppServices>, scope: Scope, tx: SseSender) {
    let _guard = services.hub.track_pull_session();
    let settings = services.dashboard;
    let shutdown = services.hub.shutdown_token();
    tracing::info!(scope = %scope, "dashboard session opened");

    let connected = SseEvent::default()
        .event("connected")
        .data(json!({ "scope": scope.to_string() }).to_string());
    if tx.send(Ok(connected)).await.is_err() {
        return;
    }

    let mut watermark = services.hub.watermark(scope);
    let mut recompute = Some(Recompute::start(
        &services.store,
        scope,
        watermark.seen(),
        settings,
    ));

    let mut poll = interval(settings.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    poll.tick().await;
    let mut heartbeat = interval(settings.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tx.closed() => break,

            _ = heartbeat.tick() => {
                if tx.send(Ok(SseEvent::default().comment("heartbeat"))).await.is_err() {
                    break;
                }
            }

            _ = poll.tick(), if recompute.is_none() => {
                if let Some(observed) = watermark.pending(services.hub.version(scope)) {
                    recompute = Some(Recompute::start(&services.store, scope, observed, settings));
                }
            }

            joined = finished(&mut recompute) => {
                let observed = recompute.take().map(|r| r.observed).unwrap_or_default();
                match joined {
                    Ok(Ok(snapshot)) => {
                        let Some(event) = update_event(&snapshot) else {
                            continue;
                        };
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                        watermark.advance(observed);
                    }
                    // The watermark stays put, so the next tick tries again.
                    Ok(Err(reason)) => {
                        tracing::warn!(scope = %scope, %reason, "dashboard recompute failed");
                    }
                    Err(e) => {
                        tracing::warn!(scope = %scope, error = %e, "dashboard recompute task failed");
                    }
                }
            }
        }
    }

    if let Some(r) = recompute.take() {
        r.handle.abort();
    }
    tracing::info!(scope = %scope, "dashboard session closed");
}

fn update_event(snapshot: &DashboardSnapshot) -> Option<SseEvent> {
    match serde_json::to_string(snapshot) {
        Ok(data) => Some(SseEvent::default().event("dashboard_update").data(data)),
        Err(e) => {
            tracing::warn!(error = %e, "cannot encode dashboard snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posledger_auth::Role;
    use posledger_core::UserId;

    fn caller(role: Role, branch: Option<i64>) -> Caller {
        Caller::new(UserId::new(1), role, branch.map(BranchId::new))
    }

    #[test]
    fn global_staff_default_to_the_whole_business() {
        let admin = caller(Role::Admin, None);
        assert_eq!(dashboard_scope(&admin, None).unwrap(), Scope::Global);
        assert_eq!(
            dashboard_scope(&admin, Some(BranchId::new(2))).unwrap(),
            Scope::Branch(BranchId::new(2))
        );
    }

    #[test]
    fn managers_are_pinned_to_their_branch() {
        let manager = caller(Role::BranchManager, Some(4));
        assert_eq!(
            dashboard_scope(&manager, None).unwrap(),
            Scope::Branch(BranchId::new(4))
        );
        assert!(matches!(
            dashboard_scope(&manager, Some(BranchId::new(5))),
            Err(AuthzError::BranchMismatch { .. })
        ));
    }

    #[test]
    fn floor_staff_have_no_dashboard() {
        for role in [Role::Counter, Role::Waiter, Role::Kitchen] {
            assert!(dashboard_scope(&caller(role, Some(1)), None).is_err());
        }
    }
}
