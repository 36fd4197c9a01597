//! Live push feeds over WebSocket.
//!
//! `GET /ws/kitchen/` serves `kitchen_orders`, `GET /ws/orders/` serves
//! `orders`. The JWT travels as `?token=` since browsers cannot set headers
//! on a WebSocket handshake. Sockets without a usable token stay open but
//! join no group.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    http::{HeaderMap, Uri},
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};

use posledger_auth::{evaluate, AccessDecision, Caller, Operation};
use posledger_events::{ChangeHub, GroupName, Scope, Topic};

use crate::app::services::AppServices;
use crate::middleware::AuthState;

pub fn router() -> Router {
    Router::new()
        .route("/ws/kitchen/", get(kitchen_feed))
        .route("/ws/orders/", get(orders_feed))
}

pub async fn kitchen_feed(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthState>,
    headers: HeaderMap,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    open_feed(Topic::KitchenOrders, &services, &auth, &headers, &uri, ws)
}

pub async fn orders_feed(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthState>,
    headers: HeaderMap,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    open_feed(Topic::Orders, &services, &auth, &headers, &uri, ws)
}

fn open_feed(
    topic: Topic,
    services: &AppServices,
    auth: &AuthState,
    headers: &HeaderMap,
    uri: &Uri,
    ws: WebSocketUpgrade,
) -> Response {
    let caller = auth.resolve(headers, uri).unwrap_or_else(|status| {
        tracing::debug!(topic = topic.as_str(), %status, "push feed token rejected; joining no group");
        None
    });
    let groups = feed_groups(topic, caller.as_ref());
    let hub = services.hub.clone();
    ws.on_upgrade(move |socket| push_session(socket, hub, topic, groups))
}

/// Groups a caller joins on `topic`: everything for global staff, their own
/// branch for branch staff, nothing otherwise.
pub fn feed_groups(topic: Topic, caller: Option<&Caller>) -> Vec<GroupName> {
    let Some(caller) = caller else {
        return Vec::new();
    };
    match evaluate(caller, Operation::SubscribeFeed) {
        AccessDecision::AllowAll => vec![GroupName::new(topic, Scope::Global)],
        AccessDecision::AllowOwnBranch(branch) => {
            vec![GroupName::new(topic, Scope::Branch(branch))]
        }
        AccessDecision::Deny => Vec::new(),
    }
}

async fn push_session(socket: WebSocket, hub: ChangeHub, topic: Topic, groups: Vec<GroupName>) {
    let (mut sink, mut stream) = socket.split();
    let shutdown = hub.shutdown_token();

    // Leaves every group when dropped, however this function returns.
    let mut subscription = hub.subscribe(&groups);
    let listening = !groups.is_empty();
    let session = subscription.session();
    tracing::info!(session = %session, topic = topic.as_str(), groups = groups.len(), "push session opened");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            envelope = subscription.recv(), if listening => {
                let Some(envelope) = envelope else {
                    break;
                };
                let text = match envelope.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(session = %session, error = %e, "cannot encode push envelope");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames carry nothing for us.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    drop(subscription);
    tracing::info!(session = %session, topic = topic.as_str(), "push session closed");
}
