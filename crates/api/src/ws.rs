//! Websocket endpoint.
//!
//! One connection joins one channel. Two tasks run per connection: the
//! receive loop below (parsing and dispatching client frames) and a send
//! loop moving fanout traffic to the socket. They share nothing but the
//! subscription queue.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        ConnectInfo, Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use quillstream_common::{ActorId, AppError, AppResult};
use quillstream_realtime::keys;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Interval between liveness pings on an otherwise idle connection.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Connection query parameters.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Streaming API token for registered users.
    #[serde(rename = "i")]
    pub token: Option<String>,
}

/// Per-connection context cloned into each dispatched handler.
#[derive(Clone)]
pub struct ConnContext {
    pub state: AppState,
    pub channel_id: i64,
    pub actor: ActorId,
    pub user_name: Option<String>,
    /// Connection-private fanout key.
    pub ws_key: String,
    pub is_author: bool,
}

/// Build the websocket router.
pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{channel_id}", get(ws_handler))
}

/// Resolve the connection's actor: API token first, stable address hash
/// otherwise. Anonymous addresses are registered for later audit.
async fn resolve_actor(
    state: &AppState,
    token: Option<&str>,
    addr: &SocketAddr,
) -> AppResult<(ActorId, Option<String>)> {
    if let Some(token) = token
        && let Some(user) = state.users.find_by_api_token(token).await?
    {
        return Ok((ActorId::registered(user.id), Some(user.name)));
    }
    let hash = state.addresses.register(&addr.ip().to_string()).await?;
    Ok((ActorId::anonymous(hash), None))
}

/// Websocket upgrade handler for `/ws/{channel_id}`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel_id): Path<i64>,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let (actor, user_name) = match resolve_actor(&state, query.token.as_deref(), &addr).await {
        Ok(resolved) => resolved,
        Err(e) => return e.into_response(),
    };

    match state.guard.may_join(&actor, channel_id).await {
        Ok(true) => {}
        Ok(false) => {
            return AppError::Forbidden("channel is private".to_string()).into_response();
        }
        Err(e) => return e.into_response(),
    }

    let is_author = match state.guard.is_author(&actor, channel_id).await {
        Ok(is_author) => is_author,
        Err(e) => return e.into_response(),
    };

    info!(channel_id, actor = %actor.as_key(), "Streaming connection accepted");
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state, channel_id, actor, user_name, is_author)
    })
    .into_response()
}

/// Drive one accepted connection.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    channel_id: i64,
    actor: ActorId,
    user_name: Option<String>,
    is_author: bool,
) {
    let ws_key = keys::connection(&state.id_gen.generate_token());
    let mut subscription = state.fanout.subscribe(
        vec![
            keys::room(channel_id),
            ws_key.clone(),
            keys::identity(&actor),
        ],
        None,
    );

    let (mut sink, mut stream) = socket.split();

    // Send loop: a dedicated task moving fanout traffic to the socket. It
    // owns the subscription; every exit path drops it, which deregisters
    // the queue from all three keys.
    let send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                delivered = subscription.recv() => {
                    let Some((_, message)) = delivered else { break };
                    let Ok(text) = serde_json::to_string(&message) else { continue };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let ctx = ConnContext {
        state: state.clone(),
        channel_id,
        actor,
        user_name,
        ws_key,
        is_author,
    };

    // Receive loop: parse, look up the dispatch table, run the handler.
    // A rejected operation is logged; the connection's other operations
    // are unaffected.
    while let Some(incoming) = stream.next().await {
        let message = match incoming {
            Ok(message) => message,
            Err(e) => {
                debug!(channel_id, error = %e, "Websocket receive error");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let Ok(frame) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                let Some(tag) = frame.get("type").and_then(serde_json::Value::as_str) else {
                    continue;
                };
                let tag = tag.to_string();
                match state.dispatcher.dispatch(ctx.clone(), &tag, frame) {
                    Some(handler) => {
                        if let Err(e) = handler.await {
                            warn!(channel_id, tag, error = %e, "Frame handler rejected");
                        }
                    }
                    None => debug!(channel_id, tag, "Unknown frame type ignored"),
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    info!(channel_id, "Streaming connection closed");
}
