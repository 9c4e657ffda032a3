// =============================================================================
// WebSocket Handler — per-topic subscribe-then-stream
// =============================================================================
//
// Clients connect to `/api/v1/ws[?topics=hotlist,listings,health]` and, for
// each subscribed topic, immediately receive a snapshot followed by updates
// as they occur (spec §6 "on subscribe, immediately deliver current state
// snapshot for the topic; then deliver updates as they occur"). Clients may
// adjust their subscription set after connecting by sending
// `{"action":"subscribe"|"unsubscribe","topic":"..."}` text frames.
//
// Every outbound frame uses the envelope `{type, data, timestamp}` with
// `type` one of `hotlist | listing | health | error | connection |
// subscribed | unsubscribed`, matching the teacher's push-loop-plus-recv-loop
// `tokio::select!` shape in spirit, generalized from one full-state push to
// one push per topic.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Topic {
    Hotlist,
    Listings,
    Health,
}

impl Topic {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "hotlist" => Some(Self::Hotlist),
            "listings" => Some(Self::Listings),
            "health" => Some(Self::Health),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Hotlist => "hotlist",
            Self::Listings => "listings",
            Self::Health => "health",
        }
    }
}

#[derive(Deserialize)]
pub struct WsQuery {
    topics: Option<String>,
}

fn requested_topics(query: &WsQuery) -> Vec<Topic> {
    match &query.topics {
        Some(raw) => {
            let parsed: Vec<Topic> = raw.split(',').filter_map(Topic::parse).collect();
            if parsed.is_empty() {
                default_topics()
            } else {
                parsed
            }
        }
        None => default_topics(),
    }
}

fn default_topics() -> Vec<Topic> {
    vec![Topic::Hotlist, Topic::Listings, Topic::Health]
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: T,
    timestamp: i64,
}

fn envelope<T: Serialize>(kind: &'static str, data: T) -> Message {
    let env = Envelope {
        kind,
        data,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    Message::Text(serde_json::to_string(&env).unwrap_or_default().into())
}

#[derive(Deserialize)]
struct ClientAction {
    action: String,
    topic: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(orch): State<Arc<Orchestrator>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let topics = requested_topics(&query);
    ws.on_upgrade(move |socket| handle_connection(socket, orch, topics))
        .into_response()
}

async fn handle_connection(socket: WebSocket, orch: Arc<Orchestrator>, mut topics: Vec<Topic>) {
    let (mut sender, mut receiver) = socket.split();

    if sender
        .send(envelope(
            "connection",
            serde_json::json!({ "status": "connected", "topics": topics.iter().map(|t| t.as_str()).collect::<Vec<_>>() }),
        ))
        .await
        .is_err()
    {
        return;
    }

    let mut hotlist_rx = orch.subscribe_hotlist();
    let mut listings_rx = orch.subscribe_listings();
    let mut health_rx = orch.subscribe_health();

    if topics.contains(&Topic::Hotlist) {
        let snapshot = hotlist_rx.borrow().clone();
        if sender.send(envelope("hotlist", snapshot)).await.is_err() {
            return;
        }
    }
    if topics.contains(&Topic::Health) {
        let snapshot = health_rx.borrow().clone();
        if sender.send(envelope("health", snapshot)).await.is_err() {
            return;
        }
    }
    // Listings has no meaningful "current" snapshot beyond the last event
    // (or none yet); only emit on subscribe if one has actually occurred.
    if topics.contains(&Topic::Listings) {
        if let Some(event) = listings_rx.borrow().clone() {
            if sender.send(envelope("listing", event)).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            changed = hotlist_rx.changed() => {
                if changed.is_err() { break; }
                if topics.contains(&Topic::Hotlist) {
                    let snapshot = hotlist_rx.borrow().clone();
                    if sender.send(envelope("hotlist", snapshot)).await.is_err() { break; }
                }
            }
            changed = listings_rx.changed() => {
                if changed.is_err() { break; }
                if topics.contains(&Topic::Listings) {
                    if let Some(event) = listings_rx.borrow().clone() {
                        if sender.send(envelope("listing", event)).await.is_err() { break; }
                    }
                }
            }
            changed = health_rx.changed() => {
                if changed.is_err() { break; }
                if topics.contains(&Topic::Health) {
                    let snapshot = health_rx.borrow().clone();
                    if sender.send(envelope("health", snapshot)).await.is_err() { break; }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientAction>(&text) {
                            Ok(action) => {
                                let Some(topic) = Topic::parse(&action.topic) else {
                                    let _ = sender.send(envelope("error", serde_json::json!({
                                        "message": format!("unknown topic: '{}'", action.topic),
                                    }))).await;
                                    continue;
                                };
                                match action.action.as_str() {
                                    "subscribe" => {
                                        if !topics.contains(&topic) {
                                            topics.push(topic);
                                        }
                                        let _ = sender.send(envelope("subscribed", serde_json::json!({ "topic": topic.as_str() }))).await;
                                    }
                                    "unsubscribe" => {
                                        topics.retain(|t| *t != topic);
                                        let _ = sender.send(envelope("unsubscribed", serde_json::json!({ "topic": topic.as_str() }))).await;
                                    }
                                    other => {
                                        let _ = sender.send(envelope("error", serde_json::json!({
                                            "message": format!("unknown action: '{other}'"),
                                        }))).await;
                                    }
                                }
                            }
                            Err(_) => {
                                debug!(msg = %text, "ignoring non-action text frame (heartbeat)");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() { break; }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket close frame received");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("WebSocket connection closed");
}
