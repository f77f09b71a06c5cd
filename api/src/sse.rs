use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use async_stream::stream;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use axon_mcp_runtime::McpServer;

const MESSAGE_CHANNEL_CAPACITY: usize = 64;

type SessionMap = Arc<Mutex<HashMap<Uuid, mpsc::Sender<Value>>>>;

/// SSE stream transport state: the shared dispatch core plus the registry of
/// live sessions. Session entries are the only mutable state and are scoped
/// to their connection.
#[derive(Clone)]
struct SseState {
    server: Arc<McpServer>,
    sessions: SessionMap,
}

/// The stream-over-HTTP transport: the peer opens `GET /sse` for
/// server-initiated events and posts inbound messages to the advertised
/// endpoint.
pub fn router(server: Arc<McpServer>) -> Router {
    let state = SseState {
        server,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };
    Router::new()
        .route("/sse", get(open_stream))
        .route("/messages", post(post_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Uuid,
}

/// Open a session. The first event tells the peer where to post messages;
/// subsequent `message` events carry correlated JSON-RPC responses.
async fn open_stream(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::now_v7();
    let (tx, mut rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
    lock_sessions(&state.sessions).insert(session_id, tx);

    tracing::info!(%session_id, "sse session opened");

    let stream = stream! {
        yield Ok(Event::default()
            .event("endpoint")
            .data(format!("/messages?session_id={session_id}")));
        while let Some(message) = rx.recv().await {
            yield Ok(Event::default().event("message").data(message.to_string()));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Accept one JSON-RPC message (or batch) for a session. Dispatch runs in
/// its own task; responses travel over the session's event stream.
async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": {
                        "code": -32700,
                        "message": "Parse error"
                    }
                })),
            )
                .into_response();
        }
    };

    let Some(tx) = lock_sessions(&state.sessions).get(&query.session_id).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let server = state.server.clone();
    let sessions = state.sessions.clone();
    let session_id = query.session_id;
    tokio::spawn(async move {
        let responses = server.handle_incoming_message(incoming).await;
        for response in responses {
            if tx.send(response).await.is_err() {
                // Receiver gone: the stream closed, drop the session.
                tracing::info!(%session_id, "sse session closed");
                lock_sessions(&sessions).remove(&session_id);
                return;
            }
        }
    });

    StatusCode::ACCEPTED.into_response()
}

fn lock_sessions(sessions: &SessionMap) -> std::sync::MutexGuard<'_, HashMap<Uuid, mpsc::Sender<Value>>> {
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
