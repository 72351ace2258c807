//! WebSocket feed + REST endpoints for the inbox.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::view::ConversationView;
use crate::api::ApiError;
use crate::gateway::{Contact, Conversation, Message};
use crate::notify::{Notification, Notifier};

/// Shared state for inbox routes.
#[derive(Clone)]
pub struct InboxRouteState {
    pub view: Arc<ConversationView>,
    pub notifier: Notifier,
}

/// Build the inbox WebSocket and REST routes.
pub fn inbox_routes(state: InboxRouteState) -> Router {
    Router::new()
        .route("/ws/inbox", get(ws_handler))
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{id}/select", post(select_conversation))
        .route("/api/inbox/messages", get(get_timeline).post(send_message))
        .with_state(state)
}

// ── REST Endpoints ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ConversationsQuery {
    /// Case-insensitive contact-name filter.
    #[serde(default)]
    q: String,
    /// Re-fetch from the backend before filtering.
    #[serde(default)]
    refresh: bool,
}

/// GET /api/conversations?q=<name>&refresh=true
async fn list_conversations(
    State(state): State<InboxRouteState>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    if query.refresh {
        state.view.load_conversations().await?;
    }
    Ok(Json(state.view.conversations(&query.q).await))
}

#[derive(Serialize)]
struct TimelineResponse {
    conversation_id: Option<Uuid>,
    contact: Option<Contact>,
    messages: Vec<Message>,
    draft: String,
}

async fn timeline_response(view: &ConversationView) -> TimelineResponse {
    TimelineResponse {
        conversation_id: view.selected().await,
        contact: view.selected_contact().await,
        messages: view.timeline().await,
        draft: view.draft().await,
    }
}

/// POST /api/conversations/{id}/select
async fn select_conversation(
    State(state): State<InboxRouteState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.view.select(id).await?;
    Ok(Json(timeline_response(&state.view).await))
}

/// GET /api/inbox/messages
async fn get_timeline(State(state): State<InboxRouteState>) -> impl IntoResponse {
    Json(timeline_response(&state.view).await)
}

#[derive(Deserialize)]
struct SendRequest {
    content: String,
}

/// POST /api/inbox/messages
async fn send_message(
    State(state): State<InboxRouteState>,
    Json(body): Json<SendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.view.send_text(body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// ── WebSocket ───────────────────────────────────────────────────────────

/// Frames pushed to clients that are not timeline events.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsFrame {
    Sync {
        conversation_id: Option<Uuid>,
        messages: Vec<Message>,
    },
    Notification {
        notification: Notification,
    },
}

/// Actions a client may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum InboxAction {
    Select { conversation_id: Uuid },
    Draft { content: String },
    Send { content: String },
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<InboxRouteState>) -> impl IntoResponse {
    info!("Inbox WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, frame: &T) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode WS frame");
            true
        }
    }
}

async fn sync_frame(view: &ConversationView) -> WsFrame {
    WsFrame::Sync {
        conversation_id: view.selected().await,
        messages: view.timeline().await,
    }
}

async fn handle_socket(mut socket: WebSocket, state: InboxRouteState) {
    info!("Inbox WebSocket client connected");

    // Subscribe before the initial sync so nothing falls in between.
    let mut events = state.view.subscribe_events();
    let mut notifications = state.notifier.subscribe();

    if !send_json(&mut socket, &sync_frame(&state.view).await).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = events.recv() => {
                match result {
                    Ok(event) => {
                        if !send_json(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Inbox WS client lagged behind events");
                        if !send_json(&mut socket, &sync_frame(&state.view).await).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Inbox event channel closed");
                        break;
                    }
                }
            }

            result = notifications.recv() => {
                match result {
                    Ok(notification) => {
                        if !send_json(&mut socket, &WsFrame::Notification { notification }).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(missed = n, "Inbox WS client skipped notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_message(&text, &state.view).await;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if socket.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Inbox WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Inbox WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Inbox WebSocket connection closed");
}

/// Failures are already logged and notified by the view.
async fn handle_client_message(text: &str, view: &ConversationView) {
    match serde_json::from_str::<InboxAction>(text) {
        Ok(InboxAction::Select { conversation_id }) => {
            if let Err(e) = view.select(conversation_id).await {
                warn!(conversation_id = %conversation_id, error = %e, "Select via WS failed");
            }
        }
        Ok(InboxAction::Draft { content }) => view.set_draft(content).await,
        Ok(InboxAction::Send { content }) => {
            if let Err(e) = view.send_text(content).await {
                warn!(error = %e, "Send via WS failed");
            }
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}
