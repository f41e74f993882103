use axum::{
    routing::{get, post, put},
    Json, Router,
};

use crate::chat::{messages, presence};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /health
async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "messages": state.messages.store().len(),
        "pendingWrites": state.messages.store().pending_writes(),
        "onlineUsers": state.connections.online_users().len(),
    }))
}

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    let message_routes = Router::new()
        .route("/api/messages", post(messages::create_message))
        .route(
            "/api/messages/{message_id}/read",
            put(messages::mark_message_read),
        );

    let user_routes = Router::new()
        .route(
            "/api/users/{user_id}/messages",
            get(messages::get_user_messages),
        )
        .route(
            "/api/users/{user_id}/unread-count",
            get(messages::get_total_unread_count),
        )
        .route("/api/users/{user_id}/chats", get(messages::get_chats))
        .route(
            "/api/users/{user_id}/presence",
            get(presence::get_presence),
        );

    let conversation_routes = Router::new()
        .route(
            "/api/conversations/{user_id}/{friend_id}",
            get(messages::get_conversation),
        )
        .route(
            "/api/conversations/{user_id}/{friend_id}/read",
            put(messages::mark_conversation_read),
        )
        .route(
            "/api/conversations/{user_id}/{friend_id}/unread-count",
            get(messages::get_unread_count),
        );

    Router::new()
        .route("/health", get(health))
        .route("/ws/{user_id}", get(ws_handler::ws_upgrade))
        .merge(message_routes)
        .merge(user_routes)
        .merge(conversation_routes)
        .with_state(state)
}
