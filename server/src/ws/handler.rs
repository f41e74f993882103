use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws/{user_id}
/// WebSocket upgrade endpoint. Identity comes from the path; credential
/// checks belong to the surrounding application.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::info!(user_id = %user_id, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id))
}

/// Hand the upgraded socket to its actor.
async fn handle_connection(socket: WebSocket, state: AppState, user_id: String) {
    actor::run_connection(socket, state, user_id).await;
}
