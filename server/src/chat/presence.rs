//! Presence is derived from the connection registry: a user is online
//! while they hold at least one live connection.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::state::AppState;
use crate::ws::ConnectionRegistry;

pub trait PresenceOracle: Send + Sync {
    fn is_online(&self, user_id: &str) -> bool;
}

impl PresenceOracle for ConnectionRegistry {
    fn is_online(&self, user_id: &str) -> bool {
        ConnectionRegistry::is_online(self, user_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub user_id: String,
    pub online: bool,
    pub connections: usize,
}

/// GET /api/users/{user_id}/presence
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<PresenceResponse> {
    let connections = state.connections.connection_count(&user_id);
    Json(PresenceResponse {
        online: connections > 0,
        connections,
        user_id,
    })
}
