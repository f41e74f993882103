use std::sync::Arc;

use crate::chat::service::MessageService;
use crate::ws::actor::Heartbeat;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Message lifecycle and queries
    pub messages: Arc<MessageService>,
    /// Active WebSocket connections per user
    pub connections: ConnectionRegistry,
    /// Ping/pong timing for every WebSocket session
    pub heartbeat: Heartbeat,
}
