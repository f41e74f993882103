use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

use hubchat_server::chat::service::MessageService;
use hubchat_server::chat::store::{spawn_periodic_flush, MessageStore};
use hubchat_server::config::{generate_config_template, Config};
use hubchat_server::db::SqliteRepository;
use hubchat_server::friends::FriendDirectory;
use hubchat_server::{routes, state, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hubchat_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("hubchat server v{} starting", env!("CARGO_PKG_VERSION"));

    // Durable message store (SQLite) and in-memory view over it
    let repo = SqliteRepository::open(&config.data_dir)?;
    let store = Arc::new(MessageStore::open(Arc::new(repo), config.retry_policy())?);

    // Friend graph is owned elsewhere; we only read it
    let friends = FriendDirectory::load(&Path::new(&config.data_dir).join("friends.json"))?;

    let connections = ws::ConnectionRegistry::new();
    let service = MessageService::new(store.clone(), Arc::new(friends), connections.clone());

    let flush_handle = spawn_periodic_flush(store.clone(), config.flush_interval());

    let app_state = state::AppState {
        messages: Arc::new(service),
        connections,
        heartbeat: config.heartbeat(),
    };
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Final flush regardless of what the periodic task last managed
    flush_handle.abort();
    match store.sync_all().await {
        Ok(()) => tracing::info!("All messages flushed on shutdown"),
        Err(e) => tracing::error!(error = %e, "Shutdown flush failed"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
