use axum::routing::get;
use axum::Router;
use eightball_server::config::ServerConfig;
use eightball_server::lobby::{run_lobby, LobbyCommand};
use eightball_server::ws::{health_handler, ws_handler, AppState};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();
    let outbound_capacity = config.outbound_capacity;

    let (lobby_tx, lobby_rx) = mpsc::channel::<LobbyCommand>(config.lobby_channel_capacity);

    // Spawn lobby
    let self_tx = lobby_tx.clone();
    tokio::spawn(async move {
        run_lobby(lobby_rx, self_tx, config).await;
    });

    // Axum app
    let app_state = AppState {
        lobby_tx,
        outbound_capacity,
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("Starting 8-ball server on {}", listen_addr);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
