use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, routing::get};
use chrono::Utc;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::deadpool::Pool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use giftreco::config::ServerConfig;
use giftreco::upstream::openai::EmbeddingClient;
use giftreco::{App, recommendation};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(ServerConfig::new_from_env());

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
    let diesel = Pool::builder(manager)
        .build()
        .expect("failed to build database pool");

    let embedder = Arc::new(EmbeddingClient::new(&config.openai));

    let listen_port = config.listen_port;
    let app = App {
        config,
        diesel,
        embedder,
    };

    let router = Router::new()
        .route("/health", get(health))
        .merge(recommendation::route())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app);

    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    tracing::info!(%addr, "reco service listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, router).await.expect("server error");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "reco",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
