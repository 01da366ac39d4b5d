use std::sync::Arc;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::deadpool::Pool;

use crate::upstream::openai::EmbeddingClient;

pub mod config;
pub mod error;
pub mod etl;
pub mod json;
pub mod models;
pub mod recommendation;
pub mod schema;
pub mod upstream;

/// Shared state handed to every recommendation handler.
#[derive(Clone)]
pub struct App {
    pub config: Arc<config::ServerConfig>,
    pub diesel: Pool<AsyncPgConnection>,
    pub embedder: Arc<EmbeddingClient>,
}
