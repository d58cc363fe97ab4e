pub mod config;
pub mod error;
pub mod server;

pub use config::{Cli, EmbeddingBackend, ModelSettings, ServiceConfig};
pub use error::ApiError;
pub use server::{app_router, run_server, AppState, RunRequest, RunResponse};
