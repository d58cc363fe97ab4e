use clap::{Parser, ValueEnum};
use policy_rag_core::providers::openai::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL};
use policy_rag_core::{IndexBackend, PipelineOptions, QdrantOptions};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingBackend {
    /// OpenAI-compatible embeddings endpoint.
    Openai,
    /// Offline character trigram hashing.
    Ngram,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "policy-rag-server", version)]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Bearer token callers must present
    #[arg(long, env = "API_BEARER_TOKEN", hide_env_values = true)]
    pub api_bearer_token: Option<String>,

    /// Credential for the embedding and chat API
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Embedding backend
    #[arg(long, env = "EMBEDDING_BACKEND", value_enum, default_value_t = EmbeddingBackend::Openai)]
    pub embedding_backend: EmbeddingBackend,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Chat models, tried in order while a model is unavailable
    #[arg(long, env = "CHAT_MODELS", value_delimiter = ',', default_value = "gpt-4,gpt-3.5-turbo")]
    pub chat_models: Vec<String>,

    /// Completion token limit per answer
    #[arg(long, default_value = "300")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value = "0.2")]
    pub temperature: f32,

    /// Directory for downloaded documents and relative references
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Characters per chunk
    #[arg(long, default_value = "800")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value = "160")]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, default_value = "3")]
    pub top_k: usize,

    /// Deadline in seconds for answering all questions of a request
    #[arg(long, env = "ANSWER_TIMEOUT_SECS", default_value = "25")]
    pub answer_timeout_secs: u64,

    /// Use a Qdrant collection instead of the in-process index
    #[arg(long, env = "USE_QDRANT", default_value_t = false)]
    pub use_qdrant: bool,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    pub qdrant_api_key: Option<String>,

    /// Prefix for per-request Qdrant collections
    #[arg(long, default_value = "policy-chunks")]
    pub qdrant_collection_prefix: String,
}

/// Settings for the embedding and chat backends.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub chat_models: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub bearer_token: Option<String>,
    pub download_dir: PathBuf,
    pub models: ModelSettings,
    pub pipeline: PipelineOptions,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<ServiceConfig> {
        let bind: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|error| anyhow::anyhow!("invalid host/port {}:{}: {error}", self.host, self.port))?;

        let index_backend = if self.use_qdrant {
            IndexBackend::Qdrant(QdrantOptions {
                endpoint: self.qdrant_url,
                api_key: non_empty(self.qdrant_api_key),
                collection_prefix: self.qdrant_collection_prefix,
            })
        } else {
            IndexBackend::Flat
        };

        Ok(ServiceConfig {
            bind,
            bearer_token: non_empty(self.api_bearer_token),
            download_dir: self.download_dir,
            models: ModelSettings {
                api_key: non_empty(self.openai_api_key),
                base_url: self.openai_base_url,
                embedding_backend: self.embedding_backend,
                embedding_model: self.embedding_model,
                chat_models: self
                    .chat_models
                    .into_iter()
                    .map(|model| model.trim().to_string())
                    .filter(|model| !model.is_empty())
                    .collect(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            pipeline: PipelineOptions {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
                top_k: self.top_k,
                answer_deadline: Duration::from_secs(self.answer_timeout_secs),
                index_backend,
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|inner| inner.trim().to_string())
        .filter(|inner| !inner.is_empty())
}
