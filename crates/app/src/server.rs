use crate::config::{EmbeddingBackend, ModelSettings, ServiceConfig};
use crate::error::ApiError;
use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use policy_rag_core::{
    extract_text_blocking, CharacterNgramEmbedder, ChatModel, DocumentFetcher, Embedder,
    FallbackGenerator, OpenAiChatModel, OpenAiClient, OpenAiEmbedder, RetrievalOrchestrator,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub documents: String,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub answers: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    bearer_token: Option<Arc<str>>,
    fetcher: DocumentFetcher,
    orchestrator: Option<Arc<RetrievalOrchestrator>>,
}

impl AppState {
    /// `orchestrator` is `None` when the server has no model credential; such
    /// a server still authenticates callers but cannot answer.
    pub fn new(
        bearer_token: Option<String>,
        fetcher: DocumentFetcher,
        orchestrator: Option<Arc<RetrievalOrchestrator>>,
    ) -> Self {
        Self {
            bearer_token: bearer_token.map(Arc::from),
            fetcher,
            orchestrator,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let fetcher = DocumentFetcher::new(client.clone(), &config.download_dir);

        let orchestrator = match &config.models.api_key {
            Some(api_key) => {
                let openai = OpenAiClient::new(client.clone(), &config.models.base_url, api_key)?;
                let embedder = build_embedder(&config.models, &openai);
                let generator = build_generator(&config.models, &openai)?;
                let orchestrator = RetrievalOrchestrator::new(
                    embedder,
                    Arc::new(generator),
                    config.pipeline.clone(),
                    client,
                )
                .context("invalid pipeline options")?;
                Some(Arc::new(orchestrator))
            }
            None => {
                warn!("OPENAI_API_KEY is not set; question requests will fail");
                None
            }
        };

        if config.bearer_token.is_none() {
            warn!("API_BEARER_TOKEN is not set; every request will be rejected");
        }

        Ok(Self::new(config.bearer_token.clone(), fetcher, orchestrator))
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthenticated)?;

        let expected = self.bearer_token.as_deref().ok_or(ApiError::Forbidden)?;
        if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

fn build_embedder(models: &ModelSettings, openai: &OpenAiClient) -> Arc<dyn Embedder> {
    match models.embedding_backend {
        EmbeddingBackend::Openai => Arc::new(OpenAiEmbedder::new(
            openai.clone(),
            models.embedding_model.clone(),
        )),
        EmbeddingBackend::Ngram => Arc::new(CharacterNgramEmbedder::default()),
    }
}

fn build_generator(
    models: &ModelSettings,
    openai: &OpenAiClient,
) -> anyhow::Result<FallbackGenerator> {
    let chain = models
        .chat_models
        .iter()
        .map(|model| {
            Arc::new(
                OpenAiChatModel::new(openai.clone(), model.clone())
                    .with_max_tokens(models.max_tokens)
                    .with_temperature(models.temperature),
            ) as Arc<dyn ChatModel>
        })
        .collect();

    Ok(FallbackGenerator::new(chain)?)
}

pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/hackrx/run", post(run_questions))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("policy-rag-server listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state.authorize(request.headers())?;
    Ok(next.run(request).await)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "policy-rag" }))
}

async fn run_questions(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let orchestrator = state
        .orchestrator
        .as_ref()
        .ok_or(ApiError::MissingCredential)?;

    if request.questions.is_empty() {
        return Ok(Json(RunResponse {
            answers: Vec::new(),
        }));
    }

    let document = state.fetcher.fetch(&request.documents).await?;
    info!(
        reference = %document.reference,
        kind = %document.kind,
        checksum = %document.checksum,
        questions = request.questions.len(),
        "processing document"
    );

    let extracted = extract_text_blocking(document.path.clone(), document.kind).await;
    if document.downloaded {
        if let Err(error) = tokio::fs::remove_file(&document.path).await {
            warn!(path = %document.path.display(), error = %error, "failed to remove download");
        }
    }

    let batch = orchestrator.run(&extracted?, &request.questions).await?;
    if batch.timed_out {
        warn!(
            questions = request.questions.len(),
            "answer deadline elapsed; returning placeholder answers"
        );
    }

    Ok(Json(RunResponse {
        answers: batch.answers,
    }))
}
