pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{segment, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{DocumentError, ModelError, PipelineError, SearchError};
pub use extractor::{extract_text, extract_text_blocking, DocxExtractor, LopdfExtractor, TextExtractor};
pub use generation::{build_prompt, FallbackGenerator};
pub use ingest::{digest_file, DocumentFetcher};
pub use models::{
    AnswerBatch, Chunk, DocumentKind, FetchedDocument, IndexBackend, Neighbor, PipelineOptions,
    QdrantOptions,
};
pub use orchestrator::{failure_answer, PreparedDocument, RetrievalOrchestrator, TIMEOUT_ANSWER};
pub use providers::{OpenAiChatModel, OpenAiClient, OpenAiEmbedder};
pub use store::build_index;
pub use stores::{FlatIndex, QdrantIndex};
pub use traits::{AnswerGenerator, ChatModel, Embedder, VectorIndex};
