use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => f.write_str("pdf"),
            Self::Docx => f.write_str("docx"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedDocument {
    pub reference: String,
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub checksum: String,
    pub downloaded: bool,
    pub fetched_at: DateTime<Utc>,
}

/// A window of the document text. `start` and `end` are character offsets, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// One search hit: the position of a stored vector and its squared Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerBatch {
    pub answers: Vec<String>,
    pub timed_out: bool,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdrantOptions {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub collection_prefix: String,
}

impl Default for QdrantOptions {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6333".to_string(),
            api_key: None,
            collection_prefix: "policy-chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndexBackend {
    #[default]
    Flat,
    Qdrant(QdrantOptions),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub answer_deadline: Duration,
    pub index_backend: IndexBackend,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 160,
            top_k: 3,
            answer_deadline: Duration::from_secs(25),
            index_backend: IndexBackend::Flat,
        }
    }
}
