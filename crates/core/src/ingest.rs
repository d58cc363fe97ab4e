use crate::{DocumentError, DocumentKind, FetchedDocument};
use chrono::Utc;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// Resolves document references to local files, downloading remote ones.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
    download_dir: PathBuf,
}

impl DocumentFetcher {
    pub fn new(client: Client, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
        }
    }

    pub async fn fetch(&self, reference: &str) -> Result<FetchedDocument, DocumentError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(DocumentError::InvalidReference(
                "document reference is empty".to_string(),
            ));
        }

        if let Some(path) = self.local_candidate(reference).await {
            let kind = kind_from_path(&path)?;
            let checksum = digest_file(&path).await?;
            debug!(path = %path.display(), %kind, "using local document");
            return Ok(FetchedDocument {
                reference: reference.to_string(),
                path,
                kind,
                checksum,
                downloaded: false,
                fetched_at: Utc::now(),
            });
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            return self.download(reference).await;
        }

        Err(DocumentError::NotFound(
            self.download_dir.join(reference).display().to_string(),
        ))
    }

    async fn local_candidate(&self, reference: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(reference);
        let candidates = if direct.is_absolute() {
            vec![direct]
        } else {
            vec![self.download_dir.join(&direct), direct]
        };

        for candidate in candidates {
            if tokio::fs::metadata(&candidate)
                .await
                .is_ok_and(|metadata| metadata.is_file())
            {
                return Some(candidate);
            }
        }
        None
    }

    async fn download(&self, reference: &str) -> Result<FetchedDocument, DocumentError> {
        let url = Url::parse(reference)
            .map_err(|error| DocumentError::InvalidReference(format!("{reference}: {error}")))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                DocumentError::InvalidReference(format!("url has no file name: {reference}"))
            })?
            .to_string();
        let kind = kind_from_path(Path::new(&file_name))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DocumentError::Download {
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self
            .download_dir
            .join(format!("{}-{}", Uuid::new_v4(), file_name));
        tokio::fs::write(&path, &bytes).await?;

        let checksum = digest_bytes(&bytes);
        info!(
            path = %path.display(),
            bytes = bytes.len(),
            %kind,
            "downloaded document"
        );

        Ok(FetchedDocument {
            reference: reference.to_string(),
            path,
            kind,
            checksum,
            downloaded: true,
            fetched_at: Utc::now(),
        })
    }
}

fn kind_from_path(path: &Path) -> Result<DocumentKind, DocumentError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    DocumentKind::from_extension(extension)
        .ok_or_else(|| DocumentError::UnsupportedFormat(extension.to_ascii_lowercase()))
}

pub async fn digest_file(path: &Path) -> Result<String, DocumentError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(digest_bytes(&bytes))
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
