use crate::stores::{FlatIndex, QdrantIndex};
use crate::traits::VectorIndex;
use crate::{IndexBackend, SearchError};
use reqwest::Client;
use tracing::warn;

/// Builds the index for one document on the configured backend.
///
/// A remote backend that cannot be built is replaced by the in-process
/// [`FlatIndex`]; the decision is made here once, never per query.
pub async fn build_index(
    backend: &IndexBackend,
    client: &Client,
    vectors: Vec<Vec<f32>>,
) -> Result<Box<dyn VectorIndex>, SearchError> {
    match backend {
        IndexBackend::Flat => Ok(Box::new(FlatIndex::build(vectors)?)),
        IndexBackend::Qdrant(options) => {
            match QdrantIndex::build(client.clone(), options, &vectors).await {
                Ok(index) => Ok(Box::new(index)),
                Err(error @ (SearchError::EmptyInput | SearchError::DimensionMismatch { .. })) => {
                    Err(error)
                }
                Err(error) => {
                    warn!(
                        endpoint = %options.endpoint,
                        error = %error,
                        "qdrant unavailable, using in-process flat index"
                    );
                    Ok(Box::new(FlatIndex::build(vectors)?))
                }
            }
        }
    }
}
