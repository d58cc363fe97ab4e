use crate::{ModelError, Neighbor, SearchError};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Returns one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::EmptyResponse(self.name().to_string()))
    }
}

/// A read-only nearest-neighbour index over one document's chunk vectors.
/// Position `i` in the index is chunk `i`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend(&self) -> &'static str;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SearchError>;

    /// Drops any backend resources held for this index.
    async fn release(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelError>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, context: &[&str]) -> Result<String, ModelError>;
}
