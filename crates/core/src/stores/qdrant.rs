use crate::stores::flat::compare_neighbors;
use crate::traits::VectorIndex;
use crate::{Neighbor, QdrantOptions, SearchError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

const BACKEND: &str = "qdrant";
const UPSERT_BATCH: usize = 256;

/// Remote index living in a Qdrant collection created for a single request.
pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    api_key: Option<String>,
    client: Client,
    vector_size: usize,
    len: usize,
}

impl QdrantIndex {
    pub async fn build(
        client: Client,
        options: &QdrantOptions,
        vectors: &[Vec<f32>],
    ) -> Result<Self, SearchError> {
        let vector_size = vectors.first().map(Vec::len).ok_or(SearchError::EmptyInput)?;
        if let Some(mismatch) = vectors.iter().find(|vector| vector.len() != vector_size) {
            return Err(SearchError::DimensionMismatch {
                expected: vector_size,
                found: mismatch.len(),
            });
        }

        let index = Self {
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            collection: format!("{}-{}", options.collection_prefix, Uuid::new_v4()),
            api_key: options.api_key.clone(),
            client,
            vector_size,
            len: vectors.len(),
        };

        index.ensure_collection().await?;
        if let Err(error) = index.upsert(vectors).await {
            if let Err(cleanup) = index.release().await {
                warn!(
                    collection = %index.collection,
                    error = %cleanup,
                    "failed to drop partially populated collection"
                );
            }
            return Err(error);
        }

        debug!(
            collection = %index.collection,
            points = index.len,
            dimension = vector_size,
            "qdrant collection populated"
        );
        Ok(index)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn ensure_collection(&self) -> Result<(), SearchError> {
        let response = self
            .authorized(
                self.client
                    .put(format!("{}/collections/{}", self.endpoint, self.collection)),
            )
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Euclid",
                }
            }))
            .send()
            .await?;

        check_status(response).await.map(|_| ())
    }

    async fn upsert(&self, vectors: &[Vec<f32>]) -> Result<(), SearchError> {
        for (batch_number, batch) in vectors.chunks(UPSERT_BATCH).enumerate() {
            let offset = batch_number * UPSERT_BATCH;
            let points = batch
                .iter()
                .enumerate()
                .map(|(position, vector)| {
                    json!({
                        "id": offset + position,
                        "vector": vector,
                    })
                })
                .collect::<Vec<_>>();

            let response = self
                .authorized(self.client.put(format!(
                    "{}/collections/{}/points?wait=true",
                    self.endpoint, self.collection
                )))
                .json(&json!({ "points": points }))
                .send()
                .await?;

            check_status(response).await?;
        }

        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, SearchError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    })
}

fn parse_hits(parsed: &Value) -> Result<Vec<Neighbor>, SearchError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search response has no result array".to_string(),
        })?;

    let mut result = Vec::with_capacity(hits.len());
    for hit in hits {
        let index = hit
            .pointer("/id")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("hit without numeric id: {hit}"),
            })?;
        // Qdrant reports the plain Euclidean distance as the score.
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;

        result.push(Neighbor {
            index: index as usize,
            distance: score * score,
        });
    }

    result.sort_by(compare_neighbors);
    Ok(result)
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn dimension(&self) -> usize {
        self.vector_size
    }

    fn len(&self) -> usize {
        self.len
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SearchError> {
        if query.len() != self.vector_size {
            return Err(SearchError::DimensionMismatch {
                expected: self.vector_size,
                found: query.len(),
            });
        }

        let limit = k.min(self.len);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .authorized(self.client.post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            )))
            .json(&json!({
                "vector": query,
                "limit": limit,
                "with_payload": false,
            }))
            .send()
            .await?;

        let parsed: Value = check_status(response).await?.json().await?;
        let mut hits = parse_hits(&parsed)?;
        hits.truncate(limit);
        Ok(hits)
    }

    async fn release(&self) -> Result<(), SearchError> {
        let response = self
            .authorized(
                self.client
                    .delete(format!("{}/collections/{}", self.endpoint, self.collection)),
            )
            .send()
            .await?;

        check_status(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(server: &MockServer) -> QdrantOptions {
        QdrantOptions {
            endpoint: server.uri(),
            api_key: Some("secret".to_string()),
            collection_prefix: "test".to_string(),
        }
    }

    #[test]
    fn hits_are_squared_and_tie_broken_by_id() {
        let parsed = json!({
            "result": [
                { "id": 4, "score": 2.0 },
                { "id": 1, "score": 2.0 },
                { "id": 7, "score": 0.5 }
            ]
        });

        let hits = parse_hits(&parsed).unwrap();
        let order: Vec<usize> = hits.iter().map(|hit| hit.index).collect();
        assert_eq!(order, vec![7, 1, 4]);
        assert_eq!(hits[0].distance, 0.25);
        assert_eq!(hits[1].distance, 4.0);
    }

    #[test]
    fn missing_result_array_is_a_backend_error() {
        let parsed = json!({ "status": "error" });
        assert!(matches!(
            parse_hits(&parsed),
            Err(SearchError::BackendResponse { .. })
        ));
    }

    #[tokio::test]
    async fn build_search_and_release_round_trip() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path_regex(r"^/collections/test-[0-9a-f-]+$"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/collections/test-[0-9a-f-]+/points$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": {} })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/collections/test-[0-9a-f-]+/points/search$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [ { "id": 1, "score": 0.0 }, { "id": 0, "score": 1.0 } ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/collections/test-[0-9a-f-]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
            .expect(1)
            .mount(&server)
            .await;

        let vectors = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let index = QdrantIndex::build(Client::new(), &options(&server), &vectors)
            .await
            .expect("qdrant build");

        assert!(index.collection().starts_with("test-"));
        assert_eq!(index.len(), 2);

        let hits = index.search(&[1.0, 1.0], 5).await.expect("search");
        assert_eq!(hits[0].index, 1);
        assert_eq!(hits[1].index, 0);

        assert!(matches!(
            index.search(&[1.0], 1).await,
            Err(SearchError::DimensionMismatch { .. })
        ));

        index.release().await.expect("release");
    }

    #[tokio::test]
    async fn failed_collection_creation_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let result = QdrantIndex::build(Client::new(), &options(&server), &[vec![1.0]]).await;
        assert!(matches!(result, Err(SearchError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn failed_upsert_keeps_its_error_when_cleanup_also_fails() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/collections/test-[0-9a-f-]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/collections/test-[0-9a-f-]+/points$"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad points"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("cleanup broke"))
            .expect(1)
            .mount(&server)
            .await;

        let result = QdrantIndex::build(Client::new(), &options(&server), &[vec![1.0]]).await;
        match result {
            Err(SearchError::BackendResponse { details, .. }) => {
                assert!(details.contains("bad points"), "{details}");
            }
            other => panic!("expected upsert failure, got {:?}", other.map(|index| index.len())),
        }
    }
}
