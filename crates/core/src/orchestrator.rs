use crate::chunking::{segment, ChunkingConfig};
use crate::store::build_index;
use crate::traits::{AnswerGenerator, Embedder, VectorIndex};
use crate::{AnswerBatch, Chunk, ModelError, PipelineError, PipelineOptions};
use futures::future::join_all;
use reqwest::Client;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const TIMEOUT_ANSWER: &str = "Request timed out";

pub fn failure_answer(error: impl Display) -> String {
    format!("Could not generate answer due to error: {error}")
}

/// Chunks and index for one document. Read-only once built.
///
/// The index is released by [`PreparedDocument::release`]. A document dropped
/// without it, e.g. when the request future is cancelled, hands the release to
/// a background task on the current runtime.
pub struct PreparedDocument {
    chunks: Vec<Chunk>,
    index: Arc<dyn VectorIndex>,
    released: bool,
}

impl PreparedDocument {
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub async fn release(mut self) {
        release_index(self.index.as_ref()).await;
        self.released = true;
    }
}

impl Drop for PreparedDocument {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let index = Arc::clone(&self.index);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { release_index(index.as_ref()).await });
            }
            Err(_) => warn!(
                backend = index.backend(),
                "no runtime to release dropped index"
            ),
        }
    }
}

async fn release_index(index: &dyn VectorIndex) {
    if let Err(error) = index.release().await {
        warn!(backend = index.backend(), error = %error, "failed to release index");
    }
}

pub struct RetrievalOrchestrator {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn AnswerGenerator>,
    options: PipelineOptions,
    chunking: ChunkingConfig,
    client: Client,
}

impl RetrievalOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn AnswerGenerator>,
        options: PipelineOptions,
        client: Client,
    ) -> Result<Self, PipelineError> {
        let chunking = ChunkingConfig::from(&options);
        chunking.validate()?;

        Ok(Self {
            embedder,
            generator,
            options,
            chunking,
            client,
        })
    }

    /// Segments the text, embeds every chunk and builds the index.
    pub async fn prepare(&self, text: &str) -> Result<PreparedDocument, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let chunks = segment(text, self.chunking)?;
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::Embedding(ModelError::EmbeddingCount {
                backend: self.embedder.name().to_string(),
                expected: chunks.len(),
                found: vectors.len(),
            }));
        }

        let index = build_index(&self.options.index_backend, &self.client, vectors).await?;
        info!(
            chunks = chunks.len(),
            dimension = index.dimension(),
            backend = index.backend(),
            "document indexed"
        );

        Ok(PreparedDocument {
            chunks,
            index: Arc::from(index),
            released: false,
        })
    }

    /// Answers every question against a prepared document. Slots keep question
    /// order; a blown deadline replaces every slot with [`TIMEOUT_ANSWER`].
    pub async fn answer_all(&self, document: &PreparedDocument, questions: &[String]) -> AnswerBatch {
        let started = Instant::now();
        let pending = questions
            .iter()
            .enumerate()
            .map(|(position, question)| self.answer_one(document, position, question));

        match tokio::time::timeout(self.options.answer_deadline, join_all(pending)).await {
            Ok(results) => {
                let mut failed = 0;
                let answers: Vec<String> = results
                    .into_iter()
                    .map(|result| {
                        result.unwrap_or_else(|error| {
                            failed += 1;
                            failure_answer(error)
                        })
                    })
                    .collect();
                info!(
                    questions = questions.len(),
                    failed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "answers generated"
                );
                AnswerBatch {
                    answers,
                    timed_out: false,
                    failed,
                }
            }
            Err(_) => {
                warn!(
                    questions = questions.len(),
                    deadline_ms = self.options.answer_deadline.as_millis() as u64,
                    "answer deadline elapsed"
                );
                AnswerBatch {
                    answers: vec![TIMEOUT_ANSWER.to_string(); questions.len()],
                    timed_out: true,
                    failed: questions.len(),
                }
            }
        }
    }

    async fn answer_one(
        &self,
        document: &PreparedDocument,
        position: usize,
        question: &str,
    ) -> Result<String, PipelineError> {
        let query = self.embedder.embed(question).await?;
        let neighbors = document.index().search(&query, self.options.top_k).await?;
        let context: Vec<&str> = neighbors
            .iter()
            .filter_map(|neighbor| document.chunks().get(neighbor.index))
            .map(|chunk| chunk.text.as_str())
            .collect();

        debug!(
            question = position,
            chunks = ?neighbors.iter().map(|neighbor| neighbor.index).collect::<Vec<_>>(),
            "context selected"
        );

        let answer = self.generator.generate(question, &context).await?;
        Ok(answer)
    }

    /// Full pass over one document's text.
    pub async fn run(&self, text: &str, questions: &[String]) -> Result<AnswerBatch, PipelineError> {
        let document = self.prepare(text).await?;
        let batch = self.answer_all(&document, questions).await;
        document.release().await;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::{Neighbor, SearchError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingGenerator {
        contexts: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, question: &str, context: &[&str]) -> Result<String, ModelError> {
            self.contexts.lock().unwrap().push((
                question.to_string(),
                context.iter().map(|text| text.to_string()).collect(),
            ));
            if question.contains("fail") {
                return Err(ModelError::BackendResponse {
                    backend: "openai".to_string(),
                    status: 500,
                    details: "boom".to_string(),
                });
            }
            Ok(format!("answer to {question}"))
        }
    }

    struct SlowGenerator {
        delay: Duration,
    }

    #[async_trait]
    impl AnswerGenerator for SlowGenerator {
        async fn generate(&self, question: &str, _context: &[&str]) -> Result<String, ModelError> {
            tokio::time::sleep(self.delay).await;
            Ok(question.to_string())
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn name(&self) -> &str {
            "short"
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0]).collect())
        }
    }

    const POLICY: &str = "Grace period: a grace period of thirty days is allowed for premium payment. \
        Waiting period: pre-existing diseases are covered after thirty-six months of continuous coverage. \
        Maternity: maternity expenses are covered after twenty-four months. \
        Cataract: cataract surgery has a waiting period of two years.";

    fn options(deadline: Duration) -> PipelineOptions {
        PipelineOptions {
            chunk_size: 80,
            chunk_overlap: 10,
            top_k: 2,
            answer_deadline: deadline,
            ..PipelineOptions::default()
        }
    }

    fn orchestrator(generator: Arc<dyn AnswerGenerator>, deadline: Duration) -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(
            Arc::new(CharacterNgramEmbedder::default()),
            generator,
            options(deadline),
            Client::new(),
        )
        .expect("valid options")
    }

    fn questions(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn invalid_chunking_is_rejected_at_construction() {
        let result = RetrievalOrchestrator::new(
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(RecordingGenerator::default()),
            PipelineOptions {
                chunk_size: 10,
                chunk_overlap: 10,
                ..PipelineOptions::default()
            },
            Client::new(),
        );
        assert!(matches!(result, Err(PipelineError::InvalidChunkConfig(_))));
    }

    #[tokio::test]
    async fn empty_text_is_an_empty_document() {
        let orchestrator = orchestrator(Arc::new(RecordingGenerator::default()), Duration::from_secs(5));
        let result = orchestrator.run("", &questions(&["anything"])).await;
        assert!(matches!(result, Err(PipelineError::EmptyDocument)));
    }

    #[tokio::test]
    async fn whitespace_only_text_is_an_empty_document() {
        let generator = Arc::new(RecordingGenerator::default());
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(CharacterNgramEmbedder::default()),
            generator.clone(),
            PipelineOptions {
                chunk_size: 4,
                chunk_overlap: 1,
                ..PipelineOptions::default()
            },
            Client::new(),
        )
        .expect("valid options");

        let result = orchestrator
            .run("\n\n   \n\t\n", &questions(&["grace period?"]))
            .await;
        assert!(matches!(result, Err(PipelineError::EmptyDocument)));
        assert!(generator.contexts.lock().unwrap().is_empty());
    }

    #[derive(Default)]
    struct CountingIndex {
        releases: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for CountingIndex {
        fn backend(&self) -> &'static str {
            "counting"
        }

        fn dimension(&self) -> usize {
            1
        }

        fn len(&self) -> usize {
            0
        }

        async fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<Neighbor>, SearchError> {
            Ok(Vec::new())
        }

        async fn release(&self) -> Result<(), SearchError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn prepared(index: Arc<CountingIndex>) -> PreparedDocument {
        PreparedDocument {
            chunks: Vec::new(),
            index,
            released: false,
        }
    }

    #[tokio::test]
    async fn explicit_release_happens_once() {
        let index = Arc::new(CountingIndex::default());
        prepared(index.clone()).release().await;
        tokio::task::yield_now().await;
        assert_eq!(index.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_request_still_releases_its_index() {
        let index = Arc::new(CountingIndex::default());
        let document = prepared(index.clone());

        let pending = tokio::spawn(async move {
            let _document = document;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        tokio::task::yield_now().await;
        pending.abort();
        let _ = pending.await;

        for _ in 0..10 {
            if index.releases.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(index.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vector_count_must_match_chunk_count() {
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(ShortEmbedder),
            Arc::new(RecordingGenerator::default()),
            options(Duration::from_secs(5)),
            Client::new(),
        )
        .unwrap();
        assert!(matches!(
            orchestrator.prepare(POLICY).await,
            Err(PipelineError::Embedding(ModelError::EmbeddingCount { .. }))
        ));
    }

    #[tokio::test]
    async fn failed_question_is_isolated() {
        let orchestrator = orchestrator(Arc::new(RecordingGenerator::default()), Duration::from_secs(5));
        let batch = orchestrator
            .run(
                POLICY,
                &questions(&["grace period?", "please fail", "maternity cover?"]),
            )
            .await
            .expect("pipeline runs");

        assert!(!batch.timed_out);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.answers.len(), 3);
        assert_eq!(batch.answers[0], "answer to grace period?");
        assert!(batch.answers[1].starts_with("Could not generate answer due to error:"));
        assert!(batch.answers[1].contains("boom"));
        assert_eq!(batch.answers[2], "answer to maternity cover?");
    }

    #[tokio::test]
    async fn slow_batch_is_replaced_by_timeout_placeholders() {
        let orchestrator = orchestrator(
            Arc::new(SlowGenerator {
                delay: Duration::from_secs(30),
            }),
            Duration::from_millis(50),
        );
        let batch = orchestrator
            .run(POLICY, &questions(&["one", "two", "three"]))
            .await
            .expect("timeouts are not errors");

        assert!(batch.timed_out);
        assert_eq!(batch.answers, vec![TIMEOUT_ANSWER.to_string(); 3]);
    }

    #[tokio::test]
    async fn retrieved_context_is_deterministic_and_relevant() {
        let generator = Arc::new(RecordingGenerator::default());
        let orchestrator = orchestrator(generator.clone(), Duration::from_secs(5));
        let document = orchestrator.prepare(POLICY).await.unwrap();

        let question = questions(&["cataract surgery waiting period"]);
        orchestrator.answer_all(&document, &question).await;
        orchestrator.answer_all(&document, &question).await;

        let contexts = generator.contexts.lock().unwrap();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0], contexts[1]);
        assert_eq!(contexts[0].1.len(), 2);
        assert!(contexts[0].1.iter().any(|chunk| chunk.contains("ataract")));
    }

    #[tokio::test]
    async fn answers_follow_question_order() {
        let orchestrator = orchestrator(Arc::new(RecordingGenerator::default()), Duration::from_secs(5));
        let asked = questions(&["c", "a", "b", "d"]);
        let batch = orchestrator.run(POLICY, &asked).await.unwrap();
        let expected: Vec<String> = asked.iter().map(|q| format!("answer to {q}")).collect();
        assert_eq!(batch.answers, expected);
    }
}
