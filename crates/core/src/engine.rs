use crate::embeddings::Embedder;
use crate::enrichment::DEFAULT_MAX_VIDEOS;
use crate::error::{QueryError, QuizError, StoreError};
use crate::models::{AnswerRecord, AnswerState, Confidence, RetrievalResult, StoredQuiz};
use crate::quiz::QuizGenerator;
use crate::rewriter::QueryRewriter;
use crate::traits::{LanguageModel, QuizStore, VectorIndex, VideoSearch};
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_CONTEXT_CHAR_BUDGET: usize = 12_000;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub collection: String,
    pub top_k: usize,
    /// Retrieval is trusted when the best score is strictly above this value.
    pub confidence_threshold: f32,
    /// Upper bound, in characters, on the context handed to the model.
    pub context_char_budget: usize,
    pub enrichment_max_results: usize,
}

impl EngineSettings {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            top_k: DEFAULT_TOP_K,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            context_char_budget: DEFAULT_CONTEXT_CHAR_BUDGET,
            enrichment_max_results: DEFAULT_MAX_VIDEOS,
        }
    }
}

pub fn answer_prompt(context: &str, query: &str) -> String {
    format!(
        "You are an academic tutor assistant. Your goal is to help students understand course materials.\n\
         Use the following context information from the lecture to answer the query.\n\
         If the answer isn't in the context, say so. Explain your reasoning step-by-step.\n\
         Context:\n{context}\n\
         Query: {query}\n\
         Answer: "
    )
}

/// High iff some result scores strictly above `threshold`. No results is low.
pub fn assess_confidence(results: &[RetrievalResult], threshold: f32) -> Confidence {
    if results.iter().any(|result| result.score > threshold) {
        Confidence::High
    } else {
        Confidence::Low
    }
}

/// Joins result texts in rank order, each under a short source line, and cuts
/// the whole at `budget` characters.
pub fn build_context(results: &[RetrievalResult], budget: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for result in results {
        let header = match result.metadata.page_or_slide {
            Some(locator) => format!("[{} #{}]", result.metadata.source, locator),
            None => format!("[{}]", result.metadata.source),
        };
        let separator = if context.is_empty() { "" } else { "\n\n" };
        let block = format!("{separator}{header}\n{}", result.text.trim());
        let block_chars = block.chars().count();

        let remaining = budget.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        if block_chars > remaining {
            context.extend(block.chars().take(remaining));
            break;
        }
        context.push_str(&block);
        used += block_chars;
    }

    context
}

/// Answers questions and builds quizzes over one collection of course chunks.
pub struct TutorEngine<I, L, V, S> {
    embedder: Box<dyn Embedder>,
    index: I,
    llm: L,
    videos: V,
    quizzes: S,
    settings: EngineSettings,
}

impl<I, L, V, S> TutorEngine<I, L, V, S>
where
    I: VectorIndex,
    L: LanguageModel,
    V: VideoSearch,
    S: QuizStore,
{
    pub fn new(
        embedder: Box<dyn Embedder>,
        index: I,
        llm: L,
        videos: V,
        quizzes: S,
        settings: EngineSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            videos,
            quizzes,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Top-K chunks for `query`, best first. An empty collection is not an error.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>, QueryError> {
        let vector = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|source| QueryError::Embedding {
                question: query.to_string(),
                source,
            })?;

        let results = self
            .index
            .query(&self.settings.collection, &vector, self.settings.top_k)
            .await
            .map_err(|source| QueryError::Retrieval {
                question: query.to_string(),
                source,
            })?;

        debug!(
            collection = %self.settings.collection,
            query,
            hits = results.len(),
            "retrieval complete"
        );
        Ok(results)
    }

    pub async fn answer(
        &self,
        question: &str,
        always_enrich: bool,
    ) -> Result<AnswerRecord, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let rewritten_query = QueryRewriter::new(&self.llm).rewrite(question).await;
        let retrieval = self.retrieve(&rewritten_query).await?;

        let context = build_context(&retrieval, self.settings.context_char_budget);
        let answer = self
            .llm
            .complete(&answer_prompt(&context, &rewritten_query))
            .await
            .map_err(|source| QueryError::Generation {
                question: question.to_string(),
                source,
            })?;

        let confidence = assess_confidence(&retrieval, self.settings.confidence_threshold);
        let enrich = always_enrich || confidence == Confidence::Low;
        let (state, videos) = if enrich {
            let videos = self
                .videos
                .search(question, self.settings.enrichment_max_results)
                .await;
            (AnswerState::AnsweredWithEnrichment, videos)
        } else {
            (AnswerState::Answered, Vec::new())
        };

        info!(
            question,
            rewritten = %rewritten_query,
            hits = retrieval.len(),
            confidence = ?confidence,
            videos = videos.len(),
            "question answered"
        );

        Ok(AnswerRecord {
            question: question.to_string(),
            rewritten_query,
            answer,
            confidence,
            state,
            retrieval,
            videos,
        })
    }

    /// Builds and stores a quiz. Without `context`, the topic itself is used
    /// as the retrieval query and the hit texts become the context.
    pub async fn generate_quiz(
        &self,
        topic: &str,
        context: Option<&str>,
        num_questions: usize,
    ) -> Result<StoredQuiz, QuizError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(QuizError::InvalidArgument("topic is empty".to_string()));
        }

        let context = match context {
            Some(context) => context.to_string(),
            None => {
                let results = self
                    .retrieve(topic)
                    .await
                    .map_err(|source| QuizError::Context {
                        topic: topic.to_string(),
                        source,
                    })?;
                results
                    .iter()
                    .map(|result| result.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        QuizGenerator::new(&self.llm, &self.quizzes)
            .generate(topic, &context, num_questions)
            .await
    }

    pub async fn saved_quizzes(&self, limit: usize) -> Result<Vec<StoredQuiz>, StoreError> {
        self.quizzes.list(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, IndexError, LlmError};
    use crate::models::{ChunkMetadata, Quiz, VideoResult};
    use crate::store::IndexRecord;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    struct RecordingEmbedder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Embedder for RecordingEmbedder {
        fn name(&self) -> &str {
            "recording"
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn batch_size(&self) -> usize {
            16
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.seen.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn hits(scores: &[f32]) -> Vec<RetrievalResult> {
        scores
            .iter()
            .enumerate()
            .map(|(position, score)| RetrievalResult {
                chunk_id: format!("chunk-{position}"),
                text: format!("lecture text {position}"),
                metadata: ChunkMetadata {
                    document_id: "doc".to_string(),
                    source: "lecture.pdf".to_string(),
                    course_id: "calculus101".to_string(),
                    lecture_id: None,
                    page_or_slide: Some(position as u32 + 1),
                    chunk_index: 0,
                    token_count: 3,
                },
                score: *score,
            })
            .collect()
    }

    struct ScoredIndex {
        scores: Vec<f32>,
    }

    #[async_trait]
    impl VectorIndex for ScoredIndex {
        async fn ensure_collection(
            &self,
            _collection: &str,
            _dimensions: usize,
        ) -> Result<(), IndexError> {
            Ok(())
        }

        async fn upsert(
            &self,
            _collection: &str,
            _records: &[IndexRecord],
        ) -> Result<(), IndexError> {
            Ok(())
        }

        async fn query(
            &self,
            _collection: &str,
            _vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<RetrievalResult>, IndexError> {
            Ok(hits(&self.scores).into_iter().take(top_k).collect())
        }

        async fn count(&self, _collection: &str) -> Result<usize, IndexError> {
            Ok(self.scores.len())
        }
    }

    struct TutorModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for TutorModel {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.starts_with("Rewrite the following student question") {
                Ok("\"formal definition of a derivative\"".to_string())
            } else if prompt.starts_with("Based on the following context") {
                Ok(r#"{"quiz_title": "Quiz", "questions": [
                    {"question": "Q?", "options": ["a", "b", "c", "d"], "correct_answer": 0}
                ]}"#
                .to_string())
            } else {
                Ok("The derivative is the limit of the difference quotient.".to_string())
            }
        }
    }

    #[derive(Default)]
    struct RecordingVideos {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VideoSearch for RecordingVideos {
        async fn search(&self, query: &str, _max_results: usize) -> Vec<VideoResult> {
            self.queries.lock().unwrap().push(query.to_string());
            vec![VideoResult {
                id: "v1".to_string(),
                title: "Derivatives".to_string(),
                channel: "Math".to_string(),
                description: String::new(),
                thumbnail_url: String::new(),
                url: "https://www.youtube.com/watch?v=v1".to_string(),
            }]
        }
    }

    #[derive(Default)]
    struct MemoryQuizzes {
        saved: Mutex<Vec<StoredQuiz>>,
    }

    #[async_trait]
    impl QuizStore for MemoryQuizzes {
        async fn save(&self, topic: &str, quiz: &Quiz) -> Result<StoredQuiz, StoreError> {
            let mut saved = self.saved.lock().unwrap();
            let stored = StoredQuiz {
                id: saved.len() as i64 + 1,
                topic: topic.to_string(),
                quiz: quiz.clone(),
                created_at: Utc::now(),
            };
            saved.push(stored.clone());
            Ok(stored)
        }

        async fn list(&self, limit: usize) -> Result<Vec<StoredQuiz>, StoreError> {
            Ok(self.saved.lock().unwrap().iter().rev().take(limit).cloned().collect())
        }
    }

    type TestEngine = TutorEngine<ScoredIndex, TutorModel, RecordingVideos, MemoryQuizzes>;

    type Embedded = Arc<Mutex<Vec<String>>>;

    fn engine(scores: Vec<f32>) -> (TestEngine, Embedded) {
        let seen = Embedded::default();
        let engine = TutorEngine::new(
            Box::new(RecordingEmbedder { seen: seen.clone() }),
            ScoredIndex { scores },
            TutorModel {
                prompts: Mutex::new(Vec::new()),
            },
            RecordingVideos::default(),
            MemoryQuizzes::default(),
            EngineSettings::new("calculus101"),
        );
        (engine, seen)
    }

    #[tokio::test]
    async fn high_score_skips_enrichment() {
        let (engine, _seen) = engine(vec![0.85, 0.5]);
        let record = engine.answer("what is a derivative?", false).await.unwrap();

        assert_eq!(record.confidence, Confidence::High);
        assert_eq!(record.state, AnswerState::Answered);
        assert!(record.videos.is_empty());
        assert!(engine.videos.queries.lock().unwrap().is_empty());
        assert_eq!(record.retrieval.len(), 2);
    }

    #[tokio::test]
    async fn low_score_enriches_with_original_question() {
        let (engine, _seen) = engine(vec![0.4, 0.2]);
        let record = engine.answer("what is a derivative?", false).await.unwrap();

        assert_eq!(record.confidence, Confidence::Low);
        assert_eq!(record.state, AnswerState::AnsweredWithEnrichment);
        assert_eq!(record.videos.len(), 1);
        assert_eq!(
            *engine.videos.queries.lock().unwrap(),
            vec!["what is a derivative?".to_string()]
        );
    }

    #[tokio::test]
    async fn no_hits_is_low_confidence() {
        let (engine, _seen) = engine(Vec::new());
        let record = engine.answer("what is a derivative?", false).await.unwrap();

        assert!(record.retrieval.is_empty());
        assert_eq!(record.confidence, Confidence::Low);
        assert_eq!(record.state, AnswerState::AnsweredWithEnrichment);
    }

    #[tokio::test]
    async fn caller_can_force_enrichment() {
        let (engine, _seen) = engine(vec![0.95]);
        let record = engine.answer("what is a derivative?", true).await.unwrap();

        assert_eq!(record.confidence, Confidence::High);
        assert_eq!(record.state, AnswerState::AnsweredWithEnrichment);
        assert_eq!(engine.videos.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retrieval_and_prompt_use_rewritten_query() {
        let (engine, seen) = engine(vec![0.9]);
        let record = engine.answer("  what's a derivative  ", false).await.unwrap();

        assert_eq!(record.question, "what's a derivative");
        assert_eq!(record.rewritten_query, "formal definition of a derivative");
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["formal definition of a derivative".to_string()]
        );

        let prompts = engine.llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("[lecture.pdf #1]\nlecture text 0"));
        assert!(prompts[1].ends_with("Query: formal definition of a derivative\nAnswer: "));
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let (engine, _seen) = engine(vec![0.9]);
        assert!(matches!(
            engine.answer("   ", false).await,
            Err(QueryError::EmptyQuestion)
        ));
    }

    #[tokio::test]
    async fn quiz_without_context_retrieves_by_topic() {
        let (engine, seen) = engine(vec![0.9, 0.8]);
        let stored = engine.generate_quiz("derivatives", None, 1).await.unwrap();

        assert_eq!(stored.topic, "derivatives");
        assert_eq!(*seen.lock().unwrap(), vec!["derivatives".to_string()]);
        assert!(engine.llm.prompts.lock().unwrap()[0].contains("lecture text 0\nlecture text 1"));
        assert_eq!(engine.saved_quizzes(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn quiz_with_context_skips_retrieval() {
        let (engine, seen) = engine(vec![0.9]);
        engine
            .generate_quiz("derivatives", Some("given notes"), 1)
            .await
            .unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert!(engine.llm.prompts.lock().unwrap()[0].contains("Context:\ngiven notes"));
    }

    #[test]
    fn confidence_threshold_is_strict() {
        assert_eq!(assess_confidence(&hits(&[0.7, 0.3]), 0.7), Confidence::Low);
        assert_eq!(assess_confidence(&hits(&[0.3, 0.71]), 0.7), Confidence::High);
        assert_eq!(assess_confidence(&[], 0.7), Confidence::Low);
    }

    #[test]
    fn context_is_cut_at_budget() {
        let results = hits(&[0.9, 0.8, 0.7]);
        let full = build_context(&results, usize::MAX);
        assert!(full.contains("lecture text 2"));

        let first_only = build_context(&results, 31);
        assert_eq!(first_only, "[lecture.pdf #1]\nlecture text 0");

        let cut = build_context(&results, 40);
        assert_eq!(cut.chars().count(), 40);
        assert!(!cut.contains("lecture text 1"));
    }
}
