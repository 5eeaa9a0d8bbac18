pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod quiz;
pub mod quiz_store;
pub mod rewriter;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{
    build_chunks, chunk_text, ChunkingConfig, Cl100kTokenizer, CodepointTokenizer, TextChunk,
    Tokenizer,
};
pub use config::TutorSettings;
pub use embeddings::{
    openai_model_dimensions, select_embedder, Embedder, EmbeddingSettings, HashingEmbedder,
    OllamaEmbedder, OpenAiEmbedder,
};
pub use engine::{assess_confidence, build_context, EngineSettings, TutorEngine};
pub use enrichment::{NoEnrichment, YouTubeSearcher};
pub use error::{
    ConfigError, EmbeddingError, EnrichmentError, IndexError, IngestError, LlmError, QueryError,
    QuizError, StoreError,
};
pub use extractor::{extract_segments, DocumentFormat, TextExtractor};
pub use ingest::{
    discover_course_files, index_document, ingest_path, load_document, IndexedFile,
    IngestionReport, SkippedFile,
};
pub use llm::{ChatCompletionsClient, LlmConfig};
pub use models::{
    AnswerRecord, AnswerState, ChunkMetadata, Confidence, CourseChunk, CourseDocument,
    IngestionOptions, Question, Quiz, RetrievalResult, StoredQuiz, TextSegment, VideoResult,
};
pub use quiz::{parse_quiz, QuizGenerator};
pub use quiz_store::SqliteQuizStore;
pub use rewriter::QueryRewriter;
pub use store::IndexRecord;
pub use stores::{LocalIndexStore, QdrantStore};
pub use traits::{LanguageModel, QuizStore, VectorIndex, VideoSearch};
