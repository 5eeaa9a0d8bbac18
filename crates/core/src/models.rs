use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of answer options every quiz question must carry.
pub const QUIZ_OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    /// 1-based page or slide number; `None` for flat formats.
    pub locator: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDocument {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub course_id: String,
    pub lecture_id: Option<String>,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
    pub segments: Vec<TextSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub source: String,
    pub course_id: String,
    pub lecture_id: Option<String>,
    pub page_or_slide: Option<u32>,
    pub chunk_index: u64,
    pub token_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Confidence {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnswerState {
    Answered,
    AnsweredWithEnrichment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoResult {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub description: String,
    pub thumbnail_url: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub rewritten_query: String,
    pub answer: String,
    pub confidence: Confidence,
    pub state: AnswerState,
    pub retrieval: Vec<RetrievalResult>,
    pub videos: Vec<VideoResult>,
}

impl AnswerRecord {
    pub fn max_score(&self) -> Option<f32> {
        self.retrieval
            .iter()
            .map(|result| result.score)
            .reduce(f32::max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quiz {
    #[serde(rename = "quiz_title")]
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredQuiz {
    pub id: i64,
    pub topic: String,
    pub quiz: Quiz,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub collection: String,
    pub course_id: String,
    pub lecture_id: Option<String>,
    pub max_tokens: usize,
    pub overlap: usize,
}

impl IngestionOptions {
    pub fn new(collection: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            course_id: course_id.into(),
            lecture_id: None,
            max_tokens: 500,
            overlap: 100,
        }
    }
}
