use crate::models::{ChunkMetadata, CourseChunk, RetrievalResult};
use serde::{Deserialize, Serialize};

/// A chunk as held by an index: text and metadata next to its vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

impl IndexRecord {
    pub fn new(chunk: CourseChunk, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            text: chunk.text,
            metadata: chunk.metadata,
            vector,
        }
    }

    pub fn to_result(&self, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk_id: self.chunk_id.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            score,
        }
    }
}

/// Cosine similarity in [-1, 1]; zero when either vector has no magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}
