use crate::error::{IndexError, LlmError, StoreError};
use crate::models::{Quiz, RetrievalResult, StoredQuiz, VideoResult};
use crate::store::IndexRecord;
use async_trait::async_trait;

/// Nearest-neighbour storage for chunk vectors, scoped by named collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates `collection` if missing. Fails when it exists with another dimension.
    async fn ensure_collection(&self, collection: &str, dimensions: usize)
        -> Result<(), IndexError>;

    /// Inserts or replaces records by chunk id.
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError>;

    /// Returns at most `top_k` results ordered by descending similarity. An
    /// unknown or empty collection yields an empty list.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, IndexError>;

    async fn count(&self, collection: &str) -> Result<usize, IndexError>;
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Box<T> {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), IndexError> {
        (**self).ensure_collection(collection, dimensions).await
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError> {
        (**self).upsert(collection, records).await
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        (**self).query(collection, vector, top_k).await
    }

    async fn count(&self, collection: &str) -> Result<usize, IndexError> {
        (**self).count(collection).await
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for &T {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).complete(prompt).await
    }
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Box<T> {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).complete(prompt).await
    }
}

/// Advisory search for supplementary material. Upstream failures are
/// absorbed by the implementation and surface as an empty list.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Vec<VideoResult>;
}

#[async_trait]
impl<T: VideoSearch + ?Sized> VideoSearch for Box<T> {
    async fn search(&self, query: &str, max_results: usize) -> Vec<VideoResult> {
        (**self).search(query, max_results).await
    }
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn save(&self, topic: &str, quiz: &Quiz) -> Result<StoredQuiz, StoreError>;

    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<StoredQuiz>, StoreError>;
}

#[async_trait]
impl<T: QuizStore + ?Sized> QuizStore for &T {
    async fn save(&self, topic: &str, quiz: &Quiz) -> Result<StoredQuiz, StoreError> {
        (**self).save(topic, quiz).await
    }

    async fn list(&self, limit: usize) -> Result<Vec<StoredQuiz>, StoreError> {
        (**self).list(limit).await
    }
}
