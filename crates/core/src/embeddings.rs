use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_DIMENSIONS: usize = 1536;
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_DIMENSIONS: usize = 768;
pub const DEFAULT_BATCH_SIZE: usize = 16;
pub const DEFAULT_HASHING_DIMENSIONS: usize = 128;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Maps text to fixed-length vectors.
///
/// Implementors provide [`Embedder::embed_batch`] for a single request to the
/// backing model; callers use [`Embedder::embed`], which splits the input into
/// `batch_size` groups and checks that every batch comes back complete and
/// with the configured dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn batch_size(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size().max(1)) {
            let embedded = self.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingError::Shape {
                    expected: format!("{} vectors", batch.len()),
                    actual: format!("{} vectors", embedded.len()),
                });
            }
            if let Some(vector) = embedded.iter().find(|v| v.len() != self.dimensions()) {
                return Err(EmbeddingError::Shape {
                    expected: format!("dimension {}", self.dimensions()),
                    actual: format!("dimension {}", vector.len()),
                });
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::Shape {
                expected: "1 vector".to_string(),
                actual: "0 vectors".to_string(),
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingSettings {
    pub openai_api_key: Option<String>,
    pub openai_endpoint: Option<String>,
    pub openai_model: Option<String>,
    /// Vector length of the OpenAI model; derived from the model name when unset.
    pub openai_dimensions: Option<usize>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub ollama_dimensions: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Picks the embedding strategy once: the remote API when a key is present,
/// otherwise the local model server when a model is configured.
pub fn select_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>, EmbeddingError> {
    let batch_size = settings.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);

    if let Some(api_key) = non_empty(settings.openai_api_key.as_deref()) {
        let mut embedder = OpenAiEmbedder::new(api_key)?.with_batch_size(batch_size);
        if let Some(endpoint) = non_empty(settings.openai_endpoint.as_deref()) {
            embedder = embedder.with_endpoint(endpoint);
        }
        if let Some(model) = non_empty(settings.openai_model.as_deref()) {
            embedder = embedder.with_model(model);
        }
        let dimensions = settings
            .openai_dimensions
            .unwrap_or_else(|| openai_model_dimensions(&embedder.model));
        embedder = embedder.with_dimensions(dimensions);
        info!(provider = "openai", model = %embedder.model, "embedding strategy selected");
        return Ok(Box::new(embedder));
    }

    if let Some(model) = non_empty(settings.ollama_model.as_deref()) {
        let base_url = non_empty(settings.ollama_url.as_deref()).unwrap_or(DEFAULT_OLLAMA_URL);
        let dimensions = settings.ollama_dimensions.unwrap_or(DEFAULT_OLLAMA_DIMENSIONS);
        let embedder = OllamaEmbedder::new(base_url, model, dimensions)?.with_batch_size(batch_size);
        info!(provider = "ollama", model = %model, "embedding strategy selected");
        return Ok(Box::new(embedder));
    }

    Err(EmbeddingError::Configuration(
        "no embedding backend available: set OPENAI_API_KEY or configure a local Ollama model"
            .to_string(),
    ))
}

/// Output length of the known OpenAI embedding models.
pub fn openai_model_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => DEFAULT_OPENAI_DIMENSIONS,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, EmbeddingError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "OpenAI API key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            dimensions: DEFAULT_OPENAI_DIMENSIONS,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "openai", batch_size = texts.len(), model = %self.model, "embedding batch");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&OpenAiEmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Service {
                provider: "openai".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let mut parsed: OpenAiEmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Embeddings from a model served by a local Ollama instance.
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "local embedding model name must not be empty".to_string(),
            ));
        }
        if dimensions == 0 {
            return Err(EmbeddingError::Configuration(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimensions,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "ollama", batch_size = texts.len(), model = %self.model, "embedding batch");

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Service {
                provider: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: OllamaEmbedResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

/// In-process embedder hashing character trigrams into buckets. Deterministic
/// and dependency free; retrieval quality is far below a trained model.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}
