use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed for {path}: {details}")]
    Extraction { path: String, details: String },

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed for {path}: {source}")]
    Embedding {
        path: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("indexing failed for {path}: {source}")]
    Index {
        path: String,
        #[source]
        source: IndexError,
    },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding configuration error: {0}")]
    Configuration(String),

    #[error("embedding service {provider} failed: {details}")]
    Service { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model configuration error: {0}")]
    Configuration(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model returned {status}: {details}")]
    BackendResponse { status: u16, details: String },

    #[error("language model returned an empty completion")]
    EmptyCompletion,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("could not embed question {question:?}: {source}")]
    Embedding {
        question: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("retrieval failed for question {question:?}: {source}")]
    Retrieval {
        question: String,
        #[source]
        source: IndexError,
    },

    #[error("answer generation failed for question {question:?}: {source}")]
    Generation {
        question: String,
        #[source]
        source: LlmError,
    },
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("invalid quiz request: {0}")]
    InvalidArgument(String),

    #[error("could not retrieve context for topic {topic:?}: {source}")]
    Context {
        topic: String,
        #[source]
        source: QueryError,
    },

    #[error("quiz generation failed for topic {topic:?}: {source}")]
    Generation {
        topic: String,
        #[source]
        source: LlmError,
    },

    #[error("malformed quiz for topic {topic:?}: {details}")]
    Format { topic: String, details: String },

    #[error("could not persist quiz for topic {topic:?}: {source}")]
    Persistence {
        topic: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("video search returned {status}: {details}")]
    BackendResponse { status: u16, details: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
