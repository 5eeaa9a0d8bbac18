use crate::error::IngestError;
use crate::models::{ChunkMetadata, CourseChunk, CourseDocument, TextSegment};
use tiktoken_rs::CoreBPE;
use uuid::Uuid;

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    /// Decodes a window of tokens produced by `encode`. A window may start or
    /// end inside a multi-byte character.
    fn decode(&self, tokens: &[u32]) -> Result<String, IngestError>;
}

/// BPE tokenizer using the `cl100k_base` vocabulary shared by the OpenAI
/// embedding models.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self, IngestError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|error| IngestError::Tokenizer(error.to_string()))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|token| token as u32)
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, IngestError> {
        let ranks: Vec<_> = tokens.iter().map(|token| *token as _).collect();
        if let Ok(text) = self.bpe.decode(ranks.clone()) {
            return Ok(text);
        }

        // Cut through a multi-byte character: keep what decodes.
        let bytes: Vec<u8> = self.bpe._decode_native_and_split(ranks).flatten().collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// One token per Unicode scalar value. Lossless in both directions.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodepointTokenizer;

impl Tokenizer for CodepointTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.chars().map(u32::from).collect()
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, IngestError> {
        tokens
            .iter()
            .map(|token| {
                char::from_u32(*token).ok_or_else(|| {
                    IngestError::Tokenizer(format!("token {token} is not a scalar value"))
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    max_tokens: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(max_tokens: usize, overlap: usize) -> Result<Self, IngestError> {
        if max_tokens == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if overlap >= max_tokens {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap ({overlap}) must be less than max_tokens ({max_tokens})"
            )));
        }
        Ok(Self {
            max_tokens,
            overlap,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn step(&self) -> usize {
        self.max_tokens - self.overlap
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub token_count: usize,
    /// Offset of the first token of this chunk in the segment's token stream.
    pub start_token: usize,
}

/// Splits `text` into windows of `max_tokens` tokens advancing by
/// `max_tokens - overlap`. The configuration is validated before tokenizing.
pub fn chunk_text(
    tokenizer: &dyn Tokenizer,
    text: &str,
    max_tokens: usize,
    overlap: usize,
) -> Result<Vec<TextChunk>, IngestError> {
    let config = ChunkingConfig::new(max_tokens, overlap)?;
    chunk_with_config(tokenizer, text, config)
}

pub fn chunk_with_config(
    tokenizer: &dyn Tokenizer,
    text: &str,
    config: ChunkingConfig,
) -> Result<Vec<TextChunk>, IngestError> {
    let tokens = tokenizer.encode(text);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < tokens.len() {
        let end = (start + config.max_tokens).min(tokens.len());
        let window = &tokens[start..end];
        chunks.push(TextChunk {
            text: tokenizer.decode(window)?,
            token_count: window.len(),
            start_token: start,
        });
        start += config.step();
    }

    Ok(chunks)
}

/// Chunks one extracted segment of `document`. Blank segments yield nothing.
pub fn build_chunks(
    document: &CourseDocument,
    segment: &TextSegment,
    tokenizer: &dyn Tokenizer,
    config: ChunkingConfig,
) -> Result<Vec<CourseChunk>, IngestError> {
    if segment.text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunks = chunk_with_config(tokenizer, &segment.text, config)?
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let chunk_index = index as u64;
            CourseChunk {
                chunk_id: make_chunk_id(&document.document_id, segment.locator, chunk_index),
                text: chunk.text,
                metadata: ChunkMetadata {
                    document_id: document.document_id.clone(),
                    source: document.title.clone(),
                    course_id: document.course_id.clone(),
                    lecture_id: document.lecture_id.clone(),
                    page_or_slide: segment.locator,
                    chunk_index,
                    token_count: chunk.token_count,
                },
            }
        })
        .collect();

    Ok(chunks)
}

fn make_chunk_id(document_id: &str, locator: Option<u32>, index: u64) -> String {
    let locator = locator.map_or_else(|| "-".to_string(), |value| value.to_string());
    let key = format!("{document_id}:{locator}:{index}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}
