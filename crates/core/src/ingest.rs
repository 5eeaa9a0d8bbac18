use crate::chunking::{build_chunks, ChunkingConfig, Tokenizer};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{extract_segments, DocumentFormat};
use crate::models::{CourseDocument, IngestionOptions};
use crate::store::IndexRecord;
use crate::traits::VectorIndex;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub path: PathBuf,
    pub chunks: usize,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub chunks_indexed: usize,
    pub files: Vec<IndexedFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Lists supported files under `input` (or `input` itself), sorted. Files
/// with other extensions come back as skipped.
pub fn discover_course_files(
    input: &Path,
) -> Result<(Vec<PathBuf>, Vec<SkippedFile>), IngestError> {
    if !input.exists() {
        return Err(IngestError::InvalidArgument(format!(
            "input path does not exist: {}",
            input.display()
        )));
    }

    let mut files = Vec::new();
    let mut skipped = Vec::new();

    for entry in WalkDir::new(input).into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path().to_path_buf();
        if DocumentFormat::detect(&path).is_some() {
            files.push(path);
        } else {
            skipped.push(SkippedFile {
                path,
                reason: format!(
                    "unsupported file type (expected one of: {})",
                    DocumentFormat::EXTENSIONS.join(", ")
                ),
            });
        }
    }

    files.sort_unstable();
    skipped.sort_unstable_by(|left, right| left.path.cmp(&right.path));
    Ok((files, skipped))
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn document_id_for(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Reads and extracts one file into a [`CourseDocument`].
pub fn load_document(
    path: &Path,
    options: &IngestionOptions,
) -> Result<CourseDocument, IngestError> {
    let format = DocumentFormat::detect(path).ok_or_else(|| {
        IngestError::InvalidArgument(format!("unsupported file type: {}", path.display()))
    })?;
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let segments = extract_segments(path, format)?;
    debug!(path = %path.display(), segments = segments.len(), "document extracted");

    Ok(CourseDocument {
        document_id: document_id_for(path),
        title: title.to_string(),
        source_path: path.to_string_lossy().to_string(),
        course_id: options.course_id.clone(),
        lecture_id: options.lecture_id.clone(),
        checksum: digest_file(path)?,
        ingested_at: Utc::now(),
        segments,
    })
}

/// Chunks, embeds and upserts one document. Returns the number of chunks
/// written to `collection`.
pub async fn index_document(
    document: &CourseDocument,
    collection: &str,
    config: ChunkingConfig,
    tokenizer: &dyn Tokenizer,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<usize, IngestError> {
    let mut chunks = Vec::new();
    for segment in &document.segments {
        let segment_chunks = build_chunks(document, segment, tokenizer, config)?;
        if segment_chunks.is_empty() {
            debug!(source = %document.title, locator = ?segment.locator, "blank segment skipped");
        }
        chunks.extend(segment_chunks);
    }

    if chunks.is_empty() {
        warn!(source = %document.title, "document produced no chunks");
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = embedder
        .embed(&texts)
        .await
        .map_err(|source| IngestError::Embedding {
            path: document.source_path.clone(),
            source,
        })?;

    let index_error = |source| IngestError::Index {
        path: document.source_path.clone(),
        source,
    };
    index
        .ensure_collection(collection, embedder.dimensions())
        .await
        .map_err(index_error)?;

    let records: Vec<IndexRecord> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexRecord::new(chunk, vector))
        .collect();
    index.upsert(collection, &records).await.map_err(index_error)?;

    Ok(records.len())
}

/// Ingests a file or a directory tree into `options.collection`.
///
/// Unsupported files and files that cannot be read are reported as skipped.
/// Embedding and index failures stop the run; files indexed before the
/// failing one stay indexed.
pub async fn ingest_path(
    input: &Path,
    options: &IngestionOptions,
    tokenizer: &dyn Tokenizer,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IngestionReport, IngestError> {
    let config = ChunkingConfig::new(options.max_tokens, options.overlap)?;
    let (files, skipped) = discover_course_files(input)?;

    for file in &skipped {
        warn!(path = %file.path.display(), reason = %file.reason, "skipping file");
    }
    info!(
        input = %input.display(),
        collection = %options.collection,
        files = files.len(),
        embedder = embedder.name(),
        "ingestion started"
    );

    let mut report = IngestionReport {
        skipped,
        ..IngestionReport::default()
    };

    for path in files {
        let document = match load_document(&path, options) {
            Ok(document) => document,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "skipping unreadable file");
                report.skipped.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let chunks = index_document(
            &document,
            &options.collection,
            config,
            tokenizer,
            embedder,
            index,
        )
        .await?;

        info!(path = %path.display(), chunk_count = chunks, "file indexed");
        report.chunks_indexed += chunks;
        report.files.push(IndexedFile { path, chunks });
    }

    info!(
        collection = %options.collection,
        chunk_count = report.chunks_indexed,
        skipped = report.skipped.len(),
        "ingestion finished"
    );
    Ok(report)
}
