use crate::error::IndexError;
use crate::models::RetrievalResult;
use crate::store::{cosine_similarity, IndexRecord};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Collection {
    dimensions: usize,
    records: BTreeMap<String, IndexRecord>,
}

/// In-process vector index with exact cosine search.
///
/// When opened on a directory every collection is mirrored to
/// `<dir>/<collection>.json` after each write, and reloaded on open. A write
/// only becomes visible to queries once it has been persisted.
#[derive(Debug, Default)]
pub struct LocalIndexStore {
    root: Option<PathBuf>,
    collections: RwLock<HashMap<String, Collection>>,
}

impl LocalIndexStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_json || validate_collection_name(name).is_err() {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            let collection: Collection = serde_json::from_slice(&bytes)?;
            debug!(collection = name, records = collection.records.len(), "collection loaded");
            collections.insert(name.to_string(), collection);
        }

        info!(root = %root.display(), collections = collections.len(), "local index opened");
        Ok(Self {
            root: Some(root),
            collections: RwLock::new(collections),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    async fn persist(&self, name: &str, collection: &Collection) -> Result<(), IndexError> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        let target = root.join(format!("{name}.json"));
        let staging = root.join(format!(".{name}.json.tmp"));
        tokio::fs::write(&staging, serde_json::to_vec(collection)?).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }
}

fn validate_collection_name(name: &str) -> Result<(), IndexError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(IndexError::Request(format!(
            "collection name {name:?} may only contain ASCII letters, digits, '_' and '-'"
        )))
    }
}

#[async_trait]
impl VectorIndex for LocalIndexStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), IndexError> {
        validate_collection_name(collection)?;
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(collection) {
            if existing.dimensions != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: existing.dimensions,
                    actual: dimensions,
                });
            }
            return Ok(());
        }

        let created = Collection {
            dimensions,
            records: BTreeMap::new(),
        };
        self.persist(collection, &created).await?;
        collections.insert(collection.to_string(), created);
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError> {
        validate_collection_name(collection)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut collections = self.collections.write().await;
        let mut staged = collections
            .get(collection)
            .cloned()
            .unwrap_or_else(|| Collection {
                dimensions: records[0].vector.len(),
                records: BTreeMap::new(),
            });

        if let Some(record) = records
            .iter()
            .find(|record| record.vector.len() != staged.dimensions)
        {
            return Err(IndexError::DimensionMismatch {
                expected: staged.dimensions,
                actual: record.vector.len(),
            });
        }

        for record in records {
            staged.records.insert(record.chunk_id.clone(), record.clone());
        }

        self.persist(collection, &staged).await?;
        collections.insert(collection.to_string(), staged);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if target.records.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != target.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: target.dimensions,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<RetrievalResult> = target
            .records
            .values()
            .map(|record| record.to_result(cosine_similarity(&record.vector, vector)))
            .collect();
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize, IndexError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map_or(0, |target| target.records.len()))
    }
}
