use crate::error::IndexError;
use crate::models::{ChunkMetadata, RetrievalResult};
use crate::store::IndexRecord;
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn collection_url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, collection, suffix)
    }
}

fn backend_error(details: impl Into<String>) -> IndexError {
    IndexError::BackendResponse {
        backend: BACKEND.to_string(),
        details: details.into(),
    }
}

fn parse_hit(hit: &Value) -> Result<RetrievalResult, IndexError> {
    let chunk_id = match hit.pointer("/id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(backend_error("search hit without id")),
    };
    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;

    let mut payload = hit
        .pointer("/payload")
        .cloned()
        .ok_or_else(|| backend_error(format!("search hit {chunk_id} without payload")))?;
    let text = payload
        .as_object_mut()
        .and_then(|fields| fields.remove("text"))
        .and_then(|text| text.as_str().map(str::to_string))
        .unwrap_or_default();
    let metadata: ChunkMetadata = serde_json::from_value(payload)?;

    Ok(RetrievalResult {
        chunk_id,
        text,
        metadata,
        score,
    })
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), IndexError> {
        let response = self
            .client
            .get(self.collection_url(collection, ""))
            .send()
            .await?;

        if response.status().is_success() {
            let parsed: Value = response.json().await?;
            let existing = parsed
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64)
                .map(|size| size as usize);
            return match existing {
                Some(size) if size != dimensions => Err(IndexError::DimensionMismatch {
                    expected: size,
                    actual: dimensions,
                }),
                _ => Ok(()),
            };
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status().to_string()));
        }

        let response = self
            .client
            .put(self.collection_url(collection, ""))
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status().to_string()));
        }

        info!(collection, dimensions, "qdrant collection created");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records
            .iter()
            .map(|record| -> Result<Value, IndexError> {
                let mut payload = serde_json::to_value(&record.metadata)?;
                if let Some(fields) = payload.as_object_mut() {
                    fields.insert("text".to_string(), Value::String(record.text.clone()));
                }
                Ok(json!({
                    "id": record.chunk_id,
                    "vector": record.vector,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        let response = self
            .client
            .put(self.collection_url(collection, "/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(backend_error(format!("{status}: {body}")));
        }

        debug!(collection, points = records.len(), "qdrant upsert complete");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        let response = self
            .client
            .post(self.collection_url(collection, "/points/search"))
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = hits.iter().map(parse_hit).collect::<Result<Vec<_>, _>>()?;
        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize, IndexError> {
        let response = self
            .client
            .post(self.collection_url(collection, "/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}
