use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::Chunk;

/// One retrieval hit returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub content: String,
    pub score: f64,
    pub chunk_type: String,
    pub sheet_name: String,
}

/// Qdrant client over its REST surface. One collection per uploaded
/// workbook, named from the file hash so re-uploads reuse the index.
pub struct VectorStore {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    embedding_dim: usize,
}

impl VectorStore {
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: Option<String>,
        embedding_dim: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_dim,
        }
    }

    pub fn collection_name(&self, file_hash: &str) -> String {
        format!("excel_rag_{}", &file_hash[..16.min(file_hash.len())])
    }

    /// Create the collection for this file if it does not exist yet.
    /// Returns true when it was created, meaning the chunks still need
    /// to be embedded and upserted.
    pub async fn ensure_collection(&self, file_hash: &str) -> Result<bool, AppError> {
        let name = self.collection_name(file_hash);

        let listing: Value = self
            .request(reqwest::Method::GET, "/collections")
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::VectorStore(format!("failed to list collections: {}", e)))?
            .json()
            .await?;

        let exists = listing["result"]["collections"]
            .as_array()
            .map_or(false, |cols| {
                cols.iter().any(|c| c["name"].as_str() == Some(&name))
            });
        if exists {
            tracing::info!("Collection {} already indexed", name);
            return Ok(false);
        }

        self.request(reqwest::Method::PUT, &format!("/collections/{}", name))
            .json(&json!({
                "vectors": { "size": self.embedding_dim, "distance": "Cosine" }
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::VectorStore(format!("failed to create collection: {}", e)))?;

        tracing::info!("Created collection {}", name);
        Ok(true)
    }

    /// Point ids are the chunk positions, which are stable because the
    /// chunk sequence itself is deterministic for a given file.
    pub async fn upsert(
        &self,
        file_hash: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AppError> {
        let name = self.collection_name(file_hash);
        let points: Vec<Value> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(idx, (chunk, vector))| {
                let mut payload = chunk.payload.clone();
                payload.insert("content".into(), json!(chunk.content));
                payload.insert("chunk_id".into(), json!(chunk.chunk_id));
                payload.insert("chunk_type".into(), json!(chunk.chunk_type.as_str()));
                payload.insert("sheet_name".into(), json!(chunk.sheet_name));
                json!({ "id": idx, "vector": vector, "payload": payload })
            })
            .collect();

        self.request(
            reqwest::Method::PUT,
            &format!("/collections/{}/points?wait=true", name),
        )
        .json(&json!({ "points": points }))
        .send()
        .await?
        .error_for_status()
        .map_err(|e| AppError::VectorStore(format!("failed to upsert points: {}", e)))?;

        tracing::info!("Upserted {} points into {}", chunks.len(), name);
        Ok(())
    }

    pub async fn search(
        &self,
        file_hash: &str,
        query_vector: &[f32],
        top_k: usize,
        sheet_filter: Option<&str>,
        type_filter: Option<&str>,
    ) -> Result<Vec<SearchMatch>, AppError> {
        let name = self.collection_name(file_hash);

        let mut must = Vec::new();
        if let Some(sheet) = sheet_filter {
            must.push(json!({ "key": "sheet_name", "match": { "value": sheet } }));
        }
        if let Some(chunk_type) = type_filter {
            must.push(json!({ "key": "chunk_type", "match": { "value": chunk_type } }));
        }

        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        if !must.is_empty() {
            body["filter"] = json!({ "must": must });
        }

        let response: Value = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", name),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::VectorStore(format!("search failed: {}", e)))?
            .json()
            .await?;

        let matches = response["result"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .map(|hit| SearchMatch {
                        content: hit["payload"]["content"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                        score: hit["score"].as_f64().unwrap_or(0.0),
                        chunk_type: hit["payload"]["chunk_type"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                        sheet_name: hit["payload"]["sheet_name"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(matches)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }
}
