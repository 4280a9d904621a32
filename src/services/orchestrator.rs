use std::collections::HashMap;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use bytes::Bytes;
use sha2::{Digest, Sha256};

use super::analyzer::SchemaAnalyzer;
use super::chunker::SemanticChunker;
use super::embedder::Embedder;
use super::llm::AnswerGenerator;
use super::parser::WorkbookParser;
use super::vector_store::{SearchMatch, VectorStore};
use crate::config::Config;
use crate::error::AppError;
use crate::models::{ColumnRole, Relationship};

/// Matches echoed back in the HTTP response.
const TOP_MATCHES: usize = 5;

/// Wires the inference pipeline to its external collaborators. All
/// clients are constructed up front and injected here; nothing in the
/// pipeline holds ambient global state.
pub struct Orchestrator {
    parser: WorkbookParser,
    analyzer: SchemaAnalyzer,
    chunker: SemanticChunker,
    embedder: Embedder,
    answerer: AnswerGenerator,
    vector_store: VectorStore,
    http: reqwest::Client,
    max_file_size: usize,
}

pub struct PipelineResult {
    pub answer: String,
    pub collection_name: String,
    pub chunks_indexed: usize,
    pub matches: Vec<SearchMatch>,
    pub sheets: Vec<String>,
    pub relationships: Vec<Relationship>,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::new();
        let openai = OpenAIClient::with_config(
            OpenAIConfig::new().with_api_key(config.openai_key.clone()),
        );

        Self {
            parser: WorkbookParser,
            analyzer: SchemaAnalyzer,
            chunker: SemanticChunker,
            embedder: Embedder::new(openai.clone(), &config.embedding_model),
            answerer: AnswerGenerator::new(openai, &config.llm_model),
            vector_store: VectorStore::new(
                http.clone(),
                &config.qdrant_url,
                config.qdrant_api_key.clone(),
                config.embedding_dim,
            ),
            http,
            max_file_size: config.max_file_size,
        }
    }

    pub async fn process_and_query(
        &self,
        file_url: &str,
        query: &str,
        top_k: usize,
        sheet_filter: Option<&str>,
        type_filter: Option<&str>,
    ) -> Result<PipelineResult, AppError> {
        let start = std::time::Instant::now();

        let file_bytes = self.fetch_file(file_url).await?;
        let file_hash = hex_digest(&file_bytes);
        tracing::info!(
            "Fetched file ({}KB), hash {}",
            file_bytes.len() / 1024,
            &file_hash[..16]
        );

        let parse_start = std::time::Instant::now();
        let metadata = self.parser.infer_metadata(file_bytes.clone()).await?;
        if metadata.is_empty() {
            return Err(AppError::InvalidInput(
                "workbook contains no sheets with data".to_string(),
            ));
        }
        let data = self.parser.extract_data(&metadata, file_bytes).await?;
        tracing::info!(
            "Parsed {} sheets in {:?}",
            metadata.len(),
            parse_start.elapsed()
        );

        let relationships = self.analyzer.detect_relationships(&metadata, &data);
        let roles: HashMap<String, HashMap<String, ColumnRole>> = metadata
            .iter()
            .map(|meta| {
                let sheet_roles =
                    self.analyzer
                        .detect_roles(meta, &data[&meta.sheet_name], &relationships);
                (meta.sheet_name.clone(), sheet_roles)
            })
            .collect();

        let chunks = self
            .chunker
            .build_chunks(&metadata, &data, &roles, &relationships);

        let is_new = self.vector_store.ensure_collection(&file_hash).await?;
        if is_new {
            let index_start = std::time::Instant::now();
            let embeddings = self
                .embedder
                .embed(chunks.iter().map(|c| c.content.clone()).collect())
                .await?;
            self.vector_store
                .upsert(&file_hash, &chunks, &embeddings)
                .await?;
            tracing::info!(
                "Indexed {} chunks in {:?}",
                chunks.len(),
                index_start.elapsed()
            );
        }

        let query_vector = self
            .embedder
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("no query embedding returned".to_string()))?;
        let matches = self
            .vector_store
            .search(&file_hash, &query_vector, top_k, sheet_filter, type_filter)
            .await?;

        let context: Vec<&str> = matches.iter().map(|m| m.content.as_str()).collect();
        let answer = self
            .answerer
            .generate_answer(query, &context.join("\n\n"))
            .await?;

        tracing::info!("Pipeline completed in {:?}", start.elapsed());

        Ok(PipelineResult {
            answer,
            collection_name: self.vector_store.collection_name(&file_hash),
            chunks_indexed: chunks.len(),
            matches: matches.into_iter().take(TOP_MATCHES).collect(),
            sheets: metadata.iter().map(|m| m.sheet_name.clone()).collect(),
            relationships,
        })
    }

    async fn fetch_file(&self, url: &str) -> Result<Bytes, AppError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("failed to fetch file: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Http(format!(
                "failed to fetch file, status: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Http(format!("failed to read response bytes: {}", e)))?;

        if bytes.len() > self.max_file_size {
            return Err(AppError::InvalidInput(format!(
                "file exceeds the {} byte limit",
                self.max_file_size
            )));
        }
        Ok(bytes)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
