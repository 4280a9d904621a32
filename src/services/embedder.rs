use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};

use crate::error::AppError;

/// Embeds chunk content and queries with the configured OpenAI model.
pub struct Embedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl Embedder {
    pub fn new(client: Client<OpenAIConfig>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let batch_size = texts.len();
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts)
            .build()
            .map_err(|e| AppError::Embedding(format!("failed to build request: {}", e)))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| AppError::Embedding(e.to_string()))?;

        tracing::debug!("Embedded {} texts", batch_size);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
