use axum::{extract::State, http::Method, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::AppError,
    models::Relationship,
    services::vector_store::SearchMatch,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/sheets/query", post(query_sheet))
        .layer(cors)
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// URL of the .xlsx file to analyze.
    excel_file: String,
    /// Natural-language question over the spreadsheet.
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    sheet_filter: Option<String>,
    chunk_type_filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    answer: String,
    collection_name: String,
    chunks_indexed: usize,
    top_matches: Vec<SearchMatch>,
    sheets_parsed: Vec<String>,
    relationships_detected: Vec<Relationship>,
}

#[axum::debug_handler]
async fn query_sheet(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let start = std::time::Instant::now();
    tracing::info!(
        "Query received, top_k: {}, URL length: {}",
        request.top_k,
        request.excel_file.len()
    );

    if request.query.trim().is_empty() {
        return Err(AppError::InvalidInput("query must not be empty".to_string()));
    }
    if !(1..=50).contains(&request.top_k) {
        return Err(AppError::InvalidInput(
            "top_k must be between 1 and 50".to_string(),
        ));
    }

    let result = state
        .orchestrator
        .process_and_query(
            &request.excel_file,
            &request.query,
            request.top_k,
            request.sheet_filter.as_deref(),
            request.chunk_type_filter.as_deref(),
        )
        .await?;

    tracing::info!("Request completed in {:?}", start.elapsed());

    Ok(Json(QueryResponse {
        answer: result.answer,
        collection_name: result.collection_name,
        chunks_indexed: result.chunks_indexed,
        top_matches: result.matches,
        sheets_parsed: result.sheets,
        relationships_detected: result.relationships,
    }))
}
