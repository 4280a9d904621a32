pub mod analyzer;
pub mod chunker;
pub mod embedder;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod text;
pub mod vector_store;
