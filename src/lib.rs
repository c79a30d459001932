pub mod chat;
pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod openai;
pub mod rag;
pub mod server;
pub mod store;
