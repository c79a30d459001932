use crate::chunking::{split_pages, ChunkConfig, TextChunk};
use crate::document::load_pdf;
use crate::embeddings::Embedder;
use crate::store::VectorStore;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Loads PDFs, chunks them and stores the embedded chunks
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunk_config: ChunkConfig,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Ingestor {
            embedder,
            store,
            chunk_config: ChunkConfig::default(),
        }
    }

    pub fn with_chunk_config(mut self, chunk_config: ChunkConfig) -> Self {
        self.chunk_config = chunk_config;
        self
    }

    /// Ingest a PDF and return the id its chunks are stored under.
    ///
    /// Without an explicit id a fresh UUID is generated. Ingesting an id
    /// that already has chunks appends to them.
    pub async fn ingest(&self, pdf: Vec<u8>, document_id: Option<String>) -> Result<String> {
        let pages = load_pdf(pdf).await?;

        let document_id = document_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let chunks = split_pages(&pages, &document_id, &self.chunk_config);
        if chunks.is_empty() {
            return Err(anyhow!("PDF contains no extractable text"));
        }
        info!(
            "Split {} pages of {} into {} chunks",
            pages.len(),
            document_id,
            chunks.len()
        );

        self.store
            .ensure_index()
            .await
            .context("Failed to prepare vector index")?;

        self.store_chunks(&document_id, &chunks).await?;

        info!("Ingested document {}", document_id);
        Ok(document_id)
    }

    async fn store_chunks(&self, document_id: &str, chunks: &[TextChunk]) -> Result<()> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .await
            .context("Failed to embed chunks")?;

        if let Err(e) = self.store.upsert_chunks(chunks, &embeddings).await {
            // Earlier batches may already be stored under this id
            if let Err(cleanup) = self.store.delete_document(document_id).await {
                warn!(
                    "Failed to remove partial chunks of {}: {:#}",
                    document_id, cleanup
                );
            }
            return Err(e.context("Failed to store chunks"));
        }

        Ok(())
    }
}
