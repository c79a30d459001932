use crate::chunking::TextChunk;
use crate::embeddings::Embedding;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use std::cmp::Ordering;
use std::sync::RwLock;

/// A stored chunk returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// A vector index partitioned by document id
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the backing index if it is absent and wait until it is ready
    async fn ensure_index(&self) -> Result<()>;

    /// Check whether the backing index exists
    async fn index_exists(&self) -> Result<bool>;

    /// Append chunks with their embeddings. Returns the number stored.
    async fn upsert_chunks(&self, chunks: &[TextChunk], embeddings: &[Embedding])
        -> Result<usize>;

    /// Nearest chunks to `query`, restricted to one document
    async fn search(
        &self,
        query: &Embedding,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Remove every chunk tagged with `document_id`
    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

/// Reject batches that would break the index invariants
pub(crate) fn validate_batch(
    chunks: &[TextChunk],
    embeddings: &[Embedding],
    dimension: usize,
) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(anyhow!(
            "Got {} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        ));
    }
    if let Some(chunk) = chunks.iter().find(|c| c.document_id.is_empty()) {
        return Err(anyhow!(
            "Chunk from page {} has no document id",
            chunk.page_number
        ));
    }
    if let Some(embedding) = embeddings.iter().find(|e| e.dimension() != dimension) {
        return Err(anyhow!(
            "Embedding dimension {} does not match index dimension {}",
            embedding.dimension(),
            dimension
        ));
    }
    Ok(())
}

/// In-process vector store with brute-force cosine search.
///
/// Useful for local runs without a vector database. The index lives in one
/// process, so there is no namespace partition.
pub struct MemoryStore {
    dimension: usize,
    // None until the index is created
    points: RwLock<Option<Vec<(Embedding, TextChunk)>>>,
}

impl MemoryStore {
    pub fn new(dimension: usize) -> Self {
        MemoryStore {
            dimension,
            points: RwLock::new(None),
        }
    }

    /// Number of stored chunks
    pub fn len(&self) -> usize {
        self.points
            .read()
            .map(|points| points.as_ref().map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored chunks of one document, in insertion order
    pub fn document_chunks(&self, document_id: &str) -> Vec<TextChunk> {
        self.points
            .read()
            .map(|points| {
                points
                    .iter()
                    .flatten()
                    .filter(|(_, chunk)| chunk.document_id == document_id)
                    .map(|(_, chunk)| chunk.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_index(&self) -> Result<()> {
        let mut points = self
            .points
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        if points.is_none() {
            info!("Creating in-memory index (dimension {})", self.dimension);
            *points = Some(Vec::new());
        }
        Ok(())
    }

    async fn index_exists(&self) -> Result<bool> {
        let points = self
            .points
            .read()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        Ok(points.is_some())
    }

    async fn upsert_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Embedding],
    ) -> Result<usize> {
        validate_batch(chunks, embeddings, self.dimension)?;

        let mut points = self
            .points
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        let points = points
            .as_mut()
            .ok_or_else(|| anyhow!("Index does not exist"))?;

        points.extend(
            embeddings
                .iter()
                .cloned()
                .zip(chunks.iter().cloned()),
        );
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &Embedding,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let points = self
            .points
            .read()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        let points = points
            .as_ref()
            .ok_or_else(|| anyhow!("Index does not exist"))?;

        let mut hits: Vec<RetrievedChunk> = points
            .iter()
            .filter(|(_, chunk)| chunk.document_id == document_id)
            .map(|(embedding, chunk)| RetrievedChunk {
                chunk: chunk.clone(),
                score: query.cosine_similarity(embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut points = self
            .points
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        if let Some(points) = points.as_mut() {
            points.retain(|(_, chunk)| chunk.document_id != document_id);
        }
        Ok(())
    }
}
