use crate::chat::{ChatMessage, ChatModel};
use crate::embeddings::Embedder;
use crate::store::{RetrievedChunk, VectorStore};
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of chunks retrieved per question
pub const TOP_K: usize = 5;

/// Characters of chunk text kept in a citation snippet
pub const SNIPPET_CHARS: usize = 200;

pub const SYSTEM_PROMPT: &str = "You are a domain expert assistant that answers questions using the \
provided context. If the answer is not contained in the context, \
respond with 'I could not find that in the document.'";

/// A page reference returned alongside an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub page_number: usize,
    pub snippet: String,
}

impl SourceCitation {
    /// Cite a retrieved chunk: its page and the first characters of its text
    pub fn from_chunk(hit: &RetrievedChunk) -> Self {
        let head: String = hit.chunk.text.chars().take(SNIPPET_CHARS).collect();
        SourceCitation {
            page_number: hit.chunk.page_number,
            snippet: format!("{}...", head),
        }
    }
}

/// Generated answer with the chunks it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
}

/// Top-k search scoped to a single document
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    document_id: String,
    k: usize,
}

impl Retriever {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub async fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let query_embedding = self
            .embedder
            .embed_query(query)
            .await
            .context("Failed to embed question")?;

        let hits = self
            .store
            .search(&query_embedding, &self.document_id, self.k)
            .await?;
        debug!(
            "Retrieved {} chunks for document {}",
            hits.len(),
            self.document_id
        );
        Ok(hits)
    }
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl RagEngine {
    /// Create a new RAG engine
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        RagEngine {
            embedder,
            chat,
            store,
            top_k: TOP_K,
        }
    }

    /// Build a retriever over an existing index, filtered to one document
    pub async fn retriever_for(&self, document_id: &str) -> Result<Retriever> {
        if document_id.trim().is_empty() {
            return Err(anyhow!("Document id must not be empty"));
        }
        if !self.store.index_exists().await? {
            return Err(anyhow!("Vector index does not exist"));
        }

        Ok(Retriever {
            embedder: self.embedder.clone(),
            store: self.store.clone(),
            document_id: document_id.to_string(),
            k: self.top_k,
        })
    }

    /// Answer a question about one document
    pub async fn answer(
        &self,
        document_id: &str,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<Answer> {
        let retriever = self.retriever_for(document_id).await?;
        self.answer_with(&retriever, question, history).await
    }

    /// Answer a question using an already built retriever
    pub async fn answer_with(
        &self,
        retriever: &Retriever,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<Answer> {
        let hits = retriever.search(question).await?;

        let context = format_context(&hits);
        let messages = build_prompt(history, &context, question);

        let answer = self
            .chat
            .complete(&messages)
            .await
            .context("Failed to generate answer")?;

        info!(
            "Answered question about {} using {} chunks",
            retriever.document_id(),
            hits.len()
        );

        Ok(Answer {
            answer,
            sources: hits.iter().map(SourceCitation::from_chunk).collect(),
        })
    }
}

/// Join retrieved chunk texts into a single context block
pub fn format_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

/// System instruction, then prior turns, then the grounded question
pub fn build_prompt(history: &[ChatMessage], context: &str, question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(format!(
        "Context:\n{}\n\nQuestion: {}",
        context, question
    )));
    messages
}
