#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_rag_chat::chat::{ChatMessage, ChatModel};
use pdf_rag_chat::chunking::TextChunk;
use pdf_rag_chat::embeddings::{Embedder, Embedding};
use pdf_rag_chat::store::{MemoryStore, RetrievedChunk, VectorStore};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DIMENSION: usize = 256;

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket
#[derive(Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Embedding {
        let mut values = vec![0.0f32; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            values[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
        }
        Embedding::new(values)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vectorize(text))
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
        Err(anyhow!("embedding service unavailable"))
    }

    async fn embed_query(&self, _text: &str) -> Result<Embedding> {
        Err(anyhow!("embedding service unavailable"))
    }
}

/// Chat model that records prompts and replies with a fixed answer
#[derive(Default)]
pub struct RecordingChat {
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingChat {
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        Ok("The answer is on page 2.".to_string())
    }
}

pub struct FailingChat;

#[async_trait]
impl ChatModel for FailingChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(anyhow!("model overloaded"))
    }
}

/// Writes every batch, then reports a failure, like a store that dies mid-upload
pub struct FlakyStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn ensure_index(&self) -> Result<()> {
        self.inner.ensure_index().await
    }

    async fn index_exists(&self) -> Result<bool> {
        self.inner.index_exists().await
    }

    async fn upsert_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Embedding],
    ) -> Result<usize> {
        self.inner.upsert_chunks(chunks, embeddings).await?;
        Err(anyhow!("connection reset during upsert"))
    }

    async fn search(
        &self,
        query: &Embedding,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        self.inner.search(query, document_id, limit).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.inner.delete_document(document_id).await
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(DIMENSION))
}

/// Words cycling through a fixed vocabulary, `len` characters or just under
pub fn text_from(vocabulary: &[&str], len: usize) -> String {
    let mut text = String::new();
    for word in vocabulary.iter().cycle() {
        if text.len() + word.len() + 1 > len {
            break;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(word);
    }
    text
}

/// Build a PDF with one page per entry, text laid out in short lines
pub fn build_pdf(pages: &[String]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => Object::Reference(font_id),
        },
    });

    let mut kids = Vec::new();
    for page_text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(8)]),
            Operation::new("Td", vec![Object::Integer(20), Object::Integer(820)]),
        ];
        for line in wrap(page_text, 90) {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(0), Object::Integer(-10)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub const BOUNDARY: &str = "pdf-rag-chat-boundary";

/// Single-part multipart request to /upload-pdf
pub fn upload_request(
    field_name: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field_name, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload-pdf")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}
