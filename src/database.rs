use crate::chunking::TextChunk;
use crate::config::IndexConfig;
use crate::embeddings::Embedding;
use crate::store::{validate_batch, RetrievedChunk, VectorStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use qdrant_client::qdrant::{
    CollectionStatus, Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

const UPSERT_BATCH_SIZE: usize = 128;

const FIELD_TEXT: &str = "text";
const FIELD_DOC_ID: &str = "doc_id";
const FIELD_PAGE_NUMBER: &str = "page_number";
const FIELD_START_INDEX: &str = "start_index";
const FIELD_NAMESPACE: &str = "namespace";

/// Vector store backed by a single Qdrant collection
pub struct QdrantStore {
    client: Qdrant,
    config: IndexConfig,
}

impl QdrantStore {
    /// Create a new Qdrant client
    pub fn new(config: IndexConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key.clone() {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .with_context(|| format!("Failed to connect to Qdrant at {}", config.url))?;

        Ok(QdrantStore { client, config })
    }

    fn collection(&self) -> &str {
        &self.config.index_name
    }

    /// Create the collection and its payload index
    async fn create_collection(&self) -> Result<()> {
        let collection_name = self.collection();
        info!(
            "Creating collection '{}' (dimension {})",
            collection_name, self.config.dimension
        );

        let create_collection = CreateCollectionBuilder::new(collection_name).vectors_config(
            VectorParamsBuilder::new(self.config.dimension as u64, Distance::Cosine),
        );

        if let Err(e) = self.client.create_collection(create_collection).await {
            // Another request may have created it in the meantime
            if self.index_exists().await? {
                debug!("Collection '{}' already created: {}", collection_name, e);
                return Ok(());
            }
            return Err(anyhow!(
                "Failed to create collection {}: {}",
                collection_name,
                e
            ));
        }

        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    collection_name,
                    FIELD_DOC_ID,
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await
            .with_context(|| format!("Failed to index {} in {}", FIELD_DOC_ID, collection_name))?;

        Ok(())
    }

    /// Poll the collection status until it reports green
    async fn wait_until_ready(&self) -> Result<()> {
        let client = &self.client;
        let collection_name = self.collection();

        poll_until_ready(
            collection_name,
            self.config.ready_max_attempts,
            self.config.ready_interval,
            move || async move {
                let info = client
                    .collection_info(collection_name)
                    .await
                    .with_context(|| format!("Failed to describe collection {}", collection_name))?;
                Ok::<_, anyhow::Error>(info.result.map(|r| r.status).unwrap_or_default())
            },
        )
        .await
    }
}

/// Call `fetch_status` up to `max_attempts` times until it reports green,
/// sleeping `interval` between attempts. Fetch errors end the poll.
async fn poll_until_ready<F, Fut>(
    collection_name: &str,
    max_attempts: u32,
    interval: Duration,
    mut fetch_status: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<i32>>,
{
    for attempt in 1..=max_attempts {
        if fetch_status().await? == CollectionStatus::Green as i32 {
            info!("Collection '{}' is ready", collection_name);
            return Ok(());
        }

        debug!(
            "Collection '{}' not ready (attempt {}/{})",
            collection_name, attempt, max_attempts
        );
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(anyhow!(
        "Collection {} not ready after {} attempts",
        collection_name,
        max_attempts
    ))
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_index(&self) -> Result<()> {
        if self.index_exists().await? {
            return Ok(());
        }
        self.create_collection().await?;
        self.wait_until_ready().await
    }

    async fn index_exists(&self) -> Result<bool> {
        self.client
            .collection_exists(self.collection())
            .await
            .with_context(|| format!("Failed to check collection {}", self.collection()))
    }

    async fn upsert_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Embedding],
    ) -> Result<usize> {
        validate_batch(chunks, embeddings, self.config.dimension)?;
        let collection_name = self.collection();

        for (batch_idx, (chunk_batch, embedding_batch)) in chunks
            .chunks(UPSERT_BATCH_SIZE)
            .zip(embeddings.chunks(UPSERT_BATCH_SIZE))
            .enumerate()
        {
            let points = chunk_batch
                .iter()
                .zip(embedding_batch.iter())
                .map(|(chunk, embedding)| {
                    PointStruct::new(
                        Uuid::new_v4().to_string(),
                        embedding.values.clone(),
                        chunk_payload(chunk, self.config.namespace.as_deref()),
                    )
                })
                .collect::<Vec<PointStruct>>();

            debug!(
                "Upserting batch {} ({} points) into {}",
                batch_idx + 1,
                points.len(),
                collection_name
            );

            self.client
                .upsert_points(UpsertPointsBuilder::new(collection_name, points).wait(true))
                .await
                .with_context(|| {
                    format!("Failed to upsert points in collection {}", collection_name)
                })?;
        }

        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &Embedding,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let collection_name = self.collection();

        let search_request =
            SearchPointsBuilder::new(collection_name, query.values.clone(), limit as u64)
                .filter(document_filter(document_id, self.config.namespace.as_deref()))
                .with_payload(true);

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", collection_name))?;

        let hits = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let chunk = chunk_from_payload(&scored_point.payload)?;
                Some(RetrievedChunk {
                    chunk,
                    score: scored_point.score,
                })
            })
            .filter(|hit| hit.chunk.document_id == document_id)
            .collect();

        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let collection_name = self.collection();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection_name)
                    .points(document_filter(
                        document_id,
                        self.config.namespace.as_deref(),
                    ))
                    .wait(true),
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to delete document {} from {}",
                    document_id, collection_name
                )
            })?;

        Ok(())
    }
}

/// Equality filter on the document id, and on the namespace when one is set
fn document_filter(document_id: &str, namespace: Option<&str>) -> Filter {
    let mut conditions = vec![Condition::matches(FIELD_DOC_ID, document_id.to_string())];
    if let Some(namespace) = namespace {
        conditions.push(Condition::matches(FIELD_NAMESPACE, namespace.to_string()));
    }
    Filter::must(conditions)
}

fn chunk_payload(chunk: &TextChunk, namespace: Option<&str>) -> HashMap<String, Value> {
    let mut payload = HashMap::from([
        (FIELD_TEXT.to_string(), Value::from(chunk.text.clone())),
        (FIELD_DOC_ID.to_string(), Value::from(chunk.document_id.clone())),
        (
            FIELD_PAGE_NUMBER.to_string(),
            Value::from(chunk.page_number as i64),
        ),
        (
            FIELD_START_INDEX.to_string(),
            Value::from(chunk.start_index as i64),
        ),
    ]);
    if let Some(namespace) = namespace {
        payload.insert(FIELD_NAMESPACE.to_string(), Value::from(namespace.to_string()));
    }
    payload
}

fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<TextChunk> {
    let text = payload.get(FIELD_TEXT)?.as_str()?;
    let document_id = payload.get(FIELD_DOC_ID)?.as_str()?;

    let page_number = payload
        .get(FIELD_PAGE_NUMBER)
        .and_then(|v| v.as_integer())
        .map(|v| v as usize)
        .unwrap_or(0);
    if page_number == 0 {
        warn!("Stored chunk of {} has no page number", document_id);
    }

    let start_index = payload
        .get(FIELD_START_INDEX)
        .and_then(|v| v.as_integer())
        .map(|v| v as usize)
        .unwrap_or(0);

    Some(TextChunk {
        text: text.to_string(),
        document_id: document_id.to_string(),
        page_number,
        start_index,
    })
}
