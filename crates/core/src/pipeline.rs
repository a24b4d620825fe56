use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::acquire::DocumentAcquirer;
use crate::chunking::chunk_document;
use crate::embeddings::Embedder;
use crate::error::{EmbedError, StoreError};
use crate::models::{ChunkingOptions, EmbeddingRecord, SourceDocument, SourceSpec};
use crate::store::VectorStore;

/// One chunk that could not be embedded. The rest of its document still
/// proceeds.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub ordinal: usize,
    pub reason: String,
}

/// The embedded chunks of one document plus whatever failed.
#[derive(Debug)]
pub struct DocumentEmbedding {
    pub records: Vec<EmbeddingRecord>,
    pub failures: Vec<ChunkFailure>,
}

/// Chunks a document and embeds the chunks concurrently.
///
/// A transient embedding failure is retried once; a second failure is
/// recorded against the chunk and the remaining chunks continue. A
/// vector of the wrong arity is never allowed through.
pub struct ChunkEmbedder {
    embedder: Arc<dyn Embedder>,
    options: ChunkingOptions,
}

impl ChunkEmbedder {
    pub fn new(embedder: Arc<dyn Embedder>, options: ChunkingOptions) -> Self {
        Self { embedder, options }
    }

    pub async fn process(&self, document: &SourceDocument) -> DocumentEmbedding {
        let chunks = chunk_document(document, &self.options);
        let expected = self.embedder.dimensions();

        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let embedder = Arc::clone(&self.embedder);
            tasks.spawn(async move {
                let result = embed_with_retry(embedder.as_ref(), &chunk.text, expected).await;
                (chunk, result)
            });
        }

        let mut ordered: Vec<(usize, EmbeddingRecord)> = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chunk, Ok(vector))) => ordered.push((
                    chunk.ordinal,
                    EmbeddingRecord {
                        chunk_id: chunk.chunk_id,
                        vector,
                        text: chunk.text,
                        category: chunk.category,
                        source_id: chunk.source_id,
                    },
                )),
                Ok((chunk, Err(error))) => failures.push(ChunkFailure {
                    chunk_id: chunk.chunk_id,
                    ordinal: chunk.ordinal,
                    reason: error.to_string(),
                }),
                Err(join_error) => failures.push(ChunkFailure {
                    chunk_id: String::new(),
                    ordinal: usize::MAX,
                    reason: join_error.to_string(),
                }),
            }
        }

        // Tasks complete in arbitrary order; restore document order so
        // store insertion order follows chunk ordinals.
        ordered.sort_by_key(|(ordinal, _)| *ordinal);
        failures.sort_by_key(|failure| failure.ordinal);
        DocumentEmbedding {
            records: ordered.into_iter().map(|(_, record)| record).collect(),
            failures,
        }
    }
}

async fn embed_with_retry(
    embedder: &dyn Embedder,
    text: &str,
    expected: usize,
) -> Result<Vec<f32>, EmbedError> {
    let vector = match embedder.embed(text).await {
        Ok(vector) => vector,
        Err(_transient) => embedder.embed(text).await?,
    };
    if vector.len() != expected {
        return Err(EmbedError::WrongArity {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// A source that was left untouched in the store this run, with why.
#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub source_id: String,
    pub reason: String,
}

/// Outcome summary of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub sources_ingested: usize,
    pub chunks_indexed: usize,
    pub chunk_failures: Vec<ChunkFailure>,
    pub skipped: Vec<SkippedSource>,
    pub stale_sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingOptions,
    /// Sources processed at once; acquisition and embedding for
    /// different sources overlap up to this bound.
    pub max_concurrent_sources: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            max_concurrent_sources: 4,
        }
    }
}

enum SourceOutcome {
    Ingested {
        source_id: String,
        chunks: usize,
        failures: Vec<ChunkFailure>,
        stale: bool,
    },
    Skipped(SkippedSource),
}

/// End-to-end ingestion: acquire, chunk, embed, upsert, per source.
///
/// A source that fails to acquire or embed is skipped and its previous
/// records stay in the store; a dimension mismatch against the store is
/// a configuration bug and aborts the run.
pub struct IngestionPipeline {
    acquirer: Arc<DocumentAcquirer>,
    chunk_embedder: Arc<ChunkEmbedder>,
    store: Arc<VectorStore>,
    limiter: Arc<Semaphore>,
}

impl IngestionPipeline {
    pub fn new(
        acquirer: Arc<DocumentAcquirer>,
        embedder: Arc<dyn Embedder>,
        store: Arc<VectorStore>,
        config: PipelineConfig,
    ) -> Result<Self, StoreError> {
        if store.dimensions() != embedder.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: store.dimensions(),
                actual: embedder.dimensions(),
            });
        }
        if store.embedder_model() != embedder.model_id() {
            return Err(StoreError::ModelMismatch {
                stored: store.embedder_model().to_string(),
                configured: embedder.model_id().to_string(),
            });
        }
        Ok(Self {
            acquirer,
            chunk_embedder: Arc::new(ChunkEmbedder::new(embedder, config.chunking)),
            store,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_sources.max(1))),
        })
    }

    pub async fn ingest(&self, specs: &[SourceSpec]) -> Result<IngestionReport, StoreError> {
        let mut tasks = JoinSet::new();
        for spec in specs.iter().cloned() {
            let acquirer = Arc::clone(&self.acquirer);
            let chunk_embedder = Arc::clone(&self.chunk_embedder);
            let store = Arc::clone(&self.store);
            let limiter = Arc::clone(&self.limiter);
            tasks.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .expect("ingestion limiter closed");
                ingest_one(&acquirer, &chunk_embedder, &store, &spec).await
            });
        }

        let mut report = IngestionReport::default();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome?,
                Err(join_error) => {
                    return Err(StoreError::Io(std::io::Error::other(join_error)));
                }
            };
            match outcome {
                SourceOutcome::Ingested {
                    source_id,
                    chunks,
                    failures,
                    stale,
                } => {
                    report.sources_ingested += 1;
                    report.chunks_indexed += chunks;
                    report.chunk_failures.extend(failures);
                    if stale {
                        report.stale_sources.push(source_id);
                    }
                }
                SourceOutcome::Skipped(skipped) => report.skipped.push(skipped),
            }
        }

        report.skipped.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        report.stale_sources.sort();
        Ok(report)
    }

    /// Drops the cached payload and re-ingests one source.
    pub async fn refresh(&self, spec: &SourceSpec) -> Result<IngestionReport, StoreError> {
        self.acquirer.invalidate(spec).await;
        self.ingest(std::slice::from_ref(spec)).await
    }
}

async fn ingest_one(
    acquirer: &DocumentAcquirer,
    chunk_embedder: &ChunkEmbedder,
    store: &VectorStore,
    spec: &SourceSpec,
) -> Result<SourceOutcome, StoreError> {
    let acquired = match acquirer.acquire(spec).await {
        Ok(acquired) => acquired,
        Err(error) => {
            return Ok(SourceOutcome::Skipped(SkippedSource {
                source_id: spec.source_id().to_string(),
                reason: error.to_string(),
            }));
        }
    };

    let mut embedded = chunk_embedder.process(&acquired.document).await;
    let mut failures = std::mem::take(&mut embedded.failures);

    if embedded.records.is_empty() {
        // Upserting nothing would wipe the source's previous records,
        // so a fully failed document is left alone instead.
        let reason = failures
            .first()
            .map(|failure| failure.reason.clone())
            .unwrap_or_else(|| "document produced no chunks".to_string());
        return Ok(SourceOutcome::Skipped(SkippedSource {
            source_id: spec.source_id().to_string(),
            reason,
        }));
    }

    let mut chunks = embedded.records.len();
    store.upsert(spec.source_id(), embedded.records).await?;

    // Harvested links become a companion document so the resource list
    // itself is retrievable. A page that stops carrying links drops its
    // companion, the same replace-not-linger rule as the page's own
    // chunks.
    if !acquired.links.is_empty() {
        let links_spec = links_companion(spec, &acquired);
        if let Ok(companion) = acquirer.acquire(&links_spec).await {
            let mut link_embedding = chunk_embedder.process(&companion.document).await;
            failures.append(&mut link_embedding.failures);
            if !link_embedding.records.is_empty() {
                chunks += link_embedding.records.len();
                store
                    .upsert(links_spec.source_id(), link_embedding.records)
                    .await?;
            }
        }
    } else if matches!(spec, SourceSpec::ScrapedPage { .. }) {
        store
            .delete(&format!("{}::links", spec.source_id()))
            .await?;
    }

    Ok(SourceOutcome::Ingested {
        source_id: spec.source_id().to_string(),
        chunks,
        failures,
        stale: acquired.is_stale,
    })
}

fn links_companion(spec: &SourceSpec, acquired: &crate::acquire::Acquired) -> SourceSpec {
    let lines: Vec<String> = acquired
        .links
        .iter()
        .map(|link| format!("{} ({}): {}", link.title, link.category, link.url))
        .collect();
    SourceSpec::seed(
        format!("{}::links", spec.source_id()),
        "Helpful resources",
        lines.join("\n"),
        spec.category(),
    )
}
