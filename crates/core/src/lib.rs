pub mod acquire;
pub mod cache;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod scrape;
pub mod seeds;
pub mod store;

pub use acquire::{expand_pdf_dir, Acquired, AcquirerConfig, DocumentAcquirer};
pub use cache::{Clock, Fetched, FreshnessCache, SystemClock, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
pub use chunking::{chunk_document, make_chunk_id, normalize_whitespace};
pub use embeddings::{Embedder, HashEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AcquireError, EmbedError, RetrieveError, StoreError};
pub use extractor::{join_pages, LopdfExtractor, PageText, PdfExtract};
pub use fetch::{HttpFetch, ReqwestFetcher, DEFAULT_FETCH_TIMEOUT};
pub use models::{
    derive_source_id, Category, Chunk, ChunkingOptions, EmbeddingRecord, OriginKind,
    ResourceLink, RetrievalOptions, RetrievedPassage, SourceDocument, SourceSpec,
};
pub use pipeline::{
    ChunkEmbedder, ChunkFailure, DocumentEmbedding, IngestionPipeline, IngestionReport,
    PipelineConfig, SkippedSource,
};
pub use retrieval::RetrievalFacade;
pub use scrape::{extract_page, PageContent, ScrapeConfig};
pub use seeds::{default_sources, seed_sources};
pub use store::{cosine_score, VectorStore};
