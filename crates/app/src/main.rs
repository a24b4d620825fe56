use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bizkb_core::{
    default_sources, expand_pdf_dir, AcquirerConfig, Category, DocumentAcquirer, Embedder,
    HashEmbedder, IngestionPipeline, LopdfExtractor, PipelineConfig, ReqwestFetcher,
    RetrievalFacade, RetrievalOptions, SourceSpec, VectorStore, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_FETCH_TIMEOUT,
};

#[derive(Parser)]
#[command(name = "bizkb", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path of the vector store snapshot.
    #[arg(long, env = "BIZKB_STORE", default_value = "bizkb-store.json")]
    store: PathBuf,

    /// Embedding dimensions; must match the existing store.
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    dimensions: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire, chunk, embed, and index the configured sources.
    Ingest {
        /// JSON file holding the source list; built-in sources when omitted.
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Also ingest every PDF found under this directory.
        #[arg(long)]
        pdf_dir: Option<PathBuf>,

        /// Category assigned to PDFs from --pdf-dir.
        #[arg(long, default_value = "guidance")]
        pdf_category: Category,
    },
    /// Retrieve the passages most relevant to a question.
    Query {
        /// The question to answer.
        question: String,

        /// Number of passages to return.
        #[arg(long, default_value = "5")]
        top_k: usize,

        /// Restrict results to one category.
        #[arg(long)]
        category: Option<Category>,

        /// Minimum similarity score a passage must reach.
        #[arg(long, default_value_t = RetrievalOptions::default().min_score)]
        min_score: f32,

        /// Emit results as JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(cli.dimensions));
    let store = Arc::new(VectorStore::open(&cli.store, cli.dimensions, embedder.model_id()).await?);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = %cli.store.display(),
        records = store.len(),
        started_at = %Utc::now().to_rfc3339(),
        "bizkb boot"
    );

    match cli.command {
        Command::Ingest {
            sources,
            pdf_dir,
            pdf_category,
        } => {
            let mut specs = match sources {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(&path).await?;
                    serde_json::from_str::<Vec<SourceSpec>>(&raw)?
                }
                None => default_sources(),
            };
            if let Some(dir) = pdf_dir {
                specs.extend(expand_pdf_dir(&dir, pdf_category)?);
            }

            let acquirer = Arc::new(DocumentAcquirer::new(
                Arc::new(ReqwestFetcher::new(DEFAULT_FETCH_TIMEOUT)?),
                Arc::new(LopdfExtractor),
                AcquirerConfig::default(),
            ));
            let pipeline = IngestionPipeline::new(
                acquirer,
                embedder,
                Arc::clone(&store),
                PipelineConfig::default(),
            )?;

            info!(source_count = specs.len(), "ingesting sources");
            let report = pipeline.ingest(&specs).await?;

            for skipped in &report.skipped {
                warn!(source_id = %skipped.source_id, reason = %skipped.reason, "skipped source");
            }
            for failure in &report.chunk_failures {
                warn!(chunk_id = %failure.chunk_id, reason = %failure.reason, "chunk not embedded");
            }
            for source_id in &report.stale_sources {
                warn!(source_id = %source_id, "served from stale cache");
            }

            println!(
                "{} sources ingested, {} chunks indexed, {} skipped, {} stale at {}",
                report.sources_ingested,
                report.chunks_indexed,
                report.skipped.len(),
                report.stale_sources.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Query {
            question,
            top_k,
            category,
            min_score,
            json,
        } => {
            let facade = RetrievalFacade::new(
                store,
                embedder,
                RetrievalOptions {
                    min_score,
                    ..RetrievalOptions::default()
                },
            )?;
            let passages = facade.retrieve(&question, top_k, category).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&passages)?);
            } else if passages.is_empty() {
                println!("no passages matched");
            } else {
                for passage in passages {
                    println!(
                        "score={:.4} category={} source={}",
                        passage.score, passage.category, passage.source_id
                    );
                    println!("  {}", passage.text);
                }
            }
        }
    }

    Ok(())
}
