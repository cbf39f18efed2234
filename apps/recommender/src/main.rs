mod catalog;
mod cli;
mod config;
mod errors;
mod evaluation;
mod indexing;
mod llm_client;
mod models;
mod recommend;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use crate::catalog::crawler::{run_crawl, CrawlOptions, CrawlSettings};
use crate::catalog::fetcher::HttpFetcher;
use crate::catalog::store::{CatalogStore, CursorStore};
use crate::cli::{Cli, Command};
use crate::config::{Config, EmbeddingProvider, VectorBackend};
use crate::evaluation::{
    evaluate, load_queries, predict, write_predictions_csv, LabelledQuery, UnlabelledQuery,
};
use crate::indexing::embeddings::{Embedder, OpenAiEmbedder, QdrantInferenceEmbedder, RetryPolicy};
use crate::indexing::indexer::{rebuild_index, IndexSettings};
use crate::indexing::vector_store::{LocalIndex, QdrantIndex, VectorIndex};
use crate::llm_client::{ChatModel, LlmClient};
use crate::recommend::pipeline::{RecommendSettings, Recommender};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first; credentials are checked by the command that needs them
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Crawl { restart, max_pages } => crawl(config, restart, max_pages).await,
        Command::Index => index(config).await,
        Command::Evaluate { train, k } => {
            // raw retrieval only; no LLM credentials needed
            let embedder = build_embedder(&config)?;
            let index = build_vector_index(&config)?;
            let queries: Vec<LabelledQuery> = load_queries(&train)?;
            let report = evaluate(embedder.as_ref(), index.as_ref(), &queries, k).await?;
            info!(
                queries = report.per_query.len(),
                "Mean Recall@{}: {:.4}",
                report.k,
                report.mean_recall
            );
            Ok(())
        }
        Command::Predict { input, output } => {
            let recommender = build_recommender(&config)?;
            let queries: Vec<UnlabelledQuery> = load_queries(&input)?;
            let rows = predict(&recommender, &queries).await?;
            anyhow::ensure!(!rows.is_empty(), "no prediction rows to write");

            let file = std::fs::File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            write_predictions_csv(&rows, std::io::BufWriter::new(file))?;
            info!(rows = rows.len(), "Saved predictions to {}", output.display());
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting assessment recommender v{}", env!("CARGO_PKG_VERSION"));

    let recommender = build_recommender(&config)?;
    let state = AppState {
        recommender: Arc::new(recommender),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn crawl(config: Config, restart: bool, max_pages: Option<u32>) -> Result<()> {
    let fetcher = HttpFetcher::new(config.fetch_timeout)?;
    let settings = CrawlSettings {
        start_url: Url::parse(&config.catalog_start_url)
            .with_context(|| format!("CATALOG_START_URL '{}' is not a URL", config.catalog_start_url))?,
        page_size: config.crawl_page_size,
        max_pages: config.crawl_max_pages,
        max_consecutive_failures: config.crawl_max_consecutive_failures,
    };
    let catalog = CatalogStore::new(&config.catalog_path);
    let cursors = CursorStore::new(&config.cursor_path);

    let report = run_crawl(
        &fetcher,
        settings,
        &catalog,
        &cursors,
        CrawlOptions {
            restart,
            page_budget: max_pages,
        },
    )
    .await?;

    if !report.failed_pages.is_empty() {
        warn!(failed = ?report.failed_pages, "Some listing pages could not be fetched");
    }
    info!(
        resumed = report.resumed,
        pages = report.pages_visited,
        seen = report.records_seen,
        total = report.total_records,
        path = %catalog.path().display(),
        finished = report.finished,
        "Catalog written"
    );
    Ok(())
}

async fn index(config: Config) -> Result<()> {
    let records = CatalogStore::new(&config.catalog_path).load()?;
    anyhow::ensure!(
        !records.is_empty(),
        "catalog {} is empty; run `crawl` first",
        config.catalog_path.display()
    );

    let embedder = build_embedder(&config)?;
    let index = build_vector_index(&config)?;
    let settings = IndexSettings {
        batch_size: config.embed_batch_size,
        retry: RetryPolicy {
            max_attempts: config.embed_max_attempts,
            base_backoff: Duration::from_millis(config.embed_backoff_ms),
        },
    };

    let report = rebuild_index(&records, embedder.as_ref(), index.as_ref(), settings).await?;
    for skipped in &report.skipped {
        warn!(id = %skipped.id, reason = %skipped.reason, "Not indexed");
    }
    anyhow::ensure!(report.indexed > 0, "no record could be embedded");
    let stored = index.count().await?;
    anyhow::ensure!(
        stored == report.indexed,
        "index holds {stored} points after indexing {} records",
        report.indexed
    );
    info!(
        indexed = report.indexed,
        skipped = report.skipped.len(),
        dimension = ?report.dimension,
        "Index rebuilt"
    );
    Ok(())
}

fn build_recommender(config: &Config) -> Result<Recommender> {
    let llm: Arc<dyn ChatModel> = Arc::new(LlmClient::new(
        config.require_llm_api_key()?.to_string(),
        &config.llm_base_url,
        config.llm_model.clone(),
        config.llm_timeout,
    )?);
    info!("LLM client initialized (model: {})", llm.model_name());

    let embedder = build_embedder(config)?;
    let index = build_vector_index(config)?;
    let pages = Arc::new(HttpFetcher::new(config.fetch_timeout)?);

    Ok(Recommender::new(
        llm,
        embedder,
        index,
        pages,
        RecommendSettings::from_config(config),
    ))
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let api_key = config.require_embedding_api_key()?;
    let endpoint = config.embedding_endpoint();
    let embedder: Arc<dyn Embedder> = match config.embedding_provider {
        EmbeddingProvider::OpenAi => Arc::new(OpenAiEmbedder::new(
            api_key,
            &endpoint,
            config.embedding_model.clone(),
            config.embedding_dimensions,
            config.embedding_timeout,
            config.embed_batch_size,
        )?),
        EmbeddingProvider::Qdrant => Arc::new(QdrantInferenceEmbedder::new(
            api_key,
            &endpoint,
            config.embedding_model.clone(),
            config.embedding_timeout,
            config.embed_batch_size,
        )?),
    };
    info!("Embedding client initialized (model: {})", embedder.model_name());
    Ok(embedder)
}

fn build_vector_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.vector_backend {
        VectorBackend::Qdrant => {
            info!(
                "Vector index: Qdrant collection '{}' at {}",
                config.collection_name, config.qdrant_url
            );
            Arc::new(QdrantIndex::new(
                &config.qdrant_url,
                config.qdrant_api_key.as_deref(),
                config.collection_name.clone(),
                config.vector_timeout,
            )?)
        }
        VectorBackend::Local => {
            info!("Vector index: local file {}", config.local_index_path.display());
            Arc::new(LocalIndex::open(&config.local_index_path)?)
        }
    };
    Ok(index)
}
