//! Noor CLI
//!
//! Command-line interface for migrations, collection management, indexing and search.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use noor::cache::{self, CacheLayer};
use noor::config::Config;
use noor::core::{CollectionSpec, Distance};
use noor::corpus::{CorpusLoader, HadithCatalog, JsonCorpusLoader, JsonDirectorySource};
use noor::database::{init_pool, init_pool_for_migrations, migrations, CorpusKind, CorpusStore};
use noor::embedding::create_provider;
use noor::retrieval::{RetrievalQuery, RetrievalState, Retriever};
use noor::vector::{self, CollectionReport, UploadReport, VectorStore};
use noor::{telemetry, VERSION};

#[derive(Parser)]
#[command(
    name = "noor",
    author = "Noor Contributors",
    version = VERSION,
    about = "Noor - retrieval over Quran, tafseer and hadith corpora",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the status of all services
    Status,

    /// Run database migrations
    Migrate,

    /// Manage vector collections
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Index a directory of hadith collection files
    IndexHadith {
        /// Directory holding `{collection}.json` files
        dir: PathBuf,
        /// Target vector collection
        #[arg(short, long, default_value = "hadith")]
        collection: String,
        /// Points per upload batch
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Index a JSON or JSON Lines file of `{id, text, metadata}` items
    IndexJson {
        file: PathBuf,
        /// Target vector collection
        #[arg(short, long)]
        collection: String,
        /// Points per upload batch
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Semantic search across vector collections
    Search {
        query: String,
        /// Collections to search (repeatable); defaults to the configured set
        #[arg(short, long)]
        collection: Vec<String>,
        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Substring search over hadith collection files
    Hadith {
        query: String,
        /// Directory holding `{collection}.json` files
        #[arg(short, long)]
        dir: PathBuf,
        /// Restrict to these collections (repeatable)
        #[arg(short, long)]
        collection: Vec<String>,
    },

    /// Full-text search over a PostgreSQL corpus table
    Corpus {
        /// quran, tafseer or miracles
        kind: CorpusKind,
        query: String,
        /// Restrict to one source (e.g. a tafseer name)
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Clear cached entries matching a glob pattern
    ClearCache {
        #[arg(default_value = "*")]
        pattern: String,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List collections
    List,
    /// Create a collection
    Create {
        name: String,
        /// Vector dimension; defaults to the embedding model's
        #[arg(short, long)]
        dimension: Option<u64>,
        /// cosine, euclid or dot
        #[arg(long, default_value = "cosine")]
        distance: Distance,
    },
    /// Show collection status
    Info { name: String },
    /// Delete a collection
    Delete { name: String },
    /// Create the standard corpus collections
    Init {
        #[arg(short, long)]
        dimension: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.logging);

    match cli.command {
        Commands::Status => check_status(&config).await,
        Commands::Migrate => run_migrations(&config).await,
        Commands::Collections { action } => manage_collections(&config, action).await,
        Commands::IndexHadith {
            dir,
            collection,
            batch_size,
        } => {
            let catalog = HadithCatalog::new(Arc::new(JsonDirectorySource::new(dir)));
            index_corpus(&config, &catalog, &collection, batch_size).await
        }
        Commands::IndexJson {
            file,
            collection,
            batch_size,
        } => index_corpus(&config, &JsonCorpusLoader::new(file), &collection, batch_size).await,
        Commands::Search {
            query,
            collection,
            limit,
            json,
        } => search(&config, query, collection, limit, json).await,
        Commands::Hadith {
            query,
            dir,
            collection,
        } => search_hadith(dir, &query, collection).await,
        Commands::Corpus {
            kind,
            query,
            source,
            limit,
        } => search_corpus(&config, kind, &query, source.as_deref(), limit).await,
        Commands::ClearCache { pattern } => clear_cache(&config, &pattern).await,
    }
}

fn ok(message: impl std::fmt::Display) {
    println!("   {} {}", style("✓").green(), message);
}

fn fail(message: impl std::fmt::Display) {
    println!("   {} {}", style("✗").red(), message);
}

async fn connect_cache(config: &Config) -> anyhow::Result<Arc<CacheLayer>> {
    Ok(Arc::new(cache::connect(config).await?))
}

async fn build_retriever(config: &Config) -> anyhow::Result<Retriever> {
    let cache = connect_cache(config).await?;
    let vectors = Arc::new(
        vector::connect(&config.storage.vector)
            .await?
            .with_cache(cache.clone()),
    );
    let embedder = create_provider(&config.embedding)?;
    Ok(Retriever::new(vectors, embedder, cache, config.retrieval.clone()))
}

// ============================================================================
// Status and migrations
// ============================================================================

async fn check_status(config: &Config) -> anyhow::Result<()> {
    println!("\n{}\n", style("Noor Service Status").cyan().bold());

    println!(
        "   Embedding: {} ({} dims)",
        style(&config.embedding.model).cyan(),
        config.embedding.dimensions
    );

    match &config.storage.postgres {
        Some(postgres) => match init_pool(postgres).await {
            Ok(_) => ok("PostgreSQL connected"),
            Err(e) => fail(format!("PostgreSQL: {}", e)),
        },
        None => println!("   {} PostgreSQL not configured", style("○").dim()),
    }

    match vector::connect(&config.storage.vector).await {
        Ok(store) => match store.health_check().await {
            Ok(()) => ok(format!("Vector store ({})", store.backend().name())),
            Err(e) => fail(format!("Vector store: {}", e)),
        },
        Err(e) => fail(format!("Vector store: {}", e)),
    }

    match cache::connect(config).await {
        Ok(layer) => {
            if layer.health_check().await {
                ok("Cache")
            } else {
                fail("Cache: persistent tier not responding")
            }
        }
        Err(e) => fail(format!("Cache: {}", e)),
    }

    println!();
    Ok(())
}

async fn run_migrations(config: &Config) -> anyhow::Result<()> {
    println!("Running database migrations...\n");

    let Some(postgres) = &config.storage.postgres else {
        bail!("PostgreSQL not configured for migrations (set DATABASE_URL)");
    };
    // migrations create the pgvector extension themselves
    let pool = init_pool_for_migrations(postgres).await?;
    migrations::run(&pool, config.embedding.dimensions).await?;

    println!("\n{} Migrations complete!", style("✅").green());
    Ok(())
}

// ============================================================================
// Collections
// ============================================================================

async fn manage_collections(config: &Config, action: CollectionAction) -> anyhow::Result<()> {
    let store = vector::connect(&config.storage.vector).await?;
    let default_dim = config.embedding.dimensions as u64;

    match action {
        CollectionAction::List => {
            let mut names: Vec<String> = store.list_collections(true).await.into_iter().collect();
            names.sort();
            if names.is_empty() {
                println!("No collections.");
            }
            for name in names {
                println!("  {}", name);
            }
        }
        CollectionAction::Create {
            name,
            dimension,
            distance,
        } => {
            let spec = CollectionSpec::new(&name, dimension.unwrap_or(default_dim), distance);
            if store.create_collection(&spec).await? {
                ok(format!("Collection {} ready", style(&name).cyan()));
            } else {
                fail(format!("Could not create {}", name));
            }
        }
        CollectionAction::Info { name } => print_report(&store, &name).await?,
        CollectionAction::Delete { name } => {
            let store = store.with_cache(connect_cache(config).await?);
            if store.delete_collection(&name).await? {
                ok(format!("Deleted {}", name));
            } else {
                println!("   {} {} did not exist", style("ℹ").blue(), name);
            }
        }
        CollectionAction::Init { dimension } => {
            let results = store
                .ensure_default_collections(dimension.unwrap_or(default_dim))
                .await;
            for (name, created) in results {
                if created {
                    ok(&name);
                } else {
                    fail(&name);
                }
            }
        }
    }
    Ok(())
}

async fn print_report(store: &VectorStore, name: &str) -> anyhow::Result<()> {
    let report: CollectionReport = store.get_collection_info(name).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_error() {
        bail!("No information for collection {}", name);
    }
    Ok(())
}

// ============================================================================
// Indexing and search
// ============================================================================

async fn index_corpus(
    config: &Config,
    loader: &dyn CorpusLoader,
    collection: &str,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    let retriever = build_retriever(config).await?;
    let dimension = retriever.embedder().dimensions() as u64;
    retriever
        .vectors()
        .create_collection(&vector::default_collection_spec(collection, dimension))
        .await?;

    let batch_size = batch_size.unwrap_or(config.storage.vector.upload_batch_size);
    let report = retriever.index_corpus(collection, loader, batch_size).await?;
    print_upload(collection, &report);
    Ok(())
}

fn print_upload(collection: &str, report: &UploadReport) {
    if report.is_complete() {
        ok(format!(
            "Indexed {} points into {} ({} batches)",
            report.committed_points,
            style(collection).cyan(),
            report.batches
        ));
    } else {
        fail(format!(
            "Indexed {}/{} points into {}; {} batches failed",
            report.committed_points,
            report.total_points,
            collection,
            report.failed_batches.len()
        ));
    }
}

async fn search(
    config: &Config,
    text: String,
    collections: Vec<String>,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let retriever = build_retriever(config).await?;
    let mut query = RetrievalQuery::new(text).in_collections(collections);
    query.limit = limit;

    let outcome = retriever.search(&query).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.state == RetrievalState::Failed {
        bail!(
            "Search failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".into())
        );
    }
    for failure in &outcome.failures {
        println!(
            "   {} {} unavailable: {}",
            style("⚠").yellow(),
            failure.collection,
            failure.error
        );
    }
    if outcome.results.is_empty() {
        println!("No results.");
    }
    for (i, hit) in outcome.results.iter().enumerate() {
        println!(
            "{:>3}. [{} {}] {:.3}",
            i + 1,
            style(&hit.source).cyan(),
            hit.id,
            hit.score
        );
        println!("     {}", hit.text);
    }
    Ok(())
}

async fn search_hadith(dir: PathBuf, query: &str, collections: Vec<String>) -> anyhow::Result<()> {
    let catalog = HadithCatalog::new(Arc::new(JsonDirectorySource::new(dir)));
    let filter = (!collections.is_empty()).then_some(collections.as_slice());
    let matches = catalog.search_hadith(query, filter).await?;

    println!("{} matches", style(matches.len()).green().bold());
    for m in matches {
        println!(
            "  [{} #{}] {}",
            style(&m.collection).cyan(),
            m.hadith.number,
            m.hadith.arab
        );
        if !m.hadith.reference.is_empty() {
            println!("      {}", style(&m.hadith.reference).dim());
        }
    }
    Ok(())
}

async fn search_corpus(
    config: &Config,
    kind: CorpusKind,
    query: &str,
    source: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let Some(postgres) = &config.storage.postgres else {
        bail!("PostgreSQL not configured (set DATABASE_URL)");
    };
    let pool = init_pool(postgres).await?;
    let store = CorpusStore::new(pool, connect_cache(config).await?);

    let hits = store.search(kind, query, source, limit).await?;
    if hits.is_empty() {
        println!("No results.");
    }
    for hit in hits {
        println!(
            "  [{} {}] {:.3} {}",
            style(kind).cyan(),
            hit.record.id,
            hit.rank,
            hit.record.text
        );
    }
    Ok(())
}

async fn clear_cache(config: &Config, pattern: &str) -> anyhow::Result<()> {
    let layer = cache::connect(config).await?;
    let cleared = layer.clear(pattern).await;
    ok(format!("Cleared {} entries matching {}", cleared, pattern));
    Ok(())
}
