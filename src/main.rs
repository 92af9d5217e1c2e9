//! Binary entry point for manga-graph.
//!
//! Thin command-line glue over the library services.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use manga_graph::config::MangaGraphConfig;
use manga_graph::io::{InputFormat, LoadedRecords, load_records};
use manga_graph::models::{EntityId, EntityType, RelatedBy, SourceRecord};
use manga_graph::observability::{self, LoggingConfig, MetricsConfig, ObservabilityConfig};
use manga_graph::services::{
    DeduplicationMigrator, GraphIngestor, GraphSearchEngine, IngestReport, NameNormalizer,
    RebuildConfirmation,
};
use manga_graph::storage::{GraphBackend, ResilientGraphBackend, SqliteGraphBackend};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

type Backend = ResilientGraphBackend<SqliteGraphBackend>;

/// manga-graph - Bibliographic graph of manga works, authors, and magazines.
#[derive(Parser)]
#[command(name = "manga-graph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the graph database (overrides configuration).
    #[arg(long, global = true, env = "MANGA_GRAPH_DB_PATH")]
    db: Option<PathBuf>,

    /// Print recorded metrics after the command finishes.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import records into the graph.
    Import {
        /// Input files.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Input format: jsonld or catalog. Detected from the extension if omitted.
        #[arg(short, long)]
        format: Option<InputFormat>,

        /// Worker threads (defaults to the configured value).
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Report or merge nodes sharing a display name.
    Dedup {
        /// Entity type: author, publisher, magazine, or work.
        #[arg(short, long)]
        entity_type: EntityType,

        /// Only report duplicates, do not merge.
        #[arg(long)]
        dry_run: bool,
    },

    /// Merge spelling variants of one work title.
    MergeTitle {
        /// Canonical title to keep.
        title: String,
    },

    /// Re-apply name normalization to stored names.
    Normalize {
        /// Entity type: author or publisher.
        #[arg(short, long)]
        entity_type: EntityType,
    },

    /// Delete every node and relationship, then import the given files.
    Rebuild {
        /// Confirm the graph may be cleared.
        #[arg(long)]
        yes: bool,

        /// Files to import after clearing. Omit to leave the graph empty.
        files: Vec<PathBuf>,

        /// Input format: jsonld or catalog. Detected from the extension if omitted.
        #[arg(short, long)]
        format: Option<InputFormat>,

        /// Worker threads (defaults to the configured value).
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Search the graph and print the subgraph as JSON.
    Search {
        /// Search term.
        term: String,

        /// Expansion depth (defaults to the configured value).
        #[arg(short, long)]
        depth: Option<u32>,
    },

    /// List series whose volume titles contain the term, as JSON.
    Series {
        /// Title search term.
        term: String,

        /// Maximum series to list (defaults to the configured value).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List works sharing an author, publisher, or magazine with a work, as JSON.
    Related {
        /// Work id.
        work_id: String,

        /// Shared neighbor: author, publisher, or magazine.
        #[arg(short, long, default_value = "author")]
        by: RelatedBy,

        /// Maximum works to list (defaults to the configured value).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show node and relationship counts.
    Stats,
}

fn main() -> ExitCode {
    // Missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let mut metrics = MetricsConfig::from_settings(Some(&config.observability));
    metrics.enabled |= cli.metrics;
    let observability = match observability::init(ObservabilityConfig {
        logging: LoggingConfig::from_settings(Some(&config.observability), cli.verbose),
        metrics,
    }) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let show_metrics = cli.metrics;
    let result = run_command(cli.command, &config);

    if show_metrics {
        if let Some(rendered) = observability.render_metrics() {
            print!("{rendered}");
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration, then applies env and command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<MangaGraphConfig> {
    let config = match &cli.config {
        Some(path) => MangaGraphConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => MangaGraphConfig::load_default(),
    };
    let config = config.with_env_overrides();

    Ok(match &cli.db {
        Some(db) => config.with_db_path(db),
        None => config,
    })
}

/// Runs the selected command.
fn run_command(command: Commands, config: &MangaGraphConfig) -> anyhow::Result<()> {
    let backend = open_backend(config)?;

    match command {
        Commands::Import {
            files,
            format,
            workers,
        } => cmd_import(backend, config, &files, format, workers),
        Commands::Dedup {
            entity_type,
            dry_run,
        } => cmd_dedup(backend, config, entity_type, dry_run),
        Commands::MergeTitle { title } => cmd_merge_title(backend, config, &title),
        Commands::Normalize { entity_type } => cmd_normalize(backend, config, entity_type),
        Commands::Rebuild {
            yes,
            files,
            format,
            workers,
        } => cmd_rebuild(backend, config, yes, &files, format, workers),
        Commands::Search { term, depth } => cmd_search(backend, config, &term, depth),
        Commands::Series { term, limit } => cmd_series(backend, config, &term, limit),
        Commands::Related { work_id, by, limit } => {
            cmd_related(backend, config, &EntityId::new(work_id), by, limit)
        },
        Commands::Stats => cmd_stats(&backend),
    }
}

fn open_backend(config: &MangaGraphConfig) -> anyhow::Result<Arc<Backend>> {
    let path = config.database_path();
    let sqlite = SqliteGraphBackend::new(&path)
        .with_context(|| format!("opening graph database {}", path.display()))?;
    Ok(Arc::new(ResilientGraphBackend::new(
        sqlite,
        config.ingest.retry.clone(),
        "sqlite",
    )))
}

fn normalizer(config: &MangaGraphConfig) -> NameNormalizer {
    NameNormalizer::with_config(config.normalization.clone())
}

fn migrator(backend: Arc<Backend>, config: &MangaGraphConfig) -> DeduplicationMigrator<Backend> {
    DeduplicationMigrator::with_shared_backend(backend).with_normalizer(normalizer(config))
}

/// One input file, parsed.
struct LoadedFile<'a> {
    path: &'a Path,
    records: LoadedRecords,
}

/// Parses every file before anything is written.
fn load_files(files: &[PathBuf], format: Option<InputFormat>) -> anyhow::Result<Vec<LoadedFile<'_>>> {
    files
        .iter()
        .map(|file| {
            let format = match format {
                Some(format) => format,
                None => InputFormat::from_path(file)?,
            };
            let records = load_records(format, file)
                .with_context(|| format!("loading {} as {format}", file.display()))?;
            Ok(LoadedFile { path: file, records })
        })
        .collect()
}

/// Imports every file, then prints a summary.
fn cmd_import(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    files: &[PathBuf],
    format: Option<InputFormat>,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let loaded = load_files(files, format)?;
    import_loaded(backend, config, &loaded, workers)
}

fn import_loaded(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    loaded: &[LoadedFile<'_>],
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let ingestor = GraphIngestor::with_shared_backend(backend).with_normalizer(normalizer(config));
    let workers = workers.unwrap_or(config.ingest.workers).max(1);
    let mut total = IngestReport::default();
    let mut dropped = 0;

    for file in loaded {
        dropped += file.records.dropped;
        let report = ingest(&ingestor, &file.records.records, workers)
            .with_context(|| format!("ingesting {}", file.path.display()))?;
        println!(
            "{}: {} records, {} works, {} magazines, {} skipped",
            file.path.display(),
            report.records_seen,
            report.works_ingested,
            report.magazines_ingested,
            report.skipped()
        );
        total.merge(&report);
    }

    println!(
        "Imported {} records: {} entities created, {} updated, {} relationships created",
        total.records_seen, total.entities_created, total.entities_updated, total.relationships_created
    );
    if total.skipped() > 0 || dropped > 0 || total.degenerate_names > 0 {
        println!(
            "Skipped: {} unrecognized, {} malformed, {} unreadable items, {} empty names",
            total.skipped_unrecognized, total.skipped_malformed, dropped, total.degenerate_names
        );
    }
    Ok(())
}

fn ingest(
    ingestor: &GraphIngestor<Backend>,
    records: &[SourceRecord],
    workers: usize,
) -> manga_graph::Result<IngestReport> {
    if workers > 1 {
        ingestor.ingest_concurrent(records, workers)
    } else {
        ingestor.ingest(records)
    }
}

fn cmd_dedup(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    entity_type: EntityType,
    dry_run: bool,
) -> anyhow::Result<()> {
    let migrator = migrator(backend, config);

    if dry_run {
        let report = migrator.find_duplicates(entity_type)?;
        if report.is_clean() {
            println!("No duplicate {entity_type} nodes.");
            return Ok(());
        }
        for group in &report.groups {
            println!("{} ({} nodes, keeps {})", group.name, group.len(), group.survivor);
        }
        println!("{} duplicate {entity_type} nodes would be merged.", report.duplicate_count());
        return Ok(());
    }

    let merged = migrator.merge_duplicates(entity_type)?;
    println!("Merged {merged} duplicate {entity_type} nodes.");
    Ok(())
}

fn cmd_merge_title(backend: Arc<Backend>, config: &MangaGraphConfig, title: &str) -> anyhow::Result<()> {
    let merged = migrator(backend, config).merge_title_variants(title)?;
    println!("Merged {merged} variants into '{title}'.");
    Ok(())
}

fn cmd_normalize(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    entity_type: EntityType,
) -> anyhow::Result<()> {
    let changed = migrator(backend, config).renormalize_names(entity_type)?;
    println!("Renamed {changed} {entity_type} nodes.");
    if changed > 0 {
        println!("Run `manga-graph dedup --entity-type {entity_type}` to merge any new duplicates.");
    }
    Ok(())
}

/// Clears the graph, then re-imports `files` under the same migration lock.
fn cmd_rebuild(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    yes: bool,
    files: &[PathBuf],
    format: Option<InputFormat>,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let confirmation = RebuildConfirmation::from_flag(yes);
    if confirmation != RebuildConfirmation::Confirmed {
        anyhow::bail!("pass --yes to clear the graph");
    }

    // Parse first so a bad file leaves the graph untouched
    let loaded = load_files(files, format)?;
    migrator(Arc::clone(&backend), config).rebuild_then(confirmation, || {
        println!("Graph cleared.");
        if loaded.is_empty() {
            return Ok(());
        }
        import_loaded(Arc::clone(&backend), config, &loaded, workers)
    })
}

fn cmd_search(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    term: &str,
    depth: Option<u32>,
) -> anyhow::Result<()> {
    let engine = GraphSearchEngine::with_shared_backend(backend).with_config(config.search);
    let result = match depth {
        Some(depth) => engine.search(term, depth)?,
        None => engine.search_default(term)?,
    };
    let json = serde_json::to_string_pretty(&result.into_response())?;
    println!("{json}");
    Ok(())
}

fn engine(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    limit: Option<usize>,
) -> GraphSearchEngine<Backend> {
    let mut search = config.search;
    if let Some(limit) = limit {
        search.result_limit = limit;
    }
    GraphSearchEngine::with_shared_backend(backend).with_config(search)
}

fn cmd_series(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    term: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let series = engine(backend, config, limit).search_series(term)?;
    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

fn cmd_related(
    backend: Arc<Backend>,
    config: &MangaGraphConfig,
    work_id: &EntityId,
    by: RelatedBy,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let related = engine(backend, config, limit).related_works(work_id, by)?;
    println!("{}", serde_json::to_string_pretty(&related)?);
    Ok(())
}

fn cmd_stats(backend: &Backend) -> anyhow::Result<()> {
    let stats = backend.get_stats()?;

    println!("Entities: {}", stats.entity_count);
    for entity_type in EntityType::all() {
        println!("  {:<10} {}", entity_type.as_str(), stats.entities_of(*entity_type));
    }
    println!("Relationships: {}", stats.relationship_count);
    for (relationship_type, count) in &stats.relationships_by_type {
        println!("  {:<12} {count}", relationship_type.as_str());
    }
    Ok(())
}
