//! pubchem-resolver CLI
//!
//! Command-line interface for the name index and pc_fetch client:
//! - Ingest PubChem XML into the persisted index
//! - Match free-text names against it
//! - Resolve names to substance or compound identifiers
//! - Fetch records in bulk from pc_fetch

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pubchem_resolver::config::{generate_default_config, Config};
use pubchem_resolver::index::IndexPaths;
use pubchem_resolver::retrieval::{CancelToken, FetchJob, RetrievalClient};
use pubchem_resolver::{AmbiguityPolicy, Catalog, MatchOutcome, MatchResult, RecordKind, Resolution, RetrieveMode};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pubchem-resolver")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve chemical names to PubChem identifiers and fetch their records")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Names index file; requires --substance-ids and --compound-ids
    #[arg(long, global = true)]
    pub names: Option<PathBuf>,

    /// Substance identifier file
    #[arg(long, global = true)]
    pub substance_ids: Option<PathBuf>,

    /// Compound identifier file
    #[arg(long, global = true)]
    pub compound_ids: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest PubChem XML files into the index
    Ingest {
        /// compound_*.xml / substance_*.xml files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Record kind (default: inferred from each file name)
        #[arg(short, long)]
        kind: Option<RecordKind>,
    },

    /// Match names against the index
    Match {
        #[arg(required = true)]
        terms: Vec<String>,
        /// Similarity a fuzzy match must exceed (default from config)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Match names and resolve them to identifiers
    Resolve {
        #[arg(required = true)]
        terms: Vec<String>,
        #[arg(short, long, default_value = "compound")]
        kind: RecordKind,
        #[arg(short, long)]
        threshold: Option<f64>,
        /// first_inserted, lowest_identifier or reject (default from config)
        #[arg(short, long)]
        policy: Option<AmbiguityPolicy>,
    },

    /// Fetch records from pc_fetch
    Fetch {
        /// Identifiers to fetch
        ids: Vec<u64>,
        /// Resolve these names first and fetch their identifiers too
        #[arg(short = 'n', long = "name")]
        terms: Vec<String>,
        #[arg(short, long, default_value = "compound")]
        kind: RecordKind,
        /// xml, asnt, asnb, json, sdf, smiles, image (default from config)
        #[arg(short, long)]
        mode: Option<RetrieveMode>,
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
        /// Fixed poll delay in milliseconds instead of the jittered default
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };
    init_logging(&config);

    match &cli.command {
        Commands::Ingest { files, kind } => {
            let paths = index_paths(&cli, &config)?;
            let mut catalog = if paths.exist() {
                Catalog::open(Some(&paths))?
            } else {
                Catalog::new()
            };

            let mut reports = Vec::with_capacity(files.len());
            for file in files {
                let report = catalog
                    .ingest_path(file, *kind)
                    .with_context(|| format!("Failed to ingest {:?}", file))?;
                reports.push(report);
            }

            if let Some(parent) = paths.names.parent() {
                std::fs::create_dir_all(parent)?;
            }
            catalog.save(&paths)?;

            let stats = catalog.index().stats();
            if cli.format == "json" {
                let out = serde_json::json!({ "reports": reports, "stats": stats });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{:<40} {:<10} {:>8} {:>8} {:>8}", "Source", "Kind", "Records", "Names", "Added");
                println!("{}", "-".repeat(78));
                for report in &reports {
                    println!(
                        "{:<40} {:<10} {:>8} {:>8} {:>8}",
                        report
                            .source
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default(),
                        report.kind.map(|k| k.to_string()).unwrap_or_default(),
                        report.records,
                        report.names_seen,
                        report.names_added,
                    );
                }
                println!();
                println!("Index: {}", stats);
            }
        }

        Commands::Match { terms, threshold } => {
            let mut catalog = open_catalog(&cli, &config)?;
            let threshold = threshold.unwrap_or(config.matching.threshold);
            let results = catalog.match_names(terms, threshold);

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(results)?);
            } else {
                print_matches(results);
            }
        }

        Commands::Resolve {
            terms,
            kind,
            threshold,
            policy,
        } => {
            let policy = match policy {
                Some(p) => *p,
                None => config.matching.ambiguity_policy()?,
            };
            let mut catalog = open_catalog(&cli, &config)?.ambiguity_policy(policy);
            let threshold = threshold.unwrap_or(config.matching.threshold);
            catalog.match_names(terms, threshold);
            let resolution = catalog.resolve(*kind)?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                print_resolution(&resolution);
            }
        }

        Commands::Fetch {
            ids,
            terms,
            kind,
            mode,
            output,
            delay_ms,
        } => {
            let mut identifiers = ids.clone();
            if !terms.is_empty() {
                let policy = config.matching.ambiguity_policy()?;
                let mut catalog = open_catalog(&cli, &config)?.ambiguity_policy(policy);
                catalog.match_names(terms, config.matching.threshold);
                identifiers.extend(catalog.resolve(*kind)?.identifiers());
            }
            let mut seen = std::collections::HashSet::new();
            identifiers.retain(|id| seen.insert(*id));

            if identifiers.is_empty() {
                bail!("Nothing to fetch: no identifiers given or resolved");
            }

            let mode = match mode {
                Some(m) => *m,
                None => config.retrieval.retrieve_mode()?,
            };
            let client = RetrievalClient::pc_fetch(
                &config.retrieval.fetch_config(),
                config.retrieval.downloader(),
                config.retrieval.poll.policy(),
            )?;

            let cancel = CancelToken::new();
            let handle = client.spawn_fetch(
                FetchJob {
                    identifiers,
                    destination: output.clone(),
                    kind: *kind,
                    mode,
                    delay_override: delay_ms.map(Duration::from_millis),
                },
                cancel.clone(),
            );

            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; cancelling retrieval");
                    signal_cancel.cancel();
                }
            });

            let report = handle.await??;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Fetched {} {} record(s) as {}", report.identifiers.len(), report.kind, report.mode);
                println!("  Source:      {}", report.location);
                println!("  Destination: {}", report.destination.display());
                println!("  Size:        {} bytes", report.bytes);
                println!("  Polls:       {} in {:.1}s", report.poll_attempts, report.elapsed_ms as f64 / 1000.0);
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(path, content)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("pubchem_resolver={}", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Index files from the command line, or the configured directory
fn index_paths(cli: &Cli, config: &Config) -> anyhow::Result<IndexPaths> {
    let paths = IndexPaths::from_parts(cli.names.clone(), cli.substance_ids.clone(), cli.compound_ids.clone())?;
    match paths {
        Some(paths) => Ok(paths),
        None => Ok(config.index.paths()?),
    }
}

fn open_catalog(cli: &Cli, config: &Config) -> anyhow::Result<Catalog> {
    let paths = index_paths(cli, config)?;
    if !paths.exist() {
        bail!(
            "No index at {:?}; run `pubchem-resolver ingest` first",
            paths.location()
        );
    }

    let catalog = Catalog::open(Some(&paths))?.threshold(config.matching.threshold);
    tracing::info!("Loaded index: {}", catalog.index().stats());
    Ok(catalog)
}

fn print_matches(results: &[MatchResult]) {
    println!("{:<40} {:<8} {:<40} {}", "Query", "Outcome", "Match", "Score");
    println!("{}", "-".repeat(100));
    for result in results {
        let (outcome, name, score) = match &result.outcome {
            MatchOutcome::Exact { name } => ("exact", name.as_str(), "1.0000".to_string()),
            MatchOutcome::Fuzzy { name, score } => ("fuzzy", name.as_str(), format!("{:.4}", score)),
            MatchOutcome::NoMatch { best_score } => (
                "none",
                "",
                best_score.map(|s| format!("({:.4})", s)).unwrap_or_default(),
            ),
        };
        println!("{:<40} {:<8} {:<40} {}", result.query, outcome, name, score);
    }
}

fn print_resolution(resolution: &Resolution) {
    if resolution.is_empty() {
        println!("No identifiers resolved.");
    } else {
        println!("{:<40} {}", "Query", "Identifier");
        println!("{}", "-".repeat(55));
        for (query, id) in &resolution.ids {
            println!("{:<40} {}", query, id);
        }
    }

    if resolution.ambiguous_count() > 0 {
        println!();
        println!("Ambiguous names ({}):", resolution.ambiguous_count());
        for ambiguous in &resolution.ambiguous {
            let chosen = ambiguous
                .chosen
                .map(|id| id.to_string())
                .unwrap_or_else(|| "rejected".to_string());
            println!(
                "  {} → {} matches {:?}, chose {}",
                ambiguous.query, ambiguous.name, ambiguous.candidates, chosen
            );
        }
    }
}
