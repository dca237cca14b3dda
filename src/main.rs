use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use srcdup::{
    build_report, index_corpus_with_granularity, CancellationToken, CorpusIndex, FsRepoWalker,
    Granularity, PipelineConfig, QueryEngine, RepoWalker, TokenExtractor,
};

#[derive(Parser)]
#[command(name = "srcdup", version, about = "Find duplicate and near-duplicate source code across repositories")]
struct Cli {
    /// Database file backing the index.
    #[arg(long = "db", global = true, default_value = "srcdup.redb")]
    db: String,

    /// Document granularity: whole files or individual functions.
    #[arg(short = 'm', long = "mode", global = true, value_enum, default_value_t = Mode::File)]
    mode: Mode,

    /// Pipeline configuration file (YAML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    File,
    Func,
}

impl From<Mode> for Granularity {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::File => Granularity::File,
            Mode::Func => Granularity::Func,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index one or more repository directories.
    Hash {
        /// Repository roots to index.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Query one file (or `path:function:line`) for duplicates and similars.
    Query {
        target: String,
        /// Override the similarity floor for this query.
        #[arg(long)]
        similarity: Option<f64>,
    },
    /// Enumerate duplicate clusters and similar components across the corpus.
    Report {
        /// Override the similarity floor for the component post-filter.
        #[arg(long)]
        similarity: Option<f64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Hash { ref paths } => run_hash(&cli, &config, paths),
        Commands::Query {
            ref target,
            similarity,
        } => run_query(&config, target, similarity),
        Commands::Report { similarity } => run_report(&config, similarity),
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    // The --db flag names the database file and implies the redb backend.
    config.index.backend = "redb".to_string();
    config.index.path = Some(cli.db.clone());
    Ok(config)
}

fn open_index(config: &PipelineConfig) -> Result<Arc<CorpusIndex>> {
    let index = CorpusIndex::new(config.index.to_index_config())
        .context("opening the index database")?;
    Ok(Arc::new(index))
}

fn run_hash(cli: &Cli, config: &PipelineConfig, paths: &[PathBuf]) -> Result<()> {
    let mut walkers = Vec::with_capacity(paths.len());
    for path in paths {
        walkers.push(
            FsRepoWalker::new(path)
                .with_context(|| format!("opening repository {}", path.display()))?,
        );
    }
    let walker_refs: Vec<&dyn RepoWalker> = walkers.iter().map(|w| w as &dyn RepoWalker).collect();

    let extractor = TokenExtractor::new(config.extract.clone())?;
    let index = open_index(config)?;

    let summary = index_corpus_with_granularity(
        &walker_refs,
        &extractor,
        &index,
        config,
        cli.mode.into(),
        &CancellationToken::new(),
    )?;

    println!(
        "indexed {} documents ({} sketched, {} without features)",
        summary.documents, summary.sketched, summary.empty
    );
    if !summary.skipped.is_empty() {
        println!("skipped:");
        for (reason, count) in summary.skipped.iter() {
            println!("  {reason}: {count}");
        }
    }
    Ok(())
}

fn run_query(config: &PipelineConfig, target: &str, similarity: Option<f64>) -> Result<()> {
    let (path, function) = parse_target(target);
    let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;

    let mut query_cfg = config.query.clone();
    if let Some(floor) = similarity {
        query_cfg = query_cfg.with_similarity_floor(floor);
    }

    let extractor = Arc::new(TokenExtractor::new(config.extract.clone())?);
    let index = open_index(config)?;
    let engine = QueryEngine::with_index_arc(index, extractor, query_cfg)?;

    let outcome = match &function {
        None => engine.query_file(&bytes)?,
        Some((name, line)) => engine.query_function(&bytes, name, *line)?,
    };

    println!("blob {}", outcome.blob_id);
    println!("duplicates ({}):", outcome.duplicates.len());
    for hit in &outcome.duplicates {
        println!("  {}", hit.location.document_key(&hit.blob_id));
    }
    println!("similar ({}):", outcome.similar.len());
    for hit in &outcome.similar {
        for location in &hit.locations {
            println!(
                "  {:.3}  {}",
                hit.estimate,
                location.document_key(&hit.blob_id)
            );
        }
    }
    Ok(())
}

fn run_report(config: &PipelineConfig, similarity: Option<f64>) -> Result<()> {
    let mut report_cfg = config.report.clone();
    if let Some(floor) = similarity {
        report_cfg = report_cfg.with_similarity_floor(Some(floor));
    }

    let index = open_index(config)?;
    let report = build_report(&index, &report_cfg)?;

    if report.duplicates.is_empty() && report.components.is_empty() {
        println!("no duplicates or similar documents found");
        return Ok(());
    }

    for cluster in &report.duplicates {
        println!("duplicate cluster ({} copies):", cluster.locations.len());
        for location in &cluster.locations {
            println!("  {}", location.document_key(&cluster.blob_id));
        }
    }
    for component in &report.components {
        match component.min_estimate {
            Some(estimate) => println!(
                "similar group ({} members, min estimate {:.3}):",
                component.blobs.len(),
                estimate
            ),
            None => println!("similar group ({} members):", component.blobs.len()),
        }
        for blob in &component.blobs {
            println!("  {blob}");
        }
    }
    if report.skipped_buckets > 0 {
        println!(
            "note: {} oversized band buckets were skipped; very popular content may be underreported",
            report.skipped_buckets
        );
    }
    Ok(())
}

/// Split `path[:identifier:line]` into the file path and the optional
/// function address. The suffix is only treated as a function address when
/// its last segment parses as a line number.
fn parse_target(target: &str) -> (PathBuf, Option<(String, Option<u32>)>) {
    let mut parts = target.rsplitn(3, ':');
    let last = parts.next();
    let middle = parts.next();
    let head = parts.next();

    if let (Some(line), Some(name), Some(path)) = (last, middle, head) {
        if let Ok(line) = line.parse::<u32>() {
            return (PathBuf::from(path), Some((name.to_string(), Some(line))));
        }
    }
    (PathBuf::from(target), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_target_plain_path() {
        let (path, function) = parse_target("src/lib.rs");
        assert_eq!(path, PathBuf::from("src/lib.rs"));
        assert!(function.is_none());
    }

    #[test]
    fn parse_target_function_address() {
        let (path, function) = parse_target("src/lib.rs:main:42");
        assert_eq!(path, PathBuf::from("src/lib.rs"));
        assert_eq!(function, Some(("main".to_string(), Some(42))));
    }

    #[test]
    fn parse_target_non_numeric_suffix_is_a_path() {
        let (path, function) = parse_target("weird:file:name");
        assert_eq!(path, PathBuf::from("weird:file:name"));
        assert!(function.is_none());
    }

    #[test]
    fn cli_parses_all_verbs() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["srcdup", "hash", "repo-a", "repo-b"]);
        assert!(matches!(cli.command, Commands::Hash { ref paths } if paths.len() == 2));
        assert_eq!(cli.db, "srcdup.redb");

        let cli = Cli::parse_from(["srcdup", "--db", "x.redb", "query", "f.rs"]);
        assert_eq!(cli.db, "x.redb");
        assert!(matches!(cli.command, Commands::Query { .. }));

        let cli = Cli::parse_from(["srcdup", "-m", "func", "report"]);
        assert!(cli.mode == Mode::Func);
        assert!(matches!(cli.command, Commands::Report { .. }));
    }
}
