//! Command-line front-end for shapecrate.
//!
//! ```bash
//! shapecrate index meshes/ --store corpus/
//! shapecrate query chair.off --store corpus/ -k 5 --ann
//! shapecrate evaluate --store corpus/ -k 10
//! ```
//!
//! Class labels are taken from the parent directory of each mesh file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use shapecrate_io::CorpusStore;
use shapecrate_retrieval::{
    CancellationToken, Corpus, CorpusBuilder, EvaluationReport, Evaluator, RetrievalConfig,
    Retriever,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shapecrate")]
#[command(about = "Content-based retrieval of 3D polygon shapes")]
struct Cli {
    /// Retrieval configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every mesh below a directory and persist the corpus
    Index {
        /// Root directory of the mesh collection
        dir: PathBuf,

        /// Output directory for the corpus store
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Rank the stored corpus against a query mesh
    Query {
        /// Query mesh file
        mesh: PathBuf,

        /// Corpus store directory
        #[arg(short, long)]
        store: PathBuf,

        /// Number of results (defaults to the configured k)
        #[arg(short)]
        k: Option<usize>,

        /// Use the approximate index
        #[arg(long)]
        ann: bool,
    },

    /// Query every corpus shape against the corpus and report per-class metrics
    Evaluate {
        /// Corpus store directory
        #[arg(short, long)]
        store: PathBuf,

        /// Number of results per query (defaults to the configured k)
        #[arg(short)]
        k: Option<usize>,

        /// Use the approximate index
        #[arg(long)]
        ann: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RetrievalConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => RetrievalConfig::default(),
    };

    match cli.command {
        Command::Index { dir, store } => index(&dir, &store, &config),
        Command::Query {
            mesh,
            store,
            k,
            ann,
        } => query(&mesh, &store, k.unwrap_or(config.k), ann, config),
        Command::Evaluate { store, k, ann } => evaluate(&store, k.unwrap_or(config.k), ann, config),
    }
}

fn open_store(path: &Path) -> Result<Corpus> {
    let store = CorpusStore::new(path);
    if !store.exists() {
        bail!("no corpus store at {}", path.display());
    }
    Corpus::load(&store).with_context(|| format!("loading corpus from {}", path.display()))
}

fn index(dir: &Path, store: &Path, config: &RetrievalConfig) -> Result<()> {
    let (corpus, report) = CorpusBuilder::new(config.pipeline)
        .build_from_directory(dir, &CancellationToken::new())
        .with_context(|| format!("building corpus from {}", dir.display()))?;

    for failure in &report.failures {
        warn!("skipped {}: {}", failure.id, failure.reason);
    }
    corpus
        .save(&CorpusStore::new(store))
        .with_context(|| format!("writing corpus to {}", store.display()))?;

    info!(
        "indexed {} shapes into {} ({} skipped)",
        report.processed,
        store.display(),
        report.failures.len()
    );
    for (label, size) in corpus.class_sizes() {
        let label = if label.is_empty() { "<unlabelled>" } else { label.as_str() };
        println!("{:<24} {:>6}", label, size);
    }
    Ok(())
}

fn query(mesh: &Path, store: &Path, k: usize, ann: bool, config: RetrievalConfig) -> Result<()> {
    let corpus = open_store(store)?;
    let weights = config.weights;
    let retriever = Retriever::new(corpus, config)?;

    let matches = retriever
        .query(mesh, &weights, k, ann, &CancellationToken::new())
        .with_context(|| format!("querying with {}", mesh.display()))?;

    println!("{:>4}  {:<48} {:<16} {:>12}", "rank", "shape", "class", "distance");
    for (rank, m) in matches.iter().enumerate() {
        let label = retriever
            .corpus()
            .get(&m.id)
            .map(|s| s.label.as_str())
            .unwrap_or("");
        println!(
            "{:>4}  {:<48} {:<16} {:>12.6}",
            rank + 1,
            m.id.to_string(),
            label,
            m.distance
        );
    }
    Ok(())
}

fn evaluate(store: &Path, k: usize, ann: bool, config: RetrievalConfig) -> Result<()> {
    let corpus = open_store(store)?;
    let weights = config.weights;
    let retriever = Retriever::new(corpus, config)?;

    let report = Evaluator::new(k)
        .evaluate_retriever(&retriever, &weights, ann, &CancellationToken::new())
        .context("evaluating corpus")?;
    print_report(&report, k);
    Ok(())
}

fn print_report(report: &EvaluationReport, k: usize) {
    println!(
        "{} shapes, k = {}, {} queries without a label skipped",
        report.corpus_size, k, report.skipped
    );
    println!(
        "{:<20} {:>5} {:>8} {:>8} {:>8} {:>8} {:>9} {:>7} {:>11} {:>8}",
        "class", "size", "TP", "FP", "TN", "FN", "precision", "recall", "specificity", "accuracy"
    );
    for class in &report.classes {
        let c = &class.counts;
        println!(
            "{:<20} {:>5} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>9.4} {:>7.4} {:>11.4} {:>8.4}",
            class.label,
            class.class_size,
            c.true_positives,
            c.false_positives,
            c.true_negatives,
            c.false_negatives,
            class.precision,
            class.recall,
            class.specificity,
            class.accuracy
        );
    }
    println!("mean per-class accuracy: {:.4}", report.accuracy);
}
