//! chemxref CLI
//!
//! Command-line access to the resolution engine:
//! - checking and printing namespace graphs,
//! - resolving a single key against a directory of JSON-lines reference data,
//! - streaming JSON-lines records through the batch resolver.

use anyhow::{bail, Context, Result};
use chemxref_graph::{EdgeKind, GraphConfig, ResolutionGraph};
use chemxref_resolve::{
    presets, BatchResolver, PipelineConfig, Resolver, RunStats, SearchMode,
};
use chemxref_store::{DocumentStore, JsonLinesReader, MemoryStore};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures_util::stream::{self, StreamExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod logging;

#[derive(Parser)]
#[command(name = "chemxref")]
#[command(author, version, about = "Chemical identifier cross-reference resolution")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect namespace graphs
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },

    /// Resolve one key and print the resolution as JSON
    Resolve {
        /// Directory of `<collection>.jsonl` reference files
        #[arg(long)]
        store: PathBuf,
        /// Source namespace
        #[arg(long)]
        from: String,
        /// Key in the source namespace
        #[arg(long)]
        key: String,
        /// Target namespaces
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<String>,
        /// Graph configuration (defaults to the built-in reference graph)
        #[arg(long)]
        graph: Option<PathBuf>,
        /// Stop once every target has one value
        #[arg(long)]
        single: bool,
    },

    /// Stream JSON-lines records through the batch resolver
    Transform {
        /// Directory of `<collection>.jsonl` reference files
        #[arg(long)]
        store: PathBuf,
        /// Pipeline configuration file
        #[arg(long, conflicts_with = "preset", required_unless_present = "preset")]
        pipeline: Option<PathBuf>,
        /// Built-in pipeline: chebi, sider, pharmgkb, ndc
        #[arg(long)]
        preset: Option<String>,
        /// Input records (JSON lines)
        #[arg(long)]
        input: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Graph configuration (defaults to the built-in reference graph)
        #[arg(long)]
        graph: Option<PathBuf>,
        /// Override the number of concurrent records
        #[arg(long)]
        workers: Option<usize>,
        /// Emit records as they complete instead of in input order
        #[arg(long)]
        unordered: bool,
    },
}

#[derive(Subcommand)]
enum GraphCommands {
    /// Build the graph and report its size
    Check {
        #[arg(long)]
        graph: Option<PathBuf>,
    },
    /// Print every namespace with its outgoing edges
    Show {
        #[arg(long)]
        graph: Option<PathBuf>,
        /// Print the configuration as JSON instead
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::parse_level(&cli.log_level)?)?;

    match cli.command {
        Commands::Graph { command } => match command {
            GraphCommands::Check { graph } => cmd_graph_check(graph.as_deref()),
            GraphCommands::Show { graph, json } => cmd_graph_show(graph.as_deref(), json),
        },
        Commands::Resolve {
            store,
            from,
            key,
            to,
            graph,
            single,
        } => cmd_resolve(&store, &from, &key, &to, graph.as_deref(), single).await,
        Commands::Transform {
            store,
            pipeline,
            preset,
            input,
            output,
            graph,
            workers,
            unordered,
        } => {
            let mut config = match (pipeline, preset) {
                (Some(path), _) => PipelineConfig::load(&path)
                    .with_context(|| format!("loading pipeline {}", path.display()))?,
                (None, Some(name)) => presets::by_name(&name)?,
                (None, None) => bail!("either --pipeline or --preset is required"),
            };
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if unordered {
                config.ordered = false;
            }
            cmd_transform(&store, config, &input, output.as_deref(), graph.as_deref()).await
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

fn load_graph_config(path: Option<&Path>) -> Result<GraphConfig> {
    match path {
        Some(path) => GraphConfig::load(path)
            .with_context(|| format!("loading graph configuration {}", path.display())),
        None => Ok(GraphConfig::mychem()),
    }
}

fn load_graph(path: Option<&Path>) -> Result<Arc<ResolutionGraph>> {
    let graph = load_graph_config(path)?
        .build()
        .context("building namespace graph")?;
    Ok(Arc::new(graph))
}

fn load_store(dir: &Path) -> Result<Arc<dyn DocumentStore>> {
    let store = MemoryStore::load_dir(dir)
        .with_context(|| format!("loading reference data from {}", dir.display()))?;
    tracing::info!(
        dir = %dir.display(),
        collections = ?store.collection_names(),
        "reference data loaded"
    );
    Ok(Arc::new(store))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_graph_check(path: Option<&Path>) -> Result<()> {
    let graph = load_graph(path)?;
    println!(
        "{} {} namespaces, {} edges",
        "ok".green().bold(),
        graph.namespace_count(),
        graph.edge_count()
    );
    Ok(())
}

fn cmd_graph_show(path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_graph_config(path)?;
    if json {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let graph = config.build().context("building namespace graph")?;
    for (id, name) in graph.namespaces() {
        println!("{}", name.bold());
        for edge in graph.neighbor_edges(id) {
            let to = graph.namespace_name(edge.to_ns()).unwrap_or("?");
            let detail = match edge.kind() {
                EdgeKind::StoreLookup(lookup) => format!(
                    "{}: {} -> {}",
                    lookup.collection, lookup.source_field, lookup.target_field
                ),
                EdgeKind::PatternRewrite(rw) => {
                    format!("s/{}/{}/", rw.pattern(), rw.replacement())
                }
            };
            println!(
                "  {} {:<12} {:>5.2}  {} {}",
                "→".cyan(),
                to,
                edge.weight(),
                edge.kind().name().dimmed(),
                detail
            );
        }
    }
    Ok(())
}

async fn cmd_resolve(
    store: &Path,
    from: &str,
    key: &str,
    to: &[String],
    graph: Option<&Path>,
    single: bool,
) -> Result<()> {
    let resolver = Resolver::new(load_graph(graph)?, load_store(store)?);
    let targets: Vec<&str> = to.iter().map(String::as_str).collect();
    let mode = if single {
        SearchMode::FirstResolution
    } else {
        SearchMode::Exhaustive
    };

    let resolution = resolver
        .resolve(from, key, &targets, mode)
        .await
        .with_context(|| format!("resolving {from}:{key}"))?;
    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}

async fn cmd_transform(
    store: &Path,
    config: PipelineConfig,
    input: &Path,
    output: Option<&Path>,
    graph: Option<&Path>,
) -> Result<()> {
    let batch = BatchResolver::new(load_graph(graph)?, load_store(store)?, config)
        .context("invalid pipeline configuration")?;

    let reader = JsonLinesReader::open(input)
        .with_context(|| format!("opening input {}", input.display()))?;

    let mut out: BufWriter<Box<dyn Write>> = match output {
        Some(path) => BufWriter::new(Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => BufWriter::new(Box::new(io::stdout().lock())),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing records in flight");
            on_signal.cancel();
        }
    });

    let mut run = batch.run(stream::iter(reader), cancel.clone());
    let mut run_error = None;
    while let Some(item) = run.next().await {
        match item {
            Ok(outcome) => {
                serde_json::to_writer(&mut out, &outcome.document)?;
                out.write_all(b"\n")?;
            }
            Err(err) => run_error = Some(err),
        }
    }
    out.flush()?;

    print_summary(&run.stats(), cancel.is_cancelled());
    if let Some(err) = run_error {
        return Err(err).context("resolution run aborted");
    }
    Ok(())
}

fn print_summary(stats: &RunStats, interrupted: bool) {
    let label = if interrupted {
        "interrupted".yellow().bold()
    } else {
        "done".green().bold()
    };
    eprintln!(
        "{} {} records: {} resolved, {} unresolved, {} failed, {} dropped",
        label, stats.records, stats.resolved, stats.unresolved, stats.failed, stats.dropped
    );
    eprintln!(
        "  {} cache: {} hits, {} lookups, {} entries",
        "→".cyan(),
        stats.cache.hits,
        stats.cache.misses,
        stats.cache.entries
    );
}
