//! polyvis CLI: knowledge harvesting and community partitioning.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;

use polyvis::classify::{HttpClassifier, SieveGate};
use polyvis::community::{self, Louvain};
use polyvis::extract::{GenerationProvider, LlamaCppProvider, OllamaProvider, TripleExtractor};
use polyvis::graph;
use polyvis::harvest::{HarvestConfig, Harvester};

/// Default llama.cpp completion endpoint, overridable via LLAMA_API_URL.
const DEFAULT_LLAMA_URL: &str = "http://localhost:8080/completion";

#[derive(Parser)]
#[command(
    name = "polyvis",
    version,
    about = "Sieve-and-Net knowledge harvesting and community partitioning"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a knowledge graph from documents.
    Harvest {
        /// File or directory to process; omit for a demo extraction.
        target: Option<PathBuf>,

        /// llama.cpp completion endpoint (falls back to $LLAMA_API_URL).
        #[arg(long)]
        llama_url: Option<String>,

        /// Use an Ollama server at this base URL instead of llama.cpp.
        #[arg(long)]
        ollama_url: Option<String>,

        /// Model name for the Ollama provider.
        #[arg(long, default_value = "llama3.2")]
        model: String,

        /// Classifier sidecar endpoint.
        #[arg(long, default_value = "http://localhost:8765/classify")]
        classifier_url: String,

        /// Confidence threshold for the actionability verdict.
        #[arg(long, default_value = "0.85")]
        threshold: f64,

        /// Minimum fragment length in characters.
        #[arg(long, default_value = "20")]
        min_fragment_len: usize,

        /// Output path for the knowledge graph artifact.
        #[arg(long, default_value = "knowledge_graph.json")]
        output: PathBuf,
    },

    /// Partition a harvested graph into communities.
    Partition {
        /// Path to the SQLite edge store.
        #[arg(long)]
        db: PathBuf,

        /// Louvain resolution; higher values produce more communities.
        #[arg(long, short, default_value = "1.0")]
        resolution: f64,

        /// Minimum component size to take part in community detection.
        #[arg(long, short, default_value = "5")]
        min_component: usize,

        /// Output path for the partition artifact.
        #[arg(long, default_value = "community_partition.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            target,
            llama_url,
            ollama_url,
            model,
            classifier_url,
            threshold,
            min_fragment_len,
            output,
        } => {
            tracing::info!("initializing harvester");
            // No fallback classifier exists: an unreachable sidecar is
            // fatal before any document is touched.
            let classifier = HttpClassifier::connect(&classifier_url)?;
            let gate = SieveGate::new(classifier);
            let config = HarvestConfig {
                threshold,
                min_fragment_len,
                output,
            };

            match ollama_url {
                Some(url) => {
                    run_harvest(gate, OllamaProvider::new(&url, &model), config, target)?;
                }
                None => {
                    let url = llama_url
                        .or_else(|| std::env::var("LLAMA_API_URL").ok())
                        .unwrap_or_else(|| DEFAULT_LLAMA_URL.to_string());
                    run_harvest(gate, LlamaCppProvider::new(&url), config, target)?;
                }
            }
        }

        Commands::Partition {
            db,
            resolution,
            min_component,
            output,
        } => {
            tracing::info!(
                db = %db.display(),
                resolution,
                min_component,
                "community detection (misc container strategy)"
            );
            let graph = graph::load_graph(&db)?;
            let split = graph::classify_components(&graph, min_component);

            // Health is a function of the component split alone, so it is
            // reported before detection starts.
            let health = community::connectivity_health(&graph, &split);
            tracing::info!(
                connectivity_health = health.connectivity_health,
                misc_ratio = health.misc_ratio,
                "graph connectivity health"
            );

            let partition = community::solve(&graph, &split, &Louvain::default(), resolution);
            let stats = community::summarize(&graph, &split, &partition);
            community::log_distribution(&partition);

            community::save_partition(&output, &partition, &stats)?;
            tracing::info!(
                communities = stats.num_communities,
                misc_nodes = stats.misc_nodes,
                path = %output.display(),
                "partitioning complete"
            );
        }
    }

    Ok(())
}

fn run_harvest<P: GenerationProvider>(
    gate: SieveGate<HttpClassifier>,
    provider: P,
    config: HarvestConfig,
    target: Option<PathBuf>,
) -> Result<()> {
    let extractor = TripleExtractor::new(provider);
    let mut harvester = Harvester::new(gate, extractor, config);
    harvester.run(target.as_deref())?;
    Ok(())
}
