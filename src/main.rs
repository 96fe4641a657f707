//! Biomedical graph CLI - main entry point
//!
//! Build entity graphs from annotated corpora, re-filter snapshots, inspect
//! graph context for a question, or chat over a graph.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use biomed_graph::commands::{self, BuildArgs, FilterArgs};
use biomed_graph::graph::retriever::DEFAULT_MAX_HOPS;
use biomed_graph::graph::{EdgeCutoff, EdgeMethod, FilterOptions, NodeScope, WeightingMethod};
use biomed_graph::{metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "biomed_graph")]
#[command(about = "Biomedical entity-relation graph builder and hybrid chat", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Configuration file (defaults to ./config.yml, then ../config.yml)
    #[arg(long, env = "BIOMED_GRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a graph from an annotated corpus
    Build {
        /// Corpus file (JSON array / JSON Lines) or directory
        #[arg(long)]
        corpus: PathBuf,

        /// JSON object of per-document weights
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Edge method: co-occurrence | relation | semantic
        #[arg(long, value_parser = parse_edge_method)]
        edge_method: Option<EdgeMethod>,

        /// Node scope: all | standardized
        #[arg(long, value_parser = parse_node_scope)]
        node_scope: Option<NodeScope>,

        /// Edge weighting: frequency | npmi
        #[arg(long, value_parser = parse_weighting)]
        weighting: Option<WeightingMethod>,

        /// Edge width cutoff: `min` or `min,max`
        #[arg(long, value_parser = parse_cutoff)]
        cutoff: Option<EdgeCutoff>,

        /// Keep at most this many edges (0 keeps all)
        #[arg(long)]
        max_edges: Option<usize>,

        /// Collapse the graph into communities
        #[arg(long, default_value_t = false)]
        communities: bool,

        /// Display standardized vocabulary names
        #[arg(long, default_value_t = false)]
        standardized_names: bool,

        /// Output snapshot path
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,

        /// Also save the unpruned snapshot for `filter`
        #[arg(long)]
        full_output: Option<PathBuf>,
    },

    /// Re-filter a saved full snapshot
    Filter {
        /// Snapshot produced by `build --full-output`
        #[arg(long)]
        snapshot: PathBuf,

        /// Edge weighting: frequency | npmi
        #[arg(long, value_parser = parse_weighting)]
        weighting: Option<WeightingMethod>,

        /// Edge width cutoff: `min` or `min,max`
        #[arg(long, value_parser = parse_cutoff)]
        cutoff: Option<EdgeCutoff>,

        /// Keep at most this many edges
        #[arg(long)]
        max_edges: Option<usize>,

        /// Drop nodes with fewer connections
        #[arg(long, default_value_t = 0)]
        min_degree: usize,

        /// Collapse the graph into communities
        #[arg(long, default_value_t = false)]
        communities: bool,

        /// Keep the stored node positions
        #[arg(long, default_value_t = false)]
        no_layout: bool,

        /// Output snapshot path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show matched entities and graph context for a question
    Query {
        /// Graph snapshot
        #[arg(long)]
        snapshot: PathBuf,

        /// Question text
        question: String,

        /// Maximum path length between entities
        #[arg(long, default_value_t = DEFAULT_MAX_HOPS)]
        max_hops: usize,
    },

    /// Interactive chat over a graph snapshot
    Chat {
        /// Graph snapshot
        #[arg(long)]
        snapshot: PathBuf,

        /// Abstracts retrieved per question
        #[arg(long)]
        top_k: Option<usize>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Build { .. } => "build",
            Commands::Filter { .. } => "filter",
            Commands::Query { .. } => "query",
            Commands::Chat { .. } => "chat",
        }
    }
}

fn parse_edge_method(value: &str) -> Result<EdgeMethod, String> {
    EdgeMethod::parse(value).map_err(|e| e.to_string())
}

fn parse_cutoff(value: &str) -> Result<EdgeCutoff, String> {
    EdgeCutoff::parse(value).map_err(|e| e.to_string())
}

fn parse_node_scope(value: &str) -> Result<NodeScope, String> {
    NodeScope::parse(value).map_err(|e| e.to_string())
}

fn parse_weighting(value: &str) -> Result<WeightingMethod, String> {
    WeightingMethod::parse(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("biomed_graph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::new(),
    };

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command, &config).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Build {
            corpus,
            weights,
            edge_method,
            node_scope,
            weighting,
            cutoff,
            max_edges,
            communities,
            standardized_names,
            output,
            full_output,
        } => {
            let args = BuildArgs {
                corpus,
                weights,
                edge_method,
                node_scope,
                weighting,
                cutoff,
                max_edges,
                communities,
                standardized_names,
                output,
                full_output,
            };
            commands::build_run(args, config).await?;
        }
        Commands::Filter {
            snapshot,
            weighting,
            cutoff,
            max_edges,
            min_degree,
            communities,
            no_layout,
            output,
        } => {
            let options = FilterOptions {
                weighting: weighting.unwrap_or(config.graph.weighting),
                cutoff: cutoff.unwrap_or(config.graph.edge_weight_cutoff),
                max_edges,
                min_degree,
                relayout: !no_layout,
                communities,
            };
            commands::filter_run(&FilterArgs {
                snapshot,
                options,
                output,
            })?;
        }
        Commands::Query {
            snapshot,
            question,
            max_hops,
        } => {
            commands::query_run(&snapshot, &question, max_hops)?;
        }
        Commands::Chat { snapshot, top_k } => {
            commands::chat_run(&snapshot, top_k, config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_weighting_and_scope_are_rejected() {
        let build = |flag: &str, value: &str| {
            Cli::try_parse_from(["biomed_graph", "build", "--corpus", "c.json", flag, value])
        };

        assert!(build("--weighting", "npmi").is_ok());
        assert!(build("--node-scope", "standardized").is_ok());
        assert!(build("--weighting", "foo").is_err());
        assert!(build("--node-scope", "foo").is_err());

        let filter = Cli::try_parse_from([
            "biomed_graph",
            "filter",
            "--snapshot",
            "g.json",
            "--weighting",
            "foo",
        ]);
        assert!(filter.is_err());
    }
}
