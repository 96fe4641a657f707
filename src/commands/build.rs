//! `build` and `filter` commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::corpus::{load_corpus, load_weights};
use crate::config::Config;
use crate::graph::{
    BuildOptions, EdgeCutoff, EdgeMethod, FilterOptions, GraphBuilder, GraphStore, NodeScope,
    ProgressEvent, SemanticRelationExtractor, WeightingMethod,
};

/// Flags of the `build` command; `None` falls back to configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub corpus: PathBuf,
    pub weights: Option<PathBuf>,
    pub edge_method: Option<EdgeMethod>,
    pub node_scope: Option<NodeScope>,
    pub weighting: Option<WeightingMethod>,
    pub cutoff: Option<EdgeCutoff>,
    pub max_edges: Option<usize>,
    pub communities: bool,
    pub standardized_names: bool,
    pub output: PathBuf,
    /// Unpruned snapshot for later re-filtering
    pub full_output: Option<PathBuf>,
}

/// Build a graph from a corpus and save the finalized snapshot.
pub async fn run(args: BuildArgs, config: &Config) -> Result<GraphStore> {
    let settings = &config.graph;
    let method = args.edge_method.unwrap_or(settings.edge_method);
    let scope = args.node_scope.unwrap_or(settings.node_scope);
    let weighting = args.weighting.unwrap_or(settings.weighting);

    let documents = load_corpus(&args.corpus)?;
    if documents.is_empty() {
        warn!(corpus = %args.corpus.display(), "Corpus contains no documents");
    }
    let weights = args.weights.as_deref().map(load_weights).transpose()?;

    let (extractor, progress) = if method == EdgeMethod::Semantic {
        let client = config
            .openai_client()
            .context("semantic edges need a configured chat model")?;
        let (tx, rx) = mpsc::unbounded_channel();
        let extractor = SemanticRelationExtractor::new(Arc::new(client), config.semantic.clone())
            .with_progress(tx);
        (Some(extractor), Some(tokio::spawn(log_progress(rx))))
    } else {
        (None, None)
    };

    let mut builder = GraphBuilder::new(method, scope, extractor)?;
    builder
        .add_collection(
            &documents,
            args.standardized_names || settings.use_standardized_vocabulary,
        )
        .await;

    let options = BuildOptions {
        weights: weights.clone(),
        weighting,
        cutoff: args.cutoff.unwrap_or(settings.edge_weight_cutoff),
        keep_communities: args.communities || settings.communities,
        max_edges: args.max_edges.unwrap_or(settings.max_edges),
    };
    let graph = builder.build(&options);

    if let Some(path) = &args.full_output {
        let full = builder.full_snapshot(weights.as_ref(), weighting);
        save(&full, path)?;
    }

    drop(builder);
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    save(&graph, &args.output)?;
    println!(
        "Built graph: {} nodes, {} edges, {} documents -> {}",
        graph.node_count(),
        graph.edge_count(),
        graph.metadata.document_count,
        args.output.display()
    );
    Ok(graph)
}

async fn log_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match &event.error {
            Some(error) => warn!(
                document = %event.document_id,
                completed = event.completed,
                total = event.total,
                %error,
                "Semantic extraction failed"
            ),
            None => info!(
                document = %event.document_id,
                completed = event.completed,
                total = event.total,
                edges = event.edges,
                cached = event.cached,
                "Semantic extraction progress"
            ),
        }
    }
}

/// Flags of the `filter` command.
#[derive(Debug, Clone)]
pub struct FilterArgs {
    pub snapshot: PathBuf,
    pub options: FilterOptions,
    /// Defaults to printing a summary only
    pub output: Option<PathBuf>,
}

/// Re-filter a saved snapshot without touching it.
pub fn filter(args: &FilterArgs) -> Result<GraphStore> {
    let snapshot = GraphStore::load(&args.snapshot)
        .with_context(|| format!("failed to load snapshot {}", args.snapshot.display()))?;

    let graph = snapshot.refiltered(&args.options);
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        communities = graph.metadata.num_communities,
        "Re-filtered snapshot"
    );

    if let Some(path) = &args.output {
        save(&graph, path)?;
    }

    println!(
        "Filtered graph: {} nodes, {} edges, {} communities",
        graph.node_count(),
        graph.edge_count(),
        graph.metadata.num_communities
    );
    Ok(graph)
}

fn save(graph: &GraphStore, path: &Path) -> Result<()> {
    graph
        .save(path)
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CORPUS: &str = r#"[
  {"id": "1", "title": "A", "abstract": "aspirin and COX2",
   "annotations": [
     {"document_id": "1", "name": "aspirin", "type": "Chemical", "standardized_id": "D001241"},
     {"document_id": "1", "name": "COX2", "type": "Gene", "standardized_id": "5743"}]},
  {"id": "2", "title": "B", "abstract": "aspirin, COX2 and pain",
   "annotations": [
     {"document_id": "2", "name": "aspirin", "type": "Chemical", "standardized_id": "D001241"},
     {"document_id": "2", "name": "COX2", "type": "Gene", "standardized_id": "5743"},
     {"document_id": "2", "name": "pain", "type": "Disease", "standardized_id": "D010146"}]}
]"#;

    fn workspace() -> (TempDir, BuildArgs) {
        let dir = TempDir::new().unwrap();
        let corpus = dir.path().join("corpus.json");
        fs::write(&corpus, CORPUS).unwrap();
        let args = BuildArgs {
            corpus,
            output: dir.path().join("graph.json"),
            full_output: Some(dir.path().join("full.json")),
            ..BuildArgs::default()
        };
        (dir, args)
    }

    #[tokio::test]
    async fn build_writes_snapshots() {
        let (_dir, args) = workspace();
        let config = Config::from_defaults();

        let graph = run(args.clone(), &config).await.unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        let reloaded = GraphStore::load(&args.output).unwrap();
        assert_eq!(reloaded.edge_count(), 3);
        assert!(args.full_output.unwrap().exists());
    }

    #[tokio::test]
    async fn filter_raises_cutoff() {
        let (dir, args) = workspace();
        run(args.clone(), &Config::from_defaults()).await.unwrap();

        let filtered = filter(&FilterArgs {
            snapshot: args.full_output.clone().unwrap(),
            options: FilterOptions {
                cutoff: EdgeCutoff::Floor(2.0),
                ..FilterOptions::default()
            },
            output: Some(dir.path().join("filtered.json")),
        })
        .unwrap();

        // only aspirin-COX2 appears in both documents
        assert_eq!(filtered.edge_count(), 1);
        assert_eq!(filtered.node_count(), 2);
        assert!(dir.path().join("filtered.json").exists());
    }

    #[tokio::test]
    async fn semantic_build_without_key_is_rejected() {
        let (_dir, mut args) = workspace();
        args.edge_method = Some(EdgeMethod::Semantic);
        let mut config = Config::from_defaults();
        config.llm.api_key.clear();

        assert!(run(args, &config).await.is_err());
    }
}
