//! `query` command: structural context for a question.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::graph::{GraphRetriever, GraphStore};

/// Entities recognized in a question and the rendered graph context.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub entities: Vec<String>,
    pub context: String,
}

pub fn answer(graph: Arc<GraphStore>, question: &str, max_hops: usize) -> QueryOutput {
    let retriever = GraphRetriever::new(graph);
    let entities = retriever.find_relevant_nodes(question);
    let context = retriever.get_subgraph_context(&entities, max_hops);
    QueryOutput { entities, context }
}

pub fn run(snapshot: &Path, question: &str, max_hops: usize) -> Result<QueryOutput> {
    let graph = GraphStore::load(snapshot)
        .with_context(|| format!("failed to load snapshot {}", snapshot.display()))?;
    let graph = Arc::new(graph);

    let output = answer(graph.clone(), question, max_hops);

    if output.entities.is_empty() {
        println!("Matched entities: none");
    } else {
        let names: Vec<&str> = output
            .entities
            .iter()
            .map(|id| {
                graph
                    .node(id)
                    .map(|n| n.display_name.as_str())
                    .unwrap_or(id.as_str())
            })
            .collect();
        println!("Matched entities: {}", names.join(", "));
    }
    println!();
    println!("{}", output.context);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::retriever::NO_ENTITIES;
    use crate::graph::{Annotation, BuildOptions, Document, EdgeMethod, GraphBuilder, NodeScope};
    use tempfile::TempDir;

    async fn snapshot(dir: &TempDir) -> std::path::PathBuf {
        let doc = Document::new("1", "Aspirin")
            .with_annotation(
                Annotation::mention("1", "aspirin", "Chemical").with_standardized_id("D001241"),
            )
            .with_annotation(Annotation::mention("1", "COX2", "Gene").with_standardized_id("5743"));
        let mut builder =
            GraphBuilder::new(EdgeMethod::CoOccurrence, NodeScope::All, None).unwrap();
        builder.add_collection(&[doc], false).await;

        let path = dir.path().join("graph.json");
        builder.build(&BuildOptions::default()).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn query_single_entity() {
        let dir = TempDir::new().unwrap();
        let path = snapshot(&dir).await;

        let output = run(&path, "What does aspirin do?", 2).unwrap();

        assert_eq!(output.entities, vec!["D001241".to_string()]);
        assert!(output.context.starts_with("Entity: aspirin (Chemical)"));
        assert!(output.context.contains("COX2 (Gene)"));
    }

    #[tokio::test]
    async fn query_without_entities() {
        let dir = TempDir::new().unwrap();
        let path = snapshot(&dir).await;

        let output = run(&path, "unrelated question", 2).unwrap();
        assert!(output.entities.is_empty());
        assert_eq!(output.context, NO_ENTITIES);
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        assert!(run(Path::new("/nonexistent/graph.json"), "aspirin", 2).is_err());
    }
}
