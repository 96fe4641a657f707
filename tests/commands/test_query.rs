//! Tests for query command

use biomed_graph::commands;
use biomed_graph::graph::{Annotation, BuildOptions, Document, EdgeMethod, GraphBuilder, NodeScope};
use tempfile::TempDir;

async fn snapshot(dir: &TempDir) -> std::path::PathBuf {
    let docs = [
        Document::new("1", "One")
            .with_annotation(Annotation::mention("1", "TP53", "Gene"))
            .with_annotation(Annotation::mention("1", "MDM2", "Gene")),
        Document::new("2", "Two")
            .with_annotation(Annotation::mention("2", "MDM2", "Gene"))
            .with_annotation(Annotation::mention("2", "nutlin", "Chemical")),
    ];
    let mut builder = GraphBuilder::new(EdgeMethod::CoOccurrence, NodeScope::All, None).unwrap();
    builder.add_collection(&docs, false).await;

    let path = dir.path().join("graph.json");
    builder.build(&BuildOptions::default()).save(&path).unwrap();
    path
}

#[tokio::test]
async fn test_query_finds_two_hop_path() {
    let dir = TempDir::new().unwrap();
    let path = snapshot(&dir).await;

    let output = commands::query_run(&path, "Is TP53 affected by nutlin?", 2).unwrap();

    assert_eq!(output.entities.len(), 2);
    assert!(output.context.starts_with("Relational analysis between:"));
    assert!(output.context.contains("--> MDM2 --["));
    assert!(output.context.contains("co-mention [PMID:1]"));
    assert!(output.context.contains("co-mention [PMID:2]"));
}

#[tokio::test]
async fn test_query_respects_hop_limit() {
    let dir = TempDir::new().unwrap();
    let path = snapshot(&dir).await;

    let output = commands::query_run(&path, "TP53 and nutlin", 1).unwrap();

    assert!(output.context.contains("No direct connection found between"));
    assert!(output.context.contains("within 1 hops."));
}
