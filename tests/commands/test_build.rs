//! Tests for build and filter commands

use std::fs;

use biomed_graph::commands::{self, BuildArgs, FilterArgs};
use biomed_graph::config::Config;
use biomed_graph::graph::{EdgeCutoff, EdgeMethod, FilterOptions, GraphStore, WeightingMethod};
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

const CORPUS: &str = r#"{"id": "10", "title": "Aspirin", "abstract": "Aspirin inhibits COX2.", "annotations": [{"document_id": "10", "name": "aspirin", "type": "Chemical", "standardized_id": "D001241"}, {"document_id": "10", "name": "COX2", "type": "Gene", "standardized_id": "5743"}]}
{"id": "11", "title": "Ibuprofen", "abstract": "Ibuprofen also inhibits COX2.", "annotations": [{"document_id": "11", "name": "ibuprofen", "type": "Chemical", "standardized_id": "D007052"}, {"document_id": "11", "name": "COX2", "type": "Gene", "standardized_id": "5743"}]}
{"id": "12", "title": "Both", "abstract": "Aspirin and ibuprofen on COX2.", "annotations": [{"document_id": "12", "name": "aspirin", "type": "Chemical", "standardized_id": "D001241"}, {"document_id": "12", "name": "COX2", "type": "Gene", "standardized_id": "5743"}, {"document_id": "12", "name": "ibuprofen", "type": "Chemical", "standardized_id": "D007052"}]}
"#;

fn corpus_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("corpus")).unwrap();
    fs::write(dir.path().join("corpus").join("docs.jsonl"), CORPUS).unwrap();
    dir
}

#[tokio::test]
async fn test_build_from_directory_with_weights() {
    let dir = corpus_dir();
    let weights = dir.path().join("weights.json");
    fs::write(&weights, r#"{"10": 3.0, "11": 1.0, "12": 1.0}"#).unwrap();

    let args = BuildArgs {
        corpus: dir.path().join("corpus"),
        weights: Some(weights),
        output: dir.path().join("graph.json"),
        ..BuildArgs::default()
    };
    let graph = commands::build_run(args, &Config::from_defaults()).await.unwrap();

    assert_eq!(graph.node_count(), 3);
    let aspirin_cox2 = graph.edge("D001241", "5743").unwrap();
    assert_eq!(aspirin_cox2.num_relations, 2);
    assert_eq!(aspirin_cox2.weighted_num_relations, 4.0);
    assert_eq!(graph.node("D001241").unwrap().weighted_article_count, 4.0);
}

#[tokio::test]
async fn test_semantic_build_uses_configured_endpoint() {
    let dir = corpus_dir();
    let server = MockServer::start_async().await;
    let completion = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .header("Authorization", "Bearer from-config");
        then.status(200).json_body(json!({
            "choices": [{ "message": { "role": "assistant", "content":
                r#"[{"entity1_id": "5743", "entity2_id": "D001241", "relation_type": "inhibited by", "confidence": 0.8}]"# } }]
        }));
    });

    let mut config = Config::from_defaults();
    config.llm.api_key = "from-config".to_string();
    config.llm.base_url = server.base_url();

    let args = BuildArgs {
        corpus: dir.path().join("corpus"),
        edge_method: Some(EdgeMethod::Semantic),
        output: dir.path().join("graph.json"),
        ..BuildArgs::default()
    };
    let graph = commands::build_run(args, &config).await.unwrap();

    completion.assert_hits(3);
    // only documents mentioning aspirin support the edge
    let edge = graph.edge("D001241", "5743").unwrap();
    let documents: Vec<&str> = edge.document_ids().collect();
    assert_eq!(documents, vec!["10", "12"]);
    assert!(edge.relations_by_document["10"].contains("inhibited_by"));
}

#[tokio::test]
async fn test_filter_switches_weighting_and_prunes_by_degree() {
    let dir = corpus_dir();
    let full = dir.path().join("full.json");
    let args = BuildArgs {
        corpus: dir.path().join("corpus"),
        output: dir.path().join("graph.json"),
        full_output: Some(full.clone()),
        ..BuildArgs::default()
    };
    commands::build_run(args, &Config::from_defaults()).await.unwrap();

    let npmi = commands::filter_run(&FilterArgs {
        snapshot: full.clone(),
        options: FilterOptions {
            weighting: WeightingMethod::Npmi,
            ..FilterOptions::default()
        },
        output: None,
    })
    .unwrap();
    assert_eq!(npmi.metadata.weighting, WeightingMethod::Npmi);

    let strict = commands::filter_run(&FilterArgs {
        snapshot: full.clone(),
        options: FilterOptions {
            cutoff: EdgeCutoff::Range(2.0, 2.0),
            min_degree: 1,
            ..FilterOptions::default()
        },
        output: Some(dir.path().join("strict.json")),
    })
    .unwrap();
    assert_eq!(strict.edge_count(), 2);

    // the full snapshot on disk is untouched
    assert_eq!(GraphStore::load(&full).unwrap().edge_count(), 3);
    assert_eq!(GraphStore::load(dir.path().join("strict.json")).unwrap().edge_count(), 2);
}
