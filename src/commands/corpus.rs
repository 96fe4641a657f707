//! Corpus and weight-file loading.
//!
//! A corpus is a JSON array of documents, JSON Lines (one document per line),
//! a single JSON document, or a directory tree of such files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::graph::{Document, DocumentWeights};

const CORPUS_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

/// Load every document under `path` (file or directory).
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let files = if path.is_dir() {
        corpus_files(path)
    } else {
        vec![path.to_path_buf()]
    };

    let mut documents = Vec::new();
    for file in &files {
        let text = fs::read_to_string(file)
            .with_context(|| format!("failed to read corpus file {}", file.display()))?;
        let parsed = parse_documents(&text)
            .with_context(|| format!("failed to parse corpus file {}", file.display()))?;
        debug!(file = %file.display(), documents = parsed.len(), "Loaded corpus file");
        documents.extend(parsed);
    }

    info!(files = files.len(), documents = documents.len(), "Corpus loaded");
    Ok(documents)
}

fn corpus_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| CORPUS_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Parse documents from JSON array, single JSON object or JSON Lines text.
pub fn parse_documents(text: &str) -> Result<Vec<Document>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("invalid JSON array of documents");
    }

    if let Ok(document) = serde_json::from_str::<Document>(trimmed) {
        return Ok(vec![document]);
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<Document>(line)
                .with_context(|| format!("invalid document on line {}", idx + 1))
        })
        .collect()
}

/// Load per-document weights from a JSON object `{ "<id>": <weight> }`.
pub fn load_weights(path: &Path) -> Result<DocumentWeights> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read weights file {}", path.display()))?;
    let weights: DocumentWeights =
        serde_json::from_str(&text).context("weights must be a JSON object of numbers")?;
    info!(documents = weights.len(), "Loaded document weights");
    Ok(weights)
}
