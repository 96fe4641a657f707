//! LLM-based relation extraction from abstracts.
//!
//! Each document's annotated entities and abstract go to a [`ChatModel`];
//! relations the model reports as explicitly stated (and above the confidence
//! threshold) become [`SemanticEdge`]s. Batches run on a bounded worker pool,
//! results are cached per document id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::document::{Document, MentionSet};
use super::relation_types::normalize_relation_type;
use super::store::EdgeUpdate;
use crate::integrations::{ChatMessage, ChatModel, CompletionRequest};
use crate::metrics::{self, ExtractionStatus};
use crate::prompts::Prompt;
use crate::{Error, Result};

const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Leading/trailing markdown code fence lines.
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[^\n]*\n(.*)\n[^\n]*$").expect("valid fence regex"));

/// Relation reported by the model for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticEdge {
    pub node1: String,
    pub node2: String,
    pub document_id: String,
    pub relation_type: String,
    pub confidence: f64,
    pub evidence: String,
}

impl From<SemanticEdge> for EdgeUpdate {
    fn from(edge: SemanticEdge) -> Self {
        EdgeUpdate {
            node1: edge.node1,
            node2: edge.node2,
            document_id: edge.document_id,
            relation: edge.relation_type,
            confidence: Some(edge.confidence),
            evidence: Some(edge.evidence),
        }
    }
}

/// Extractor settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Minimum confidence for a relation to be kept
    pub confidence_threshold: f64,
    /// Concurrent model calls in a batch
    pub max_workers: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call timeout
    pub timeout_secs: u64,
    /// Map labels to canonical forms (`inhibition` -> `inhibits`)
    pub normalize_relations: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_workers: 5,
            temperature: 0.1,
            max_tokens: 1500,
            timeout_secs: 180,
            normalize_relations: true,
        }
    }
}

/// Per-document progress, sent from whichever worker finished the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub document_id: String,
    /// Documents finished so far, this one included
    pub completed: usize,
    pub total: usize,
    pub edges: usize,
    pub cached: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub cached_documents: usize,
    pub total_edges: usize,
}

/// Raw relation as returned by the model.
#[derive(Debug, Clone, PartialEq)]
struct RawRelation {
    entity1_id: String,
    entity2_id: String,
    relation_type: String,
    confidence: f64,
    evidence: String,
}

struct Analysis {
    edges: Vec<SemanticEdge>,
    status: ExtractionStatus,
}

/// LLM relation extractor with a per-document cache.
#[derive(Clone)]
pub struct SemanticRelationExtractor {
    model: Arc<dyn ChatModel>,
    config: ExtractorConfig,
    cache: Arc<Mutex<HashMap<String, Vec<SemanticEdge>>>>,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl SemanticRelationExtractor {
    pub fn new(model: Arc<dyn ChatModel>, config: ExtractorConfig) -> Self {
        Self {
            model,
            config,
            cache: Arc::new(Mutex::new(HashMap::new())),
            progress: None,
        }
    }

    /// Report per-document progress on this channel.
    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Relations explicitly stated in one document's abstract.
    ///
    /// Returns an empty list without calling the model when the document has
    /// fewer than two entities or no abstract. Model failures and timeouts
    /// propagate.
    pub async fn analyze_document(
        &self,
        doc: &Document,
        mentions: &MentionSet,
    ) -> Result<Vec<SemanticEdge>> {
        Ok(self.analyze(doc, mentions).await?.edges)
    }

    async fn analyze(&self, doc: &Document, mentions: &MentionSet) -> Result<Analysis> {
        if let Some(cached) = self.cached(&doc.id)? {
            debug!(document = %doc.id, "Using cached semantic edges");
            metrics::record_extraction(ExtractionStatus::Cached, None);
            return Ok(Analysis {
                edges: cached,
                status: ExtractionStatus::Cached,
            });
        }

        if mentions.len() < 2 {
            metrics::record_extraction(ExtractionStatus::Skipped, None);
            return Ok(Analysis {
                edges: Vec::new(),
                status: ExtractionStatus::Skipped,
            });
        }
        let Some(abstract_text) = doc.abstract_body() else {
            warn!(document = %doc.id, "No abstract available");
            metrics::record_extraction(ExtractionStatus::Skipped, None);
            return Ok(Analysis {
                edges: Vec::new(),
                status: ExtractionStatus::Skipped,
            });
        };

        let request = CompletionRequest {
            system_prompt: Prompt::RelationExtraction.text(),
            messages: vec![ChatMessage::user(build_prompt(&doc.title, abstract_text, mentions))],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let started = Instant::now();
        let response = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.model.complete(request),
        )
        .await
        .map_err(|_| {
            metrics::record_extraction(ExtractionStatus::Error, Some(started.elapsed()));
            Error::Timeout(self.config.timeout_secs)
        })?;
        let latency = started.elapsed();

        let response = match response {
            Ok(text) => text,
            Err(err) => {
                metrics::record_extraction(ExtractionStatus::Error, Some(latency));
                return Err(err);
            }
        };

        let edges: Vec<SemanticEdge> = parse_response(&response, &doc.id)
            .into_iter()
            .filter(|rel| rel.confidence >= self.config.confidence_threshold)
            .filter_map(|rel| self.to_edge(rel, doc, mentions))
            .collect();

        self.cache
            .lock()
            .map_err(|_| Error::Configuration("semantic cache lock poisoned".to_string()))?
            .insert(doc.id.clone(), edges.clone());

        metrics::record_extraction(ExtractionStatus::Ok, Some(latency));
        info!(
            document = %doc.id,
            entities = mentions.len(),
            relations = edges.len(),
            "Extracted semantic relations"
        );

        Ok(Analysis {
            edges,
            status: ExtractionStatus::Ok,
        })
    }

    fn to_edge(
        &self,
        rel: RawRelation,
        doc: &Document,
        mentions: &MentionSet,
    ) -> Option<SemanticEdge> {
        for id in [&rel.entity1_id, &rel.entity2_id] {
            if !mentions.contains(id) {
                warn!(document = %doc.id, entity = %id, "Model referenced an unknown entity");
                return None;
            }
        }

        let relation_type = if self.config.normalize_relations {
            normalize_relation_type(&rel.relation_type)
        } else {
            rel.relation_type
        };

        Some(SemanticEdge {
            node1: rel.entity1_id,
            node2: rel.entity2_id,
            document_id: doc.id.clone(),
            relation_type,
            confidence: rel.confidence,
            evidence: rel.evidence,
        })
    }

    /// Analyze many documents with at most `max_workers` model calls in flight.
    ///
    /// A failing document is logged, reported on the progress channel and
    /// contributes no edges; the rest of the batch continues.
    pub async fn analyze_collection(
        &self,
        documents: &[Document],
        mentions_by_document: &HashMap<String, MentionSet>,
        max_workers: usize,
    ) -> Vec<SemanticEdge> {
        let total = documents.len();
        let empty = MentionSet::default();

        let results: Vec<(String, std::result::Result<Analysis, Error>)> =
            stream::iter(documents.iter().map(|doc| {
                let mentions = mentions_by_document.get(&doc.id).unwrap_or(&empty);
                async move { (doc.id.clone(), self.analyze(doc, mentions).await) }
            }))
            .buffer_unordered(max_workers.max(1))
            .enumerate()
            .map(|(finished, (document_id, result))| {
                self.report(&document_id, finished + 1, total, &result);
                (document_id, result)
            })
            .collect()
            .await;

        let mut edges = Vec::new();
        for (document_id, result) in results {
            match result {
                Ok(analysis) => edges.extend(analysis.edges),
                Err(err) => error!(document = %document_id, "Semantic analysis failed: {}", err),
            }
        }

        info!(documents = total, edges = edges.len(), "Semantic batch finished");
        edges
    }

    fn report(&self, document_id: &str, completed: usize, total: usize, result: &Result<Analysis>) {
        let Some(sender) = &self.progress else {
            return;
        };

        let event = match result {
            Ok(analysis) => ProgressEvent {
                document_id: document_id.to_string(),
                completed,
                total,
                edges: analysis.edges.len(),
                cached: analysis.status == ExtractionStatus::Cached,
                error: None,
            },
            Err(err) => ProgressEvent {
                document_id: document_id.to_string(),
                completed,
                total,
                edges: 0,
                cached: false,
                error: Some(err.to_string()),
            },
        };

        // receiver gone means nobody is listening any more
        let _ = sender.send(event);
    }

    fn cached(&self, document_id: &str) -> Result<Option<Vec<SemanticEdge>>> {
        Ok(self
            .cache
            .lock()
            .map_err(|_| Error::Configuration("semantic cache lock poisoned".to_string()))?
            .get(document_id)
            .cloned())
    }

    pub fn cache_stats(&self) -> CacheStats {
        match self.cache.lock() {
            Ok(cache) => CacheStats {
                cached_documents: cache.len(),
                total_edges: cache.values().map(Vec::len).sum(),
            },
            Err(_) => CacheStats::default(),
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        info!("Semantic analysis cache cleared");
    }
}

/// User prompt asking for explicitly stated relations as a JSON array.
pub fn build_prompt(title: &str, abstract_text: &str, mentions: &MentionSet) -> String {
    let entities = mentions
        .iter()
        .map(|m| format!("- {}: {} (Type: {})", m.key, m.name, m.semantic_type))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a biomedical research assistant analyzing scientific abstracts to identify relationships between entities.

**Task**: Analyze the following abstract and identify EXPLICIT relationships between the provided entities. Only include relationships that are clearly stated or strongly implied in the text.

**Title**: {title}

**Abstract**: {abstract_text}

**Entities**:
{entities}

**Instructions**:
1. Identify relationships between entity pairs mentioned in the abstract
2. For each relationship, determine:
   - The two entities involved (use their IDs)
   - The relationship type (e.g., "increases", "inhibits", "associated_with", "causes", "treats", "regulates")
   - Confidence score (0-1): How confident are you this relationship is explicitly stated?
   - Supporting evidence: The specific sentence or phrase supporting this relationship

3. Return ONLY a JSON array with this exact structure:
[
  {{
    "entity1_id": "...",
    "entity2_id": "...",
    "relation_type": "...",
    "confidence": 0.9,
    "evidence": "exact quote from abstract"
  }}
]

**Important**:
- Only include relationships explicitly mentioned in the abstract
- Do not infer relationships from general knowledge
- If no clear relationships exist, return an empty array: []
- Return ONLY valid JSON, no additional text or markdown
"#
    )
}

/// Parse a model reply into validated relations; malformed replies yield none.
fn parse_response(response: &str, document_id: &str) -> Vec<RawRelation> {
    let trimmed = response.trim();
    let cleaned = if trimmed.starts_with("```") {
        CODE_FENCE
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map_or("", |m| m.as_str())
    } else {
        trimmed
    };

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(err) => {
            error!(document = %document_id, "Failed to parse model response as JSON: {}", err);
            let preview: String = response.chars().take(200).collect();
            debug!(document = %document_id, response = %preview);
            return Vec::new();
        }
    };

    let Value::Array(items) = value else {
        warn!(document = %document_id, "Model returned a non-list response");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| {
            let Value::Object(fields) = item else {
                return None;
            };

            let text = |key: &str| match fields.get(key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };

            let (Some(entity1_id), Some(entity2_id), Some(relation_type)) =
                (text("entity1_id"), text("entity2_id"), text("relation_type"))
            else {
                warn!(
                    document = %document_id,
                    "Skipping malformed relationship: {}",
                    serde_json::Value::Object(fields.clone())
                );
                return None;
            };

            let confidence = match fields.get("confidence") {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_CONFIDENCE),
                Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_CONFIDENCE),
                _ => DEFAULT_CONFIDENCE,
            };
            let evidence = match fields.get("evidence") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };

            Some(RawRelation {
                entity1_id,
                entity2_id,
                relation_type,
                confidence,
                evidence,
            })
        })
        .collect()
}
