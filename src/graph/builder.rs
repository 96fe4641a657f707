//! Graph construction: document ingestion, edge strategies and finalization.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::community;
use super::document::{Document, MentionSet, NodeScope};
use super::layout;
use super::semantic::SemanticRelationExtractor;
use super::store::{DocumentWeights, EdgeCutoff, EdgeUpdate, GraphStore, WeightingMethod};
use crate::metrics;
use crate::{Error, Result};

/// Relation label of co-occurrence edges.
pub const CO_MENTION: &str = "co-mention";

/// How edges are generated from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeMethod {
    /// Every pair of entities annotated in the same document
    #[default]
    CoOccurrence,
    /// Expert-curated relations between standardized entities
    Relation,
    /// Relations extracted from the abstract by a language model
    Semantic,
}

impl EdgeMethod {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().replace('_', "-").as_str() {
            "co-occurrence" | "cooccurrence" | "co-mention" => Ok(EdgeMethod::CoOccurrence),
            "relation" | "relations" => Ok(EdgeMethod::Relation),
            "semantic" => Ok(EdgeMethod::Semantic),
            other => Err(Error::InvalidArgument(format!("unknown edge method '{}'", other))),
        }
    }
}

/// Finalization parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    /// Per-document importance weights
    pub weights: Option<DocumentWeights>,
    pub weighting: WeightingMethod,
    pub cutoff: EdgeCutoff,
    pub keep_communities: bool,
    /// 0 keeps every edge
    pub max_edges: usize,
}

/// Accumulates documents into a [`GraphStore`] and finalizes it.
///
/// Single owner; the store is not safe for concurrent mutation.
pub struct GraphBuilder {
    method: EdgeMethod,
    scope: NodeScope,
    extractor: Option<SemanticRelationExtractor>,
    graph: GraphStore,
}

impl GraphBuilder {
    /// Fails eagerly when the semantic strategy has no extractor.
    pub fn new(
        method: EdgeMethod,
        scope: NodeScope,
        extractor: Option<SemanticRelationExtractor>,
    ) -> Result<Self> {
        if method == EdgeMethod::Semantic && extractor.is_none() {
            return Err(Error::Configuration(
                "semantic edge method requires a chat model client".to_string(),
            ));
        }

        Ok(Self {
            method,
            scope,
            extractor,
            graph: GraphStore::new(),
        })
    }

    pub fn method(&self) -> EdgeMethod {
        self.method
    }

    /// Accumulated (unfinalized) graph.
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn extractor(&self) -> Option<&SemanticRelationExtractor> {
        self.extractor.as_ref()
    }

    /// Register the nodes of one document and, unless deferred, its edges.
    ///
    /// Returns the entities this document touched.
    pub async fn add_document(
        &mut self,
        doc: &Document,
        use_standardized_names: bool,
        compute_edges: bool,
    ) -> MentionSet {
        let mentions = MentionSet::collect(doc, self.scope, use_standardized_names);
        for mention in mentions.iter() {
            self.graph.upsert_node(mention);
        }
        self.graph
            .record_document(&doc.id, &doc.title, doc.abstract_body());
        metrics::record_document_ingested();

        if compute_edges {
            match self.method {
                EdgeMethod::CoOccurrence => self.add_co_occurrence_edges(doc, &mentions),
                EdgeMethod::Relation => self.add_relation_edges(doc, &mentions),
                EdgeMethod::Semantic => self.add_semantic_edges(doc, &mentions).await,
            }
        }

        debug!(document = %doc.id, entities = mentions.len(), "Added document");
        mentions
    }

    /// Add a batch of documents.
    ///
    /// The semantic strategy ingests every document first, then analyzes the
    /// whole batch concurrently and merges the results; the other strategies
    /// process documents one by one.
    pub async fn add_collection(&mut self, documents: &[Document], use_standardized_names: bool) {
        if self.method != EdgeMethod::Semantic {
            for doc in documents {
                self.add_document(doc, use_standardized_names, true).await;
            }
            return;
        }

        let mut by_document = HashMap::with_capacity(documents.len());
        for doc in documents {
            let mentions = self.add_document(doc, use_standardized_names, false).await;
            by_document.insert(doc.id.clone(), mentions);
        }

        let Some(extractor) = self.extractor.clone() else {
            return;
        };
        let workers = extractor.config().max_workers;
        let edges = extractor
            .analyze_collection(documents, &by_document, workers)
            .await;

        let mut merged = 0;
        for edge in edges {
            if self.graph.merge_edge(EdgeUpdate::from(edge)) {
                merged += 1;
            }
        }
        info!(documents = documents.len(), edges = merged, "Merged semantic edges");
    }

    fn add_co_occurrence_edges(&mut self, doc: &Document, mentions: &MentionSet) {
        let keys: Vec<&str> = mentions.keys().collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                self.graph
                    .merge_edge(EdgeUpdate::new(*a, *b, doc.id.clone(), CO_MENTION));
            }
        }
    }

    fn add_relation_edges(&mut self, doc: &Document, mentions: &MentionSet) {
        let standardized = mentions.standardized_keys();

        for relation in &doc.relations {
            let resolved = (
                resolve_entity(&relation.entity1, &standardized),
                resolve_entity(&relation.entity2, &standardized),
            );
            match resolved {
                (Some(a), Some(b)) => {
                    self.graph.merge_edge(EdgeUpdate::new(
                        a,
                        b,
                        doc.id.clone(),
                        relation.relation_type.clone(),
                    ));
                }
                _ => debug!(
                    document = %doc.id,
                    entity1 = %relation.entity1,
                    entity2 = %relation.entity2,
                    "Dropping unresolvable relation"
                ),
            }
        }
    }

    async fn add_semantic_edges(&mut self, doc: &Document, mentions: &MentionSet) {
        let Some(extractor) = self.extractor.clone() else {
            return;
        };

        match extractor.analyze_document(doc, mentions).await {
            Ok(edges) => {
                for edge in edges {
                    self.graph.merge_edge(EdgeUpdate::from(edge));
                }
            }
            Err(err) => error!(document = %doc.id, "Semantic analysis failed: {}", err),
        }
    }

    /// Full graph with counts and weights computed but nothing pruned.
    ///
    /// This is the pristine snapshot [`GraphStore::refiltered`] expects.
    pub fn full_snapshot(
        &self,
        weights: Option<&DocumentWeights>,
        weighting: WeightingMethod,
    ) -> GraphStore {
        let mut graph = self.graph.clone();
        graph.compute_node_counts(weights);
        graph.compute_edge_counts(weights);
        graph.recalculate_edge_weights(weighting);
        graph
    }

    /// Run the finalization pipeline on a copy of the accumulated graph.
    ///
    /// Pure in the stored counts: calling it twice with the same options
    /// gives identical weights.
    pub fn build(&self, options: &BuildOptions) -> GraphStore {
        let started = Instant::now();
        let mut graph = self.full_snapshot(options.weights.as_ref(), options.weighting);
        graph.metadata.max_edges = options.max_edges;

        let cut = graph.remove_edges_outside(options.cutoff);
        let dropped = graph.keep_top_edges(options.max_edges);
        let isolated = graph.remove_isolated_nodes();

        let self_loops = graph.self_loop_count();
        if self_loops > 0 {
            warn!(self_loops, "Graph contains self-loops");
        }

        layout::apply(&mut graph);
        if options.keep_communities {
            community::collapse(&mut graph);
        }

        metrics::record_build(started.elapsed(), graph.node_count(), graph.edge_count());
        info!(
            documents = graph.metadata.document_count,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            communities = graph.metadata.num_communities,
            below_cutoff = cut,
            over_limit = dropped,
            isolated,
            "Graph built"
        );
        graph
    }
}

/// Resolve an expert-relation identifier (`id` or `Type|id`) against node keys.
fn resolve_entity(identifier: &str, candidates: &[&str]) -> Option<String> {
    let identifier = identifier.trim();
    if candidates.contains(&identifier) {
        return Some(identifier.to_string());
    }
    let (_, bare) = identifier.split_once('|')?;
    candidates
        .contains(&bare)
        .then(|| bare.to_string())
}
