use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::community;
use super::document::NodeMention;
use super::layout;
use super::npmi::{npmi, MAX_EDGE_WIDTH, MIN_EDGE_WIDTH, MIN_SUPPORT};
use crate::{Error, Result};

/// Unordered node pair, stored with the lexically smaller id first.
pub type EdgeKey = (String, String);

/// Per-document importance weights (missing documents weigh 1).
pub type DocumentWeights = HashMap<String, f64>;

/// 2-D layout coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Graph node representing one entity across the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Synthetic unique id
    pub uid: Uuid,
    /// Entity key (standardized id, raw id or `type:name`)
    pub id: String,
    pub semantic_type: String,
    pub standardized_id: String,
    pub display_name: String,
    /// Documents mentioning the entity; never empty for a live node
    pub supporting_documents: BTreeSet<String>,
    pub article_count: usize,
    pub weighted_article_count: f64,
    /// Id of the community node this entity was clustered into
    pub community_id: Option<String>,
    pub position: Option<Position>,
    seq: u64,
}

/// Merged evidence between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub uid: Uuid,
    pub source: String,
    pub target: String,
    /// document id -> relation labels; never empty for a live edge
    pub relations_by_document: BTreeMap<String, BTreeSet<String>>,
    /// document id -> relation label -> confidence (semantic edges only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidences_by_document: Option<BTreeMap<String, BTreeMap<String, f64>>>,
    /// document id -> relation label -> supporting quote (semantic edges only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_by_document: Option<BTreeMap<String, BTreeMap<String, String>>>,
    pub num_relations: usize,
    pub weighted_num_relations: f64,
    pub npmi: f64,
    pub edge_weight: f64,
    pub edge_width: f64,
    seq: u64,
}

impl GraphEdge {
    pub fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone())
    }

    /// Id of the endpoint opposite to `node`.
    pub fn other(&self, node: &str) -> &str {
        if self.source == node {
            &self.target
        } else {
            &self.source
        }
    }

    /// Every relation label recorded for this edge.
    pub fn relation_types(&self) -> BTreeSet<&str> {
        self.relations_by_document
            .values()
            .flat_map(|labels| labels.iter().map(String::as_str))
            .collect()
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &str> {
        self.relations_by_document.keys().map(String::as_str)
    }
}

/// One piece of relation evidence to merge into the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeUpdate {
    pub node1: String,
    pub node2: String,
    pub document_id: String,
    pub relation: String,
    pub confidence: Option<f64>,
    pub evidence: Option<String>,
}

impl EdgeUpdate {
    pub fn new(
        node1: impl Into<String>,
        node2: impl Into<String>,
        document_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            node1: node1.into(),
            node2: node2.into(),
            document_id: document_id.into(),
            relation: relation.into(),
            confidence: None,
            evidence: None,
        }
    }
}

/// Synthetic node standing in for a whole cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityNode {
    /// Display attributes copied from the representative member
    pub node: GraphNode,
    /// Member with the highest weighted degree
    pub representative: String,
    pub members: Vec<String>,
}

/// Aggregated link between two communities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityEdge {
    pub uid: Uuid,
    pub source: String,
    pub target: String,
    pub edge_weight: f64,
    pub edge_width: f64,
    pub document_ids: BTreeSet<String>,
}

/// Collapsed view produced by modularity clustering.
///
/// The underlying store keeps every original edge; `absorbed` lists the
/// inter-community edges that the collapsed view replaces with
/// [`CommunityEdge`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityView {
    pub communities: Vec<CommunityNode>,
    pub edges: Vec<CommunityEdge>,
    pub absorbed: BTreeSet<EdgeKey>,
}

impl CommunityView {
    pub fn community(&self, id: &str) -> Option<&CommunityNode> {
        self.communities.iter().find(|c| c.node.id == id)
    }

    pub fn edge_between(&self, a: &str, b: &str) -> Option<&CommunityEdge> {
        let (a, b) = ordered(a, b);
        self.edges.iter().find(|e| e.source == a && e.target == b)
    }
}

/// Edge weighting scheme applied at finalize time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMethod {
    /// Scaled (weighted) number of supporting documents
    #[default]
    Frequency,
    /// Normalized pointwise mutual information
    Npmi,
}

impl WeightingMethod {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "frequency" | "freq" => Ok(WeightingMethod::Frequency),
            "npmi" => Ok(WeightingMethod::Npmi),
            other => Err(Error::InvalidArgument(format!("unknown weighting '{}'", other))),
        }
    }
}

/// Edge width filter: a floor, or an inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeCutoff {
    Floor(f64),
    Range(f64, f64),
}

impl Default for EdgeCutoff {
    fn default() -> Self {
        EdgeCutoff::Floor(0.0)
    }
}

impl EdgeCutoff {
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            EdgeCutoff::Floor(min) => (min, f64::INFINITY),
            EdgeCutoff::Range(min, max) => (min, max),
        }
    }

    pub fn admits(&self, width: f64) -> bool {
        let (min, max) = self.bounds();
        width >= min && width <= max
    }

    /// Parse `"2"` or `"2,10"`.
    pub fn parse(value: &str) -> Result<Self> {
        let parse_one = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| Error::InvalidArgument(format!("invalid cutoff '{}': {}", s, e)))
        };

        match value.split_once(',') {
            Some((min, max)) => {
                let (min, max) = (parse_one(min)?, parse_one(max)?);
                if min > max {
                    return Err(Error::InvalidArgument(format!(
                        "cutoff range is inverted: {} > {}",
                        min, max
                    )));
                }
                Ok(EdgeCutoff::Range(min, max))
            }
            None => Ok(EdgeCutoff::Floor(parse_one(value)?)),
        }
    }
}

/// Graph-level attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub document_titles: BTreeMap<String, String>,
    pub document_abstracts: BTreeMap<String, String>,
    /// Number of ingested documents (`N` for NPMI)
    pub document_count: usize,
    pub weighting: WeightingMethod,
    pub max_edges: usize,
    pub num_communities: usize,
}

/// Parameters for re-filtering a reloaded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    pub weighting: WeightingMethod,
    pub cutoff: EdgeCutoff,
    /// `None` reuses the value recorded at build time
    pub max_edges: Option<usize>,
    pub min_degree: usize,
    pub relayout: bool,
    pub communities: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            weighting: WeightingMethod::Frequency,
            cutoff: EdgeCutoff::default(),
            max_edges: None,
            min_degree: 0,
            relayout: true,
            communities: false,
        }
    }
}

/// Title and abstract of a document backing a set of edges.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDocument {
    pub id: String,
    pub title: String,
    pub abstract_text: String,
}

/// Labeled entity graph (in-memory).
///
/// Mutable while a builder owns it, read-only once handed to retrieval.
/// Deserializing rebuilds the adjacency index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredGraph")]
pub struct GraphStore {
    nodes: BTreeMap<String, GraphNode>,
    #[serde(with = "edge_map")]
    edges: BTreeMap<EdgeKey, GraphEdge>,
    #[serde(skip)]
    adjacency: BTreeMap<String, BTreeSet<String>>,
    pub metadata: GraphMetadata,
    #[serde(default)]
    pub communities: Option<CommunityView>,
    next_seq: u64,
}

/// Serialized form of [`GraphStore`], without the derived adjacency.
#[derive(Deserialize)]
struct StoredGraph {
    nodes: BTreeMap<String, GraphNode>,
    #[serde(with = "edge_map")]
    edges: BTreeMap<EdgeKey, GraphEdge>,
    metadata: GraphMetadata,
    #[serde(default)]
    communities: Option<CommunityView>,
    next_seq: u64,
}

impl From<StoredGraph> for GraphStore {
    fn from(stored: StoredGraph) -> Self {
        let mut graph = GraphStore {
            nodes: stored.nodes,
            edges: stored.edges,
            adjacency: BTreeMap::new(),
            metadata: stored.metadata,
            communities: stored.communities,
            next_seq: stored.next_seq,
        };
        graph.rebuild_adjacency();
        graph
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&GraphEdge> {
        let (a, b) = ordered(a, b);
        self.edges.get(&(a.to_string(), b.to_string()))
    }

    /// Nodes in insertion order.
    pub fn nodes_in_encounter_order(&self) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.seq);
        nodes
    }

    /// Edges in insertion order.
    pub fn edges_in_encounter_order(&self) -> Vec<&GraphEdge> {
        let mut edges: Vec<&GraphEdge> = self.edges.values().collect();
        edges.sort_by_key(|e| e.seq);
        edges
    }

    /// Neighbor ids in lexical order.
    pub fn neighbors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Incident edge count; a self-loop counts twice.
    pub fn degree(&self, id: &str) -> usize {
        self.neighbors(id)
            .map(|other| if other == id { 2 } else { 1 })
            .sum()
    }

    /// Sum of `edge_weight` over incident edges; a self-loop counts twice.
    pub fn weighted_degree(&self, id: &str) -> f64 {
        self.neighbors(id)
            .filter_map(|other| {
                let edge = self.edge(id, other)?;
                let ends = if other == id { 2.0 } else { 1.0 };
                Some(edge.edge_weight * ends)
            })
            .sum()
    }

    pub fn self_loop_count(&self) -> usize {
        self.edges.values().filter(|e| e.source == e.target).count()
    }

    /// Register a document's mention, creating the node on first sight.
    pub(crate) fn upsert_node(&mut self, mention: &NodeMention) {
        if let Some(node) = self.nodes.get_mut(&mention.key) {
            node.supporting_documents
                .insert(mention.document_id.clone());
            return;
        }

        let seq = self.bump_seq();
        self.nodes.insert(
            mention.key.clone(),
            GraphNode {
                uid: Uuid::new_v4(),
                id: mention.key.clone(),
                semantic_type: mention.semantic_type.clone(),
                standardized_id: mention.standardized_id.clone(),
                display_name: mention.name.clone(),
                supporting_documents: BTreeSet::from([mention.document_id.clone()]),
                article_count: 0,
                weighted_article_count: 0.0,
                community_id: None,
                position: None,
                seq,
            },
        );
    }

    /// Merge relation evidence into the edge between two existing nodes.
    ///
    /// Labels are unioned per document; confidence and evidence are keyed
    /// by `(document, relation)`. Returns `false` when an endpoint is unknown.
    pub fn merge_edge(&mut self, update: EdgeUpdate) -> bool {
        if !self.contains_node(&update.node1) || !self.contains_node(&update.node2) {
            warn!(
                node1 = %update.node1,
                node2 = %update.node2,
                document = %update.document_id,
                "Dropping edge with unknown endpoint"
            );
            return false;
        }

        let (a, b) = ordered(&update.node1, &update.node2);
        let key = (a.to_string(), b.to_string());

        if !self.edges.contains_key(&key) {
            let seq = self.bump_seq();
            self.edges.insert(
                key.clone(),
                GraphEdge {
                    uid: Uuid::new_v4(),
                    source: key.0.clone(),
                    target: key.1.clone(),
                    relations_by_document: BTreeMap::new(),
                    confidences_by_document: None,
                    evidence_by_document: None,
                    num_relations: 0,
                    weighted_num_relations: 0.0,
                    npmi: 0.0,
                    edge_weight: 0.0,
                    edge_width: 0.0,
                    seq,
                },
            );
            self.adjacency
                .entry(key.0.clone())
                .or_default()
                .insert(key.1.clone());
            self.adjacency
                .entry(key.1.clone())
                .or_default()
                .insert(key.0.clone());
        }

        let Some(edge) = self.edges.get_mut(&key) else {
            return false;
        };

        edge.relations_by_document
            .entry(update.document_id.clone())
            .or_default()
            .insert(update.relation.clone());

        if let Some(confidence) = update.confidence {
            edge.confidences_by_document
                .get_or_insert_with(BTreeMap::new)
                .entry(update.document_id.clone())
                .or_default()
                .insert(update.relation.clone(), confidence);
        }

        if let Some(evidence) = update.evidence {
            edge.evidence_by_document
                .get_or_insert_with(BTreeMap::new)
                .entry(update.document_id)
                .or_default()
                .insert(update.relation, evidence);
        }

        true
    }

    pub fn remove_edge(&mut self, a: &str, b: &str) -> Option<GraphEdge> {
        let (a, b) = ordered(a, b);
        let removed = self.edges.remove(&(a.to_string(), b.to_string()))?;
        if let Some(set) = self.adjacency.get_mut(a) {
            set.remove(b);
        }
        if let Some(set) = self.adjacency.get_mut(b) {
            set.remove(a);
        }
        Some(removed)
    }

    /// Remove a node together with every incident edge.
    pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
        let neighbors: Vec<String> = self.neighbors(id).map(str::to_string).collect();
        for other in neighbors {
            self.remove_edge(id, &other);
        }
        self.adjacency.remove(id);
        self.nodes.remove(id)
    }

    pub(crate) fn set_position(&mut self, id: &str, position: Position) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.position = Some(position);
        }
    }

    pub(crate) fn set_community(&mut self, id: &str, community: Option<String>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.community_id = community;
        }
    }

    /// Record title/abstract metadata of an ingested document.
    pub(crate) fn record_document(&mut self, id: &str, title: &str, abstract_text: Option<&str>) {
        let previous = self
            .metadata
            .document_titles
            .insert(id.to_string(), title.to_string());
        if previous.is_none() {
            self.metadata.document_count += 1;
        }
        if let Some(text) = abstract_text {
            self.metadata
                .document_abstracts
                .insert(id.to_string(), text.to_string());
        }
    }

    /// Fill `article_count` / `weighted_article_count` for every node.
    pub fn compute_node_counts(&mut self, weights: Option<&DocumentWeights>) {
        for node in self.nodes.values_mut() {
            node.article_count = node.supporting_documents.len();
            node.weighted_article_count = match weights {
                Some(weights) => round2(weighted_sum(node.supporting_documents.iter(), weights)),
                None => node.article_count as f64,
            };
        }
    }

    /// Fill relation counts and NPMI for every edge (node counts must be current).
    pub fn compute_edge_counts(&mut self, weights: Option<&DocumentWeights>) {
        let total = self.metadata.document_count as f64;

        for edge in self.edges.values_mut() {
            edge.num_relations = edge.relations_by_document.len();
            edge.weighted_num_relations = match weights {
                Some(weights) => round2(weighted_sum(edge.relations_by_document.keys(), weights)),
                None => edge.num_relations as f64,
            };

            let n_x = self
                .nodes
                .get(&edge.source)
                .map_or(0.0, |n| n.weighted_article_count);
            let n_y = self
                .nodes
                .get(&edge.target)
                .map_or(0.0, |n| n.weighted_article_count);
            edge.npmi = npmi(n_x, n_y, edge.weighted_num_relations, total, MIN_SUPPORT);
        }
    }

    /// Recompute `edge_weight` / `edge_width` from stored counts.
    pub fn recalculate_edge_weights(&mut self, method: WeightingMethod) {
        if self.edges.is_empty() {
            return;
        }

        let scale = match method {
            WeightingMethod::Npmi => MAX_EDGE_WIDTH,
            WeightingMethod::Frequency => {
                let max_weight = self
                    .edges
                    .values()
                    .map(|e| e.weighted_num_relations)
                    .fold(f64::NEG_INFINITY, f64::max);
                if max_weight > 0.0 {
                    (MAX_EDGE_WIDTH / max_weight).min(1.0)
                } else {
                    1.0
                }
            }
        };

        for edge in self.edges.values_mut() {
            let raw = match method {
                WeightingMethod::Npmi => edge.npmi,
                WeightingMethod::Frequency => edge.weighted_num_relations,
            };
            let scaled = round2((raw * scale).max(0.0));
            edge.edge_weight = scaled;
            edge.edge_width = scaled.max(MIN_EDGE_WIDTH);
        }
        self.metadata.weighting = method;
    }

    /// Drop edges whose width falls outside the cutoff.
    pub fn remove_edges_outside(&mut self, cutoff: EdgeCutoff) -> usize {
        let doomed: Vec<EdgeKey> = self
            .edges
            .values()
            .filter(|e| !cutoff.admits(e.edge_width))
            .map(GraphEdge::key)
            .collect();
        for (a, b) in &doomed {
            self.remove_edge(a, b);
        }
        doomed.len()
    }

    /// Keep the `max_edges` heaviest edges (earlier edges win ties).
    pub fn keep_top_edges(&mut self, max_edges: usize) -> usize {
        if max_edges == 0 || self.edges.len() <= max_edges {
            return 0;
        }

        let mut ranked = self.edges_in_encounter_order();
        ranked.sort_by(|a, b| {
            b.edge_weight
                .partial_cmp(&a.edge_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let doomed: Vec<EdgeKey> = ranked[max_edges..].iter().map(|e| e.key()).collect();

        for (a, b) in &doomed {
            self.remove_edge(a, b);
        }
        doomed.len()
    }

    pub fn remove_isolated_nodes(&mut self) -> usize {
        self.remove_nodes_below_degree(1)
    }

    /// Remove nodes whose degree (measured before any removal) is below `threshold`.
    pub fn remove_nodes_below_degree(&mut self, threshold: usize) -> usize {
        let doomed: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| self.degree(id) < threshold)
            .cloned()
            .collect();
        for id in &doomed {
            self.remove_node(id);
        }
        doomed.len()
    }

    /// Drop any previous clustering.
    pub(crate) fn clear_communities(&mut self) {
        self.communities = None;
        self.metadata.num_communities = 0;
        for node in self.nodes.values_mut() {
            node.community_id = None;
        }
    }

    /// Re-filter a copy of this (full) snapshot; `self` is left untouched.
    pub fn refiltered(&self, options: &FilterOptions) -> GraphStore {
        let mut graph = self.clone();
        graph.clear_communities();

        graph.recalculate_edge_weights(options.weighting);
        graph.remove_edges_outside(options.cutoff);
        graph.keep_top_edges(options.max_edges.unwrap_or(self.metadata.max_edges));
        graph.remove_isolated_nodes();
        graph.remove_nodes_below_degree(options.min_degree);

        if options.relayout {
            layout::apply(&mut graph);
        }
        if options.communities {
            community::collapse(&mut graph);
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Re-filtered graph snapshot"
        );
        graph
    }

    /// Supporting documents of the given edges with title/abstract metadata.
    pub fn documents_for_edges(&self, keys: &[EdgeKey]) -> Vec<EdgeDocument> {
        let ids: BTreeSet<&str> = keys
            .iter()
            .filter_map(|(a, b)| self.edge(a, b))
            .flat_map(GraphEdge::document_ids)
            .collect();

        ids.into_iter()
            .map(|id| EdgeDocument {
                id: id.to_string(),
                title: self
                    .metadata
                    .document_titles
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("Document {}", id)),
                abstract_text: self
                    .metadata
                    .document_abstracts
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| "Abstract not available.".to_string()),
            })
            .collect()
    }

    /// Serialize as an opaque blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_bytes()?)?;
        info!(path = %path.as_ref().display(), "Saved graph snapshot");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    fn rebuild_adjacency(&mut self) {
        self.adjacency.clear();
        for (a, b) in self.edges.keys() {
            self.adjacency.entry(a.clone()).or_default().insert(b.clone());
            self.adjacency.entry(b.clone()).or_default().insert(a.clone());
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

pub(crate) fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn weighted_sum<'a>(ids: impl Iterator<Item = &'a String>, weights: &DocumentWeights) -> f64 {
    ids.map(|id| weights.get(id).copied().unwrap_or(1.0)).sum()
}

/// Edges serialize as a plain list; keys are rebuilt from the endpoints.
mod edge_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{EdgeKey, GraphEdge};

    pub fn serialize<S: Serializer>(
        edges: &BTreeMap<EdgeKey, GraphEdge>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(edges.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<EdgeKey, GraphEdge>, D::Error> {
        let edges = Vec::<GraphEdge>::deserialize(deserializer)?;
        Ok(edges.into_iter().map(|e| (e.key(), e)).collect())
    }
}
