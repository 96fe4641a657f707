//! Structural context for chat: entity linking and path descriptions over a
//! finalized graph.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use super::store::{GraphEdge, GraphStore};

pub const NO_ENTITIES: &str = "No specific entities from the graph were found in the query.";
pub const NOT_PRESENT: &str = "Identified entities are not present in the current subnetwork.";

/// Default hop limit for path search.
pub const DEFAULT_MAX_HOPS: usize = 2;

const MAX_NEIGHBORS: usize = 10;
const MAX_PAIRS: usize = 6;
const SUMMARY_LIMIT: usize = 3;

/// Read-only retriever over a finalized [`GraphStore`].
#[derive(Debug, Clone)]
pub struct GraphRetriever {
    graph: Arc<GraphStore>,
    /// lowercase id or display name -> node id
    index: HashMap<String, String>,
}

impl GraphRetriever {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        let mut index = HashMap::new();
        for node in graph.nodes() {
            index.insert(node.id.to_lowercase(), node.id.clone());
        }
        // names win over ids on collision
        for node in graph.nodes() {
            if !node.display_name.trim().is_empty() {
                index.insert(node.display_name.to_lowercase(), node.id.clone());
            }
        }

        debug!(entries = index.len(), "Built graph entity index");
        Self { graph, index }
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Node ids whose id or name occurs in the query, longest matches first.
    pub fn find_relevant_nodes(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();

        let mut keys: Vec<&String> = self.index.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut seen = HashSet::new();
        keys.into_iter()
            .filter(|key| query.contains(key.as_str()))
            .filter_map(|key| self.index.get(key))
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    /// Text description of the neighborhood of one node, or of the paths
    /// connecting several nodes.
    pub fn get_subgraph_context(&self, node_ids: &[String], max_hops: usize) -> String {
        if node_ids.is_empty() {
            return NO_ENTITIES.to_string();
        }

        let valid: Vec<&str> = node_ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.graph.contains_node(id))
            .collect();

        match valid.as_slice() {
            [] => NOT_PRESENT.to_string(),
            [single] => self.describe_neighborhood(single),
            many => self.describe_paths(many, max_hops),
        }
    }

    fn describe_neighborhood(&self, id: &str) -> String {
        let name = self.name(id);
        let mut lines = vec![format!("Entity: {} ({})", name, self.semantic_type(id))];

        let mut neighbors: Vec<(&str, &GraphEdge)> = self
            .graph
            .neighbors(id)
            .filter_map(|other| Some((other, self.graph.edge(id, other)?)))
            .collect();

        if neighbors.is_empty() {
            lines.push(format!("- {} has no connections in this view.", name));
            return lines.join("\n");
        }

        lines.push(format!("- Direct connections ({}):", neighbors.len()));
        neighbors.sort_by(|a, b| {
            b.1.edge_weight
                .partial_cmp(&a.1.edge_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for (other, edge) in neighbors.into_iter().take(MAX_NEIGHBORS) {
            lines.push(format!(
                "  * {} ({}) [{}] (Weight: {})",
                self.name(other),
                self.semantic_type(other),
                summarize_relations(edge),
                edge.edge_weight
            ));
        }
        lines.join("\n")
    }

    fn describe_paths(&self, ids: &[&str], max_hops: usize) -> String {
        let names: Vec<&str> = ids.iter().map(|id| self.name(id)).collect();
        let mut lines = vec![format!("Relational analysis between: {}", names.join(", "))];

        let pairs = ids
            .iter()
            .enumerate()
            .flat_map(|(i, a)| ids[i + 1..].iter().map(move |b| (*a, *b)))
            .take(MAX_PAIRS);

        for (a, b) in pairs {
            match self.shortest_path(a, b, max_hops) {
                Some(path) => lines.push(format!("\nPath: {}", self.format_path(&path))),
                None => lines.push(format!(
                    "\nNo direct connection found between {} and {} within {} hops.",
                    self.name(a),
                    self.name(b),
                    max_hops
                )),
            }
        }
        lines.join("\n")
    }

    /// Unweighted shortest path of at most `max_hops` edges (BFS, neighbors
    /// visited in lexical order).
    pub fn shortest_path(
        &self,
        source: &str,
        target: &str,
        max_hops: usize,
    ) -> Option<Vec<String>> {
        if source == target {
            return Some(vec![source.to_string()]);
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([source]);
        let mut queue = VecDeque::from([(source, 0usize)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth == max_hops {
                continue;
            }
            for next in self.graph.neighbors(node) {
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next, node);
                if next == target {
                    let mut path = vec![target.to_string()];
                    let mut current = target;
                    while let Some(&parent) = parents.get(current) {
                        path.push(parent.to_string());
                        current = parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back((next, depth + 1));
            }
        }
        None
    }

    fn format_path(&self, path: &[String]) -> String {
        let Some(first) = path.first() else {
            return String::new();
        };

        let mut rendered = self.name(first).to_string();
        for hop in path.windows(2) {
            let relations = self
                .graph
                .edge(&hop[0], &hop[1])
                .map_or_else(|| "associated".to_string(), summarize_relations);
            rendered.push_str(&format!(" --[{}]--> {}", relations, self.name(&hop[1])));
        }
        rendered
    }

    fn name<'a>(&'a self, id: &'a str) -> &'a str {
        self.graph
            .node(id)
            .map(|n| n.display_name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(id)
    }

    fn semantic_type<'a>(&'a self, id: &'a str) -> &'a str {
        self.graph
            .node(id)
            .map(|n| n.semantic_type.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or("Entity")
    }
}

/// `types [PMID:a, PMID:b]`: up to three relation labels (or `associated`)
/// and up to three supporting document ids, both sorted.
pub fn summarize_relations(edge: &GraphEdge) -> String {
    let types: BTreeSet<&str> = edge.relation_types();
    let type_str = if types.is_empty() {
        "associated".to_string()
    } else {
        types
            .into_iter()
            .take(SUMMARY_LIMIT)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let citations: Vec<String> = edge
        .document_ids()
        .take(SUMMARY_LIMIT)
        .map(|id| format!("PMID:{}", id))
        .collect();

    if citations.is_empty() {
        type_str
    } else {
        format!("{} [{}]", type_str, citations.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::document::NodeMention;
    use crate::graph::store::{EdgeUpdate, WeightingMethod};

    fn node(graph: &mut GraphStore, id: &str, name: &str, ty: &str) {
        graph.upsert_node(&NodeMention {
            key: id.to_string(),
            document_id: "0".into(),
            name: name.to_string(),
            semantic_type: ty.to_string(),
            standardized_id: String::new(),
        });
    }

    /// GeneA -1- GeneB -2- DrugC, plus an unconnected Orphan.
    fn sample() -> GraphRetriever {
        let mut graph = GraphStore::new();
        node(&mut graph, "1", "GeneA", "Gene");
        node(&mut graph, "2", "GeneB", "Gene");
        node(&mut graph, "3", "DrugC", "Chemical");
        node(&mut graph, "4", "Orphan", "Disease");
        graph.merge_edge(EdgeUpdate::new("1", "2", "123", "activates"));
        graph.merge_edge(EdgeUpdate::new("2", "3", "124", "inhibits"));
        graph.merge_edge(EdgeUpdate::new("2", "3", "125", "binds_to"));
        graph.compute_node_counts(None);
        graph.compute_edge_counts(None);
        graph.recalculate_edge_weights(WeightingMethod::Frequency);
        GraphRetriever::new(Arc::new(graph))
    }

    #[test]
    fn finds_nodes_by_name_case_insensitively() {
        let retriever = sample();
        let found = retriever.find_relevant_nodes("How does drugc affect GENEA?");
        assert_eq!(found.len(), 2);
        assert!(found.contains(&"1".to_string()));
        assert!(found.contains(&"3".to_string()));
    }

    #[test]
    fn longer_names_come_first() {
        let mut graph = GraphStore::new();
        node(&mut graph, "a", "p53", "Gene");
        node(&mut graph, "b", "p53 mutant", "Variant");
        let retriever = GraphRetriever::new(Arc::new(graph));

        let found = retriever.find_relevant_nodes("effects of p53 mutant alleles");
        assert_eq!(found, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn empty_and_unknown_inputs_return_fixed_messages() {
        let retriever = sample();
        assert_eq!(retriever.get_subgraph_context(&[], 2), NO_ENTITIES);
        assert_eq!(retriever.get_subgraph_context(&["ghost".to_string()], 2), NOT_PRESENT);
    }

    #[test]
    fn single_node_lists_neighbors_by_weight() {
        let retriever = sample();
        let context = retriever.get_subgraph_context(&["2".to_string()], 2);

        assert!(context.starts_with("Entity: GeneB (Gene)"));
        assert!(context.contains("- Direct connections (2):"));
        let drug = context.find("DrugC").unwrap();
        let gene = context.find("GeneA").unwrap();
        assert!(drug < gene, "heavier edge first:\n{}", context);
        assert!(context.contains("  * DrugC (Chemical) [binds_to, inhibits [PMID:124, PMID:125]] (Weight: 2)"));
    }

    #[test]
    fn isolated_node_has_no_connections_line() {
        let retriever = sample();
        let context = retriever.get_subgraph_context(&["4".to_string()], 2);
        assert!(context.contains("- Orphan has no connections in this view."));
    }

    #[test]
    fn pair_renders_shortest_path_chain() {
        let retriever = sample();
        let context = retriever.get_subgraph_context(&["1".to_string(), "3".to_string()], 2);

        assert!(context.starts_with("Relational analysis between: GeneA, DrugC"));
        assert!(context.contains(
            "Path: GeneA --[activates [PMID:123]]--> GeneB --[binds_to, inhibits [PMID:124, PMID:125]]--> DrugC"
        ));
    }

    #[test]
    fn path_search_respects_hop_limit() {
        let retriever = sample();
        assert!(retriever.shortest_path("1", "3", 1).is_none());
        assert_eq!(
            retriever.shortest_path("1", "3", 2).unwrap(),
            vec!["1".to_string(), "2".to_string(), "3".to_string()]
        );

        let context = retriever.get_subgraph_context(&["1".to_string(), "3".to_string()], 1);
        assert!(context.contains("No direct connection found between GeneA and DrugC within 1 hops."));
    }

    #[test]
    fn summary_caps_types_and_citations_at_three() {
        let mut graph = GraphStore::new();
        node(&mut graph, "x", "X", "Gene");
        node(&mut graph, "y", "Y", "Gene");
        graph.merge_edge(EdgeUpdate::new("x", "y", "9", "a"));
        graph.merge_edge(EdgeUpdate::new("x", "y", "8", "b"));
        graph.merge_edge(EdgeUpdate::new("x", "y", "7", "c"));
        graph.merge_edge(EdgeUpdate::new("x", "y", "6", "d"));

        let edge = graph.edge("x", "y").unwrap();
        assert_eq!(summarize_relations(edge), "a, b, c [PMID:6, PMID:7, PMID:8]");
    }
}
