//! Modularity clustering (Louvain) and the collapsed community view.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;
use uuid::Uuid;

use super::npmi::MIN_EDGE_WIDTH;
use super::store::{ordered, CommunityEdge, CommunityNode, CommunityView, EdgeKey, GraphStore};

/// Seed for the node visiting order.
pub const LOUVAIN_SEED: u64 = 1;

/// Dampening factor applied to `ln(sum)` of aggregated inter-community weight.
const INTER_EDGE_FACTOR: f64 = 5.0;

/// Weighted graph over dense indices, possibly with self-loops after aggregation.
struct Level {
    adjacency: Vec<BTreeMap<usize, f64>>,
    self_loops: Vec<f64>,
}

impl Level {
    fn len(&self) -> usize {
        self.adjacency.len()
    }

    fn degree(&self, node: usize) -> f64 {
        self.adjacency[node].values().sum::<f64>() + 2.0 * self.self_loops[node]
    }
}

/// Partition node indices `0..n` into communities by Louvain modularity
/// maximization. Communities are returned sorted by their smallest member.
pub fn louvain(n: usize, edges: &[(usize, usize, f64)], seed: u64) -> Vec<Vec<usize>> {
    let mut level = Level {
        adjacency: vec![BTreeMap::new(); n],
        self_loops: vec![0.0; n],
    };
    for &(u, v, w) in edges {
        if w <= 0.0 {
            continue;
        }
        if u == v {
            level.self_loops[u] += w;
        } else {
            *level.adjacency[u].entry(v).or_insert(0.0) += w;
            *level.adjacency[v].entry(u).or_insert(0.0) += w;
        }
    }

    // membership[original] = node of the current level
    let mut membership: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);

    loop {
        let (assignment, improved) = one_level(&level, &mut rng);
        if !improved {
            break;
        }
        for m in membership.iter_mut() {
            *m = assignment[*m];
        }
        level = aggregate(&level, &assignment);
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, &community) in membership.iter().enumerate() {
        groups.entry(community).or_default().push(node);
    }
    let mut communities: Vec<Vec<usize>> = groups.into_values().collect();
    communities.sort_by_key(|members| members[0]);
    communities
}

/// Local moving phase. Returns compact community labels per node.
fn one_level(level: &Level, rng: &mut StdRng) -> (Vec<usize>, bool) {
    let n = level.len();
    let degrees: Vec<f64> = (0..n).map(|i| level.degree(i)).collect();
    let total: f64 = degrees.iter().sum();

    let mut community: Vec<usize> = (0..n).collect();
    if total <= 0.0 {
        return (community, false);
    }

    let mut totals = degrees.clone();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let mut improved = false;
    loop {
        let mut moved = false;

        for &node in &order {
            let current = community[node];
            let k = degrees[node];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (&other, &w) in &level.adjacency[node] {
                *links.entry(community[other]).or_insert(0.0) += w;
            }

            totals[current] -= k;
            let gain = |c: usize, w: f64, totals: &[f64]| w - totals[c] * k / total;

            let mut best = current;
            let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0), &totals);
            for (&candidate, &w) in &links {
                let g = gain(candidate, w, &totals);
                if g > best_gain + 1e-12 {
                    best = candidate;
                    best_gain = g;
                }
            }

            totals[best] += k;
            if best != current {
                community[node] = best;
                moved = true;
                improved = true;
            }
        }

        if !moved {
            break;
        }
    }

    // relabel compactly in order of first appearance
    let mut labels: HashMap<usize, usize> = HashMap::new();
    for c in community.iter_mut() {
        let next = labels.len();
        *c = *labels.entry(*c).or_insert(next);
    }

    (community, improved)
}

fn aggregate(level: &Level, assignment: &[usize]) -> Level {
    let size = assignment.iter().copied().max().map_or(0, |m| m + 1);
    let mut next = Level {
        adjacency: vec![BTreeMap::new(); size],
        self_loops: vec![0.0; size],
    };

    for node in 0..level.len() {
        let cu = assignment[node];
        next.self_loops[cu] += level.self_loops[node];
        for (&other, &w) in &level.adjacency[node] {
            let cv = assignment[other];
            if cu == cv {
                // each internal edge is visited from both ends
                next.self_loops[cu] += w / 2.0;
            } else {
                *next.adjacency[cu].entry(cv).or_insert(0.0) += w;
            }
        }
    }
    next
}

/// Cluster the graph and attach a [`CommunityView`].
///
/// Members get `community_id` set; the original edges stay in the store and
/// the inter-community ones are listed in [`CommunityView::absorbed`].
pub fn collapse(graph: &mut GraphStore) {
    let nodes: Vec<String> = graph
        .nodes_in_encounter_order()
        .into_iter()
        .map(|n| n.id.clone())
        .collect();
    if nodes.is_empty() {
        return;
    }

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let edges: Vec<(usize, usize, f64)> = graph
        .edges()
        .filter_map(|e| {
            Some((
                *index.get(e.source.as_str())?,
                *index.get(e.target.as_str())?,
                e.edge_weight,
            ))
        })
        .collect();

    let partition = louvain(nodes.len(), &edges, LOUVAIN_SEED);

    let mut member_of: HashMap<String, String> = HashMap::new();
    let mut communities = Vec::with_capacity(partition.len());

    for (idx, members) in partition.iter().enumerate() {
        let community_id = format!("c{}", idx);
        let member_ids: Vec<String> = members.iter().map(|&i| nodes[i].clone()).collect();

        let mut representative = &member_ids[0];
        let mut best = f64::NEG_INFINITY;
        for id in &member_ids {
            let degree = graph.weighted_degree(id);
            if degree > best {
                best = degree;
                representative = id;
            }
        }

        let Some(rep_node) = graph.node(representative) else {
            continue;
        };
        let mut node = rep_node.clone();
        node.uid = Uuid::new_v4();
        node.id = community_id.clone();
        node.community_id = None;

        for id in &member_ids {
            member_of.insert(id.clone(), community_id.clone());
        }
        communities.push(CommunityNode {
            node,
            representative: representative.clone(),
            members: member_ids,
        });
    }

    for (id, community) in &member_of {
        graph.set_community(id, Some(community.clone()));
    }

    let mut sums: BTreeMap<EdgeKey, (f64, BTreeSet<String>)> = BTreeMap::new();
    let mut absorbed = BTreeSet::new();
    for edge in graph.edges() {
        let (Some(cu), Some(cv)) = (member_of.get(&edge.source), member_of.get(&edge.target)) else {
            continue;
        };
        if cu == cv {
            continue;
        }
        let (a, b) = ordered(cu, cv);
        let entry = sums.entry((a.to_string(), b.to_string())).or_default();
        entry.0 += edge.edge_weight;
        entry.1.extend(edge.document_ids().map(str::to_string));
        absorbed.insert(edge.key());
    }

    let community_edges: Vec<CommunityEdge> = sums
        .into_iter()
        .map(|((source, target), (sum, document_ids))| {
            let weight = dampened_weight(sum);
            CommunityEdge {
                uid: Uuid::new_v4(),
                source,
                target,
                edge_weight: weight,
                edge_width: weight.max(MIN_EDGE_WIDTH),
                document_ids,
            }
        })
        .collect();

    info!(
        communities = communities.len(),
        inter_edges = community_edges.len(),
        absorbed = absorbed.len(),
        "Collapsed graph into communities"
    );

    graph.metadata.num_communities = communities.len();
    graph.communities = Some(CommunityView {
        communities,
        edges: community_edges,
        absorbed,
    });
}

/// `max(0, ln(sum) * 5)`, with `ln` of a non-positive sum taken as 0.
pub fn dampened_weight(sum: f64) -> f64 {
    if sum <= 0.0 {
        return 0.0;
    }
    (sum.ln() * INTER_EDGE_FACTOR).max(0.0)
}
