//! 2-D node placement for visualization.
//!
//! Force-directed (Fruchterman-Reingold) layout weighted by `edge_weight` for
//! graphs up to [`SPRING_EDGE_LIMIT`] edges, circular beyond that.

use std::collections::HashMap;
use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::store::{GraphStore, Position};

/// Above this many edges the spring layout is skipped.
pub const SPRING_EDGE_LIMIT: usize = 1000;

const SCALE: f64 = 300.0;
const OPTIMAL_DISTANCE: f64 = 0.25;
const ITERATIONS: usize = 15;
const SEED: u64 = 42;

/// Assign a position to every node of the graph.
pub fn apply(graph: &mut GraphStore) {
    let positions = if graph.edge_count() <= SPRING_EDGE_LIMIT {
        spring_layout(graph, SEED)
    } else {
        debug!(edges = graph.edge_count(), "Large graph, using circular layout");
        circular_layout(graph)
    };

    for (id, position) in positions {
        graph.set_position(&id, position);
    }
}

/// Nodes evenly spaced on a circle of radius [`SCALE`], in encounter order.
pub fn circular_layout(graph: &GraphStore) -> Vec<(String, Position)> {
    let nodes = graph.nodes_in_encounter_order();
    let n = nodes.len();

    if n == 1 {
        return vec![(nodes[0].id.clone(), Position { x: 0.0, y: 0.0 })];
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let angle = TAU * i as f64 / n as f64;
            (
                node.id.clone(),
                Position {
                    x: SCALE * angle.cos(),
                    y: SCALE * angle.sin(),
                },
            )
        })
        .collect()
}

/// Seeded Fruchterman-Reingold layout rescaled to `[-SCALE, SCALE]`.
pub fn spring_layout(graph: &GraphStore, seed: u64) -> Vec<(String, Position)> {
    let nodes = graph.nodes_in_encounter_order();
    let n = nodes.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![(nodes[0].id.clone(), Position { x: 0.0, y: 0.0 })];
    }

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();

    let mut weights = vec![vec![0.0_f64; n]; n];
    for edge in graph.edges() {
        let endpoints = (index.get(edge.source.as_str()), index.get(edge.target.as_str()));
        if let (Some(&i), Some(&j)) = endpoints {
            if i != j {
                weights[i][j] = edge.edge_weight;
                weights[j][i] = edge.edge_weight;
            }
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut pos: Vec<[f64; 2]> = (0..n).map(|_| [rng.gen::<f64>(), rng.gen::<f64>()]).collect();

    let span = |axis: usize, pos: &[[f64; 2]]| {
        let (min, max) = pos.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[axis]), hi.max(p[axis]))
        });
        max - min
    };
    let mut temperature = span(0, &pos).max(span(1, &pos)) * 0.1;
    let cooling = temperature / (ITERATIONS as f64 + 1.0);
    let k = OPTIMAL_DISTANCE;

    for _ in 0..ITERATIONS {
        let mut displacement = vec![[0.0_f64; 2]; n];

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dx = pos[i][0] - pos[j][0];
                let dy = pos[i][1] - pos[j][1];
                let distance = (dx * dx + dy * dy).sqrt().max(0.01);
                // repulsion minus weighted attraction
                let force = k * k / (distance * distance) - weights[i][j] * distance / k;
                displacement[i][0] += dx * force;
                displacement[i][1] += dy * force;
            }
        }

        for i in 0..n {
            let [dx, dy] = displacement[i];
            let mut length = (dx * dx + dy * dy).sqrt();
            if length < 0.01 {
                length = 0.1;
            }
            pos[i][0] += dx * temperature / length;
            pos[i][1] += dy * temperature / length;
        }
        temperature -= cooling;
    }

    rescale(&mut pos, SCALE);

    nodes
        .iter()
        .zip(pos)
        .map(|(node, [x, y])| (node.id.clone(), Position { x, y }))
        .collect()
}

/// Center on the origin and scale so the largest coordinate equals `scale`.
fn rescale(pos: &mut [[f64; 2]], scale: f64) {
    let n = pos.len() as f64;
    let mean_x = pos.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y = pos.iter().map(|p| p[1]).sum::<f64>() / n;

    let mut limit = 0.0_f64;
    for p in pos.iter_mut() {
        p[0] -= mean_x;
        p[1] -= mean_y;
        limit = limit.max(p[0].abs()).max(p[1].abs());
    }

    if limit > 0.0 {
        for p in pos.iter_mut() {
            p[0] *= scale / limit;
            p[1] *= scale / limit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::document::NodeMention;
    use crate::graph::store::EdgeUpdate;

    fn path_graph(len: usize) -> GraphStore {
        let mut graph = GraphStore::new();
        for i in 0..len {
            graph.upsert_node(&NodeMention {
                key: format!("n{}", i),
                document_id: "1".into(),
                name: format!("N{}", i),
                semantic_type: "Gene".into(),
                standardized_id: String::new(),
            });
        }
        for i in 1..len {
            let (prev, next) = (format!("n{}", i - 1), format!("n{}", i));
            graph.merge_edge(EdgeUpdate::new(prev, next, "1", "co-mention"));
        }
        graph.compute_node_counts(None);
        graph.compute_edge_counts(None);
        graph.recalculate_edge_weights(crate::graph::store::WeightingMethod::Frequency);
        graph
    }

    #[test]
    fn spring_layout_is_deterministic_and_bounded() {
        let graph = path_graph(6);
        let first = spring_layout(&graph, 7);
        let second = spring_layout(&graph, 7);
        assert_eq!(first, second);

        let max = first
            .iter()
            .map(|(_, p)| p.x.abs().max(p.y.abs()))
            .fold(0.0, f64::max);
        assert!((max - SCALE).abs() < 1e-6);
    }

    #[test]
    fn circular_layout_places_nodes_on_radius() {
        let graph = path_graph(4);
        for (_, p) in circular_layout(&graph) {
            let radius = (p.x * p.x + p.y * p.y).sqrt();
            assert!((radius - SCALE).abs() < 1e-6);
        }
    }

    #[test]
    fn apply_sets_every_position() {
        let mut graph = path_graph(3);
        apply(&mut graph);
        assert!(graph.nodes().all(|n| n.position.is_some()));
    }

    #[test]
    fn single_node_sits_at_origin() {
        let graph = path_graph(1);
        let layout = spring_layout(&graph, 1);
        assert_eq!(layout[0].1, Position { x: 0.0, y: 0.0 });
    }
}
