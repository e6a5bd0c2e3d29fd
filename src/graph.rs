//! Compact weighted graph representation used by the optimisation engine.
//!
//! The public API accepts `petgraph` graphs; internally the engine works on
//! [`Network`], a flat weighted adjacency structure tuned for the access
//! pattern of local moving: per-vertex neighbor+weight enumeration, cached
//! strengths, and cheap aggregation into a coarser graph.
//!
//! ## Conventions
//!
//! - `total_weight` counts each undirected edge once and each self-loop once.
//! - Self-loops live outside the adjacency lists (in a per-vertex slot), so
//!   neighbor enumeration never yields the vertex itself.
//! - Undirected strength counts self-loops twice (the usual degree
//!   convention); directed out/in strengths count them once.
//! - Every vertex carries a *node size*: the number of original vertices it
//!   represents. Base graphs have size 1 everywhere; aggregation sums sizes.
//!   Size-based quality functions (CPM, RBER, Significance, Surprise) depend
//!   on this to stay consistent across coarsening levels.

use crate::error::{Error, Result};
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Immutable weighted graph with aggregation support.
///
/// Construct one from an edge list or a `petgraph` graph, then share it
/// read-only (via `Arc`) across partitions.
#[derive(Debug, Clone)]
pub struct Network {
    n: usize,
    directed: bool,
    /// Out-adjacency, self-loops excluded, sorted by neighbor id.
    out_adj: Vec<Vec<(usize, f64)>>,
    /// In-adjacency for directed graphs; empty when undirected.
    in_adj: Vec<Vec<(usize, f64)>>,
    self_weight: Vec<f64>,
    node_size: Vec<usize>,
    strength_out: Vec<f64>,
    strength_in: Vec<f64>,
    total_weight: f64,
    total_node_size: usize,
}

impl Network {
    /// Build a network from an explicit edge list.
    ///
    /// For undirected networks each `(u, v, w)` entry is a single edge;
    /// parallel entries accumulate. Self-loops are allowed and tracked
    /// separately from the adjacency lists.
    pub fn from_edges(n: usize, directed: bool, edges: &[(usize, usize, f64)]) -> Result<Self> {
        Self::from_parts(n, directed, edges, vec![1; n])
    }

    /// Convert a `petgraph` undirected graph, taking every edge with unit weight.
    pub fn from_graph<N, E>(graph: &UnGraph<N, E>) -> Result<Self> {
        let edges: Vec<(usize, usize, f64)> = graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), 1.0))
            .collect();
        Self::from_edges(graph.node_count(), false, &edges)
    }

    /// Convert a `petgraph` undirected graph with `f64` edge weights.
    pub fn from_weighted_graph<N>(graph: &UnGraph<N, f64>) -> Result<Self> {
        let edges: Vec<(usize, usize, f64)> = graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), *e.weight()))
            .collect();
        Self::from_edges(graph.node_count(), false, &edges)
    }

    fn from_parts(
        n: usize,
        directed: bool,
        edges: &[(usize, usize, f64)],
        node_size: Vec<usize>,
    ) -> Result<Self> {
        let mut out_adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut in_adj: Vec<Vec<(usize, f64)>> = if directed {
            vec![Vec::new(); n]
        } else {
            Vec::new()
        };
        let mut self_weight = vec![0.0; n];

        for &(u, v, w) in edges {
            if u >= n {
                return Err(Error::VertexOutOfRange { vertex: u, n });
            }
            if v >= n {
                return Err(Error::VertexOutOfRange { vertex: v, n });
            }
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidParameter {
                    name: "weight",
                    message: "edge weights must be finite and non-negative",
                });
            }
            if u == v {
                self_weight[u] += w;
            } else if directed {
                out_adj[u].push((v, w));
                in_adj[v].push((u, w));
            } else {
                out_adj[u].push((v, w));
                out_adj[v].push((u, w));
            }
        }

        for adj in out_adj.iter_mut().chain(in_adj.iter_mut()) {
            merge_parallel(adj);
        }

        Ok(Self::assemble(
            n,
            directed,
            out_adj,
            in_adj,
            self_weight,
            node_size,
        ))
    }

    /// Finish construction: cache strengths and totals.
    fn assemble(
        n: usize,
        directed: bool,
        out_adj: Vec<Vec<(usize, f64)>>,
        in_adj: Vec<Vec<(usize, f64)>>,
        self_weight: Vec<f64>,
        node_size: Vec<usize>,
    ) -> Self {
        let mut strength_out = vec![0.0; n];
        let mut strength_in = vec![0.0; n];
        let mut adj_sum = 0.0;

        for v in 0..n {
            let out: f64 = out_adj[v].iter().map(|&(_, w)| w).sum();
            adj_sum += out;
            if directed {
                let inw: f64 = in_adj[v].iter().map(|&(_, w)| w).sum();
                strength_out[v] = out + self_weight[v];
                strength_in[v] = inw + self_weight[v];
            } else {
                // Self-loops count twice toward undirected degree.
                strength_out[v] = out + 2.0 * self_weight[v];
                strength_in[v] = strength_out[v];
            }
        }

        let self_sum: f64 = self_weight.iter().sum();
        let total_weight = if directed {
            adj_sum + self_sum
        } else {
            adj_sum / 2.0 + self_sum
        };
        let total_node_size = node_size.iter().sum();

        Self {
            n,
            directed,
            out_adj,
            in_adj,
            self_weight,
            node_size,
            strength_out,
            strength_in,
            total_weight,
            total_node_size,
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.n
    }

    /// Whether edges are directed.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Total edge weight `m` (undirected edges once, self-loops once).
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Out-neighbors of `v` with weights, self-loops excluded.
    pub fn neighbors_out(&self, v: usize) -> &[(usize, f64)] {
        &self.out_adj[v]
    }

    /// In-neighbors of `v` with weights, self-loops excluded.
    ///
    /// For undirected networks this is the same list as [`neighbors_out`].
    ///
    /// [`neighbors_out`]: Network::neighbors_out
    pub fn neighbors_in(&self, v: usize) -> &[(usize, f64)] {
        if self.directed {
            &self.in_adj[v]
        } else {
            &self.out_adj[v]
        }
    }

    /// Self-loop weight of `v`.
    pub fn self_weight(&self, v: usize) -> f64 {
        self.self_weight[v]
    }

    /// Weighted out-strength of `v` (see module docs for the self-loop convention).
    pub fn strength_out(&self, v: usize) -> f64 {
        self.strength_out[v]
    }

    /// Weighted in-strength of `v`.
    pub fn strength_in(&self, v: usize) -> f64 {
        self.strength_in[v]
    }

    /// Number of original vertices represented by `v`.
    pub fn node_size(&self, v: usize) -> usize {
        self.node_size[v]
    }

    /// Sum of node sizes: the vertex count of the graph this network was
    /// (transitively) aggregated from.
    pub fn total_node_size(&self) -> usize {
        self.total_node_size
    }

    /// Number of possible edges among `size` original vertices, honoring
    /// directedness. Self-pairs are excluded.
    pub fn possible_pairs(&self, size: f64) -> f64 {
        if self.directed {
            size * (size - 1.0)
        } else {
            size * (size - 1.0) / 2.0
        }
    }

    /// Graph density: total weight over possible pairs of original vertices.
    pub fn density(&self) -> f64 {
        let pairs = self.possible_pairs(self.total_node_size as f64);
        if pairs > 0.0 {
            self.total_weight / pairs
        } else {
            0.0
        }
    }

    /// Aggregate by a dense community assignment.
    ///
    /// Produces a coarser network with one vertex per community: inter-community
    /// weights are summed, intra-community weight (including member self-loops)
    /// becomes the coarse vertex's self-loop, and node sizes are summed. Total
    /// weight and summed strengths are conserved. Also returns the fine-vertex
    /// to coarse-vertex map (which equals `membership`).
    ///
    /// `membership` must assign every community id in `[0, k)` to at least one
    /// vertex; sparse assignments fail with `InvariantViolation`.
    pub fn aggregate(&self, membership: &[usize]) -> Result<(Network, Vec<usize>)> {
        if membership.len() != self.n {
            return Err(Error::DimensionMismatch {
                expected: self.n,
                found: membership.len(),
            });
        }
        let k = membership.iter().map(|&c| c + 1).max().unwrap_or(0);
        let mut seen = vec![false; k];
        for &c in membership {
            seen[c] = true;
        }
        if seen.iter().any(|&s| !s) {
            return Err(Error::InvariantViolation(
                "aggregation requires dense community ids".to_string(),
            ));
        }

        let mut self_weight = vec![0.0; k];
        let mut node_size = vec![0; k];
        for v in 0..self.n {
            let c = membership[v];
            self_weight[c] += self.self_weight[v];
            node_size[c] += self.node_size[v];
        }

        // Accumulate coarse edge weights keyed by (source, target) community.
        // Sums are added in deterministic edge order; the map is only drained
        // into per-source lists that get sorted, so iteration order of the map
        // never leaks into the result.
        let mut coarse: HashMap<(usize, usize), f64> = HashMap::new();
        for u in 0..self.n {
            let cu = membership[u];
            for &(v, w) in &self.out_adj[u] {
                if !self.directed && u > v {
                    continue;
                }
                let cv = membership[v];
                if cu == cv {
                    self_weight[cu] += w;
                } else {
                    *coarse.entry((cu, cv)).or_insert(0.0) += w;
                }
            }
        }

        let mut out_adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); k];
        let mut in_adj: Vec<Vec<(usize, f64)>> = if self.directed {
            vec![Vec::new(); k]
        } else {
            Vec::new()
        };
        for (&(cu, cv), &w) in &coarse {
            if self.directed {
                out_adj[cu].push((cv, w));
                in_adj[cv].push((cu, w));
            } else {
                out_adj[cu].push((cv, w));
                out_adj[cv].push((cu, w));
            }
        }
        for adj in out_adj.iter_mut().chain(in_adj.iter_mut()) {
            merge_parallel(adj);
        }

        let network = Self::assemble(k, self.directed, out_adj, in_adj, self_weight, node_size);
        Ok((network, membership.to_vec()))
    }
}

/// Sort an adjacency list by neighbor id and merge duplicate entries.
fn merge_parallel(adj: &mut Vec<(usize, f64)>) {
    adj.sort_unstable_by_key(|&(v, _)| v);
    let mut merged: Vec<(usize, f64)> = Vec::with_capacity(adj.len());
    for &(v, w) in adj.iter() {
        match merged.last_mut() {
            Some(last) if last.0 == v => last.1 += w,
            _ => merged.push((v, w)),
        }
    }
    *adj = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring4() -> Network {
        Network::from_edges(4, false, &[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (3, 0, 1.0)])
            .unwrap()
    }

    #[test]
    fn test_from_edges_basic() {
        let g = ring4();
        assert_eq!(g.vertex_count(), 4);
        assert!(!g.is_directed());
        assert!((g.total_weight() - 4.0).abs() < 1e-12);
        for v in 0..4 {
            assert_eq!(g.neighbors_out(v).len(), 2);
            assert!((g.strength_out(v) - 2.0).abs() < 1e-12);
            assert_eq!(g.node_size(v), 1);
        }
    }

    #[test]
    fn test_parallel_edges_accumulate() {
        let g = Network::from_edges(2, false, &[(0, 1, 1.0), (1, 0, 2.5)]).unwrap();
        assert_eq!(g.neighbors_out(0), &[(1, 3.5)]);
        assert!((g.total_weight() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_self_loop_conventions() {
        let g = Network::from_edges(2, false, &[(0, 0, 2.0), (0, 1, 1.0)]).unwrap();
        assert!(g.neighbors_out(0).iter().all(|&(v, _)| v != 0));
        assert!((g.self_weight(0) - 2.0).abs() < 1e-12);
        // Undirected strength counts the loop twice.
        assert!((g.strength_out(0) - 5.0).abs() < 1e-12);
        assert!((g.total_weight() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_directed_strengths() {
        let g = Network::from_edges(3, true, &[(0, 1, 1.0), (1, 2, 2.0), (2, 2, 0.5)]).unwrap();
        assert!((g.strength_out(0) - 1.0).abs() < 1e-12);
        assert!((g.strength_in(1) - 1.0).abs() < 1e-12);
        assert!((g.strength_out(1) - 2.0).abs() < 1e-12);
        assert!((g.strength_in(2) - 2.5).abs() < 1e-12);
        assert!((g.strength_out(2) - 0.5).abs() < 1e-12);
        assert!((g.total_weight() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_edges_rejected() {
        assert!(matches!(
            Network::from_edges(2, false, &[(0, 2, 1.0)]),
            Err(Error::VertexOutOfRange { vertex: 2, n: 2 })
        ));
        assert!(matches!(
            Network::from_edges(2, false, &[(0, 1, -1.0)]),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            Network::from_edges(2, false, &[(0, 1, f64::NAN)]),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_from_petgraph_unit_weights() {
        let mut graph = UnGraph::<(), ()>::new_undirected();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let c = graph.add_node(());
        let _ = graph.add_edge(a, b, ());
        let _ = graph.add_edge(b, c, ());

        let g = Network::from_graph(&graph).unwrap();
        assert_eq!(g.vertex_count(), 3);
        assert!((g.total_weight() - 2.0).abs() < 1e-12);
        assert!((g.strength_out(1) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_conserves_totals() {
        // Two triangles joined by one bridge, merged pairwise.
        let edges = [
            (0, 1, 1.0),
            (1, 2, 1.0),
            (0, 2, 1.0),
            (3, 4, 1.0),
            (4, 5, 1.0),
            (3, 5, 1.0),
            (2, 3, 1.0),
        ];
        let g = Network::from_edges(6, false, &edges).unwrap();
        let membership = [0, 0, 0, 1, 1, 1];
        let (coarse, map) = g.aggregate(&membership).unwrap();

        assert_eq!(map, membership.to_vec());
        assert_eq!(coarse.vertex_count(), 2);
        assert_eq!(coarse.node_size(0), 3);
        assert_eq!(coarse.total_node_size(), 6);
        assert!((coarse.total_weight() - g.total_weight()).abs() < 1e-12);
        // Intra-triangle weight became self-loops.
        assert!((coarse.self_weight(0) - 3.0).abs() < 1e-12);
        assert_eq!(coarse.neighbors_out(0), &[(1, 1.0)]);
        // Summed strengths are conserved.
        let fine: f64 = (0..6).map(|v| g.strength_out(v)).sum();
        let agg: f64 = (0..2).map(|v| coarse.strength_out(v)).sum();
        assert!((fine - agg).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_rejects_sparse_ids() {
        let g = ring4();
        assert!(matches!(
            g.aggregate(&[0, 0, 2, 2]),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            g.aggregate(&[0, 0, 1]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_density() {
        let g = ring4();
        // 4 edges of weight 1 over C(4,2) = 6 pairs.
        assert!((g.density() - 4.0 / 6.0).abs() < 1e-12);
    }
}
