//! Mutable vertex-to-community assignment with incremental bookkeeping.
//!
//! A [`Partition`] owns a membership vector over a shared, read-only
//! [`Network`] plus derived per-community aggregates (node size, vertex
//! count, internal weight, strength sums). The aggregates make a single
//! [`move_node`] O(1) amortized and a [`diff_move`] evaluation O(degree),
//! which is what the local-moving loop spends all of its time on.
//!
//! Community ids are dense integers `[0, k)` after construction or
//! [`renumber_communities`]; moves may vacate slots (left empty, never
//! eagerly removed) and may materialize one new community at id `k`.
//!
//! Aggregation produces a brand-new partition over a brand-new coarser
//! network, and every partition retains an *origin map* (original vertex →
//! vertex of its own network) so any level can be back-projected onto the
//! original vertex set with [`copy_from_graph`].
//!
//! [`move_node`]: Partition::move_node
//! [`diff_move`]: Partition::diff_move
//! [`renumber_communities`]: Partition::renumber_communities
//! [`copy_from_graph`]: Partition::copy_from_graph

use crate::error::{Error, Result};
use crate::graph::Network;
use crate::optimiser::Optimiser;
use crate::quality::QualityFunction;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of one community's incrementally maintained aggregates.
///
/// The virtual empty community (id equal to the community count) reports
/// all-zero aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CommunityAggregates {
    /// Summed node sizes (original vertex count).
    pub(crate) size: f64,
    /// Internal weight: undirected internal edges once, self-loops once,
    /// directed internal arcs once.
    pub(crate) internal: f64,
    /// Summed out-strengths of member vertices.
    pub(crate) k_out: f64,
    /// Summed in-strengths of member vertices.
    pub(crate) k_in: f64,
}

/// A mutable partition of a network's vertices into communities, bound to a
/// quality function.
#[derive(Debug, Clone)]
pub struct Partition {
    graph: Arc<Network>,
    quality_fn: QualityFunction,
    membership: Vec<usize>,
    n_communities: usize,
    /// Per-community node-size sums.
    csize: Vec<f64>,
    /// Per-community current-vertex counts.
    cnodes: Vec<usize>,
    /// Per-community internal weight.
    internal: Vec<f64>,
    k_out: Vec<f64>,
    k_in: Vec<f64>,
    /// Running totals used by the global-ratio quality forms.
    sum_internal: f64,
    sum_pairs: f64,
    /// Original vertex -> vertex of `graph`. Identity for base partitions,
    /// composed through every aggregation.
    origin: Vec<usize>,
}

impl Partition {
    /// Create a singleton partition: every vertex in its own community.
    pub fn singleton(graph: Arc<Network>, quality_fn: QualityFunction) -> Result<Self> {
        let n = graph.vertex_count();
        let membership = (0..n).collect();
        Self::new_inner(graph, quality_fn, membership)
    }

    /// Create a partition from an explicit membership vector.
    ///
    /// The vector length must equal the vertex count; community ids are
    /// renumbered to dense `[0, k)` (ascending by original id).
    pub fn with_membership(
        graph: Arc<Network>,
        quality_fn: QualityFunction,
        membership: Vec<usize>,
    ) -> Result<Self> {
        if membership.len() != graph.vertex_count() {
            return Err(Error::DimensionMismatch {
                expected: graph.vertex_count(),
                found: membership.len(),
            });
        }
        Self::new_inner(graph, quality_fn, renumber_dense(&membership))
    }

    fn new_inner(
        graph: Arc<Network>,
        quality_fn: QualityFunction,
        membership: Vec<usize>,
    ) -> Result<Self> {
        if graph.vertex_count() == 0 {
            return Err(Error::EmptyInput);
        }
        quality_fn.validate()?;
        let origin = (0..graph.total_node_size()).collect();
        let mut partition = Self {
            graph,
            quality_fn,
            membership,
            n_communities: 0,
            csize: Vec::new(),
            cnodes: Vec::new(),
            internal: Vec::new(),
            k_out: Vec::new(),
            k_in: Vec::new(),
            sum_internal: 0.0,
            sum_pairs: 0.0,
            origin,
        };
        partition.rebuild_aggregates();
        Ok(partition)
    }

    /// The network this partition is defined over.
    pub fn graph(&self) -> &Network {
        &self.graph
    }

    /// Shared handle to the network.
    pub fn graph_arc(&self) -> Arc<Network> {
        Arc::clone(&self.graph)
    }

    /// The bound quality function.
    pub fn quality_function(&self) -> &QualityFunction {
        &self.quality_fn
    }

    /// Current membership, indexed by vertex.
    pub fn membership(&self) -> &[usize] {
        &self.membership
    }

    /// Current number of community slots (empty slots included).
    pub fn n_communities(&self) -> usize {
        self.n_communities
    }

    /// Summed node sizes of community `c` (0 for empty or out-of-range slots).
    pub fn community_size(&self, c: usize) -> usize {
        if c < self.n_communities {
            self.csize[c] as usize
        } else {
            0
        }
    }

    /// Number of current-graph vertices in community `c`.
    pub fn community_vertex_count(&self, c: usize) -> usize {
        if c < self.n_communities {
            self.cnodes[c]
        } else {
            0
        }
    }

    /// Internal weight of community `c`.
    pub fn community_internal_weight(&self, c: usize) -> f64 {
        if c < self.n_communities {
            self.internal[c]
        } else {
            0.0
        }
    }

    /// Origin map: original vertex -> vertex of this partition's network.
    pub fn origin_map(&self) -> &[usize] {
        &self.origin
    }

    /// Quality of the current membership under the bound quality function.
    pub fn quality(&self) -> f64 {
        self.quality_fn.quality(self)
    }

    /// Score delta of moving `v` into `target` without mutating anything.
    ///
    /// `target == n_communities()` prices a move into a new empty community.
    pub fn diff_move(&self, v: usize, target: usize) -> Result<f64> {
        self.quality_fn.diff_move(self, v, target)
    }

    pub(crate) fn community_aggregates(&self, c: usize) -> CommunityAggregates {
        if c < self.n_communities {
            CommunityAggregates {
                size: self.csize[c],
                internal: self.internal[c],
                k_out: self.k_out[c],
                k_in: self.k_in[c],
            }
        } else {
            CommunityAggregates {
                size: 0.0,
                internal: 0.0,
                k_out: 0.0,
                k_in: 0.0,
            }
        }
    }

    pub(crate) fn total_internal_weight(&self) -> f64 {
        self.sum_internal
    }

    pub(crate) fn total_internal_pairs(&self) -> f64 {
        self.sum_pairs
    }

    /// Edge weight between `v` and community `c` as `(outgoing, incoming)`
    /// sums, excluding `v`'s own self-loop. O(degree(v)).
    pub(crate) fn weight_between(&self, v: usize, c: usize) -> (f64, f64) {
        let out: f64 = self
            .graph
            .neighbors_out(v)
            .iter()
            .filter(|&&(u, _)| self.membership[u] == c)
            .map(|&(_, w)| w)
            .sum();
        if !self.graph.is_directed() {
            return (out, out);
        }
        let inw: f64 = self
            .graph
            .neighbors_in(v)
            .iter()
            .filter(|&&(u, _)| self.membership[u] == c)
            .map(|&(_, w)| w)
            .sum();
        (out, inw)
    }

    /// Total edge weight between `v` and each community containing at least
    /// one neighbor of `v`, in deterministic first-encounter order.
    ///
    /// O(degree(v)); `v`'s own self-loop is ignored. For directed networks
    /// both edge directions contribute, so the result covers every community
    /// reachable along either orientation.
    pub fn neighbour_community_weights(&self, v: usize) -> Result<Vec<(usize, f64)>> {
        let n = self.graph.vertex_count();
        if v >= n {
            return Err(Error::VertexOutOfRange { vertex: v, n });
        }
        let mut weights: Vec<(usize, f64)> = Vec::new();
        let mut slot: HashMap<usize, usize> = HashMap::new();
        let mut absorb = |comm: usize, w: f64| match slot.entry(comm) {
            Entry::Occupied(entry) => weights[*entry.get()].1 += w,
            Entry::Vacant(entry) => {
                let _ = entry.insert(weights.len());
                weights.push((comm, w));
            }
        };
        for &(u, w) in self.graph.neighbors_out(v) {
            absorb(self.membership[u], w);
        }
        if self.graph.is_directed() {
            for &(u, w) in self.graph.neighbors_in(v) {
                absorb(self.membership[u], w);
            }
        }
        Ok(weights)
    }

    /// Move `v` into community `target`, updating all aggregates.
    ///
    /// `target == n_communities()` materializes a new empty community first;
    /// materializing past the vertex count fails with `InvariantViolation`
    /// (the empty-community guard should have prevented the attempt). The
    /// vacated community is left in place even when it becomes empty.
    pub fn move_node(&mut self, v: usize, target: usize) -> Result<()> {
        let n = self.graph.vertex_count();
        if v >= n {
            return Err(Error::VertexOutOfRange { vertex: v, n });
        }
        if target > self.n_communities {
            return Err(Error::CommunityOutOfRange {
                community: target,
                n_communities: self.n_communities,
            });
        }
        if target == self.n_communities {
            if self.n_communities >= n {
                return Err(Error::InvariantViolation(format!(
                    "cannot materialize community {target}: partition already has as many \
                     communities as vertices ({n})"
                )));
            }
            self.csize.push(0.0);
            self.cnodes.push(0);
            self.internal.push(0.0);
            self.k_out.push(0.0);
            self.k_in.push(0.0);
            self.n_communities += 1;
        }
        let source = self.membership[v];
        if source == target {
            return Ok(());
        }

        let (w_vs_out, w_vs_in) = self.weight_between(v, source);
        let (w_vt_out, w_vt_in) = self.weight_between(v, target);
        let loop_w = self.graph.self_weight(v);
        let removed = if self.graph.is_directed() {
            w_vs_out + w_vs_in + loop_w
        } else {
            w_vs_out + loop_w
        };
        let added = if self.graph.is_directed() {
            w_vt_out + w_vt_in + loop_w
        } else {
            w_vt_out + loop_w
        };

        let size = self.graph.node_size(v) as f64;
        let s_size_before = self.csize[source];
        let t_size_before = self.csize[target];

        self.internal[source] -= removed;
        self.internal[target] += added;
        self.k_out[source] -= self.graph.strength_out(v);
        self.k_out[target] += self.graph.strength_out(v);
        self.k_in[source] -= self.graph.strength_in(v);
        self.k_in[target] += self.graph.strength_in(v);
        self.csize[source] -= size;
        self.csize[target] += size;
        self.cnodes[source] -= 1;
        self.cnodes[target] += 1;

        self.sum_internal = self.sum_internal - removed + added;
        self.sum_pairs = self.sum_pairs
            - self.graph.possible_pairs(s_size_before)
            - self.graph.possible_pairs(t_size_before)
            + self.graph.possible_pairs(self.csize[source])
            + self.graph.possible_pairs(self.csize[target]);

        self.membership[v] = target;
        Ok(())
    }

    /// Compact community ids to dense `[0, k)` over non-empty communities
    /// (ascending by old id) and rebuild the aggregates.
    pub fn renumber_communities(&mut self) {
        self.membership = renumber_dense(&self.membership);
        self.rebuild_aggregates();
    }

    /// Replace the membership wholesale (renumbered to dense ids).
    pub fn set_membership(&mut self, membership: Vec<usize>) -> Result<()> {
        if membership.len() != self.graph.vertex_count() {
            return Err(Error::DimensionMismatch {
                expected: self.graph.vertex_count(),
                found: membership.len(),
            });
        }
        self.membership = renumber_dense(&membership);
        self.rebuild_aggregates();
        Ok(())
    }

    /// Aggregate into a brand-new partition over the coarser network.
    ///
    /// When the optimiser is configured with `refine_partition`, a
    /// constrained refinement sub-pass (the optimiser's `refine_routine` and
    /// `refine_consider_comms`, moves restricted to this partition's
    /// communities) decides the aggregation units instead of the communities
    /// themselves. The result is in singleton form — one aggregated vertex
    /// per unit, each its own community — and retains the composed origin
    /// map for back-projection. `self` is not mutated.
    pub fn aggregate(&self, optimiser: &mut Optimiser, fixed: Option<&[bool]>) -> Result<Partition> {
        let n = self.graph.vertex_count();
        let owned_default;
        let fixed = match fixed {
            Some(f) => {
                if f.len() != n {
                    return Err(Error::DimensionMismatch {
                        expected: n,
                        found: f.len(),
                    });
                }
                f
            }
            None => {
                owned_default = vec![false; n];
                &owned_default
            }
        };

        let units = if optimiser.refine_enabled() {
            optimiser.refine_membership(self, fixed)?
        } else {
            renumber_dense(&self.membership)
        };

        let (coarse, vertex_map) = self.graph.aggregate(&units)?;
        let mut aggregated = Partition::singleton(Arc::new(coarse), self.quality_fn)?;
        aggregated.origin = self.origin.iter().map(|&v| vertex_map[v]).collect();
        Ok(aggregated)
    }

    /// Back-project this partition onto the original graph it was
    /// (transitively) aggregated from.
    ///
    /// The returned partition's membership composes the retained origin map
    /// with this partition's membership: each original vertex lands in the
    /// community of the aggregated vertex that contains it.
    pub fn copy_from_graph(&self, original: &Arc<Network>) -> Result<Partition> {
        if original.vertex_count() != self.origin.len() {
            return Err(Error::DimensionMismatch {
                expected: self.origin.len(),
                found: original.vertex_count(),
            });
        }
        let membership = self
            .origin
            .iter()
            .map(|&v| self.membership[v])
            .collect();
        Partition::with_membership(Arc::clone(original), self.quality_fn, membership)
    }

    fn rebuild_aggregates(&mut self) {
        let n = self.graph.vertex_count();
        let k = self.membership.iter().map(|&c| c + 1).max().unwrap_or(0);
        self.n_communities = k;
        self.csize = vec![0.0; k];
        self.cnodes = vec![0; k];
        self.internal = vec![0.0; k];
        self.k_out = vec![0.0; k];
        self.k_in = vec![0.0; k];

        for v in 0..n {
            let c = self.membership[v];
            self.csize[c] += self.graph.node_size(v) as f64;
            self.cnodes[c] += 1;
            self.k_out[c] += self.graph.strength_out(v);
            self.k_in[c] += self.graph.strength_in(v);
            self.internal[c] += self.graph.self_weight(v);
        }
        let directed = self.graph.is_directed();
        for u in 0..n {
            let cu = self.membership[u];
            for &(v, w) in self.graph.neighbors_out(u) {
                if self.membership[v] != cu {
                    continue;
                }
                if directed || u < v {
                    self.internal[cu] += w;
                }
            }
        }

        self.sum_internal = self.internal.iter().sum();
        self.sum_pairs = self
            .csize
            .iter()
            .map(|&s| self.graph.possible_pairs(s))
            .sum();
    }
}

/// Map community ids to dense `[0, k)`, ascending by old id.
fn renumber_dense(membership: &[usize]) -> Vec<usize> {
    let mut unique: Vec<usize> = membership.to_vec();
    unique.sort_unstable();
    unique.dedup();
    let dense: HashMap<usize, usize> = unique
        .into_iter()
        .enumerate()
        .map(|(new, old)| (old, new))
        .collect();
    membership.iter().map(|c| dense[c]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path3() -> Arc<Network> {
        Arc::new(Network::from_edges(3, false, &[(0, 1, 1.0), (1, 2, 1.0)]).unwrap())
    }

    fn two_triangles() -> Arc<Network> {
        let edges = [
            (0, 1, 1.0),
            (1, 2, 1.0),
            (0, 2, 1.0),
            (3, 4, 1.0),
            (4, 5, 1.0),
            (3, 5, 1.0),
            (2, 3, 1.0),
        ];
        Arc::new(Network::from_edges(6, false, &edges).unwrap())
    }

    #[test]
    fn test_singleton_partition() {
        let p = Partition::singleton(path3(), QualityFunction::Modularity).unwrap();
        assert_eq!(p.membership(), &[0, 1, 2]);
        assert_eq!(p.n_communities(), 3);
        for c in 0..3 {
            assert_eq!(p.community_vertex_count(c), 1);
            assert_eq!(p.community_size(c), 1);
            assert_eq!(p.community_internal_weight(c), 0.0);
        }
    }

    #[test]
    fn test_empty_graph_rejected() {
        let graph = Arc::new(Network::from_edges(0, false, &[]).unwrap());
        assert!(matches!(
            Partition::singleton(graph, QualityFunction::Modularity),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn test_with_membership_renumbers_dense() {
        let p = Partition::with_membership(
            path3(),
            QualityFunction::Modularity,
            vec![7, 7, 3],
        )
        .unwrap();
        assert_eq!(p.membership(), &[1, 1, 0]);
        assert_eq!(p.n_communities(), 2);
    }

    #[test]
    fn test_with_membership_length_mismatch() {
        assert!(matches!(
            Partition::with_membership(path3(), QualityFunction::Modularity, vec![0, 0]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_move_node_updates_aggregates() {
        let graph = two_triangles();
        let mut p = Partition::with_membership(
            graph.clone(),
            QualityFunction::Modularity,
            vec![0, 0, 0, 1, 1, 1],
        )
        .unwrap();
        assert!((p.community_internal_weight(0) - 3.0).abs() < 1e-12);

        p.move_node(2, 1).unwrap();
        assert_eq!(p.membership()[2], 1);
        assert_eq!(p.community_vertex_count(0), 2);
        assert_eq!(p.community_vertex_count(1), 4);
        // Triangle 0-1-2 lost vertex 2's two internal edges.
        assert!((p.community_internal_weight(0) - 1.0).abs() < 1e-12);
        // Community 1 gained the bridge edge 2-3.
        assert!((p.community_internal_weight(1) - 4.0).abs() < 1e-12);

        // Incremental aggregates must match a from-scratch rebuild.
        let rebuilt = Partition::with_membership(
            graph,
            QualityFunction::Modularity,
            p.membership().to_vec(),
        )
        .unwrap();
        for c in 0..p.n_communities() {
            let a = p.community_aggregates(c);
            let b = rebuilt.community_aggregates(c);
            assert!((a.internal - b.internal).abs() < 1e-12);
            assert!((a.k_out - b.k_out).abs() < 1e-12);
            assert!((a.size - b.size).abs() < 1e-12);
        }
    }

    #[test]
    fn test_move_node_materializes_new_community() {
        let mut p = Partition::with_membership(
            path3(),
            QualityFunction::Modularity,
            vec![0, 0, 0],
        )
        .unwrap();
        p.move_node(2, 1).unwrap();
        assert_eq!(p.n_communities(), 2);
        assert_eq!(p.membership(), &[0, 0, 1]);

        // Vacating a community leaves an empty slot behind.
        p.move_node(2, 0).unwrap();
        assert_eq!(p.n_communities(), 2);
        assert_eq!(p.community_vertex_count(1), 0);
    }

    #[test]
    fn test_move_node_guards() {
        let mut p = Partition::singleton(path3(), QualityFunction::Modularity).unwrap();
        assert!(matches!(
            p.move_node(5, 0),
            Err(Error::VertexOutOfRange { .. })
        ));
        assert!(matches!(
            p.move_node(0, 7),
            Err(Error::CommunityOutOfRange { .. })
        ));
        // Already n communities == n vertices: materializing one more is the
        // invariant the empty-community guard exists to protect.
        assert!(matches!(
            p.move_node(0, 3),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_neighbour_community_weights() {
        let graph = two_triangles();
        let p = Partition::with_membership(
            graph,
            QualityFunction::Modularity,
            vec![0, 0, 0, 1, 1, 1],
        )
        .unwrap();
        let w2 = p.neighbour_community_weights(2).unwrap();
        assert_eq!(w2, vec![(0, 2.0), (1, 1.0)]);
        let w4 = p.neighbour_community_weights(4).unwrap();
        assert_eq!(w4, vec![(1, 2.0)]);
        assert!(p.neighbour_community_weights(9).is_err());
    }

    #[test]
    fn test_renumber_after_vacating() {
        let mut p = Partition::with_membership(
            path3(),
            QualityFunction::Modularity,
            vec![0, 1, 2],
        )
        .unwrap();
        p.move_node(1, 0).unwrap();
        assert_eq!(p.n_communities(), 3);
        p.renumber_communities();
        assert_eq!(p.n_communities(), 2);
        assert_eq!(p.membership(), &[0, 0, 1]);
    }

    #[test]
    fn test_aggregate_and_back_projection() {
        let graph = two_triangles();
        let p = Partition::with_membership(
            graph.clone(),
            QualityFunction::Modularity,
            vec![0, 0, 0, 1, 1, 1],
        )
        .unwrap();
        let mut optimiser = Optimiser::new().with_refine_partition(false);
        let aggregated = p.aggregate(&mut optimiser, None).unwrap();

        assert_eq!(aggregated.graph().vertex_count(), 2);
        assert_eq!(aggregated.membership(), &[0, 1]);
        assert_eq!(aggregated.origin_map(), &[0, 0, 0, 1, 1, 1]);
        // Quality is conserved across aggregation.
        assert!((aggregated.quality() - p.quality()).abs() < 1e-9);

        let projected = aggregated.copy_from_graph(&graph).unwrap();
        assert_eq!(projected.membership(), p.membership());
    }

    #[test]
    fn test_copy_from_graph_rejects_wrong_graph() {
        let p = Partition::singleton(two_triangles(), QualityFunction::Modularity).unwrap();
        let other = path3();
        assert!(matches!(
            p.copy_from_graph(&other),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_quality_conserved_across_aggregation_for_all_variants() {
        let graph = two_triangles();
        let variants = [
            QualityFunction::Modularity,
            QualityFunction::Cpm { resolution: 0.4 },
            QualityFunction::RBConfiguration { resolution: 1.5 },
            QualityFunction::RBER { resolution: 0.8 },
            QualityFunction::Significance,
            QualityFunction::Surprise,
        ];
        for quality_fn in variants {
            let p = Partition::with_membership(
                graph.clone(),
                quality_fn,
                vec![0, 0, 0, 1, 1, 1],
            )
            .unwrap();
            let mut optimiser = Optimiser::new().with_refine_partition(false);
            let aggregated = p.aggregate(&mut optimiser, None).unwrap();
            assert!(
                (aggregated.quality() - p.quality()).abs() < 1e-9,
                "{quality_fn:?}"
            );
        }
    }
}
