//! The Leiden-style optimisation engine.
//!
//! ## The loop (Traag et al. 2019)
//!
//! 1. **Local moving**: visit vertices in random order, greedily moving each
//!    to the candidate community with the largest strictly positive quality
//!    gain, until a full pass accepts nothing.
//! 2. **Refinement** (optional): re-run a constrained local search from
//!    singletons, allowing moves only inside the communities found in
//!    phase 1; the refined units become the aggregation vertices.
//! 3. **Aggregation**: collapse each unit into one vertex and repeat on the
//!    coarser graph, until an iteration yields no improvement (or the level
//!    cap is reached).
//!
//! The hierarchical entry point additionally snapshots a back-projected
//! partition at every level, so callers get the whole multi-resolution
//! structure instead of only the coarsest result.
//!
//! ## Reproducibility
//!
//! The optimiser owns its RNG and re-seeds it from `rng_seed` at the start
//! of every top-level call. Visit orders, and therefore the final
//! membership, are identical across runs with the same graph, configuration
//! and seed. No ambient/global randomness is consulted anywhere.
//!
//! ## References
//!
//! Traag, Waltman, van Eck (2019). "From Louvain to Leiden: guaranteeing
//! well-connected communities." Scientific Reports 9, 5233.

use crate::error::{Error, Result};
use crate::graph::Network;
use crate::hierarchy::Hierarchy;
use crate::partition::Partition;
use crate::quality::QualityFunction;
use log::{debug, trace};
use petgraph::graph::UnGraph;
use rand::prelude::*;
use std::sync::Arc;

/// Which communities are evaluated as move candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsiderComms {
    /// Only communities containing a neighbor of the vertex being moved.
    AllNeighComms,
    /// Every existing community, adjacent or not. Useful when a good target
    /// shares no edge with the vertex (e.g. after aggregation).
    AllComms,
}

/// Which local-search routine drives an optimisation or refinement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimiseRoutine {
    /// Plain greedy single-vertex relocation.
    MoveNodes,
    /// The more aggressive post-aggregation variant: neighbor communities
    /// are always scanned, and under [`ConsiderComms::AllComms`] every
    /// community is scanned as a merge target as well.
    MergeNodes,
}

/// Per-call overrides for [`Optimiser::move_nodes`] / [`Optimiser::merge_nodes`].
///
/// Fields default to "use the optimiser's configuration".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalSearchOptions {
    /// Candidate scope override; `None` uses the optimiser's setting.
    pub consider_comms: Option<ConsiderComms>,
    /// Community size bound. Accepted for interface parity but not enforced
    /// by any candidate filter; see the field of the same name on
    /// [`Optimiser`].
    pub max_comm_size: Option<usize>,
}

/// Drives the move/merge local search, aggregation cycle, and hierarchy
/// capture over a [`Partition`].
///
/// Configuration is set up front, builder-style, and is not changed by a
/// run. The defaults match the Leiden algorithm: neighbor-community moves,
/// merge-based refinement, empty-community candidates enabled.
///
/// ```
/// use parcel::{Optimiser, Partition, Network, QualityFunction};
/// use std::sync::Arc;
///
/// let network = Arc::new(Network::from_edges(
///     4,
///     false,
///     &[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (3, 0, 1.0)],
/// )?);
/// let mut partition = Partition::singleton(network, QualityFunction::Modularity)?;
/// let mut optimiser = Optimiser::new().with_rng_seed(7);
/// let gain = optimiser.optimise_partition(&mut partition, -1, None)?;
/// assert!(gain > 0.0);
/// # Ok::<(), parcel::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Optimiser {
    consider_comms: ConsiderComms,
    refine_consider_comms: ConsiderComms,
    optimise_routine: OptimiseRoutine,
    refine_routine: OptimiseRoutine,
    consider_empty_community: bool,
    refine_partition: bool,
    /// Accepted for interface parity with the reference optimiser; no
    /// candidate filter enforces it. Callers must not rely on community
    /// sizes being bounded.
    max_comm_size: Option<usize>,
    rng_seed: u64,
    rng: StdRng,
}

impl Optimiser {
    /// Create an optimiser with Leiden-consistent defaults.
    pub fn new() -> Self {
        Self {
            consider_comms: ConsiderComms::AllNeighComms,
            refine_consider_comms: ConsiderComms::AllNeighComms,
            optimise_routine: OptimiseRoutine::MoveNodes,
            refine_routine: OptimiseRoutine::MergeNodes,
            consider_empty_community: true,
            refine_partition: true,
            max_comm_size: None,
            rng_seed: 42,
            rng: StdRng::seed_from_u64(42),
        }
    }

    /// Set the candidate scope for the optimisation routine.
    pub fn with_consider_comms(mut self, consider_comms: ConsiderComms) -> Self {
        self.consider_comms = consider_comms;
        self
    }

    /// Set the candidate scope for the refinement sub-pass.
    pub fn with_refine_consider_comms(mut self, consider_comms: ConsiderComms) -> Self {
        self.refine_consider_comms = consider_comms;
        self
    }

    /// Set the routine used for optimisation steps.
    pub fn with_optimise_routine(mut self, routine: OptimiseRoutine) -> Self {
        self.optimise_routine = routine;
        self
    }

    /// Set the routine used for the refinement sub-pass.
    pub fn with_refine_routine(mut self, routine: OptimiseRoutine) -> Self {
        self.refine_routine = routine;
        self
    }

    /// Whether a move into a brand-new empty community is offered as a
    /// candidate (guarded so the community count never exceeds the vertex
    /// count).
    pub fn with_consider_empty_community(mut self, consider: bool) -> Self {
        self.consider_empty_community = consider;
        self
    }

    /// Whether aggregation is preceded by the constrained refinement pass.
    pub fn with_refine_partition(mut self, refine: bool) -> Self {
        self.refine_partition = refine;
        self
    }

    /// Set the (unenforced) community size bound.
    pub fn with_max_comm_size(mut self, max_comm_size: Option<usize>) -> Self {
        self.max_comm_size = max_comm_size;
        self
    }

    /// The configured community size bound. Carried through for interface
    /// parity only — no routine enforces it.
    pub fn max_comm_size(&self) -> Option<usize> {
        self.max_comm_size
    }

    /// Set the RNG seed. The internal RNG is re-seeded from this value at
    /// the start of every top-level optimisation call.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Greedy single-vertex relocation until a full pass accepts no move.
    ///
    /// Vertices flagged in `fixed` never move. Returns the total quality
    /// gain over all passes; zero means the partition was already a local
    /// optimum for this routine and scope.
    pub fn move_nodes(
        &mut self,
        partition: &mut Partition,
        fixed: Option<&[bool]>,
        options: LocalSearchOptions,
    ) -> Result<f64> {
        let mut storage = Vec::new();
        let fixed = resolve_fixed(partition.graph().vertex_count(), fixed, &mut storage)?;
        let consider = options.consider_comms.unwrap_or(self.consider_comms);
        self.local_search(partition, fixed, OptimiseRoutine::MoveNodes, consider, None)
    }

    /// Merge-oriented local search (see [`OptimiseRoutine::MergeNodes`]),
    /// normally run right after aggregation when vertices have no useful
    /// neighbor-community structure yet.
    pub fn merge_nodes(
        &mut self,
        partition: &mut Partition,
        fixed: Option<&[bool]>,
        options: LocalSearchOptions,
    ) -> Result<f64> {
        let mut storage = Vec::new();
        let fixed = resolve_fixed(partition.graph().vertex_count(), fixed, &mut storage)?;
        let consider = options.consider_comms.unwrap_or(self.consider_comms);
        self.local_search(partition, fixed, OptimiseRoutine::MergeNodes, consider, None)
    }

    /// Optimise `partition` in place: local search, aggregate, repeat.
    ///
    /// `n_iterations` caps the number of aggregation levels; a negative
    /// value runs to convergence. On return the partition carries the final
    /// membership back-projected onto its own graph, and the total quality
    /// gain is returned.
    pub fn optimise_partition(
        &mut self,
        partition: &mut Partition,
        n_iterations: i32,
        fixed: Option<&[bool]>,
    ) -> Result<f64> {
        let n = partition.graph().vertex_count();
        let mut storage = Vec::new();
        let fixed = resolve_fixed(n, fixed, &mut storage)?.to_vec();
        self.rng = StdRng::seed_from_u64(self.rng_seed);

        let original_graph = partition.graph_arc();
        let fixed_orig: Vec<bool> = partition.origin_map().iter().map(|&v| fixed[v]).collect();

        let mut total = self.run_routine(partition, &fixed)?;
        if total <= 0.0 {
            return Ok(total);
        }
        let mut current = partition.aggregate(self, Some(&fixed))?;
        debug!(
            "level 0: gain {:.6}, aggregated to {} vertices",
            total,
            current.graph().vertex_count()
        );

        let mut improving = true;
        let mut level = 1;
        while improving && (n_iterations < 0 || level < n_iterations) {
            let level_fixed = project_fixed(
                &fixed_orig,
                current.origin_map(),
                current.graph().vertex_count(),
            );
            let gain = self.run_routine(&mut current, &level_fixed)?;
            total += gain;
            improving = gain > 0.0;
            if improving {
                current = current.aggregate(self, Some(&level_fixed))?;
                debug!(
                    "level {}: gain {:.6}, aggregated to {} vertices",
                    level,
                    gain,
                    current.graph().vertex_count()
                );
            }
            level += 1;
        }

        let projected = current.copy_from_graph(&original_graph)?;
        partition.set_membership(projected.membership().to_vec())?;
        Ok(total)
    }

    /// Optimise and capture the full aggregation hierarchy.
    ///
    /// Multi-layer signature: `partitions` and `layer_weights` must have
    /// equal lengths and all layers the same vertex count (checked before
    /// any mutation). As in the reference optimiser, only `partitions[0]`
    /// drives local search and aggregation; the other layers and the
    /// weights take no part in the gain computation.
    ///
    /// Runs to convergence. Returns the final quality together with the
    /// [`Hierarchy`]: index 0 is a snapshot of the initial partition, then
    /// one back-projected snapshot per aggregation level. On return
    /// `partitions[0]` carries the final membership, equal to the last
    /// hierarchy entry's.
    pub fn optimise_partition_hierarchical(
        &mut self,
        partitions: &mut [Partition],
        layer_weights: &[f64],
        fixed: Option<&[bool]>,
    ) -> Result<(f64, Hierarchy)> {
        if partitions.len() != layer_weights.len() {
            return Err(Error::DimensionMismatch {
                expected: partitions.len(),
                found: layer_weights.len(),
            });
        }
        if partitions.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n = partitions[0].graph().vertex_count();
        for layer in partitions.iter() {
            if layer.graph().vertex_count() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    found: layer.graph().vertex_count(),
                });
            }
        }
        let mut storage = Vec::new();
        let fixed = resolve_fixed(n, fixed, &mut storage)?.to_vec();
        self.rng = StdRng::seed_from_u64(self.rng_seed);

        let driver = &mut partitions[0];
        let original_graph = driver.graph_arc();
        let fixed_orig: Vec<bool> = driver.origin_map().iter().map(|&v| fixed[v]).collect();

        let mut hierarchy = Hierarchy::new();
        hierarchy.push(driver.clone());

        let first_gain = self.run_routine(driver, &fixed)?;
        if first_gain <= 0.0 {
            let quality = driver.quality();
            return Ok((quality, hierarchy));
        }
        let mut current = driver.aggregate(self, Some(&fixed))?;
        hierarchy.push(current.copy_from_graph(&original_graph)?);

        loop {
            let level_fixed = project_fixed(
                &fixed_orig,
                current.origin_map(),
                current.graph().vertex_count(),
            );
            let gain = self.run_routine(&mut current, &level_fixed)?;
            if gain <= 0.0 {
                break;
            }
            current = current.aggregate(self, Some(&level_fixed))?;
            hierarchy.push(current.copy_from_graph(&original_graph)?);
        }
        debug!("hierarchy captured with {} levels", hierarchy.len());

        if let Some(last) = hierarchy.levels().last() {
            partitions[0].set_membership(last.membership().to_vec())?;
        }
        let quality = partitions[0].quality();
        Ok((quality, hierarchy))
    }

    pub(crate) fn refine_enabled(&self) -> bool {
        self.refine_partition
    }

    /// The refinement sub-pass: a constrained local search from singletons
    /// that only moves vertices within their communities in `partition`.
    /// Returns the refined membership, renumbered dense.
    pub(crate) fn refine_membership(
        &mut self,
        partition: &Partition,
        fixed: &[bool],
    ) -> Result<Vec<usize>> {
        let mut refined =
            Partition::singleton(partition.graph_arc(), *partition.quality_function())?;
        let routine = self.refine_routine;
        let consider = self.refine_consider_comms;
        let gain = self.local_search(
            &mut refined,
            fixed,
            routine,
            consider,
            Some(partition.membership()),
        )?;
        trace!("refinement gain {gain:.6}");
        refined.renumber_communities();
        Ok(refined.membership().to_vec())
    }

    fn run_routine(&mut self, partition: &mut Partition, fixed: &[bool]) -> Result<f64> {
        let routine = self.optimise_routine;
        let consider = self.consider_comms;
        self.local_search(partition, fixed, routine, consider, None)
    }

    /// Shared local-search loop for both routines, optionally constrained to
    /// the communities of another membership vector (refinement).
    fn local_search(
        &mut self,
        partition: &mut Partition,
        fixed: &[bool],
        routine: OptimiseRoutine,
        consider: ConsiderComms,
        constraint: Option<&[usize]>,
    ) -> Result<f64> {
        let n = partition.graph().vertex_count();
        if fixed.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: fixed.len(),
            });
        }
        let initial = partition.quality();

        // Constraint groups per community slot. Non-empty communities only
        // ever hold vertices of a single group; empty slots are free.
        let mut comm_group: Vec<usize> = Vec::new();
        if let Some(groups) = constraint {
            if groups.len() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    found: groups.len(),
                });
            }
            comm_group = vec![0; partition.n_communities()];
            for v in 0..n {
                comm_group[partition.membership()[v]] = groups[v];
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut improved = true;
        let mut passes = 0usize;
        while improved {
            improved = false;
            passes += 1;
            order.shuffle(&mut self.rng);

            for &v in &order {
                if fixed[v] {
                    continue;
                }
                let current = partition.membership()[v];
                let mut best_comm = current;
                let mut best_gain = 0.0_f64;

                let scan_all = consider == ConsiderComms::AllComms;
                // merge_nodes always scans neighbor communities; move_nodes
                // scans them only when not already scanning everything.
                let scan_neighbours = !scan_all || routine == OptimiseRoutine::MergeNodes;

                if scan_neighbours {
                    for (comm, _weight) in partition.neighbour_community_weights(v)? {
                        if comm == current {
                            continue;
                        }
                        if let Some(groups) = constraint {
                            if partition.community_vertex_count(comm) > 0
                                && comm_group[comm] != groups[v]
                            {
                                continue;
                            }
                        }
                        let gain = partition.diff_move(v, comm)?;
                        if gain > best_gain {
                            best_gain = gain;
                            best_comm = comm;
                        }
                    }
                }
                if scan_all {
                    for comm in 0..partition.n_communities() {
                        if comm == current {
                            continue;
                        }
                        if let Some(groups) = constraint {
                            if partition.community_vertex_count(comm) > 0
                                && comm_group[comm] != groups[v]
                            {
                                continue;
                            }
                        }
                        let gain = partition.diff_move(v, comm)?;
                        if gain > best_gain {
                            best_gain = gain;
                            best_comm = comm;
                        }
                    }
                }
                // The virtual empty community, guarded so the community
                // count stays at or below the vertex count.
                if self.consider_empty_community && partition.n_communities() < n {
                    let comm = partition.n_communities();
                    let gain = partition.diff_move(v, comm)?;
                    if gain > best_gain {
                        best_gain = gain;
                        best_comm = comm;
                    }
                }

                if best_comm != current && best_gain > 0.0 {
                    let materializes = best_comm == partition.n_communities();
                    partition.move_node(v, best_comm)?;
                    if let Some(groups) = constraint {
                        if materializes {
                            comm_group.push(groups[v]);
                        } else {
                            comm_group[best_comm] = groups[v];
                        }
                    }
                    improved = true;
                }
            }
        }

        let gain = partition.quality() - initial;
        trace!("local search settled after {passes} passes (gain {gain:.6})");
        Ok(gain)
    }
}

impl Default for Optimiser {
    fn default() -> Self {
        Self::new()
    }
}

/// One-call convenience: singleton partition over `graph` (unit weights),
/// optimised to convergence with default settings and the given seed.
pub fn find_partition<N, E>(
    graph: &UnGraph<N, E>,
    quality_fn: QualityFunction,
    seed: u64,
) -> Result<Partition> {
    let network = Arc::new(Network::from_graph(graph)?);
    let mut partition = Partition::singleton(network, quality_fn)?;
    let mut optimiser = Optimiser::new().with_rng_seed(seed);
    let _ = optimiser.optimise_partition(&mut partition, -1, None)?;
    Ok(partition)
}

fn resolve_fixed<'a>(
    n: usize,
    fixed: Option<&'a [bool]>,
    storage: &'a mut Vec<bool>,
) -> Result<&'a [bool]> {
    match fixed {
        Some(mask) => {
            if mask.len() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    found: mask.len(),
                });
            }
            Ok(mask)
        }
        None => {
            *storage = vec![false; n];
            Ok(storage.as_slice())
        }
    }
}

/// Project an original-vertex fixed mask onto an aggregation level: a
/// coarse vertex is fixed iff it contains any fixed original vertex.
fn project_fixed(fixed_orig: &[bool], origin: &[usize], n_level: usize) -> Vec<bool> {
    let mut fixed = vec![false; n_level];
    for (i, &v) in origin.iter().enumerate() {
        if fixed_orig[i] {
            fixed[v] = true;
        }
    }
    fixed
}
