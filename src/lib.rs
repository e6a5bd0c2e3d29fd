//! # parcel
//!
//! Multi-resolution community detection via Leiden-style optimisation:
//! local moving, optional constrained refinement, graph aggregation, and
//! capture of the full back-projected hierarchy — over a pluggable quality
//! function.
//!
//! ## The Algorithm (Traag et al. 2019)
//!
//! The engine repeats two phases until nothing improves:
//!
//! 1. **Local moving**: visit vertices in seeded-random order, moving each
//!    to the candidate community with the best strictly positive quality
//!    gain, priced in O(degree) from incremental aggregates.
//! 2. **Aggregation**: collapse communities (or, with refinement enabled,
//!    the refined sub-communities) into single vertices and recurse on the
//!    coarser graph.
//!
//! The hierarchical entry point snapshots every level back onto the original
//! vertex set, so one run yields community structure at every resolution it
//! passed through, not just the coarsest partition.
//!
//! ## Quality functions
//!
//! The objective is chosen per partition: [`QualityFunction::Modularity`],
//! CPM, RBConfiguration, RBER, Significance, or Surprise. All of them honor
//! the same contract: `diff_move(v, c)` equals the exact quality delta of
//! the move, including into a brand-new empty community.
//!
//! ## Usage
//!
//! ```rust
//! use petgraph::graph::UnGraph;
//! use parcel::{find_partition, QualityFunction};
//!
//! // Two triangles joined by a bridge.
//! let mut graph = UnGraph::<(), ()>::new_undirected();
//! let n: Vec<_> = (0..6).map(|_| graph.add_node(())).collect();
//! for (a, b) in [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)] {
//!     graph.add_edge(n[a], n[b], ());
//! }
//!
//! let partition = find_partition(&graph, QualityFunction::Modularity, 42)?;
//! assert_eq!(partition.membership()[0], partition.membership()[1]);
//! assert_ne!(partition.membership()[0], partition.membership()[4]);
//! # Ok::<(), parcel::Error>(())
//! ```
//!
//! For full control, build a [`Network`], wrap it in a [`Partition`], and
//! drive an [`Optimiser`] directly — see each type's docs.
//!
//! ## Reproducibility
//!
//! Every top-level optimisation call re-seeds the optimiser's RNG, so a
//! fixed seed, graph and configuration reproduce the exact membership
//! sequence across all hierarchy levels.
//!
//! ## References
//!
//! - Traag, Waltman, van Eck (2019). "From Louvain to Leiden: guaranteeing
//!   well-connected communities." Scientific Reports 9, 5233.
//! - Blondel et al. (2008). "Fast unfolding of communities in large networks."

/// Error types used across `parcel`.
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod metrics;
pub mod optimiser;
pub mod partition;
pub mod quality;

pub use error::{Error, Result};
pub use graph::Network;
pub use hierarchy::Hierarchy;
pub use metrics::{ari, nmi};
pub use optimiser::{
    find_partition, ConsiderComms, LocalSearchOptions, Optimiser, OptimiseRoutine,
};
pub use partition::Partition;
pub use quality::QualityFunction;
