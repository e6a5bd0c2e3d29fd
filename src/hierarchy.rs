//! The captured aggregation hierarchy.
//!
//! Each optimisation level contributes one [`Partition`] snapshot,
//! back-projected onto the original vertex set so that levels are directly
//! comparable: index 0 is the finest (the initial partition), the last index
//! is the coarsest and equals the final result. Memberships are strictly
//! non-refining as the index increases — every community at level `i + 1`
//! is a union of communities at level `i`.
//!
//! The optimiser is the only writer; a `Hierarchy` owns its snapshots
//! outright.

use crate::error::{Error, Result};
use crate::partition::Partition;

/// Ordered sequence of back-projected partition snapshots, finest first.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    levels: Vec<Partition>,
}

impl Hierarchy {
    pub(crate) fn new() -> Self {
        Self { levels: Vec::new() }
    }

    pub(crate) fn push(&mut self, partition: Partition) {
        self.levels.push(partition);
    }

    /// Number of captured levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether no level has been captured.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Snapshot at `level` (0 = finest), if present.
    pub fn level(&self, level: usize) -> Option<&Partition> {
        self.levels.get(level)
    }

    /// All snapshots, finest first.
    pub fn levels(&self) -> &[Partition] {
        &self.levels
    }

    /// The coarsest snapshot — the final optimisation result.
    pub fn final_partition(&self) -> Option<&Partition> {
        self.levels.last()
    }

    /// Iterate snapshots from finest to coarsest.
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.levels.iter()
    }

    /// Verify the non-refining invariant: no community at one level may be
    /// split across two communities at the next.
    pub fn check_coarsening(&self) -> Result<()> {
        for (i, pair) in self.levels.windows(2).enumerate() {
            let fine = pair[0].membership();
            let coarse = pair[1].membership();
            if fine.len() != coarse.len() {
                return Err(Error::DimensionMismatch {
                    expected: fine.len(),
                    found: coarse.len(),
                });
            }
            let k = fine.iter().map(|&c| c + 1).max().unwrap_or(0);
            let mut image: Vec<Option<usize>> = vec![None; k];
            for v in 0..fine.len() {
                match image[fine[v]] {
                    None => image[fine[v]] = Some(coarse[v]),
                    Some(c) if c == coarse[v] => {}
                    Some(c) => {
                        return Err(Error::InvariantViolation(format!(
                            "community {} at level {} splits into {} and {} at level {}",
                            fine[v],
                            i,
                            c,
                            coarse[v],
                            i + 1
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Hierarchy {
    type Item = &'a Partition;
    type IntoIter = std::slice::Iter<'a, Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.iter()
    }
}
