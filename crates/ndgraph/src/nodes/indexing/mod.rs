//! Indexing nodes.
//!
//! [`BasicIndexingNode`] selects with slices and integers and exposes a strided view into
//! its source without copying. [`AdvancedIndexingNode`] selects with index arrays (other
//! nodes) following numpy's fancy-indexing rules and keeps its own copy of the result.

mod advanced;
mod basic;

pub use advanced::AdvancedIndexingNode;
pub use basic::BasicIndexingNode;

use crate::error::{GraphError, Result};
use crate::graph::{NodeId, NodeRef};

/// A numpy-style `start:stop:step` slice.
///
/// Negative `start`/`stop` count from the end of the axis, out-of-range bounds are clipped,
/// and `None` means "from the beginning" / "to the end" in the direction of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: isize,
}

/// A slice resolved against a concrete axis extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SliceRange {
    pub start: isize,
    pub step: isize,
    pub len: usize,
}

impl Slice {
    /// The `:` slice.
    pub fn full() -> Self {
        Self::new(None, None, 1)
    }

    pub fn new(start: Option<isize>, stop: Option<isize>, step: isize) -> Self {
        Self { start, stop, step }
    }

    /// `start:stop`.
    pub fn range(start: isize, stop: isize) -> Self {
        Self::new(Some(start), Some(stop), 1)
    }

    /// Whether this slice selects a whole axis of any extent, in order.
    pub fn is_full(&self) -> bool {
        matches!(self.start, None | Some(0)) && self.stop.is_none() && self.step == 1
    }

    pub(crate) fn resolve(&self, axis: usize, extent: usize) -> Result<SliceRange> {
        let step = self.step;
        if step == 0 {
            return Err(GraphError::SliceOutOfBounds {
                axis,
                message: "slice step cannot be zero".to_string(),
            });
        }
        let n = extent as isize;
        let clip = |bound: Option<isize>, default: isize, lo: isize, hi: isize| match bound {
            None => default,
            Some(b) if b < 0 => (b + n).max(lo),
            Some(b) => b.min(hi),
        };

        let (start, len) = if step > 0 {
            let start = clip(self.start, 0, 0, n);
            let stop = clip(self.stop, n, 0, n);
            let len = if start < stop {
                (stop - start - 1) / step + 1
            } else {
                0
            };
            (start, len)
        } else {
            let start = clip(self.start, n - 1, -1, n - 1);
            let stop = clip(self.stop, -1, -1, n - 1);
            let len = if stop < start {
                (start - stop - 1) / (-step) + 1
            } else {
                0
            };
            (start, len)
        };
        Ok(SliceRange {
            start,
            step,
            len: len as usize,
        })
    }
}

impl Default for Slice {
    fn default() -> Self {
        Self::full()
    }
}

/// One term of a [`BasicIndexingNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicTerm {
    Slice(Slice),
    /// Select one position, removing the axis. Negative values count from the end.
    Index(isize),
}

impl From<Slice> for BasicTerm {
    fn from(slice: Slice) -> Self {
        BasicTerm::Slice(slice)
    }
}

impl From<isize> for BasicTerm {
    fn from(index: isize) -> Self {
        BasicTerm::Index(index)
    }
}

/// One term of an [`AdvancedIndexingNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTerm {
    /// Keep the whole axis.
    Full,
    /// Select positions along the axis with the values of an integral array node.
    Indexer(NodeId),
}

impl From<NodeId> for IndexTerm {
    fn from(id: NodeId) -> Self {
        IndexTerm::Indexer(id)
    }
}

impl<N> From<NodeRef<N>> for IndexTerm {
    fn from(handle: NodeRef<N>) -> Self {
        IndexTerm::Indexer(handle.id())
    }
}
