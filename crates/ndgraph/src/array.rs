//! The array capability shared by every array-valued node.
//!
//! ```text
//! Node (topology + propagate/commit/revert)
//!  └── Array (shape, bounds, state-dependent view and diff)
//!       ├── ConstantNode        values live on the node
//!       ├── IntegerNode, ListNode, DynamicArrayNode   values live in the State
//!       ├── BasicIndexingNode   strided view into its source, no copy
//!       └── AdvancedIndexingNode  values live in the State
//! ```

use smallvec::SmallVec;

use crate::graph::{Graph, Node, NodeId};
use crate::shape::Shape;
use crate::state::{State, Update};
use crate::strides::{compute_strides, linear_to_cartesian_into};

/// Which node an array's leading-axis row count follows, and its guaranteed range.
///
/// Two dynamic arrays with equal shapes and the same `origin` always have the same size
/// in every state. Static arrays are their own origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeInfo {
    pub origin: NodeId,
    pub min_rows: usize,
    pub max_rows: Option<usize>,
}

impl SizeInfo {
    pub fn fixed(origin: NodeId, rows: usize) -> Self {
        Self {
            origin,
            min_rows: rows,
            max_rows: Some(rows),
        }
    }
}

/// Read-only description of a node's array output.
///
/// Stateless methods describe what holds in every state; stateful methods take the
/// [`Graph`] (to reach predecessors) and the [`State`] to read from.
pub trait Array: Node {
    /// Shape, possibly with a dynamic leading dimension.
    fn shape(&self) -> &Shape;

    #[inline]
    fn ndim(&self) -> usize {
        self.shape().ndim()
    }

    #[inline]
    fn dynamic(&self) -> bool {
        self.shape().is_dynamic()
    }

    /// Number of elements, `None` if dynamic.
    fn size(&self) -> Option<usize> {
        self.shape().size()
    }

    /// Lower bound on every element value in every state.
    fn min(&self) -> f64;

    /// Upper bound on every element value in every state.
    fn max(&self) -> f64;

    /// Whether every element is always integer-valued.
    fn integral(&self) -> bool;

    fn size_info(&self) -> SizeInfo {
        let rows = self
            .shape()
            .dims()
            .first()
            .and_then(|d| d.fixed())
            .unwrap_or(1);
        SizeInfo::fixed(self.id(), rows)
    }

    /// Current values (committed plus pending).
    fn view<'a>(&'a self, graph: &'a Graph, state: &'a State) -> ArrayView<'a>;

    /// Pending changes since the last commit.
    fn diff<'a>(&'a self, graph: &'a Graph, state: &'a State) -> &'a [Update];

    /// Current number of elements.
    fn state_size(&self, graph: &Graph, state: &State) -> usize {
        match self.size() {
            Some(size) => size,
            None => self.view(graph, state).len(),
        }
    }

    /// Signed change in size since the last commit.
    fn size_diff(&self, graph: &Graph, state: &State) -> isize;

    /// Concrete extents in `state`.
    fn state_shape(&self, graph: &Graph, state: &State) -> Vec<usize> {
        self.shape().resolve(self.state_size(graph, state))
    }
}

/// Strided read-only view over array values.
///
/// The view may be non-owning into another node's buffer with non-default strides; this is
/// how basic indexing avoids copying. Elements are addressed by their row-major flat index
/// in the view's own shape.
#[derive(Debug, Clone)]
pub struct ArrayView<'a> {
    data: &'a [f64],
    offset: usize,
    shape: SmallVec<[usize; 4]>,
    strides: SmallVec<[isize; 4]>,
    contiguous: bool,
}

impl<'a> ArrayView<'a> {
    /// View of a contiguous row-major buffer.
    pub fn contiguous(data: &'a [f64], shape: &[usize]) -> Self {
        let strides = compute_strides(shape)
            .into_iter()
            .map(|s| s as isize)
            .collect();
        Self {
            data,
            offset: 0,
            shape: shape.iter().copied().collect(),
            strides,
            contiguous: true,
        }
    }

    /// Re-stride this view: the new view starts `offset` elements (in the underlying
    /// buffer) after this one and steps through it with `strides`.
    pub(crate) fn restride(&self, offset: isize, shape: &[usize], strides: &[isize]) -> Self {
        let start = self.offset as isize + offset;
        debug_assert!(start >= 0 || shape.contains(&0));
        let contiguous = shape.contains(&0)
            || compute_strides(shape)
                .iter()
                .zip(strides)
                .zip(shape)
                .all(|((&c, &s), &n)| n <= 1 || c as isize == s);
        Self {
            data: self.data,
            offset: start.max(0) as usize,
            shape: shape.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
            contiguous,
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element strides in the underlying buffer.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer position of the element at row-major flat index `flat`.
    fn position(&self, flat: usize) -> usize {
        if self.contiguous {
            return self.offset + flat;
        }
        let mut coords: SmallVec<[usize; 4]> = SmallVec::from_elem(0, self.shape.len());
        linear_to_cartesian_into(flat, &self.shape, &mut coords);
        let delta: isize = coords
            .iter()
            .zip(self.strides.iter())
            .map(|(&c, &s)| c as isize * s)
            .sum();
        (self.offset as isize + delta) as usize
    }

    /// Element at row-major flat index `flat`.
    ///
    /// # Panics
    ///
    /// Panics if `flat >= self.len()`.
    #[inline]
    pub fn get(&self, flat: usize) -> f64 {
        assert!(flat < self.len(), "flat index {flat} out of range {}", self.len());
        self.data[self.position(flat)]
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<f64> {
        if self.is_empty() {
            return Vec::new();
        }
        if self.contiguous {
            return self.data[self.offset..self.offset + self.len()].to_vec();
        }
        self.iter().collect()
    }
}

impl PartialEq<[f64]> for ArrayView<'_> {
    fn eq(&self, other: &[f64]) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, &b)| a == b)
    }
}

impl PartialEq<Vec<f64>> for ArrayView<'_> {
    fn eq(&self, other: &Vec<f64>) -> bool {
        self == other.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_view() {
        let data: Vec<f64> = (0..6).map(|x| x as f64).collect();
        let v = ArrayView::contiguous(&data, &[2, 3]);
        assert_eq!(v.len(), 6);
        assert_eq!(v.strides(), &[3, 1]);
        assert_eq!(v.get(4), 4.0);
        assert_eq!(v.to_vec(), data);
    }

    #[test]
    fn test_restride_column() {
        // 3x2 matrix, select column 1 -> [1, 3, 5]
        let data: Vec<f64> = (0..6).map(|x| x as f64).collect();
        let v = ArrayView::contiguous(&data, &[3, 2]);
        let col = v.restride(1, &[3], &[2]);
        assert_eq!(col.to_vec(), vec![1.0, 3.0, 5.0]);
        assert_eq!(col, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_restride_reversed() {
        let data: Vec<f64> = (0..5).map(|x| x as f64).collect();
        let v = ArrayView::contiguous(&data, &[5]);
        let rev = v.restride(4, &[5], &[-1]);
        assert_eq!(rev.to_vec(), vec![4.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_restride_of_restride() {
        // 4x4, take rows 1..3 then every other column
        let data: Vec<f64> = (0..16).map(|x| x as f64).collect();
        let v = ArrayView::contiguous(&data, &[4, 4]);
        let rows = v.restride(4, &[2, 4], &[4, 1]);
        let cols = rows.restride(1, &[2, 2], &[4, 2]);
        assert_eq!(cols.to_vec(), vec![5.0, 7.0, 9.0, 11.0]);
    }

    #[test]
    fn test_empty_view() {
        let data: Vec<f64> = vec![];
        let v = ArrayView::contiguous(&data, &[0, 3]);
        assert!(v.is_empty());
        assert_eq!(v.to_vec(), Vec::<f64>::new());
    }
}
