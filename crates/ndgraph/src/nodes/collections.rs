use std::any::Any;

use crate::array::{Array, ArrayView, SizeInfo};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, Node, NodeInfo};
use crate::nodes::{buffer_view, is_integer};
use crate::shape::Shape;
use crate::state::{ArrayBuffer, State, Update};

/// Ordered selection of distinct elements of `range(n)`.
///
/// A fixed-size list is a permutation of `range(n)`. A dynamic list (shape `(-1,)`) is a
/// prefix of a permutation: growing appends the next element of the permutation, shrinking
/// removes the last one.
#[derive(Debug, Clone)]
pub struct ListNode {
    info: NodeInfo,
    shape: Shape,
    n: usize,
    min_size: usize,
    max_size: usize,
}

/// Visible prefix plus the unused rest of the permutation, stored back to front so the next
/// element to grow into is at the end.
#[derive(Debug)]
struct ListState {
    items: ArrayBuffer,
    unused: ArrayBuffer,
}

impl ListNode {
    /// Permutation of `range(n)`.
    pub fn new(n: usize) -> Self {
        Self {
            info: NodeInfo::new(Vec::new()),
            shape: Shape::fixed(&[n]),
            n,
            min_size: n,
            max_size: n,
        }
    }

    /// Dynamic list of between `min_size` and `max_size` elements of `range(n)`.
    pub fn with_size_bounds(n: usize, min_size: usize, max_size: usize) -> Result<Self> {
        if min_size > max_size || max_size > n {
            return Err(GraphError::SizeOutOfBounds {
                size: max_size,
                min: min_size,
                max: n,
            });
        }
        Ok(Self {
            info: NodeInfo::new(Vec::new()),
            shape: Shape::dynamic(&[]),
            n,
            min_size,
            max_size,
        })
    }

    fn list_state(&self, n: usize) -> ListState {
        ListState {
            items: ArrayBuffer::new((0..n).map(|v| v as f64).collect()),
            unused: ArrayBuffer::new((n..self.n).rev().map(|v| v as f64).collect()),
        }
    }

    /// Seed this node with an explicit list.
    ///
    /// The values must be distinct integers in `range(n)`. Elements not listed become
    /// available to [`ListNode::grow`] in increasing order.
    pub fn initialize_state_with(&self, state: &mut State, values: Vec<f64>) -> Result<()> {
        self.info.check_unseeded(state)?;
        if values.len() < self.min_size || values.len() > self.max_size {
            return Err(GraphError::SizeOutOfBounds {
                size: values.len(),
                min: self.min_size,
                max: self.max_size,
            });
        }
        let mut used = vec![false; self.n];
        for &v in &values {
            if !is_integer(v) || v < 0.0 || v >= self.n as f64 || used[v as usize] {
                return Err(GraphError::ValueOutOfBounds {
                    value: v,
                    min: 0.0,
                    max: self.n as f64 - 1.0,
                });
            }
            used[v as usize] = true;
        }
        let unused = (0..self.n)
            .rev()
            .filter(|&v| !used[v])
            .map(|v| v as f64)
            .collect();
        state.insert(
            self.id(),
            ListState {
                items: ArrayBuffer::new(values),
                unused: ArrayBuffer::new(unused),
            },
        );
        Ok(())
    }

    /// Swap the elements at positions `i` and `j`.
    pub fn exchange(&self, state: &mut State, i: usize, j: usize) -> Result<()> {
        self.info.check_state(state)?;
        let data = state.get_mut::<ListState>(self.id());
        let size = data.items.len();
        if let Some(&bad) = [i, j].iter().find(|&&k| k >= size) {
            return Err(GraphError::IndexOutOfBounds {
                index: bad as isize,
                dim_size: size,
            });
        }
        data.items.exchange(i, j);
        Ok(())
    }

    /// Append the next unused element.
    pub fn grow(&self, state: &mut State) -> Result<()> {
        self.info.check_state(state)?;
        self.check_dynamic()?;
        let data = state.get_mut::<ListState>(self.id());
        if data.items.len() >= self.max_size {
            return Err(GraphError::SizeOutOfBounds {
                size: data.items.len() + 1,
                min: self.min_size,
                max: self.max_size,
            });
        }
        if let Some(value) = data.unused.pop_back() {
            data.items.emplace_back(value);
        }
        Ok(())
    }

    /// Remove the last element.
    pub fn shrink(&self, state: &mut State) -> Result<()> {
        self.info.check_state(state)?;
        self.check_dynamic()?;
        let data = state.get_mut::<ListState>(self.id());
        if data.items.len() <= self.min_size {
            return Err(GraphError::SizeOutOfBounds {
                size: data.items.len().saturating_sub(1),
                min: self.min_size,
                max: self.max_size,
            });
        }
        if let Some(value) = data.items.pop_back() {
            data.unused.emplace_back(value);
        }
        Ok(())
    }

    fn check_dynamic(&self) -> Result<()> {
        if !self.shape.is_dynamic() {
            return Err(GraphError::InvalidOperation(format!(
                "list {} has a fixed size",
                self.id()
            )));
        }
        Ok(())
    }
}

impl Node for ListNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut NodeInfo {
        &mut self.info
    }

    fn kind(&self) -> &'static str {
        "List"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_array(&self) -> Option<&dyn Array> {
        Some(self)
    }

    fn initialize_state(&self, _graph: &Graph, state: &mut State) {
        state.insert(self.id(), self.list_state(self.min_size));
    }

    fn propagate(&self, _graph: &Graph, _state: &mut State) {}

    fn commit(&self, _graph: &Graph, state: &mut State) {
        let data = state.get_mut::<ListState>(self.id());
        data.items.commit();
        data.unused.commit();
    }

    fn revert(&self, _graph: &Graph, state: &mut State) {
        let data = state.get_mut::<ListState>(self.id());
        data.items.revert();
        data.unused.revert();
    }
}

impl Array for ListNode {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn min(&self) -> f64 {
        0.0
    }

    fn max(&self) -> f64 {
        self.n.saturating_sub(1) as f64
    }

    fn integral(&self) -> bool {
        true
    }

    fn size_info(&self) -> SizeInfo {
        SizeInfo {
            origin: self.id(),
            min_rows: self.min_size,
            max_rows: Some(self.max_size),
        }
    }

    fn view<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> ArrayView<'a> {
        buffer_view(&self.shape, &state.get::<ListState>(self.id()).items)
    }

    fn diff<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> &'a [Update] {
        state.get::<ListState>(self.id()).items.diff()
    }

    fn size_diff(&self, _graph: &Graph, state: &State) -> isize {
        state.get::<ListState>(self.id()).items.size_diff()
    }
}
