use std::any::Any;

use crate::array::{Array, ArrayView, SizeInfo};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, Node, NodeInfo};
use crate::nodes::{buffer_view, is_integer};
use crate::shape::Shape;
use crate::state::{ArrayBuffer, State, Update};

/// Array with a dynamic leading dimension whose rows can be appended and removed.
///
/// # Example
///
/// ```
/// use ndgraph::Graph;
/// use ndgraph::nodes::DynamicArrayNode;
///
/// let mut graph = Graph::new();
/// let arr = graph
///     .add_node(DynamicArrayNode::new(&[2], 0.0, 9.0, true).unwrap())
///     .unwrap();
/// let mut state = graph.initialize_state();
///
/// graph.node(arr).grow(&mut state, &[1.0, 2.0, 3.0, 4.0]).unwrap();
/// assert_eq!(graph.shape_in(&state, arr).unwrap(), vec![2, 2]);
/// assert_eq!(graph.size_diff(&state, arr).unwrap(), 4);
///
/// graph.revert(&mut state, &[arr.id()]).unwrap();
/// assert_eq!(graph.size_in(&state, arr).unwrap(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct DynamicArrayNode {
    info: NodeInfo,
    shape: Shape,
    lower: f64,
    upper: f64,
    integral: bool,
    min_rows: usize,
    max_rows: Option<usize>,
}

impl DynamicArrayNode {
    /// Dynamic array of rows with `trailing` extents and values in `[lower, upper]`.
    pub fn new(trailing: &[usize], lower: f64, upper: f64, integral: bool) -> Result<Self> {
        let (lo, hi) = if integral {
            (lower.ceil(), upper.floor())
        } else {
            (lower, upper)
        };
        if lower.is_nan() || upper.is_nan() || lo > hi {
            return Err(GraphError::InvalidOperation(format!(
                "empty value domain [{lower}, {upper}]"
            )));
        }
        Ok(Self {
            info: NodeInfo::new(Vec::new()),
            shape: Shape::dynamic(trailing),
            lower,
            upper,
            integral,
            min_rows: 0,
            max_rows: None,
        })
    }

    /// Restrict the number of rows to `min_rows..=max_rows`.
    pub fn with_row_bounds(mut self, min_rows: usize, max_rows: Option<usize>) -> Result<Self> {
        if let Some(max) = max_rows.filter(|&max| min_rows > max) {
            return Err(GraphError::SizeOutOfBounds {
                size: min_rows,
                min: min_rows,
                max,
            });
        }
        self.min_rows = min_rows;
        self.max_rows = max_rows;
        Ok(self)
    }

    fn row_size(&self) -> usize {
        self.shape.row_size()
    }

    fn default_value(&self) -> f64 {
        let v = 0.0f64.clamp(self.lower, self.upper);
        if self.integral {
            v.ceil().min(self.upper.floor())
        } else {
            v
        }
    }

    fn check_value(&self, value: f64) -> Result<()> {
        if value.is_nan()
            || value < self.lower
            || value > self.upper
            || (self.integral && !is_integer(value))
        {
            return Err(GraphError::ValueOutOfBounds {
                value,
                min: self.lower,
                max: self.upper,
            });
        }
        Ok(())
    }

    fn check_rows(&self, rows: usize) -> Result<()> {
        let max = self.max_rows.unwrap_or(usize::MAX);
        if rows < self.min_rows || rows > max {
            return Err(GraphError::SizeOutOfBounds {
                size: rows,
                min: self.min_rows,
                max,
            });
        }
        Ok(())
    }

    /// Number of rows spanned by `len` values.
    fn rows_of(&self, len: usize) -> Result<usize> {
        let row_size = self.row_size();
        if row_size == 0 {
            return Ok(0);
        }
        if len % row_size != 0 {
            return Err(GraphError::ShapeMismatch {
                expected: len.next_multiple_of(row_size),
                actual: len,
            });
        }
        Ok(len / row_size)
    }

    /// Seed this node with explicit row-major values.
    pub fn initialize_state_with(&self, state: &mut State, values: Vec<f64>) -> Result<()> {
        self.info.check_unseeded(state)?;
        self.check_rows(self.rows_of(values.len())?)?;
        for &v in &values {
            self.check_value(v)?;
        }
        state.insert(self.id(), ArrayBuffer::new(values));
        Ok(())
    }

    /// Set the element at flat index `index`.
    pub fn set(&self, state: &mut State, index: usize, value: f64) -> Result<()> {
        self.info.check_state(state)?;
        self.check_value(value)?;
        let buffer = state.get_mut::<ArrayBuffer>(self.id());
        if index >= buffer.len() {
            return Err(GraphError::IndexOutOfBounds {
                index: index as isize,
                dim_size: buffer.len(),
            });
        }
        buffer.set(index, value);
        Ok(())
    }

    /// Append whole rows.
    pub fn grow(&self, state: &mut State, values: &[f64]) -> Result<()> {
        self.info.check_state(state)?;
        let added = self.rows_of(values.len())?;
        for &v in values {
            self.check_value(v)?;
        }
        let buffer = state.get_mut::<ArrayBuffer>(self.id());
        let rows = self.rows_of(buffer.len())?;
        self.check_rows(rows + added)?;
        for &v in values {
            buffer.emplace_back(v);
        }
        Ok(())
    }

    /// Remove the last row.
    pub fn shrink(&self, state: &mut State) -> Result<()> {
        self.info.check_state(state)?;
        let row_size = self.row_size();
        let buffer = state.get_mut::<ArrayBuffer>(self.id());
        let rows = self.rows_of(buffer.len())?;
        if rows == 0 {
            return Err(GraphError::SizeOutOfBounds {
                size: 0,
                min: self.min_rows,
                max: self.max_rows.unwrap_or(usize::MAX),
            });
        }
        self.check_rows(rows - 1)?;
        for _ in 0..row_size {
            buffer.pop_back();
        }
        Ok(())
    }
}

impl Node for DynamicArrayNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut NodeInfo {
        &mut self.info
    }

    fn kind(&self) -> &'static str {
        "DynamicArray"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_array(&self) -> Option<&dyn Array> {
        Some(self)
    }

    fn initialize_state(&self, _graph: &Graph, state: &mut State) {
        let values = vec![self.default_value(); self.min_rows * self.row_size()];
        state.insert(self.id(), ArrayBuffer::new(values));
    }

    fn propagate(&self, _graph: &Graph, _state: &mut State) {}

    fn commit(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<ArrayBuffer>(self.id()).commit();
    }

    fn revert(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<ArrayBuffer>(self.id()).revert();
    }
}

impl Array for DynamicArrayNode {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn min(&self) -> f64 {
        self.lower
    }

    fn max(&self) -> f64 {
        self.upper
    }

    fn integral(&self) -> bool {
        self.integral
    }

    fn size_info(&self) -> SizeInfo {
        SizeInfo {
            origin: self.id(),
            min_rows: self.min_rows,
            max_rows: self.max_rows,
        }
    }

    fn view<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> ArrayView<'a> {
        buffer_view(&self.shape, state.get::<ArrayBuffer>(self.id()))
    }

    fn diff<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> &'a [Update] {
        state.get::<ArrayBuffer>(self.id()).diff()
    }

    fn size_diff(&self, _graph: &Graph, state: &State) -> isize {
        state.get::<ArrayBuffer>(self.id()).size_diff()
    }
}
