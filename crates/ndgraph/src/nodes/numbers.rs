use std::any::Any;

use crate::array::{Array, ArrayView};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, Node, NodeInfo};
use crate::nodes::{buffer_view, is_integer};
use crate::shape::Shape;
use crate::state::{ArrayBuffer, State, Update};

/// Integer decision variable with a fixed shape and inclusive bounds.
#[derive(Debug, Clone)]
pub struct IntegerNode {
    info: NodeInfo,
    shape: Shape,
    lower: i64,
    upper: i64,
}

impl IntegerNode {
    pub const DEFAULT_LOWER_BOUND: i64 = 0;
    pub const DEFAULT_UPPER_BOUND: i64 = 2_000_000_000;

    /// Variable with the default bounds.
    pub fn new(extents: &[usize]) -> Result<Self> {
        Self::with_bounds(extents, Self::DEFAULT_LOWER_BOUND, Self::DEFAULT_UPPER_BOUND)
    }

    /// Variable taking values in `lower..=upper`.
    pub fn with_bounds(extents: &[usize], lower: i64, upper: i64) -> Result<Self> {
        if lower > upper {
            return Err(GraphError::InvalidOperation(format!(
                "lower bound {lower} exceeds upper bound {upper}"
            )));
        }
        Ok(Self {
            info: NodeInfo::new(Vec::new()),
            shape: Shape::fixed(extents),
            lower,
            upper,
        })
    }

    fn default_value(&self) -> f64 {
        0i64.clamp(self.lower, self.upper) as f64
    }

    fn check_value(&self, value: f64) -> Result<()> {
        if !is_integer(value) || value < self.lower as f64 || value > self.upper as f64 {
            return Err(GraphError::ValueOutOfBounds {
                value,
                min: self.lower as f64,
                max: self.upper as f64,
            });
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let size = self.shape.size().unwrap_or(0);
        if index >= size {
            return Err(GraphError::IndexOutOfBounds {
                index: index as isize,
                dim_size: size,
            });
        }
        Ok(())
    }

    /// Seed this node with explicit row-major values.
    pub fn initialize_state_with(&self, state: &mut State, values: Vec<f64>) -> Result<()> {
        self.info.check_unseeded(state)?;
        let size = self.shape.size().unwrap_or(0);
        if values.len() != size {
            return Err(GraphError::ShapeMismatch {
                expected: size,
                actual: values.len(),
            });
        }
        for &v in &values {
            self.check_value(v)?;
        }
        state.insert(self.id(), ArrayBuffer::new(values));
        Ok(())
    }

    /// Set the element at flat index `index`.
    pub fn set_value(&self, state: &mut State, index: usize, value: f64) -> Result<()> {
        self.info.check_state(state)?;
        self.check_index(index)?;
        self.check_value(value)?;
        state.get_mut::<ArrayBuffer>(self.id()).set(index, value);
        Ok(())
    }

    /// Swap two elements.
    pub fn exchange(&self, state: &mut State, i: usize, j: usize) -> Result<()> {
        self.info.check_state(state)?;
        self.check_index(i)?;
        self.check_index(j)?;
        state.get_mut::<ArrayBuffer>(self.id()).exchange(i, j);
        Ok(())
    }
}

impl Node for IntegerNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut NodeInfo {
        &mut self.info
    }

    fn kind(&self) -> &'static str {
        "Integer"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_array(&self) -> Option<&dyn Array> {
        Some(self)
    }

    fn initialize_state(&self, _graph: &Graph, state: &mut State) {
        let size = self.shape.size().unwrap_or(0);
        state.insert(
            self.id(),
            ArrayBuffer::new(vec![self.default_value(); size]),
        );
    }

    // Mutations are applied to the buffer directly.
    fn propagate(&self, _graph: &Graph, _state: &mut State) {}

    fn commit(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<ArrayBuffer>(self.id()).commit();
    }

    fn revert(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<ArrayBuffer>(self.id()).revert();
    }
}

impl Array for IntegerNode {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn min(&self) -> f64 {
        self.lower as f64
    }

    fn max(&self) -> f64 {
        self.upper as f64
    }

    fn integral(&self) -> bool {
        true
    }

    fn view<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> ArrayView<'a> {
        buffer_view(&self.shape, state.get::<ArrayBuffer>(self.id()))
    }

    fn diff<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> &'a [Update] {
        state.get::<ArrayBuffer>(self.id()).diff()
    }

    fn size_diff(&self, _graph: &Graph, _state: &State) -> isize {
        0
    }
}
