use std::any::Any;

use crate::array::{Array, ArrayView};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, Node, NodeInfo};
use crate::nodes::is_integer;
use crate::shape::Shape;
use crate::state::{State, Update};

/// Array with fixed values.
///
/// The values live on the node rather than in a [`State`], so every state sees the same
/// data and the diff is always empty.
#[derive(Debug, Clone)]
pub struct ConstantNode {
    info: NodeInfo,
    shape: Shape,
    values: Vec<f64>,
    min: f64,
    max: f64,
    integral: bool,
}

impl ConstantNode {
    /// Constant with the given row-major values and extents.
    pub fn new(values: Vec<f64>, extents: &[usize]) -> Result<Self> {
        Self::with_shape(values, Shape::fixed(extents))
    }

    /// Constant with an explicit shape. Dynamic shapes are rejected.
    pub fn with_shape(values: Vec<f64>, shape: Shape) -> Result<Self> {
        let Some(size) = shape.size() else {
            return Err(GraphError::DynamicNotAllowed {
                message: format!("constant with shape {shape}"),
            });
        };
        if values.len() != size {
            return Err(GraphError::ShapeMismatch {
                expected: size,
                actual: values.len(),
            });
        }

        Ok(Self::build(values, shape))
    }

    /// One-dimensional constant.
    pub fn from_slice(values: &[f64]) -> Self {
        Self::build(values.to_vec(), Shape::fixed(&[values.len()]))
    }

    /// Zero-dimensional constant.
    pub fn scalar(value: f64) -> Self {
        Self::build(vec![value], Shape::scalar())
    }

    fn build(values: Vec<f64>, shape: Shape) -> Self {
        let (min, max) = if values.is_empty() {
            (0.0, 0.0)
        } else {
            values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                })
        };
        let integral = values.iter().all(|&v| is_integer(v));
        Self {
            info: NodeInfo::new(Vec::new()),
            shape,
            values,
            min,
            max,
            integral,
        }
    }
}

impl Node for ConstantNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut NodeInfo {
        &mut self.info
    }

    fn kind(&self) -> &'static str {
        "Constant"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_array(&self) -> Option<&dyn Array> {
        Some(self)
    }

    fn initialize_state(&self, _graph: &Graph, state: &mut State) {
        state.insert(self.id(), ());
    }

    fn propagate(&self, _graph: &Graph, _state: &mut State) {}

    fn commit(&self, _graph: &Graph, _state: &mut State) {}

    fn revert(&self, _graph: &Graph, _state: &mut State) {}
}

impl Array for ConstantNode {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn integral(&self) -> bool {
        self.integral
    }

    fn view<'a>(&'a self, _graph: &'a Graph, _state: &'a State) -> ArrayView<'a> {
        ArrayView::contiguous(&self.values, &self.shape.resolve(self.values.len()))
    }

    fn diff<'a>(&'a self, _graph: &'a Graph, _state: &'a State) -> &'a [Update] {
        &[]
    }

    fn size_diff(&self, _graph: &Graph, _state: &State) -> isize {
        0
    }
}
