use std::any::Any;

use smallvec::SmallVec;

use crate::array::{Array, ArrayView, SizeInfo};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, Node, NodeId, NodeInfo};
use crate::nodes::indexing::{BasicTerm, Slice};
use crate::shape::{Dim, Shape};
use crate::state::{State, Update};
use crate::strides::linear_to_cartesian_into;

/// How one source axis maps to the output.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AxisMap {
    /// Source axis kept as an output axis. `len == None` for the dynamic leading axis.
    Keep {
        start: isize,
        step: isize,
        len: Option<usize>,
    },
    /// Source axis fixed to one position and removed.
    Drop { index: usize },
}

/// Slice/integer indexing of an array.
///
/// The output is a strided view into the source's values; nothing is copied. The node's
/// own state only holds the source diff translated to output positions.
///
/// # Example
///
/// ```
/// use ndgraph::Graph;
/// use ndgraph::nodes::{BasicIndexingNode, ConstantNode, Slice};
///
/// let mut graph = Graph::new();
/// let values: Vec<f64> = (0..12).map(|x| x as f64).collect();
/// let arr = graph.add_node(ConstantNode::new(values, &[3, 4]).unwrap()).unwrap();
///
/// // arr[1:, ::-2]
/// let node = BasicIndexingNode::new(
///     &graph,
///     arr.id(),
///     &[Slice::new(Some(1), None, 1).into(), Slice::new(None, None, -2).into()],
/// )
/// .unwrap();
/// let out = graph.add_node(node).unwrap();
///
/// let state = graph.initialize_state();
/// assert_eq!(graph.shape_in(&state, out).unwrap(), vec![2, 2]);
/// assert_eq!(graph.view(&state, out).unwrap().to_vec(), vec![7.0, 5.0, 11.0, 9.0]);
/// ```
#[derive(Debug, Clone)]
pub struct BasicIndexingNode {
    info: NodeInfo,
    shape: Shape,
    axes: Vec<AxisMap>,
    /// Source extents with the dynamic axis unbounded, for decomposing source flat indices.
    source_extents: Vec<usize>,
    source_row_size: usize,
    /// Row-major strides of the output's logical layout.
    strides: Vec<usize>,
    min: f64,
    max: f64,
    integral: bool,
    source_size_info: SizeInfo,
}

impl BasicIndexingNode {
    /// Index `source` with `terms`. Missing trailing terms are full slices.
    pub fn new(graph: &Graph, source: NodeId, terms: &[BasicTerm]) -> Result<Self> {
        let array = graph.array(source)?;
        let source_shape = array.shape();
        let ndim = source_shape.ndim();
        if terms.len() > ndim {
            return Err(GraphError::WrongNumberOfIndices {
                expected: ndim,
                actual: terms.len(),
            });
        }

        let full = BasicTerm::Slice(Slice::full());
        let mut axes = Vec::with_capacity(ndim);
        let mut dims = Vec::with_capacity(ndim);
        for (axis, &dim) in source_shape.dims().iter().enumerate() {
            let term = terms.get(axis).copied().unwrap_or(full);
            match (dim, term) {
                (Dim::Dynamic, BasicTerm::Slice(slice)) if slice.is_full() => {
                    axes.push(AxisMap::Keep {
                        start: 0,
                        step: 1,
                        len: None,
                    });
                    dims.push(Dim::Dynamic);
                }
                (Dim::Dynamic, term) => {
                    return Err(GraphError::DynamicNotAllowed {
                        message: format!(
                            "only a full slice can index a dynamic axis, got {term:?}"
                        ),
                    });
                }
                (Dim::Fixed(n), BasicTerm::Slice(slice)) => {
                    let range = slice.resolve(axis, n)?;
                    axes.push(AxisMap::Keep {
                        start: range.start,
                        step: range.step,
                        len: Some(range.len),
                    });
                    dims.push(Dim::Fixed(range.len));
                }
                (Dim::Fixed(n), BasicTerm::Index(i)) => {
                    let index = if i < 0 { i + n as isize } else { i };
                    if index < 0 || index >= n as isize {
                        return Err(GraphError::IndexOutOfBounds {
                            index: i,
                            dim_size: n,
                        });
                    }
                    axes.push(AxisMap::Drop {
                        index: index as usize,
                    });
                }
            }
        }

        let shape = Shape::new(&dims)?;
        let strides = shape.strides();
        let source_extents = source_shape
            .dims()
            .iter()
            .map(|d| d.fixed().unwrap_or(usize::MAX))
            .collect();

        Ok(Self {
            info: NodeInfo::validated(graph, vec![source]),
            shape,
            axes,
            source_extents,
            source_row_size: source_shape.row_size(),
            strides,
            min: array.min(),
            max: array.max(),
            integral: array.integral(),
            source_size_info: array.size_info(),
        })
    }

    fn source(&self) -> NodeId {
        self.info.predecessors()[0]
    }

    /// Output position of a source flat index, `None` if it is not viewed.
    fn translate(&self, source_index: usize) -> Option<usize> {
        let mut coords: SmallVec<[usize; 4]> = SmallVec::from_elem(0, self.axes.len());
        linear_to_cartesian_into(source_index, &self.source_extents, &mut coords);

        let mut out = 0usize;
        let mut out_axis = 0usize;
        for (&c, map) in coords.iter().zip(&self.axes) {
            match *map {
                AxisMap::Keep { start, step, len } => {
                    let rel = c as isize - start;
                    if rel % step != 0 {
                        return None;
                    }
                    let k = rel / step;
                    if k < 0 || len.is_some_and(|len| k as usize >= len) {
                        return None;
                    }
                    out += k as usize * self.strides[out_axis];
                    out_axis += 1;
                }
                AxisMap::Drop { index } => {
                    if c != index {
                        return None;
                    }
                }
            }
        }
        Some(out)
    }
}

impl Node for BasicIndexingNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut NodeInfo {
        &mut self.info
    }

    fn kind(&self) -> &'static str {
        "BasicIndexing"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_array(&self) -> Option<&dyn Array> {
        Some(self)
    }

    fn initialize_state(&self, _graph: &Graph, state: &mut State) {
        state.insert(self.id(), Vec::<Update>::new());
    }

    // The source diff is cumulative since the last commit, so retranslating all of it
    // keeps this idempotent.
    fn propagate(&self, graph: &Graph, state: &mut State) {
        let source = graph.array_unchecked(self.source());
        let translated: Vec<Update> = source
            .diff(graph, state)
            .iter()
            .filter_map(|u| self.translate(u.index).map(|i| u.with_index(i)))
            .collect();
        *state.get_mut::<Vec<Update>>(self.id()) = translated;
    }

    fn commit(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<Vec<Update>>(self.id()).clear();
    }

    fn revert(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<Vec<Update>>(self.id()).clear();
    }
}

impl Array for BasicIndexingNode {
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

    fn size_info(&self) -> SizeInfo {
        if self.shape.is_dynamic() {
            self.source_size_info
        } else {
            let rows = self
                .shape
                .dims()
                .first()
                .and_then(|d| d.fixed())
                .unwrap_or(1);
            SizeInfo::fixed(self.id(), rows)
        }
    }

    fn view<'a>(&'a self, graph: &'a Graph, state: &'a State) -> ArrayView<'a> {
        let source = graph.array_unchecked(self.source()).view(graph, state);
        let mut offset = 0isize;
        let mut shape: SmallVec<[usize; 4]> = SmallVec::new();
        let mut strides: SmallVec<[isize; 4]> = SmallVec::new();
        for (axis, map) in self.axes.iter().enumerate() {
            let stride = source.strides()[axis];
            match *map {
                AxisMap::Keep { start, step, len } => {
                    let len = len.unwrap_or(source.shape()[axis]);
                    if len > 0 {
                        offset += start * stride;
                    }
                    shape.push(len);
                    strides.push(step * stride);
                }
                AxisMap::Drop { index } => offset += index as isize * stride,
            }
        }
        source.restride(offset, &shape, &strides)
    }

    fn diff<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> &'a [Update] {
        state.get::<Vec<Update>>(self.id())
    }

    fn size_diff(&self, graph: &Graph, state: &State) -> isize {
        if !self.shape.is_dynamic() || self.source_row_size == 0 {
            return 0;
        }
        let rows = graph.array_unchecked(self.source()).size_diff(graph, state)
            / self.source_row_size as isize;
        rows * self.shape.row_size() as isize
    }
}
