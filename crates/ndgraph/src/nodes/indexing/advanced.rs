use std::any::Any;
use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::trace;

use crate::array::{Array, ArrayView, SizeInfo};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, Node, NodeId, NodeInfo};
use crate::nodes::buffer_view;
use crate::nodes::indexing::IndexTerm;
use crate::shape::{Dim, Shape, broadcast_shapes};
use crate::state::{ArrayBuffer, State, Update};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexerAxis {
    axis: usize,
    node: NodeId,
    /// 0-d indexers broadcast one value to every position.
    scalar: bool,
}

/// Concrete extents of the output blocks in one state.
///
/// Output flat index `p = (a * broadcast + b) * post + c` with `a` over the leading slice
/// axes, `b` over the broadcast index shape and `c` over the trailing slice axes.
#[derive(Debug)]
struct Extents {
    pre: SmallVec<[usize; 4]>,
    pre_size: usize,
    broadcast: usize,
    post_size: usize,
}

impl Extents {
    fn size(&self) -> usize {
        self.pre_size * self.broadcast * self.post_size
    }
}

type Readers = HashMap<usize, SmallVec<[usize; 2]>>;

fn link(readers: &mut Readers, source_index: usize, position: usize) {
    readers.entry(source_index).or_default().push(position);
}

fn unlink(readers: &mut Readers, source_index: usize, position: usize) {
    if let Some(positions) = readers.get_mut(&source_index) {
        if let Some(k) = positions.iter().position(|&p| p == position) {
            positions.swap_remove(k);
        }
        if positions.is_empty() {
            readers.remove(&source_index);
        }
    }
}

/// Output values, the source flat index each output position reads, and the reverse map
/// from source flat index to the output positions reading it.
#[derive(Debug, Default)]
struct AdvancedState {
    values: ArrayBuffer,
    offsets: ArrayBuffer<usize>,
    readers: Readers,
}

impl AdvancedState {
    fn new(offsets: Vec<usize>, values: Vec<f64>) -> Self {
        let mut readers = Readers::new();
        for (p, &f) in offsets.iter().enumerate() {
            link(&mut readers, f, p);
        }
        Self {
            values: ArrayBuffer::new(values),
            offsets: ArrayBuffer::new(offsets),
            readers,
        }
    }

    fn place(&mut self, source_index: usize, value: f64) {
        let position = self.offsets.len();
        self.offsets.emplace_back(source_index);
        self.values.emplace_back(value);
        link(&mut self.readers, source_index, position);
    }

    fn pop(&mut self) {
        if let Some(source_index) = self.offsets.pop_back() {
            unlink(&mut self.readers, source_index, self.offsets.len());
        }
        self.values.pop_back();
    }

    fn update(&mut self, position: usize, source_index: usize, value: f64) {
        match self.offsets.get(position) {
            Some(old) if old != source_index => {
                unlink(&mut self.readers, old, position);
                link(&mut self.readers, source_index, position);
                self.offsets.set(position, source_index);
            }
            _ => {}
        }
        self.values.set(position, value);
    }

    fn commit(&mut self) {
        self.values.commit();
        self.offsets.commit();
    }

    fn revert(&mut self) {
        for u in self.offsets.diff().iter().rev() {
            if let Some(new) = u.new {
                unlink(&mut self.readers, new, u.index);
            }
            if let Some(old) = u.old {
                link(&mut self.readers, old, u.index);
            }
        }
        self.offsets.revert();
        self.values.revert();
    }
}

/// Numpy-style indexing of an array by other (integral) arrays.
///
/// Every source axis gets one term: a full slice or an index array. The index arrays are
/// broadcast together (equal shapes or 0-d) and their common shape replaces the indexed
/// axes in the output:
///
/// - indexers next to each other: the broadcast shape takes their place,
///   `A[:, i, j, :]` has shape `(A.shape[0], *i.shape, A.shape[3])`;
/// - indexers separated by slices: the broadcast shape moves to the front,
///   `A[i, :, j]` has shape `(*i.shape, A.shape[1])`.
///
/// Supported only when the first term is an indexer or the indexers are contiguous, with
/// at most one multi-dimensional indexer and at most one (leading) dynamic output axis.
/// Every indexer's declared range must fit the axis it indexes, so propagation never sees
/// an out-of-range index.
///
/// # Example
///
/// ```
/// use ndgraph::Graph;
/// use ndgraph::nodes::{AdvancedIndexingNode, ConstantNode, IndexTerm, ListNode};
///
/// let mut graph = Graph::new();
/// let values: Vec<f64> = (0..30).map(|x| x as f64).collect();
/// let arr = graph.add_node(ConstantNode::new(values, &[2, 3, 5]).unwrap()).unwrap();
/// let i = graph.add_node(ListNode::new(2)).unwrap();
/// let j = graph.add_node(ConstantNode::from_slice(&[1.0, 1.0])).unwrap();
///
/// let node =
///     AdvancedIndexingNode::new(&graph, arr.id(), &[i.into(), IndexTerm::Full, j.into()])
///         .unwrap();
/// let out = graph.add_node(node).unwrap();
///
/// let mut state = graph.initialize_state();
/// assert_eq!(graph.shape_in(&state, out).unwrap(), vec![2, 3]);
/// assert_eq!(
///     graph.view(&state, out).unwrap().to_vec(),
///     vec![1.0, 6.0, 11.0, 16.0, 21.0, 26.0]
/// );
///
/// graph.node(i).exchange(&mut state, 0, 1).unwrap();
/// graph.propagate(&mut state, &[i.id(), out.id()]).unwrap();
/// assert_eq!(
///     graph.view(&state, out).unwrap().to_vec(),
///     vec![16.0, 21.0, 26.0, 1.0, 6.0, 11.0]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct AdvancedIndexingNode {
    info: NodeInfo,
    shape: Shape,
    source_shape: Shape,
    source_strides: Vec<usize>,
    /// Sliced source axes placed before the broadcast block.
    pre_axes: Vec<usize>,
    /// Sliced source axes placed after the broadcast block.
    post_axes: Vec<usize>,
    indexers: Vec<IndexerAxis>,
    broadcast: Shape,
    min: f64,
    max: f64,
    integral: bool,
    dynamic_size_info: Option<SizeInfo>,
}

impl AdvancedIndexingNode {
    /// Index `source` with one term per axis.
    pub fn new(graph: &Graph, source: NodeId, terms: &[IndexTerm]) -> Result<Self> {
        let array = graph.array(source)?;
        let source_shape = array.shape().clone();
        let source_info = array.size_info();
        let ndim = source_shape.ndim();
        if terms.len() != ndim {
            return Err(GraphError::WrongNumberOfIndices {
                expected: ndim,
                actual: terms.len(),
            });
        }

        let mut indexers = Vec::new();
        let mut shapes = Vec::new();
        let mut infos = Vec::new();
        for (axis, term) in terms.iter().enumerate() {
            let IndexTerm::Indexer(node) = *term else {
                continue;
            };
            let indexer = graph.array(node)?;
            if !indexer.integral() {
                return Err(GraphError::NonIntegralIndexer { node, axis });
            }
            let extent = match source_shape.dims()[axis] {
                Dim::Fixed(n) => n,
                Dim::Dynamic => source_info.min_rows,
            };
            if indexer.min() < 0.0 || indexer.max() >= extent as f64 {
                return Err(GraphError::IndexerOutOfRange {
                    node,
                    axis,
                    min: indexer.min(),
                    max: indexer.max(),
                    extent,
                });
            }
            indexers.push(IndexerAxis {
                axis,
                node,
                scalar: indexer.ndim() == 0,
            });
            shapes.push(indexer.shape().clone());
            infos.push(indexer.size_info());
        }

        let (Some(first), Some(last)) = (indexers.first(), indexers.last()) else {
            return Err(GraphError::UnsupportedIndexing {
                message: "no index arrays given, use basic indexing".to_string(),
            });
        };
        let (first, last) = (first.axis, last.axis);

        let broadcast = broadcast_shapes(&shapes)?.unwrap_or_else(Shape::scalar);

        // Dynamic indexers of equal shape must also have equal sizes in every state.
        let mut dynamic_origin: Option<(usize, SizeInfo)> = None;
        for (k, (shape, info)) in shapes.iter().zip(&infos).enumerate() {
            if !shape.is_dynamic() {
                continue;
            }
            match dynamic_origin {
                None => dynamic_origin = Some((k, *info)),
                Some((j, other)) if other.origin != info.origin => {
                    return Err(GraphError::BroadcastMismatch {
                        lhs: format!("{} sized by {}", shapes[j], other.origin),
                        rhs: format!("{} sized by {}", shape, info.origin),
                    });
                }
                Some(_) => {}
            }
        }

        let multi_dim = shapes.iter().filter(|s| s.ndim() >= 2).count();
        if multi_dim > 1 {
            return Err(GraphError::MultipleMultiDimIndexers { count: multi_dim });
        }

        let contiguous = terms[first..=last]
            .iter()
            .all(|t| matches!(t, IndexTerm::Indexer(_)));
        if first > 0 && !contiguous {
            return Err(GraphError::UnsupportedIndexing {
                message: "index arrays separated by a slice must start at the first axis"
                    .to_string(),
            });
        }
        if first > 0 && multi_dim > 0 {
            return Err(GraphError::UnsupportedIndexing {
                message: "a multi-dimensional index array cannot follow a slice".to_string(),
            });
        }

        let pre_axes: Vec<usize> = (0..first).collect();
        let post_axes: Vec<usize> = (first..ndim)
            .filter(|&a| terms[a] == IndexTerm::Full)
            .collect();

        if broadcast.is_dynamic() && !pre_axes.is_empty() {
            return Err(GraphError::UnsupportedIndexing {
                message: "dynamic index arrays must not follow a slice".to_string(),
            });
        }

        let dims: Vec<Dim> = pre_axes
            .iter()
            .map(|&a| source_shape.dims()[a])
            .chain(broadcast.dims().iter().copied())
            .chain(post_axes.iter().map(|&a| source_shape.dims()[a]))
            .collect();
        let shape = Shape::new(&dims).map_err(|_| GraphError::UnsupportedIndexing {
            message: "the output would have a non-leading dynamic dimension".to_string(),
        })?;

        let dynamic_size_info = if let Some((_, info)) = dynamic_origin {
            Some(info)
        } else if shape.is_dynamic() {
            Some(source_info)
        } else {
            None
        };

        let predecessors = std::iter::once(source)
            .chain(indexers.iter().map(|ix| ix.node))
            .collect();

        Ok(Self {
            info: NodeInfo::validated(graph, predecessors),
            source_strides: source_shape.strides(),
            shape,
            source_shape,
            pre_axes,
            post_axes,
            indexers,
            broadcast,
            min: array.min(),
            max: array.max(),
            integral: array.integral(),
            dynamic_size_info,
        })
    }

    fn source(&self) -> NodeId {
        self.info.predecessors()[0]
    }

    fn extents(&self, graph: &Graph, state: &State) -> Extents {
        let mut pre = SmallVec::with_capacity(self.pre_axes.len());
        for &axis in &self.pre_axes {
            let extent = match self.source_shape.dims()[axis] {
                Dim::Fixed(n) => n,
                Dim::Dynamic => {
                    let size = graph.array_unchecked(self.source()).state_size(graph, state);
                    size.checked_div(self.source_shape.row_size()).unwrap_or(0)
                }
            };
            pre.push(extent);
        }
        let broadcast = match self.broadcast.size() {
            Some(size) => size,
            None => self
                .indexers
                .iter()
                .find(|ix| !ix.scalar)
                .map(|ix| graph.array_unchecked(ix.node).state_size(graph, state))
                .unwrap_or(1),
        };
        let post_size = self
            .post_axes
            .iter()
            .map(|&a| self.source_shape.dims()[a].fixed().unwrap_or(0))
            .product();
        Extents {
            pre_size: pre.iter().product(),
            pre,
            broadcast,
            post_size,
        }
    }

    /// Source flat index read by output position `p`.
    fn source_index(&self, ext: &Extents, indexers: &[ArrayView<'_>], p: usize) -> usize {
        let mut c = p % ext.post_size;
        let ab = p / ext.post_size;
        let b = ab % ext.broadcast;
        let mut a = ab / ext.broadcast;

        let mut index = 0usize;
        for (&axis, &extent) in self.pre_axes.iter().zip(&ext.pre).rev() {
            index += (a % extent) * self.source_strides[axis];
            a /= extent;
        }
        for &axis in self.post_axes.iter().rev() {
            let extent = self.source_shape.dims()[axis].fixed().unwrap_or(0);
            index += (c % extent) * self.source_strides[axis];
            c /= extent;
        }
        for (ix, view) in self.indexers.iter().zip(indexers) {
            let q = if ix.scalar { 0 } else { b };
            index += view.get(q) as usize * self.source_strides[ix.axis];
        }
        index
    }

    fn indexer_views<'a>(
        &self,
        graph: &'a Graph,
        state: &'a State,
    ) -> SmallVec<[ArrayView<'a>; 4]> {
        self.indexers
            .iter()
            .map(|ix| graph.array_unchecked(ix.node).view(graph, state))
            .collect()
    }

    /// Output positions below `limit` whose value may differ from the stored one.
    fn dirty_positions(
        &self,
        graph: &Graph,
        state: &State,
        data: &AdvancedState,
        ext: &Extents,
        limit: usize,
    ) -> Vec<usize> {
        let mut dirty = Vec::new();
        let block = ext.post_size;
        for ix in &self.indexers {
            let diff = graph.array_unchecked(ix.node).diff(graph, state);
            if diff.is_empty() {
                continue;
            }
            if ix.scalar {
                return (0..limit).collect();
            }
            for u in diff.iter().filter(|u| u.index < ext.broadcast) {
                for a in 0..ext.pre_size {
                    let base = (a * ext.broadcast + u.index) * block;
                    dirty.extend((base..base + block).take_while(|&p| p < limit));
                }
            }
        }

        let source = graph.array_unchecked(self.source());
        for u in source.diff(graph, state) {
            if let Some(positions) = data.readers.get(&u.index) {
                dirty.extend(positions.iter().copied().filter(|&p| p < limit));
            }
        }

        dirty.sort_unstable();
        dirty.dedup();
        dirty
    }
}

impl Node for AdvancedIndexingNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut NodeInfo {
        &mut self.info
    }

    fn kind(&self) -> &'static str {
        "AdvancedIndexing"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_array(&self) -> Option<&dyn Array> {
        Some(self)
    }

    fn initialize_state(&self, graph: &Graph, state: &mut State) {
        let data = {
            let ext = self.extents(graph, state);
            let source = graph.array_unchecked(self.source()).view(graph, state);
            let indexers = self.indexer_views(graph, state);
            let offsets: Vec<usize> = (0..ext.size())
                .map(|p| self.source_index(&ext, &indexers, p))
                .collect();
            let values = offsets.iter().map(|&f| source.get(f)).collect();
            AdvancedState::new(offsets, values)
        };
        state.insert(self.id(), data);
    }

    // Recomputes every position touched by the predecessors' cumulative diffs, so calling
    // it again without new changes records nothing.
    fn propagate(&self, graph: &Graph, state: &mut State) {
        let mut data = state.take::<AdvancedState>(self.id());
        {
            let state = &*state;
            let ext = self.extents(graph, state);
            let old_size = data.values.len();
            let new_size = ext.size();
            let keep = old_size.min(new_size);
            let dirty = self.dirty_positions(graph, state, &data, &ext, keep);

            let source = graph.array_unchecked(self.source()).view(graph, state);
            let indexers = self.indexer_views(graph, state);

            while data.values.len() > new_size {
                data.pop();
            }
            for &p in &dirty {
                let f = self.source_index(&ext, &indexers, p);
                data.update(p, f, source.get(f));
            }
            for p in keep..new_size {
                let f = self.source_index(&ext, &indexers, p);
                data.place(f, source.get(f));
            }
            trace!(
                node = %self.id(),
                dirty = dirty.len(),
                old_size,
                new_size,
                "advanced indexing update"
            );
        }
        state.restore(self.id(), data);
    }

    fn commit(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<AdvancedState>(self.id()).commit();
    }

    fn revert(&self, _graph: &Graph, state: &mut State) {
        state.get_mut::<AdvancedState>(self.id()).revert();
    }
}

impl Array for AdvancedIndexingNode {
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
        match self.dynamic_size_info {
            Some(info) => info,
            None => {
                let rows = self
                    .shape
                    .dims()
                    .first()
                    .and_then(|d| d.fixed())
                    .unwrap_or(1);
                SizeInfo::fixed(self.id(), rows)
            }
        }
    }

    fn view<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> ArrayView<'a> {
        buffer_view(&self.shape, &state.get::<AdvancedState>(self.id()).values)
    }

    fn diff<'a>(&'a self, _graph: &'a Graph, state: &'a State) -> &'a [Update] {
        state.get::<AdvancedState>(self.id()).values.diff()
    }

    fn size_diff(&self, _graph: &Graph, state: &State) -> isize {
        state.get::<AdvancedState>(self.id()).values.size_diff()
    }
}
