//! Node arena and graph-level state transitions.
//!
//! Nodes are stored in insertion order and referenced by [`NodeId`]. Because a node's
//! predecessors must exist before it is added, insertion order is a topological order and
//! cycles cannot be expressed.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use tracing::{debug, trace};

use crate::array::{Array, ArrayView};
use crate::error::{GraphError, Result};
use crate::shape::Shape;
use crate::state::{State, Update};

static NEXT_GRAPH_UID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a node in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Create a NodeId for testing purposes.
    #[cfg(test)]
    pub(crate) fn new_for_test(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed handle to a node, returned by [`Graph::add_node`].
pub struct NodeRef<N> {
    id: NodeId,
    _phantom: PhantomData<fn() -> N>,
}

impl<N> NodeRef<N> {
    /// Get the node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl<N> Clone for NodeRef<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for NodeRef<N> {}

impl<N> fmt::Debug for NodeRef<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({})", self.id)
    }
}

impl<N> PartialEq for NodeRef<N> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<N> Eq for NodeRef<N> {}

impl<N> From<NodeRef<N>> for NodeId {
    fn from(handle: NodeRef<N>) -> Self {
        handle.id
    }
}

/// Topology shared by every node kind: its id and its inputs.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    id: Option<NodeId>,
    graph_uid: u64,
    /// Graph the node's construction-time checks ran against, if any.
    validated_by: Option<u64>,
    predecessors: Vec<NodeId>,
}

impl NodeInfo {
    pub fn new(predecessors: Vec<NodeId>) -> Self {
        Self {
            id: None,
            graph_uid: 0,
            validated_by: None,
            predecessors,
        }
    }

    /// Topology of a node whose predecessors were inspected in `graph`. Such a node can
    /// only be added to that graph.
    pub fn validated(graph: &Graph, predecessors: Vec<NodeId>) -> Self {
        Self {
            validated_by: Some(graph.uid),
            ..Self::new(predecessors)
        }
    }

    /// The node's id.
    ///
    /// # Panics
    ///
    /// Panics if the node has not been added to a graph.
    pub fn id(&self) -> NodeId {
        match self.id {
            Some(id) => id,
            None => panic!("node has not been added to a graph"),
        }
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }

    /// Check that `state` was created by this node's graph and holds this node's state.
    pub(crate) fn check_state(&self, state: &State) -> Result<()> {
        if state.graph_uid() != self.graph_uid {
            return Err(GraphError::StateMismatch);
        }
        if !state.is_initialized(self.id()) {
            return Err(GraphError::NotInitialized { node: self.id() });
        }
        Ok(())
    }

    /// Check that `state` was created by this node's graph and this node is not seeded yet.
    pub(crate) fn check_unseeded(&self, state: &State) -> Result<()> {
        if state.graph_uid() != self.graph_uid {
            return Err(GraphError::StateMismatch);
        }
        if state.is_initialized(self.id()) {
            return Err(GraphError::AlreadyInitialized { node: self.id() });
        }
        Ok(())
    }
}

/// A unit of the computation graph.
///
/// A node holds shape and topology only. Everything that changes at runtime lives in the
/// node's slot of a [`State`], which the node creates in `initialize_state` and updates in
/// `propagate`, `commit` and `revert`.
pub trait Node: Any + fmt::Debug + Send + Sync {
    fn info(&self) -> &NodeInfo;

    fn info_mut(&mut self) -> &mut NodeInfo;

    /// Short name of the node kind, used in logs.
    fn kind(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// The array capability, for array-valued nodes.
    fn as_array(&self) -> Option<&dyn Array> {
        None
    }

    fn id(&self) -> NodeId {
        self.info().id()
    }

    fn predecessors(&self) -> &[NodeId] {
        self.info().predecessors()
    }

    /// Seed the node's default state. Predecessors are already initialized.
    fn initialize_state(&self, graph: &Graph, state: &mut State);

    /// Bring this node's values and diff up to date with its predecessors' diffs.
    ///
    /// Must be idempotent when called again without new predecessor changes.
    fn propagate(&self, graph: &Graph, state: &mut State);

    /// Make the pending changes permanent and clear the diff.
    fn commit(&self, graph: &Graph, state: &mut State);

    /// Drop the pending changes, restoring the last committed values.
    fn revert(&self, graph: &Graph, state: &mut State);
}

/// Directed acyclic graph of nodes.
///
/// The topology can only change until the first [`State`] is created from the graph; after
/// that the graph is read-only and may be shared between threads, each with its own state.
///
/// # Example
///
/// ```
/// use ndgraph::Graph;
/// use ndgraph::nodes::{AdvancedIndexingNode, ConstantNode, IndexTerm};
///
/// let mut graph = Graph::new();
/// let values: Vec<f64> = (0..9).map(|x| x as f64).collect();
/// let arr = graph.add_node(ConstantNode::new(values, &[3, 3]).unwrap()).unwrap();
/// let i = graph.add_node(ConstantNode::from_slice(&[0.0, 1.0, 2.0])).unwrap();
/// let j = graph.add_node(ConstantNode::from_slice(&[1.0, 2.0, 0.0])).unwrap();
/// let out = AdvancedIndexingNode::new(
///     &graph,
///     arr.id(),
///     &[IndexTerm::Indexer(i.id()), IndexTerm::Indexer(j.id())],
/// )
/// .unwrap();
/// let out = graph.add_node(out).unwrap();
///
/// let state = graph.initialize_state();
/// assert_eq!(graph.view(&state, out).unwrap().to_vec(), vec![1.0, 5.0, 6.0]);
/// ```
pub struct Graph {
    uid: u64,
    nodes: Vec<Box<dyn Node>>,
    dependencies: DiGraph<NodeId, ()>,
    frozen: AtomicBool,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            uid: NEXT_GRAPH_UID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            dependencies: DiGraph::new(),
            frozen: AtomicBool::new(false),
        }
    }

    /// Insert a node. Its predecessors must already be in the graph.
    pub fn add_node<N: Node>(&mut self, mut node: N) -> Result<NodeRef<N>> {
        if self.is_frozen() {
            return Err(GraphError::GraphFrozen);
        }
        if node.info().validated_by.is_some_and(|uid| uid != self.uid) {
            return Err(GraphError::ForeignNode { kind: node.kind() });
        }
        if let Some(&missing) = node
            .info()
            .predecessors()
            .iter()
            .find(|p| p.index() >= self.nodes.len())
        {
            return Err(GraphError::UnknownNode { node: missing });
        }

        let id = NodeId(self.nodes.len());
        node.info_mut().id = Some(id);
        node.info_mut().graph_uid = self.uid;

        let index = self.dependencies.add_node(id);
        debug_assert_eq!(index.index(), id.index());
        for &pred in node.info().predecessors() {
            self.dependencies
                .update_edge(NodeIndex::new(pred.index()), index, ());
        }

        debug!(
            node = %id,
            kind = node.kind(),
            shape = %node.as_array().map(|a| a.shape().to_string()).unwrap_or_default(),
            "added node"
        );
        self.nodes.push(Box::new(node));

        Ok(NodeRef {
            id,
            _phantom: PhantomData,
        })
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a state has been created, which fixes the topology.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Get node by ID.
    pub fn get(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(id.index()).map(|n| n.as_ref())
    }

    /// Typed access to a node, or `None` if the handle belongs to another graph.
    pub fn try_node<N: Node>(&self, handle: NodeRef<N>) -> Option<&N> {
        self.get(handle.id)?.as_any().downcast_ref::<N>()
    }

    /// Typed access to a node.
    ///
    /// # Panics
    ///
    /// Panics if the handle was returned by another graph.
    pub fn node<N: Node>(&self, handle: NodeRef<N>) -> &N {
        match self.try_node(handle) {
            Some(node) => node,
            None => panic!("handle {:?} does not belong to this graph", handle),
        }
    }

    /// The array capability of a node.
    pub fn array(&self, id: impl Into<NodeId>) -> Result<&dyn Array> {
        let id = id.into();
        let node = self.get(id).ok_or(GraphError::UnknownNode { node: id })?;
        node.as_array().ok_or_else(|| {
            GraphError::InvalidOperation(format!("node {id} ({}) is not an array", node.kind()))
        })
    }

    /// Like [`Graph::array`] for ids already validated at construction.
    pub(crate) fn array_unchecked(&self, id: NodeId) -> &dyn Array {
        match self.nodes[id.index()].as_array() {
            Some(array) => array,
            None => panic!("node {id} is not an array"),
        }
    }

    pub fn predecessors(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self
            .get(id)
            .ok_or(GraphError::UnknownNode { node: id })?
            .predecessors())
    }

    /// Nodes that consume `id`, in id order.
    pub fn successors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        if id.index() >= self.nodes.len() {
            return Err(GraphError::UnknownNode { node: id });
        }
        let mut succ: Vec<NodeId> = self
            .dependencies
            .neighbors_directed(NodeIndex::new(id.index()), Direction::Outgoing)
            .map(|n| self.dependencies[n])
            .collect();
        succ.sort_unstable();
        Ok(succ)
    }

    fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// A state with no node seeded.
    ///
    /// Leaf nodes can then be seeded explicitly (e.g.
    /// [`IntegerNode::initialize_state_with`](crate::nodes::IntegerNode::initialize_state_with))
    /// and the rest with [`Graph::initialize_remaining`].
    pub fn empty_state(&self) -> State {
        self.freeze();
        debug!(graph = self.uid, num_nodes = self.nodes.len(), "created empty state");
        State::new(self.uid, self.nodes.len())
    }

    /// A state with every node seeded with its default values.
    pub fn initialize_state(&self) -> State {
        let mut state = self.empty_state();
        for node in &self.nodes {
            node.initialize_state(self, &mut state);
        }
        state
    }

    /// Seed every node that has no state yet, in topological order.
    pub fn initialize_remaining(&self, state: &mut State) -> Result<()> {
        self.check_state(state)?;
        let mut seeded = 0usize;
        for node in &self.nodes {
            if !state.is_initialized(node.id()) {
                node.initialize_state(self, state);
                seeded += 1;
            }
        }
        debug!(seeded, "initialized remaining nodes");
        Ok(())
    }

    fn check_state(&self, state: &State) -> Result<()> {
        if state.graph_uid() != self.uid || state.len() != self.nodes.len() {
            return Err(GraphError::StateMismatch);
        }
        Ok(())
    }

    fn check_ready(&self, state: &State, id: NodeId) -> Result<()> {
        self.check_state(state)?;
        if id.index() >= self.nodes.len() {
            return Err(GraphError::UnknownNode { node: id });
        }
        if !state.is_initialized(id) {
            return Err(GraphError::NotInitialized { node: id });
        }
        Ok(())
    }

    /// Sort, deduplicate and validate a node set for a bulk call.
    fn prepare(&self, state: &State, ids: &[NodeId]) -> Result<Vec<NodeId>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        for &id in &ids {
            self.check_ready(state, id)?;
        }
        Ok(ids)
    }

    /// All nodes reachable from `sources` along successor edges, `sources` included, in
    /// topological order.
    ///
    /// This is the set to pass to [`Graph::propagate`], [`Graph::commit`] and
    /// [`Graph::revert`] after mutating `sources`.
    pub fn descendants(&self, state: &State, sources: &[NodeId]) -> Result<Vec<NodeId>> {
        self.check_state(state)?;
        let mut dfs = Dfs::empty(&self.dependencies);
        let mut reached = Vec::new();
        for &source in sources {
            if source.index() >= self.nodes.len() {
                return Err(GraphError::UnknownNode { node: source });
            }
            dfs.move_to(NodeIndex::new(source.index()));
            while let Some(nx) = dfs.next(&self.dependencies) {
                reached.push(self.dependencies[nx]);
            }
        }
        reached.sort_unstable();
        Ok(reached)
    }

    /// Propagate the given nodes in topological order.
    ///
    /// The set must be closed under successors of every mutated node (see
    /// [`Graph::descendants`]).
    pub fn propagate(&self, state: &mut State, ids: &[NodeId]) -> Result<()> {
        let ids = self.prepare(state, ids)?;
        for &id in &ids {
            let node = &self.nodes[id.index()];
            node.propagate(self, state);
            trace!(
                node = %id,
                kind = node.kind(),
                size_diff = node.as_array().map(|a| a.size_diff(self, state)).unwrap_or(0),
                "propagated"
            );
        }
        debug!(count = ids.len(), "propagate");
        Ok(())
    }

    pub fn commit(&self, state: &mut State, ids: &[NodeId]) -> Result<()> {
        let ids = self.prepare(state, ids)?;
        for &id in &ids {
            self.nodes[id.index()].commit(self, state);
            trace!(node = %id, "committed");
        }
        debug!(count = ids.len(), "commit");
        Ok(())
    }

    pub fn revert(&self, state: &mut State, ids: &[NodeId]) -> Result<()> {
        let ids = self.prepare(state, ids)?;
        for &id in &ids {
            self.nodes[id.index()].revert(self, state);
            trace!(node = %id, "reverted");
        }
        debug!(count = ids.len(), "revert");
        Ok(())
    }

    /// Propagate then commit the descendants of `sources`.
    pub fn propagate_and_commit(&self, state: &mut State, sources: &[NodeId]) -> Result<()> {
        let closure = self.descendants(state, sources)?;
        self.propagate(state, &closure)?;
        self.commit(state, &closure)
    }

    /// Propagate then revert the descendants of `sources`.
    pub fn propagate_and_revert(&self, state: &mut State, sources: &[NodeId]) -> Result<()> {
        let closure = self.descendants(state, sources)?;
        self.propagate(state, &closure)?;
        self.revert(state, &closure)
    }

    /// Current values of an array node.
    pub fn view<'a>(&'a self, state: &'a State, id: impl Into<NodeId>) -> Result<ArrayView<'a>> {
        let id = id.into();
        let array = self.array(id)?;
        self.check_ready(state, id)?;
        Ok(array.view(self, state))
    }

    /// Pending change records of an array node.
    pub fn diff<'a>(&'a self, state: &'a State, id: impl Into<NodeId>) -> Result<&'a [Update]> {
        let id = id.into();
        let array = self.array(id)?;
        self.check_ready(state, id)?;
        Ok(array.diff(self, state))
    }

    /// Declared shape, with a dynamic leading dimension where applicable.
    pub fn shape(&self, id: impl Into<NodeId>) -> Result<&Shape> {
        Ok(self.array(id)?.shape())
    }

    /// Static number of elements, `None` for dynamic arrays.
    pub fn size(&self, id: impl Into<NodeId>) -> Result<Option<usize>> {
        Ok(self.array(id)?.size())
    }

    /// Concrete extents in `state`.
    pub fn shape_in(&self, state: &State, id: impl Into<NodeId>) -> Result<Vec<usize>> {
        let id = id.into();
        let array = self.array(id)?;
        self.check_ready(state, id)?;
        Ok(array.state_shape(self, state))
    }

    /// Number of elements in `state`.
    pub fn size_in(&self, state: &State, id: impl Into<NodeId>) -> Result<usize> {
        let id = id.into();
        let array = self.array(id)?;
        self.check_ready(state, id)?;
        Ok(array.state_size(self, state))
    }

    /// Change in size since the last commit.
    pub fn size_diff(&self, state: &State, id: impl Into<NodeId>) -> Result<isize> {
        let id = id.into();
        let array = self.array(id)?;
        self.check_ready(state, id)?;
        Ok(array.size_diff(self, state))
    }

    pub fn min(&self, id: impl Into<NodeId>) -> Result<f64> {
        Ok(self.array(id)?.min())
    }

    pub fn max(&self, id: impl Into<NodeId>) -> Result<f64> {
        Ok(self.array(id)?.max())
    }

    pub fn integral(&self, id: impl Into<NodeId>) -> Result<bool> {
        Ok(self.array(id)?.integral())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("uid", &self.uid)
            .field("nodes", &self.nodes)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
