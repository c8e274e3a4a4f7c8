//! Error types for ndgraph.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors that can occur while building a graph or mutating a state.
///
/// Construction-time errors are returned before a node is inserted, so a failed
/// [`Graph::add_node`](crate::Graph::add_node) leaves the graph untouched.
/// Mutation errors are returned before the state is modified.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Shape mismatch between data length and expected size.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Shape is malformed (e.g. a dynamic dimension that is not leading).
    #[error("invalid shape: {message}")]
    InvalidShape { message: String },

    /// Wrong number of index terms provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// Index out of bounds.
    #[error("index out of bounds: index {index} is out of range for dimension {dim_size}")]
    IndexOutOfBounds { index: isize, dim_size: usize },

    /// Slice parameters are invalid for the axis they apply to.
    #[error("invalid slice on axis {axis}: {message}")]
    SliceOutOfBounds { axis: usize, message: String },

    /// An index array can take non-integer values.
    #[error("indexer {node} for axis {axis} is not integral")]
    NonIntegralIndexer { node: NodeId, axis: usize },

    /// An index array's declared range does not fit the axis it indexes.
    #[error("indexer {node} for axis {axis} has range [{min}, {max}], axis admits [0, {extent})")]
    IndexerOutOfRange {
        node: NodeId,
        axis: usize,
        min: f64,
        max: f64,
        extent: usize,
    },

    /// Index arrays cannot be broadcast to a common shape.
    #[error("index arrays cannot be broadcast together: {lhs} vs {rhs}")]
    BroadcastMismatch { lhs: String, rhs: String },

    /// More than one index array has two or more dimensions.
    #[error("at most one multi-dimensional index array is supported, got {count}")]
    MultipleMultiDimIndexers { count: usize },

    /// Combination of slices and index arrays that the engine does not support.
    #[error("unsupported indexing: {message}")]
    UnsupportedIndexing { message: String },

    /// A dynamically sized array was given where it is not allowed.
    #[error("dynamic array not allowed: {message}")]
    DynamicNotAllowed { message: String },

    /// Node id does not belong to the graph.
    #[error("unknown node {node}")]
    UnknownNode { node: NodeId },

    /// A node was validated against a different graph than the one it is added to.
    #[error("{kind} node was validated against another graph")]
    ForeignNode { kind: &'static str },

    /// The graph already has states and can no longer change its topology.
    #[error("graph is frozen: nodes cannot be added once a state exists")]
    GraphFrozen,

    /// The state was created by a different graph.
    #[error("state does not belong to this graph")]
    StateMismatch,

    /// Node has no state yet.
    #[error("node {node} is not initialized in this state")]
    NotInitialized { node: NodeId },

    /// Node state was already seeded.
    #[error("node {node} is already initialized in this state")]
    AlreadyInitialized { node: NodeId },

    /// A value violates a node's declared bounds or domain.
    #[error("value {value} out of bounds [{min}, {max}]")]
    ValueOutOfBounds { value: f64, min: f64, max: f64 },

    /// A grow/shrink would violate a node's declared size limits.
    #[error("size {size} out of bounds [{min}, {max}]")]
    SizeOutOfBounds { size: usize, min: usize, max: usize },

    /// Generic invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
