//! ndgraph - incremental array-valued computation graphs
//!
//! A [`Graph`] is a DAG of array-valued nodes. Decision nodes are mutated through their own
//! API, then the change is propagated to their descendants, which update only the elements
//! that depend on what changed. Every array records its changes since the last commit as a
//! list of [`Update`]s, so a candidate change can be inspected and then either committed or
//! reverted exactly.
//!
//! # Architecture
//!
//! ```text
//! Graph (immutable after the first state)
//!     → nodes: Box<dyn Node> in topological order
//!     → dependency edges (petgraph)
//!
//! State (one per evaluation context)
//!     → one type-erased slot per node
//!     → ArrayBuffer: values + diff journal
//!
//! Cycle: mutate → propagate → (inspect views/diffs) → commit | revert
//! ```
//!
//! # Example
//!
//! ```
//! use ndgraph::Graph;
//! use ndgraph::nodes::{BasicIndexingNode, IntegerNode, Slice};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_node(IntegerNode::new(&[3, 4]).unwrap()).unwrap();
//! // x[1:, ::-2]
//! let y = graph
//!     .add_node(
//!         BasicIndexingNode::new(
//!             &graph,
//!             x.id(),
//!             &[Slice::new(Some(1), None, 1).into(), Slice::new(None, None, -2).into()],
//!         )
//!         .unwrap(),
//!     )
//!     .unwrap();
//!
//! let mut state = graph.empty_state();
//! let values: Vec<f64> = (0..12).map(|v| v as f64).collect();
//! graph.node(x).initialize_state_with(&mut state, values).unwrap();
//! graph.initialize_remaining(&mut state).unwrap();
//! assert_eq!(graph.view(&state, y).unwrap().to_vec(), vec![7.0, 5.0, 11.0, 9.0]);
//!
//! graph.node(x).set_value(&mut state, 5, 50.0).unwrap();
//! graph.node(x).set_value(&mut state, 6, 60.0).unwrap();
//! let changed = graph.descendants(&state, &[x.id()]).unwrap();
//! graph.propagate(&mut state, &changed).unwrap();
//! assert_eq!(graph.diff(&state, y).unwrap().len(), 1);
//!
//! graph.revert(&mut state, &changed).unwrap();
//! assert_eq!(graph.view(&state, y).unwrap().to_vec(), vec![7.0, 5.0, 11.0, 9.0]);
//! ```

pub mod array;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod shape;
pub mod state;
pub mod strides;

pub use array::{Array, ArrayView, SizeInfo};
pub use error::{GraphError, Result};
pub use graph::{Graph, Node, NodeId, NodeInfo, NodeRef};
pub use shape::{Dim, Shape, broadcast_shapes};
pub use state::{ArrayBuffer, State, Update, apply_updates};
