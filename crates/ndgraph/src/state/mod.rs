//! Runtime state of a graph.
//!
//! A [`State`] holds one slot per node. Nodes describe how to interpret and update
//! their slot but never hold state-specific data themselves, so any number of states
//! can be evaluated against one graph (e.g. one per thread).
//!
//! ```text
//! Graph (immutable topology)
//!  ├── State A:  [slot 0] [slot 1] ... [slot n-1]
//!  └── State B:  [slot 0] [slot 1] ... [slot n-1]
//! ```
//!
//! Slots are type-erased (`Box<dyn Any + Send>`); each node kind downcasts to its own
//! concrete state type.

mod buffer;

use std::any::{Any, type_name};
use std::fmt;

use crate::graph::NodeId;

pub use buffer::{ArrayBuffer, Update, apply_updates};

type Slot = Option<Box<dyn Any + Send>>;

/// One independent set of runtime buffers and diffs for a [`Graph`](crate::Graph).
pub struct State {
    graph_uid: u64,
    slots: Vec<Slot>,
}

impl State {
    pub(crate) fn new(graph_uid: u64, num_nodes: usize) -> Self {
        Self {
            graph_uid,
            slots: std::iter::repeat_with(|| None).take(num_nodes).collect(),
        }
    }

    #[inline]
    pub(crate) fn graph_uid(&self) -> u64 {
        self.graph_uid
    }

    /// Number of node slots (equal to the number of nodes of the owning graph).
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the node has been seeded in this state.
    pub fn is_initialized(&self, id: NodeId) -> bool {
        self.slots.get(id.index()).is_some_and(Option::is_some)
    }

    /// Number of nodes that have a state.
    pub fn num_initialized(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub(crate) fn insert<T: Any + Send>(&mut self, id: NodeId, data: T) {
        self.slots[id.index()] = Some(Box::new(data));
    }

    pub(crate) fn try_get<T: Any>(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id.index())?.as_ref()?.downcast_ref::<T>()
    }

    /// Typed access to a node's slot.
    ///
    /// # Panics
    ///
    /// Panics if the node is not initialized or its slot has another type. Either means
    /// the state is corrupted or was used out of protocol.
    pub(crate) fn get<T: Any>(&self, id: NodeId) -> &T {
        match self.try_get::<T>(id) {
            Some(data) => data,
            None => missing_slot::<T>(id),
        }
    }

    /// Mutable typed access to a node's slot.
    ///
    /// # Panics
    ///
    /// Same conditions as [`State::get`].
    pub(crate) fn get_mut<T: Any>(&mut self, id: NodeId) -> &mut T {
        match self
            .slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .and_then(|s| s.downcast_mut::<T>())
        {
            Some(data) => data,
            None => missing_slot::<T>(id),
        }
    }

    /// Move a node's slot out so it can be updated while predecessors are read.
    ///
    /// Must be paired with [`State::restore`].
    pub(crate) fn take<T: Any>(&mut self, id: NodeId) -> Box<T> {
        match self.slots[id.index()].take().map(|s| s.downcast::<T>()) {
            Some(Ok(data)) => data,
            Some(Err(other)) => {
                self.slots[id.index()] = Some(other);
                missing_slot::<T>(id)
            }
            None => missing_slot::<T>(id),
        }
    }

    pub(crate) fn restore<T: Any + Send>(&mut self, id: NodeId, data: Box<T>) {
        self.slots[id.index()] = Some(data);
    }
}

#[cold]
fn missing_slot<T>(id: NodeId) -> ! {
    panic!(
        "node {id} has no state of type {} (not initialized, or state/graph mismatch)",
        type_name::<T>()
    )
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("graph_uid", &self.graph_uid)
            .field("num_nodes", &self.slots.len())
            .field("num_initialized", &self.num_initialized())
            .finish()
    }
}
