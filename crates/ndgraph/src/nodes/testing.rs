use std::any::Any;

use crate::array::Array;
use crate::graph::{Graph, Node, NodeId, NodeInfo};
use crate::state::{State, apply_updates};

/// Checks that an array's diff, size and view stay consistent with each other.
///
/// The node keeps a copy of its predecessor's committed values. On every propagation it
/// replays the predecessor's diff onto that copy and asserts the result equals the current
/// view; on revert it asserts the predecessor is back to the copy. Violations panic.
#[derive(Debug, Clone)]
pub struct ArrayValidationNode {
    info: NodeInfo,
}

#[derive(Debug)]
struct ValidationState {
    committed: Vec<f64>,
}

impl ArrayValidationNode {
    pub fn new(array: NodeId) -> Self {
        Self {
            info: NodeInfo::new(vec![array]),
        }
    }

    fn array<'a>(&self, graph: &'a Graph) -> &'a dyn Array {
        graph.array_unchecked(self.info.predecessors()[0])
    }
}

impl Node for ArrayValidationNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut NodeInfo {
        &mut self.info
    }

    fn kind(&self) -> &'static str {
        "ArrayValidation"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn initialize_state(&self, graph: &Graph, state: &mut State) {
        let array = self.array(graph);
        let committed = array.view(graph, state).to_vec();
        assert_eq!(
            array.size_diff(graph, state),
            0,
            "{} starts with a size change",
            array.id()
        );
        state.insert(self.id(), ValidationState { committed });
    }

    fn propagate(&self, graph: &Graph, state: &mut State) {
        let array = self.array(graph);
        let data = state.get::<ValidationState>(self.id());
        let view = array.view(graph, state);
        let size = array.state_size(graph, state);
        let id = array.id();

        assert_eq!(view.len(), size, "{id}: view length differs from state size");
        let shape = array.state_shape(graph, state);
        assert_eq!(
            shape.iter().product::<usize>(),
            size,
            "{id}: shape {shape:?} does not match size {size}"
        );
        assert_eq!(
            size as isize - data.committed.len() as isize,
            array.size_diff(graph, state),
            "{id}: size_diff disagrees with the committed size"
        );

        let mut replay = data.committed.clone();
        apply_updates(&mut replay, array.diff(graph, state), size);
        assert_eq!(replay, view.to_vec(), "{id}: diff does not reproduce the view");
        for v in view.iter() {
            assert!(
                v >= array.min() && v <= array.max(),
                "{id}: value {v} outside [{}, {}]",
                array.min(),
                array.max()
            );
        }
    }

    fn commit(&self, graph: &Graph, state: &mut State) {
        let committed = self.array(graph).view(graph, state).to_vec();
        state.get_mut::<ValidationState>(self.id()).committed = committed;
    }

    fn revert(&self, graph: &Graph, state: &mut State) {
        let array = self.array(graph);
        let data = state.get::<ValidationState>(self.id());
        assert_eq!(
            array.view(graph, state).to_vec(),
            data.committed,
            "{}: revert did not restore the committed values",
            array.id()
        );
        assert!(array.diff(graph, state).is_empty());
    }
}
