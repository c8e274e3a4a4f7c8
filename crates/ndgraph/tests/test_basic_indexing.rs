//! Tests for BasicIndexingNode in larger graphs.
//!
//! # Coverage
//!
//! - Integer and slice terms over decision variables
//! - Chains of indexing nodes, including basic over advanced indexing
//! - Dynamic sources
//! - Term validation

use ndgraph::nodes::{
    AdvancedIndexingNode, ArrayValidationNode, BasicIndexingNode, BasicTerm, ConstantNode,
    DynamicArrayNode, IndexTerm, IntegerNode, ListNode, Slice,
};
use ndgraph::{Graph, GraphError, NodeId, Shape, State};

fn iota(n: usize) -> Vec<f64> {
    (0..n).map(|v| v as f64).collect()
}

fn values(graph: &Graph, state: &State, id: impl Into<NodeId>) -> Vec<f64> {
    graph.view(state, id).unwrap().to_vec()
}

/// Add a basic indexing node plus a validation node watching it.
fn add_basic(graph: &mut Graph, source: NodeId, terms: &[BasicTerm]) -> NodeId {
    let node = BasicIndexingNode::new(graph, source, terms).unwrap();
    let out = graph.add_node(node).unwrap().id();
    graph.add_node(ArrayValidationNode::new(out)).unwrap();
    out
}

// ============================================================================
// Decision variables
// ============================================================================

/// Test a row of an integer matrix following element exchanges.
#[test]
fn test_row_of_integer_matrix() {
    let mut graph = Graph::new();
    let x = graph
        .add_node(IntegerNode::with_bounds(&[3, 4], 0, 100).unwrap())
        .unwrap();
    let row = add_basic(&mut graph, x.id(), &[BasicTerm::Index(1)]);
    assert_eq!(graph.shape(row).unwrap(), &Shape::fixed(&[4]));

    let mut state = graph.empty_state();
    graph
        .node(x)
        .initialize_state_with(&mut state, iota(12))
        .unwrap();
    graph.initialize_remaining(&mut state).unwrap();
    assert_eq!(values(&graph, &state, row), vec![4.0, 5.0, 6.0, 7.0]);

    graph.node(x).exchange(&mut state, 4, 7).unwrap();
    graph.node(x).exchange(&mut state, 0, 5).unwrap();
    graph.node(x).exchange(&mut state, 8, 11).unwrap();
    let changed = graph.descendants(&state, &[x.id()]).unwrap();
    graph.propagate(&mut state, &changed).unwrap();
    assert_eq!(values(&graph, &state, row), vec![7.0, 0.0, 6.0, 4.0]);
    assert_eq!(graph.diff(&state, row).unwrap().len(), 3);

    graph.commit(&mut state, &changed).unwrap();
    assert!(graph.diff(&state, row).unwrap().is_empty());
    assert_eq!(values(&graph, &state, row), vec![7.0, 0.0, 6.0, 4.0]);
}

/// Test that missing trailing terms select whole axes.
#[test]
fn test_trailing_terms_default_to_full() {
    let mut graph = Graph::new();
    let x = graph
        .add_node(ConstantNode::new(iota(24), &[2, 3, 4]).unwrap())
        .unwrap();
    let plane = add_basic(&mut graph, x.id(), &[BasicTerm::Index(-1)]);
    let column = add_basic(
        &mut graph,
        x.id(),
        &[Slice::full().into(), Slice::full().into(), BasicTerm::Index(2)],
    );

    let state = graph.initialize_state();
    assert_eq!(graph.shape_in(&state, plane).unwrap(), vec![3, 4]);
    assert_eq!(values(&graph, &state, plane), iota(24)[12..].to_vec());
    assert_eq!(graph.shape_in(&state, column).unwrap(), vec![2, 3]);
    assert_eq!(
        values(&graph, &state, column),
        vec![2.0, 6.0, 10.0, 14.0, 18.0, 22.0]
    );
}

/// Test that more terms than axes are rejected.
#[test]
fn test_too_many_terms() {
    let mut graph = Graph::new();
    let x = graph.add_node(ConstantNode::from_slice(&iota(3))).unwrap();
    assert!(matches!(
        BasicIndexingNode::new(
            &graph,
            x.id(),
            &[BasicTerm::Index(0), BasicTerm::Index(0)]
        ),
        Err(GraphError::WrongNumberOfIndices {
            expected: 1,
            actual: 2
        })
    ));
}

// ============================================================================
// Chains
// ============================================================================

/// Test basic indexing of an advanced indexing result.
#[test]
fn test_basic_over_advanced() {
    let mut graph = Graph::new();
    let arr = graph
        .add_node(ConstantNode::new(iota(12), &[4, 3]).unwrap())
        .unwrap();
    let order = graph.add_node(ListNode::new(4)).unwrap();
    let rows = AdvancedIndexingNode::new(&graph, arr.id(), &[order.into(), IndexTerm::Full])
        .unwrap();
    let rows = graph.add_node(rows).unwrap();
    let last = add_basic(&mut graph, rows.id(), &[BasicTerm::Index(-1)]);

    let mut state = graph.initialize_state();
    assert_eq!(values(&graph, &state, last), vec![9.0, 10.0, 11.0]);

    graph.node(order).exchange(&mut state, 0, 3).unwrap();
    graph.propagate_and_commit(&mut state, &[order.id()]).unwrap();
    assert_eq!(values(&graph, &state, last), vec![0.0, 1.0, 2.0]);

    graph.node(order).exchange(&mut state, 1, 2).unwrap();
    let changed = graph.descendants(&state, &[order.id()]).unwrap();
    graph.propagate(&mut state, &changed).unwrap();
    assert!(graph.diff(&state, last).unwrap().is_empty());
    graph.revert(&mut state, &changed).unwrap();
}

/// Test a slice of a slice with negative steps.
#[test]
fn test_slice_of_slice() {
    let mut graph = Graph::new();
    let x = graph
        .add_node(IntegerNode::with_bounds(&[10], 0, 100).unwrap())
        .unwrap();
    // x[::-1][1::3] == x[8], x[5], x[2]
    let reversed = add_basic(&mut graph, x.id(), &[Slice::new(None, None, -1).into()]);
    let picked = add_basic(
        &mut graph,
        reversed,
        &[Slice::new(Some(1), None, 3).into()],
    );

    let mut state = graph.empty_state();
    graph
        .node(x)
        .initialize_state_with(&mut state, iota(10))
        .unwrap();
    graph.initialize_remaining(&mut state).unwrap();
    assert_eq!(values(&graph, &state, picked), vec![8.0, 5.0, 2.0]);

    graph.node(x).set_value(&mut state, 5, 50.0).unwrap();
    graph.node(x).set_value(&mut state, 6, 60.0).unwrap();
    let changed = graph.descendants(&state, &[x.id()]).unwrap();
    graph.propagate(&mut state, &changed).unwrap();
    assert_eq!(values(&graph, &state, picked), vec![8.0, 50.0, 2.0]);
    let diff = graph.diff(&state, picked).unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].index, 1);

    graph.revert(&mut state, &changed).unwrap();
    assert_eq!(values(&graph, &state, picked), vec![8.0, 5.0, 2.0]);
}

// ============================================================================
// Dynamic sources
// ============================================================================

/// Test trailing slices of a dynamic array as rows come and go.
#[test]
fn test_dynamic_rows_sliced() {
    let mut graph = Graph::new();
    let x = graph
        .add_node(DynamicArrayNode::new(&[3], -10.0, 10.0, true).unwrap())
        .unwrap();
    let head = add_basic(
        &mut graph,
        x.id(),
        &[Slice::full().into(), Slice::range(0, 2).into()],
    );
    assert_eq!(graph.shape(head).unwrap(), &Shape::dynamic(&[2]));
    assert_eq!(graph.array(head).unwrap().size_info().origin, x.id());

    let mut state = graph.initialize_state();
    graph
        .node(x)
        .grow(&mut state, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .unwrap();
    graph.propagate_and_commit(&mut state, &[x.id()]).unwrap();
    assert_eq!(values(&graph, &state, head), vec![1.0, 2.0, 4.0, 5.0]);

    graph.node(x).shrink(&mut state).unwrap();
    graph.node(x).grow(&mut state, &[-1.0, -2.0, -3.0]).unwrap();
    graph.node(x).set(&mut state, 2, 9.0).unwrap();
    let changed = graph.descendants(&state, &[x.id()]).unwrap();
    graph.propagate(&mut state, &changed).unwrap();
    assert_eq!(values(&graph, &state, head), vec![1.0, 2.0, -1.0, -2.0]);
    assert_eq!(graph.size_diff(&state, head).unwrap(), 0);

    graph.revert(&mut state, &changed).unwrap();
    assert_eq!(values(&graph, &state, head), vec![1.0, 2.0, 4.0, 5.0]);
}

/// Test that a dynamic axis only accepts a full slice.
#[test]
fn test_dynamic_axis_terms() {
    let mut graph = Graph::new();
    let x = graph
        .add_node(DynamicArrayNode::new(&[3], 0.0, 1.0, false).unwrap())
        .unwrap();
    assert!(matches!(
        BasicIndexingNode::new(&graph, x.id(), &[BasicTerm::Index(0)]),
        Err(GraphError::DynamicNotAllowed { .. })
    ));
    assert!(matches!(
        BasicIndexingNode::new(&graph, x.id(), &[Slice::range(0, 1).into()]),
        Err(GraphError::DynamicNotAllowed { .. })
    ));
    assert!(BasicIndexingNode::new(&graph, x.id(), &[Slice::full().into()]).is_ok());
}
