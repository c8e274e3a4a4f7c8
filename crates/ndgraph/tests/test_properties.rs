//! Randomized checks of incremental propagation.
//!
//! A graph mixing every node kind is driven through random mutations. After each
//! propagation every derived array must equal a from-scratch evaluation of a fresh state
//! seeded with the current decision values, and revert must restore the last committed
//! values exactly. ArrayValidationNodes check diff replay along the way.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ndgraph::nodes::{
    AdvancedIndexingNode, ArrayValidationNode, BasicIndexingNode, BasicTerm, ConstantNode,
    DynamicArrayNode, IndexTerm, IntegerNode, ListNode, Slice,
};
use ndgraph::{Graph, NodeId, NodeRef, State};

const FULL: IndexTerm = IndexTerm::Full;

struct Model {
    graph: Graph,
    table: NodeRef<IntegerNode>,
    order: NodeRef<ListNode>,
    cols: NodeRef<ListNode>,
    prefix: NodeRef<ListNode>,
    pairs: NodeRef<DynamicArrayNode>,
    weights: NodeRef<DynamicArrayNode>,
    /// 2-d index array into `table`.
    grid: NodeRef<IntegerNode>,
    /// 0-d index into `table`.
    pick: NodeRef<IntegerNode>,
    /// Derived arrays with integral values.
    derived: Vec<NodeId>,
    /// Derived arrays with continuous values.
    continuous: Vec<NodeId>,
}

fn watch(graph: &mut Graph, id: NodeId) -> NodeId {
    graph.add_node(ArrayValidationNode::new(id)).unwrap();
    id
}

fn advanced(graph: &mut Graph, source: NodeId, terms: &[IndexTerm]) -> NodeId {
    let node = AdvancedIndexingNode::new(graph, source, terms).unwrap();
    let id = graph.add_node(node).unwrap().id();
    watch(graph, id)
}

fn basic(graph: &mut Graph, source: NodeId, terms: &[BasicTerm]) -> NodeId {
    let node = BasicIndexingNode::new(graph, source, terms).unwrap();
    let id = graph.add_node(node).unwrap().id();
    watch(graph, id)
}

fn build() -> Model {
    let mut graph = Graph::new();
    let table = graph
        .add_node(IntegerNode::with_bounds(&[4, 3, 4], 0, 99).unwrap())
        .unwrap();
    let order = graph.add_node(ListNode::new(4)).unwrap();
    let cols = graph.add_node(ListNode::new(3)).unwrap();
    let prefix = graph
        .add_node(ListNode::with_size_bounds(3, 0, 3).unwrap())
        .unwrap();
    let pairs = graph
        .add_node(
            DynamicArrayNode::new(&[2], 0.0, 2.0, true)
                .unwrap()
                .with_row_bounds(0, Some(5))
                .unwrap(),
        )
        .unwrap();
    let weights = graph
        .add_node(
            DynamicArrayNode::new(&[2], -1.0, 1.0, false)
                .unwrap()
                .with_row_bounds(3, Some(6))
                .unwrap(),
        )
        .unwrap();

    let grid = graph
        .add_node(IntegerNode::with_bounds(&[2, 2], 0, 3).unwrap())
        .unwrap();
    let pick = graph
        .add_node(IntegerNode::with_bounds(&[], 0, 2).unwrap())
        .unwrap();

    let t = table.id();
    let column = |k| [Slice::full().into(), BasicTerm::Index(k)];
    let first = basic(&mut graph, pairs.id(), &column(0));
    let second = basic(&mut graph, pairs.id(), &column(1));

    let mut derived = vec![first, second];
    // Permuted rows, then a strided slice of them.
    let permuted = advanced(&mut graph, t, &[order.into(), FULL, FULL]);
    derived.push(permuted);
    derived.push(basic(
        &mut graph,
        permuted,
        &[Slice::new(None, None, -2).into(), BasicTerm::Index(2)],
    ));
    // Dynamic prefix of rows.
    let rows = advanced(&mut graph, t, &[prefix.into(), FULL, FULL]);
    derived.push(rows);
    derived.push(basic(&mut graph, rows, &[Slice::full().into(), BasicTerm::Index(1)]));
    // Index arrays in place after a slice, and separated.
    derived.push(advanced(&mut graph, t, &[FULL, cols.into(), cols.into()]));
    derived.push(advanced(&mut graph, t, &[first.into(), FULL, second.into()]));
    derived.push(advanced(&mut graph, t, &[first.into(), second.into(), FULL]));
    // Fixed index array into a dynamic source.
    let swap = graph
        .add_node(ConstantNode::from_slice(&[1.0, 0.0]))
        .unwrap()
        .id();
    derived.push(advanced(&mut graph, pairs.id(), &[FULL, swap.into()]));
    // 2-d and 0-d index arrays, fixed and dynamic.
    derived.push(advanced(&mut graph, t, &[grid.into(), FULL, FULL]));
    derived.push(advanced(&mut graph, t, &[grid.into(), pick.into(), FULL]));
    derived.push(advanced(&mut graph, t, &[pick.into(), cols.into(), FULL]));
    derived.push(advanced(&mut graph, t, &[pick.into(), FULL, pick.into()]));
    derived.push(advanced(&mut graph, t, &[pairs.into(), FULL, FULL]));
    derived.push(advanced(&mut graph, t, &[pairs.into(), pick.into(), FULL]));

    let continuous = vec![
        advanced(&mut graph, weights.id(), &[prefix.into(), FULL]),
        basic(
            &mut graph,
            weights.id(),
            &[Slice::full().into(), Slice::new(None, None, -1).into()],
        ),
    ];

    Model {
        graph,
        table,
        order,
        cols,
        prefix,
        pairs,
        weights,
        grid,
        pick,
        derived,
        continuous,
    }
}

fn values(graph: &Graph, state: &State, id: NodeId) -> Vec<f64> {
    graph.view(state, id).unwrap().to_vec()
}

/// A fresh state seeded with the decision values of `state`.
fn reseed(m: &Model, state: &State) -> State {
    let g = &m.graph;
    let mut fresh = g.empty_state();
    for int in [m.table, m.grid, m.pick] {
        g.node(int)
            .initialize_state_with(&mut fresh, values(g, state, int.id()))
            .unwrap();
    }
    for list in [m.order, m.cols, m.prefix] {
        g.node(list)
            .initialize_state_with(&mut fresh, values(g, state, list.id()))
            .unwrap();
    }
    for arr in [m.pairs, m.weights] {
        g.node(arr)
            .initialize_state_with(&mut fresh, values(g, state, arr.id()))
            .unwrap();
    }
    g.initialize_remaining(&mut fresh).unwrap();
    fresh
}

fn snapshot(m: &Model, state: &State) -> Vec<Vec<f64>> {
    m.derived
        .iter()
        .chain(&m.continuous)
        .map(|&id| values(&m.graph, state, id))
        .collect()
}

fn assert_matches_fresh(m: &Model, state: &State) {
    let fresh = reseed(m, state);
    for &id in &m.derived {
        assert_eq!(
            m.graph.shape_in(state, id).unwrap(),
            m.graph.shape_in(&fresh, id).unwrap(),
            "shape of {id}"
        );
        assert_eq!(
            values(&m.graph, state, id),
            values(&m.graph, &fresh, id),
            "values of {id}"
        );
    }
    for &id in &m.continuous {
        let got = values(&m.graph, state, id);
        let want = values(&m.graph, &fresh, id);
        assert_eq!(got.len(), want.len(), "size of {id}");
        for (g, w) in got.iter().zip(&want) {
            assert_relative_eq!(*g, *w, epsilon = 1e-12);
        }
    }
}

/// Apply one random mutation. Moves rejected by bounds leave the state unchanged.
fn mutate(m: &Model, state: &mut State, rng: &mut StdRng) {
    let g = &m.graph;
    match rng.random_range(0..12) {
        0 => {
            let index = rng.random_range(0..48);
            let value = rng.random_range(0..100) as f64;
            g.node(m.table).set_value(state, index, value).unwrap();
        }
        1 => {
            let (i, j) = (rng.random_range(0..48), rng.random_range(0..48));
            g.node(m.table).exchange(state, i, j).unwrap();
        }
        2 => {
            let (i, j) = (rng.random_range(0..4), rng.random_range(0..4));
            g.node(m.order).exchange(state, i, j).unwrap();
        }
        3 => {
            let (i, j) = (rng.random_range(0..3), rng.random_range(0..3));
            g.node(m.cols).exchange(state, i, j).unwrap();
        }
        4 => {
            let list = g.node(m.prefix);
            let _ = if rng.random_bool(0.5) {
                list.grow(state)
            } else {
                list.shrink(state)
            };
        }
        5 => {
            let row = [rng.random_range(0..3) as f64, rng.random_range(0..3) as f64];
            let _ = g.node(m.pairs).grow(state, &row);
        }
        6 => {
            let _ = g.node(m.pairs).shrink(state);
            let size = g.size_in(state, m.pairs).unwrap();
            if size > 0 {
                let index = rng.random_range(0..size);
                let value = rng.random_range(0..3) as f64;
                g.node(m.pairs).set(state, index, value).unwrap();
            }
        }
        7 => {
            let row = [rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0)];
            let _ = g.node(m.weights).grow(state, &row);
        }
        9 => {
            let index = rng.random_range(0..4);
            let value = rng.random_range(0..4) as f64;
            g.node(m.grid).set_value(state, index, value).unwrap();
        }
        10 => {
            let (i, j) = (rng.random_range(0..4), rng.random_range(0..4));
            g.node(m.grid).exchange(state, i, j).unwrap();
        }
        11 => {
            let value = rng.random_range(0..3) as f64;
            g.node(m.pick).set_value(state, 0, value).unwrap();
        }
        _ => {
            let _ = g.node(m.weights).shrink(state);
            let size = g.size_in(state, m.weights).unwrap();
            let index = rng.random_range(0..size);
            g.node(m.weights)
                .set(state, index, rng.random_range(-1.0..=1.0))
                .unwrap();
        }
    }
}

fn sources(m: &Model) -> Vec<NodeId> {
    vec![
        m.table.id(),
        m.order.id(),
        m.cols.id(),
        m.prefix.id(),
        m.pairs.id(),
        m.weights.id(),
        m.grid.id(),
        m.pick.id(),
    ]
}

/// Test incremental values against from-scratch evaluation over random moves.
#[test]
fn test_random_moves_match_fresh_state() {
    let m = build();
    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = m.graph.initialize_state();
        let changed = m.graph.descendants(&state, &sources(&m)).unwrap();
        let mut committed = snapshot(&m, &state);

        for _ in 0..60 {
            for _ in 0..rng.random_range(1..4) {
                mutate(&m, &mut state, &mut rng);
            }
            m.graph.propagate(&mut state, &changed).unwrap();
            assert_matches_fresh(&m, &state);

            if rng.random_bool(0.5) {
                m.graph.commit(&mut state, &changed).unwrap();
                committed = snapshot(&m, &state);
            } else {
                m.graph.revert(&mut state, &changed).unwrap();
                assert_eq!(snapshot(&m, &state), committed);
            }
        }
    }
}

/// Test that several propagations before one commit accumulate correctly.
#[test]
fn test_repeated_propagation_before_commit() {
    let m = build();
    let mut rng = StdRng::seed_from_u64(17);
    let mut state = m.graph.initialize_state();
    let changed = m.graph.descendants(&state, &sources(&m)).unwrap();

    for round in 0..20 {
        for _ in 0..5 {
            mutate(&m, &mut state, &mut rng);
            m.graph.propagate(&mut state, &changed).unwrap();
        }
        // Propagating again with no new mutations is a no-op.
        let before: Vec<usize> = m
            .derived
            .iter()
            .map(|&id| m.graph.diff(&state, id).unwrap().len())
            .collect();
        m.graph.propagate(&mut state, &changed).unwrap();
        let after: Vec<usize> = m
            .derived
            .iter()
            .map(|&id| m.graph.diff(&state, id).unwrap().len())
            .collect();
        assert_eq!(before, after, "round {round}");
        assert_matches_fresh(&m, &state);

        if round % 3 == 0 {
            m.graph.revert(&mut state, &changed).unwrap();
        } else {
            m.graph.commit(&mut state, &changed).unwrap();
        }
        assert_matches_fresh(&m, &state);
    }
}
