mod common;

use common::*;
use loomwork::canvas::layout::{H_SPACING, LayoutError, LayoutRequest, LayoutScope, auto_layout};
use loomwork::canvas::{Edge, Node, Position};

fn positions(nodes: &[Node]) -> Vec<(String, Position)> {
    nodes.iter().map(|n| (n.id.clone(), n.position)).collect()
}

fn find(nodes: &[Node], id: &str) -> Position {
    nodes.iter().find(|n| n.id == id).unwrap().position
}

#[test]
fn test_horizontal_chain_lays_out_left_to_right() {
    let mut nodes = vec![
        noop_node("n1").at(900, 40),
        noop_node("n2").at(-50, 800),
        noop_node("n3").at(10, 10),
    ];
    let edges = vec![Edge::new("n1", "n2"), Edge::new("n2", "n3")];

    auto_layout(&mut nodes, &edges, &LayoutRequest::default()).unwrap();

    let p1 = find(&nodes, "n1");
    let p2 = find(&nodes, "n2");
    let p3 = find(&nodes, "n3");
    assert!(p1.x < p2.x && p2.x < p3.x, "{:?}", positions(&nodes));
    assert_eq!(p1.y, p2.y);
    assert_eq!(p2.y, p3.y);
    assert_eq!(p2.x - p1.x, H_SPACING);
    assert_eq!(p3.x - p2.x, H_SPACING);
}

#[test]
fn test_connected_component_scope_leaves_others_untouched() {
    let mut nodes = vec![
        noop_node("a").at(300, 300),
        noop_node("b").at(100, 100),
        noop_node("island").at(77, 88),
    ];
    let edges = vec![Edge::new("a", "b")];

    let request = LayoutRequest {
        scope: LayoutScope::ConnectedComponent,
        node_ids: vec!["a".into()],
        ..Default::default()
    };
    auto_layout(&mut nodes, &edges, &request).unwrap();

    assert_eq!(find(&nodes, "island"), Position::new(77, 88));
    assert!(find(&nodes, "a").x < find(&nodes, "b").x);
}

#[test]
fn test_anchor_preserves_bounding_top_left() {
    let mut nodes = vec![noop_node("a").at(1000, 500), noop_node("b").at(1200, 700)];
    let edges = vec![Edge::new("a", "b")];

    auto_layout(&mut nodes, &edges, &LayoutRequest::default()).unwrap();

    let min_x = nodes.iter().map(|n| n.position.x).min().unwrap();
    let min_y = nodes.iter().map(|n| n.position.y).min().unwrap();
    assert_eq!((min_x, min_y), (1000, 500));
}

#[test]
fn test_unknown_seed_is_invalid_argument() {
    let mut nodes = vec![noop_node("a")];
    let request = LayoutRequest {
        scope: LayoutScope::ConnectedComponent,
        node_ids: vec!["ghost".into()],
        ..Default::default()
    };
    let err = auto_layout(&mut nodes, &[], &request).unwrap_err();
    assert!(matches!(err, LayoutError::UnknownNode { .. }));
}

#[test]
fn test_exact_set_requires_node_ids() {
    let mut nodes = vec![noop_node("a")];
    let request = LayoutRequest {
        scope: LayoutScope::ExactSet,
        ..Default::default()
    };
    let err = auto_layout(&mut nodes, &[], &request).unwrap_err();
    assert!(matches!(err, LayoutError::EmptySet));
}

#[test]
fn test_widgets_are_never_moved() {
    let mut nodes = vec![noop_node("a").at(5, 5), widget_node("w").at(9, 9)];
    auto_layout(&mut nodes, &[], &LayoutRequest::default()).unwrap();
    assert_eq!(find(&nodes, "w"), Position::new(9, 9));
}

#[test]
fn test_deterministic_tie_break_within_a_layer() {
    // Two roots in one layer: rows follow current (y, x, id).
    let mut nodes = vec![
        noop_node("top").at(0, 10),
        noop_node("bottom").at(0, 500),
    ];
    auto_layout(&mut nodes, &[], &LayoutRequest::default()).unwrap();
    assert!(find(&nodes, "top").y < find(&nodes, "bottom").y);
}
