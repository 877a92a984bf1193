//! Tests for the subclone tree, event model and fraction analysis.

use std::sync::Arc;

use rstest::{fixture, rstest};

use clonetree::application::{fraction_string, fraction_violations, subtree_fractions, to_dot};
use clonetree::domain::{
    DomainError, EventCluster, EventKind, Extent, NodeId, SomaticEvent, SubcloneTree,
};
use clonetree::util::testing;

fn snv(chrom: &str, pos: u64) -> SomaticEvent {
    SomaticEvent::new(EventKind::Snv, Extent::point(chrom, pos).unwrap())
}

fn cnv(chrom: &str, start: u64, end: u64) -> SomaticEvent {
    SomaticEvent::new(EventKind::Cnv, Extent::new(chrom, start, end).unwrap())
}

fn named(name: &str) -> Option<Arc<EventCluster>> {
    Some(Arc::new(EventCluster::new(name, vec![snv("1", 1)])))
}

//   n0 (1.0)
//   ├── n1 A (0.5)
//   │   ├── n2 B (0.2)
//   │   └── n3 C (0.1)
//   └── n4 D (0.4)
#[fixture]
fn tree() -> SubcloneTree {
    testing::init_test_setup();
    let mut tree = SubcloneTree::new();
    let root = tree.add_root(None, 1.0).unwrap();
    let a = tree.add_subclone(root, named("A"), 0.5).unwrap();
    tree.add_subclone(a, named("B"), 0.2).unwrap();
    tree.add_subclone(a, named("C"), 0.1).unwrap();
    tree.add_subclone(root, named("D"), 0.4).unwrap();
    tree
}

// ============================================================
// Events and clusters
// ============================================================

#[rstest]
fn given_duplicate_events_when_building_cluster_then_first_occurrence_kept() {
    let cluster = EventCluster::new("A", vec![snv("1", 5), snv("2", 9), snv("1", 5)]);
    assert_eq!(cluster.len(), 2);
    assert_eq!(cluster.events()[0], snv("1", 5));
}

#[rstest]
#[case(cnv("1", 100, 500), cnv("1", 150, 450), 100, true)]
#[case(cnv("1", 100, 500), cnv("1", 200, 500), 100, false)]
#[case(cnv("1", 100, 500), cnv("2", 100, 500), 1_000, false)]
#[case(cnv("1", 100, 500), cnv("1", 100, 500), 0, true)]
fn given_events_when_comparing_with_resolution_then_boundaries_decide(
    #[case] a: SomaticEvent,
    #[case] b: SomaticEvent,
    #[case] resolution: u64,
    #[case] expected: bool,
) {
    assert_eq!(a.is_equivalent(&b, resolution), expected);
}

#[rstest]
fn given_extents_when_querying_containment_then_chromosome_and_bounds_matter() {
    let segment = Extent::new("3", 100, 200).unwrap();
    assert!(segment.contains(&Extent::point("3", 150).unwrap()));
    assert!(!segment.contains(&Extent::new("3", 150, 250).unwrap()));
    assert!(segment.overlaps(&Extent::new("3", 150, 250).unwrap()));
    assert!(!segment.overlaps(&Extent::point("4", 150).unwrap()));
    assert!(matches!(
        Extent::new("3", 200, 100),
        Err(DomainError::InvalidExtent { .. })
    ));
}

// ============================================================
// Tree structure
// ============================================================

#[rstest]
fn given_tree_when_querying_structure_then_shape_is_reported(tree: SubcloneTree) {
    let arena = tree.arena();
    assert_eq!(tree.len(), 5);
    assert_eq!(arena.depth(), 3);
    let leaves: Vec<_> = arena
        .leaf_nodes()
        .into_iter()
        .filter_map(|idx| tree.subclone(idx).and_then(|s| s.cluster_name()))
        .collect();
    assert_eq!(leaves, vec!["B", "C", "D"]);
    let c = tree.find_by_cluster("C")[0];
    assert_eq!(arena.level(c), 2);
    assert_eq!(arena.ancestors(c).count(), 2);
}

#[rstest]
fn given_subtree_when_removing_then_descendants_are_dropped(mut tree: SubcloneTree) {
    let a = tree.find_by_cluster("A")[0];

    let removed = tree.remove_subtree(a).unwrap();

    assert_eq!(removed.len(), 3);
    assert_eq!(tree.len(), 2);
    assert!(tree.find_by_cluster("B").is_empty());
    assert!(tree.subclone(a).is_none(), "stale index must not resolve");
}

#[rstest]
fn given_fraction_above_parent_when_adding_then_rejected(mut tree: SubcloneTree) {
    let d = tree.find_by_cluster("D")[0];

    let err = tree.add_subclone(d, named("E"), 0.45).unwrap_err();

    assert!(matches!(
        err,
        DomainError::FractionExceedsParent { parent_fraction, .. } if parent_fraction == 0.4
    ));
    assert!(tree.validate().is_ok());
}

#[rstest]
fn given_tree_when_listing_clusters_then_names_are_distinct(tree: SubcloneTree) {
    let names: Vec<String> = tree.clusters().into_keys().collect();
    assert_eq!(names, vec!["A", "B", "C", "D"]);
    assert_eq!(tree.find_by_id(NodeId(4)), tree.find_by_cluster("D").first().copied());
}

// ============================================================
// Analysis and printing
// ============================================================

#[rstest]
fn given_tree_when_computing_subtree_fractions_then_descendants_are_summed(tree: SubcloneTree) {
    let sums = subtree_fractions(&tree);

    assert!((sums[&NodeId(1)] - 0.8).abs() < 1e-12);
    assert!((sums[&NodeId(0)] - 2.2).abs() < 1e-12);
    assert_eq!(sums[&NodeId(2)], 0.2);
}

#[rstest]
fn given_valid_tree_when_checking_fractions_then_no_violations(tree: SubcloneTree) {
    assert!(fraction_violations(&tree).is_empty());
}

#[rstest]
fn given_tree_when_printing_then_renderings_follow_preorder(tree: SubcloneTree) {
    assert_eq!(fraction_string(&tree), "1(0.5(0.2,0.1),0.4)");
    let dot = to_dot(&tree);
    assert!(dot.contains("\tn1->n3;\n"));
    assert!(dot.contains("\tn0->n4;\n"));
    assert!(dot.ends_with("}\n"));
}
