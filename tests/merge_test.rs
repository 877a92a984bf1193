//! Integration tests for merging a secondary tree into a primary tree.

use rstest::{fixture, rstest};

use clonetree::application::persist::{ClusterRecord, EventRecord};
use clonetree::application::{
    fraction_violations, load, merge_into, ConflictKind, MergeOptions, NodeRecord, ParentRef,
};
use clonetree::domain::{DomainError, EventKind, NodeId, SubcloneTree};
use clonetree::util::testing;

/// (id, parent id, cluster, fraction); the first entry is the root.
type Row = (u64, Option<u64>, Option<&'static str>, f64);

fn cluster_record(name: &str, chrom: &str) -> ClusterRecord {
    let position = name.bytes().map(u64::from).sum::<u64>() * 1_000;
    ClusterRecord {
        name: name.to_string(),
        events: vec![EventRecord {
            kind: EventKind::Snv,
            chrom: chrom.to_string(),
            start: position,
            end: position,
        }],
    }
}

fn build(rows: &[Row]) -> SubcloneTree {
    let records: Vec<NodeRecord> = rows
        .iter()
        .map(|&(id, parent, name, fraction)| NodeRecord {
            id,
            parent: parent.map_or_else(ParentRef::root, ParentRef::Node),
            fraction,
            cluster: name.map(|n| cluster_record(n, "1")),
        })
        .collect();
    load(&records).unwrap()
}

fn fraction_of(tree: &SubcloneTree, name: &str) -> f64 {
    let found = tree.find_by_cluster(name);
    assert_eq!(found.len(), 1, "expected exactly one node for {}", name);
    tree.subclone(found[0]).unwrap().fraction()
}

fn parent_cluster(tree: &SubcloneTree, name: &str) -> Option<String> {
    let idx = tree.find_by_cluster(name)[0];
    tree.parent(idx)
        .and_then(|p| tree.subclone(p))
        .and_then(|p| p.cluster_name().map(str::to_string))
}

//   root (1.0)
//   ├── A (0.5)
//   │   └── B (0.2)
//   └── C (0.3)
#[fixture]
fn primary() -> SubcloneTree {
    testing::init_test_setup();
    build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("A"), 0.5),
        (2, Some(1), Some("B"), 0.2),
        (3, Some(0), Some("C"), 0.3),
    ])
}

// ============================================================
// Unification
// ============================================================

#[rstest]
fn given_matching_lineage_when_merging_then_fractions_take_maximum(mut primary: SubcloneTree) {
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("A"), 0.6),
        (2, Some(1), Some("B"), 0.1),
    ]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert!(report.is_clean());
    assert_eq!(primary.len(), 4);
    assert_eq!(fraction_of(&primary, "A"), 0.6);
    assert_eq!(fraction_of(&primary, "B"), 0.2);
    assert_eq!(fraction_of(&primary, "C"), 0.3);
    assert_eq!(report.unified.len(), 3);
    assert!(report.grafted.is_empty());
}

#[rstest]
fn given_any_merge_when_done_then_matched_fractions_never_decrease(mut primary: SubcloneTree) {
    let before: Vec<(String, f64)> = ["A", "B", "C"]
        .iter()
        .map(|n| (n.to_string(), fraction_of(&primary, n)))
        .collect();
    let secondary = build(&[
        (0, None, None, 0.9),
        (1, Some(0), Some("C"), 0.1),
        (2, Some(0), Some("A"), 0.4),
    ]);

    merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    for (name, fraction) in before {
        assert!(fraction_of(&primary, &name) >= fraction);
    }
    let root = primary.root().unwrap();
    assert_eq!(primary.subclone(root).unwrap().fraction(), 1.0);
}

#[rstest]
fn given_match_above_merge_point_when_merging_then_unified(mut primary: SubcloneTree) {
    // secondary orders A and B the other way round; B's match is an ancestor-side node
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("B"), 0.4),
        (2, Some(1), Some("A"), 0.3),
    ]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert!(report.is_clean(), "conflicts: {:?}", report.conflicts);
    assert_eq!(primary.len(), 4);
    assert_eq!(fraction_of(&primary, "B"), 0.4);
}

#[rstest]
fn given_secondary_root_with_primary_root_cluster_when_merging_then_roots_unify() {
    let mut primary = build(&[(0, None, Some("T"), 0.8), (1, Some(0), Some("A"), 0.5)]);
    let secondary = build(&[(0, None, Some("T"), 0.9), (1, Some(0), Some("A"), 0.2)]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert!(report.is_clean());
    assert_eq!(primary.len(), 2);
    assert_eq!(fraction_of(&primary, "T"), 0.9);
    assert_eq!(fraction_of(&primary, "A"), 0.5);
}

// ============================================================
// Grafting
// ============================================================

#[rstest]
fn given_unmatched_child_when_merging_then_subtree_is_grafted_unchanged(
    mut primary: SubcloneTree,
) {
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("D"), 0.3),
        (2, Some(1), Some("E"), 0.2),
        (3, Some(1), Some("F"), 0.05),
    ]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert!(report.is_clean());
    assert_eq!(primary.len(), 7);
    let root = primary.root().unwrap();
    assert_eq!(primary.children(root).len(), 3);
    assert_eq!(parent_cluster(&primary, "D"), None);
    assert_eq!(parent_cluster(&primary, "E").as_deref(), Some("D"));
    assert_eq!(parent_cluster(&primary, "F").as_deref(), Some("D"));
    let d = primary.find_by_cluster("D")[0];
    let names: Vec<_> = primary
        .children(d)
        .iter()
        .filter_map(|&c| primary.subclone(c).and_then(|s| s.cluster_name()))
        .collect();
    assert_eq!(names, vec!["E", "F"]);
    assert_eq!(fraction_of(&primary, "F"), 0.05);
    assert_eq!(report.grafted.len(), 3);
}

#[rstest]
fn given_grafted_nodes_when_merging_then_they_receive_fresh_primary_ids(
    mut primary: SubcloneTree,
) {
    let secondary = build(&[(0, None, None, 1.0), (1, Some(0), Some("D"), 0.3)]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    let d = primary.find_by_cluster("D")[0];
    let id = primary.subclone(d).unwrap().id();
    assert_eq!(id, NodeId(4));
    assert_eq!(report.grafted, vec![(NodeId(1), id)]);
}

#[rstest]
fn given_empty_primary_when_merging_then_secondary_is_copied() {
    let mut primary = SubcloneTree::new();
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("A"), 0.4),
        (2, Some(1), Some("B"), 0.1),
    ]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert!(report.is_clean());
    assert_eq!(primary.len(), 3);
    assert_eq!(parent_cluster(&primary, "B").as_deref(), Some("A"));
}

#[rstest]
fn given_empty_secondary_when_merging_then_primary_unchanged(mut primary: SubcloneTree) {
    let report = merge_into(&mut primary, &SubcloneTree::new(), &MergeOptions::default()).unwrap();

    assert_eq!(report, Default::default());
    assert_eq!(primary.len(), 4);
}

// ============================================================
// Conflicts
// ============================================================

#[rstest]
fn given_match_on_unrelated_branch_when_merging_then_conflict_is_grafted_and_reported(
    mut primary: SubcloneTree,
) {
    // C sits beside A in the primary but below A in the secondary
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("A"), 0.5),
        (2, Some(1), Some("C"), 0.25),
        (3, Some(2), Some("G"), 0.1),
    ]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::InconsistentAncestry);
    assert_eq!(conflict.cluster, "C");
    assert_eq!(conflict.matches.len(), 1);
    // conflicting subtree kept as a separate graft under A, C untouched
    assert_eq!(primary.find_by_cluster("C").len(), 2);
    assert_eq!(fraction_of(&primary, "G"), 0.1);
    assert_eq!(parent_cluster(&primary, "G").as_deref(), Some("C"));
    let original_c = primary.find_by_cluster("C")[1];
    assert_eq!(primary.subclone(original_c).unwrap().fraction(), 0.3);
}

#[rstest]
fn given_cluster_on_several_primary_nodes_when_merging_then_ambiguous_conflict() {
    let mut primary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("A"), 0.5),
        (2, Some(0), Some("X"), 0.4),
        (3, Some(2), Some("A"), 0.2),
    ]);
    let secondary = build(&[(0, None, None, 1.0), (1, Some(0), Some("A"), 0.45)]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].kind, ConflictKind::AmbiguousMatch);
    assert_eq!(report.conflicts[0].matches.len(), 2);
    assert_eq!(primary.find_by_cluster("A").len(), 3);
}

#[rstest]
fn given_same_name_with_distant_events_when_merging_then_content_conflict(
    mut primary: SubcloneTree,
) {
    let mut records = vec![
        NodeRecord {
            id: 0,
            parent: ParentRef::root(),
            fraction: 1.0,
            cluster: None,
        },
        NodeRecord {
            id: 1,
            parent: ParentRef::Node(0),
            fraction: 0.5,
            cluster: Some(cluster_record("A", "1")),
        },
    ];
    records[1].cluster.as_mut().unwrap().events[0].chrom = "9".to_string();
    let secondary = load(&records).unwrap();

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert_eq!(report.conflicts[0].kind, ConflictKind::ContentMismatch);
}

#[rstest]
fn given_cluster_twice_in_secondary_when_merging_then_second_is_already_unified(
    mut primary: SubcloneTree,
) {
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("A"), 0.5),
        (2, Some(1), Some("A"), 0.3),
    ]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].kind, ConflictKind::AlreadyUnified);
}

#[rstest]
fn given_conflicts_when_converting_report_then_first_conflict_is_error(
    mut primary: SubcloneTree,
) {
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("A"), 0.5),
        (2, Some(1), Some("C"), 0.25),
    ]);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert!(matches!(
        report.into_result(),
        Err(DomainError::MergeConflict { ref cluster, .. }) if cluster == "C"
    ));
}

// ============================================================
// Options
// ============================================================

#[rstest]
fn given_min_fraction_when_merging_then_small_subclones_are_passed_through(
    mut primary: SubcloneTree,
) {
    let secondary = build(&[
        (0, None, None, 1.0),
        (1, Some(0), Some("S"), 0.005),
        (2, Some(1), Some("A"), 0.6),
    ]);
    let options = MergeOptions {
        min_fraction: 0.01,
        ..MergeOptions::default()
    };

    let report = merge_into(&mut primary, &secondary, &options).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.skipped.len(), 1);
    assert!(primary.find_by_cluster("S").is_empty());
    assert_eq!(fraction_of(&primary, "A"), 0.6);
    assert!(fraction_violations(&primary).is_empty());
}

fn single_cluster_tree(kind: EventKind, start: u64, end: u64) -> SubcloneTree {
    let records = vec![
        NodeRecord {
            id: 0,
            parent: ParentRef::root(),
            fraction: 1.0,
            cluster: None,
        },
        NodeRecord {
            id: 1,
            parent: ParentRef::Node(0),
            fraction: 0.5,
            cluster: Some(ClusterRecord {
                name: "A".to_string(),
                events: vec![EventRecord {
                    kind,
                    chrom: "1".to_string(),
                    start,
                    end,
                }],
            }),
        },
    ];
    load(&records).unwrap()
}

#[rstest]
fn given_boundary_resolution_when_segments_are_close_then_clusters_unify() {
    testing::init_test_setup();
    let secondary = single_cluster_tree(EventKind::Cnv, 10_500, 90_500);
    let strict = MergeOptions {
        boundary_resolution: 100,
        ..MergeOptions::default()
    };
    let mut strict_primary = single_cluster_tree(EventKind::Cnv, 10_000, 90_000);
    let mut primary = single_cluster_tree(EventKind::Cnv, 10_000, 90_000);

    let strict_report = merge_into(&mut strict_primary, &secondary, &strict).unwrap();
    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert_eq!(strict_report.conflicts.len(), 1);
    assert_eq!(strict_report.conflicts[0].kind, ConflictKind::ContentMismatch);
    assert!(report.is_clean());
    assert_eq!(primary.len(), 2);
}

#[rstest]
fn given_point_mutations_at_different_positions_when_merging_then_content_mismatch() {
    testing::init_test_setup();
    let mut primary = single_cluster_tree(EventKind::Snv, 100, 100);
    let secondary = single_cluster_tree(EventKind::Snv, 5_000_000, 5_000_000);

    let report = merge_into(&mut primary, &secondary, &MergeOptions::default()).unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].kind, ConflictKind::ContentMismatch);
    assert_eq!(report.unified, vec![(NodeId(0), NodeId(0))]);
    assert_eq!(primary.find_by_cluster("A").len(), 2);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.merge_point, NodeId(0));
    assert_eq!(conflict.matches, vec![NodeId(1)]);
    assert!(primary.find_by_id(conflict.graft).is_some());
}
