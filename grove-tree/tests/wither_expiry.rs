//! Generational expiry: untouched subtrees wither back to the unloaded
//! state while recently-traversed data survives.

mod common;

use common::{check_invariants, collect, region};
use grove_core::ChromRegion;
use grove_tree::{InsertProps, IntervalTree, TraverseProps, TreeConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn withering_tree(life_span: u64) -> IntervalTree<ChromRegion> {
    let config = TreeConfig {
        branching_factor: 4,
        life_span,
        ..TreeConfig::default()
    };
    IntervalTree::new(region("chr1:1-10000"), config).unwrap()
}

fn spread_batch() -> Vec<ChromRegion> {
    (0..20)
        .map(|i| {
            let start = 100 + i * 500;
            ChromRegion::new("chr1", start, start + 50).unwrap()
        })
        .collect()
}

fn touch_left(tree: &mut IntervalTree<ChromRegion>) {
    let mut props = TraverseProps::default();
    tree.traverse(&region("chr1:1-400"), &mut props).unwrap();
}

#[rstest]
fn test_untouched_subtrees_wither() {
    let mut tree = withering_tree(2);
    let covering = tree.covering_range().clone();
    tree.insert(
        spread_batch(),
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();
    assert!(tree.root().reverse_depth() > 0);
    assert!(!tree.has_uncached_range(&covering).unwrap());

    // traversals over the left edge age everything else out
    touch_left(&mut tree);
    touch_left(&mut tree);
    assert!(!tree.has_uncached_range(&region("chr1:5000-6000")).unwrap());
    touch_left(&mut tree);

    assert_eq!(tree.current_gen(), 3);
    assert!(tree.has_uncached_range(&region("chr1:5000-6000")).unwrap());
    assert!(!tree.has_uncached_range(&region("chr1:1-400")).unwrap());
    check_invariants(&tree);

    // the surviving region still traverses normally
    let seen = collect(&mut tree, &region("chr1:1-400"));
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].start, 100);
}

#[rstest]
fn test_zero_life_span_never_withers() {
    let mut tree = withering_tree(0);
    let covering = tree.covering_range().clone();
    tree.insert(
        spread_batch(),
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();

    for _ in 0..10 {
        touch_left(&mut tree);
    }
    assert_eq!(tree.current_gen(), 10);
    assert!(!tree.has_uncached_range(&covering).unwrap());
}

#[rstest]
fn test_do_not_wither_suppresses_aging() {
    let mut tree = withering_tree(2);
    let covering = tree.covering_range().clone();
    tree.insert(
        spread_batch(),
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();

    for _ in 0..10 {
        let mut props = TraverseProps {
            do_not_wither: true,
            ..Default::default()
        };
        tree.traverse(&region("chr1:1-400"), &mut props).unwrap();
    }
    assert_eq!(tree.current_gen(), 0);
    assert!(!tree.has_uncached_range(&covering).unwrap());
}

#[rstest]
fn test_manual_advance_and_wither() {
    let mut tree = withering_tree(3);
    let covering = tree.covering_range().clone();
    tree.insert(
        spread_batch(),
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();

    // aging without traversal touches nothing, so everything expires at once
    tree.advance_gen(4);
    assert_eq!(tree.current_gen(), 4);
    assert!(!tree.has_uncached_range(&covering).unwrap());
    tree.wither();
    assert!(tree.has_uncached_range(&covering).unwrap());
    check_invariants(&tree);
}

#[rstest]
fn test_withered_region_reloads() {
    let mut tree = withering_tree(1);
    let covering = tree.covering_range().clone();
    tree.insert(
        spread_batch(),
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();

    touch_left(&mut tree);
    touch_left(&mut tree);
    let stale = region("chr1:4000-7000");
    assert!(tree.has_uncached_range(&stale).unwrap());

    // the higher layer re-fetches and re-inserts the withered span
    let refill: Vec<ChromRegion> = tree
        .get_uncached_range(&stale)
        .unwrap()
        .iter()
        .flat_map(|gap| {
            spread_batch()
                .into_iter()
                .filter(|e| e.overlaps(gap))
                .collect::<Vec<_>>()
        })
        .collect();
    tree.insert(refill, Some(vec![stale.clone()]), &mut InsertProps::default())
        .unwrap();
    assert!(!tree.has_uncached_range(&stale).unwrap());
    check_invariants(&tree);
}
