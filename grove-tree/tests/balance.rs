//! Index balancing under a small branching factor: node splits, depth
//! growth, redistribution, merges and root demotion.

mod common;

use std::rc::Rc;

use common::{check_invariants, collect, region};
use grove_core::ChromRegion;
use grove_tree::{InsertProps, IntervalTree, RemoveProps, TreeConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn small_tree(neighboring_links: bool) -> IntervalTree<ChromRegion> {
    let config = TreeConfig {
        branching_factor: 4,
        neighboring_links,
        ..TreeConfig::default()
    };
    IntervalTree::new(region("chr1:1-50000"), config).unwrap()
}

fn batch(n: u32) -> Vec<ChromRegion> {
    (0..n)
        .map(|i| {
            let start = 100 + i * 100;
            ChromRegion::new("chr1", start, start + 60).unwrap()
        })
        .collect()
}

#[rstest]
#[case::plain(false)]
#[case::linked(true)]
fn test_bulk_insert_grows_and_balances(#[case] links: bool) {
    let mut tree = small_tree(links);
    let covering = tree.covering_range().clone();
    let entries = batch(100);

    tree.insert(
        entries,
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();
    assert!(!tree.has_uncached_range(&covering).unwrap());
    assert!(tree.root().reverse_depth() > 0);
    check_invariants(&tree);

    // all 100 intervals come back, in comparator order
    let seen = collect(&mut tree, &covering);
    assert_eq!(seen.len(), 100);
    for pair in seen.windows(2) {
        assert!(pair[0].start <= pair[1].start);
    }
}

#[rstest]
#[case::plain(false)]
#[case::linked(true)]
fn test_incremental_inserts_balance(#[case] links: bool) {
    let mut tree = small_tree(links);
    for e in batch(60) {
        let range = ChromRegion::new("chr1", e.start, e.end).unwrap();
        tree.insert(vec![e], Some(vec![range]), &mut InsertProps::default())
            .unwrap();
        check_invariants(&tree);
    }
    let covering = tree.covering_range().clone();
    let seen = collect(&mut tree, &covering);
    assert_eq!(seen.len(), 60);
}

#[rstest]
#[case::plain(false)]
#[case::linked(true)]
fn test_removals_shrink_the_tree(#[case] links: bool) {
    let mut tree = small_tree(links);
    let covering = tree.covering_range().clone();
    let entries = batch(100);
    tree.insert(
        entries.clone(),
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();
    let depth_before = tree.root().reverse_depth();

    // removing most intervals collapses their bins back to fillers
    for e in entries.iter().take(90) {
        tree.remove(e, &mut RemoveProps::default()).unwrap();
        check_invariants(&tree);
    }
    let seen = collect(&mut tree, &covering);
    assert_eq!(seen.len(), 10);
    assert!(tree.root().reverse_depth() < depth_before);

    // removing everything demotes the root to a single leaf slot
    for e in entries.iter().skip(90) {
        tree.remove(e, &mut RemoveProps::default()).unwrap();
    }
    check_invariants(&tree);
    assert_eq!(tree.root().reverse_depth(), 0);
    assert!(collect(&mut tree, &covering).is_empty());
}

#[rstest]
fn test_removed_ranges_report_unloaded_again() {
    let mut tree = small_tree(false);
    let covering = tree.covering_range().clone();
    tree.insert(
        batch(20),
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();
    assert!(!tree.has_uncached_range(&covering).unwrap());

    // removal converts the emptied bin to Unloaded by default
    let target = region("chr1:100-160");
    tree.remove(&target, &mut RemoveProps::default()).unwrap();
    assert!(tree.has_uncached_range(&covering).unwrap());
    let uncached = tree.get_uncached_range(&covering).unwrap();
    assert_eq!(uncached.len(), 1);
    assert_eq!(uncached[0].start, 100);
}

#[rstest]
fn test_long_intervals_survive_balancing() {
    let mut tree = small_tree(false);
    let covering = tree.covering_range().clone();

    // one interval spanning nearly everything plus many short ones
    let long = Rc::new(region("chr1:150-9550"));
    let mut entries: Vec<Rc<ChromRegion>> = batch(100).into_iter().map(Rc::new).collect();
    entries.push(Rc::clone(&long));
    tree.insert_shared(
        entries,
        Some(vec![covering.clone()]),
        &mut InsertProps::default(),
    )
    .unwrap();
    check_invariants(&tree);

    // the long interval is handed out exactly once per traversal, from
    // whichever bin the walk enters first
    for q in ["chr1:200-300", "chr1:5000-5200", "chr1:9000-9600"] {
        let seen = collect(&mut tree, &region(q));
        let hits = seen.iter().filter(|e| Rc::ptr_eq(e, &long)).count();
        assert_eq!(hits, 1, "query {}", q);
    }
}
