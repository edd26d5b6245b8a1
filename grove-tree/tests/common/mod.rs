#![allow(dead_code)]

use std::rc::Rc;

use grove_core::ChromRegion;
use grove_tree::{IntervalTree, TraverseProps};

pub fn region(s: &str) -> ChromRegion {
    s.parse().unwrap()
}

pub fn rc(s: &str) -> Rc<ChromRegion> {
    Rc::new(region(s))
}

/// Collect the shared references handed to the data callback over `range`.
pub fn collect(
    tree: &mut IntervalTree<ChromRegion>,
    range: &ChromRegion,
) -> Vec<Rc<ChromRegion>> {
    let mut out: Vec<Rc<ChromRegion>> = Vec::new();
    {
        let mut props = TraverseProps {
            data_callback: Some(Box::new(|e, _| {
                out.push(Rc::clone(e));
                true
            })),
            allow_null: true,
            do_not_wither: true,
            ..Default::default()
        };
        tree.traverse(range, &mut props).unwrap();
    }
    out
}

/// Identity comparison of a stored list against expected members.
pub fn same_refs(actual: &[Rc<ChromRegion>], expected: &[&Rc<ChromRegion>]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| Rc::ptr_eq(a, b))
}

/// Assert the structural invariants of the index: bounded child counts,
/// strictly increasing keys, shared boundary keys, uniform leaf depth.
pub fn check_invariants(tree: &IntervalTree<ChromRegion>) {
    let b = tree.config().branching_factor;
    let root = tree.root();
    let root_depth = root.reverse_depth();
    root.visit_nodes_with_depth(&mut |n, depth| {
        assert_eq!(
            depth + n.reverse_depth(),
            root_depth,
            "leaf depth is not uniform at keys {:?}",
            n.keys()
        );
        if n.is_root() {
            assert!(n.child_count() >= 1 && n.child_count() <= b);
        } else {
            assert!(
                n.child_count() >= b / 2 && n.child_count() <= b,
                "child count {} out of [{}, {}] at keys {:?}",
                n.child_count(),
                b / 2,
                b,
                n.keys()
            );
        }
        assert_eq!(n.keys().len(), n.child_count() + 1);
        for w in n.keys().windows(2) {
            assert!(w[0] < w[1], "keys not strictly increasing: {:?}", n.keys());
        }
        let holds_slots = n.slot(0).is_some();
        assert_eq!(holds_slots, n.reverse_depth() == 0);
    });
}

/// Every interval in `entries` overlapping `range` must be visited exactly
/// once by a traversal.
pub fn check_single_visit(
    tree: &mut IntervalTree<ChromRegion>,
    range: &ChromRegion,
    entries: &[Rc<ChromRegion>],
) {
    let seen = collect(tree, range);
    for e in entries {
        let expected = usize::from(e.overlaps(range));
        let count = seen.iter().filter(|s| Rc::ptr_eq(s, e)).count();
        assert_eq!(
            count, expected,
            "{} visited {} time(s), expected {}",
            e, count, expected
        );
    }
}
