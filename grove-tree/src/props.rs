use std::rc::Rc;

use crate::coords::CoordRange;
use crate::entry::TreeEntry;
use crate::node::InnerNode;
use crate::slot::Filler;

/// Callback fired per interval during inserts, removals and traversals. The
/// second argument is the current operation range; traversal callbacks may
/// shrink it to cut the walk short. A `false` return aborts a traversal when
/// [`TraverseProps::break_on_false`] is set.
pub type DataCallback<'a, E> = Box<dyn FnMut(&Rc<E>, &mut CoordRange) -> bool + 'a>;

/// Filter applied before the data callback; entries failing it are skipped
/// without ending the traversal.
pub type DataFilter<'a, E> = Box<dyn FnMut(&Rc<E>) -> bool + 'a>;

/// Callback/filter over whole inner-node subtrees.
pub type NodeCallback<'a, E> = Box<dyn FnMut(&InnerNode<E>) -> bool + 'a>;

/// Options for [`IntervalTree::insert`](crate::IntervalTree::insert).
pub struct InsertProps<'a, E: TreeEntry> {
    /// Seed carry-forward list: intervals that begin left of the insert
    /// range and flow into it. Canonicalized against stored data before use.
    pub continued_list: Vec<Rc<E>>,
    /// Fired once per entry actually placed into the tree.
    pub data_callback: Option<DataCallback<'a, E>>,
    /// Keep structurally-equal duplicates instead of suppressing them.
    pub allow_duplicates: bool,
}

impl<'a, E: TreeEntry> Default for InsertProps<'a, E> {
    fn default() -> Self {
        InsertProps {
            continued_list: Vec::new(),
            data_callback: None,
            allow_duplicates: false,
        }
    }
}

/// Options for [`IntervalTree::remove`](crate::IntervalTree::remove).
pub struct RemoveProps<'a, E: TreeEntry> {
    /// Remove only entries structurally equal to the target instead of every
    /// entry sharing its start coordinate.
    pub exact_match: bool,
    /// Filler installed where a bin vanishes. Defaults to `Unloaded`, or
    /// `Empty` for `local_only` trees.
    pub convert_to: Option<Filler>,
    /// Fired once per removed entry.
    pub data_callback: Option<DataCallback<'a, E>>,
}

impl<'a, E: TreeEntry> Default for RemoveProps<'a, E> {
    fn default() -> Self {
        RemoveProps {
            exact_match: false,
            convert_to: None,
            data_callback: None,
        }
    }
}

/// State threaded through one traversal.
pub(crate) struct TraverseCtx {
    /// The (possibly shrunk) query range.
    pub range: CoordRange,
    /// Set once the first bin has been visited, so later bins skip their
    /// continued list and every interval is emitted exactly once.
    pub not_first: bool,
    /// Generation stamped onto every visited node.
    pub gen: u64,
}

/// Options for [`IntervalTree::traverse`](crate::IntervalTree::traverse).
pub struct TraverseProps<'a, E: TreeEntry> {
    pub data_callback: Option<DataCallback<'a, E>>,
    pub data_filter: Option<DataFilter<'a, E>>,
    pub node_callback: Option<NodeCallback<'a, E>>,
    pub node_filter: Option<NodeCallback<'a, E>>,
    /// Fire data callbacks even for subtrees whose node callback fired.
    pub both_calls: bool,
    /// Abort the traversal when any callback returns `false`.
    pub break_on_false: bool,
    /// Skip `Unloaded` slots instead of failing with `DataNotReady`.
    pub allow_null: bool,
    /// Leave the wither generation untouched and schedule no wither pass.
    pub do_not_wither: bool,
}

impl<'a, E: TreeEntry> Default for TraverseProps<'a, E> {
    fn default() -> Self {
        TraverseProps {
            data_callback: None,
            data_filter: None,
            node_callback: None,
            node_filter: None,
            both_calls: false,
            break_on_false: false,
            allow_null: false,
            do_not_wither: false,
        }
    }
}
