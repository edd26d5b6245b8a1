//! Leaf-level storage: one bin per distinct interval start coordinate.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::coords::CoordRange;
use crate::entry::{cmp_entries, TreeEntry};
use crate::props::{InsertProps, RemoveProps, TraverseCtx, TraverseProps};

/// How a structurally-equal entry already present in a list is treated when
/// merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeMode {
    /// Keep the stored identity; the incoming entry is dropped.
    Preserve,
    /// Swap the stored identity for the incoming one (canonicalization).
    Replace,
    /// Structurally-equal entries coexist; only pointer-equal entries dedup.
    Duplicate,
}

/// Merge `e` into a comparator-ordered list. Returns whether a new entry was
/// actually added (identity swaps and suppressions return `false`).
pub(crate) fn merge_entry<E: TreeEntry>(
    list: &mut Vec<Rc<E>>,
    e: &Rc<E>,
    mode: MergeMode,
) -> bool {
    let idx = list.partition_point(|x| cmp_entries(x.as_ref(), e.as_ref()) == Ordering::Less);
    let mut j = idx;
    while j < list.len() && cmp_entries(list[j].as_ref(), e.as_ref()) == Ordering::Equal {
        if Rc::ptr_eq(&list[j], e) {
            return false;
        }
        if list[j].equal_to(e.as_ref()) {
            match mode {
                MergeMode::Preserve => return false,
                MergeMode::Replace => {
                    list[j] = Rc::clone(e);
                    return false;
                }
                MergeMode::Duplicate => {}
            }
        }
        j += 1;
    }
    list.insert(idx, Rc::clone(e));
    true
}

/// A shared, sorted insert batch with a consumption cursor.
///
/// The batch is consumed strictly left to right as bins take their entries;
/// the cursor position is the record of what has been placed so far.
pub(crate) struct InsertCursor<E: TreeEntry> {
    entries: Vec<Rc<E>>,
    pos: usize,
}

impl<E: TreeEntry> InsertCursor<E> {
    pub fn new(mut entries: Vec<Rc<E>>) -> Self {
        entries.sort_by(|a, b| cmp_entries(a.as_ref(), b.as_ref()));
        InsertCursor { entries, pos: 0 }
    }

    pub fn peek(&self) -> Option<&Rc<E>> {
        self.entries.get(self.pos)
    }

    pub fn advance(&mut self) -> Rc<E> {
        let e = Rc::clone(&self.entries[self.pos]);
        self.pos += 1;
        e
    }

    pub fn remaining(&self) -> usize {
        self.entries.len() - self.pos
    }

    /// The start coordinate of the first pending entry strictly inside
    /// `(after, limit)`, if any. Does not consume.
    pub fn next_distinct_start(&self, after: u32, limit: u32) -> Option<u32> {
        self.entries[self.pos..]
            .iter()
            .map(|e| e.start())
            .find(|&s| s > after)
            .filter(|&s| s < limit)
    }

    /// Render up to `n` pending entries overlapping `range`, for error
    /// reporting.
    pub fn upcoming_in(&self, range: CoordRange, n: usize) -> Vec<String> {
        self.entries[self.pos..]
            .iter()
            .filter(|e| e.overlaps_range(&range))
            .take(n)
            .map(|e| e.to_string())
            .collect()
    }
}

/// The leaf storage unit: intervals starting at this bin's start coordinate
/// (`start_list`) plus intervals flowing in from the left (`continued_list`).
///
/// Both lists stay ordered by the entry comparator. An interval appears in
/// the `start_list` of exactly one bin and in the `continued_list` of every
/// loaded bin it spans beyond that, always as the same shared reference.
#[derive(Debug)]
pub struct DataBin<E: TreeEntry> {
    start: u32,
    start_list: Vec<Rc<E>>,
    continued_list: Vec<Rc<E>>,
}

impl<E: TreeEntry> DataBin<E> {
    pub fn new(start: u32) -> Self {
        DataBin {
            start,
            start_list: Vec::new(),
            continued_list: Vec::new(),
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn start_list(&self) -> &[Rc<E>] {
        &self.start_list
    }

    pub fn continued_list(&self) -> &[Rc<E>] {
        &self.continued_list
    }

    /// A bin with nothing in either list should collapse back to a filler.
    pub fn is_empty(&self) -> bool {
        self.start_list.is_empty() && self.continued_list.is_empty()
    }

    /// Insert batch entries into this bin.
    ///
    /// Consumes cursor entries up to and including this bin's start
    /// coordinate, folds the carry list into the continued list, and extends
    /// `post_end` past the furthest end among the entries placed here so the
    /// caller can keep projecting them into bins further right.
    ///
    /// `add_new` distinguishes a freshly-created bin (the batch is
    /// authoritative, the start list is replaced) from an existing bin being
    /// updated (entries merge in, structurally-equal ones suppressed unless
    /// duplicates are allowed).
    pub(crate) fn insert(
        &mut self,
        cursor: &mut InsertCursor<E>,
        carry: &mut Vec<Rc<E>>,
        add_new: bool,
        props: &mut InsertProps<'_, E>,
        post_end: &mut u32,
        op_range: CoordRange,
    ) {
        let mut cb_range = op_range;

        // 1. entries starting left of this bin flow in via the carry list
        while cursor.peek().map_or(false, |e| e.start() < self.start) {
            let e = cursor.advance();
            if e.end() > self.start && merge_entry(carry, &e, MergeMode::Preserve) {
                *post_end = (*post_end).max(e.end());
                if let Some(cb) = props.data_callback.as_mut() {
                    cb(&e, &mut cb_range);
                }
            }
        }

        // 2. carry entries still alive at this coordinate join the continued
        //    list; canonical identities replace provisional clones
        self.merge_carry(carry, props.allow_duplicates);

        // 3. entries starting exactly here form the start list
        let mut taken = Vec::new();
        while cursor.peek().map_or(false, |e| e.start() == self.start) {
            taken.push(cursor.advance());
        }
        if !add_new {
            self.start_list.clear();
        }
        let mode = if props.allow_duplicates {
            MergeMode::Duplicate
        } else {
            MergeMode::Preserve
        };
        for e in &taken {
            if merge_entry(&mut self.start_list, e, mode) {
                *post_end = (*post_end).max(e.end());
                if let Some(cb) = props.data_callback.as_mut() {
                    cb(e, &mut cb_range);
                }
            }
        }
    }

    /// Fold the carry list into this bin's continued list (insert-walk
    /// direction: incoming identities win over stored structural equals).
    pub(crate) fn merge_carry(&mut self, carry: &[Rc<E>], allow_duplicates: bool) {
        let mode = if allow_duplicates {
            MergeMode::Duplicate
        } else {
            MergeMode::Replace
        };
        for e in carry {
            if e.end() > self.start && e.start() < self.start {
                merge_entry(&mut self.continued_list, e, mode);
            }
        }
    }

    /// Rebuild the carry list for the bin after this one: drop entries that
    /// end at or before `slot_end` and add this bin's own survivors.
    pub(crate) fn flow_out(&self, carry: &mut Vec<Rc<E>>, slot_end: u32) {
        carry.retain(|e| e.end() > slot_end);
        for e in self.start_list.iter().chain(self.continued_list.iter()) {
            if e.end() > slot_end {
                merge_entry(carry, e, MergeMode::Preserve);
            }
        }
    }

    /// Split this bin at `key`, returning the right half. The right half has
    /// an empty start list; everything of ours reaching past `key` continues
    /// into it as the same shared references.
    pub(crate) fn split_at(&self, key: u32) -> DataBin<E> {
        let mut right = DataBin::new(key);
        for e in self.start_list.iter().chain(self.continued_list.iter()) {
            if e.end() > key {
                merge_entry(&mut right.continued_list, e, MergeMode::Duplicate);
            }
        }
        right
    }

    /// Try to absorb the right neighbour bin.
    ///
    /// Succeeds when the neighbour's start list is empty: everything it holds
    /// already flows from here, so the neighbour can vanish. Otherwise the
    /// merge fails, but this bin projects its contents into the neighbour's
    /// continued list; entries already present on the right keep their stored
    /// identity (a structurally-equal foreign clone never replaces one).
    pub(crate) fn merge_after(&mut self, right: &mut DataBin<E>) -> bool {
        if right.start_list.is_empty() {
            for e in right.continued_list.drain(..) {
                match e.start().cmp(&self.start) {
                    Ordering::Equal => {
                        merge_entry(&mut self.start_list, &e, MergeMode::Preserve);
                    }
                    Ordering::Less => {
                        merge_entry(&mut self.continued_list, &e, MergeMode::Preserve);
                    }
                    // an entry starting inside our span would have a bin of
                    // its own; nothing to keep
                    Ordering::Greater => {}
                }
            }
            true
        } else {
            for e in self.start_list.iter().chain(self.continued_list.iter()) {
                if e.end() > right.start {
                    merge_entry(&mut right.continued_list, e, MergeMode::Preserve);
                }
            }
            false
        }
    }

    /// Remove entries whose start equals the target's; `exact_match` narrows
    /// to structural equality. Removed entries are appended to `removed`.
    pub(crate) fn remove(
        &mut self,
        target: &E,
        props: &mut RemoveProps<'_, E>,
        removed: &mut Vec<Rc<E>>,
        op_range: CoordRange,
    ) {
        let mut cb_range = op_range;
        let mut kept = Vec::with_capacity(self.start_list.len());
        for e in self.start_list.drain(..) {
            let hit = e.start() == target.start() && (!props.exact_match || e.equal_to(target));
            if hit {
                if let Some(cb) = props.data_callback.as_mut() {
                    cb(&e, &mut cb_range);
                }
                removed.push(e);
            } else {
                kept.push(e);
            }
        }
        self.start_list = kept;
    }

    /// Drop continued-list references to removed entries.
    pub(crate) fn strip_refs(&mut self, removed: &[Rc<E>]) {
        self.continued_list
            .retain(|e| !removed.iter().any(|r| Rc::ptr_eq(e, r)));
    }

    /// Visit this bin's intervals. The continued list is only emitted for
    /// the first bin a traversal touches; start lists everywhere. Returns
    /// `false` to abort the walk.
    pub(crate) fn traverse(
        &self,
        ctx: &mut TraverseCtx,
        props: &mut TraverseProps<'_, E>,
    ) -> bool {
        let first = !ctx.not_first;
        ctx.not_first = true;
        if first {
            for e in &self.continued_list {
                if !Self::emit(e, ctx, props) {
                    return false;
                }
            }
        }
        for e in &self.start_list {
            if !Self::emit(e, ctx, props) {
                return false;
            }
        }
        true
    }

    fn emit(e: &Rc<E>, ctx: &mut TraverseCtx, props: &mut TraverseProps<'_, E>) -> bool {
        if !e.overlaps_range(&ctx.range) {
            return true;
        }
        if let Some(filter) = props.data_filter.as_mut() {
            if !filter(e) {
                return true;
            }
        }
        if let Some(cb) = props.data_callback.as_mut() {
            if !cb(e, &mut ctx.range) && props.break_on_false {
                return false;
            }
        }
        true
    }
}
