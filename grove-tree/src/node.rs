//! B+-tree inner nodes over coordinate-keyed slots.
//!
//! A node holds `keys` of length `n + 1` and `children` of length `n`;
//! child `i` covers `[keys[i], keys[i + 1])`. Keys are strictly increasing
//! and neighboring children share exactly one key. Nodes at
//! `reverse_depth == 0` hold leaf [`Slot`]s; deeper nodes own child nodes.
//! All leaf-level nodes sit at the same reverse depth.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::coords::{push_coalesced, CoordRange};
use crate::data_bin::{DataBin, InsertCursor};
use crate::entry::TreeEntry;
use crate::errors::TreeError;
use crate::props::{InsertProps, RemoveProps, TraverseCtx, TraverseProps};
use crate::slot::{Filler, Slot};
use crate::tree::TreeConfig;
use crate::wither::gen_distance;

pub(crate) type NodeRef<E> = Rc<RefCell<InnerNode<E>>>;
pub(crate) type NodeWeak<E> = Weak<RefCell<InnerNode<E>>>;

/// Tree-wide state shared by every node.
pub(crate) struct TreeShared {
    pub chrom: String,
    pub cfg: TreeConfig,
}

pub(crate) enum Child<E: TreeEntry> {
    Node(NodeRef<E>),
    Slot(Slot<E>),
}

const MAX_RESTRUCTURE_ROUNDS: usize = 64;
const MAX_BALANCE_STEPS: usize = 4096;

pub struct InnerNode<E: TreeEntry> {
    pub(crate) shared: Rc<TreeShared>,
    pub(crate) keys: Vec<u32>,
    pub(crate) children: Vec<Child<E>>,
    pub(crate) reverse_depth: u32,
    pub(crate) is_root: bool,
    /// Generation this node was created or last touched at.
    pub(crate) birth_gen: u64,
    pub(crate) prev: Option<NodeWeak<E>>,
    pub(crate) next: Option<NodeWeak<E>>,
}

impl<E: TreeEntry> fmt::Debug for InnerNode<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InnerNode")
            .field("keys", &self.keys)
            .field("reverse_depth", &self.reverse_depth)
            .field("child_count", &self.children.len())
            .field("is_root", &self.is_root)
            .finish()
    }
}

impl<E: TreeEntry> InnerNode<E> {
    pub(crate) fn new(
        shared: Rc<TreeShared>,
        reverse_depth: u32,
        is_root: bool,
        birth_gen: u64,
        keys: Vec<u32>,
        children: Vec<Child<E>>,
    ) -> Self {
        InnerNode {
            shared,
            keys,
            children,
            reverse_depth,
            is_root,
            birth_gen,
            prev: None,
            next: None,
        }
    }

    /// A fresh depth-0 root covering `span` with a single filler slot.
    pub(crate) fn new_root(shared: &Rc<TreeShared>, span: CoordRange, gen: u64) -> NodeRef<E> {
        let filler = if shared.cfg.local_only {
            Filler::Empty
        } else {
            Filler::Unloaded
        };
        Rc::new(RefCell::new(InnerNode::new(
            Rc::clone(shared),
            0,
            true,
            gen,
            vec![span.start, span.end],
            vec![Child::Slot(Slot::filler(filler))],
        )))
    }

    // ---- inspection ----------------------------------------------------

    pub fn keys(&self) -> &[u32] {
        &self.keys
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn reverse_depth(&self) -> u32 {
        self.reverse_depth
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn birth_gen(&self) -> u64 {
        self.birth_gen
    }

    pub fn span(&self) -> CoordRange {
        CoordRange::new(self.keys[0], *self.keys.last().unwrap_or(&0))
    }

    /// The leaf slot at child index `i`, when this is a leaf-level node.
    pub fn slot(&self, i: usize) -> Option<&Slot<E>> {
        match self.children.get(i) {
            Some(Child::Slot(s)) => Some(s),
            _ => None,
        }
    }

    /// Depth-first visit of this node and every descendant node.
    pub fn visit_nodes(&self, f: &mut dyn FnMut(&InnerNode<E>)) {
        self.visit_depth_inner(&mut |n, _| f(n), 0);
    }

    /// As [`visit_nodes`](Self::visit_nodes), also passing each node's
    /// distance from this one.
    pub fn visit_nodes_with_depth(&self, f: &mut dyn FnMut(&InnerNode<E>, u32)) {
        self.visit_depth_inner(f, 0);
    }

    fn visit_depth_inner(&self, f: &mut dyn FnMut(&InnerNode<E>, u32), depth: u32) {
        f(self, depth);
        for child in &self.children {
            if let Child::Node(n) = child {
                n.borrow().visit_depth_inner(f, depth + 1);
            }
        }
    }

    // ---- child addressing ----------------------------------------------

    fn child_index_of(&self, pos: u32) -> usize {
        debug_assert!(!self.children.is_empty());
        let idx = self.keys.partition_point(|&k| k <= pos);
        idx.saturating_sub(1).min(self.children.len() - 1)
    }

    pub(crate) fn node_child(&self, i: usize) -> NodeRef<E> {
        match &self.children[i] {
            Child::Node(n) => Rc::clone(n),
            Child::Slot(_) => unreachable!("child {} is a leaf slot", i),
        }
    }

    fn child_len(&self, i: usize) -> usize {
        match &self.children[i] {
            Child::Node(n) => n.borrow().children.len(),
            Child::Slot(_) => 0,
        }
    }

    // ---- insert ---------------------------------------------------------

    pub(crate) fn insert(
        &mut self,
        cursor: &mut InsertCursor<E>,
        range: CoordRange,
        carry: &mut Vec<Rc<E>>,
        props: &mut InsertProps<'_, E>,
        post_end: &mut u32,
    ) -> Result<(), TreeError> {
        let clipped = range.clip(&self.span());
        if clipped.is_empty() {
            return Ok(());
        }
        if self.reverse_depth == 0 {
            self.insert_leaf(cursor, clipped, carry, props, post_end)
        } else {
            self.insert_nonleaf(cursor, clipped, carry, props, post_end)
        }
    }

    fn insert_nonleaf(
        &mut self,
        cursor: &mut InsertCursor<E>,
        range: CoordRange,
        carry: &mut Vec<Rc<E>>,
        props: &mut InsertProps<'_, E>,
        post_end: &mut u32,
    ) -> Result<(), TreeError> {
        let mut pos = range.start;
        while pos < range.end {
            let i = self.child_index_of(pos);
            let child_end = self.keys[i + 1];
            let child = self.node_child(i);
            child.borrow_mut().insert(
                cursor,
                CoordRange::new(pos, range.end.min(child_end)),
                carry,
                props,
                post_end,
            )?;
            pos = child_end;
        }
        self.rebuild_keys();
        match self.restructure_immediate_children() {
            Ok(_) => {}
            Err(TreeError::CannotBalance) => {
                log::debug!("deferring subtree balance to the next restructure pass");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn insert_leaf(
        &mut self,
        cursor: &mut InsertCursor<E>,
        range: CoordRange,
        carry: &mut Vec<Rc<E>>,
        props: &mut InsertProps<'_, E>,
        post_end: &mut u32,
    ) -> Result<(), TreeError> {
        // make sure a slot boundary exists at the range start
        let idx = self.child_index_of(range.start);
        if self.keys[idx] < range.start {
            self.split_slot(idx, range.start);
        }

        let mut pos = range.start;
        while pos < range.end {
            let i = self.child_index_of(pos);
            debug_assert_eq!(self.keys[i], pos);

            // the next slot boundary: the next interval start inside the
            // range, or the range end itself
            let next_entry_start = cursor.next_distinct_start(pos, range.end);
            let nxt = next_entry_start.unwrap_or(range.end);
            if self.keys[i + 1] > nxt {
                let loaded = matches!(self.children[i], Child::Slot(Slot::Loaded(_)));
                // a populated bin only splits when an interval actually
                // starts mid-bin; a bare range end inside it merges in place
                if !loaded || next_entry_start == Some(nxt) {
                    self.split_slot(i, nxt);
                }
            }
            let slot_end = self.keys[i + 1];
            let has_own_data = cursor.peek().map_or(false, |e| e.start() <= pos);

            match &mut self.children[i] {
                Child::Slot(slot) => match slot {
                    Slot::Loaded(bin) => {
                        bin.insert(cursor, carry, true, props, post_end, range);
                        bin.flow_out(carry, slot_end);
                    }
                    _ => {
                        if has_own_data || !carry.is_empty() {
                            let mut bin = DataBin::new(pos);
                            bin.insert(cursor, carry, false, props, post_end, range);
                            bin.flow_out(carry, slot_end);
                            *slot = Slot::Loaded(bin);
                        } else {
                            *slot = Slot::Empty;
                        }
                    }
                },
                Child::Node(_) => unreachable!("leaf-level node holds a child node"),
            }

            if i > 0 {
                self.try_merge_slot_left(i);
            } else {
                self.merge_first_slot_cross_border();
            }
            pos = slot_end;
        }
        Ok(())
    }

    /// Merge the carry list into already-loaded bins across `range` without
    /// loading anything new. This is the post-insertion projection: entries
    /// freshly placed in a bin keep flowing right through every loaded bin
    /// they span, replacing provisional structurally-equal clones.
    pub(crate) fn project_carry(
        &mut self,
        range: CoordRange,
        carry: &mut Vec<Rc<E>>,
        allow_duplicates: bool,
    ) {
        let range = range.clip(&self.span());
        if range.is_empty() {
            return;
        }
        let mut pos = range.start;
        while pos < range.end && !carry.is_empty() {
            let i = self.child_index_of(pos);
            let slot_end = self.keys[i + 1];
            match &mut self.children[i] {
                Child::Node(n) => {
                    let n = Rc::clone(n);
                    n.borrow_mut().project_carry(
                        CoordRange::new(pos, range.end.min(slot_end)),
                        carry,
                        allow_duplicates,
                    );
                }
                Child::Slot(Slot::Loaded(bin)) => {
                    bin.merge_carry(carry, allow_duplicates);
                    bin.flow_out(carry, slot_end);
                }
                Child::Slot(_) => {
                    carry.retain(|e| e.end() > slot_end);
                }
            }
            pos = slot_end;
        }
    }

    // ---- slot-level split & merge ---------------------------------------

    fn split_slot(&mut self, i: usize, key: u32) {
        debug_assert!(self.keys[i] < key && key < self.keys[i + 1]);
        let latter = match &self.children[i] {
            Child::Slot(Slot::Loaded(bin)) => Slot::Loaded(bin.split_at(key)),
            Child::Slot(Slot::Empty) => Slot::Empty,
            Child::Slot(Slot::Unloaded) => Slot::Unloaded,
            Child::Node(_) => unreachable!("splitting a node child as a slot"),
        };
        self.keys.insert(i + 1, key);
        self.children.insert(i + 1, Child::Slot(latter));
    }

    /// Try to merge slot `i` into slot `i - 1`. Two slots merge when they are
    /// the same filler, or when the left bin absorbs a right bin with an
    /// empty start list. A failed bin merge still projects the left bin's
    /// contents into the right one's continued list.
    fn try_merge_slot_left(&mut self, i: usize) -> bool {
        if i == 0 || i >= self.children.len() {
            return false;
        }
        let merged = {
            let (a, b) = self.children.split_at_mut(i);
            match (&mut a[i - 1], &mut b[0]) {
                (Child::Slot(l), Child::Slot(r)) => {
                    if l.same_filler(r) {
                        true
                    } else if let (Slot::Loaded(lb), Slot::Loaded(rb)) = (l, r) {
                        lb.merge_after(rb)
                    } else {
                        false
                    }
                }
                _ => false,
            }
        };
        if merged {
            self.children.remove(i);
            self.keys.remove(i);
        }
        merged
    }

    /// With sibling links enabled, the previous node's last slot may absorb
    /// this node's first slot; the sibling keeps its child count and only
    /// its boundary key shifts right.
    fn merge_first_slot_cross_border(&mut self) -> bool {
        if !self.shared.cfg.neighboring_links || self.children.len() < 2 {
            return false;
        }
        let Some(prev) = self.prev.as_ref().and_then(|w| w.upgrade()) else {
            return false;
        };
        let mut pb = prev.borrow_mut();
        if pb.reverse_depth != 0 || pb.children.is_empty() {
            return false;
        }
        let merged = {
            let last = pb.children.len() - 1;
            match (&mut pb.children[last], &mut self.children[0]) {
                (Child::Slot(l), Child::Slot(r)) => {
                    if l.same_filler(r) {
                        true
                    } else if let (Slot::Loaded(lb), Slot::Loaded(rb)) = (l, r) {
                        lb.merge_after(rb)
                    } else {
                        false
                    }
                }
                _ => false,
            }
        };
        if merged {
            let end = self.keys[1];
            if let Some(k) = pb.keys.last_mut() {
                *k = end;
            }
            self.keys.remove(0);
            self.children.remove(0);
        }
        merged
    }

    // ---- traverse -------------------------------------------------------

    pub(crate) fn traverse(
        &mut self,
        ctx: &mut TraverseCtx,
        props: &mut TraverseProps<'_, E>,
    ) -> Result<bool, TreeError> {
        self.birth_gen = ctx.gen;
        let span = self.span();
        let mut pos = ctx.range.start.max(span.start);
        while pos < ctx.range.end.min(span.end) {
            let i = self.child_index_of(pos);
            let slot_end = self.keys[i + 1];
            match &mut self.children[i] {
                Child::Node(n) => {
                    let n = Rc::clone(n);
                    let mut descend = true;
                    {
                        let nb = n.borrow();
                        let pass = match props.node_filter.as_mut() {
                            Some(f) => f(&nb),
                            None => true,
                        };
                        if pass {
                            if let Some(cb) = props.node_callback.as_mut() {
                                let keep = cb(&nb);
                                if !keep && props.break_on_false {
                                    return Ok(false);
                                }
                                if !props.both_calls {
                                    descend = false;
                                }
                            }
                        }
                    }
                    if descend && !n.borrow_mut().traverse(ctx, props)? {
                        return Ok(false);
                    }
                }
                Child::Slot(slot) => match slot {
                    Slot::Empty => {}
                    Slot::Unloaded => {
                        if !props.allow_null {
                            let r = CoordRange::new(pos, slot_end.min(ctx.range.end));
                            return Err(TreeError::DataNotReady(
                                r.to_region(&self.shared.chrom)?,
                            ));
                        }
                    }
                    Slot::Loaded(bin) => {
                        if !bin.traverse(ctx, props) {
                            return Ok(false);
                        }
                    }
                },
            }
            pos = slot_end;
        }
        Ok(true)
    }

    // ---- uncached ranges ------------------------------------------------

    pub(crate) fn uncached(&self, range: CoordRange, out: &mut Vec<CoordRange>) {
        let range = range.clip(&self.span());
        for (i, child) in self.children.iter().enumerate() {
            let cs = self.keys[i];
            let ce = self.keys[i + 1];
            if ce <= range.start {
                continue;
            }
            if cs >= range.end {
                break;
            }
            match child {
                Child::Node(n) => n
                    .borrow()
                    .uncached(CoordRange::new(cs.max(range.start), ce.min(range.end)), out),
                Child::Slot(Slot::Unloaded) => push_coalesced(
                    out,
                    CoordRange::new(cs.max(range.start), ce.min(range.end)),
                ),
                Child::Slot(_) => {}
            }
        }
    }

    pub(crate) fn has_uncached(&self, range: CoordRange) -> bool {
        let range = range.clip(&self.span());
        for (i, child) in self.children.iter().enumerate() {
            let cs = self.keys[i];
            let ce = self.keys[i + 1];
            if ce <= range.start {
                continue;
            }
            if cs >= range.end {
                break;
            }
            match child {
                Child::Node(n) => {
                    if n.borrow().has_uncached(CoordRange::new(
                        cs.max(range.start),
                        ce.min(range.end),
                    )) {
                        return true;
                    }
                }
                Child::Slot(Slot::Unloaded) => return true,
                Child::Slot(_) => {}
            }
        }
        false
    }

    // ---- remove ---------------------------------------------------------

    pub(crate) fn remove(
        &mut self,
        target: &E,
        props: &mut RemoveProps<'_, E>,
        filler: Filler,
        removed: &mut Vec<Rc<E>>,
        op_range: CoordRange,
    ) {
        let s = target.start();
        let span = self.span();
        if s < span.start || s >= span.end {
            return;
        }
        let i = self.child_index_of(s);
        match &mut self.children[i] {
            Child::Node(n) => {
                let n = Rc::clone(n);
                n.borrow_mut().remove(target, props, filler, removed, op_range);
            }
            Child::Slot(slot) => {
                if let Slot::Loaded(bin) = slot {
                    bin.remove(target, props, removed, op_range);
                    if bin.is_empty() {
                        *slot = Slot::filler(filler);
                    }
                }
            }
        }
    }

    /// Drop continued-list references to `removed` entries from every loaded
    /// bin across `range`.
    pub(crate) fn strip_continued_refs(&mut self, range: CoordRange, removed: &[Rc<E>]) {
        let range = range.clip(&self.span());
        for i in 0..self.children.len() {
            let cs = self.keys[i];
            let ce = self.keys[i + 1];
            if ce <= range.start {
                continue;
            }
            if cs >= range.end {
                break;
            }
            match &mut self.children[i] {
                Child::Node(n) => {
                    let n = Rc::clone(n);
                    n.borrow_mut().strip_continued_refs(
                        CoordRange::new(cs.max(range.start), ce.min(range.end)),
                        removed,
                    );
                }
                Child::Slot(Slot::Loaded(bin)) => bin.strip_refs(removed),
                Child::Slot(_) => {}
            }
        }
    }

    /// Collect stored entries that reach across `point` from the left,
    /// deduplicated by identity. Used to canonicalize caller-provided
    /// continued lists before an insert.
    pub(crate) fn collect_crossing(&self, point: u32, out: &mut Vec<Rc<E>>) {
        for (i, child) in self.children.iter().enumerate() {
            if self.keys[i] >= point {
                break;
            }
            match child {
                Child::Node(n) => n.borrow().collect_crossing(point, out),
                Child::Slot(Slot::Loaded(bin)) => {
                    for e in bin
                        .start_list()
                        .iter()
                        .chain(bin.continued_list().iter())
                    {
                        if e.start() < point
                            && e.end() > point
                            && !out.iter().any(|x| Rc::ptr_eq(x, e))
                        {
                            out.push(Rc::clone(e));
                        }
                    }
                }
                Child::Slot(_) => {}
            }
        }
    }

    // ---- balancing ------------------------------------------------------

    /// Deep rebalance: children first, then this node's own child counts.
    /// A child that cannot be fixed locally reports `CannotBalance`; the
    /// next round gives it new siblings by merging at this level.
    pub(crate) fn restructure(&mut self) -> Result<bool, TreeError> {
        if self.reverse_depth == 0 {
            return Ok(self.coalesce_slots());
        }
        let mut changed = false;
        for _round in 0..MAX_RESTRUCTURE_ROUNDS {
            let kids: Vec<NodeRef<E>> = (0..self.children.len())
                .map(|i| self.node_child(i))
                .collect();
            let mut retry = false;
            for child in kids {
                match child.borrow_mut().restructure() {
                    Ok(c) => changed |= c,
                    Err(TreeError::CannotBalance) => retry = true,
                    Err(e) => return Err(e),
                }
            }
            let local = self.restructure_immediate_children()?;
            changed |= local;
            if !local {
                if retry && !self.is_root {
                    // nothing more can be fixed at this level
                    return Err(TreeError::CannotBalance);
                }
                break;
            }
        }
        self.rebuild_keys();
        Ok(changed)
    }

    /// One pass over the immediate children fixing under- and over-full
    /// nodes by redistribution, merging or splitting.
    fn restructure_immediate_children(&mut self) -> Result<bool, TreeError> {
        debug_assert!(self.reverse_depth > 0);
        let b = self.shared.cfg.branching_factor;
        let min = b / 2;
        let mut changed = false;
        let mut steps = 0;
        let mut i = 0;
        while i < self.children.len() {
            steps += 1;
            if steps > MAX_BALANCE_STEPS {
                log::warn!("balancing did not settle after {} steps", MAX_BALANCE_STEPS);
                break;
            }
            let cc = self.child_len(i);
            if cc > b {
                if i + 1 < self.children.len() && cc + self.child_len(i + 1) <= 2 * b {
                    self.redistribute(i);
                } else if i > 0 && cc + self.child_len(i - 1) <= 2 * b {
                    self.redistribute(i - 1);
                } else {
                    self.split_node_child(i);
                }
                changed = true;
                continue;
            }
            if cc < min {
                if self.children.len() == 1 {
                    if self.is_root {
                        // the tree itself shrinks the root instead
                        break;
                    }
                    return Err(TreeError::CannotBalance);
                }
                let j = if i + 1 < self.children.len() { i } else { i - 1 };
                if self.child_len(j) + self.child_len(j + 1) > b {
                    self.redistribute(j);
                } else {
                    self.merge_node_pair(j);
                }
                changed = true;
                i = j;
                continue;
            }
            i += 1;
        }
        Ok(changed)
    }

    fn coalesce_slots(&mut self) -> bool {
        debug_assert_eq!(self.reverse_depth, 0);
        let mut changed = false;
        let mut i = 1;
        while i < self.children.len() {
            if self.try_merge_slot_left(i) {
                changed = true;
            } else {
                i += 1;
            }
        }
        if self.merge_first_slot_cross_border() {
            changed = true;
        }
        changed
    }

    /// Even out the child counts of children `i` and `i + 1`.
    fn redistribute(&mut self, i: usize) {
        let left = self.node_child(i);
        let right = self.node_child(i + 1);
        let lc = left.borrow().children.len();
        let rc = right.borrow().children.len();
        let total = lc + rc;
        let target_left = total / 2;

        if lc > target_left {
            // move tail children from left to the front of right
            let m = lc - target_left;
            let mut lb = left.borrow_mut();
            let mut rb = right.borrow_mut();
            let split = lc - m;
            let moved_children: Vec<Child<E>> = lb.children.drain(split..).collect();
            let moved_keys: Vec<u32> = lb.keys.drain(split + 1..).collect();
            let mut head = Vec::with_capacity(m);
            head.push(*lb.keys.last().unwrap_or(&0));
            head.extend_from_slice(&moved_keys[..m - 1]);
            rb.keys.splice(0..0, head);
            rb.children.splice(0..0, moved_children);
        } else if rc > total - target_left {
            // move head children from right to the tail of left
            let m = lc.abs_diff(target_left);
            if m == 0 {
                return;
            }
            let mut lb = left.borrow_mut();
            let mut rb = right.borrow_mut();
            let moved_children: Vec<Child<E>> = rb.children.drain(..m).collect();
            let moved_keys: Vec<u32> = rb.keys.drain(..m).collect();
            lb.keys.extend_from_slice(&moved_keys[1..]);
            lb.keys.push(rb.keys[0]);
            lb.children.extend(moved_children);
        }
        self.keys[i + 1] = right.borrow().keys[0];
    }

    /// Merge children `i` and `i + 1`; the left node absorbs the right.
    fn merge_node_pair(&mut self, i: usize) {
        let left = self.node_child(i);
        let boundary = left.borrow().children.len();
        let right = match self.children.remove(i + 1) {
            Child::Node(n) => n,
            Child::Slot(_) => unreachable!("merging a leaf slot as a node"),
        };
        self.keys.remove(i + 1);
        {
            let mut lb = left.borrow_mut();
            let mut rb = right.borrow_mut();
            debug_assert_eq!(lb.keys.last().copied(), rb.keys.first().copied());
            let tail: Vec<u32> = rb.keys.drain(..).skip(1).collect();
            lb.keys.extend(tail);
            lb.children.append(&mut rb.children);
            lb.next = rb.next.take();
            rb.prev = None;
        }
        if self.shared.cfg.neighboring_links {
            let nx = left.borrow().next.as_ref().and_then(|w| w.upgrade());
            if let Some(nx) = nx {
                nx.borrow_mut().prev = Some(Rc::downgrade(&left));
            }
        }
        if left.borrow().reverse_depth == 0 && boundary > 0 {
            left.borrow_mut().try_merge_slot_left(boundary);
        }
    }

    /// Split an over-full child into roughly-equal siblings.
    fn split_node_child(&mut self, i: usize) {
        let child = self.node_child(i);
        let b = self.shared.cfg.branching_factor;
        let (parts, depth, gen, prev, next) = {
            let mut cb = child.borrow_mut();
            let cc = cb.children.len();
            let m = ((2 * cc) / b).max(2);
            let base = cc / m;
            let extra = cc % m;
            let all_keys = std::mem::take(&mut cb.keys);
            let all_children = std::mem::take(&mut cb.children);
            let mut child_iter = all_children.into_iter();
            let mut parts: Vec<(Vec<u32>, Vec<Child<E>>)> = Vec::with_capacity(m);
            let mut taken = 0;
            for j in 0..m {
                let size = base + usize::from(j < extra);
                let keys = all_keys[taken..=taken + size].to_vec();
                let kids: Vec<Child<E>> = child_iter.by_ref().take(size).collect();
                parts.push((keys, kids));
                taken += size;
            }
            (parts, cb.reverse_depth, cb.birth_gen, cb.prev.take(), cb.next.take())
        };

        let new_nodes: Vec<NodeRef<E>> = parts
            .into_iter()
            .map(|(keys, children)| {
                Rc::new(RefCell::new(InnerNode::new(
                    Rc::clone(&self.shared),
                    depth,
                    false,
                    gen,
                    keys,
                    children,
                )))
            })
            .collect();

        if self.shared.cfg.neighboring_links {
            if let Some(p) = prev.and_then(|w| w.upgrade()) {
                Self::link_nodes(&p, &new_nodes[0]);
            }
            for pair in new_nodes.windows(2) {
                Self::link_nodes(&pair[0], &pair[1]);
            }
            if let Some(n) = next.and_then(|w| w.upgrade()) {
                Self::link_nodes(new_nodes.last().unwrap_or(&child), &n);
            }
        }

        let seps: Vec<u32> = new_nodes[1..]
            .iter()
            .map(|n| n.borrow().keys[0])
            .collect();
        self.children
            .splice(i..=i, new_nodes.into_iter().map(Child::Node));
        self.keys.splice(i + 1..i + 1, seps);
    }

    /// Wire two adjacent same-depth nodes, recursively wiring the boundary
    /// children so a leaf-level scan can walk linearly.
    fn link_nodes(left: &NodeRef<E>, right: &NodeRef<E>) {
        left.borrow_mut().next = Some(Rc::downgrade(right));
        right.borrow_mut().prev = Some(Rc::downgrade(left));
        let lc = {
            let lb = left.borrow();
            match lb.children.last() {
                Some(Child::Node(n)) => Some(Rc::clone(n)),
                _ => None,
            }
        };
        let rc = {
            let rb = right.borrow();
            match rb.children.first() {
                Some(Child::Node(n)) => Some(Rc::clone(n)),
                _ => None,
            }
        };
        if let (Some(a), Some(b)) = (lc, rc) {
            Self::link_nodes(&a, &b);
        }
    }

    /// Recompute this node's keys from its children's outer keys.
    pub(crate) fn rebuild_keys(&mut self) {
        if self.reverse_depth == 0 {
            return;
        }
        let mut keys = Vec::with_capacity(self.children.len() + 1);
        for child in &self.children {
            if let Child::Node(n) = child {
                keys.push(n.borrow().keys[0]);
            }
        }
        if let Some(Child::Node(last)) = self.children.last() {
            keys.push(*last.borrow().keys.last().unwrap_or(&0));
        }
        if keys.len() == self.children.len() + 1 {
            self.keys = keys;
        }
    }

    // ---- withering ------------------------------------------------------

    /// Replace every subtree untouched for more than `life_span` generations
    /// with unloaded fillers. Returns whether this node itself expired.
    pub(crate) fn wither_sweep(&mut self, curr_gen: u64, life_span: u64) -> bool {
        if gen_distance(curr_gen, self.birth_gen) > life_span {
            return true;
        }
        if self.reverse_depth > 0 {
            let kids: Vec<NodeRef<E>> = (0..self.children.len())
                .map(|i| self.node_child(i))
                .collect();
            for child in kids {
                let expired = child.borrow_mut().wither_sweep(curr_gen, life_span);
                if expired {
                    log::debug!(
                        "withering subtree over {:?}",
                        child.borrow().span()
                    );
                    child
                        .borrow_mut()
                        .clear_to_filler(Filler::Unloaded, curr_gen);
                }
            }
        }
        false
    }

    /// Collapse this subtree to a single filler slot, keeping every leaf at
    /// reverse depth 0 by chaining single-child nodes down to the leaf level.
    pub(crate) fn clear_to_filler(&mut self, filler: Filler, gen: u64) {
        let span = self.span();
        self.birth_gen = gen;
        self.keys = vec![span.start, span.end];
        if self.reverse_depth == 0 {
            self.children = vec![Child::Slot(Slot::filler(filler))];
        } else {
            self.children = vec![Child::Node(Self::filler_chain(
                &self.shared,
                self.reverse_depth - 1,
                span,
                filler,
                gen,
            ))];
        }
    }

    fn filler_chain(
        shared: &Rc<TreeShared>,
        depth: u32,
        span: CoordRange,
        filler: Filler,
        gen: u64,
    ) -> NodeRef<E> {
        let children = if depth == 0 {
            vec![Child::Slot(Slot::filler(filler))]
        } else {
            vec![Child::Node(Self::filler_chain(
                shared,
                depth - 1,
                span,
                filler,
                gen,
            ))]
        };
        Rc::new(RefCell::new(InnerNode::new(
            Rc::clone(shared),
            depth,
            false,
            gen,
            vec![span.start, span.end],
            children,
        )))
    }
}
