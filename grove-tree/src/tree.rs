//! The tree façade: public operations over one chromosome's coordinate span.

use std::cell::Ref;
use std::rc::Rc;

use grove_core::ChromRegion;
use serde::{Deserialize, Serialize};

use crate::coords::CoordRange;
use crate::data_bin::{merge_entry, InsertCursor, MergeMode};
use crate::entry::{cmp_entries, TreeEntry};
use crate::errors::{InsertFailure, InsertFailures, TreeError};
use crate::node::{InnerNode, NodeRef, TreeShared};
use crate::props::{InsertProps, RemoveProps, TraverseCtx, TraverseProps};
use crate::slot::Filler;
use crate::wither::{advance, WitherOp, WitherQueue};
use crate::DEFAULT_BRANCHING_FACTOR;

/// Construction options for an [`IntervalTree`].
///
/// Embedders typically keep one of these in their own configuration files;
/// the struct deserializes with per-field defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Maximum children per inner node; must be greater than 2.
    pub branching_factor: usize,
    /// Generations an untouched subtree survives before withering back to
    /// the unloaded state. `0` disables withering.
    pub life_span: u64,
    /// The tree holds complete local data: there is no notion of an
    /// unloaded region, fillers are `Empty`, and withering is disabled.
    pub local_only: bool,
    /// Maintain prev/next links between same-depth siblings, enabling
    /// cross-border slot merges and linear leaf scans.
    pub neighboring_links: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            life_span: 0,
            local_only: false,
            neighboring_links: false,
        }
    }
}

/// A sparse, sectionally-loaded interval cache over one chromosome.
///
/// See the [crate documentation](crate) for an overview and example.
pub struct IntervalTree<E: TreeEntry> {
    shared: Rc<TreeShared>,
    covering: ChromRegion,
    root: NodeRef<E>,
    gen: u64,
    queue: WitherQueue,
}

impl<E: TreeEntry> IntervalTree<E> {
    pub fn new(covering: ChromRegion, config: TreeConfig) -> Result<Self, TreeError> {
        if config.branching_factor <= 2 {
            return Err(TreeError::InvalidConfig(format!(
                "branching factor must be greater than 2, got {}",
                config.branching_factor
            )));
        }
        let shared = Rc::new(TreeShared {
            chrom: covering.chr.clone(),
            cfg: config,
        });
        let root = InnerNode::new_root(&shared, CoordRange::from(&covering), 0);
        Ok(IntervalTree {
            shared,
            covering,
            root,
            gen: 0,
            queue: WitherQueue::default(),
        })
    }

    pub fn covering_range(&self) -> &ChromRegion {
        &self.covering
    }

    pub fn config(&self) -> &TreeConfig {
        &self.shared.cfg
    }

    pub fn current_gen(&self) -> u64 {
        self.gen
    }

    /// The root node, for inspection. Holding this borrow across tree
    /// operations will panic; read and release.
    pub fn root(&self) -> Ref<'_, InnerNode<E>> {
        self.root.borrow()
    }

    fn filler(&self) -> Filler {
        if self.shared.cfg.local_only {
            Filler::Empty
        } else {
            Filler::Unloaded
        }
    }

    fn truncate_to_covering(&self, range: &ChromRegion) -> Result<CoordRange, TreeError> {
        if range.chr != self.covering.chr {
            return Err(TreeError::InvalidRange(format!(
                "{} is not on {}",
                range, self.covering.chr
            )));
        }
        let clipped = CoordRange::from(range).clip(&CoordRange::from(&self.covering));
        if clipped.is_empty() {
            return Err(TreeError::InvalidRange(format!(
                "{} does not overlap the covering range {}",
                range, self.covering
            )));
        }
        Ok(clipped)
    }

    fn region_of(&self, span: CoordRange) -> ChromRegion {
        span.to_region(&self.covering.chr)
            .unwrap_or_else(|_| self.covering.clone())
    }

    // ---- insert ---------------------------------------------------------

    /// Insert a batch of intervals fetched for `ranges`.
    ///
    /// The batch is sorted and fully consumed. `ranges` defaults to each
    /// entry's own span; each range only loads its currently-unloaded
    /// sub-ranges, which makes repeated inserts for the same region
    /// idempotent. Failures are collected per sub-range and reported
    /// together once every range has been processed.
    pub fn insert(
        &mut self,
        data: Vec<E>,
        ranges: Option<Vec<ChromRegion>>,
        props: &mut InsertProps<'_, E>,
    ) -> Result<(), TreeError> {
        self.insert_shared(data.into_iter().map(Rc::new).collect(), ranges, props)
    }

    /// Like [`insert`](Self::insert), but the caller keeps handles to the
    /// shared entries.
    pub fn insert_shared(
        &mut self,
        mut data: Vec<Rc<E>>,
        ranges: Option<Vec<ChromRegion>>,
        props: &mut InsertProps<'_, E>,
    ) -> Result<(), TreeError> {
        data.sort_by(|a, b| cmp_entries(a.as_ref(), b.as_ref()));
        let ranges: Vec<ChromRegion> = if self.shared.cfg.local_only {
            vec![self.covering.clone()]
        } else {
            match ranges {
                Some(r) => r,
                None => data
                    .iter()
                    .filter_map(|e| {
                        ChromRegion::new(self.covering.chr.as_str(), e.start(), e.end()).ok()
                    })
                    .collect(),
            }
        };

        let mut cursor = InsertCursor::new(data);
        let mut failures: Vec<InsertFailure> = Vec::new();
        for range in &ranges {
            let clipped = match self.truncate_to_covering(range) {
                Ok(c) => c,
                Err(err) => {
                    failures.push(InsertFailure {
                        range: range.clone(),
                        message: err.to_string(),
                        entries: cursor.upcoming_in(CoordRange::from(range), 3),
                    });
                    continue;
                }
            };
            let subs: Vec<CoordRange> = if self.shared.cfg.local_only {
                vec![clipped]
            } else {
                let mut out = Vec::new();
                self.root.borrow().uncached(clipped, &mut out);
                out
            };
            for sub in subs {
                if let Err(err) = self.insert_subrange(&mut cursor, sub, props) {
                    failures.push(InsertFailure {
                        range: self.region_of(sub),
                        message: err.to_string(),
                        entries: cursor.upcoming_in(sub, 3),
                    });
                }
            }
        }
        self.restructure_root();

        if failures.is_empty() {
            Ok(())
        } else {
            log::debug!("insert failed for {} sub-range(s)", failures.len());
            Err(TreeError::AggregatedInsert(InsertFailures(failures)))
        }
    }

    fn insert_subrange(
        &mut self,
        cursor: &mut InsertCursor<E>,
        sub: CoordRange,
        props: &mut InsertProps<'_, E>,
    ) -> Result<(), TreeError> {
        let mut post_end = sub.end;
        let mut carry = self.prepare_carry(cursor, sub, props, &mut post_end)?;
        self.root
            .borrow_mut()
            .insert(cursor, sub, &mut carry, props, &mut post_end)?;

        // entries placed here keep flowing right through loaded bins
        if post_end > sub.end {
            carry.retain(|e| e.end() > sub.end);
            let ext = CoordRange::new(sub.end, post_end.min(self.covering.end));
            if !carry.is_empty() && !ext.is_empty() {
                self.root
                    .borrow_mut()
                    .project_carry(ext, &mut carry, props.allow_duplicates);
            }
        }
        Ok(())
    }

    /// The pre-insertion hook: build the carry list for one sub-range from
    /// the caller's seeds plus batch entries starting left of it, then
    /// canonicalize against data already stored to the left so duplicate
    /// inserts never create divergent copies.
    fn prepare_carry(
        &self,
        cursor: &mut InsertCursor<E>,
        sub: CoordRange,
        props: &mut InsertProps<'_, E>,
        post_end: &mut u32,
    ) -> Result<Vec<Rc<E>>, TreeError> {
        // stored intervals crossing into the range are the canonical base;
        // structurally-equal seeds and batch entries merge away against them
        let mut carry: Vec<Rc<E>> = Vec::new();
        let mut crossing: Vec<Rc<E>> = Vec::new();
        self.root.borrow().collect_crossing(sub.start, &mut crossing);
        for e in &crossing {
            merge_entry(&mut carry, e, MergeMode::Preserve);
        }
        for e in &props.continued_list {
            if e.start() < sub.start && e.end() > sub.start {
                merge_entry(&mut carry, e, MergeMode::Preserve);
            }
        }

        let mut lifted: Vec<Rc<E>> = Vec::new();
        while cursor.peek().map_or(false, |e| e.start() < sub.start) {
            let e = cursor.advance();
            if e.end() > sub.start && merge_entry(&mut carry, &e, MergeMode::Preserve) {
                lifted.push(e);
            }
        }

        // carry entries not backed by stored data must begin in unloaded
        // territory; a loaded region that does not hold them is inconsistent
        for c in &carry {
            if crossing.iter().any(|x| Rc::ptr_eq(x, c)) {
                continue;
            }
            if c.start() >= self.covering.start && c.start() < self.covering.end {
                let probe = CoordRange::new(c.start(), c.start() + 1);
                if !self.root.borrow().has_uncached(probe) {
                    return Err(TreeError::InconsistentContinuedList(c.to_string()));
                }
            }
        }

        // freshly-lifted entries that survived canonicalization count as
        // placed: extend the projection watermark and fire the callback
        let mut cb_range = sub;
        for e in &lifted {
            if carry.iter().any(|c| Rc::ptr_eq(c, e)) {
                *post_end = (*post_end).max(e.end());
                if let Some(cb) = props.data_callback.as_mut() {
                    cb(e, &mut cb_range);
                }
            }
        }
        Ok(carry)
    }

    // ---- remove ---------------------------------------------------------

    /// Remove entries starting where `target` starts; `exact_match` narrows
    /// to structural equality. Emptied bins collapse to the configured
    /// filler and the tree re-balances.
    pub fn remove(
        &mut self,
        target: &E,
        props: &mut RemoveProps<'_, E>,
    ) -> Result<(), TreeError> {
        let filler = props.convert_to.unwrap_or_else(|| self.filler());
        let op_range = CoordRange::from(&self.covering);
        let mut removed = Vec::new();
        self.root
            .borrow_mut()
            .remove(target, props, filler, &mut removed, op_range);

        if !removed.is_empty() {
            let max_end = removed.iter().map(|e| e.end()).max().unwrap_or(0);
            let from = target.start();
            if max_end > from {
                let reach = CoordRange::new(from, max_end.min(self.covering.end));
                self.root.borrow_mut().strip_continued_refs(reach, &removed);
            }
            log::debug!("removed {} entr(ies) starting at {}", removed.len(), from);
        }
        self.restructure_root();
        Ok(())
    }

    // ---- traverse -------------------------------------------------------

    /// Visit every stored interval overlapping `range` exactly once.
    ///
    /// Advances the wither generation and schedules a wither pass on
    /// completion (even a failed one), unless `do_not_wither` is set.
    /// Returns `false` when a callback ended the walk early under
    /// `break_on_false`.
    pub fn traverse(
        &mut self,
        range: &ChromRegion,
        props: &mut TraverseProps<'_, E>,
    ) -> Result<bool, TreeError> {
        let clipped = self.truncate_to_covering(range)?;
        if !props.do_not_wither {
            self.enqueue(WitherOp::Advance(1));
        }
        let mut ctx = TraverseCtx {
            range: clipped,
            not_first: false,
            gen: self.gen,
        };
        let result = self.root.borrow_mut().traverse(&mut ctx, props);
        if !props.do_not_wither {
            self.enqueue(WitherOp::Wither);
        }
        result
    }

    // ---- uncached ranges ------------------------------------------------

    /// The sub-ranges of `range` that still need fetching, ordered and
    /// coalesced. Always empty for `local_only` trees.
    pub fn get_uncached_range(
        &self,
        range: &ChromRegion,
    ) -> Result<Vec<ChromRegion>, TreeError> {
        let mut out = Vec::new();
        self.get_uncached_range_into(range, &mut out)?;
        Ok(out)
    }

    /// As [`get_uncached_range`](Self::get_uncached_range), appending into a
    /// caller-provided accumulator.
    pub fn get_uncached_range_into(
        &self,
        range: &ChromRegion,
        out: &mut Vec<ChromRegion>,
    ) -> Result<(), TreeError> {
        if self.shared.cfg.local_only {
            return Ok(());
        }
        let clipped = self.truncate_to_covering(range)?;
        let mut spans = Vec::new();
        self.root.borrow().uncached(clipped, &mut spans);
        for span in spans {
            out.push(span.to_region(&self.covering.chr)?);
        }
        Ok(())
    }

    /// Whether any part of `range` still needs fetching. Always `false` for
    /// `local_only` trees.
    pub fn has_uncached_range(&self, range: &ChromRegion) -> Result<bool, TreeError> {
        if self.shared.cfg.local_only {
            return Ok(false);
        }
        let clipped = self.truncate_to_covering(range)?;
        Ok(self.root.borrow().has_uncached(clipped))
    }

    // ---- lifecycle ------------------------------------------------------

    /// Reset the tree to a single filler slot over the original covering
    /// range, keeping the configuration and generation counter.
    pub fn clear(&mut self) {
        self.root = InnerNode::new_root(&self.shared, CoordRange::from(&self.covering), self.gen);
        log::debug!("tree cleared over {}", self.covering);
    }

    // ---- withering ------------------------------------------------------

    /// Advance the generation counter by `n`. Requests made while a wither
    /// pass is draining apply after it, in order.
    pub fn advance_gen(&mut self, n: u64) {
        self.enqueue(WitherOp::Advance(n));
    }

    /// Request a wither pass: prune every subtree untouched for more than
    /// `life_span` generations.
    pub fn wither(&mut self) {
        self.enqueue(WitherOp::Wither);
    }

    fn enqueue(&mut self, op: WitherOp) {
        self.queue.ops.push_back(op);
        if self.queue.draining {
            return;
        }
        self.queue.draining = true;
        while let Some(op) = self.queue.ops.pop_front() {
            match op {
                WitherOp::Advance(n) => self.gen = advance(self.gen, n),
                WitherOp::Wither => self.run_wither_pass(),
            }
        }
        self.queue.draining = false;
    }

    fn run_wither_pass(&mut self) {
        let cfg = &self.shared.cfg;
        if cfg.life_span == 0 || cfg.local_only {
            return;
        }
        let expired = self
            .root
            .borrow_mut()
            .wither_sweep(self.gen, cfg.life_span);
        if expired {
            self.root
                .borrow_mut()
                .clear_to_filler(Filler::Unloaded, self.gen);
        }
        self.restructure_root();
    }

    // ---- balancing ------------------------------------------------------

    /// Re-balance from the root: grow a level while the root is over-full,
    /// shrink while a deep root holds a single child, and run the recursive
    /// restructure in between until the tree settles.
    fn restructure_root(&mut self) {
        let b = self.shared.cfg.branching_factor;
        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > 32 {
                log::warn!("root restructure did not stabilize after 32 rounds");
                break;
            }
            let (count, depth) = {
                let r = self.root.borrow();
                (r.child_count(), r.reverse_depth())
            };
            if count > b {
                self.grow_root();
                continue;
            }
            if count <= 1 && depth > 0 {
                self.shrink_root();
                continue;
            }
            let changed = self.root.borrow_mut().restructure().unwrap_or(true);
            let (count, depth) = {
                let r = self.root.borrow();
                (r.child_count(), r.reverse_depth())
            };
            if count > b || (count <= 1 && depth > 0) {
                continue;
            }
            if !changed {
                break;
            }
        }
    }

    fn grow_root(&mut self) {
        let old = Rc::clone(&self.root);
        let (span, depth) = {
            let mut ob = old.borrow_mut();
            ob.is_root = false;
            (ob.span(), ob.reverse_depth())
        };
        let node = InnerNode::new(
            Rc::clone(&self.shared),
            depth + 1,
            true,
            self.gen,
            vec![span.start, span.end],
            vec![crate::node::Child::Node(old)],
        );
        self.root = Rc::new(std::cell::RefCell::new(node));
        log::debug!("tree grew to reverse depth {}", depth + 1);
    }

    fn shrink_root(&mut self) {
        let child = self.root.borrow().node_child(0);
        {
            let mut cb = child.borrow_mut();
            cb.is_root = true;
            cb.prev = None;
            cb.next = None;
        }
        log::debug!(
            "tree shrank to reverse depth {}",
            child.borrow().reverse_depth()
        );
        self.root = child;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    fn region(s: &str) -> ChromRegion {
        s.parse().unwrap()
    }

    #[fixture]
    fn tree() -> IntervalTree<ChromRegion> {
        IntervalTree::new(region("chr1:1-2000"), TreeConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_tiny_branching_factor() {
        let config = TreeConfig {
            branching_factor: 2,
            ..TreeConfig::default()
        };
        assert!(matches!(
            IntervalTree::<ChromRegion>::new(region("chr1:1-2000"), config),
            Err(TreeError::InvalidConfig(_))
        ));
    }

    #[rstest]
    fn test_fresh_tree_is_fully_uncached(tree: IntervalTree<ChromRegion>) {
        let covering = tree.covering_range().clone();
        assert!(tree.has_uncached_range(&covering).unwrap());
        let uncached = tree.get_uncached_range(&covering).unwrap();
        assert_eq!(uncached.len(), 1);
        assert_eq!(uncached[0].region_str(), "chr1:1-2000");
    }

    #[rstest]
    fn test_insert_marks_range_cached(mut tree: IntervalTree<ChromRegion>) {
        tree.insert(
            vec![region("chr1:100-200(+)")],
            Some(vec![region("chr1:50-500")]),
            &mut InsertProps::default(),
        )
        .unwrap();
        assert!(!tree.has_uncached_range(&region("chr1:50-500")).unwrap());
        assert!(tree.has_uncached_range(&region("chr1:500-600")).unwrap());

        // the two remaining unloaded flanks
        let uncached = tree.get_uncached_range(&tree.covering_range().clone()).unwrap();
        let rendered: Vec<String> = uncached.iter().map(|r| r.region_str()).collect();
        assert_eq!(rendered, vec!["chr1:1-50", "chr1:500-2000"]);
    }

    #[rstest]
    fn test_repeated_insert_is_idempotent(mut tree: IntervalTree<ChromRegion>) {
        let batch = vec![region("chr1:100-200(+)"), region("chr1:150-400(-)")];
        let ranges = vec![region("chr1:50-500")];
        tree.insert(batch.clone(), Some(ranges.clone()), &mut InsertProps::default())
            .unwrap();

        let mut fired = 0;
        {
            let mut props = InsertProps {
                data_callback: Some(Box::new(|_, _| {
                    fired += 1;
                    true
                })),
                ..Default::default()
            };
            tree.insert(batch, Some(ranges), &mut props).unwrap();
        }
        assert_eq!(fired, 0);
    }

    #[rstest]
    fn test_traverse_unloaded_region_fails_without_allow_null(
        mut tree: IntervalTree<ChromRegion>,
    ) {
        let q = region("chr1:100-200");
        let err = tree
            .traverse(&q, &mut TraverseProps::default())
            .unwrap_err();
        assert!(matches!(err, TreeError::DataNotReady(_)));

        let mut props = TraverseProps {
            allow_null: true,
            ..Default::default()
        };
        assert!(tree.traverse(&q, &mut props).unwrap());
    }

    #[rstest]
    fn test_traverse_advances_generation(mut tree: IntervalTree<ChromRegion>) {
        tree.insert(
            vec![region("chr1:100-200(+)")],
            Some(vec![region("chr1:1-2000")]),
            &mut InsertProps::default(),
        )
        .unwrap();
        assert_eq!(tree.current_gen(), 0);
        tree.traverse(&region("chr1:100-200"), &mut TraverseProps::default())
            .unwrap();
        assert_eq!(tree.current_gen(), 1);

        let mut props = TraverseProps {
            do_not_wither: true,
            ..Default::default()
        };
        tree.traverse(&region("chr1:100-200"), &mut props).unwrap();
        assert_eq!(tree.current_gen(), 1);
    }

    #[test]
    fn test_local_only_never_reports_uncached() {
        let config = TreeConfig {
            local_only: true,
            ..TreeConfig::default()
        };
        let mut tree: IntervalTree<ChromRegion> =
            IntervalTree::new(region("chr1:1-2000"), config).unwrap();
        let covering = tree.covering_range().clone();
        assert!(!tree.has_uncached_range(&covering).unwrap());
        assert!(tree.get_uncached_range(&covering).unwrap().is_empty());

        // inserts go straight in; traversal needs no allow_null
        tree.insert(
            vec![region("chr1:100-200(+)")],
            None,
            &mut InsertProps::default(),
        )
        .unwrap();
        let mut seen = 0;
        {
            let mut props = TraverseProps {
                data_callback: Some(Box::new(|_, _| {
                    seen += 1;
                    true
                })),
                ..Default::default()
            };
            tree.traverse(&covering, &mut props).unwrap();
        }
        assert_eq!(seen, 1);
    }

    #[rstest]
    fn test_clear_restores_single_slot(mut tree: IntervalTree<ChromRegion>) {
        tree.insert(
            vec![region("chr1:100-200(+)")],
            Some(vec![region("chr1:1-2000")]),
            &mut InsertProps::default(),
        )
        .unwrap();
        let covering = tree.covering_range().clone();
        assert!(!tree.has_uncached_range(&covering).unwrap());

        tree.clear();
        assert!(tree.has_uncached_range(&covering).unwrap());
        assert_eq!(tree.root().child_count(), 1);
    }

    #[rstest]
    fn test_invalid_range_rejected(tree: IntervalTree<ChromRegion>) {
        assert!(matches!(
            tree.has_uncached_range(&region("chr2:1-100")),
            Err(TreeError::InvalidRange(_))
        ));
        assert!(matches!(
            tree.has_uncached_range(&region("chr1:3000-4000")),
            Err(TreeError::InvalidRange(_))
        ));
    }
}
