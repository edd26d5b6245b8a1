//! Genome-wide dispatch: one [`IntervalTree`] per chromosome.
//!
//! `GenomeCache` groups batches by chromosome and routes every operation to
//! the per-chromosome tree, creating trees lazily from a chromosome-sizes
//! table. Queries against chromosomes the cache has never seen yield empty
//! results rather than errors.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use grove_core::{ChromRegion, RegionSet};

use crate::entry::TreeEntry;
use crate::errors::{InsertFailure, InsertFailures, TreeError};
use crate::props::{InsertProps, RemoveProps, TraverseProps};
use crate::tree::{IntervalTree, TreeConfig};

/// A cache of interval trees keyed by chromosome.
pub struct GenomeCache<E: TreeEntry> {
    trees: HashMap<String, IntervalTree<E>>,
    chrom_sizes: HashMap<String, u32>,
    config: TreeConfig,
}

impl<E: TreeEntry> GenomeCache<E> {
    pub fn new(
        chrom_sizes: HashMap<String, u32>,
        config: TreeConfig,
    ) -> Result<Self, TreeError> {
        if config.branching_factor <= 2 {
            return Err(TreeError::InvalidConfig(format!(
                "branching factor must be greater than 2, got {}",
                config.branching_factor
            )));
        }
        Ok(GenomeCache {
            trees: HashMap::new(),
            chrom_sizes,
            config,
        })
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = &str> + '_ {
        self.trees.keys().map(|s| s.as_str())
    }

    pub fn tree(&self, chrom: &str) -> Option<&IntervalTree<E>> {
        self.trees.get(chrom)
    }

    pub fn tree_mut(&mut self, chrom: &str) -> Option<&mut IntervalTree<E>> {
        self.trees.get_mut(chrom)
    }

    fn tree_for(&mut self, chrom: &str) -> Result<&mut IntervalTree<E>, TreeError> {
        match self.trees.entry(chrom.to_string()) {
            Entry::Occupied(o) => Ok(o.into_mut()),
            Entry::Vacant(v) => {
                let size = *self
                    .chrom_sizes
                    .get(chrom)
                    .ok_or_else(|| TreeError::UnknownChromosome(chrom.to_string()))?;
                let covering = ChromRegion::new(chrom, 0, size)?;
                log::debug!("creating cache tree for {} over 0-{}", chrom, size);
                Ok(v.insert(IntervalTree::new(covering, self.config.clone())?))
            }
        }
    }

    /// Insert a genome-wide batch: entries are grouped by chromosome and
    /// dispatched to the per-chromosome trees. Failures (including unknown
    /// chromosomes) are collected and reported together.
    pub fn insert(
        &mut self,
        data: Vec<E>,
        props: &mut InsertProps<'_, E>,
    ) -> Result<(), TreeError> {
        let mut by_chrom: HashMap<String, Vec<E>> = HashMap::new();
        for e in data {
            by_chrom.entry(e.chrom().to_string()).or_default().push(e);
        }

        let mut failures: Vec<InsertFailure> = Vec::new();
        for (chrom, batch) in by_chrom {
            let first_three: Vec<String> = batch.iter().take(3).map(|e| e.to_string()).collect();
            let span = batch_span(&chrom, &batch);
            let tree = match self.tree_for(&chrom) {
                Ok(t) => t,
                Err(err) => {
                    failures.push(InsertFailure {
                        range: span,
                        message: err.to_string(),
                        entries: first_three,
                    });
                    continue;
                }
            };
            match tree.insert(batch, None, props) {
                Ok(()) => {}
                Err(TreeError::AggregatedInsert(InsertFailures(mut f))) => {
                    failures.append(&mut f)
                }
                Err(err) => failures.push(InsertFailure {
                    range: span,
                    message: err.to_string(),
                    entries: first_three,
                }),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TreeError::AggregatedInsert(InsertFailures(failures)))
        }
    }

    /// Traverse one chromosome's range. Chromosomes with no tree yield no
    /// callbacks and report success.
    pub fn traverse(
        &mut self,
        range: &ChromRegion,
        props: &mut TraverseProps<'_, E>,
    ) -> Result<bool, TreeError> {
        match self.trees.get_mut(&range.chr) {
            Some(tree) => tree.traverse(range, props),
            None => Ok(true),
        }
    }

    pub fn remove(
        &mut self,
        target: &E,
        props: &mut RemoveProps<'_, E>,
    ) -> Result<(), TreeError> {
        match self.trees.get_mut(target.chrom()) {
            Some(tree) => tree.remove(target, props),
            None => Ok(()),
        }
    }

    /// The sub-ranges of `range` that still need fetching. A known
    /// chromosome without a tree is entirely unfetched; an unknown one
    /// yields nothing.
    pub fn get_uncached_range(
        &self,
        range: &ChromRegion,
    ) -> Result<Vec<ChromRegion>, TreeError> {
        if let Some(tree) = self.trees.get(&range.chr) {
            return tree.get_uncached_range(range);
        }
        match self.chrom_sizes.get(&range.chr) {
            Some(&size) => {
                let limit = ChromRegion::new(range.chr.as_str(), 0, size)?;
                Ok(vec![range.truncate(&limit)?])
            }
            None => Ok(Vec::new()),
        }
    }

    pub fn has_uncached_range(&self, range: &ChromRegion) -> Result<bool, TreeError> {
        if let Some(tree) = self.trees.get(&range.chr) {
            return tree.has_uncached_range(range);
        }
        Ok(self.chrom_sizes.contains_key(&range.chr))
    }

    /// Clear every per-chromosome tree back to a single unloaded slot.
    pub fn clear(&mut self) {
        for tree in self.trees.values_mut() {
            tree.clear();
        }
    }
}

impl GenomeCache<ChromRegion> {
    /// Insert a fetched [`RegionSet`], one sub-batch per chromosome.
    pub fn insert_region_set(
        &mut self,
        regions: RegionSet,
        props: &mut InsertProps<'_, ChromRegion>,
    ) -> Result<(), TreeError> {
        self.insert(regions.regions, props)
    }
}

fn batch_span<E: TreeEntry>(chrom: &str, batch: &[E]) -> ChromRegion {
    let lo = batch.iter().map(|e| e.start()).min().unwrap_or(0);
    let hi = batch.iter().map(|e| e.end()).max().unwrap_or(0);
    ChromRegion::new(chrom, lo, hi.max(lo.saturating_add(1))).unwrap_or_else(|_| ChromRegion {
        chr: chrom.to_string(),
        start: 0,
        end: 1,
        strand: None,
        name: None,
    })
}
