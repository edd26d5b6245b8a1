//! Sparse, generational interval-tree caching for genomic browsing workloads.
//!
//! This crate provides [`IntervalTree`], an in-memory index over a single
//! chromosome's coordinate space, and [`GenomeCache`], its per-chromosome
//! dispatcher. The coordinate space is partitioned into contiguous,
//! non-overlapping bins whose boundaries follow the start points of the
//! intervals actually inserted. The structure acts as a *sectionally loaded*
//! cache: any part of the domain is either loaded (holding data or known to
//! be empty) or unloaded (not yet fetched from the upstream source).
//!
//! ## Features
//!
//! - **Sparse loading**: [`IntervalTree::get_uncached_range`] reports exactly
//!   which sub-ranges still need fetching, so repeated inserts for the same
//!   region are idempotent
//! - **Single-visit traversal**: every stored interval overlapping a query is
//!   handed to the data callback exactly once, even when it spans many bins
//! - **Self-balancing**: the index is a B+-tree variant that re-balances
//!   after inserts, removals and cache expiry
//! - **Generational expiry**: untouched subtrees *wither* back to the
//!   unloaded state after a configurable number of traversals
//!
//! ## Quick Start
//!
//! ```rust
//! use grove_core::ChromRegion;
//! use grove_tree::{IntervalTree, InsertProps, TraverseProps, TreeConfig};
//!
//! # fn main() -> Result<(), grove_tree::TreeError> {
//! let covering: ChromRegion = "chr1:1-2000".parse().unwrap();
//! let mut tree: IntervalTree<ChromRegion> =
//!     IntervalTree::new(covering, TreeConfig::default())?;
//!
//! // load a batch fetched for chr1:1-500
//! let batch: Vec<ChromRegion> = vec![
//!     "chr1:100-200(+)".parse().unwrap(),
//!     "chr1:150-400(-)".parse().unwrap(),
//! ];
//! let range: ChromRegion = "chr1:1-500".parse().unwrap();
//! tree.insert(batch, Some(vec![range]), &mut InsertProps::default())?;
//!
//! // everything under chr1:1-500 is now cached
//! let q: ChromRegion = "chr1:120-300".parse().unwrap();
//! assert!(!tree.has_uncached_range(&q)?);
//!
//! // collect the intervals overlapping the query
//! let mut seen = Vec::new();
//! let mut props: TraverseProps<'_, ChromRegion> = TraverseProps::default();
//! props.data_callback = Some(Box::new(|entry, _range| {
//!     seen.push(entry.to_string());
//!     true
//! }));
//! tree.traverse(&q, &mut props)?;
//! drop(props);
//! assert_eq!(seen, vec!["chr1:100-200(+)", "chr1:150-400(-)"]);
//! # Ok(())
//! # }
//! ```

pub mod coords;
pub mod data_bin;
pub mod entry;
pub mod errors;
pub mod genome;
pub mod node;
pub mod props;
pub mod slot;
pub mod tree;
mod wither;

// re-exports
pub use self::coords::CoordRange;
pub use self::data_bin::DataBin;
pub use self::entry::TreeEntry;
pub use self::errors::{InsertFailure, TreeError};
pub use self::genome::GenomeCache;
pub use self::node::InnerNode;
pub use self::props::{InsertProps, RemoveProps, TraverseProps};
pub use self::slot::{Filler, Slot};
pub use self::tree::{IntervalTree, TreeConfig};

/// Default maximum number of children per inner node.
pub const DEFAULT_BRANCHING_FACTOR: usize = 50;

/// The generation counter wraps at this value.
pub const MAX_GENERATION: u64 = (1 << 53) - 100;
