use std::cmp::Ordering;
use std::fmt::{Debug, Display};

use grove_core::{ChromRegion, Strand};

use crate::coords::CoordRange;

/// The contract an interval value must satisfy to be stored in the tree.
///
/// The tree itself is chromosome-agnostic: within one
/// [`IntervalTree`](crate::IntervalTree) only `start`/`end`/`strand` matter,
/// and the comparator ignores `chrom`. The chromosome accessor exists so
/// [`GenomeCache`](crate::GenomeCache) can group batches per chromosome.
pub trait TreeEntry: Debug + Display {
    fn chrom(&self) -> &str;

    fn start(&self) -> u32;

    fn end(&self) -> u32;

    fn strand(&self) -> Option<Strand> {
        None
    }

    /// Structural equality beyond coordinates. The default compares
    /// coordinates and strand; implementors with payloads should extend it.
    fn equal_to(&self, other: &Self) -> bool {
        self.start() == other.start()
            && self.end() == other.end()
            && self.strand() == other.strand()
    }

    fn range(&self) -> CoordRange {
        CoordRange::new(self.start(), self.end())
    }

    fn overlaps_range(&self, range: &CoordRange) -> bool {
        self.start() < range.end && self.end() > range.start
    }
}

impl TreeEntry for ChromRegion {
    fn chrom(&self) -> &str {
        &self.chr
    }

    fn start(&self) -> u32 {
        self.start
    }

    fn end(&self) -> u32 {
        self.end
    }

    fn strand(&self) -> Option<Strand> {
        self.strand
    }

    fn equal_to(&self, other: &Self) -> bool {
        ChromRegion::equal_to(self, other)
    }
}

fn strand_rank(strand: Option<Strand>) -> u8 {
    match strand {
        None => 0,
        Some(Strand::Forward) => 1,
        Some(Strand::Reverse) => 2,
    }
}

/// The comparator every ordered list in the tree uses: start ascending, then
/// end ascending, then unstranded before `+` before `-`.
pub fn cmp_entries<E: TreeEntry + ?Sized>(a: &E, b: &E) -> Ordering {
    a.start()
        .cmp(&b.start())
        .then(a.end().cmp(&b.end()))
        .then(strand_rank(a.strand()).cmp(&strand_rank(b.strand())))
}
