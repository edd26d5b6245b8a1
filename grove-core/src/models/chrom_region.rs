use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RegionError;
use crate::models::strand::Strand;

/// A chromosomal region: a half-open interval `[start, end)` on a named
/// chromosome, with optional strand and name.
///
/// Coordinates are `u32`, matching typical genomic coordinate ranges.
/// Regions parse from and render to browser-style strings:
///
/// ```
/// use grove_core::models::{ChromRegion, Strand};
///
/// let r: ChromRegion = "chr1:5-150(-)".parse().unwrap();
/// assert_eq!(r.chr, "chr1");
/// assert_eq!(r.start, 5);
/// assert_eq!(r.end, 150);
/// assert_eq!(r.strand, Some(Strand::Reverse));
/// assert_eq!(r.to_string(), "chr1:5-150(-)");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromRegion {
    pub chr: String,
    pub start: u32,
    pub end: u32,
    pub strand: Option<Strand>,

    pub name: Option<String>,
}

impl ChromRegion {
    /// Create a region, validating `start < end`.
    pub fn new(chr: impl Into<String>, start: u32, end: u32) -> Result<Self, RegionError> {
        if start >= end {
            return Err(RegionError::InvalidCoordinates { start, end });
        }
        Ok(ChromRegion {
            chr: chr.into(),
            start,
            end,
            strand: None,
            name: None,
        })
    }

    /// Create a single-base region at `pos`.
    pub fn point(chr: impl Into<String>, pos: u32) -> Result<Self, RegionError> {
        Self::new(chr, pos, pos.saturating_add(1))
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = Some(strand);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of bases covered by this region.
    pub fn width(&self) -> u32 {
        self.end - self.start
    }

    /// Total order: chromosome, then start ascending, end ascending, then
    /// strand (unstranded first, then `+`, then `-`).
    pub fn compare(a: &ChromRegion, b: &ChromRegion) -> Ordering {
        a.chr
            .cmp(&b.chr)
            .then(a.start.cmp(&b.start))
            .then(a.end.cmp(&b.end))
            .then(a.strand.cmp(&b.strand))
    }

    /// Structural equality: chromosome, coordinates and strand all match.
    pub fn equal_to(&self, other: &ChromRegion) -> bool {
        self.chr == other.chr
            && self.start == other.start
            && self.end == other.end
            && self.strand == other.strand
    }

    /// Whether two regions share at least one base. Strand is ignored.
    pub fn overlaps(&self, other: &ChromRegion) -> bool {
        self.chr == other.chr && self.start < other.end && self.end > other.start
    }

    /// Whether two regions overlap or are directly adjacent.
    pub fn touches(&self, other: &ChromRegion) -> bool {
        self.chr == other.chr && self.start <= other.end && self.end >= other.start
    }

    /// The overlapping part of the two regions, keeping this region's strand
    /// and name, or `None` when they do not overlap.
    pub fn intersect(&self, other: &ChromRegion) -> Option<ChromRegion> {
        if !self.overlaps(other) {
            return None;
        }
        let mut out = self.clone();
        out.start = self.start.max(other.start);
        out.end = self.end.min(other.end);
        Some(out)
    }

    /// Clamp this region into `limit`, failing when they do not overlap.
    pub fn truncate(&self, limit: &ChromRegion) -> Result<ChromRegion, RegionError> {
        if self.chr != limit.chr {
            return Err(RegionError::ChromosomeMismatch(
                self.chr.clone(),
                limit.chr.clone(),
            ));
        }
        self.intersect(limit)
            .ok_or_else(|| RegionError::NonOverlapping(self.to_string(), limit.to_string()))
    }

    /// Expand this region to cover `other` when the two touch. Returns
    /// whether the expansion happened.
    pub fn assimilate(&mut self, other: &ChromRegion) -> bool {
        if !self.touches(other) {
            return false;
        }
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
        true
    }

    /// Absorb a direct successor: when `other` begins exactly where this
    /// region ends, extend the end. Returns whether the absorption happened.
    pub fn concat(&mut self, other: &ChromRegion) -> bool {
        if self.chr != other.chr || other.start != self.end {
            return false;
        }
        self.end = other.end;
        true
    }

    /// The parts of this region not covered by `other` (0, 1 or 2 pieces).
    pub fn get_minus(&self, other: &ChromRegion) -> Vec<ChromRegion> {
        if !self.overlaps(other) {
            return vec![self.clone()];
        }
        let mut out = Vec::new();
        if self.start < other.start {
            let mut left = self.clone();
            left.end = other.start;
            out.push(left);
        }
        if self.end > other.end {
            let mut right = self.clone();
            right.start = other.end;
            out.push(right);
        }
        out
    }

    /// The region without strand decoration, e.g. `chr1:5-150`.
    pub fn region_str(&self) -> String {
        format!("{}:{}-{}", self.chr, self.start, self.end)
    }
}

impl PartialEq for ChromRegion {
    fn eq(&self, other: &Self) -> bool {
        self.equal_to(other)
    }
}

impl Eq for ChromRegion {}

impl PartialOrd for ChromRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChromRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        ChromRegion::compare(self, other)
    }
}

impl Display for ChromRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strand {
            Some(s) => write!(f, "{}({})", self.region_str(), s),
            None => write!(f, "{}", self.region_str()),
        }
    }
}

impl FromStr for ChromRegion {
    type Err = RegionError;

    /// Parse browser-style region strings: `chr1:5-150`, `chr1:5-150(-)`,
    /// `chr1:5` (single base) and coordinates with thousands separators
    /// (`chr1:5,000-6,000`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (chr, rest) = s
            .split_once(':')
            .ok_or_else(|| RegionError::RegionParse(s.to_string()))?;
        if chr.is_empty() {
            return Err(RegionError::RegionParse(s.to_string()));
        }

        let (coords, strand) = match rest.split_once('(') {
            Some((coords, tail)) => {
                let sym = tail
                    .strip_suffix(')')
                    .ok_or_else(|| RegionError::RegionParse(s.to_string()))?;
                (coords.trim(), Some(sym.parse::<Strand>()?))
            }
            None => (rest.trim(), None),
        };

        let parse_coord = |c: &str| -> Result<u32, RegionError> {
            c.replace(',', "")
                .parse::<u32>()
                .map_err(|_| RegionError::RegionParse(s.to_string()))
        };

        let mut region = match coords.split_once('-') {
            Some((a, b)) => ChromRegion::new(chr, parse_coord(a)?, parse_coord(b)?)?,
            None => ChromRegion::point(chr, parse_coord(coords)?)?,
        };
        region.strand = strand;
        Ok(region)
    }
}
