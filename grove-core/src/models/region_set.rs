use std::collections::HashMap;

use crate::models::chrom_region::ChromRegion;

/// An ordered collection of regions, typically one fetched batch.
///
/// A `RegionSet` keeps insertion order until [`sort`](Self::sort) is called
/// and knows how to split itself per chromosome for genome-wide consumers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSet {
    pub regions: Vec<ChromRegion>,
}

impl RegionSet {
    pub fn new(regions: Vec<ChromRegion>) -> Self {
        RegionSet { regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChromRegion> {
        self.regions.iter()
    }

    /// Sort by the region total order (chromosome, start, end, strand).
    pub fn sort(&mut self) {
        self.regions.sort();
    }

    /// Split the set into per-chromosome sets, preserving relative order.
    pub fn split_by_chromosome(self) -> HashMap<String, RegionSet> {
        let mut out: HashMap<String, RegionSet> = HashMap::new();
        for region in self.regions {
            out.entry(region.chr.clone())
                .or_default()
                .regions
                .push(region);
        }
        out
    }

    /// The minimal region covering every member on `chrom`, if any.
    pub fn span(&self, chrom: &str) -> Option<ChromRegion> {
        let mut span: Option<ChromRegion> = None;
        for region in self.regions.iter().filter(|r| r.chr == chrom) {
            match span.as_mut() {
                None => {
                    let mut s = region.clone();
                    s.strand = None;
                    s.name = None;
                    span = Some(s);
                }
                Some(s) => {
                    s.start = s.start.min(region.start);
                    s.end = s.end.max(region.end);
                }
            }
        }
        span
    }
}

impl From<Vec<ChromRegion>> for RegionSet {
    fn from(regions: Vec<ChromRegion>) -> Self {
        RegionSet { regions }
    }
}

impl FromIterator<ChromRegion> for RegionSet {
    fn from_iter<I: IntoIterator<Item = ChromRegion>>(iter: I) -> Self {
        RegionSet {
            regions: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RegionSet {
    type Item = ChromRegion;
    type IntoIter = std::vec::IntoIter<ChromRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(s: &str) -> ChromRegion {
        s.parse().unwrap()
    }

    #[test]
    fn test_sort_and_iter() {
        let mut rs = RegionSet::from(vec![
            r("chr2:100-200"),
            r("chr1:300-400"),
            r("chr1:100-200"),
        ]);
        rs.sort();
        let rendered: Vec<String> = rs.iter().map(|x| x.region_str()).collect();
        assert_eq!(
            rendered,
            vec!["chr1:100-200", "chr1:300-400", "chr2:100-200"]
        );
    }

    #[test]
    fn test_split_by_chromosome() {
        let rs = RegionSet::from(vec![
            r("chr1:100-200"),
            r("chr2:50-80"),
            r("chr1:300-400"),
        ]);
        let split = rs.split_by_chromosome();
        assert_eq!(split.len(), 2);
        assert_eq!(split["chr1"].len(), 2);
        assert_eq!(split["chr2"].len(), 1);
        // relative order kept
        assert_eq!(split["chr1"].regions[0].start, 100);
        assert_eq!(split["chr1"].regions[1].start, 300);
    }

    #[test]
    fn test_span() {
        let rs = RegionSet::from(vec![
            r("chr1:300-400(+)"),
            r("chr1:100-250(-)"),
            r("chr2:1-10"),
        ]);
        let span = rs.span("chr1").unwrap();
        assert_eq!(span.region_str(), "chr1:100-400");
        assert_eq!(span.strand, None);
        assert!(rs.span("chrX").is_none());
    }
}
