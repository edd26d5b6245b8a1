pub mod chrom_region;
pub mod region_set;
pub mod strand;

// re-export for cleaner imports
pub use self::chrom_region::ChromRegion;
pub use self::region_set::RegionSet;
pub use self::strand::Strand;
