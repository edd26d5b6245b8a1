use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("Invalid coordinates: start {start} is not less than end {end}")]
    InvalidCoordinates { start: u32, end: u32 },

    #[error("Error parsing region: {0}")]
    RegionParse(String),

    #[error("Invalid strand symbol: {0}")]
    InvalidStrand(String),

    #[error("Regions do not overlap: {0} vs {1}")]
    NonOverlapping(String, String),

    #[error("Chromosome mismatch: {0} vs {1}")]
    ChromosomeMismatch(String, String),
}
