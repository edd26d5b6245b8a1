//! Core models for the grove project.
//!
//! This crate holds the value types shared across the grove workspace:
//! [`ChromRegion`](models::ChromRegion), the chromosomal interval value used
//! throughout the interval cache, and [`Strand`](models::Strand). Algorithmic
//! crates (e.g. `grove-tree`) build on these models but keep their own
//! data structures.

pub mod errors;
pub mod models;

// re-export for cleaner imports
pub use self::errors::RegionError;
pub use self::models::{ChromRegion, RegionSet, Strand};
