//! Filter module: line matching for reverse reads.

pub mod engine;

pub use engine::{FilterError, FilterStats, LineFilter};
