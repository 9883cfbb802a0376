//! Analysis modules.
//!
//! Aggregation of analyzer findings into evaluation-level results.

pub mod aggregator;

pub use aggregator::*;
