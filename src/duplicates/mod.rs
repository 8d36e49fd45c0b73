//! Duplicate aggregation.
//!
//! This module provides:
//! - [`HashGroups`], the fingerprint to item-id grouping
//! - [`merge`], the pure merge of two groupings
//! - [`DuplicateAggregator`], the cross-batch accumulator used by scans

pub mod groups;

pub use groups::{merge, DuplicateAggregator, GroupingStats, HashGroups};
