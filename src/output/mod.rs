//! Report assembly and formatters.
//!
//! This module provides:
//! - [`report`]: the paginated [`ReportPage`] built from the cached result
//! - [`text`]: human-readable rendering with optional color
//! - [`json`]: machine-readable JSON for scripting and automation

pub mod json;
pub mod report;
pub mod text;

pub use json::{JsonOutput, JsonOutputError};
pub use report::{GroupRow, LibraryStats, MemberRow, Pagination, ReportBuilder, ReportPage};
pub use text::TextOutput;
