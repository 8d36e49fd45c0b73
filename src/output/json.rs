//! JSON output for report pages and status snapshots.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "status": { "state": "complete", "total": 5, "processed": 5, ... },
//!   "complete": true,
//!   "stats": { "total_sets": 1, "total_files": 3, "total_size": 3072, "redundant_copies": 2 },
//!   "pagination": { "current_page": 1, "per_page": 20, "total_pages": 1, ... },
//!   "groups": [
//!     {
//!       "hash": "abc123...",
//!       "members": [{ "id": 1, "path": "/media/a.jpg", "size": 1024, "referenced": true, "label": "attached" }],
//!       "orphan_ids": [5],
//!       "delete_token": "..."
//!     }
//!   ],
//!   "exit_code": 0,
//!   "exit_code_name": "MD000"
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::error::ExitCode;
use crate::output::report::ReportPage;
use crate::session::ScanStatus;

/// A report page plus the exit code of the run that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    #[serde(flatten)]
    pub page: &'a ReportPage,
    pub exit_code: i32,
    pub exit_code_name: &'static str,
}

impl<'a> JsonOutput<'a> {
    #[must_use]
    pub fn new(page: &'a ReportPage, exit_code: ExitCode) -> Self {
        Self {
            page,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
        }
    }

    /// Serialize to compact JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(writer, self, pretty)
    }
}

/// Write a status snapshot as JSON.
pub fn write_status<W: Write>(
    writer: &mut W,
    status: &ScanStatus,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    write_json(writer, status, pretty)
}

fn write_json<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::report::{LibraryStats, Pagination};
    use crate::session::ScanState;

    fn page() -> ReportPage {
        ReportPage {
            status: ScanStatus {
                state: ScanState::Complete,
                generation: None,
                total: 3,
                processed: 3,
                percentage: 100.0,
                next_offset: None,
                last_full_scan: None,
                cached_groups: 0,
            },
            complete: true,
            stats: LibraryStats::default(),
            pagination: Pagination::new(0, 20, 1),
            groups: Vec::new(),
        }
    }

    #[test]
    fn test_page_fields_are_flattened() {
        let page = page();
        let json = JsonOutput::new(&page, ExitCode::NoDuplicates).to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["status"]["state"], "complete");
        assert_eq!(parsed["pagination"]["total_pages"], 0);
        assert_eq!(parsed["exit_code"], 2);
        assert_eq!(parsed["exit_code_name"], "MD002");
        assert!(parsed["groups"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_write_to_appends_newline() {
        let page = page();
        let mut buffer = Vec::new();
        JsonOutput::new(&page, ExitCode::Success)
            .write_to(&mut buffer, true)
            .unwrap();
        let written = String::from_utf8(buffer).unwrap();
        assert!(written.starts_with('{'));
        assert!(written.ends_with("}\n"));
        assert!(written.contains('\n'));
    }

    #[test]
    fn test_write_status() {
        let mut buffer = Vec::new();
        write_status(&mut buffer, &page().status, false).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["processed"], 3);
    }
}
