//! Scan lifecycle: progress, status and the coordinating state machine.
//!
//! # Architecture
//!
//! * [`data`]: Serializable progress record, scan states and status snapshots.
//! * [`io`]: Checksummed persistence of progress and the last-scan timestamp.
//! * [`coordinator`]: [`ScanCoordinator`], the start/advance/stop/clear state machine.

pub mod coordinator;
pub mod data;
pub mod io;

pub use coordinator::{BatchReport, ScanCoordinator, ScanError, ScanSettings};
pub use data::{
    ScanProgress, ScanState, ScanStatus, LAST_SCAN_OPTION, PROGRESS_KEY, PROGRESS_VERSION,
};
