//! Data structures for scan progress and status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duplicates::{DuplicateAggregator, HashGroups};

/// Current version of the persisted progress format.
pub const PROGRESS_VERSION: u32 = 1;

/// Ephemeral key holding the in-flight scan progress.
pub const PROGRESS_KEY: &str = "mediadupe_scan_progress";

/// Option key holding the completion time of the last full scan.
pub const LAST_SCAN_OPTION: &str = "mediadupe_last_full_scan";

/// Persisted state of one scan generation.
///
/// The aggregator keeps every fingerprint seen so far, singletons included,
/// and the whole record is re-encoded and checksummed on each save. Saving
/// therefore costs time and space proportional to `processed`, not to the
/// page size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Format version.
    pub version: u32,
    /// Identifier of this scan generation.
    pub generation: String,
    /// Collection size when the generation started.
    pub total: usize,
    /// Items read so far. Never exceeds `total`.
    pub processed: usize,
    /// Fingerprints seen so far, including singletons.
    pub aggregator: DuplicateAggregator,
    /// Set by `stop()`, cleared on resume.
    pub stopped: bool,
    /// When the generation started.
    pub started_at: DateTime<Utc>,
    /// When progress was last written.
    pub updated_at: DateTime<Utc>,
}

impl ScanProgress {
    /// Start a new generation over `total` items.
    #[must_use]
    pub fn new(total: usize) -> Self {
        let now = Utc::now();
        Self {
            version: PROGRESS_VERSION,
            generation: now.format("%Y%m%dT%H%M%S%.6fZ").to_string(),
            total,
            processed: 0,
            aggregator: DuplicateAggregator::new(),
            stopped: false,
            started_at: now,
            updated_at: now,
        }
    }

    /// Offset of the next batch.
    #[must_use]
    pub fn next_offset(&self) -> usize {
        self.processed
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.processed >= self.total
    }

    /// Record `count` more items as read, clamped to `total`.
    pub fn record(&mut self, count: usize) {
        self.processed = self.processed.saturating_add(count).min(self.total);
        self.updated_at = Utc::now();
    }

    /// Completion percentage, 0.0 to 100.0.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        percentage(self.processed, self.total)
    }

    /// Duplicate groups found so far.
    #[must_use]
    pub fn duplicates(&self) -> HashGroups {
        self.aggregator.duplicates()
    }

    /// Current state implied by this progress record.
    #[must_use]
    pub fn state(&self) -> ScanState {
        if self.stopped {
            ScanState::Stopped
        } else {
            ScanState::Running
        }
    }
}

pub(crate) fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64 * 100.0).min(100.0)
}

/// Lifecycle state of the scan engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No scan has run, or progress was cleared.
    None,
    /// Progress exists and is being advanced.
    Running,
    /// Progress exists but was halted by `stop()`.
    Stopped,
    /// The last generation ran to completion.
    Complete,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot returned by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStatus {
    pub state: ScanState,
    /// Generation in flight, if any.
    pub generation: Option<String>,
    pub total: usize,
    pub processed: usize,
    pub percentage: f64,
    /// Offset the next `advance` should use. `None` when nothing is in flight.
    pub next_offset: Option<usize>,
    /// Completion time of the last full scan.
    pub last_full_scan: Option<DateTime<Utc>>,
    /// Number of duplicate groups in the result cache.
    pub cached_groups: usize,
}

impl ScanStatus {
    pub(crate) fn from_progress(
        progress: &ScanProgress,
        last_full_scan: Option<DateTime<Utc>>,
        cached_groups: usize,
    ) -> Self {
        Self {
            state: progress.state(),
            generation: Some(progress.generation.clone()),
            total: progress.total,
            processed: progress.processed,
            percentage: progress.percentage(),
            next_offset: Some(progress.next_offset()),
            last_full_scan,
            cached_groups,
        }
    }

    pub(crate) fn completed(
        progress: &ScanProgress,
        at: DateTime<Utc>,
        cached_groups: usize,
    ) -> Self {
        Self {
            state: ScanState::Complete,
            generation: Some(progress.generation.clone()),
            total: progress.total,
            processed: progress.processed,
            percentage: 100.0,
            next_offset: None,
            last_full_scan: Some(at),
            cached_groups,
        }
    }

    pub(crate) fn idle(last_full_scan: Option<DateTime<Utc>>, cached_groups: usize) -> Self {
        let state = if last_full_scan.is_some() {
            ScanState::Complete
        } else {
            ScanState::None
        };
        Self {
            state,
            generation: None,
            total: 0,
            processed: 0,
            percentage: if state == ScanState::Complete { 100.0 } else { 0.0 },
            next_offset: None,
            last_full_scan,
            cached_groups,
        }
    }

    /// Whether `advance` has more work to do.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == ScanState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_clamps_to_total() {
        let mut progress = ScanProgress::new(5);
        progress.record(2);
        assert_eq!(progress.processed, 2);
        progress.record(10);
        assert_eq!(progress.processed, 5);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_percentage() {
        let mut progress = ScanProgress::new(4);
        assert_eq!(progress.percentage(), 0.0);
        progress.record(1);
        assert!((progress.percentage() - 25.0).abs() < f64::EPSILON);
        assert_eq!(percentage(0, 0), 100.0);
    }

    #[test]
    fn test_state_follows_stopped_flag() {
        let mut progress = ScanProgress::new(3);
        assert_eq!(progress.state(), ScanState::Running);
        progress.stopped = true;
        assert_eq!(progress.state(), ScanState::Stopped);
    }

    #[test]
    fn test_idle_status() {
        assert_eq!(ScanStatus::idle(None, 0).state, ScanState::None);
        let done = ScanStatus::idle(Some(Utc::now()), 3);
        assert_eq!(done.state, ScanState::Complete);
        assert_eq!(done.cached_groups, 3);
        assert!(done.next_offset.is_none());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ScanState::Stopped).unwrap(), "\"stopped\"");
        assert_eq!(ScanState::Complete.to_string(), "complete");
    }
}
