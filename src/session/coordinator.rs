//! The scan state machine.
//!
//! # Overview
//!
//! [`ScanCoordinator`] drives a scan generation one bounded batch at a time:
//!
//! ```text
//! None ──start──▶ Running ──advance*──▶ Complete
//!                   │   ▲
//!                 stop  start(resume)
//!                   ▼   │
//!                  Stopped
//! ```
//!
//! `clear()` returns to `None` from any state. The coordinator owns no
//! threads or timers; `advance` is a step function and [`ScanCoordinator::run`]
//! is one possible driver for it.
//!
//! Every transition requires [`Capability::ManageScans`]. A coordinator acts
//! with all capabilities unless narrowed with
//! [`ScanCoordinator::with_capabilities`]; a refused call changes nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::actions::guard::{Capabilities, Capability};
use crate::cache::{CachedResult, FingerprintStore, ResultCache};
use crate::progress::ProgressCallback;
use crate::scanner::{BatchOutcome, BatchProcessor};
use crate::session::data::{ScanProgress, ScanState, ScanStatus};
use crate::session::io::{self, ProgressSlot};
use crate::store::{
    EphemeralStore, ItemCatalog, MediaLibrary, MetaStore, OptionStore, StoreError, StoreResult,
};

/// Errors raised by scan lifecycle operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// `advance` was called with no scan in progress.
    #[error("no scan in progress; start a scan first")]
    NotInitialized,

    /// `stop` was called with no scan in progress.
    #[error("no scan in progress to stop")]
    NothingToStop,

    /// `advance` was called on a stopped scan.
    #[error("the scan is stopped; resume it before advancing")]
    Stopped,

    /// The caller may not manage scans.
    #[error("permission denied: missing capability {0}")]
    PermissionDenied(Capability),

    /// The configured page size is zero.
    #[error("page size must be greater than zero")]
    InvalidPageSize,

    /// A backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScanError {
    /// Whether the caller can recover by issuing another lifecycle call.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotInitialized | Self::NothingToStop | Self::Stopped)
    }
}

/// Tunables for a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Items read per `advance` call.
    pub page_size: usize,
    /// Lifetime of in-flight progress.
    pub progress_ttl: Duration,
    /// Lifetime of the cached result.
    pub result_ttl: Duration,
    /// Concurrent hashing threads within one batch.
    pub io_threads: usize,
    /// Recompute fingerprints whose file size or mtime changed.
    pub validate_metadata: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            progress_ttl: Duration::from_secs(15 * 60),
            result_ttl: Duration::from_secs(24 * 60 * 60),
            io_threads: 4,
            validate_metadata: false,
        }
    }
}

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Offset the batch was read from.
    pub offset: usize,
    /// What the batch did.
    pub outcome: BatchOutcome,
    /// Status after the batch was folded in.
    pub status: ScanStatus,
}

impl BatchReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.state == ScanState::Complete
    }
}

/// Drives incremental, resumable duplicate scans.
pub struct ScanCoordinator {
    catalog: Arc<dyn ItemCatalog>,
    options: Arc<dyn OptionStore>,
    processor: BatchProcessor,
    progress: ProgressSlot,
    results: ResultCache,
    settings: ScanSettings,
    capabilities: Capabilities,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("processor", &self.processor)
            .field("progress", &self.progress)
            .field("results", &self.results)
            .field("settings", &self.settings)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl ScanCoordinator {
    /// Create a coordinator backed by a single library.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidPageSize`] if `settings.page_size` is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use mediadupe::session::{ScanCoordinator, ScanSettings, ScanState};
    /// use mediadupe::store::MemoryStore;
    ///
    /// let store = Arc::new(MemoryStore::new());
    /// let coordinator = ScanCoordinator::new(store, ScanSettings::default()).unwrap();
    /// let status = coordinator.start(false).unwrap();
    /// // An empty collection completes immediately
    /// assert_eq!(status.state, ScanState::Complete);
    /// ```
    pub fn new<L>(library: Arc<L>, settings: ScanSettings) -> Result<Self, ScanError>
    where
        L: MediaLibrary + 'static,
    {
        Self::from_parts(
            library.clone(),
            library.clone(),
            library.clone(),
            library,
            settings,
        )
    }

    /// Create a coordinator from individual collaborators.
    pub fn from_parts(
        catalog: Arc<dyn ItemCatalog>,
        meta: Arc<dyn MetaStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        options: Arc<dyn OptionStore>,
        settings: ScanSettings,
    ) -> Result<Self, ScanError> {
        if settings.page_size == 0 {
            return Err(ScanError::InvalidPageSize);
        }

        let fingerprints =
            Arc::new(FingerprintStore::new(meta).with_validation(settings.validate_metadata));
        let processor = BatchProcessor::new(catalog.clone(), fingerprints)
            .with_io_threads(settings.io_threads);

        Ok(Self {
            catalog,
            options,
            processor,
            progress: ProgressSlot::new(ephemeral.clone(), settings.progress_ttl),
            results: ResultCache::new(ephemeral, settings.result_ttl),
            settings,
            capabilities: Capabilities::all(),
        })
    }

    /// Restrict lifecycle calls to what `capabilities` allows.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn authorize(&self) -> Result<(), ScanError> {
        if self.capabilities.allows(Capability::ManageScans) {
            Ok(())
        } else {
            log::warn!("Rejected scan request: permission denied");
            Err(ScanError::PermissionDenied(Capability::ManageScans))
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// The cached-result handle shared with delete operations.
    #[must_use]
    pub fn result_cache(&self) -> &ResultCache {
        &self.results
    }

    #[must_use]
    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    /// Start a scan, or resume the one in flight.
    ///
    /// With `resume`, an existing generation that has read at least one item
    /// continues where it left off. Otherwise progress and the cached result
    /// are discarded and a new generation starts over the current collection
    /// size. The last full scan time is kept until the new one completes.
    pub fn start(&self, resume: bool) -> Result<ScanStatus, ScanError> {
        self.authorize()?;
        if resume {
            match self.progress.load()? {
                Some(mut progress) if progress.processed > 0 => {
                    progress.stopped = false;
                    progress.updated_at = Utc::now();
                    self.progress.save(&progress)?;
                    log::info!(
                        "Resuming scan {} at {}/{}",
                        progress.generation,
                        progress.processed,
                        progress.total
                    );
                    return self.snapshot(&progress);
                }
                Some(_) => log::debug!("Nothing processed yet, starting over"),
                None => log::info!("No scan to resume, starting a new one"),
            }
        }

        self.progress.clear()?;
        self.results.invalidate()?;
        let total = self.catalog.count_items()?;
        let progress = ScanProgress::new(total);

        if total == 0 {
            log::info!("Collection is empty");
            return Ok(self.finish(progress)?);
        }

        self.progress.save(&progress)?;
        log::info!("Started scan {} over {} item(s)", progress.generation, total);
        self.snapshot(&progress)
    }

    /// Process the batch at `offset` and fold it into the current generation.
    ///
    /// # Errors
    ///
    /// * [`ScanError::PermissionDenied`] without [`Capability::ManageScans`].
    /// * [`ScanError::NotInitialized`] when no scan is in flight.
    /// * [`ScanError::Stopped`] when the scan was stopped and not resumed.
    /// * [`ScanError::Store`] when reading items or persisting state fails.
    ///   Progress is untouched in that case, so the call can be retried.
    pub fn advance(&self, offset: usize) -> Result<BatchReport, ScanError> {
        self.authorize()?;
        let mut progress = self.progress.load()?.ok_or(ScanError::NotInitialized)?;
        if progress.stopped {
            return Err(ScanError::Stopped);
        }
        if offset != progress.next_offset() {
            log::warn!(
                "Batch offset {} differs from progress {}; items may be counted twice",
                offset,
                progress.next_offset()
            );
        }

        let outcome = self.processor.process_batch(offset, self.settings.page_size)?;
        progress.aggregator.fold(&outcome.partial_groups);
        progress.record(outcome.processed_count);

        if outcome.processed_count == 0 && !progress.is_finished() {
            log::warn!(
                "Collection shrank below {} item(s) during the scan, finishing at {}",
                progress.total,
                progress.processed
            );
            progress.total = progress.processed;
        }

        let status = if progress.is_finished() {
            self.finish(progress)?
        } else {
            self.progress.save(&progress)?;
            self.save_partial(&progress);
            self.snapshot(&progress)?
        };

        Ok(BatchReport {
            offset,
            outcome,
            status,
        })
    }

    /// Halt the scan at the current batch boundary, keeping its progress.
    pub fn stop(&self) -> Result<ScanStatus, ScanError> {
        self.authorize()?;
        let mut progress = self.progress.load()?.ok_or(ScanError::NothingToStop)?;

        let duplicates = progress.duplicates();
        if !duplicates.is_empty() {
            self.results
                .save(&CachedResult::new(progress.generation.clone(), duplicates, false))?;
        }

        progress.stopped = true;
        progress.updated_at = Utc::now();
        self.progress.save(&progress)?;
        log::info!(
            "Stopped scan {} at {}/{}",
            progress.generation,
            progress.processed,
            progress.total
        );
        self.snapshot(&progress)
    }

    /// Forget progress, the cached result and the last-scan timestamp.
    pub fn clear(&self) -> Result<(), ScanError> {
        self.authorize()?;
        self.progress.clear()?;
        self.results.invalidate()?;
        io::clear_last_full_scan(self.options.as_ref())?;
        log::info!("Cleared scan state");
        Ok(())
    }

    /// Current state without side effects.
    pub fn status(&self) -> Result<ScanStatus, ScanError> {
        match self.progress.load()? {
            Some(progress) => self.snapshot(&progress),
            None => Ok(ScanStatus::idle(
                io::load_last_full_scan(self.options.as_ref())?,
                self.cached_groups()?,
            )),
        }
    }

    /// The cached grouping, complete or partial.
    pub fn results(&self) -> Result<Option<CachedResult>, ScanError> {
        Ok(self.results.load()?)
    }

    /// Advance the scan in flight until it completes.
    ///
    /// `shutdown` is checked between batches; once set, the scan is stopped
    /// and the stopped status is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Stopped`] if the scan was stopped and not resumed,
    /// [`ScanError::NotInitialized`] if nothing is in flight, or the first
    /// error raised by a batch.
    pub fn run(
        &self,
        shutdown: Option<&AtomicBool>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<ScanStatus, ScanError> {
        let mut status = self.status()?;
        match status.state {
            ScanState::Running => {}
            ScanState::Stopped => return Err(ScanError::Stopped),
            ScanState::None | ScanState::Complete => return Err(ScanError::NotInitialized),
        }

        if let Some(cb) = progress {
            cb.on_scan_start(status.total, status.processed);
        }

        while let Some(offset) = status.next_offset.filter(|_| status.is_running()) {
            if shutdown.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                log::info!("Shutdown requested, stopping at offset {}", offset);
                if let Some(cb) = progress {
                    cb.on_message("stopping");
                }
                status = self.stop()?;
                break;
            }

            let report = self.advance(offset)?;
            if let Some(cb) = progress {
                cb.on_batch(&report);
            }
            status = report.status;
        }

        if let Some(cb) = progress {
            cb.on_scan_end(&status);
        }
        Ok(status)
    }

    fn finish(&self, progress: ScanProgress) -> StoreResult<ScanStatus> {
        let duplicates = progress.duplicates();
        let sets = duplicates.len();
        let at = Utc::now();

        self.results
            .save(&CachedResult::new(progress.generation.clone(), duplicates, true))?;
        io::stamp_last_full_scan(self.options.as_ref(), at)?;
        self.progress.clear()?;

        log::info!(
            "Scan {} complete: {} item(s), {} duplicate set(s)",
            progress.generation,
            progress.total,
            sets
        );
        Ok(ScanStatus::completed(&progress, at, sets))
    }

    fn save_partial(&self, progress: &ScanProgress) {
        let partial = CachedResult::new(progress.generation.clone(), progress.duplicates(), false);
        if let Err(e) = self.results.save(&partial) {
            log::warn!("Failed to cache partial results: {}", e);
        }
    }

    fn cached_groups(&self) -> StoreResult<usize> {
        Ok(self.results.load()?.map_or(0, |r| r.groups.len()))
    }

    fn snapshot(&self, progress: &ScanProgress) -> Result<ScanStatus, ScanError> {
        Ok(ScanStatus::from_progress(
            progress,
            io::load_last_full_scan(self.options.as_ref())?,
            self.cached_groups()?,
        ))
    }
}
