//! Persistence of scan progress and the last full-scan timestamp.
//!
//! Progress is written to the ephemeral store wrapped in an envelope carrying
//! a SHA256 checksum of the serialized record. A record that fails to parse,
//! fails the checksum, or has an unknown version is treated as absent.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::session::data::{ScanProgress, LAST_SCAN_OPTION, PROGRESS_KEY, PROGRESS_VERSION};
use crate::store::{EphemeralStore, OptionStore, StoreError, StoreResult};

#[derive(Debug, Serialize, Deserialize)]
struct ProgressEnvelope {
    checksum: String,
    progress: ScanProgress,
}

fn checksum(progress: &ScanProgress) -> StoreResult<String> {
    let json = serde_json::to_string(progress).map_err(|e| corrupt(PROGRESS_KEY, e))?;
    Ok(format!("{:x}", Sha256::digest(json.as_bytes())))
}

fn corrupt(key: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    }
}

/// The single progress slot of the scan engine.
#[derive(Clone)]
pub struct ProgressSlot {
    store: Arc<dyn EphemeralStore>,
    ttl: Duration,
}

impl std::fmt::Debug for ProgressSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSlot")
            .field("store", &"<ephemeral store>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ProgressSlot {
    #[must_use]
    pub fn new(store: Arc<dyn EphemeralStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Read the current progress, if any.
    pub fn load(&self) -> StoreResult<Option<ScanProgress>> {
        let Some(raw) = self.store.get(PROGRESS_KEY)? else {
            return Ok(None);
        };

        let envelope: ProgressEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Discarding unreadable scan progress: {}", e);
                return Ok(None);
            }
        };

        if checksum(&envelope.progress)? != envelope.checksum {
            log::warn!("Discarding scan progress: checksum mismatch");
            return Ok(None);
        }

        let progress = envelope.progress;
        if progress.version != PROGRESS_VERSION {
            log::warn!(
                "Discarding scan progress with unsupported version {} (current {})",
                progress.version,
                PROGRESS_VERSION
            );
            return Ok(None);
        }

        Ok(Some(progress))
    }

    /// Write progress, refreshing its time-to-live.
    pub fn save(&self, progress: &ScanProgress) -> StoreResult<()> {
        let envelope = ProgressEnvelope {
            checksum: checksum(progress)?,
            progress: progress.clone(),
        };
        let json = serde_json::to_string(&envelope).map_err(|e| corrupt(PROGRESS_KEY, e))?;
        self.store.set(PROGRESS_KEY, &json, self.ttl)
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.store.delete(PROGRESS_KEY)
    }
}

/// Completion time of the last full scan. Unparseable values read as `None`.
pub fn load_last_full_scan(options: &dyn OptionStore) -> StoreResult<Option<DateTime<Utc>>> {
    let Some(raw) = options.get_option(LAST_SCAN_OPTION)? else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(at) => Ok(Some(at.with_timezone(&Utc))),
        Err(e) => {
            log::warn!("Ignoring malformed last-scan timestamp {:?}: {}", raw, e);
            Ok(None)
        }
    }
}

pub fn stamp_last_full_scan(options: &dyn OptionStore, at: DateTime<Utc>) -> StoreResult<()> {
    options.set_option(LAST_SCAN_OPTION, &at.to_rfc3339())
}

pub fn clear_last_full_scan(options: &dyn OptionStore) -> StoreResult<()> {
    options.delete_option(LAST_SCAN_OPTION)
}
