//! Deleting unreferenced members of a duplicate group.
//!
//! # Overview
//!
//! [`OrphanDeleter::delete_orphans`] is the only destructive operation in the
//! engine. Before anything is removed it checks, in order:
//!
//! 1. the caller holds [`Capability::DeleteItems`],
//! 2. the request's token was minted for this group,
//! 3. each candidate belongs to the cached group (when a cached result exists),
//! 4. each candidate is still unreferenced, asked fresh from the oracle.
//!
//! Failing (1) or (2) rejects the whole request with no mutation. Candidates
//! failing (3) or (4) are skipped. At least one copy of the content is always
//! preserved: when every member of the cached group would be removed, the
//! lowest id is kept. Any successful deletion invalidates the cached result,
//! since its groups may now name deleted items.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mediadupe::actions::delete::{DeleteRequest, OrphanDeleter};
//! use mediadupe::actions::guard::{Capabilities, TokenSigner};
//! use mediadupe::cache::ResultCache;
//! use mediadupe::scanner::Digest;
//! use mediadupe::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let results = ResultCache::new(store.clone(), Duration::from_secs(3600));
//! let deleter = OrphanDeleter::new(store, results, TokenSigner::new("secret"));
//!
//! let group = Digest::of_bytes(b"photo");
//! let request = DeleteRequest {
//!     token: deleter.mint_token(&group),
//!     group,
//!     candidates: vec![1, 5],
//!     capabilities: Capabilities::all(),
//! };
//! let outcome = deleter.delete_orphans(&request).unwrap();
//! println!("{}", outcome.summary());
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::actions::guard::{Action, ActionToken, Capabilities, Capability, TokenSigner};
use crate::cache::ResultCache;
use crate::scanner::{Digest, ItemId};
use crate::store::{ItemRemover, MediaLibrary, ReferenceOracle, StoreError};

/// Error type for delete-orphans requests.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The caller lacks a required capability.
    #[error("permission denied: missing capability {0}")]
    PermissionDenied(Capability),

    /// The token is missing, expired, or minted for another group.
    #[error("invalid or expired request token")]
    InvalidToken,

    /// A backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A request to delete unreferenced members of one duplicate group.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    /// Fingerprint of the group the candidates belong to.
    pub group: Digest,
    /// Ids to delete if they are still orphans.
    pub candidates: Vec<ItemId>,
    /// Token minted for `group`.
    pub token: ActionToken,
    /// What the caller is allowed to do.
    pub capabilities: Capabilities,
}

/// What a delete-orphans request did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Ids removed.
    pub deleted: Vec<ItemId>,
    /// Ids skipped because content references them.
    pub skipped_referenced: Vec<ItemId>,
    /// Ids skipped because they are not in the cached group.
    pub skipped_foreign: Vec<ItemId>,
    /// Orphan kept so the group retains one copy.
    pub preserved: Option<ItemId>,
    /// Ids the store failed to remove.
    pub failed: Vec<ItemId>,
}

impl DeleteOutcome {
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// One-line human readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} orphaned duplicate{} deleted",
            self.deleted.len(),
            if self.deleted.len() == 1 { "" } else { "s" }
        );
        let skipped = self.skipped_referenced.len()
            + self.skipped_foreign.len()
            + usize::from(self.preserved.is_some());
        if skipped > 0 {
            summary.push_str(&format!(", {skipped} skipped"));
        }
        if !self.failed.is_empty() {
            summary.push_str(&format!(", {} failed", self.failed.len()));
        }
        summary
    }
}

/// Executes guarded delete-orphans requests.
pub struct OrphanDeleter {
    oracle: Arc<dyn ReferenceOracle>,
    remover: Arc<dyn ItemRemover>,
    results: ResultCache,
    signer: TokenSigner,
}

impl std::fmt::Debug for OrphanDeleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanDeleter")
            .field("results", &self.results)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl OrphanDeleter {
    #[must_use]
    pub fn new<L>(library: Arc<L>, results: ResultCache, signer: TokenSigner) -> Self
    where
        L: MediaLibrary + 'static,
    {
        Self::from_parts(library.clone(), library, results, signer)
    }

    #[must_use]
    pub fn from_parts(
        oracle: Arc<dyn ReferenceOracle>,
        remover: Arc<dyn ItemRemover>,
        results: ResultCache,
        signer: TokenSigner,
    ) -> Self {
        Self {
            oracle,
            remover,
            results,
            signer,
        }
    }

    /// Mint a token authorizing deletion within `group`.
    #[must_use]
    pub fn mint_token(&self, group: &Digest) -> ActionToken {
        self.signer.mint(Action::DeleteOrphans, group.as_str())
    }

    /// Delete every candidate that is still an orphan member of the group.
    ///
    /// When a cached result lists the group and every member is an orphan
    /// candidate, the lowest id survives and is reported in
    /// [`DeleteOutcome::preserved`].
    ///
    /// # Errors
    ///
    /// * [`DeleteError::PermissionDenied`] if the caller cannot delete items.
    /// * [`DeleteError::InvalidToken`] if the token does not match the group.
    /// * [`DeleteError::Store`] if the cached result cannot be read or invalidated.
    ///
    /// Per-item store failures are recorded in [`DeleteOutcome::failed`]
    /// and do not abort the request.
    pub fn delete_orphans(&self, request: &DeleteRequest) -> Result<DeleteOutcome, DeleteError> {
        if !request.capabilities.allows(Capability::DeleteItems) {
            log::warn!("Rejected delete for group {}: permission denied", request.group.short());
            return Err(DeleteError::PermissionDenied(Capability::DeleteItems));
        }
        if !self
            .signer
            .verify(Action::DeleteOrphans, request.group.as_str(), &request.token)
        {
            log::warn!("Rejected delete for group {}: bad token", request.group.short());
            return Err(DeleteError::InvalidToken);
        }

        let members = self
            .results
            .load()?
            .map(|cached| cached.groups.get(&request.group).cloned().unwrap_or_default());

        let mut outcome = DeleteOutcome::default();
        let mut seen = BTreeSet::new();
        let mut orphans = Vec::new();

        for &id in &request.candidates {
            if !seen.insert(id) {
                continue;
            }
            if members.as_ref().is_some_and(|m| !m.contains(&id)) {
                log::warn!("Item {} is not in group {}, skipping", id, request.group.short());
                outcome.skipped_foreign.push(id);
                continue;
            }

            match self.oracle.is_referenced(id) {
                Ok(true) => {
                    log::debug!("Item {} is referenced, keeping it", id);
                    outcome.skipped_referenced.push(id);
                }
                Ok(false) => orphans.push(id),
                Err(e) => {
                    log::error!("Could not check references for item {}: {}", id, e);
                    outcome.failed.push(id);
                }
            }
        }

        if let Some(members) = &members {
            if let Some(&keep) = members.iter().next() {
                if members.iter().all(|id| orphans.contains(id)) {
                    log::info!(
                        "Every member of group {} is orphaned, keeping item {}",
                        request.group.short(),
                        keep
                    );
                    orphans.retain(|&id| id != keep);
                    outcome.preserved = Some(keep);
                }
            }
        }

        for id in orphans {
            match self.remover.delete_item(id) {
                Ok(true) => outcome.deleted.push(id),
                Ok(false) => {
                    log::warn!("Item {} could not be deleted", id);
                    outcome.failed.push(id);
                }
                Err(e) => {
                    log::error!("Failed to delete item {}: {}", id, e);
                    outcome.failed.push(id);
                }
            }
        }

        if !outcome.deleted.is_empty() {
            self.results.invalidate()?;
            log::info!(
                "Deleted {} orphan(s) from group {}",
                outcome.deleted.len(),
                request.group.short()
            );
        }

        Ok(outcome)
    }
}
