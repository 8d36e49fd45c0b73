//! Operator actions on scan results.
//!
//! This module provides:
//! - [`references`]: attached/orphan labelling through the reference oracle
//! - [`guard`]: capabilities and scoped replay-protection tokens
//! - [`delete`]: the guarded delete-orphans operation
//!
//! # Deletion
//!
//! Deleting is always scoped to one duplicate group and requires both the
//! [`Capability::DeleteItems`] capability and a token minted for that group.
//! Members still referenced by other content are never removed.

pub mod delete;
pub mod guard;
pub mod references;

pub use delete::{DeleteError, DeleteOutcome, DeleteRequest, OrphanDeleter};
pub use guard::{Action, ActionToken, Capabilities, Capability, TokenSigner};
pub use references::{MemberStatus, ReferenceChecker};
