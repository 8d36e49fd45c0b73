//! Structured error handling and exit codes.

use serde::Serialize;

use crate::actions::DeleteError;
use crate::config::ConfigError;
use crate::session::ScanError;

/// Exit codes for the mediadupe application.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (completed normally, no duplicates)
/// - 3: Partial results (scan not complete, or some deletions failed)
/// - 4: Rejected (permission denied, bad token, or invalid lifecycle call)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed and duplicates exist.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: the command completed but there are no duplicates.
    NoDuplicates = 2,
    /// Partial results: the scan is still in flight or stopped.
    PartialResults = 3,
    /// Rejected: the request was refused without side effects.
    Rejected = 4,
    /// Interrupted: the scan was stopped by Ctrl+C.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "MD000",
            Self::GeneralError => "MD001",
            Self::NoDuplicates => "MD002",
            Self::PartialResults => "MD003",
            Self::Rejected => "MD004",
            Self::Interrupted => "MD130",
        }
    }

    /// Pick the exit code for an error returned by the application.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<ScanError>() {
            return if e.is_recoverable() || matches!(e, ScanError::PermissionDenied(_)) {
                Self::Rejected
            } else {
                Self::GeneralError
            };
        }
        if let Some(e) = err.downcast_ref::<DeleteError>() {
            return match e {
                DeleteError::PermissionDenied(_) | DeleteError::InvalidToken => Self::Rejected,
                DeleteError::Store(_) => Self::GeneralError,
            };
        }
        if err.downcast_ref::<ConfigError>().is_some() {
            return Self::Rejected;
        }
        Self::GeneralError
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "MD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Capability;

    #[test]
    fn test_code_prefixes() {
        assert_eq!(ExitCode::Success.code_prefix(), "MD000");
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
        assert_eq!(ExitCode::Rejected.as_i32(), 4);
    }

    #[test]
    fn test_for_error() {
        let rejected = anyhow::Error::new(DeleteError::PermissionDenied(Capability::DeleteItems));
        assert_eq!(ExitCode::for_error(&rejected), ExitCode::Rejected);

        let not_started = anyhow::Error::new(ScanError::NotInitialized).context("advancing");
        assert_eq!(ExitCode::for_error(&not_started), ExitCode::Rejected);

        let scans = anyhow::Error::new(ScanError::PermissionDenied(Capability::ManageScans));
        assert_eq!(ExitCode::for_error(&scans), ExitCode::Rejected);

        let other = anyhow::anyhow!("boom");
        assert_eq!(ExitCode::for_error(&other), ExitCode::GeneralError);
    }

    #[test]
    fn test_structured_error_includes_context() {
        let err = anyhow::Error::new(DeleteError::InvalidToken).context("delete-orphans failed");
        let structured = StructuredError::new(&err, ExitCode::Rejected);
        assert_eq!(structured.code, "MD004");
        assert!(structured.message.contains("delete-orphans failed"));
        assert!(structured.message.contains("invalid or expired request token"));
        assert!(!structured.interrupted);
    }
}
