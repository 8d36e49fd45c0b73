//! Ctrl+C handling for cooperative scan stops.
//!
//! A scan is only ever halted between batches. The handler installed here
//! raises a shared flag; [`crate::session::ScanCoordinator::run`] checks it
//! before each batch and, once it is set, stops the scan with its progress
//! intact so `scan --resume` can continue later.
//!
//! ```rust,no_run
//! use mediadupe::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! if handler.is_shutdown_requested() {
//!     println!("Stopping after the current batch");
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption: 128 + SIGINT.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Shared stop flag raised by Ctrl+C.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Ctrl+C was pressed or a stop was requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// The flag itself, for drivers that poll it between batches.
    #[must_use]
    pub fn flag(&self) -> &AtomicBool {
        &self.flag
    }

    /// A shared handle to the flag for other threads.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

/// Install the process-wide Ctrl+C handler, or reuse the installed one.
///
/// The returned handler's flag is reset, so each command in a process starts
/// unstopped. If another hook already owns Ctrl+C, an unhooked handler is
/// returned that only honours [`ShutdownHandler::request_shutdown`].
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the platform refuses the hook.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    let hooked = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(
            std::io::stderr(),
            "\nInterrupted. Stopping after the current batch..."
        );
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
    });

    match hooked {
        Ok(()) => {}
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C is already hooked, using an unhooked handler");
        }
        Err(e) => return Err(SignalError::InstallFailed(e)),
    }

    let installed = GLOBAL_HANDLER.get_or_init(|| handler);
    installed.reset();
    Ok(installed.clone())
}

/// A handler with no signal hook, for tests and embedders.
#[must_use]
pub fn create_handler() -> ShutdownHandler {
    ShutdownHandler::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_reset() {
        let handler = create_handler();
        assert!(!handler.is_shutdown_requested());
        handler.request_shutdown();
        assert!(handler.flag().load(Ordering::SeqCst));
        handler.reset();
        assert!(!handler.is_shutdown_requested());
    }

    #[test]
    fn test_clones_share_flag() {
        let handler = ShutdownHandler::new();
        let cloned = handler.clone();
        let shared = handler.get_flag();

        shared.store(true, Ordering::SeqCst);
        assert!(cloned.is_shutdown_requested());
    }

    #[test]
    fn test_install_twice_reuses_handler() {
        let first = install_handler().unwrap();
        first.request_shutdown();
        let second = install_handler().unwrap();
        assert!(!first.is_shutdown_requested());
        assert!(!second.is_shutdown_requested());
    }

    #[test]
    fn test_install_failure_message() {
        let err = SignalError::from(ctrlc::Error::NoSuchSignal(ctrlc::SignalType::Ctrlc));
        assert!(err.to_string().starts_with("Failed to install signal handler"));
    }

    #[test]
    fn test_exit_code_interrupted() {
        assert_eq!(EXIT_CODE_INTERRUPTED, 130);
    }
}
