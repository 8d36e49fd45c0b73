//! mediadupe - incremental duplicate finder for media libraries
//!
//! Fingerprints a media library one bounded page at a time, so a scan over a
//! large collection can be interrupted, resumed and inspected while it runs.
//! Finished scans leave a cached set of duplicate groups, and copies that no
//! content references can be deleted behind a signed, short-lived token.
//!
//! # Layout
//!
//! * [`store`]: collection, metadata, ephemeral and option storage traits with
//!   SQLite and in-memory backends
//! * [`scanner`]: BLAKE3 fingerprints and page-at-a-time batch processing
//! * [`cache`]: per-item fingerprint cache and the cached scan result
//! * [`duplicates`]: grouping, merging and cross-page aggregation
//! * [`session`]: the resumable scan state machine
//! * [`actions`]: reference checks, request tokens and orphan deletion
//! * [`output`]: paginated reports as text or JSON

pub mod actions;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod signal;
pub mod store;

use anyhow::Result;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::ExitCode;

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns an error for invalid configuration or a failed command.
/// [`ExitCode::for_error`] maps it to a process exit code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet, !cli.no_color);

    let mut config = Config::load(cli.config.as_deref(), cli.profile.as_deref());
    config.merge_cli(&cli);
    config.validate()?;
    log::debug!(
        "page_size={} io_threads={} validate_metadata={} per_page={}",
        config.page_size,
        config.io_threads,
        config.validate_metadata,
        config.per_page
    );

    commands::dispatch(&cli, &config)
}
