//! Command-line interface definitions for mediadupe.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, color, config, library) apply to every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Register a directory of media files
//! mediadupe import ~/Pictures
//!
//! # Run a full scan, or continue an interrupted one
//! mediadupe scan
//! mediadupe scan --resume
//!
//! # Advance a single batch and exit
//! mediadupe scan --resume --step
//!
//! # Page through the duplicate report as JSON
//! mediadupe report --page 2 --output json
//!
//! # Delete unreferenced copies in one group
//! mediadupe delete-orphans <HASH> --token <TOKEN>
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::scanner::{Digest, ItemId};

/// Incremental duplicate finder for media libraries.
///
/// mediadupe fingerprints a media library a page at a time, groups identical
/// files, and deletes copies that no content references.
#[derive(Debug, Parser)]
#[command(name = "mediadupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Path to a configuration file
    ///
    /// If not specified, a default platform-specific path is used.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Named profile from the configuration file
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Path to the library database
    #[arg(long, global = true, value_name = "PATH", env = "MEDIADUPE_LIBRARY")]
    pub library: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register every file under a directory in the library
    Import(ImportArgs),
    /// Start, resume or step a duplicate scan
    Scan(ScanArgs),
    /// Stop the scan in progress, keeping its progress
    Stop,
    /// Forget scan progress and cached results
    Clear,
    /// Show the scan status
    Status(StatusArgs),
    /// Show a page of duplicate groups
    Report(ReportArgs),
    /// Print a delete token for a duplicate group
    Token(TokenArgs),
    /// Delete unreferenced members of a duplicate group
    DeleteOrphans(DeleteArgs),
    /// Record content that references an item
    Reference(ReferenceArgs),
    /// Write the effective configuration to the config file
    InitConfig(InitConfigArgs),
}

/// Arguments for the import subcommand.
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Directory to import
    #[arg(value_name = "DIR")]
    pub path: PathBuf,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Continue the scan in progress instead of starting over
    #[arg(long)]
    pub resume: bool,

    /// Process a single batch and exit
    #[arg(long)]
    pub step: bool,

    /// Items per batch
    #[arg(long, value_name = "N")]
    pub page_size: Option<usize>,

    /// Number of I/O threads for hashing
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Re-hash files whose size or modification time changed
    #[arg(long)]
    pub validate_metadata: bool,

    /// Output format for the final status
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the status subcommand.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the report subcommand.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Page to show (1-based)
    #[arg(long, value_name = "N", default_value = "1")]
    pub page: usize,

    /// Groups per page
    #[arg(long, value_name = "N")]
    pub per_page: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the token subcommand.
#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Fingerprint of the group
    #[arg(value_name = "GROUP", value_parser = parse_digest)]
    pub group: Digest,
}

/// Arguments for the delete-orphans subcommand.
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Fingerprint of the group
    #[arg(value_name = "GROUP", value_parser = parse_digest)]
    pub group: Digest,

    /// Token printed by `report` or `token` for this group
    #[arg(long, value_name = "TOKEN")]
    pub token: String,

    /// Only consider these ids (default: every member of the group)
    #[arg(long, value_name = "ID", num_args = 1.., value_delimiter = ',')]
    pub ids: Vec<ItemId>,

    /// Use permanent deletion instead of moving to trash
    ///
    /// Warning: Files cannot be recovered after permanent deletion.
    #[arg(long)]
    pub permanent: bool,
}

/// Arguments for the reference subcommand.
#[derive(Debug, Args)]
pub struct ReferenceArgs {
    /// Item the content references
    #[arg(value_name = "ID")]
    pub id: ItemId,

    /// Content body; the reference marker is appended to it
    #[arg(value_name = "TEXT", default_value = "")]
    pub text: String,

    /// Title of the content
    #[arg(long, default_value = "untitled")]
    pub title: String,
}

/// Arguments for the init-config subcommand.
#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Output format for status and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a group fingerprint (64 hex characters, case-insensitive).
///
/// # Examples
///
/// ```
/// use mediadupe::cli::parse_digest;
///
/// assert!(parse_digest(&"A".repeat(64)).is_ok());
/// assert!(parse_digest("abc").is_err());
/// ```
pub fn parse_digest(s: &str) -> Result<Digest, String> {
    Digest::parse(s.trim()).ok_or_else(|| format!("'{s}' is not a 64-character hex fingerprint"))
}
