//! Subcommand handlers.
//!
//! Each handler opens what it needs from a shared [`Context`], performs one
//! engine operation and prints the result as text or JSON.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Utc;

use crate::actions::{
    Action, ActionToken, DeleteRequest, OrphanDeleter, ReferenceChecker, TokenSigner,
};
use crate::cache::ResultCache;
use crate::cli::{
    Cli, Commands, DeleteArgs, ImportArgs, InitConfigArgs, OutputFormat, ReferenceArgs,
    ReportArgs, ScanArgs, TokenArgs,
};
use crate::config::Config;
use crate::error::ExitCode;
use crate::output::json::write_status;
use crate::output::{JsonOutput, ReportBuilder, TextOutput};
use crate::progress::Progress;
use crate::session::{ScanCoordinator, ScanState, ScanStatus};
use crate::signal;
use crate::store::sqlite::reference_marker;
use crate::store::{ItemCatalog, Library, StoreError};

/// Everything a handler needs.
pub struct Context<'a> {
    pub config: &'a Config,
    pub library: Arc<Library>,
    pub library_path: PathBuf,
    pub colored: bool,
    pub quiet: bool,
}

impl Context<'_> {
    fn coordinator(&self) -> Result<ScanCoordinator> {
        Ok(
            ScanCoordinator::new(self.library.clone(), self.config.scan_settings())?
                .with_capabilities(self.config.capabilities()),
        )
    }

    fn signer(&self) -> Result<TokenSigner> {
        match &self.config.secret {
            Some(secret) => Ok(TokenSigner::new(secret)),
            None => TokenSigner::load_or_create(&*self.library, &self.library_path)
                .context("Failed to load the token secret"),
        }
    }

    fn say(&self, line: impl std::fmt::Display) {
        if !self.quiet {
            println!("{line}");
        }
    }

    fn print_status(&self, status: &ScanStatus, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => {
                self.say(TextOutput::new(self.colored).status_line(status, Utc::now()));
            }
            OutputFormat::Json => {
                let mut stdout = io::stdout().lock();
                write_status(&mut stdout, status, true)?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}

/// Open the library named by `config` and run the selected subcommand.
pub fn dispatch(cli: &Cli, config: &Config) -> Result<ExitCode> {
    if let Commands::InitConfig(args) = &cli.command {
        return init_config(cli, config, args);
    }

    let library_path = config.library_path()?;
    let library = Library::open(&library_path)
        .with_context(|| format!("Failed to open library {}", library_path.display()))?
        .with_permanent_delete(config.permanent_delete);

    match library.purge_expired() {
        Ok(0) => {}
        Ok(n) => log::debug!("Purged {} expired record(s)", n),
        Err(e) => log::warn!("Failed to purge expired records: {}", e),
    }

    let ctx = Context {
        config,
        library: Arc::new(library),
        library_path,
        colored: !cli.no_color,
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::Import(args) => import(&ctx, args),
        Commands::Scan(args) => scan(&ctx, args),
        Commands::Stop => {
            let status = ctx.coordinator()?.stop()?;
            ctx.print_status(&status, OutputFormat::Text)?;
            Ok(ExitCode::Success)
        }
        Commands::Clear => {
            ctx.coordinator()?.clear()?;
            ctx.say("Scan progress and cached results cleared.");
            Ok(ExitCode::Success)
        }
        Commands::Status(args) => {
            let status = ctx.coordinator()?.status()?;
            ctx.print_status(&status, args.output)?;
            Ok(ExitCode::Success)
        }
        Commands::Report(args) => report(&ctx, args),
        Commands::Token(args) => token(&ctx, args),
        Commands::DeleteOrphans(args) => delete_orphans(&ctx, args),
        Commands::Reference(args) => reference(&ctx, args),
        Commands::InitConfig(args) => init_config(cli, config, args),
    }
}

fn init_config(cli: &Cli, config: &Config, args: &InitConfigArgs) -> Result<ExitCode> {
    let path = cli
        .config
        .clone()
        .or_else(Config::default_path)
        .context("No config directory available; pass --config")?;

    if path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }

    config.save_to(&path)?;
    if !cli.quiet {
        println!("Wrote configuration to {}", path.display());
    }
    Ok(ExitCode::Success)
}

fn import(ctx: &Context<'_>, args: &ImportArgs) -> Result<ExitCode> {
    let summary = ctx
        .library
        .import_dir(&args.path)
        .with_context(|| format!("Failed to import {}", args.path.display()))?;

    ctx.say(format!(
        "Imported {} new file(s), {} already registered, {} unreadable.",
        summary.added, summary.existing, summary.errors
    ));
    Ok(ExitCode::Success)
}

fn scan(ctx: &Context<'_>, args: &ScanArgs) -> Result<ExitCode> {
    let coordinator = ctx.coordinator()?;
    let mut status = coordinator.start(args.resume)?;
    let mut interrupted = false;

    if status.is_running() {
        if args.step {
            if let Some(offset) = status.next_offset {
                status = coordinator.advance(offset)?.status;
            }
        } else {
            let handler = signal::install_handler()?;
            let progress = Progress::new(ctx.quiet || args.output == OutputFormat::Json);
            status = coordinator.run(Some(handler.flag()), Some(&progress))?;
            interrupted = handler.is_shutdown_requested() && status.state == ScanState::Stopped;
        }
    }

    ctx.print_status(&status, args.output)?;

    Ok(match status.state {
        _ if interrupted => ExitCode::Interrupted,
        ScanState::Complete if status.cached_groups == 0 => ExitCode::NoDuplicates,
        ScanState::Complete => ExitCode::Success,
        _ => ExitCode::PartialResults,
    })
}

fn report(ctx: &Context<'_>, args: &ReportArgs) -> Result<ExitCode> {
    let coordinator = ctx.coordinator()?;
    let status = coordinator.status()?;
    let result = coordinator.results()?;

    let checker = ReferenceChecker::new(ctx.library.clone());
    let signer = ctx.signer()?;
    let page = ReportBuilder::new(&*ctx.library, &checker)
        .with_signer(&signer)
        .build(status, result.as_ref(), args.page, ctx.config.per_page)?;

    let code = if page.stats.total_sets == 0 {
        ExitCode::NoDuplicates
    } else if !page.complete {
        ExitCode::PartialResults
    } else {
        ExitCode::Success
    };

    let mut stdout = io::stdout().lock();
    match args.output {
        OutputFormat::Text => TextOutput::new(ctx.colored).write_to(&mut stdout, &page)?,
        OutputFormat::Json => JsonOutput::new(&page, code).write_to(&mut stdout, true)?,
    }
    stdout.flush()?;
    Ok(code)
}

fn token(ctx: &Context<'_>, args: &TokenArgs) -> Result<ExitCode> {
    let token = ctx.signer()?.mint(Action::DeleteOrphans, args.group.as_str());
    println!("{token}");
    Ok(ExitCode::Success)
}

fn delete_orphans(ctx: &Context<'_>, args: &DeleteArgs) -> Result<ExitCode> {
    let results = ResultCache::new(ctx.library.clone(), ctx.config.scan_settings().result_ttl);

    let candidates: Vec<_> = if args.ids.is_empty() {
        results
            .load()?
            .and_then(|cached| cached.groups.get(&args.group).map(|ids| ids.iter().copied().collect()))
            .unwrap_or_default()
    } else {
        args.ids.clone()
    };

    if candidates.is_empty() {
        ctx.say(format!(
            "No cached duplicate group {}. Run a scan or pass --ids.",
            args.group
        ));
        return Ok(ExitCode::NoDuplicates);
    }

    let deleter = OrphanDeleter::new(ctx.library.clone(), results, ctx.signer()?);
    let request = DeleteRequest {
        group: args.group.clone(),
        candidates,
        token: ActionToken::from(args.token.as_str()),
        capabilities: ctx.config.capabilities(),
    };
    let outcome = deleter.delete_orphans(&request)?;

    for id in &outcome.deleted {
        log::info!("Deleted item {}", id);
    }
    for id in &outcome.failed {
        log::warn!("Could not delete item {}", id);
    }
    if let Some(id) = outcome.preserved {
        log::info!("Kept item {} as the last copy", id);
    }
    ctx.say(format!("{}.", outcome.summary()));

    Ok(if outcome.failed.is_empty() {
        ExitCode::Success
    } else {
        ExitCode::PartialResults
    })
}

fn reference(ctx: &Context<'_>, args: &ReferenceArgs) -> Result<ExitCode> {
    if ctx.library.item_path(args.id)?.is_none() {
        return Err(StoreError::ItemNotFound(args.id).into());
    }

    let marker = reference_marker(args.id);
    let body = if args.text.is_empty() {
        marker
    } else {
        format!("{}\n{}", args.text, marker)
    };
    let content_id = ctx.library.add_content(&args.title, &body)?;

    ctx.say(format!(
        "Recorded content {} referencing item {}.",
        content_id, args.id
    ));
    Ok(ExitCode::Success)
}
