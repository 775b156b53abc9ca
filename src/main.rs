use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use seve_clear::coordinator::{FilePreview, PreviewContent, CONFIRMATION_PHRASE};
use seve_clear::drives::{DriveDescriptor, FileRecord, ScanResult};
use seve_clear::elevation::{
    self, CommandRelauncher, EffectiveUidProbe, ElevationGuard, ElevationOutcome,
};
use seve_clear::engine::{ProgressChannel, ProgressHub};
use seve_clear::report::{certificate::render_text, CertificateGenerator, ClearanceReport};
use seve_clear::settings::{LoggingSettings, PipelineConfig, ProgressSettings};
use seve_clear::ui::{human_bytes, ProgressBar, ProgressEaser, ProgressTracker};
use seve_clear::*;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "seve")]
#[command(about = "Scan, delete and securely wipe storage through the SEVE erasure engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "SEVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Skip interactive confirmations (DANGEROUS!)
    #[arg(long, global = true)]
    yes: bool,

    /// Do not draw progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List drives known to the engine
    List,

    /// Show a drive's attributes and the level it would be wiped at
    Info { drive: String },

    /// Scan one or more drive roots for sensitive files
    Scan {
        #[arg(required = true)]
        roots: Vec<String>,

        /// Save the scan tree as JSON
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Search a root for files matching a query
    Search { root: String, query: String },

    /// Resolve a file's physical location on disk
    Locate { path: String },

    /// Show the first 64 KiB of a file
    Preview { path: PathBuf },

    /// Delete files, then optionally wipe the freed space
    Delete {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Remark attached to every deleted path in the scan export
        #[arg(long)]
        remark: Option<String>,

        /// Run the free-space wipe without asking
        #[arg(long)]
        free_space: bool,

        /// Save the clearance report as JSON
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Save a certificate (JSON, plus a .txt rendering alongside)
        #[arg(short, long)]
        cert_output: Option<PathBuf>,
    },

    /// Wipe a whole drive at the level its attributes call for
    Wipe {
        drive: String,

        /// Overwrite pattern (zeros, random)
        #[arg(short, long, default_value = "zeros")]
        pattern: WipePattern,

        /// Save the clearance report as JSON
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Save a certificate (JSON, plus a .txt rendering alongside)
        #[arg(short, long)]
        cert_output: Option<PathBuf>,
    },

    /// Overwrite a single file in place
    WipeFile {
        path: String,

        #[arg(long, default_value = "1")]
        passes: u32,

        #[arg(short, long, default_value = "zeros")]
        pattern: WipePattern,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let raw_args: Vec<OsString> = std::env::args_os().collect();
    let cli = Cli::parse_from(elevation::strip_marker(raw_args.clone()));

    let config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    let _log_guard = init_logging(cli.debug, &config.logging);

    let guard = ElevationGuard::new(
        EffectiveUidProbe,
        CommandRelauncher,
        config.elevation.relaunch_program.clone(),
    );
    match guard.ensure(&raw_args, |key| std::env::var_os(key)) {
        Ok(ElevationOutcome::Relaunched { exit_code }) => {
            return ExitCode::from(exit_code.clamp(0, 255) as u8);
        }
        Ok(ElevationOutcome::Continue(state)) => {
            elevation::record_state(state);
            if state.required && !state.achieved {
                eprintln!(
                    "{} running without elevated privileges; drive operations may fail",
                    "Warning:".yellow().bold()
                );
            }
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = setup_signal_handlers() {
        tracing::warn!(error = %e, "Signal handler not installed");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli, config)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool, logging: &LoggingSettings) -> Option<WorkerGuard> {
    let level = if debug { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("seve_clear={level},seve={level}")));

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "seve.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn run(cli: Cli, config: PipelineConfig) -> Result<ExitCode> {
    let progress_settings = config.progress.clone();
    let certificates = CertificateGenerator::new(&config.certificate);
    let coordinator = OperationCoordinator::new(config);
    let show_progress = !cli.no_progress;
    let view = |channel| {
        show_progress.then(|| spawn_progress(coordinator.hub(), channel, progress_settings.clone()))
    };

    match cli.command {
        Commands::List => {
            let drives = coordinator.list_drives().await.into_result()?;
            println!("\n{}", "Drives".bold());
            for drive in &drives {
                println!("  {}", drive);
            }
            if drives.is_empty() {
                println!("  (none reported)");
            }
        }

        Commands::Info { drive } => {
            let descriptor = coordinator.drive_info(&drive).await.into_result()?;
            print_drive(&descriptor);
        }

        Commands::Scan { roots, export } => {
            let progress = view(ProgressChannel::Scan);
            let outcome = coordinator.scan(roots).await;
            finish_progress(progress).await;
            let scan = outcome?.into_result()?;
            print_scan(&scan);
            if let Some(path) = export {
                coordinator.export_scan(&path)?;
                println!("Scan saved to {}", path.display());
            }
        }

        Commands::Search { root, query } => {
            let progress = view(ProgressChannel::Scan);
            let outcome = coordinator.search(&root, &query).await;
            finish_progress(progress).await;
            print_files(&outcome.into_result()?);
        }

        Commands::Locate { path } => {
            let location = coordinator.locate(&path).await.into_result()?;
            println!("{}: {}", path, location);
            if location.needs_elevation() {
                println!("  (run elevated to resolve cluster addresses)");
            }
        }

        Commands::Preview { path } => {
            let preview = coordinator.preview_file(&path).await?;
            print_preview(&preview);
        }

        Commands::Delete {
            paths,
            remark,
            free_space,
            export,
            cert_output,
        } => {
            for path in &paths {
                coordinator.select(path);
                if let Some(remark) = &remark {
                    coordinator.set_remark(path, remark);
                }
            }

            println!("\n{}", "The following files will be PERMANENTLY deleted:".red().bold());
            for path in &paths {
                println!("  {}", path);
            }
            let Some(confirmation) = confirm(cli.yes)? else {
                println!("Operation cancelled");
                return Ok(ExitCode::SUCCESS);
            };

            let report = coordinator.delete_selected(confirmation).await?;
            print_report(&report);

            if let Some(offer) = coordinator.free_space_wipe_offer() {
                println!(
                    "\n{} deleted file(s) may still be recoverable from free space on {}.",
                    offer.deleted(),
                    offer.drive()
                );
                let accepted = if free_space {
                    Some(Confirmation::assumed())
                } else if cli.yes {
                    None
                } else {
                    println!("Run a {} free-space wipe now?", offer.level());
                    confirm(false)?
                };

                if let Some(confirmation) = accepted {
                    let progress = view(ProgressChannel::Wipe);
                    let outcome = coordinator.free_space_wipe(&offer, confirmation).await;
                    finish_progress(progress).await;
                    print_report(&outcome?);
                }
            }

            save_outputs(&coordinator, &certificates, export.as_deref(), cert_output.as_deref())?;
            return Ok(exit_for(coordinator.current_report().as_ref()));
        }

        Commands::Wipe {
            drive,
            pattern,
            export,
            cert_output,
        } => {
            let descriptor = coordinator.drive_info(&drive).await.into_result()?;
            print_drive(&descriptor);
            println!(
                "\n{} {}",
                "This will PERMANENTLY DESTROY all data on".red().bold(),
                drive.bold()
            );
            let Some(confirmation) = confirm(cli.yes)? else {
                println!("Operation cancelled");
                return Ok(ExitCode::SUCCESS);
            };

            let progress = view(ProgressChannel::Wipe);
            let outcome = coordinator.wipe_drive(&drive, pattern, confirmation).await;
            finish_progress(progress).await;
            let report = outcome?;
            print_report(&report);

            save_outputs(&coordinator, &certificates, export.as_deref(), cert_output.as_deref())?;
            return Ok(exit_for(Some(&report)));
        }

        Commands::WipeFile {
            path,
            passes,
            pattern,
        } => {
            println!("\n{} {}", "This will overwrite".red().bold(), path.bold());
            let Some(confirmation) = confirm(cli.yes)? else {
                println!("Operation cancelled");
                return Ok(ExitCode::SUCCESS);
            };

            let progress = view(ProgressChannel::Wipe);
            let outcome = coordinator
                .wipe_file(&path, passes, pattern, confirmation)
                .await;
            finish_progress(progress).await;
            let payload = outcome?.into_result()?;
            println!("{} {}", "✓".green().bold(), path);
            if let Some(bytes) = payload.get("bytes_written").and_then(|v| v.as_u64()) {
                println!("  Bytes written: {}", human_bytes(bytes));
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(coordinator.config())?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn confirm(assume_yes: bool) -> Result<Option<Confirmation>> {
    if assume_yes {
        return Ok(Some(Confirmation::assumed()));
    }
    print!("\nType '{}' to confirm: ", CONFIRMATION_PHRASE);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(Confirmation::from_phrase(&input))
}

fn exit_for(report: Option<&ClearanceReport>) -> ExitCode {
    match report {
        Some(report) if !report.success => ExitCode::from(1),
        _ => ExitCode::SUCCESS,
    }
}

fn save_outputs(
    coordinator: &OperationCoordinator,
    certificates: &CertificateGenerator,
    export: Option<&Path>,
    cert_output: Option<&Path>,
) -> Result<()> {
    if let Some(path) = export {
        coordinator
            .export_report(path)
            .with_context(|| format!("saving report to {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }
    if let Some(path) = cert_output {
        let certificate = coordinator.certificate(certificates)?;
        certificates.save_certificate(&certificate, path)?;
        certificates.save_text(&certificate, &path.with_extension("txt"))?;
        println!("Certificate saved to {}", path.display());
        if export.is_none() {
            println!("\n{}", render_text(&certificate));
        }
    }
    Ok(())
}

/// Draw progress for one channel until aborted.
fn spawn_progress(
    hub: &ProgressHub,
    channel: ProgressChannel,
    settings: ProgressSettings,
) -> JoinHandle<()> {
    let mut subscription = hub.subscribe_to(channel);
    tokio::spawn(async move {
        let mut tracker = ProgressTracker::new();
        let mut easer = ProgressEaser::new(&settings, &mut rand::thread_rng());
        let mut bar = ProgressBar::new(40);
        let mut ticker = tokio::time::interval(Duration::from_millis(settings.tick_ms.max(10)));

        loop {
            tokio::select! {
                notice = subscription.next() => match notice {
                    Some(notice) => {
                        tracker.observe(&notice.event);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if tracker.events() == 0 {
                        continue;
                    }
                    let shown = easer.tick(tracker.target(), Instant::now());
                    bar.draw(shown, tracker.message(), tracker.stats());
                }
            }
        }
        bar.finish();
    })
}

async fn finish_progress(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        handle.abort();
        let _ = handle.await;
        eprintln!();
    }
}

fn print_drive(descriptor: &DriveDescriptor) {
    let attrs = &descriptor.attributes;
    println!("\n{}", descriptor.id.bold());
    println!("  Removable:  {}", attrs.is_removable);
    println!("  OS volume:  {}", attrs.is_operating_system_volume);
    println!("  Media type: {:?}", attrs.media_type);
    println!("  Bus type:   {}", attrs.bus_type);
    let level = descriptor.recommended_level();
    println!("  Wipe level: {} ({})", level, level.description());
}

fn print_scan(scan: &ScanResult) {
    for drive in &scan.drives {
        println!("\n{}", drive.drive.bold());
        if let Some(model) = &drive.model {
            println!("  Model:      {}", model);
        }
        if let (Some(used), Some(total)) = (drive.used_space, drive.total_space) {
            println!("  Used:       {} of {}", human_bytes(used), human_bytes(total));
        }
        for (category, stats) in &drive.file_analysis.categories {
            println!(
                "  {:<12} {:>8} files  {:>12}",
                category,
                stats.count,
                human_bytes(stats.size)
            );
        }
        let sensitive = drive.file_analysis.sensitive_files.len();
        if sensitive > 0 {
            println!("  {} {} sensitive file(s)", "!".yellow().bold(), sensitive);
        }
    }
    println!("\nTotal files: {}", scan.total_files());
}

fn print_files(files: &[FileRecord]) {
    for file in files {
        println!("  {}  [{}]", file.display_path(), human_bytes(file.size));
    }
    println!("{} match(es)", files.len());
}

fn print_preview(preview: &FilePreview) {
    let kind = if preview.is_binary() { "binary" } else { "text" };
    println!(
        "{} ({}, {} read{})\n",
        preview.path.bold(),
        kind,
        human_bytes(preview.bytes_read as u64),
        if preview.truncated { ", truncated" } else { "" }
    );
    match &preview.content {
        PreviewContent::Text(text) | PreviewContent::Binary(text) => println!("{}", text),
    }
}

fn print_report(report: &ClearanceReport) {
    let status = if report.success {
        "COMPLETED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!("\n{} {}", report.operation.to_string().bold(), status);
    if report.is_wipe() {
        if let Some(drive) = &report.drive {
            println!("  Drive:         {}", drive);
        }
        println!("  Bytes written: {}", human_bytes(report.bytes_written));
        println!("  Files created: {}", report.files_created);
    } else {
        println!("  Deleted: {} / {}", report.deleted, report.total);
        for item in report.failed_items() {
            println!(
                "  {} {} ({})",
                "✗".red(),
                item.path,
                item.error.as_deref().unwrap_or("error")
            );
        }
    }
    if let Some(error) = &report.error {
        println!("  Error: {}", error);
    }
}

// Wipes and deletes cannot be interrupted cleanly; everything else can.
fn setup_signal_handlers() -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new([SIGINT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                if seve_clear::is_destructive_in_flight() {
                    eprintln!("\n\nInterrupt received, but a destructive operation is running.");
                    eprintln!("It cannot be stopped safely and will run to completion.");
                    tracing::warn!("SIGINT ignored during destructive operation");
                } else {
                    eprintln!("\nInterrupted");
                    std::process::exit(130);
                }
            }
        }
    });

    Ok(())
}
