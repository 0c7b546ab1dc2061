use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pitune_core::markdown::drift_label;
use pitune_core::{
    build_checks, build_diagnostics_bundle, build_targets, collect_host_info, human_bytes,
    render_diagnostic_markdown, render_drift_markdown, render_run_markdown,
    write_diagnostics_bundle, DiagnosticCollector, Host, PassLock, Profile, Reconciler,
    TimestampedCopy, DEFAULT_LOCK_PATH,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pitune",
    version,
    about = "Tune a Raspberry Pi as a Docker host and report on its health."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Converge kernel, boot, storage and Docker settings to the profile.
    Optimize(OptimizeArgs),
    /// Run read-only health checks and print a scored report.
    Diagnose(DiagnoseArgs),
    /// Show board, OS, memory and disk information.
    Doctor,
    /// Print or write the built-in profile.
    Profile(ProfileArgs),
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Profile JSON file. Built-in defaults are used when omitted.
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Filesystem root to operate on (useful for mounted SD card images).
    #[arg(long, value_name = "DIR", default_value = "/")]
    root: PathBuf,
}

#[derive(Debug, Args)]
struct OptimizeArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Report what would change without touching the system.
    #[arg(long)]
    dry_run: bool,

    /// Advisory lock file preventing concurrent passes.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOCK_PATH)]
    lock: PathBuf,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DiagnoseArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Optional JSON report output file.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Optional markdown report output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ProfileArgs {
    /// Write the profile here instead of stdout.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize(args) => run_optimize_command(args),
        Commands::Diagnose(args) => run_diagnose_command(args),
        Commands::Doctor => {
            run_doctor_command();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Profile(args) => run_profile_command(args),
    }
}

fn load_context(args: &TargetArgs) -> Result<(Profile, Host)> {
    let profile = Profile::load_or_default(args.profile.as_deref())?;
    debug!(
        profile = ?args.profile,
        root = %args.root.display(),
        "profile loaded"
    );
    Ok((profile, Host::with_root(&args.root)))
}

fn run_optimize_command(args: OptimizeArgs) -> Result<ExitCode> {
    let (profile, host) = load_context(&args.target)?;
    let backup_dir = profile.backup_dir.as_ref().map(|dir| host.path(dir));
    let reconciler = Reconciler::new(Box::new(TimestampedCopy::new(backup_dir)));
    let targets = build_targets(&profile, &host);

    if args.dry_run {
        let drifts = reconciler.detect_pass(&targets);
        for drift in &drifts {
            println!(
                "- [{}] {}: {}",
                drift_label(drift.status),
                drift.target,
                drift.message
            );
        }
        if let Some(md_path) = args.md {
            write_text(&md_path, &render_drift_markdown(&drifts), "markdown plan")?;
        }
        println!("Dry run: no changes were made.");
        return Ok(ExitCode::SUCCESS);
    }

    let lock = PassLock::acquire(&args.lock)?;
    debug!(lock = %lock.path().display(), "holding pass lock");
    let summary = reconciler.run_pass(&targets);

    for result in &summary.results {
        println!(
            "- [{}] {}: {}",
            result.outcome.label(),
            result.target,
            result.message
        );
        if let Some(backup) = &result.backup {
            println!("  backup: {}", backup.display());
        }
        for note in &result.notes {
            println!("  note: {}", note);
        }
    }
    println!(
        "Optimize finished: {} applied, {} skipped, {} warned, {} failed.",
        summary.applied, summary.skipped, summary.warned, summary.failed
    );

    if let Some(md_path) = args.md {
        write_text(&md_path, &render_run_markdown(&summary), "markdown summary")?;
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_diagnose_command(args: DiagnoseArgs) -> Result<ExitCode> {
    let (profile, host) = load_context(&args.target)?;
    let checks = build_checks(&profile, &host);
    let report = DiagnosticCollector::new().run(&checks);

    for result in &report.results {
        println!(
            "- [{}] {} ({}): {}",
            result.severity.label(),
            result.check,
            result.category,
            result.message
        );
    }
    println!("Health score: {}/100", report.score());

    let critical = report.critical_issues().collect::<Vec<_>>();
    if !critical.is_empty() {
        println!("Critical issues:");
        for issue in critical {
            println!("- {}: {}", issue.check, issue.message);
            if let Some(hint) = &issue.remediation {
                println!("  fix: {}", hint);
            }
        }
    }
    let warnings = report.warnings().collect::<Vec<_>>();
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("- {}: {}", warning.check, warning.message);
            if let Some(hint) = &warning.remediation {
                println!("  fix: {}", hint);
            }
        }
    }

    let needs_host = args.output.is_some() || args.md.is_some();
    let host_info = needs_host.then(|| collect_host_info(&host));

    if let Some(output) = args.output {
        let bundle = build_diagnostics_bundle(&report, host_info.clone());
        write_diagnostics_bundle(&bundle, &output)?;
        println!("Report JSON written to {}", output.display());
    }
    if let Some(md_path) = args.md {
        let markdown = render_diagnostic_markdown(&report, host_info.as_ref());
        write_text(&md_path, &markdown, "markdown report")?;
    }

    Ok(if report.has_critical_issues() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_doctor_command() {
    let info = collect_host_info(&Host::system());
    println!("OS: {} ({})", info.os, info.arch);
    if let Some(version) = &info.os_version {
        println!("Distribution: {}", version);
    }
    if let Some(kernel) = &info.kernel_version {
        println!("Kernel: {}", kernel);
    }
    if let Some(hostname) = &info.hostname {
        println!("Hostname: {}", hostname);
    }
    if let Some(model) = &info.board_model {
        println!("Board: {}", model);
    }
    println!(
        "Memory: {} (swap {})",
        human_bytes(info.total_memory_bytes),
        human_bytes(info.total_swap_bytes)
    );
    println!("Detected disks: {}", info.disks.len());
    for disk in &info.disks {
        println!(
            "- {} [{}] fs={} total={} free={} removable={}",
            disk.name,
            disk.mount_point,
            disk.file_system,
            human_bytes(disk.total_space_bytes),
            human_bytes(disk.free_space_bytes),
            disk.is_removable
        );
    }
    for note in &info.notes {
        println!("Note: {}", note);
    }
}

fn run_profile_command(args: ProfileArgs) -> Result<ExitCode> {
    let payload = Profile::default().to_json()?;
    match args.output {
        Some(path) => write_text(&path, &payload, "profile")?,
        None => println!("{payload}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn write_text(path: &Path, contents: &str, what: &str) -> Result<()> {
    fs::write(path, contents)
        .with_context(|| format!("failed to write {what} to {}", path.display()))?;
    println!("{} written to {}", capitalize(what), path.display());
    Ok(())
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
