//! refit CLI - batch rewriting of test sources
//!
//! Each run discovers candidate files, applies configured line patches and
//! the pass pipeline, then (with `--apply`) backs up and rewrites the files
//! that changed. A report is written at the end of every run.
//!
//! Passes, in order:
//! - rule_engine: phased regex rules from the built-in and configured catalogs
//! - import_dedup: merge repeated named imports of one module
//! - assertion_compaction: shorten long runs of trivial existence assertions

mod backup;
mod config;
mod discover;
mod output;
mod process;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use refit_core::{RunMode, RunReporter};
use refit_rules::{
    builtin_names, list_rules, load_builtins, AssertionCompactor, ImportDeduplicator, Pipeline,
    RuleEngine, YamlCatalog,
};

use backup::BackupManager;
use config::{normalize, Config, PatchSet, ReportFormat};
use discover::Discoverer;
use output::{OutputFormat, Reporter};
use process::{run_jobs, RunContext};

#[derive(Parser)]
#[command(name = "refit")]
#[command(version)]
#[command(about = "Batch rewriting of test sources with backups and a run report")]
struct Cli {
    /// Back up and rewrite changed files
    #[arg(long, conflicts_with = "dry_run")]
    apply: bool,

    /// Show what would change without touching any file (default mode)
    #[arg(long, short = 'n', conflicts_with = "apply")]
    dry_run: bool,

    /// Copy the most recent backups back over the originals and exit.
    /// With FILEs, only those are restored.
    #[arg(long, num_args = 0.., value_name = "FILE", conflicts_with_all = ["apply", "dry_run", "list_rules"])]
    restore: Option<Vec<PathBuf>>,

    /// List the rules of the loaded catalogs and exit
    #[arg(long)]
    list_rules: bool,

    /// Directory discovery starts from (overrides discover.root)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Include pattern (can be specified multiple times). Overrides config file.
    #[arg(long, short = 'i', value_name = "GLOB")]
    include: Vec<String>,

    /// Identifier to prefix with an underscore (can be specified multiple times)
    #[arg(long, value_name = "NAME")]
    identifier: Vec<String>,

    /// Where to write the run report (overrides report.path)
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Report format: markdown, json
    #[arg(long, value_name = "FORMAT")]
    report_format: Option<String>,

    /// Output format: text, json, diff
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    format: String,

    /// Shorthand for --format json
    #[arg(long)]
    json: bool,

    /// Show verbose output
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Path to config file (default: auto-detect .refit.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ignore config files
    #[arg(long, conflicts_with = "config")]
    no_config: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::from_str(&cli.format).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid output format '{}'. Valid options: text, json, diff",
                cli.format
            )
        })?
    };
    let text = output_format == OutputFormat::Text;

    let mut config = load_config(&cli, text)?;
    apply_overrides(&mut config, &cli)?;

    let catalogs = load_catalogs(&config)?;

    if cli.list_rules {
        print_rules(&catalogs);
        return Ok(ExitCode::SUCCESS);
    }

    let root = config.discover.root.clone();
    let mut backups = BackupManager::new(&root, config.backup_dir()).overwrite(config.backup.overwrite);

    if let Some(files) = &cli.restore {
        let session = backups.latest_session();
        let restored = if files.is_empty() {
            backups.restore_all(&session)
        } else {
            files
                .iter()
                .map(|file| backups.restore_file(file, &session).map(|_| file.clone()))
                .collect()
        }
        .with_context(|| format!("Failed to restore from {}", session.display()))?;
        if text {
            for path in &restored {
                println!("  {} {}", "restored".green(), path.display());
            }
            println!("Restored {} file(s) from {}", restored.len(), session.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let engine = RuleEngine::from_catalogs(
        &catalogs,
        &config.disabled_rules(),
        &config.active_identifiers(),
    )
    .context("Failed to build rule engine")?;
    let pipeline = build_pipeline(&config, engine)?;
    let patches = PatchSet::from_config(&config.patches)?;
    debug!(passes = pipeline.passes().count(), patches = patches.len(), "pipeline ready");

    let mode = if cli.apply { RunMode::Apply } else { RunMode::DryRun };
    if mode.mutates() && config.backup.timestamped {
        backups.init_session();
    }

    if cli.verbose && text {
        println!("{}: {}", "Mode".bold(), mode.as_str());
        println!(
            "{}: {}",
            "Passes".bold(),
            pipeline.passes().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );
        println!();
    }

    let mut excludes = config.discover.exclude.clone();
    if let Ok(relative) = config.backup_dir().strip_prefix(&root) {
        excludes.push(format!("{}/", relative.display()));
    }
    let discoverer = Discoverer::new(&root, &config.discover.include, &excludes)?
        .with_companion_suffix(config.discover.companion_suffix.clone());
    let (jobs, discovery_errors) = discoverer
        .discover()
        .into_jobs(config.discover.companion_suffix.as_deref());

    warn_unmatched_patches(&patches, &discoverer, jobs.iter().map(|j| j.path.as_path()));
    info!(files = jobs.len(), mode = mode.as_str(), "starting run");

    let ctx = RunContext {
        mode,
        root: &root,
        pipeline: &pipeline,
        patches: &patches,
        backups: &backups,
    };
    let results = run_jobs(&ctx, jobs);

    let backed_up = results.iter().any(|p| p.job.backup_path.is_some());
    let mut reporter = RunReporter::new(mode, backed_up.then(|| backups.backup_root().to_path_buf()));
    for error in &discovery_errors {
        reporter.record_error(error.to_string());
    }

    let terminal = Reporter::new(output_format, cli.verbose);
    for processed in results {
        terminal.report(&processed);
        reporter.record(processed.job);
    }
    let report = reporter.finalize();

    let passes: Vec<(&str, &str)> = pipeline.passes().map(|p| (p.name(), p.description())).collect();
    report::write_report(&report, &passes, &config.report.path, config.report.format)
        .context("Failed to write run report")?;

    terminal.finish(&report, Some(&config.report.path))?;

    Ok(ExitCode::SUCCESS)
}

fn load_config(cli: &Cli, text: bool) -> Result<Config> {
    if cli.no_config {
        return Ok(Config::default());
    }

    if let Some(config_path) = &cli.config {
        let cfg = Config::load_path(config_path)?;
        if cli.verbose && text {
            println!("{}: {}", "Using config".bold(), config_path.display());
        }
        return Ok(cfg);
    }

    match Config::load()? {
        Some((cfg, path)) => {
            if cli.verbose && text {
                println!("{}: {}", "Using config".bold(), path.display());
            }
            Ok(cfg)
        }
        None => Ok(Config::default()),
    }
}

/// Command line flags win over the config file
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(root) = &cli.root {
        config.discover.root = root.clone();
    }
    if !cli.include.is_empty() {
        config.discover.include = cli.include.clone();
    }
    config.rules.active_identifiers.extend(cli.identifier.iter().cloned());
    if let Some(path) = &cli.report {
        config.report.path = path.clone();
    }
    if let Some(format) = &cli.report_format {
        config.report.format = ReportFormat::from_str(format).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid report format '{}'. Valid options: markdown, json",
                format
            )
        })?;
    }
    Ok(())
}

/// Built-in catalogs (all, or those named in `rules.builtin`) plus `rules.catalogs`
fn load_catalogs(config: &Config) -> Result<Vec<YamlCatalog>> {
    let mut catalogs = match &config.rules.builtin {
        Some(names) => load_builtins(names)?,
        None => load_builtins(&builtin_names())?,
    };

    for path in &config.rules.catalogs {
        let loaded = refit_rules::load_catalogs(path)
            .with_context(|| format!("Failed to load rule catalogs from {}", path.display()))?;
        catalogs.extend(loaded);
    }

    Ok(catalogs)
}

fn build_pipeline(config: &Config, engine: RuleEngine) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new().with_pass(engine);

    if config.imports.enabled {
        pipeline = pipeline.with_pass(ImportDeduplicator::new());
    }
    if config.assertions.enabled {
        let compactor = AssertionCompactor::new(config.assertions.options())
            .context("Invalid [assertions] settings")?;
        pipeline = pipeline.with_pass(compactor);
    }
    if let Some(enabled) = config.rules.self_check {
        pipeline = pipeline.self_check(enabled);
    }

    Ok(pipeline)
}

fn print_rules(catalogs: &[YamlCatalog]) {
    println!("{}", "Available rules:".bold());

    let mut current_phase = None;
    for info in list_rules(catalogs) {
        if current_phase.as_deref() != Some(info.phase.as_str()) {
            println!();
            println!("  {} {}", format!("[{}]", info.order).dimmed(), info.phase.bold());
            current_phase = Some(info.phase.clone());
        }
        println!(
            "    {} - {} ({}, {} example(s))",
            info.name.green(),
            info.description,
            info.catalog,
            info.example_count
        );
    }
}

/// Patches for files that were not discovered never apply; say so up front
fn warn_unmatched_patches<'a>(
    patches: &PatchSet,
    discoverer: &Discoverer,
    discovered: impl Iterator<Item = &'a Path>,
) {
    let discovered: HashSet<PathBuf> = discovered
        .map(|p| normalize(discoverer.relative(p)))
        .collect();

    for file in patches.files() {
        if !discovered.contains(file) {
            warn!(file = %file.display(), "line patches target a file that was not discovered");
        }
    }
}
