//! depshift - dependency upgrade pipeline CLI
//!
//! Every command prints one sanitized JSON document on stdout; logs go to
//! stderr.
//!
//! ## Commands
//!
//! - `audit`: scan the project with npm and print the audit snapshot
//! - `plan`: turn a snapshot into upgrade proposals
//! - `apply`: upgrade one package behind a backup
//! - `test`: run the project's tests within a time budget
//! - `recover`: restore the manifest from git or the latest backup
//! - `backups`: list manifest backups
//! - `assess`: attach risk opinions to planned proposals
//! - `classify`: semantic distance between two versions
//! - `parse-output`: classify test-runner output read from a file or stdin

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use depshift_core::obs::PipelineSpan;
use depshift_core::version::{classify_distance, resolve_target_detailed};
use depshift_core::{
    apply, plan, run_tests, test_output, to_transport_json, ApplyOptions, ApplyRequest,
    AuditSnapshot, BackupStore, ChangeClass, DepshiftConfig, NpmScanner, PackageManager,
    ProposalSet, RecoveryCoordinator, RecoveryRequest, RiskAssessor, RiskStrategy, Scanner,
    TestRunOptions, METRICS,
};

#[derive(Parser)]
#[command(name = "depshift")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plan, apply and roll back dependency upgrades", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Project root containing package.json
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Config file (default: <project>/depshift.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the project and print the audit snapshot
    Audit,

    /// Plan upgrade proposals
    Plan {
        /// conservative, balanced or aggressive (default from config)
        #[arg(short, long)]
        strategy: Option<RiskStrategy>,

        /// Read the snapshot from this file instead of scanning
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Upgrade one package in package.json
    Apply {
        /// Package name
        package: String,

        /// Target version
        #[arg(value_name = "VERSION")]
        target: String,

        /// Do not back up package.json first
        #[arg(long)]
        no_backup: bool,

        /// Edit package.json only
        #[arg(long)]
        skip_install: bool,

        /// Install time budget in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// npm, pnpm or yarn (default: detected from lockfile)
        #[arg(long)]
        package_manager: Option<PackageManager>,
    },

    /// Run the project's tests
    Test {
        /// Test time budget in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Restore package.json after a failed upgrade
    Recover {
        /// git, backup or auto
        #[arg(short, long, default_value = "auto")]
        method: RecoveryRequest,
    },

    /// List manifest backups, oldest first
    Backups,

    /// Plan, then ask the risk service about each proposal
    Assess {
        #[arg(short, long)]
        strategy: Option<RiskStrategy>,

        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Only assess this package
        #[arg(long)]
        package: Option<String>,
    },

    /// Semantic distance between two versions
    Classify {
        from: String,
        to: String,

        /// Also resolve an upgrade target from this patched-versions range
        #[arg(long)]
        patched: Option<String>,
    },

    /// Count passed/failed tests in runner output
    ParseOutput {
        /// File to read (default: stdin)
        file: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Classification {
    from: String,
    to: String,
    change_class: ChangeClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_is_fallback: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    depshift_core::init_tracing(cli.json_logs, level);

    let config = DepshiftConfig::load(&cli.project, cli.config.as_deref())
        .context("Failed to load depshift configuration")?;

    let ok = match cli.command {
        Commands::Audit => cmd_audit(&cli.project, &config).await?,
        Commands::Plan { strategy, snapshot } => {
            cmd_plan(&cli.project, &config, strategy, snapshot.as_deref()).await?
        }
        Commands::Apply {
            package,
            target,
            no_backup,
            skip_install,
            timeout_secs,
            package_manager,
        } => {
            let mut options = ApplyOptions::from_config(&config);
            options.create_backup = !no_backup;
            options.skip_install = skip_install;
            if let Some(secs) = timeout_secs {
                options.time_budget = Duration::from_secs(secs);
            }
            if package_manager.is_some() {
                options.package_manager = package_manager;
            }
            cmd_apply(&cli.project, ApplyRequest::new(package, target), &options).await?
        }
        Commands::Test { timeout_secs } => {
            let mut options = TestRunOptions::from_config(&config);
            if let Some(secs) = timeout_secs {
                options.time_budget = Duration::from_secs(secs);
            }
            cmd_test(&cli.project, &options).await?
        }
        Commands::Recover { method } => cmd_recover(&cli.project, &config, method).await?,
        Commands::Backups => cmd_backups(&cli.project, &config)?,
        Commands::Assess {
            strategy,
            snapshot,
            package,
        } => {
            cmd_assess(
                &cli.project,
                &config,
                strategy,
                snapshot.as_deref(),
                package.as_deref(),
            )
            .await?
        }
        Commands::Classify { from, to, patched } => cmd_classify(from, to, patched)?,
        Commands::ParseOutput { file } => cmd_parse_output(file.as_deref())?,
    };

    METRICS.flush();
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        to_transport_json(value).context("Failed to serialize result")?
    );
    Ok(())
}

async fn load_or_scan(
    project: &Path,
    config: &DepshiftConfig,
    snapshot: Option<&Path>,
) -> Result<AuditSnapshot> {
    match snapshot {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            Ok(AuditSnapshot::from_json(&raw)?)
        }
        None => Ok(NpmScanner::new(config.scan_timeout()).scan(project).await),
    }
}

async fn planned(
    project: &Path,
    config: &DepshiftConfig,
    strategy: Option<RiskStrategy>,
    snapshot: Option<&Path>,
) -> Result<ProposalSet> {
    let snapshot = load_or_scan(project, config, snapshot).await?;
    Ok(plan(&snapshot, strategy.unwrap_or(config.default_strategy)))
}

async fn cmd_audit(project: &Path, config: &DepshiftConfig) -> Result<bool> {
    let _span = PipelineSpan::enter("audit", project);
    let snapshot = NpmScanner::new(config.scan_timeout()).scan(project).await;
    info!(
        vulnerabilities = snapshot.vulnerabilities.len(),
        outdated = snapshot.outdated_packages.len(),
        "audit complete"
    );
    emit(&snapshot)?;
    Ok(true)
}

async fn cmd_plan(
    project: &Path,
    config: &DepshiftConfig,
    strategy: Option<RiskStrategy>,
    snapshot: Option<&Path>,
) -> Result<bool> {
    let _span = PipelineSpan::enter("plan", project);
    let proposals = planned(project, config, strategy, snapshot).await?;
    emit(&proposals)?;
    Ok(true)
}

async fn cmd_apply(project: &Path, request: ApplyRequest, options: &ApplyOptions) -> Result<bool> {
    let _span = PipelineSpan::enter("apply", project);
    let result = apply(project, &request, options).await;
    emit(&result)?;
    Ok(result.success)
}

async fn cmd_test(project: &Path, options: &TestRunOptions) -> Result<bool> {
    let _span = PipelineSpan::enter("test", project);
    let report = run_tests(project, options)
        .await
        .context("Failed to start the test command")?;
    emit(&report)?;
    Ok(report.success)
}

async fn cmd_recover(
    project: &Path,
    config: &DepshiftConfig,
    method: RecoveryRequest,
) -> Result<bool> {
    let _span = PipelineSpan::enter("recover", project);
    let result = RecoveryCoordinator::for_request(method, config)
        .recover(project)
        .await;
    emit(&result)?;
    Ok(result.success)
}

fn cmd_backups(project: &Path, config: &DepshiftConfig) -> Result<bool> {
    let store = BackupStore::for_project(project, &config.backup_dir);
    let records = store
        .list()
        .with_context(|| format!("Failed to list backups in {}", store.dir().display()))?;
    emit(&records)?;
    Ok(true)
}

async fn cmd_assess(
    project: &Path,
    config: &DepshiftConfig,
    strategy: Option<RiskStrategy>,
    snapshot: Option<&Path>,
    package: Option<&str>,
) -> Result<bool> {
    let _span = PipelineSpan::enter("assess", project);
    let proposals = planned(project, config, strategy, snapshot).await?;
    let assessor = RiskAssessor::new(&config.risk);

    let mut assessments = Vec::new();
    for proposal in proposals
        .proposals
        .iter()
        .filter(|p| package.map_or(true, |name| p.package == name))
    {
        assessments.push(assessor.assess(proposal).await);
    }
    emit(&assessments)?;
    Ok(true)
}

fn cmd_classify(from: String, to: String, patched: Option<String>) -> Result<bool> {
    let change_class = classify_distance(&from, &to);
    let resolution = patched
        .as_deref()
        .and_then(|range| resolve_target_detailed(range, &from));
    emit(&Classification {
        change_class,
        resolved_target: resolution.as_ref().map(|r| r.version.to_string()),
        target_is_fallback: resolution.as_ref().map(|r| r.fallback),
        from,
        to,
    })?;
    Ok(true)
}

fn cmd_parse_output(file: Option<&Path>) -> Result<bool> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?,
    };
    emit(&test_output::parse(&raw))?;
    Ok(true)
}
