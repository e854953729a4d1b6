use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use stb_soak::channel::adb::AdbChannel;
use stb_soak::cli::{Cli, Command};
use stb_soak::clock::SystemClock;
use stb_soak::config::ProjectConfig;
use stb_soak::error::RunError;
use stb_soak::guard;
use stb_soak::log::RunLog;
use stb_soak::menu;
use stb_soak::orchestrator::{RunContext, RunRequest, RunSummary, TestOrchestrator};
use stb_soak::profile::{Catalog, TestPlan};
use stb_soak::{report, shell_completion};

struct FinishedRun {
    summary: RunSummary,
    transcript: PathBuf,
}

/// Exit with status 1 unless running inside `screen` or `tmux`.
fn require_detachable_session(config: &ProjectConfig) {
    if let Err(e) = guard::require_detachable_session_env(&config.session.markers) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn load_catalog(config: &ProjectConfig) -> Result<Catalog> {
    let catalog = Catalog::load(config.profiles.file.as_deref())?;
    if let Some(path) = &config.profiles.file {
        info!("loaded profile catalog from {}", path.display());
    }
    Ok(catalog)
}

fn start_run(
    config: &ProjectConfig,
    adb: &AdbChannel,
    plan: &TestPlan,
    request: &RunRequest,
) -> Result<FinishedRun, RunError> {
    let log = RunLog::create(&config.logs.dir, &request.label)?;
    info!(
        transcript = %log.path().display(),
        address = %request.address,
        duration_secs = request.duration.as_secs(),
        "starting run"
    );

    let clock = SystemClock;
    let ctx = RunContext {
        channel: adb,
        clock: &clock,
        observer: &log,
        timing: &config.timing,
    };
    let summary = TestOrchestrator::new(ctx, plan).run(&request.address, request.duration)?;
    Ok(FinishedRun {
        summary,
        transcript: log.path().to_path_buf(),
    })
}

/// Report a run's outcome. Reaching the deadline during a standby wait or a
/// reconnection loop terminates the process here.
fn finish_run(outcome: Result<FinishedRun, RunError>) -> Result<()> {
    match outcome {
        Ok(finished) => {
            print!(
                "{}",
                report::render_summary(&finished.summary, &finished.transcript)
            );
            Ok(())
        }
        Err(RunError::DeadlineExceeded { duration_secs }) => {
            warn!(duration_secs, "run deadline reached while the device was unavailable");
            println!("Test duration of {duration_secs} seconds reached; stopping.");
            process::exit(0);
        }
        Err(RunError::Unhandled(e)) => {
            error!(error = %format!("{e:#}"), "run ended with an unhandled error");
            println!("Run ended early: {e:#}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn config_source(config_path: Option<&Path>) -> String {
    match config_path {
        Some(p) => format!("loaded config from {}", p.display()),
        None => "no .stb-soak/config.toml found, using defaults".to_string(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let is_report_command = matches!(
        &cli.command,
        Some(Command::Config { .. } | Command::Profiles { .. } | Command::Completions { .. })
    );

    let filter = match cli.verbose {
        0 if is_report_command => "stb_soak=warn",
        0 => "stb_soak=info",
        1 => "stb_soak=debug",
        _ => "stb_soak=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (config, config_path) = ProjectConfig::load(&cwd)?;
    info!("{}", config_source(config_path.as_deref()));

    match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => {
            require_detachable_session(&config);
            let catalog = load_catalog(&config)?;
            let adb = AdbChannel::new(&config.adb);
            while let Some(selection) = menu::select_run(&catalog, &adb, config.adb.port)? {
                let outcome = start_run(&config, &adb, &selection.plan, &selection.request);
                if let Err(e) = finish_run(outcome) {
                    println!("{e:#}");
                }
            }
        }
        Command::Run {
            profile,
            test,
            address,
            duration,
            label,
        } => {
            require_detachable_session(&config);
            let catalog = load_catalog(&config)?;
            let plan = catalog.plan(&profile, test)?;
            let request = RunRequest::from_operator(
                plan,
                &address,
                duration,
                label.as_deref().unwrap_or_default(),
                config.adb.port,
            )?;
            let adb = AdbChannel::new(&config.adb);
            finish_run(start_run(&config, &adb, plan, &request))?;
        }
        Command::Profiles { json } => {
            let catalog = load_catalog(&config)?;
            if json {
                println!("{}", report::render_profiles_json(&catalog)?);
            } else {
                print!("{}", report::render_profiles_human(&catalog));
            }
        }
        Command::Devices => {
            let adb = AdbChannel::new(&config.adb);
            let devices = adb
                .list_devices()
                .context("failed to list devices (is adb installed and on PATH?)")?;
            print!("{}", report::render_devices(&devices));
        }
        Command::Config { json } => {
            if json {
                println!(
                    "{}",
                    report::render_config_json(&config, config_path.as_deref())?
                );
            } else {
                print!(
                    "{}",
                    report::render_config_human(&config, config_path.as_deref())
                );
            }
        }
        Command::Completions { shell } => shell_completion::print(shell)?,
    }

    Ok(())
}
