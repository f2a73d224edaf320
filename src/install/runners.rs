//! Runners for the command-line entry points
//!
//! Each runner drives one library operation and renders its result for a
//! terminal, or as JSON lines when a host UI reads stdout.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use tokio::sync::mpsc;

use super::detection::DependencyState;
use super::orchestration::{SetupPipeline, SetupReport};
use super::paths::EnvironmentPaths;
use super::progress::{ProgressEvent, ProgressReporter, SetupStatus};
use super::provision::{
    EnvironmentProvisioner, MIDDLEWARE_VERSION, ProvisionAction, read_version_marker,
    write_version_marker,
};

const PROGRESS_CAPACITY: usize = 64;

/// Run the setup pipeline, rendering progress as it happens
pub async fn run_setup(pipeline: &SetupPipeline, json: bool) -> Result<SetupReport> {
    let (reporter, rx) = ProgressReporter::channel(PROGRESS_CAPACITY);

    let renderer = if json {
        tokio::spawn(render_json(rx))
    } else {
        tokio::spawn(render_spinner(rx))
    };

    let result = pipeline.ensure_ready(&reporter).await;
    drop(reporter);
    if let Err(e) = renderer.await {
        warn!("Progress renderer stopped: {e}");
    }

    let report = result.context("Environment setup failed")?;
    if !json {
        let mut stdout = std::io::stdout().lock();
        for name in &report.installed {
            let _ = writeln!(stdout, "✅ Installed {name}");
        }
        for name in &report.already_present {
            let _ = writeln!(stdout, "✔  {name} already present");
        }
    }
    Ok(report)
}

async fn render_json(mut rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{line}");
                let _ = stdout.flush();
            }
            Err(e) => warn!("Failed to serialize progress event: {e}"),
        }
    }
}

async fn render_spinner(mut rx: mpsc::Receiver<ProgressEvent>) {
    let spinner = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        Ok(style) => spinner.set_style(style),
        Err(e) => warn!("Invalid spinner template: {e}"),
    }
    spinner.enable_steady_tick(Duration::from_millis(100));

    while let Some(event) = rx.recv().await {
        match event.status {
            SetupStatus::Installed => spinner.finish_with_message(format!("✅ {}", event.message)),
            SetupStatus::Failed => spinner.abandon_with_message(format!("❌ {}", event.message)),
            SetupStatus::Downloading => spinner.set_message(format!("📥 {}", event.message)),
            SetupStatus::Installing => spinner.set_message(format!("📦 {}", event.message)),
            SetupStatus::CreatingDirectories | SetupStatus::Idle => {
                spinner.set_message(event.message)
            }
        }
    }
    if !spinner.is_finished() {
        spinner.finish_and_clear();
    }
}

/// Print each dependency's presence and the installed middleware version
pub fn run_status(pipeline: &SetupPipeline) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for dependency in pipeline.dependencies() {
        match pipeline.detector().state(&dependency.detect_command) {
            DependencyState::Installed(path) => {
                writeln!(stdout, "✅ {:<12} {}", dependency.name, path.display())?
            }
            DependencyState::Absent => {
                writeln!(stdout, "❌ {:<12} not installed", dependency.name)?
            }
        }
    }

    let version_file = &pipeline.paths().version_file;
    match read_version_marker(version_file)? {
        Some(v) if v == MIDDLEWARE_VERSION => writeln!(stdout, "✅ {:<12} {v}", "middleware")?,
        Some(v) => writeln!(
            stdout,
            "⚠️  {:<12} {v} (pinned {MIDDLEWARE_VERSION})",
            "middleware"
        )?,
        None => writeln!(stdout, "❌ {:<12} not provisioned", "middleware")?,
    }
    Ok(())
}

/// Create or upgrade the middleware environment
pub async fn run_provision(pipeline: &SetupPipeline, entrypoint_dir: &Path) -> Result<()> {
    let provisioner = EnvironmentProvisioner::new(pipeline.broker());
    let outcome = provisioner
        .ensure_middleware(pipeline.paths(), entrypoint_dir)
        .await
        .context("Failed to provision middleware environment")?;

    let mut stdout = std::io::stdout().lock();
    match &outcome.action {
        ProvisionAction::Fresh => {
            writeln!(stdout, "✅ Installed middleware {MIDDLEWARE_VERSION}")?
        }
        ProvisionAction::Upgraded { from } => {
            writeln!(stdout, "✅ Upgraded middleware {from} → {MIDDLEWARE_VERSION}")?
        }
        ProvisionAction::UpToDate => {
            writeln!(stdout, "✔  Middleware {MIDDLEWARE_VERSION} already installed")?
        }
    }
    match &outcome.entrypoint {
        Some(path) => writeln!(stdout, "   CLI: {}", path.display())?,
        None => writeln!(stdout, "⚠️  CLI entrypoint could not be copied")?,
    }
    Ok(())
}

/// Force-reinstall the pinned middleware package
pub async fn run_reinstall(pipeline: &SetupPipeline) -> Result<()> {
    let paths = pipeline.paths();
    let provisioner = EnvironmentProvisioner::new(pipeline.broker());

    if !paths.venv_python("python").exists() {
        provisioner
            .create_environment(&paths.venv_dir)
            .await
            .context("Failed to create middleware environment")?;
    }
    provisioner
        .reinstall_package(&paths.venv_dir, MIDDLEWARE_VERSION)
        .await
        .context("Failed to reinstall middleware")?;
    write_version_marker(&paths.version_file, MIDDLEWARE_VERSION)?;

    writeln!(
        std::io::stdout().lock(),
        "✅ Reinstalled middleware {MIDDLEWARE_VERSION}"
    )?;
    Ok(())
}

/// Print the resolved path registry
pub fn print_paths(paths: &EnvironmentPaths) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for (name, path) in paths.entries() {
        writeln!(stdout, "{name:<10} {}", path.display())?;
    }
    Ok(())
}
