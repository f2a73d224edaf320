//! Setup pipeline
//!
//! Brings a machine to a state where the backend can run. Every step
//! re-checks the filesystem or the search path instead of trusting earlier
//! runs, so an interrupted setup resumes from its first incomplete step.
//!
//! Order:
//! 1. root data directory
//! 2. setup lock, temp directory
//! 3. network-installed dependencies (detect, install, verify)
//! 4. interpreter and version-control tooling, when enabled

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use super::command::CommandSpec;
use super::detection::{CapabilityProbe, SearchPathDetector};
use super::download::platform::{Os, Platform};
use super::download::registry::{DependencyDescriptor, TENDERMINT};
use super::download::{ArchiveInstaller, DependencyInstaller, InstallOutcome};
use super::environment::ExecutionContext;
use super::error::{SetupError, SetupResult};
use super::lock::SetupLock;
use super::paths::EnvironmentPaths;
use super::privilege::{CommandBroker, SystemBroker};
use super::progress::{INSTALLING_MARKER, ProgressReporter, SetupStatus};
use crate::config::SetupConfig;

/// Switches that change what the pipeline does, not where
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Skip privileged installs and post-install verification
    pub ci: bool,
    pub verify_after_install: bool,
    pub ensure_system_tools: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            ci: false,
            verify_after_install: true,
            ensure_system_tools: false,
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub installed: Vec<String>,
    pub already_present: Vec<String>,
}

/// A system tool the backend needs next to the downloaded dependencies
struct SystemTool {
    command: &'static str,
    apt_packages: &'static [&'static str],
    brew_formula: &'static str,
}

const SYSTEM_TOOLS: &[SystemTool] = &[
    SystemTool {
        command: "python3.10",
        apt_packages: &["python3.10", "python3.10-dev", "python3-pip"],
        brew_formula: "python@3.10",
    },
    SystemTool {
        command: "git",
        apt_packages: &["git"],
        brew_formula: "git",
    },
];

pub struct SetupPipeline {
    paths: EnvironmentPaths,
    detector: Arc<dyn CapabilityProbe>,
    broker: Arc<dyn CommandBroker>,
    installer: Arc<dyn DependencyInstaller>,
    platform: Platform,
    dependencies: Vec<DependencyDescriptor>,
    options: PipelineOptions,
}

impl SetupPipeline {
    pub fn new(
        paths: EnvironmentPaths,
        detector: Arc<dyn CapabilityProbe>,
        broker: Arc<dyn CommandBroker>,
        installer: Arc<dyn DependencyInstaller>,
        platform: Platform,
    ) -> Self {
        Self {
            paths,
            detector,
            broker,
            installer,
            platform,
            dependencies: vec![TENDERMINT.clone()],
            options: PipelineOptions::default(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<DependencyDescriptor>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Pipeline wired to the real search path, subprocesses and network
    pub fn system(paths: EnvironmentPaths, config: &SetupConfig) -> SetupResult<Self> {
        let ctx = ExecutionContext::from_process(&config.extra_search_paths);
        let options = PipelineOptions {
            ci: ctx.is_ci(),
            verify_after_install: config.verify_after_install,
            ensure_system_tools: config.ensure_system_tools,
        };
        let platform = Platform::detect()?;

        let detector: Arc<dyn CapabilityProbe> = Arc::new(SearchPathDetector::new(ctx.clone()));
        let broker: Arc<dyn CommandBroker> = Arc::new(SystemBroker::new(ctx, &config.prompt_name));
        let installer = Arc::new(ArchiveInstaller::new(
            broker.clone(),
            paths.clone(),
            &config.bin_dir,
            options.ci,
        )?);

        Ok(Self::new(paths, detector, broker, installer, platform).with_options(options))
    }

    pub fn paths(&self) -> &EnvironmentPaths {
        &self.paths
    }

    pub fn dependencies(&self) -> &[DependencyDescriptor] {
        &self.dependencies
    }

    pub fn detector(&self) -> &dyn CapabilityProbe {
        self.detector.as_ref()
    }

    pub fn broker(&self) -> Arc<dyn CommandBroker> {
        self.broker.clone()
    }

    /// Run the whole pipeline, reporting a terminal event either way
    pub async fn ensure_ready(&self, progress: &ProgressReporter) -> SetupResult<SetupReport> {
        match self.run(progress).await {
            Ok(report) => {
                info!(
                    "Setup complete: installed {:?}, already present {:?}",
                    report.installed, report.already_present
                );
                progress.emit(SetupStatus::Installed, "Setup complete");
                Ok(report)
            }
            Err(e) => {
                // the legacy in-progress marker must not leak into failures
                let message =
                    format!("Setup failed: {e}").replace(INSTALLING_MARKER, "installing");
                progress.emit(SetupStatus::Failed, message);
                Err(e)
            }
        }
    }

    async fn run(&self, progress: &ProgressReporter) -> SetupResult<SetupReport> {
        if !self.platform.has_setup_procedure() {
            return Err(SetupError::UnsupportedPlatform {
                dependency: "setup".to_string(),
                os: self.platform.os.to_string(),
                arch: self.platform.arch.to_string(),
            });
        }

        progress.emit(SetupStatus::CreatingDirectories, "Creating required directories");
        create_dir(&self.paths.root).await?;
        let _lock = SetupLock::acquire(&self.paths.lock_file)?;
        create_dir(&self.paths.temp_dir).await?;

        let mut report = SetupReport::default();
        for dependency in &self.dependencies {
            if self.detector.is_installed(&dependency.detect_command) {
                info!("{} already installed", dependency.name);
                report.already_present.push(dependency.name.clone());
                continue;
            }

            progress.emit(
                SetupStatus::Installing,
                format!("Installing {}", dependency.display_name),
            );
            let outcome = self
                .installer
                .install(dependency, self.platform, progress)
                .await?;
            self.verify(dependency, &outcome)?;
            report.installed.push(dependency.name.clone());
        }

        if self.options.ensure_system_tools {
            self.ensure_system_tools(progress, &mut report).await?;
        }

        Ok(report)
    }

    fn verify(
        &self,
        dependency: &DependencyDescriptor,
        outcome: &InstallOutcome,
    ) -> SetupResult<()> {
        if self.options.ci || !self.options.verify_after_install {
            return Ok(());
        }
        if let InstallOutcome::Staged(path) = outcome {
            warn!("{} left staged at {}", dependency.name, path.display());
            return Ok(());
        }
        if self.detector.is_installed(&dependency.detect_command) {
            Ok(())
        } else {
            Err(SetupError::VerificationFailed {
                dependency: dependency.name.clone(),
                command: dependency.detect_command.clone(),
            })
        }
    }

    async fn ensure_system_tools(
        &self,
        progress: &ProgressReporter,
        report: &mut SetupReport,
    ) -> SetupResult<()> {
        for tool in SYSTEM_TOOLS {
            if self.detector.is_installed(tool.command) {
                report.already_present.push(tool.command.to_string());
                continue;
            }
            if self.options.ci {
                warn!("CI mode: not installing {}", tool.command);
                continue;
            }

            progress.emit(SetupStatus::Installing, format!("Setting up {}", tool.command));
            let spec = match self.platform.os {
                Os::Linux => CommandSpec::elevated("apt-get")
                    .args(["install", "-y"])
                    .args(tool.apt_packages.iter().copied()),
                Os::MacOs => CommandSpec::user("brew").args(["install", tool.brew_formula]),
                Os::Windows | Os::FreeBsd => {
                    return Err(SetupError::UnsupportedPlatform {
                        dependency: tool.command.to_string(),
                        os: self.platform.os.to_string(),
                        arch: self.platform.arch.to_string(),
                    });
                }
            };
            self.broker.execute(&spec).await?;

            if self.options.verify_after_install && !self.detector.is_installed(tool.command) {
                return Err(SetupError::VerificationFailed {
                    dependency: tool.command.to_string(),
                    command: tool.command.to_string(),
                });
            }
            report.installed.push(tool.command.to_string());
        }
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> SetupResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SetupError::io(dir, e))
}
