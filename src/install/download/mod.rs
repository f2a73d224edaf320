//! Download & archive installation
//!
//! Turns a registry entry into an installed binary:
//! resolve URL, stream archive into `<temp>/<dependency>/`, extract it there
//! unprivileged, then create the system binary directory and install the
//! binary through the privileged broker.
//!
//! ## Module Organization
//!
//! - `platform` - OS/architecture detection
//! - `registry` - Dependency descriptors and pinned download URLs
//! - `core` - Streaming download with partial-file cleanup
//! - `extract` - `tar` extraction and binary lookup

pub mod core;
pub mod extract;
pub mod platform;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use self::core::{build_client, download_to_file};
use self::extract::{extract_archive, locate_binary};
use self::platform::Platform;
use self::registry::DependencyDescriptor;
use super::command::CommandSpec;
use super::error::{SetupError, SetupResult};
use super::paths::EnvironmentPaths;
use super::privilege::CommandBroker;
use super::progress::{ProgressReporter, SetupStatus};

pub use self::platform::{Arch, Os};
pub use self::registry::{TENDERMINT, TENDERMINT_VERSION};

/// Where an archive install left the binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Installed into the system binary directory
    Installed(PathBuf),
    /// CI mode: left in the staging directory, no privileged step ran
    Staged(PathBuf),
}

impl InstallOutcome {
    pub fn path(&self) -> &Path {
        match self {
            InstallOutcome::Installed(p) | InstallOutcome::Staged(p) => p,
        }
    }
}

/// Installs a network-distributed dependency
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(
        &self,
        dependency: &DependencyDescriptor,
        platform: Platform,
        progress: &ProgressReporter,
    ) -> SetupResult<InstallOutcome>;
}

/// Installer backed by HTTP downloads, `tar` and the command broker
pub struct ArchiveInstaller {
    client: reqwest::Client,
    broker: Arc<dyn CommandBroker>,
    paths: EnvironmentPaths,
    target_dir: PathBuf,
    ci: bool,
}

impl ArchiveInstaller {
    pub fn new(
        broker: Arc<dyn CommandBroker>,
        paths: EnvironmentPaths,
        target_dir: impl Into<PathBuf>,
        ci: bool,
    ) -> SetupResult<Self> {
        Ok(Self {
            client: build_client()?,
            broker,
            paths,
            target_dir: target_dir.into(),
            ci,
        })
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Full download/extract/install path for one dependency.
    ///
    /// Always does the whole sequence; skipping already-present dependencies
    /// is the caller's job.
    pub async fn install_from_archive(
        &self,
        dependency: &DependencyDescriptor,
        platform: Platform,
        target_dir: &Path,
        progress: &ProgressReporter,
    ) -> SetupResult<InstallOutcome> {
        // Resolve before touching disk or network
        let url = dependency.download_url(platform)?;

        let stage = self.paths.staging_dir(&dependency.name);
        reset_dir(&stage).await?;
        let archive = stage.join(format!("{}.tar.gz", dependency.name));

        progress.emit(
            SetupStatus::Downloading,
            format!("Downloading {}", dependency.display_name),
        );
        download_to_file(&self.client, url, &archive).await?;

        extract_archive(self.broker.as_ref(), &archive, &stage).await?;
        let binary = locate_binary(&stage, &dependency.binary_name)?;

        if self.ci {
            info!(
                "CI mode: leaving {} staged at {}",
                dependency.name,
                binary.display()
            );
            return Ok(InstallOutcome::Staged(binary));
        }

        if !target_dir.is_dir() {
            self.broker
                .run_privileged(&CommandSpec::elevated("mkdir").arg("-p").path_arg(target_dir))
                .await?;
        }

        let dest = target_dir.join(&dependency.binary_name);
        self.broker
            .run_privileged(
                &CommandSpec::elevated("install")
                    .args(["-m", "0755"])
                    .path_arg(&binary)
                    .path_arg(&dest),
            )
            .await?;
        info!("Installed {} to {}", dependency.name, dest.display());

        if let Err(e) = tokio::fs::remove_dir_all(&stage).await {
            warn!("Failed to clean staging directory {}: {e}", stage.display());
        }

        Ok(InstallOutcome::Installed(dest))
    }
}

#[async_trait]
impl DependencyInstaller for ArchiveInstaller {
    async fn install(
        &self,
        dependency: &DependencyDescriptor,
        platform: Platform,
        progress: &ProgressReporter,
    ) -> SetupResult<InstallOutcome> {
        self.install_from_archive(dependency, platform, &self.target_dir, progress)
            .await
    }
}

/// Start a dependency's staging directory empty
async fn reset_dir(dir: &Path) -> SetupResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(SetupError::io(dir, e)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SetupError::io(dir, e))
}
