//! Isolated interpreter environment and middleware package
//!
//! Everything here runs unprivileged and stays inside the data root, except
//! the copied CLI entrypoint which lands wherever the caller points it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::command::CommandSpec;
use super::error::{SetupError, SetupResult};
use super::paths::EnvironmentPaths;
use super::privilege::CommandBroker;

/// Package installed into the environment
pub const MIDDLEWARE_PACKAGE: &str = "olas-operate-middleware";

/// Pinned middleware release; bump here to upgrade every install
pub const MIDDLEWARE_VERSION: &str = "0.1.0rc1";

/// Interpreter used to create the environment
pub const INTERPRETER: &str = "python3.10";

/// Console script the package installs into the environment
pub const CLI_ENTRYPOINT: &str = "operate";

/// What `ensure_middleware` had to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionAction {
    /// No trusted marker or no installed package: plain install
    Fresh,
    /// Marker recorded another version: forced reinstall
    Upgraded { from: String },
    /// Marker already matches the pinned version
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub action: ProvisionAction,
    /// Copied entrypoint, `None` when the copy failed
    pub entrypoint: Option<PathBuf>,
}

pub struct EnvironmentProvisioner {
    broker: Arc<dyn CommandBroker>,
    interpreter: String,
}

impl EnvironmentProvisioner {
    pub fn new(broker: Arc<dyn CommandBroker>) -> Self {
        Self::with_interpreter(broker, INTERPRETER)
    }

    pub fn with_interpreter(
        broker: Arc<dyn CommandBroker>,
        interpreter: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            interpreter: interpreter.into(),
        }
    }

    /// `<interpreter> -m venv <env_path>`
    pub async fn create_environment(&self, env_path: &Path) -> SetupResult<()> {
        info!("Creating interpreter environment at {}", env_path.display());
        let spec = CommandSpec::user(&self.interpreter)
            .args(["-m", "venv"])
            .path_arg(env_path);
        self.broker.run_unprivileged(&spec).await?;
        Ok(())
    }

    /// Install the pinned package with the environment's own pip
    pub async fn install_package(&self, env_path: &Path, version: &str) -> SetupResult<()> {
        info!("Installing {MIDDLEWARE_PACKAGE}=={version}");
        self.broker
            .run_unprivileged(&pip_install(env_path, version, false))
            .await?;
        Ok(())
    }

    /// Same as `install_package`, replacing whatever is installed
    pub async fn reinstall_package(&self, env_path: &Path, version: &str) -> SetupResult<()> {
        info!("Reinstalling {MIDDLEWARE_PACKAGE}=={version}");
        self.broker
            .run_unprivileged(&pip_install(env_path, version, true))
            .await?;
        Ok(())
    }

    /// Copy the environment's CLI entrypoint to `<dest_dir>/operate`.
    ///
    /// A failed copy returns `Ok(false)`; only a failure to clear the old
    /// destination is an error.
    pub async fn install_cli_entrypoint(
        &self,
        env_path: &Path,
        dest_dir: &Path,
    ) -> SetupResult<bool> {
        let source = env_path.join("bin").join(CLI_ENTRYPOINT);
        let dest = dest_dir.join(CLI_ENTRYPOINT);

        match tokio::fs::remove_file(&dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SetupError::io(&dest, e)),
        }

        if let Err(e) = tokio::fs::create_dir_all(dest_dir).await {
            warn!("Failed to create {}: {e}", dest_dir.display());
            return Ok(false);
        }
        match tokio::fs::copy(&source, &dest).await {
            Ok(_) => {
                info!("Exposed {} at {}", CLI_ENTRYPOINT, dest.display());
                Ok(true)
            }
            Err(e) => {
                warn!(
                    "Failed to copy {} to {}: {e}",
                    source.display(),
                    dest.display()
                );
                Ok(false)
            }
        }
    }

    /// Bring the environment to the pinned middleware version.
    ///
    /// The marker is only trusted while the environment still holds the
    /// installed entrypoint; a recreated or emptied environment gets a fresh
    /// install. The marker is written once the entrypoint is present.
    pub async fn ensure_middleware(
        &self,
        paths: &EnvironmentPaths,
        entrypoint_dir: &Path,
    ) -> SetupResult<ProvisionOutcome> {
        let created = !paths.venv_python("python").exists();
        if created {
            self.create_environment(&paths.venv_dir).await?;
        }

        let installed_entrypoint = paths.venv_dir.join("bin").join(CLI_ENTRYPOINT);
        let marker = if created || !installed_entrypoint.is_file() {
            None
        } else {
            read_version_marker(&paths.version_file)?
        };

        let action = match marker {
            None => {
                self.install_package(&paths.venv_dir, MIDDLEWARE_VERSION)
                    .await?;
                ProvisionAction::Fresh
            }
            Some(installed) if installed != MIDDLEWARE_VERSION => {
                self.reinstall_package(&paths.venv_dir, MIDDLEWARE_VERSION)
                    .await?;
                ProvisionAction::Upgraded { from: installed }
            }
            Some(_) => ProvisionAction::UpToDate,
        };

        let exposed = self
            .install_cli_entrypoint(&paths.venv_dir, entrypoint_dir)
            .await?;
        if installed_entrypoint.is_file() {
            write_version_marker(&paths.version_file, MIDDLEWARE_VERSION)?;
        } else {
            warn!(
                "{MIDDLEWARE_PACKAGE} left no `{CLI_ENTRYPOINT}` in {}; version marker not written",
                paths.venv_dir.display()
            );
        }

        Ok(ProvisionOutcome {
            action,
            entrypoint: exposed.then(|| entrypoint_dir.join(CLI_ENTRYPOINT)),
        })
    }
}

fn pip_install(env_path: &Path, version: &str, force: bool) -> CommandSpec {
    let pip = env_path.join("bin").join("pip");
    let spec = CommandSpec::user(pip.to_string_lossy()).arg("install");
    let spec = if force { spec.arg("--force-reinstall") } else { spec };
    spec.arg(format!("{MIDDLEWARE_PACKAGE}=={version}"))
}

/// Installed middleware version, `None` when no marker exists
pub fn read_version_marker(path: &Path) -> SetupResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => {
            let v = s.trim();
            Ok((!v.is_empty()).then(|| v.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SetupError::io(path, e)),
    }
}

pub fn write_version_marker(path: &Path, version: &str) -> SetupResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SetupError::io(parent, e))?;
    }
    std::fs::write(path, format!("{version}\n")).map_err(|e| SetupError::io(path, e))
}
