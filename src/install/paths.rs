//! Environment path registry
//!
//! Resolves every filesystem location the orchestrator reads or writes from
//! the build mode and the user's home directory. Nothing else in the crate
//! joins data-directory paths by hand; components take an `EnvironmentPaths`.
//!
//! Layout (production):
//! - `~/.operate/`            root data directory
//! - `~/.operate/services/`   owned by the middleware, never written here
//! - `~/.operate/venv/`       provisioned interpreter environment
//! - `~/.operate/temp/`       download/extract scratch space
//! - `~/.operate/version.txt` installed middleware version marker
//! - `~/.operate/*.log`       one log file per subsystem

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name of the root data directory
pub const ROOT_DIR_NAME: &str = ".operate";

/// Build mode the paths are resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Production,
    Development,
}

impl BuildMode {
    /// `PEARL_ENV=development` selects development mode, anything else production
    pub fn from_env() -> Self {
        match std::env::var("PEARL_ENV") {
            Ok(v) if v.eq_ignore_ascii_case("development") => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Logical subsystems that own a log file under the root directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFile {
    /// Middleware CLI output
    Cli,
    /// This orchestrator
    Setup,
    /// Host UI frontend
    Ui,
}

impl LogFile {
    fn file_name(self) -> &'static str {
        match self {
            LogFile::Cli => "cli.log",
            LogFile::Setup => "setup.log",
            LogFile::Ui => "ui.log",
        }
    }
}

/// Immutable set of resolved paths, computed once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentPaths {
    pub root: PathBuf,
    pub services_dir: PathBuf,
    pub venv_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub version_file: PathBuf,
    pub lock_file: PathBuf,
    /// OS-global scratch directory, the only path outside `root`
    pub os_temp_dir: PathBuf,
    cli_log: PathBuf,
    setup_log: PathBuf,
    ui_log: PathBuf,
}

impl EnvironmentPaths {
    /// Resolve the registry. Pure: touches no filesystem state.
    ///
    /// Production roots under `home`; development uses a fixed relative
    /// directory so a checkout keeps its own state.
    pub fn resolve(mode: BuildMode, home: &Path, os_temp: &Path) -> Self {
        let root = match mode {
            BuildMode::Production => home.join(ROOT_DIR_NAME),
            BuildMode::Development => PathBuf::from(ROOT_DIR_NAME),
        };
        Self::with_root(root, os_temp)
    }

    /// Resolve against an explicit root directory
    pub fn with_root(root: PathBuf, os_temp: &Path) -> Self {
        Self {
            services_dir: root.join("services"),
            venv_dir: root.join("venv"),
            temp_dir: root.join("temp"),
            version_file: root.join("version.txt"),
            lock_file: root.join(".setup.lock"),
            os_temp_dir: os_temp.join("pearl"),
            cli_log: root.join(LogFile::Cli.file_name()),
            setup_log: root.join(LogFile::Setup.file_name()),
            ui_log: root.join(LogFile::Ui.file_name()),
            root,
        }
    }

    /// Resolve from the current user's home and the OS temp directory
    pub fn from_system(mode: BuildMode) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::resolve(mode, &home, &std::env::temp_dir())
    }

    pub fn log_file(&self, log: LogFile) -> &Path {
        match log {
            LogFile::Cli => &self.cli_log,
            LogFile::Setup => &self.setup_log,
            LogFile::Ui => &self.ui_log,
        }
    }

    /// Staging directory for one dependency inside the shared temp directory
    pub fn staging_dir(&self, dependency: &str) -> PathBuf {
        self.temp_dir.join(dependency)
    }

    /// Interpreter inside the provisioned environment
    pub fn venv_python(&self, interpreter: &str) -> PathBuf {
        self.venv_dir.join("bin").join(interpreter)
    }

    /// Every named path, for display and auditing
    pub fn entries(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("root", self.root.as_path()),
            ("services", self.services_dir.as_path()),
            ("venv", self.venv_dir.as_path()),
            ("temp", self.temp_dir.as_path()),
            ("version", self.version_file.as_path()),
            ("lock", self.lock_file.as_path()),
            ("os-temp", self.os_temp_dir.as_path()),
            ("cli-log", self.cli_log.as_path()),
            ("setup-log", self.setup_log.as_path()),
            ("ui-log", self.ui_log.as_path()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_root_is_under_home() {
        let paths = EnvironmentPaths::resolve(
            BuildMode::Production,
            Path::new("/home/alice"),
            Path::new("/tmp"),
        );
        assert_eq!(paths.root, PathBuf::from("/home/alice/.operate"));
        assert_eq!(paths.venv_dir, PathBuf::from("/home/alice/.operate/venv"));
        assert_eq!(paths.temp_dir, PathBuf::from("/home/alice/.operate/temp"));
        assert_eq!(
            paths.version_file,
            PathBuf::from("/home/alice/.operate/version.txt")
        );
    }

    #[test]
    fn test_development_root_is_fixed_relative() {
        let paths = EnvironmentPaths::resolve(
            BuildMode::Development,
            Path::new("/home/alice"),
            Path::new("/tmp"),
        );
        assert_eq!(paths.root, PathBuf::from(".operate"));
        assert!(paths.root.is_relative());
    }

    #[test]
    fn test_all_paths_but_os_temp_live_under_root() {
        let paths = EnvironmentPaths::resolve(
            BuildMode::Production,
            Path::new("/home/alice"),
            Path::new("/var/tmp"),
        );
        for (name, path) in paths.entries() {
            if name == "os-temp" {
                assert_eq!(path, Path::new("/var/tmp/pearl"));
            } else {
                assert!(path.starts_with(&paths.root), "{name} escapes the root");
            }
        }
    }

    #[test]
    fn test_log_files_are_distinct_per_subsystem() {
        let paths = EnvironmentPaths::with_root(PathBuf::from("/r"), Path::new("/tmp"));
        assert_eq!(paths.log_file(LogFile::Cli), Path::new("/r/cli.log"));
        assert_eq!(paths.log_file(LogFile::Setup), Path::new("/r/setup.log"));
        assert_eq!(paths.log_file(LogFile::Ui), Path::new("/r/ui.log"));
    }

    #[test]
    fn test_staging_dir_is_namespaced_by_dependency() {
        let paths = EnvironmentPaths::with_root(PathBuf::from("/r"), Path::new("/tmp"));
        assert_eq!(paths.staging_dir("tendermint"), PathBuf::from("/r/temp/tendermint"));
        assert_eq!(
            paths.venv_python("python3.10"),
            PathBuf::from("/r/venv/bin/python3.10")
        );
    }
}
