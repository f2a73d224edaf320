//! Capability detection
//!
//! Answers "is external command X available" by searching the augmented
//! search path from the `ExecutionContext`. This is the only source of truth
//! for dependency presence: setup never records installation state of its
//! own, it re-asks the detector on every run.

use std::path::PathBuf;

use log::debug;

use super::environment::ExecutionContext;

/// Observed state of an external dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyState {
    /// Not found on the search path
    Absent,
    /// Found at the given location
    Installed(PathBuf),
}

impl DependencyState {
    pub fn is_installed(&self) -> bool {
        matches!(self, DependencyState::Installed(_))
    }
}

/// Looks up commands on a search path
pub trait CapabilityProbe: Send + Sync {
    /// Absolute path of `command`, or `None` when it cannot be found.
    /// Never fails: absence is a normal answer.
    fn resolve(&self, command: &str) -> Option<PathBuf>;

    fn is_installed(&self, command: &str) -> bool {
        self.resolve(command).is_some()
    }

    fn state(&self, command: &str) -> DependencyState {
        match self.resolve(command) {
            Some(path) => DependencyState::Installed(path),
            None => DependencyState::Absent,
        }
    }
}

/// Detector backed by `which` over the context's augmented search path
#[derive(Debug, Clone)]
pub struct SearchPathDetector {
    ctx: ExecutionContext,
}

impl SearchPathDetector {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }
}

impl CapabilityProbe for SearchPathDetector {
    fn resolve(&self, command: &str) -> Option<PathBuf> {
        if command.is_empty() {
            return None;
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        match which::which_in(command, Some(self.ctx.path_var()), &cwd) {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("{command} not found on {}: {e}", self.ctx.path_display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn detector_with(dir: &Path) -> SearchPathDetector {
        let ctx = ExecutionContext::from_vars(
            vec![(OsString::from("PATH"), OsString::from("/nonexistent-bin"))],
            &[dir.to_path_buf()],
        );
        SearchPathDetector::new(ctx)
    }

    #[test]
    #[cfg(unix)]
    fn test_finds_command_in_augmented_location() {
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("pearl-fake-tool");
        fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let detector = detector_with(temp.path());
        assert!(detector.is_installed("pearl-fake-tool"));
        assert_eq!(
            detector.state("pearl-fake-tool"),
            DependencyState::Installed(tool.clone())
        );
    }

    #[test]
    fn test_missing_command_is_false_not_error() {
        let temp = TempDir::new().unwrap();
        let detector = detector_with(temp.path());
        assert!(!detector.is_installed("definitely-not-a-real-command-xyz"));
        assert_eq!(
            detector.state("definitely-not-a-real-command-xyz"),
            DependencyState::Absent
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_non_executable_file_is_not_installed() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("plain-file"), "data").unwrap();
        let detector = detector_with(temp.path());
        assert!(!detector.is_installed("plain-file"));
    }

    #[test]
    fn test_empty_command_is_absent() {
        let temp = TempDir::new().unwrap();
        assert!(!detector_with(temp.path()).is_installed(""));
    }
}
