//! Error taxonomy for the setup orchestrator.
//!
//! Every failure a setup attempt can hit is one variant here, so the host UI
//! can tell a denied prompt apart from a dead network or a missing tool.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the setup components.
#[derive(Debug, Error)]
pub enum SetupError {
    // === Command resolution & execution ===
    /// The command could not be resolved on the augmented search path
    #[error("Command `{command}` not found; search path: {search_path}")]
    CommandNotFound { command: String, search_path: String },

    /// The subprocess failed to spawn or exited non-zero
    #[error("Error running {command}: {reason}; stdout: {stdout}; stderr: {stderr}")]
    ExecutionFailed {
        command: String,
        reason: String,
        stdout: String,
        stderr: String,
    },

    /// The user declined the elevation prompt
    #[error("Authorization denied while running {command}")]
    AuthorizationDenied { command: String },

    /// A command descriptor failed validation before execution
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // === Download ===
    /// Network or I/O failure while streaming an archive
    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// No download is registered for this OS/architecture pair
    #[error("{dependency} has no download for {os}-{arch}")]
    UnsupportedPlatform {
        dependency: String,
        os: String,
        arch: String,
    },

    /// The extracted archive did not contain the expected binary
    #[error("{name} not found in extracted archive at {}", dir.display())]
    MissingArtifact { name: String, dir: PathBuf },

    // === Pipeline ===
    /// The detector still reports the dependency absent after installing it
    #[error("{dependency} was installed but `{command}` is still not on the search path")]
    VerificationFailed { dependency: String, command: String },

    /// Another setup run holds the lock on the data root
    #[error("Another setup is already running (lock held at {})", lock.display())]
    AlreadyRunning { lock: PathBuf },

    // === Path & IO ===
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SetupError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a `DownloadFailed` from any displayable cause
    pub fn download(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::DownloadFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias for setup operations
pub type SetupResult<T> = Result<T, SetupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failed_carries_captured_output() {
        let err = SetupError::ExecutionFailed {
            command: "tar -xzf x.tar.gz".to_string(),
            reason: "exit status: 2".to_string(),
            stdout: "partial listing".to_string(),
            stderr: "gzip: stdin: not in gzip format".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("tar -xzf"));
        assert!(msg.contains("partial listing"));
        assert!(msg.contains("not in gzip format"));
    }

    #[test]
    fn test_unsupported_platform_display() {
        let err = SetupError::UnsupportedPlatform {
            dependency: "tendermint".to_string(),
            os: "freebsd".to_string(),
            arch: "x64".to_string(),
        };
        assert_eq!(err.to_string(), "tendermint has no download for freebsd-x64");
    }
}
