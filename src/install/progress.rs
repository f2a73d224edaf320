//! Setup progress events
//!
//! Events travel over a bounded channel to whichever frontend is watching
//! (terminal spinner, JSON lines for the host UI). Each event carries a
//! structured status next to the legacy free-text message; consumers that
//! still match on `"Installing"` keep working because only the
//! install-begun message contains that word.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event channel name the host UI subscribes to
pub const PROGRESS_CHANNEL: &str = "response";

/// Version of the event payload layout
pub const PROGRESS_SCHEMA_VERSION: u32 = 1;

/// Substring legacy consumers look for to detect an in-progress install
pub const INSTALLING_MARKER: &str = "Installing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    Idle,
    CreatingDirectories,
    Downloading,
    Installing,
    Installed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub version: u32,
    pub channel: String,
    pub status: SetupStatus,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(status: SetupStatus, message: impl Into<String>) -> Self {
        Self {
            version: PROGRESS_SCHEMA_VERSION,
            channel: PROGRESS_CHANNEL.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Legacy check: does the message announce an installation
    pub fn signals_installing(&self) -> bool {
        self.message.contains(INSTALLING_MARKER)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SetupStatus::Installed | SetupStatus::Failed)
    }
}

/// Sending half of the progress channel.
///
/// Reporting never fails setup: a full or closed channel turns reporting off
/// for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
    disabled: Arc<AtomicBool>,
}

impl ProgressReporter {
    /// Create a reporter and the receiver a frontend drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                disabled: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Reporter that only logs
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, status: SetupStatus, message: impl Into<String>) {
        let event = ProgressEvent::new(status, message);
        info!("[{PROGRESS_CHANNEL}] {}", event.message);

        let Some(tx) = &self.tx else {
            return;
        };
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = tx.try_send(event) {
            warn!("Progress reporting disabled: {e}");
            self.disabled.store(true, Ordering::Relaxed);
        }
    }
}
