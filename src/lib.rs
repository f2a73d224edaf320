//! First-launch environment setup for the Pearl desktop app
//!
//! The desktop shell calls [`install::ensure_environment_ready`] on startup
//! and forwards the [`install::ProgressEvent`]s to its UI.

pub mod config;
pub mod install;
pub mod logging;
