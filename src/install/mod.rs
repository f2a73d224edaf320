//! Pearl environment bootstrap
//!
//! Turns a bare machine into one that can run the Pearl backend: resolves
//! the data directory layout, finds or installs the consensus engine,
//! provisions the middleware environment and reports progress to the host
//! UI while doing so.

pub mod command;
pub mod detection;
pub mod download;
pub mod environment;
pub mod error;
pub mod lock;
pub mod orchestration;
pub mod paths;
pub mod privilege;
pub mod progress;
pub mod provision;
pub mod runners;

pub use detection::{CapabilityProbe, DependencyState, SearchPathDetector};
pub use download::{ArchiveInstaller, DependencyInstaller, InstallOutcome};
pub use environment::ExecutionContext;
pub use error::{SetupError, SetupResult};
pub use orchestration::{PipelineOptions, SetupPipeline, SetupReport};
pub use paths::{BuildMode, EnvironmentPaths, LogFile};
pub use privilege::{CommandBroker, CommandOutput, Elevation, SystemBroker};
pub use progress::{ProgressEvent, ProgressReporter, SetupStatus};
pub use provision::{EnvironmentProvisioner, ProvisionAction, ProvisionOutcome};

use crate::config::SetupConfig;

/// Ensure the environment is ready, installing whatever is missing
///
/// This is the entry point the desktop app calls during startup. It is safe
/// to call on every launch: present dependencies are detected and skipped.
pub async fn ensure_environment_ready(
    paths: EnvironmentPaths,
    config: &SetupConfig,
    progress: &ProgressReporter,
) -> SetupResult<SetupReport> {
    SetupPipeline::system(paths, config)?
        .ensure_ready(progress)
        .await
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fakes for the collaborator traits

    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::command::CommandSpec;
    use super::detection::CapabilityProbe;
    use super::download::platform::Platform;
    use super::download::registry::DependencyDescriptor;
    use super::download::{DependencyInstaller, InstallOutcome};
    use super::error::{SetupError, SetupResult};
    use super::privilege::{CommandBroker, CommandOutput};
    use super::progress::ProgressReporter;

    /// Probe answering from an in-memory set of command names
    #[derive(Default)]
    pub struct StaticProbe {
        present: Mutex<HashSet<String>>,
    }

    impl StaticProbe {
        pub fn add(&self, command: &str) {
            self.present.lock().unwrap().insert(command.to_string());
        }
    }

    impl CapabilityProbe for StaticProbe {
        fn resolve(&self, command: &str) -> Option<PathBuf> {
            self.present
                .lock()
                .unwrap()
                .contains(command)
                .then(|| PathBuf::from("/usr/local/bin").join(command))
        }
    }

    /// Broker that records every command and runs nothing
    #[derive(Default)]
    pub struct RecordingBroker {
        calls: Mutex<Vec<CommandSpec>>,
        failing: Mutex<HashSet<String>>,
        effects: Mutex<Vec<(String, Arc<StaticProbe>, String)>>,
    }

    impl RecordingBroker {
        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        /// Make every run of `program` exit non-zero
        pub fn fail_program(&self, program: &str) {
            self.failing.lock().unwrap().insert(program.to_string());
        }

        /// After `program` succeeds, `probe` reports `command` present
        pub fn on_success_add(&self, probe: Arc<StaticProbe>, program: &str, command: &str) {
            self.effects
                .lock()
                .unwrap()
                .push((program.to_string(), probe, command.to_string()));
        }

        fn record(&self, spec: &CommandSpec) -> SetupResult<CommandOutput> {
            spec.validate()?;
            self.calls.lock().unwrap().push(spec.clone());
            if self.failing.lock().unwrap().contains(spec.program()) {
                return Err(SetupError::ExecutionFailed {
                    command: spec.to_string(),
                    reason: "exit status: 1".to_string(),
                    stdout: String::new(),
                    stderr: "simulated failure".to_string(),
                });
            }
            for (program, probe, command) in self.effects.lock().unwrap().iter() {
                if program == spec.program() {
                    probe.add(command);
                }
            }
            Ok(CommandOutput::default())
        }
    }

    #[async_trait]
    impl CommandBroker for RecordingBroker {
        async fn run_privileged(&self, spec: &CommandSpec) -> SetupResult<CommandOutput> {
            self.record(spec)
        }

        async fn run_unprivileged(&self, spec: &CommandSpec) -> SetupResult<CommandOutput> {
            self.record(spec)
        }
    }

    /// Installer that marks the dependency present without downloading
    pub struct FakeInstaller {
        probe: Arc<StaticProbe>,
        installs: AtomicUsize,
        effective: AtomicBool,
        fail: AtomicBool,
    }

    impl FakeInstaller {
        pub fn new(probe: Arc<StaticProbe>) -> Self {
            Self {
                probe,
                installs: AtomicUsize::new(0),
                effective: AtomicBool::new(true),
                fail: AtomicBool::new(false),
            }
        }

        pub fn install_count(&self) -> usize {
            self.installs.load(Ordering::SeqCst)
        }

        /// When false, installs succeed but the probe never sees them
        pub fn set_effective(&self, effective: bool) {
            self.effective.store(effective, Ordering::SeqCst);
        }

        pub fn fail_with_download_error(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DependencyInstaller for FakeInstaller {
        async fn install(
            &self,
            dependency: &DependencyDescriptor,
            platform: Platform,
            _progress: &ProgressReporter,
        ) -> SetupResult<InstallOutcome> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            let url = dependency.download_url(platform)?;
            if self.fail.load(Ordering::SeqCst) {
                return Err(SetupError::download(url, "connection reset by peer"));
            }
            if self.effective.load(Ordering::SeqCst) {
                self.probe.add(&dependency.detect_command);
            }
            Ok(InstallOutcome::Installed(
                PathBuf::from("/usr/local/bin").join(&dependency.binary_name),
            ))
        }
    }
}
