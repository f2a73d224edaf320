//! Privilege escalation and command execution for the setup pipeline
//!
//! This is the only module that spawns subprocesses. It resolves each command
//! on the augmented search path first (failing with `CommandNotFound` before
//! anything runs), then either executes it as the invoking user or through
//! the platform's authorization prompt:
//! - macOS: `osascript ... with administrator privileges`
//! - Linux desktop session: `pkexec`
//! - Linux terminal: `sudo`
//! - already root: run directly
//!
//! Captured stdout/stderr are logged and carried in every failure.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use super::command::{CommandSpec, Privilege, shell_join};
use super::detection::{CapabilityProbe, SearchPathDetector};
use super::environment::ExecutionContext;
use super::error::{SetupError, SetupResult};

/// Used to carry environment assignments across the elevation boundary
const ENV_PROGRAM: &str = "/usr/bin/env";
const OSASCRIPT: &str = "/usr/bin/osascript";

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes typed commands with or without elevation
#[async_trait]
pub trait CommandBroker: Send + Sync {
    /// Run through the platform authorization prompt
    async fn run_privileged(&self, spec: &CommandSpec) -> SetupResult<CommandOutput>;

    /// Run as the invoking user
    async fn run_unprivileged(&self, spec: &CommandSpec) -> SetupResult<CommandOutput>;

    /// Dispatch on the privilege the descriptor declares
    async fn execute(&self, spec: &CommandSpec) -> SetupResult<CommandOutput> {
        match spec.privilege() {
            Privilege::User => self.run_unprivileged(spec).await,
            Privilege::Elevated => self.run_privileged(spec).await,
        }
    }
}

/// How privileged commands get their elevation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Already running as root
    Direct,
    Osascript,
    Pkexec,
    Sudo,
    Unsupported,
}

impl Elevation {
    /// Pick the mechanism for the current process
    pub fn detect(ctx: &ExecutionContext) -> Self {
        if running_as_root() {
            return Elevation::Direct;
        }
        match std::env::consts::OS {
            "macos" => Elevation::Osascript,
            "linux" if ctx.is_desktop_environment() => Elevation::Pkexec,
            "linux" => Elevation::Sudo,
            _ => Elevation::Unsupported,
        }
    }

    /// Whether a failed elevated run means the user declined the prompt
    fn is_denial(self, output: &Output) -> bool {
        let stderr = String::from_utf8_lossy(&output.stderr);
        match self {
            Elevation::Osascript => stderr.contains("User canceled") || stderr.contains("-128"),
            // 126: dialog dismissed, 127: not authorized
            Elevation::Pkexec => matches!(output.status.code(), Some(126) | Some(127)),
            Elevation::Sudo => {
                stderr.contains("incorrect password")
                    || stderr.contains("a password is required")
                    || stderr.contains("no tty present")
            }
            Elevation::Direct | Elevation::Unsupported => false,
        }
    }
}

#[cfg(unix)]
fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

/// Escape a string for an AppleScript string literal
fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Program and arguments that run `words` with elevation
///
/// `words` is the full command line, starting with the env wrapper.
fn elevated_invocation(
    elevation: Elevation,
    prompt_name: &str,
    words: &[String],
) -> Option<(String, Vec<String>)> {
    match elevation {
        Elevation::Direct => {
            let (program, args) = words.split_first()?;
            Some((program.clone(), args.to_vec()))
        }
        Elevation::Osascript => {
            let script = shell_join(words.iter().map(String::as_str));
            let applescript = format!(
                r#"do shell script "{}" with prompt "{} needs to install system components." {}"#,
                applescript_escape(&script),
                applescript_escape(prompt_name),
                "with administrator privileges",
            );
            Some((OSASCRIPT.to_string(), vec!["-e".to_string(), applescript]))
        }
        Elevation::Pkexec => Some(("pkexec".to_string(), words.to_vec())),
        Elevation::Sudo => Some(("sudo".to_string(), words.to_vec())),
        Elevation::Unsupported => None,
    }
}

/// Broker that spawns real subprocesses
#[derive(Debug, Clone)]
pub struct SystemBroker {
    detector: SearchPathDetector,
    elevation: Elevation,
    prompt_name: String,
}

impl SystemBroker {
    /// Broker using the elevation mechanism detected for this process
    pub fn new(ctx: ExecutionContext, prompt_name: impl Into<String>) -> Self {
        let elevation = Elevation::detect(&ctx);
        Self::with_elevation(ctx, elevation, prompt_name)
    }

    pub fn with_elevation(
        ctx: ExecutionContext,
        elevation: Elevation,
        prompt_name: impl Into<String>,
    ) -> Self {
        Self {
            detector: SearchPathDetector::new(ctx),
            elevation,
            prompt_name: prompt_name.into(),
        }
    }

    pub fn elevation(&self) -> Elevation {
        self.elevation
    }

    pub fn detector(&self) -> &SearchPathDetector {
        &self.detector
    }

    fn ctx(&self) -> &ExecutionContext {
        self.detector.context()
    }

    fn resolve(&self, spec: &CommandSpec) -> SetupResult<PathBuf> {
        spec.validate()?;
        self.detector
            .resolve(spec.program())
            .ok_or_else(|| SetupError::CommandNotFound {
                command: spec.program().to_string(),
                search_path: self.ctx().path_display(),
            })
    }

    async fn spawn(
        &self,
        label: &CommandSpec,
        program: &Path,
        args: &[String],
        interactive: bool,
    ) -> SetupResult<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if interactive {
                Stdio::inherit()
            } else {
                Stdio::null()
            });
        self.ctx().apply(&mut cmd);
        if let Some(dir) = label.cwd() {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| SetupError::ExecutionFailed {
            command: label.to_string(),
            reason: format!("failed to spawn {}: {e}", program.display()),
            stdout: String::new(),
            stderr: String::new(),
        })?;

        debug!("Executed {label}");
        debug!("===== stdout =====\n{}", String::from_utf8_lossy(&output.stdout));
        debug!("===== stderr =====\n{}", String::from_utf8_lossy(&output.stderr));
        Ok(output)
    }
}

fn captured(output: &Output) -> CommandOutput {
    CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

fn execution_failed(spec: &CommandSpec, output: &Output) -> SetupError {
    let out = captured(output);
    SetupError::ExecutionFailed {
        command: spec.to_string(),
        reason: output.status.to_string(),
        stdout: out.stdout,
        stderr: out.stderr,
    }
}

#[async_trait]
impl CommandBroker for SystemBroker {
    async fn run_unprivileged(&self, spec: &CommandSpec) -> SetupResult<CommandOutput> {
        let bin = self.resolve(spec)?;
        info!("Running {spec}");

        let output = self.spawn(spec, &bin, spec.arguments(), false).await?;
        if !output.status.success() {
            return Err(execution_failed(spec, &output));
        }
        Ok(captured(&output))
    }

    async fn run_privileged(&self, spec: &CommandSpec) -> SetupResult<CommandOutput> {
        let bin = self.resolve(spec)?;
        info!("Running {spec} with elevated privileges ({:?})", self.elevation);

        let mut words = Vec::with_capacity(spec.arguments().len() + 4);
        if self.elevation != Elevation::Direct {
            words.push(ENV_PROGRAM.to_string());
            words.extend(self.ctx().elevated_assignments());
        }
        words.push(bin.to_string_lossy().into_owned());
        words.extend(spec.arguments().iter().cloned());

        let (program, args) = elevated_invocation(self.elevation, &self.prompt_name, &words)
            .ok_or_else(|| SetupError::UnsupportedPlatform {
                dependency: "privileged execution".to_string(),
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            })?;

        let program = if Path::new(&program).is_absolute() {
            PathBuf::from(program)
        } else {
            self.detector
                .resolve(&program)
                .ok_or_else(|| SetupError::CommandNotFound {
                    command: program.clone(),
                    search_path: self.ctx().path_display(),
                })?
        };

        let interactive = self.elevation == Elevation::Sudo;
        let output = self.spawn(spec, &program, &args, interactive).await?;
        if output.status.success() {
            return Ok(captured(&output));
        }
        if self.elevation.is_denial(&output) {
            return Err(SetupError::AuthorizationDenied {
                command: spec.to_string(),
            });
        }
        Err(execution_failed(spec, &output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_broker() -> SystemBroker {
        let ctx = ExecutionContext::from_process(&[]);
        SystemBroker::with_elevation(ctx, Elevation::Direct, "Pearl")
    }

    #[tokio::test]
    async fn test_unprivileged_captures_stdout() {
        let broker = direct_broker();
        let out = broker
            .run_unprivileged(&CommandSpec::user("echo").arg("hello"))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_missing_command_is_command_not_found() {
        let broker = direct_broker();
        let spec = CommandSpec::user("pearl-no-such-command");
        let err = broker.run_unprivileged(&spec).await.unwrap_err();
        assert!(matches!(err, SetupError::CommandNotFound { .. }));

        let spec = CommandSpec::elevated("pearl-no-such-command");
        let err = broker.run_privileged(&spec).await.unwrap_err();
        assert!(matches!(err, SetupError::CommandNotFound { .. }));
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let broker = direct_broker();
        let spec = CommandSpec::user("sh").args(["-c", "echo out; echo oops >&2; exit 3"]);
        match broker.run_unprivileged(&spec).await {
            Err(SetupError::ExecutionFailed { stdout, stderr, .. }) => {
                assert_eq!(stdout.trim(), "out");
                assert_eq!(stderr.trim(), "oops");
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_direct_privileged_run_and_dispatch() {
        let broker = direct_broker();
        assert!(broker.execute(&CommandSpec::elevated("true")).await.is_ok());
        assert!(matches!(
            broker.execute(&CommandSpec::elevated("false")).await,
            Err(SetupError::ExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_working_directory_is_honoured() {
        let temp = tempfile::TempDir::new().unwrap();
        let broker = direct_broker();
        let out = broker
            .run_unprivileged(&CommandSpec::user("pwd").current_dir(temp.path()))
            .await
            .unwrap();
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(temp.path()).unwrap());
    }

    #[tokio::test]
    async fn test_invalid_descriptor_never_spawns() {
        let broker = direct_broker();
        let err = broker
            .run_privileged(&CommandSpec::elevated("rm -rf /"))
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidCommand(_)));
    }

    #[test]
    fn test_osascript_invocation_quotes_words() {
        let words = vec![
            ENV_PROGRAM.to_string(),
            "PATH=/usr/bin".to_string(),
            "/bin/mkdir".to_string(),
            "/usr/local/my bin".to_string(),
        ];
        let (program, args) = elevated_invocation(Elevation::Osascript, "Pearl", &words).unwrap();
        assert_eq!(program, OSASCRIPT);
        assert_eq!(args[0], "-e");
        let script = r#""/usr/bin/env PATH=/usr/bin /bin/mkdir '/usr/local/my bin'""#;
        assert!(args[1].starts_with(&format!("do shell script {script}")));
        assert!(args[1].ends_with("with administrator privileges"));
    }

    #[test]
    fn test_pkexec_and_unsupported_invocations() {
        let words = vec!["/usr/bin/env".to_string(), "/usr/bin/install".to_string()];
        let (program, args) = elevated_invocation(Elevation::Pkexec, "Pearl", &words).unwrap();
        assert_eq!(program, "pkexec");
        assert_eq!(args, words);
        assert!(elevated_invocation(Elevation::Unsupported, "Pearl", &words).is_none());
    }

    #[test]
    fn test_applescript_escape() {
        assert_eq!(applescript_escape(r#"say "hi" \ now"#), r#"say \"hi\" \\ now"#);
    }
}
