//! Execution environment for spawned commands
//!
//! Every subprocess the orchestrator starts runs under an explicit
//! `ExecutionContext`: a snapshot of the caller's variables, the search path
//! augmented with common package-manager prefixes, and a few fixed overrides.
//! The process-wide environment is never mutated.
//!
//! The context also answers the two environment questions setup cares about:
//! whether we are under CI (skip privileged system installs) and whether a
//! desktop session is available (graphical elevation prompt vs terminal).

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Install prefixes appended to the caller's search path
pub const EXTRA_SEARCH_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];

/// Variables forced on every spawned command
pub const ENV_OVERRIDES: &[(&str, &str)] = &[("HOMEBREW_NO_AUTO_UPDATE", "1")];

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    vars: BTreeMap<OsString, OsString>,
    search_path: Vec<PathBuf>,
    ci: bool,
}

impl ExecutionContext {
    /// Snapshot the current process environment
    pub fn from_process(extra_search_paths: &[PathBuf]) -> Self {
        Self::from_vars(std::env::vars_os(), extra_search_paths)
    }

    /// Build a context from an explicit variable set
    pub fn from_vars<I>(vars: I, extra_search_paths: &[PathBuf]) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let vars: BTreeMap<OsString, OsString> = vars.into_iter().collect();

        let mut search_path: Vec<PathBuf> = Vec::new();
        let caller = vars
            .get(OsStr::new("PATH"))
            .map(|p| std::env::split_paths(p).collect::<Vec<_>>())
            .unwrap_or_default();
        let prefixes = EXTRA_SEARCH_PATHS.iter().map(PathBuf::from);
        for dir in caller
            .into_iter()
            .chain(prefixes)
            .chain(extra_search_paths.iter().cloned())
        {
            if !dir.as_os_str().is_empty() && !search_path.contains(&dir) {
                search_path.push(dir);
            }
        }

        let ci = vars
            .get(OsStr::new("CI"))
            .is_some_and(|v| !v.is_empty());

        Self {
            vars,
            search_path,
            ci,
        }
    }

    /// Force the CI flag (config or CLI override)
    pub fn with_ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    pub fn is_ci(&self) -> bool {
        self.ci
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// The augmented search path joined for `PATH`
    pub fn path_var(&self) -> OsString {
        std::env::join_paths(&self.search_path).unwrap_or_else(|_| {
            // An entry contained the separator; keep only the joinable ones
            let usable: Vec<&PathBuf> = self
                .search_path
                .iter()
                .filter(|p| std::env::join_paths([p]).is_ok())
                .collect();
            std::env::join_paths(usable).unwrap_or_default()
        })
    }

    pub fn path_display(&self) -> String {
        self.path_var().to_string_lossy().into_owned()
    }

    /// Environment for a spawned command: caller snapshot + augmented `PATH` + overrides
    pub fn apply(&self, cmd: &mut tokio::process::Command) {
        cmd.env_clear();
        cmd.envs(&self.vars);
        cmd.env("PATH", self.path_var());
        for (key, value) in ENV_OVERRIDES {
            cmd.env(key, value);
        }
    }

    /// `KEY=value` assignments passed through an elevation boundary
    ///
    /// Elevation helpers reset the environment, so only the augmentations are
    /// forwarded explicitly.
    pub fn elevated_assignments(&self) -> Vec<String> {
        let mut out = vec![format!("PATH={}", self.path_display())];
        out.extend(ENV_OVERRIDES.iter().map(|(k, v)| format!("{k}={v}")));
        out
    }

    fn has_var(&self, key: &str) -> bool {
        self.vars.get(OsStr::new(key)).is_some_and(|v| !v.is_empty())
    }

    /// Check if running in a CLI-only environment
    ///
    /// Returns `true` if any of:
    /// - SSH connection detected (SSH_CONNECTION or SSH_CLIENT)
    /// - No display server on Linux/BSD (no DISPLAY or WAYLAND_DISPLAY)
    pub fn is_cli_environment(&self) -> bool {
        if self.has_var("SSH_CONNECTION") || self.has_var("SSH_CLIENT") {
            return true;
        }

        if cfg!(any(
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd"
        )) {
            return !self.has_var("DISPLAY") && !self.has_var("WAYLAND_DISPLAY");
        }

        false
    }

    /// Inverse of `is_cli_environment`
    pub fn is_desktop_environment(&self) -> bool {
        !self.is_cli_environment()
    }
}
