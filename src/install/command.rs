//! Typed command descriptors
//!
//! Commands are built as a program plus an argument vector plus the privilege
//! they need, and validated before anything is spawned. Nothing goes through a
//! shell on the unprivileged path; the elevated path quotes every word.

use std::fmt;
use std::path::{Path, PathBuf};

use super::error::{SetupError, SetupResult};

/// Privilege a command requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Runs as the invoking user
    User,
    /// Needs an elevation prompt (writes to protected system paths)
    Elevated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    privilege: Privilege,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Command that runs as the invoking user
    pub fn user(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privilege: Privilege::User,
            cwd: None,
        }
    }

    /// Command that needs elevation
    pub fn elevated(program: impl Into<String>) -> Self {
        Self {
            privilege: Privilege::Elevated,
            ..Self::user(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a filesystem path as an argument
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Working directory for the subprocess
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Reject descriptors that could not be executed safely.
    ///
    /// A bare program name must be a plain word (it is resolved on the search
    /// path); an absolute program path is taken as is. No word may contain NUL.
    pub fn validate(&self) -> SetupResult<()> {
        if self.program.is_empty() {
            return Err(SetupError::InvalidCommand("empty program name".to_string()));
        }
        if self.program.contains('\0') || self.args.iter().any(|a| a.contains('\0')) {
            return Err(SetupError::InvalidCommand(format!(
                "{}: NUL byte in command line",
                self.program
            )));
        }
        let absolute = Path::new(&self.program).is_absolute();
        if !absolute && !self.program.chars().all(is_plain_word_char) {
            return Err(SetupError::InvalidCommand(format!(
                "`{}` is not a plain command name",
                self.program
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn is_plain_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+')
}

/// POSIX single-quote a word for a shell command line
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| is_plain_word_char(c) || matches!(c, '/' | '=' | ':' | ','))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Join words into a shell command line, quoting each one
pub fn shell_join<'a, I>(words: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    words
        .into_iter()
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_args_and_privilege() {
        let spec = CommandSpec::elevated("install")
            .arg("-m")
            .arg("0755")
            .path_arg(Path::new("/tmp/tendermint"))
            .path_arg(Path::new("/usr/local/bin/tendermint"));
        assert_eq!(spec.privilege(), Privilege::Elevated);
        assert_eq!(
            spec.to_string(),
            "install -m 0755 /tmp/tendermint /usr/local/bin/tendermint"
        );
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_rejects_shell_syntax_in_program() {
        let spec = CommandSpec::user("tar; rm -rf /");
        assert!(matches!(spec.validate(), Err(SetupError::InvalidCommand(_))));
    }

    #[test]
    fn test_rejects_nul_bytes_and_empty_program() {
        assert!(CommandSpec::user("").validate().is_err());
        assert!(CommandSpec::user("tar").arg("a\0b").validate().is_err());
    }

    #[test]
    fn test_absolute_program_path_is_allowed() {
        let spec = CommandSpec::user("/home/me/.operate/venv/bin/python3.10").args(["-m", "pip"]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-word"), "plain-word");
        assert_eq!(shell_quote("/usr/local/bin"), "/usr/local/bin");
        assert_eq!(shell_quote("with space"), "'with space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(whoami)"), "'$(whoami)'");
        assert_eq!(shell_join(["mkdir", "-p", "/a b"]), "mkdir -p '/a b'");
    }
}
