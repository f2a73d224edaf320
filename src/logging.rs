//! Logger setup: stderr plus the setup log file under the data root

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writes every log line to stderr and, when open, to a file
pub struct TeeWriter {
    file: Option<File>,
}

impl TeeWriter {
    /// Append to `path`, falling back to stderr only if it cannot be opened
    pub fn open(path: &Path) -> Self {
        let file = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| OpenOptions::new().create(true).append(true).open(path));
        match file {
            Ok(file) => Self { file: Some(file) },
            Err(e) => {
                eprintln!("WARN: Could not open log file {}: {e}", path.display());
                Self { file: None }
            }
        }
    }

    pub fn stderr_only() -> Self {
        Self { file: None }
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = &mut self.file {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        Ok(())
    }
}

/// Initialise `env_logger`; `RUST_LOG` overrides the default `info` level
pub fn init(log_file: Option<&Path>) {
    let writer = log_file.map_or_else(TeeWriter::stderr_only, TeeWriter::open);

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(writer)))
        .try_init();
}
