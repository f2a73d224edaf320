//! Advisory lock serializing setup runs against one data root

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::error::{SetupError, SetupResult};

/// Exclusive lock on `<root>/.setup.lock`, released on drop
#[derive(Debug)]
pub struct SetupLock {
    file: File,
    path: PathBuf,
}

impl SetupLock {
    /// Take the lock without waiting; a held lock is `AlreadyRunning`
    pub fn acquire(path: &Path) -> SetupResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| SetupError::io(path, e))?;

        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("Acquired setup lock {}", path.display());
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(SetupError::AlreadyRunning {
                    lock: path.to_path_buf(),
                })
            }
            Err(e) => Err(SetupError::io(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SetupLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!("Failed to release setup lock {}: {e}", self.path.display());
        }
    }
}
