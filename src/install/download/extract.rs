//! Archive extraction
//!
//! Archives are unpacked by the system `tar` through the unprivileged broker
//! path, inside the dependency's own staging directory.

use std::path::{Path, PathBuf};

use crate::install::command::CommandSpec;
use crate::install::error::{SetupError, SetupResult};
use crate::install::privilege::CommandBroker;

/// Unpack a `.tar.gz` archive into `dest_dir`
pub async fn extract_archive(
    broker: &dyn CommandBroker,
    archive: &Path,
    dest_dir: &Path,
) -> SetupResult<()> {
    let spec = CommandSpec::user("tar")
        .arg("-xzf")
        .path_arg(archive)
        .arg("-C")
        .path_arg(dest_dir)
        .current_dir(dest_dir);
    broker.run_unprivileged(&spec).await?;
    Ok(())
}

/// Find `binary_name` among the extracted files.
///
/// Release archives put the binary either at the top level or one directory
/// down; the shallowest match wins.
pub fn locate_binary(dir: &Path, binary_name: &str) -> SetupResult<PathBuf> {
    let top = dir.join(binary_name);
    if top.is_file() {
        return Ok(top);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| SetupError::io(dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let nested = path.join(binary_name);
            if nested.is_file() {
                return Ok(nested);
            }
        }
    }

    Err(SetupError::MissingArtifact {
        name: binary_name.to_string(),
        dir: dir.to_path_buf(),
    })
}
