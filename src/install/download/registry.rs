//! Canonical registry of network-installable dependencies
//!
//! Each descriptor names the dependency, the command that detects it and the
//! archive to fetch per (OS, architecture). When bumping a pinned release,
//! update ONLY the URLs below.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::platform::{Arch, Os, Platform};
use crate::install::error::{SetupError, SetupResult};

/// Pinned consensus-engine release
pub const TENDERMINT_VERSION: &str = "0.34.19";

/// Consensus engine used by every agent service
pub static TENDERMINT: Lazy<DependencyDescriptor> = Lazy::new(|| {
    let base = format!(
        "https://github.com/tendermint/tendermint/releases/download/v{v}/tendermint_{v}",
        v = TENDERMINT_VERSION
    );
    DependencyDescriptor::new("tendermint", "Pearl Daemon", "tendermint")
        .with_download(Os::MacOs, Arch::X64, format!("{base}_darwin_amd64.tar.gz"))
        .with_download(Os::MacOs, Arch::Arm64, format!("{base}_darwin_arm64.tar.gz"))
        .with_download(Os::Linux, Arch::X64, format!("{base}_linux_amd64.tar.gz"))
        .with_download(Os::Linux, Arch::Arm64, format!("{base}_linux_arm64.tar.gz"))
});

/// Describes an external tool and where to download it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    /// Registry name, also used to namespace staging directories
    pub name: String,
    /// Human-readable name used in progress messages
    pub display_name: String,
    /// Command looked up by the capability detector
    pub detect_command: String,
    /// File name of the binary inside the archive and at the install target
    pub binary_name: String,
    downloads: HashMap<Platform, String>,
}

impl DependencyDescriptor {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        detect_command: impl Into<String>,
    ) -> Self {
        let detect_command = detect_command.into();
        Self {
            name: name.into(),
            display_name: display_name.into(),
            binary_name: detect_command.clone(),
            detect_command,
            downloads: HashMap::new(),
        }
    }

    pub fn with_download(mut self, os: Os, arch: Arch, url: impl Into<String>) -> Self {
        self.downloads.insert(Platform::new(os, arch), url.into());
        self
    }

    /// Download URL for `platform`; a missing mapping is a hard error
    pub fn download_url(&self, platform: Platform) -> SetupResult<&str> {
        self.downloads
            .get(&platform)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SetupError::UnsupportedPlatform {
                dependency: self.name.clone(),
                os: platform.os.to_string(),
                arch: platform.arch.to_string(),
            })
    }

    /// Platforms with a registered download
    pub fn platforms(&self) -> impl Iterator<Item = &Platform> {
        self.downloads.keys()
    }
}
