//! Platform detection for download selection

use std::fmt;

use once_cell::sync::OnceCell;

use crate::install::error::{SetupError, SetupResult};

/// Operating systems the registry can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    MacOs,
    Linux,
    Windows,
    FreeBsd,
}

/// CPU architectures the registry can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    Arm64,
    X86,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

/// Global cache for platform detection
static PLATFORM_CACHE: OnceCell<Platform> = OnceCell::new();

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the current platform (cached after first call)
    pub fn detect() -> SetupResult<Self> {
        PLATFORM_CACHE
            .get_or_try_init(|| Self::from_parts(std::env::consts::OS, std::env::consts::ARCH))
            .copied()
    }

    /// Map Rust's `target_os`/`target_arch` names onto a platform
    pub fn from_parts(os: &str, arch: &str) -> SetupResult<Self> {
        let unsupported = || SetupError::UnsupportedPlatform {
            dependency: "setup".to_string(),
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let os = match os {
            "macos" => Os::MacOs,
            "linux" => Os::Linux,
            "windows" => Os::Windows,
            "freebsd" => Os::FreeBsd,
            _ => return Err(unsupported()),
        };
        let arch = match arch {
            "x86_64" => Arch::X64,
            "aarch64" => Arch::Arm64,
            "x86" => Arch::X86,
            _ => return Err(unsupported()),
        };
        Ok(Self { os, arch })
    }

    /// Whether the setup pipeline has a procedure for this OS
    pub fn has_setup_procedure(&self) -> bool {
        matches!(self.os, Os::MacOs | Os::Linux)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Os::MacOs => "darwin",
            Os::Linux => "linux",
            Os::Windows => "windows",
            Os::FreeBsd => "freebsd",
        })
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
            Arch::X86 => "ia32",
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}
