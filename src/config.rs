use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::install::paths::BuildMode;

const CONFIG_DIR_NAME: &str = "pearl";
const CONFIG_FILE_NAME: &str = "setup.toml";

fn default_true() -> bool {
    true
}

fn default_prompt_name() -> String {
    "Pearl".to_string()
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}

/// Setup configuration (`setup.toml`).
///
/// Every field has a default, so a missing or partial file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Overrides the build mode picked from `PEARL_ENV`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BuildMode>,
    /// Searched after the built-in package-manager prefixes
    #[serde(default)]
    pub extra_search_paths: Vec<PathBuf>,
    /// Application name shown in the authorization prompt
    #[serde(default = "default_prompt_name")]
    pub prompt_name: String,
    /// System directory downloaded binaries are installed into
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,
    #[serde(default = "default_true")]
    pub verify_after_install: bool,
    /// Install the interpreter and git when missing
    #[serde(default)]
    pub ensure_system_tools: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            mode: None,
            extra_search_paths: Vec::new(),
            prompt_name: default_prompt_name(),
            bin_dir: default_bin_dir(),
            verify_after_install: true,
            ensure_system_tools: false,
        }
    }
}

impl SetupConfig {
    /// `<config dir>/pearl/setup.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Load an explicit file, or the default file when present.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Self::default_path()?;
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };

        let cfg_str = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = toml::from_str(&cfg_str)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Using config from: {}", path.display());
        Ok(cfg)
    }

    /// Write the default configuration to `path`, refusing to overwrite
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let default_toml = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;
        fs::write(path, default_toml).context("Failed to write config file")?;
        info!("Created default configuration at {}", path.display());
        Ok(())
    }

    /// Build mode: `--dev` beats the config file, which beats `PEARL_ENV`
    pub fn build_mode(&self, force_dev: bool) -> BuildMode {
        if force_dev {
            return BuildMode::Development;
        }
        self.mode.unwrap_or_else(BuildMode::from_env)
    }
}
