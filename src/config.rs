//! usbforge configuration (`config.toml`)
//!
//! Every key is optional; a missing file means all defaults.

use anyhow::{Context, Result, bail};
use provision::{ComposeOptions, Elevation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbforgeConfig {
    /// How the composed program is elevated
    pub elevation: Elevation,
    pub installer: InstallerConfig,
    pub layout: LayoutConfig,
    pub signing: SigningConfig,
    pub erase: EraseConfig,
    pub scratch: ScratchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Installer script; `~` and `$VARS` are expanded
    pub path: String,
    pub timeout_secs: u64,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        let defaults = ComposeOptions::default();
        Self {
            path: defaults.installer.to_string_lossy().into_owned(),
            timeout_secs: defaults.installer_timeout_secs,
        }
    }
}

/// Data partition bootstrap after install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Free space a data partition must exceed (KiB)
    pub min_free_kib: u64,
    pub mount_point: String,
    pub settle_secs: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let defaults = ComposeOptions::default();
        Self {
            min_free_kib: defaults.min_free_kib,
            mount_point: defaults.data_mount_point.to_string_lossy().into_owned(),
            settle_secs: defaults.data_settle_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub mount_point: String,
    pub settle_secs: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        let defaults = ComposeOptions::default();
        Self {
            mount_point: defaults.signing_mount_point.to_string_lossy().into_owned(),
            settle_secs: defaults.signing_settle_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraseConfig {
    pub settle_secs: u64,
}

impl Default for EraseConfig {
    fn default() -> Self {
        Self {
            settle_secs: ComposeOptions::default().erase_settle_secs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory for the temporary program file (system temp dir if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl UsbforgeConfig {
    /// Load from the config directory, or defaults if there is no file
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.installer.path.trim().is_empty() {
            bail!("installer.path must not be empty");
        }
        if self.installer.timeout_secs == 0 {
            bail!("installer.timeout_secs must be greater than zero");
        }
        if self.layout.mount_point.trim().is_empty() || self.signing.mount_point.trim().is_empty()
        {
            bail!("mount points must not be empty");
        }
        Ok(())
    }

    pub fn installer_path(&self) -> PathBuf {
        paths::expand_absolute(&self.installer.path)
    }

    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.scratch.dir.as_deref().map(paths::expand)
    }

    /// Options handed to the composer
    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            installer: self.installer_path(),
            installer_timeout_secs: self.installer.timeout_secs,
            min_free_kib: self.layout.min_free_kib,
            data_mount_point: paths::expand_absolute(&self.layout.mount_point),
            data_settle_secs: self.layout.settle_secs,
            signing_mount_point: paths::expand_absolute(&self.signing.mount_point),
            signing_settle_secs: self.signing.settle_secs,
            erase_settle_secs: self.erase.settle_secs,
        }
    }
}
