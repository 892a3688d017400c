//! Path resolution for usbforge
//!
//! # Environment Variables
//!
//! - `USBFORGE_CONFIG_DIR` - Override config directory
//!
//! # Config directory priority
//!
//! 1. `USBFORGE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/usbforge` (if set)
//! 3. `~/.config/usbforge`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "USBFORGE_CONFIG_DIR";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the usbforge config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        let path = PathBuf::from(xdg_config).join("usbforge");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("usbforge");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the input unchanged.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand like [`expand`], then anchor a relative result to the
/// current directory.
///
/// Used for paths read by the elevated program, which runs elsewhere.
pub fn expand_absolute(path: &str) -> PathBuf {
    let expanded = expand(path);
    std::path::absolute(&expanded).unwrap_or(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring it afterwards.
    ///
    /// Env mutation is process-wide; each test uses distinct values.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/usbforge/config", || {
            assert_eq!(
                config_dir().unwrap(),
                PathBuf::from("/custom/usbforge/config")
            );
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/usbforge/config/config.toml")
            );
        });
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/keys/db.key"), home.join("keys").join("db.key"));
    }

    #[test]
    fn test_expand_env_var() {
        with_env_var("USBFORGE_TEST_EXPAND", "/srv/keys", || {
            assert_eq!(
                expand("$USBFORGE_TEST_EXPAND/db.crt"),
                PathBuf::from("/srv/keys/db.crt")
            );
        });
    }

    #[test]
    fn test_expand_unknown_var_is_unchanged() {
        assert_eq!(
            expand("$USBFORGE_SURELY_UNSET_VAR/x"),
            PathBuf::from("$USBFORGE_SURELY_UNSET_VAR/x")
        );
    }

    #[test]
    fn test_expand_plain_path() {
        assert_eq!(expand("/opt/ventoy"), PathBuf::from("/opt/ventoy"));
    }

    #[test]
    fn test_expand_absolute_anchors_relative_paths() {
        let cwd = env::current_dir().unwrap();
        assert_eq!(
            expand_absolute("tools/Ventoy2Disk.sh"),
            cwd.join("tools/Ventoy2Disk.sh")
        );
        assert_eq!(
            expand_absolute("/opt/ventoy/Ventoy2Disk.sh"),
            PathBuf::from("/opt/ventoy/Ventoy2Disk.sh")
        );
    }
}
