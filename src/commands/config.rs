//! `usbforge config` - show, locate or create the config file

use anyhow::{Result, bail};
use std::path::Path;

use crate::cli::ConfigCommand;
use crate::config::UsbforgeConfig;
use crate::{paths, ui};

pub fn run(cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(),
        ConfigCommand::Path => {
            println!("{}", paths::config_file()?.display());
            Ok(())
        }
        ConfigCommand::Init { force } => init(&paths::config_file()?, force),
    }
}

fn show() -> Result<()> {
    let path = paths::config_file()?;
    let config = UsbforgeConfig::load_from(&path)?;

    ui::header("Configuration");
    if path.exists() {
        ui::kv("File", &path.display().to_string());
    } else {
        ui::kv("File", &format!("{} (not present, defaults)", path.display()));
    }
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        ui::warn(&format!("{} already exists", path.display()));
        bail!("Refusing to overwrite existing config (use --force)");
    }

    UsbforgeConfig::default().save_to(path)?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usbforge").join("config.toml");

        init(&path, false).unwrap();
        assert_eq!(
            UsbforgeConfig::load_from(&path).unwrap(),
            UsbforgeConfig::default()
        );
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "elevation = \"sudo\"\n").unwrap();

        assert!(init(&path, false).is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "elevation = \"sudo\"\n"
        );

        init(&path, true).unwrap();
        assert_eq!(
            UsbforgeConfig::load_from(&path).unwrap(),
            UsbforgeConfig::default()
        );
    }
}
