//! Listing sources for the block-device registry
//!
//! The trait lets the inventory run against the real `lsblk` binary or a
//! canned listing in tests.

use crate::error::{Error, Result};
use std::process::Command;

/// Columns requested from the registry, in parse order
pub const LSBLK_COLUMNS: &str = "NAME,MODEL,SIZE,TYPE,TRAN";

/// Something that can produce the tabular block-device listing
pub trait ListingSource: Send + Sync {
    /// Return the raw listing text (one device per row)
    fn listing(&self) -> Result<String>;
}

/// Queries the registry through `lsblk`
#[derive(Debug, Clone)]
pub struct Lsblk {
    program: String,
}

impl Lsblk {
    /// Use the `lsblk` found on `PATH`
    pub fn new() -> Self {
        Self {
            program: "lsblk".to_string(),
        }
    }

    /// Use a specific `lsblk` executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Lsblk {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingSource for Lsblk {
    fn listing(&self) -> Result<String> {
        // -d: whole disks only, -n: no header
        let output = Command::new(&self.program)
            .args(["-d", "-n", "-o", LSBLK_COLUMNS])
            .output()
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::QueryFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Fixed listing text, for tests and replays
#[derive(Debug, Clone, Default)]
pub struct StaticListing(pub String);

impl ListingSource for StaticListing {
    fn listing(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_listing() {
        let source = StaticListing("sdb Foo 1G disk usb".to_string());
        assert_eq!(source.listing().unwrap(), "sdb Foo 1G disk usb");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let source = Lsblk::with_program("/nonexistent/lsblk-for-tests");
        assert!(matches!(source.listing(), Err(Error::Spawn { .. })));
    }
}
