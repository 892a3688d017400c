//! Discovery of existing secure-boot signing material
//!
//! Nothing here generates keys. The probes only look for a machine owner
//! key (MOK) or db key pair that is already installed in a well-known
//! location, and derive an owner GUID from the machine id.

use crate::request::is_readable_file;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const SYSTEM_KEYS: &[&str] = &[
    "/var/lib/shim-signed/mok/MOK.priv",
    "/var/lib/shim-signed/mok/MOK.key",
    "/etc/secureboot/keys/MOK.key",
    "/boot/efi/EFI/keys/MOK.key",
    "/etc/efi-keys/db.key",
    "/etc/ssl/certs/secure-boot.key",
    "/usr/local/share/ca-certificates/secure-boot.key",
];

const SYSTEM_CERTS: &[&str] = &[
    "/var/lib/shim-signed/mok/MOK.pem",
    "/var/lib/shim-signed/mok/MOK.crt",
    "/etc/secureboot/keys/MOK.crt",
    "/boot/efi/EFI/keys/MOK.crt",
    "/etc/efi-keys/db.crt",
    "/etc/ssl/certs/secure-boot.crt",
    "/usr/local/share/ca-certificates/secure-boot.crt",
];

/// Relative to the home directory, searched after the system paths
const HOME_KEYS: &[&str] = &["secure-boot/MOK.key", ".efi-keys/db.key"];
const HOME_CERTS: &[&str] = &["secure-boot/MOK.crt", ".efi-keys/db.crt"];

const MACHINE_ID: &str = "/etc/machine-id";

/// Key material found on this machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectedKeys {
    pub key: Option<PathBuf>,
    pub cert: Option<PathBuf>,
}

impl DetectedKeys {
    /// Both halves were found
    pub fn is_complete(&self) -> bool {
        self.key.is_some() && self.cert.is_some()
    }
}

/// Probe the well-known key and certificate locations.
///
/// Key and certificate are searched independently; each is the first
/// readable candidate.
pub fn detect_signing_keys() -> DetectedKeys {
    let home = dirs::home_dir();
    let keys = candidates(SYSTEM_KEYS, HOME_KEYS, home.as_deref());
    let certs = candidates(SYSTEM_CERTS, HOME_CERTS, home.as_deref());
    detect_in(&keys, &certs)
}

/// Probe explicit candidate lists
pub fn detect_in(keys: &[PathBuf], certs: &[PathBuf]) -> DetectedKeys {
    let detected = DetectedKeys {
        key: first_readable(keys),
        cert: first_readable(certs),
    };
    log::debug!("Signing key probe: {detected:?}");
    detected
}

fn candidates(system: &[&str], home_relative: &[&str], home: Option<&Path>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = system.iter().map(PathBuf::from).collect();
    if let Some(home) = home {
        paths.extend(home_relative.iter().map(|rel| home.join(rel)));
    }
    paths
}

fn first_readable(paths: &[PathBuf]) -> Option<PathBuf> {
    paths.iter().find(|p| is_readable_file(p)).cloned()
}

/// Owner GUID derived from `/etc/machine-id`
pub fn machine_owner_guid() -> Option<String> {
    owner_guid_from(Path::new(MACHINE_ID))
}

/// Owner GUID from a machine-id style file: the first 32 hex digits,
/// grouped 8-4-4-4-12.
pub fn owner_guid_from(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    guid_from_machine_id(&contents)
}

fn guid_from_machine_id(contents: &str) -> Option<String> {
    let id = contents.trim();
    let hex = id.get(..32)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}
