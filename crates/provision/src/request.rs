//! Operation requests and their validation

use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static DISK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid disk name regex"));

static GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$")
        .expect("valid GUID regex")
});

/// Partition table written by the installer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStyle {
    #[default]
    Mbr,
    Gpt,
}

impl std::fmt::Display for PartitionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mbr => write!(f, "MBR"),
            Self::Gpt => write!(f, "GPT"),
        }
    }
}

/// Optional custom key material for EFI signing.
///
/// With no key pair the installer's built-in secure-boot support is used
/// and no signing stage is composed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeys {
    pub owner_guid: Option<String>,
    pub vendor_key: Option<PathBuf>,
    pub vendor_cert: Option<PathBuf>,
}

impl SigningKeys {
    /// Build from free-text form fields; blank fields become `None`
    pub fn from_fields(owner_guid: &str, vendor_key: &str, vendor_cert: &str) -> Self {
        fn non_blank(value: &str) -> Option<String> {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }

        Self {
            owner_guid: non_blank(owner_guid),
            vendor_key: non_blank(vendor_key).map(PathBuf::from),
            vendor_cert: non_blank(vendor_cert).map(PathBuf::from),
        }
    }

    fn absolutized(&self) -> Result<Self, ValidationError> {
        let vendor_key = match &self.vendor_key {
            Some(key) => Some(
                std::path::absolute(key).map_err(|_| ValidationError::KeyNotReadable(key.clone()))?,
            ),
            None => None,
        };
        let vendor_cert = match &self.vendor_cert {
            Some(cert) => Some(
                std::path::absolute(cert)
                    .map_err(|_| ValidationError::CertNotReadable(cert.clone()))?,
            ),
            None => None,
        };
        Ok(Self {
            owner_guid: self.owner_guid.clone(),
            vendor_key,
            vendor_cert,
        })
    }

    /// Key and certificate, only when both are set
    pub fn key_pair(&self) -> Option<(&Path, &Path)> {
        match (&self.vendor_key, &self.vendor_cert) {
            (Some(key), Some(cert)) => Some((key.as_path(), cert.as_path())),
            _ => None,
        }
    }
}

/// Install or upgrade the boot loader on a disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    pub disk: String,
    pub secure_boot: bool,
    pub partition_style: PartitionStyle,
    pub preserve_space: bool,
    /// Upgrade in place instead of a fresh install
    pub upgrade: bool,
    pub efi_signing: bool,
    #[serde(default)]
    pub signing: SigningKeys,
}

impl InstallRequest {
    /// Fresh MBR install with every option off
    pub fn new(disk: impl Into<String>) -> Self {
        Self {
            disk: disk.into(),
            secure_boot: false,
            partition_style: PartitionStyle::Mbr,
            preserve_space: false,
            upgrade: false,
            efi_signing: false,
            signing: SigningKeys::default(),
        }
    }

    /// Key pair to sign with, if a custom signing stage is wanted
    pub fn custom_signing(&self) -> Option<(&Path, &Path)> {
        if self.efi_signing {
            self.signing.key_pair()
        } else {
            None
        }
    }
}

/// Wipe a disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraseRequest {
    pub disk: String,
    /// Overwrite the whole device with random data
    pub secure_erase: bool,
}

impl EraseRequest {
    pub fn new(disk: impl Into<String>, secure_erase: bool) -> Self {
        Self {
            disk: disk.into(),
            secure_erase,
        }
    }
}

/// What the orchestrator is asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum OperationRequest {
    Install(InstallRequest),
    Erase(EraseRequest),
}

/// Coarse operation kind, used for titles and state reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Install,
    Upgrade,
    Erase,
}

impl OperationKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Install => "Installation",
            Self::Upgrade => "Upgrade",
            Self::Erase => "USB Erase",
        }
    }
}

impl OperationRequest {
    /// Target kernel device name
    pub fn disk(&self) -> &str {
        match self {
            Self::Install(req) => &req.disk,
            Self::Erase(req) => &req.disk,
        }
    }

    /// Target device node (e.g. `/dev/sdb`)
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.disk())
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Install(req) if req.upgrade => OperationKind::Upgrade,
            Self::Install(_) => OperationKind::Install,
            Self::Erase(_) => OperationKind::Erase,
        }
    }

    /// Reject malformed requests before anything privileged happens
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validated().map(|_| ())
    }

    /// Validated copy with key material anchored to the current directory.
    ///
    /// The elevated program does not share our working directory, so the
    /// files checked here are the exact paths it is handed.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        validate_disk(self.disk())?;
        match self {
            Self::Install(req) => {
                let mut req = req.clone();
                if req.efi_signing {
                    req.signing = req.signing.absolutized()?;
                }
                validate_signing(&req)?;
                Ok(Self::Install(req))
            }
            Self::Erase(req) => Ok(Self::Erase(req.clone())),
        }
    }
}

fn validate_disk(disk: &str) -> Result<(), ValidationError> {
    if disk.trim().is_empty() {
        return Err(ValidationError::MissingDisk);
    }
    if !DISK_NAME.is_match(disk) {
        return Err(ValidationError::InvalidDiskName(disk.to_string()));
    }
    Ok(())
}

fn validate_signing(req: &InstallRequest) -> Result<(), ValidationError> {
    if !req.efi_signing {
        return Ok(());
    }

    let keys = &req.signing;
    if let Some(key) = &keys.vendor_key
        && !is_readable_file(key)
    {
        return Err(ValidationError::KeyNotReadable(key.clone()));
    }
    if let Some(cert) = &keys.vendor_cert
        && !is_readable_file(cert)
    {
        return Err(ValidationError::CertNotReadable(cert.clone()));
    }
    if keys.vendor_key.is_some() != keys.vendor_cert.is_some() {
        return Err(ValidationError::IncompleteKeyPair);
    }
    if let Some(guid) = &keys.owner_guid
        && !GUID.is_match(guid)
    {
        return Err(ValidationError::InvalidOwnerGuid(guid.clone()));
    }
    Ok(())
}

/// Existing regular file that this process can open for reading
pub(crate) fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn signed_install(key: &str, cert: &str) -> OperationRequest {
        let mut req = InstallRequest::new("sdb");
        req.efi_signing = true;
        req.signing = SigningKeys::from_fields("", key, cert);
        OperationRequest::Install(req)
    }

    #[test]
    fn test_from_fields_blank_is_none() {
        let keys = SigningKeys::from_fields("  ", "", "\t");
        assert_eq!(keys, SigningKeys::default());
        assert!(keys.key_pair().is_none());
    }

    #[test]
    fn test_plain_install_is_valid() {
        assert!(OperationRequest::Install(InstallRequest::new("sdb")).validate().is_ok());
    }

    #[test]
    fn test_erase_is_valid() {
        assert!(OperationRequest::Erase(EraseRequest::new("sdc", true)).validate().is_ok());
    }

    #[test]
    fn test_missing_disk() {
        let req = OperationRequest::Erase(EraseRequest::new("  ", false));
        assert_eq!(req.validate(), Err(ValidationError::MissingDisk));
    }

    #[test]
    fn test_disk_name_rejects_paths_and_shell() {
        for bad in ["/dev/sdb", "sdb; rm -rf /", "sd b", "../sdb", "$(id)"] {
            let req = OperationRequest::Erase(EraseRequest::new(bad, false));
            assert!(
                matches!(req.validate(), Err(ValidationError::InvalidDiskName(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_disk_name_accepts_kernel_names() {
        for good in ["sdb", "nvme0n1", "mmcblk0", "sr0"] {
            let req = OperationRequest::Erase(EraseRequest::new(good, false));
            assert!(req.validate().is_ok(), "rejected {good:?}");
        }
    }

    #[test]
    fn test_signing_without_keys_uses_builtin() {
        let req = signed_install("", "");
        assert!(req.validate().is_ok());
        let OperationRequest::Install(install) = req else {
            unreachable!()
        };
        assert!(install.custom_signing().is_none());
    }

    #[test]
    fn test_signing_key_without_cert_is_rejected() {
        assert!(signed_install("k", "").validate().is_err());
    }

    #[test]
    fn test_signing_existing_key_without_cert_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("db.key");
        fs::write(&key, "key").unwrap();

        let req = signed_install(key.to_str().unwrap(), "");
        assert_eq!(req.validate(), Err(ValidationError::IncompleteKeyPair));
    }

    #[test]
    fn test_signing_missing_cert_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("db.key");
        fs::write(&key, "key").unwrap();
        let cert = dir.path().join("missing.crt");

        let req = signed_install(key.to_str().unwrap(), cert.to_str().unwrap());
        assert_eq!(req.validate(), Err(ValidationError::CertNotReadable(cert)));
    }

    #[test]
    fn test_signing_directory_is_not_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("db.crt");
        fs::write(&cert, "cert").unwrap();

        let req = signed_install(dir.path().to_str().unwrap(), cert.to_str().unwrap());
        assert!(matches!(req.validate(), Err(ValidationError::KeyNotReadable(_))));
    }

    #[test]
    fn test_signing_with_full_pair() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("db.key");
        let cert = dir.path().join("db.crt");
        fs::write(&key, "key").unwrap();
        fs::write(&cert, "cert").unwrap();

        let req = signed_install(key.to_str().unwrap(), cert.to_str().unwrap());
        assert!(req.validate().is_ok());
        let OperationRequest::Install(install) = req else {
            unreachable!()
        };
        assert_eq!(install.custom_signing(), Some((key.as_path(), cert.as_path())));
    }

    #[test]
    fn test_relative_key_pair_is_made_absolute() {
        // Relative to the test's working directory
        let dir = tempfile::Builder::new()
            .prefix("usbforge-keys")
            .tempdir_in(".")
            .unwrap();
        let key = dir.path().join("db.key");
        let cert = dir.path().join("db.crt");
        fs::write(&key, "key").unwrap();
        fs::write(&cert, "cert").unwrap();
        assert!(key.is_relative());

        let req = signed_install(key.to_str().unwrap(), cert.to_str().unwrap());
        let OperationRequest::Install(install) = req.validated().unwrap() else {
            unreachable!()
        };
        let (abs_key, abs_cert) = install.custom_signing().unwrap();
        assert!(abs_key.is_absolute());
        assert!(abs_cert.is_absolute());
        assert_eq!(abs_key, std::path::absolute(&key).unwrap());
        assert!(abs_key.ends_with("db.key"));
        assert!(is_readable_file(abs_key));
    }

    #[test]
    fn test_relative_missing_key_is_rejected() {
        let req = signed_install("usbforge-no-such.key", "usbforge-no-such.crt");
        let Err(ValidationError::KeyNotReadable(path)) = req.validate() else {
            panic!("relative missing key accepted");
        };
        assert!(path.is_absolute());
    }

    #[test]
    fn test_signing_fields_ignored_when_disabled() {
        let mut req = InstallRequest::new("sdb");
        req.signing = SigningKeys::from_fields("not-a-guid", "k", "");
        assert!(OperationRequest::Install(req).validate().is_ok());
    }

    #[test]
    fn test_owner_guid_format() {
        let mut req = InstallRequest::new("sdb");
        req.efi_signing = true;
        req.signing.owner_guid = Some("77fa9abd-0359-4d32-bd60-28f4e78f784b".to_string());
        assert!(OperationRequest::Install(req.clone()).validate().is_ok());

        req.signing.owner_guid = Some("77fa9abd".to_string());
        assert!(matches!(
            OperationRequest::Install(req).validate(),
            Err(ValidationError::InvalidOwnerGuid(_))
        ));
    }

    #[test]
    fn test_request_json_is_tagged() {
        let req = OperationRequest::Erase(EraseRequest::new("sdb", true));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["operation"], "erase");
        assert_eq!(json["secure_erase"], true);

        let parsed: OperationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn test_kind_and_device_path() {
        let mut install = InstallRequest::new("sdb");
        assert_eq!(
            OperationRequest::Install(install.clone()).kind(),
            OperationKind::Install
        );
        install.upgrade = true;
        let req = OperationRequest::Install(install);
        assert_eq!(req.kind(), OperationKind::Upgrade);
        assert_eq!(req.device_path(), "/dev/sdb");
    }
}
