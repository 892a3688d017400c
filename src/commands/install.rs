//! `usbforge install` - install or upgrade the boot loader on a USB disk

use anyhow::{Result, bail};
use provision::keys::{self, DetectedKeys};
use provision::{InstallRequest, OperationRequest, PartitionStyle, SigningKeys};

use super::operation;
use crate::Context;
use crate::cli::InstallArgs;
use crate::config::UsbforgeConfig;
use crate::ui;

/// Key material found by the local probes
struct Probe {
    keys: DetectedKeys,
    owner_guid: Option<String>,
}

pub fn run(ctx: &Context, args: InstallArgs) -> Result<()> {
    let config = UsbforgeConfig::load()?;

    let probe = args.detect_keys.then(|| Probe {
        keys: keys::detect_signing_keys(),
        owner_guid: keys::machine_owner_guid(),
    });
    let request = build_request(&args, probe.as_ref());
    let operation = OperationRequest::Install(request.clone());

    ui::header(if request.upgrade {
        "Upgrade USB Drive"
    } else {
        "Install USB Drive"
    });

    if args.run.dry_run {
        print_options(&request);
        return operation::dry_run(&config, &operation);
    }

    let installer = config.installer_path();
    if !installer.is_file() {
        ui::error(&format!("Installer not found: {}", installer.display()));
        ui::dim("Set [installer] path in config.toml, or run `usbforge doctor`.");
        bail!("Installer script not found: {}", installer.display());
    }

    // Fails early on a bad request, before any prompt
    operation.validate()?;

    let disk = operation::resolve_target(&request.disk)?;
    operation::print_target(&disk);
    print_options(&request);

    let proceed = if request.upgrade {
        operation::confirm_destructive(
            args.run,
            "Upgrading rewrites the boot partitions. Back up anything important first.",
            &format!("Upgrade {}?", disk.device_path()),
        )?
    } else {
        operation::confirm_destructive(
            args.run,
            &format!("ALL DATA on {} will be destroyed!", disk.device_path()),
            &format!(
                "Are you ABSOLUTELY SURE you want to install to {}?",
                disk.device_path()
            ),
        )?
    };
    if !proceed {
        return Ok(());
    }

    operation::execute(ctx, &config, operation)
}

fn build_request(args: &InstallArgs, probe: Option<&Probe>) -> InstallRequest {
    let mut request = InstallRequest::new(operation::normalize_disk(&args.disk));
    request.secure_boot = args.secure_boot;
    request.partition_style = if args.gpt {
        PartitionStyle::Gpt
    } else {
        PartitionStyle::Mbr
    };
    request.preserve_space = args.preserve_space;
    request.upgrade = args.upgrade;
    request.efi_signing = args.efi_signing;
    request.signing = SigningKeys {
        owner_guid: args.owner_guid.clone(),
        vendor_key: args.vendor_key.clone(),
        vendor_cert: args.vendor_cert.clone(),
    };

    if let Some(probe) = probe {
        let signing = &mut request.signing;
        if signing.vendor_key.is_none() {
            signing.vendor_key.clone_from(&probe.keys.key);
        }
        if signing.vendor_cert.is_none() {
            signing.vendor_cert.clone_from(&probe.keys.cert);
        }
        if signing.owner_guid.is_none() {
            signing.owner_guid.clone_from(&probe.owner_guid);
        }
    }

    request
}

fn print_options(request: &InstallRequest) {
    let yes_no = |flag: bool| if flag { "yes" } else { "no" };

    ui::kv("Mode", if request.upgrade { "upgrade" } else { "fresh install" });
    ui::kv("Partition style", &request.partition_style.to_string());
    ui::kv("Secure boot", yes_no(request.secure_boot));
    ui::kv("Preserve space", yes_no(request.preserve_space));

    let signing = match (request.efi_signing, request.custom_signing()) {
        (false, _) => "off".to_string(),
        (true, None) => "built-in".to_string(),
        (true, Some((key, cert))) => format!("custom ({}, {})", key.display(), cert.display()),
    };
    ui::kv("EFI signing", &signing);
    if let Some(guid) = request.signing.owner_guid.as_deref().filter(|_| request.efi_signing) {
        ui::kv("Owner GUID", guid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunArgs;
    use std::path::PathBuf;

    fn args(disk: &str) -> InstallArgs {
        InstallArgs {
            disk: disk.to_string(),
            secure_boot: false,
            gpt: false,
            preserve_space: false,
            upgrade: false,
            efi_signing: false,
            owner_guid: None,
            vendor_key: None,
            vendor_cert: None,
            detect_keys: false,
            run: RunArgs {
                dry_run: false,
                yes: false,
            },
        }
    }

    #[test]
    fn test_build_request_flags() {
        let mut a = args("/dev/sdb");
        a.gpt = true;
        a.upgrade = true;
        let request = build_request(&a, None);

        assert_eq!(request.disk, "sdb");
        assert_eq!(request.partition_style, PartitionStyle::Gpt);
        assert!(request.upgrade);
        assert!(!request.secure_boot);
    }

    #[test]
    fn test_probe_fills_only_unset_fields() {
        let mut a = args("sdb");
        a.efi_signing = true;
        a.vendor_key = Some(PathBuf::from("/explicit/db.key"));

        let probe = Probe {
            keys: DetectedKeys {
                key: Some(PathBuf::from("/probed/MOK.key")),
                cert: Some(PathBuf::from("/probed/MOK.crt")),
            },
            owner_guid: Some("01234567-89ab-cdef-0123-456789abcdef".to_string()),
        };
        let request = build_request(&a, Some(&probe));

        assert_eq!(request.signing.vendor_key, Some(PathBuf::from("/explicit/db.key")));
        assert_eq!(request.signing.vendor_cert, Some(PathBuf::from("/probed/MOK.crt")));
        assert_eq!(
            request.signing.owner_guid.as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef")
        );
    }

    #[test]
    fn test_no_probe_leaves_signing_empty() {
        let mut a = args("sdb");
        a.efi_signing = true;
        let request = build_request(&a, None);
        assert_eq!(request.signing, SigningKeys::default());
        assert!(request.custom_signing().is_none());
    }
}
