//! `usbforge keys` - show signing material found on this machine

use anyhow::Result;
use colored::Colorize;
use provision::keys;
use std::path::Path;

use crate::ui;

pub fn run() -> Result<()> {
    ui::header("Secure Boot Signing Material");

    let detected = keys::detect_signing_keys();
    print_found("Signing key", detected.key.as_deref());
    print_found("Certificate", detected.cert.as_deref());

    match keys::machine_owner_guid() {
        Some(guid) => println!("  {} {}: {}", "✓".green(), "Owner GUID", guid),
        None => println!("  {} {}: {}", "✗".red(), "Owner GUID", "not available".dimmed()),
    }

    println!();
    if detected.is_complete() {
        ui::success("A complete key pair is available for custom EFI signing.");
        ui::dim("Use `usbforge install --efi-signing --detect-keys <disk>` to sign with it.");
    } else {
        ui::info("No complete key pair found; EFI signing will use the built-in keys.");
    }
    Ok(())
}

fn print_found(label: &str, path: Option<&Path>) {
    match path {
        Some(path) => println!("  {} {}: {}", "✓".green(), label, path.display()),
        None => println!("  {} {}: {}", "✗".red(), label, "not found".dimmed()),
    }
}
