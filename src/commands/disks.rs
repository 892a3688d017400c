//! `usbforge disks` - list USB-attached disks

use anyhow::Result;
use blockdev::DiskDescriptor;
use colored::Colorize;

use crate::ui;

pub fn run(json: bool) -> Result<()> {
    let disks = blockdev::list_usb_disks();

    if json {
        println!("{}", serde_json::to_string_pretty(&disks)?);
        return Ok(());
    }

    if disks.is_empty() {
        ui::info("No USB disks found.");
        ui::dim("Run with -v to see block-device query errors.");
        return Ok(());
    }

    ui::header("USB Disks");
    let width = disks.iter().map(|d| d.device_path().len()).max().unwrap_or(0);
    for disk in &disks {
        println!("  {}", row(disk, width));
    }
    Ok(())
}

fn row(disk: &DiskDescriptor, width: usize) -> String {
    format!(
        "{:<width$}  {}  {}",
        disk.device_path().bold(),
        disk.model,
        ui::format_lsblk_size(&disk.size).dimmed()
    )
}
