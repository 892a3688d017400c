//! `usbforge erase` - wipe a USB disk

use anyhow::Result;
use provision::{EraseRequest, OperationRequest};

use super::operation;
use crate::Context;
use crate::cli::EraseArgs;
use crate::config::UsbforgeConfig;
use crate::ui;

pub fn run(ctx: &Context, args: EraseArgs) -> Result<()> {
    let config = UsbforgeConfig::load()?;
    let request = EraseRequest::new(operation::normalize_disk(&args.disk), args.secure);
    let operation = OperationRequest::Erase(request.clone());

    ui::header("Erase USB Drive");

    if args.run.dry_run {
        ui::kv("Mode", mode(&request));
        return operation::dry_run(&config, &operation);
    }

    operation.validate()?;

    let disk = operation::resolve_target(&request.disk)?;
    operation::print_target(&disk);
    ui::kv("Mode", mode(&request));
    if request.secure_erase {
        ui::dim("A secure erase writes the whole drive and can take hours.");
    }

    if !operation::confirm_destructive(
        args.run,
        &format!(
            "ALL DATA on {} will be permanently destroyed!",
            disk.device_path()
        ),
        &format!(
            "Are you ABSOLUTELY SURE you want to erase {}?",
            disk.device_path()
        ),
    )? {
        return Ok(());
    }

    operation::execute(ctx, &config, operation)
}

fn mode(request: &EraseRequest) -> &'static str {
    if request.secure_erase {
        "secure (random overwrite)"
    } else {
        "quick (signatures and first 10 MiB)"
    }
}
