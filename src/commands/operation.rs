//! Shared flow for destructive commands: resolve, confirm, submit, relay

use anyhow::{Context, Result, bail};
use blockdev::DiskDescriptor;
use colored::Colorize;
use dialoguer::Confirm;
use provision::{OperationRequest, Orchestrator, ProcessRunner, Severity, render};

use crate::Context as AppContext;
use crate::cli::RunArgs;
use crate::config::UsbforgeConfig;
use crate::lock::RunLock;
use crate::{progress, ui};

/// Strip a leading `/dev/` from a user-supplied disk name
pub fn normalize_disk(disk: &str) -> String {
    disk.trim().trim_start_matches("/dev/").to_string()
}

/// Re-query the inventory and require `disk` to still be a USB disk
pub fn resolve_target(disk: &str) -> Result<DiskDescriptor> {
    let disks = blockdev::list_usb_disks();
    resolve_in(&disks, disk)
}

fn resolve_in(disks: &[DiskDescriptor], disk: &str) -> Result<DiskDescriptor> {
    match blockdev::find_disk(disks, disk) {
        Some(found) => Ok(found.clone()),
        None => {
            let available: Vec<String> = disks.iter().map(DiskDescriptor::device_path).collect();
            if available.is_empty() {
                bail!("{disk} is not a connected USB disk (no USB disks found)");
            }
            bail!(
                "{disk} is not a connected USB disk (available: {})",
                available.join(", ")
            );
        }
    }
}

pub fn print_target(disk: &DiskDescriptor) {
    ui::kv("Device", &disk.device_path());
    ui::kv("Model", &disk.model);
    ui::kv("Size", &ui::format_lsblk_size(&disk.size));
}

/// Two confirmations before destroying data, skipped with `--yes`
pub fn confirm_destructive(run: RunArgs, warning: &str, prompt: &str) -> Result<bool> {
    println!();
    println!("  {} {}", "WARNING:".red().bold(), warning.red());
    println!();

    if run.yes {
        return Ok(true);
    }

    if !Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .interact()
        .context("Failed to read user input")?
    {
        ui::info("Aborted. No changes made.");
        return Ok(false);
    }

    if !Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read user input")?
    {
        ui::info("Aborted. No changes made.");
        return Ok(false);
    }

    Ok(true)
}

fn orchestrator(config: &UsbforgeConfig) -> Orchestrator {
    let mut runner = ProcessRunner::new(config.elevation);
    if let Some(dir) = config.scratch_dir() {
        runner = runner.with_scratch_dir(dir);
    }
    Orchestrator::new(runner).with_options(config.compose_options())
}

/// Print the program a request would run, without running it
pub fn dry_run(config: &UsbforgeConfig, request: &OperationRequest) -> Result<()> {
    let program = orchestrator(config).prepare(request)?;

    ui::section("Program");
    for (i, stage) in program.stages.iter().enumerate() {
        let policy = match stage.policy {
            provision::FailurePolicy::Abort => "abort",
            provision::FailurePolicy::WarnAndContinue => "warn",
        };
        println!(
            "  {} {} {}",
            format!("[{}/{}]", i + 1, program.stages.len()).blue().bold(),
            stage.label,
            format!("({policy})").dimmed()
        );
    }

    ui::section("Script");
    println!("{}", render(&program));
    ui::dim("(dry run - nothing was executed)");
    Ok(())
}

/// Submit a request and relay its progress until it finishes
pub fn execute(ctx: &AppContext, config: &UsbforgeConfig, request: OperationRequest) -> Result<()> {
    let orchestrator = orchestrator(config);
    let title = request.kind().title();
    let device = request.device_path();

    // Held until this function returns
    let _lock = RunLock::acquire()?;
    let handle = orchestrator.submit(request)?;
    let started_at = chrono::Local::now();
    log::info!("Submitted {title} for {device} using {}", config.elevation);

    let pb = if ctx.quiet {
        progress::hidden()
    } else {
        println!();
        progress::spinner(&format!("{title} on {device} (waiting for authorization)"))
    };

    let mut started = false;
    let quiet = ctx.quiet;
    handle.wait(|event| {
        if !started {
            pb.set_message(format!("{title} on {device}"));
            started = true;
        }
        if !quiet {
            pb.println(ui::event_line(event));
        } else if matches!(event.severity, Severity::Error | Severity::Warning) {
            eprintln!("{}", event.line);
        }
    });
    pb.finish_and_clear();

    let outcome = orchestrator.acknowledge()?;
    let elapsed = chrono::Local::now() - started_at;
    println!();
    if outcome.success {
        ui::success(&format!("{title} of {device} completed successfully"));
        ui::dim(&format!("Took {}", format_elapsed(elapsed)));
        return Ok(());
    }

    ui::error(&format!("{title} of {device} {}", outcome.summary()));
    if outcome.transport_error.is_some() {
        if let Some(front_end) = config.elevation.front_end() {
            ui::dim(&format!("Is {front_end} installed and allowed to run here?"));
        }
    } else if !ctx.quiet {
        ui::dim("The full output is shown above.");
    }
    bail!("{title} failed: {}", outcome.summary())
}

/// `1h 02m 03s`, `4m 05s` or `6s`
fn format_elapsed(elapsed: chrono::TimeDelta) -> String {
    let secs = elapsed.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disks() -> Vec<DiskDescriptor> {
        blockdev::parse_listing("sdb SanDisk Ultra 29.8G disk usb\nsdc Kingston 7.5G disk usb\n")
    }

    #[test]
    fn test_normalize_disk() {
        assert_eq!(normalize_disk("/dev/sdb"), "sdb");
        assert_eq!(normalize_disk(" sdc "), "sdc");
    }

    #[test]
    fn test_resolve_in_current_listing() {
        let found = resolve_in(&disks(), "/dev/sdc").unwrap();
        assert_eq!(found.model, "Kingston");
    }

    #[test]
    fn test_resolve_stale_name_fails() {
        let err = resolve_in(&disks(), "sdd").unwrap_err().to_string();
        assert!(err.contains("sdd is not a connected USB disk"));
        assert!(err.contains("/dev/sdb, /dev/sdc"));
    }

    #[test]
    fn test_resolve_without_disks() {
        let err = resolve_in(&[], "sdb").unwrap_err().to_string();
        assert!(err.contains("no USB disks found"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(6)), "6s");
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(245)), "4m 05s");
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(3723)), "1h 02m 03s");
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(-1)), "0s");
    }

    #[test]
    fn test_confirm_with_yes_skips_prompt() {
        let run = RunArgs {
            dry_run: false,
            yes: true,
        };
        assert!(confirm_destructive(run, "data will be lost", "Really?").unwrap());
    }
}
