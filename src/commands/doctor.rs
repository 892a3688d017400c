use anyhow::Result;
use colored::Colorize;
use std::process::{Command, Stdio};

use crate::config::UsbforgeConfig;
use crate::paths;
use crate::ui;

struct Issue {
    category: &'static str,
    summary: String,
    fix: Option<String>,
}

/// A tool the composed programs call
struct Tool {
    name: &'static str,
    purpose: &'static str,
    package: &'static str,
    required: bool,
}

const TOOLS: &[Tool] = &[
    Tool {
        name: "lsblk",
        purpose: "Disk discovery and unmounting",
        package: "util-linux",
        required: true,
    },
    Tool {
        name: "wipefs",
        purpose: "Removing partition signatures",
        package: "util-linux",
        required: true,
    },
    Tool {
        name: "blockdev",
        purpose: "Device size for secure erase",
        package: "util-linux",
        required: true,
    },
    Tool {
        name: "dd",
        purpose: "Zeroing and random overwrite",
        package: "coreutils",
        required: true,
    },
    Tool {
        name: "timeout",
        purpose: "Bounding the installer run",
        package: "coreutils",
        required: true,
    },
    Tool {
        name: "sbsign",
        purpose: "Custom EFI signing",
        package: "sbsigntool",
        required: false,
    },
];

pub fn run() -> Result<()> {
    ui::header("System Health Check");

    let config = UsbforgeConfig::load()?;
    let mut issues: Vec<Issue> = Vec::new();

    check_tools(&mut issues);
    check_elevation(&config, &mut issues);
    check_installer(&config, &mut issues);
    check_config(&mut issues);

    println!();
    if issues.is_empty() {
        ui::success("All checks passed!");
    } else {
        print_issue_summary(&issues);
    }
    Ok(())
}

fn print_issue_summary(issues: &[Issue]) {
    let count = issues.len();
    let label = if count == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{count} {label} Found"));

    for (i, issue) in issues.iter().enumerate() {
        println!(
            "  {}  {} {}",
            format!("{}.", i + 1).bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        println!();
    }
}

fn check_tools(issues: &mut Vec<Issue>) {
    ui::section("Tools");

    for tool in TOOLS {
        if command_exists(tool.name) {
            println!("  {} {} - {}", "✓".green(), tool.name, tool.purpose.dimmed());
        } else if tool.required {
            println!("  {} {} - {} {}", "✗".red(), tool.name, tool.purpose, "(missing)".red());
            issues.push(Issue {
                category: "Tools",
                summary: format!("{} is not installed", tool.name),
                fix: Some(format!("Install the {} package", tool.package)),
            });
        } else {
            println!(
                "  {} {} - {} {}",
                "⚠".yellow(),
                tool.name,
                tool.purpose,
                "(optional, missing)".yellow()
            );
        }
    }
}

fn check_elevation(config: &UsbforgeConfig, issues: &mut Vec<Issue>) {
    ui::section("Elevation");
    ui::kv("Configured", &config.elevation.to_string());

    match config.elevation.front_end() {
        Some(front_end) if command_exists(front_end) => {
            println!("  {} {} available", "✓".green(), front_end);
        }
        Some(front_end) => {
            println!("  {} {} {}", "✗".red(), front_end, "(missing)".red());
            issues.push(Issue {
                category: "Elevation",
                summary: format!("{front_end} is not installed"),
                fix: Some(format!(
                    "Install {front_end}, or set `elevation` in {}",
                    paths::CONFIG_FILE
                )),
            });
        }
        None => {
            println!("  {} running without a front-end", "ℹ".blue());
        }
    }
}

fn check_installer(config: &UsbforgeConfig, issues: &mut Vec<Issue>) {
    ui::section("Installer");
    let installer = config.installer_path();

    if installer.is_file() {
        println!("  {} {}", "✓".green(), installer.display());
    } else {
        println!("  {} {} {}", "✗".red(), installer.display(), "(not found)".red());
        issues.push(Issue {
            category: "Installer",
            summary: format!("Installer script not found at {}", installer.display()),
            fix: Some("Set [installer] path in config.toml".to_string()),
        });
    }
}

fn check_config(issues: &mut Vec<Issue>) {
    ui::section("Configuration");
    match paths::config_file() {
        Ok(path) if path.exists() => {
            println!("  {} {}", "✓".green(), path.display());
        }
        Ok(path) => {
            println!(
                "  {} {} {}",
                "ℹ".blue(),
                path.display(),
                "(not present, using defaults)".dimmed()
            );
        }
        Err(e) => {
            issues.push(Issue {
                category: "Configuration",
                summary: format!("Could not locate config directory: {e}"),
                fix: Some(format!("Set {}", paths::ENV_CONFIG_DIR)),
            });
        }
    }
}

/// Check if a command exists on PATH
fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
