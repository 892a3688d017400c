use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "usbforge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Install, upgrade and erase bootable multi-ISO USB drives", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List USB-attached disks
    Disks {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install (or upgrade) the boot loader on a USB disk
    Install(InstallArgs),

    /// Erase a USB disk
    Erase(EraseArgs),

    /// Show signing keys and owner GUID found on this machine
    Keys,

    /// Check that the required tools are available
    Doctor,

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct InstallArgs {
    /// Target disk (e.g. sdb or /dev/sdb)
    pub disk: String,

    /// Enable secure boot support
    #[arg(long)]
    pub secure_boot: bool,

    /// Use a GPT partition table instead of MBR
    #[arg(long)]
    pub gpt: bool,

    /// Keep the space after the data partition unallocated
    #[arg(long)]
    pub preserve_space: bool,

    /// Upgrade an existing installation, keeping data
    #[arg(long)]
    pub upgrade: bool,

    /// Sign EFI files after install
    #[arg(long)]
    pub efi_signing: bool,

    /// Owner GUID passed to the signer
    #[arg(long, value_name = "GUID", requires = "efi_signing")]
    pub owner_guid: Option<String>,

    /// Private key for custom EFI signing
    #[arg(long, value_name = "PATH", requires = "efi_signing")]
    pub vendor_key: Option<PathBuf>,

    /// Certificate for custom EFI signing
    #[arg(long, value_name = "PATH", requires = "efi_signing")]
    pub vendor_cert: Option<PathBuf>,

    /// Fill unset key, certificate and GUID from the local key probe
    #[arg(long, requires = "efi_signing")]
    pub detect_keys: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args)]
pub struct EraseArgs {
    /// Target disk (e.g. sdb or /dev/sdb)
    pub disk: String,

    /// Overwrite the whole drive with random data (slow)
    #[arg(long)]
    pub secure: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options shared by destructive commands
#[derive(Args, Clone, Copy)]
pub struct RunArgs {
    /// Print the program that would run, without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
