//! Script composer - turns a request into an ordered list of shell stages
//!
//! Composition is pure: the same request and options always produce the
//! same program, nothing is executed and nothing can fail. Stages never
//! elevate on their own; the runner wraps the whole program in a single
//! elevation.

use crate::request::{EraseRequest, InstallRequest, OperationKind, OperationRequest, PartitionStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directories created on the data partition after install
pub const DATA_DIRECTORIES: [&str; 4] = ["ISO", "Themes", "Plugins", "Scripts"];

/// Starter plugin configuration, written only if none exists
pub const STARTER_CONFIG: &str = r#"{
  "theme": {
    "file": "/Themes/default/theme.txt",
    "gfxmode": "1024x768"
  },
  "menu_alias": [
    {
      "image": "/ISO/ubuntu.iso",
      "alias": "Ubuntu Linux"
    }
  ],
  "menu_tip": {
    "left": "10",
    "top": "80",
    "color": "red"
  }
}"#;

/// What a failing stage does to the rest of the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the program, exiting with the stage's exit code
    Abort,
    /// Print a warning and run the next stage
    WarnAndContinue,
}

/// Identifies what a stage does, independent of its label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Unmount,
    RunInstaller,
    SignEfi,
    DataLayout,
    WipeSignatures,
    ZeroHead,
    RandomOverwrite,
    SkipSecureErase,
    Settle,
    Report,
}

/// One logical unit of shell work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub label: String,
    /// Shell body, run in its own subshell
    pub script: String,
    pub policy: FailurePolicy,
}

impl Stage {
    fn new(kind: StageKind, label: &str, script: String, policy: FailurePolicy) -> Self {
        Self {
            kind,
            label: label.to_string(),
            script,
            policy,
        }
    }
}

/// Ordered stages for one operation on one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedProgram {
    pub kind: OperationKind,
    /// Target device node (e.g. `/dev/sdb`)
    pub device: String,
    pub stages: Vec<Stage>,
}

impl ComposedProgram {
    /// Whether any stage has the given kind
    pub fn has_stage(&self, kind: StageKind) -> bool {
        self.stages.iter().any(|s| s.kind == kind)
    }

    /// Stage kinds in program order
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind).collect()
    }
}

/// Environment-dependent inputs to composition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeOptions {
    /// External installer script
    pub installer: PathBuf,
    /// Bounded wait for the installer
    pub installer_timeout_secs: u64,
    /// Free space a data partition must exceed, in KiB
    pub min_free_kib: u64,
    pub data_mount_point: PathBuf,
    /// Wait before probing data partitions
    pub data_settle_secs: u64,
    pub signing_mount_point: PathBuf,
    /// Wait before mounting the EFI partition
    pub signing_settle_secs: u64,
    /// Wait after the final sync of an erase
    pub erase_settle_secs: u64,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            installer: PathBuf::from("/opt/ventoy/Ventoy2Disk.sh"),
            installer_timeout_secs: 300,
            min_free_kib: 100_000,
            data_mount_point: PathBuf::from("/tmp/usbforge_data_setup"),
            data_settle_secs: 5,
            signing_mount_point: PathBuf::from("/tmp/usbforge_efi_signing"),
            signing_settle_secs: 3,
            erase_settle_secs: 2,
        }
    }
}

/// Compose with default options
pub fn compose(request: &OperationRequest) -> ComposedProgram {
    compose_with(request, &ComposeOptions::default())
}

/// Compose a validated request into its program
pub fn compose_with(request: &OperationRequest, opts: &ComposeOptions) -> ComposedProgram {
    let device = request.device_path();
    let stages = match request {
        OperationRequest::Install(req) => install_stages(req, &device, opts),
        OperationRequest::Erase(req) => erase_stages(req, &device, opts),
    };

    log::debug!(
        "Composed {} stage(s) for {}: {:?}",
        stages.len(),
        device,
        stages.iter().map(|s| s.kind).collect::<Vec<_>>()
    );

    ComposedProgram {
        kind: request.kind(),
        device,
        stages,
    }
}

/// Installer flags in the order the installer expects them.
///
/// Exactly one of `-u` (upgrade) and `-I` (fresh install) is present.
pub fn installer_flags(req: &InstallRequest) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if req.secure_boot {
        flags.push("-s");
    }
    if req.partition_style == PartitionStyle::Gpt {
        flags.push("-g");
    }
    if req.preserve_space {
        flags.push("-r");
    }
    flags.push(if req.upgrade { "-u" } else { "-I" });
    flags
}

fn install_stages(req: &InstallRequest, device: &str, opts: &ComposeOptions) -> Vec<Stage> {
    let mut stages = vec![
        unmount_stage(device),
        Stage::new(
            StageKind::RunInstaller,
            if req.upgrade {
                "Upgrading boot loader"
            } else {
                "Installing boot loader"
            },
            installer_script(req, device, opts),
            FailurePolicy::Abort,
        ),
    ];

    if let Some((key, cert)) = req.custom_signing() {
        stages.push(Stage::new(
            StageKind::SignEfi,
            "Signing EFI files with custom keys",
            signing_script(
                device,
                key,
                cert,
                req.signing.owner_guid.as_deref(),
                opts,
            ),
            FailurePolicy::WarnAndContinue,
        ));
    }

    stages.push(Stage::new(
        StageKind::DataLayout,
        "Creating user directories",
        data_layout_script(device, opts),
        FailurePolicy::WarnAndContinue,
    ));

    stages
}

fn erase_stages(req: &EraseRequest, device: &str, opts: &ComposeOptions) -> Vec<Stage> {
    let dev = shell_quote(device);
    let mut stages = vec![
        unmount_stage(device),
        Stage::new(
            StageKind::WipeSignatures,
            "Removing partition table and filesystem signatures",
            format!("wipefs -af {dev}"),
            FailurePolicy::Abort,
        ),
        Stage::new(
            StageKind::ZeroHead,
            "Zeroing the first 10 MiB",
            format!("dd if=/dev/zero of={dev} bs=1M count=10 conv=fsync status=progress"),
            FailurePolicy::Abort,
        ),
    ];

    if req.secure_erase {
        stages.push(Stage::new(
            StageKind::RandomOverwrite,
            "Overwriting the entire drive with random data",
            format!(
                "DEVICE_BYTES=$(blockdev --getsize64 {dev}) || exit $?\n\
                 echo \"Writing $DEVICE_BYTES bytes of random data (this may take a while)...\"\n\
                 dd if=/dev/urandom of={dev} bs=4M count=\"$DEVICE_BYTES\" iflag=count_bytes conv=fsync status=progress"
            ),
            FailurePolicy::Abort,
        ));
    } else {
        stages.push(Stage::new(
            StageKind::SkipSecureErase,
            "Skipping secure erase (quick mode)",
            "echo \"Random overwrite not requested\"".to_string(),
            FailurePolicy::WarnAndContinue,
        ));
    }

    stages.push(Stage::new(
        StageKind::Settle,
        "Synchronizing",
        format!("sync\nsleep {}", opts.erase_settle_secs),
        FailurePolicy::Abort,
    ));
    stages.push(Stage::new(
        StageKind::Report,
        "Drive status after erase",
        format!("lsblk {dev} 2>/dev/null || echo \"✅ Drive is completely clean (no partitions found)\""),
        FailurePolicy::WarnAndContinue,
    ));

    stages
}

fn unmount_stage(device: &str) -> Stage {
    let dev = shell_quote(device);
    Stage::new(
        StageKind::Unmount,
        "Unmounting all partitions",
        format!(
            r#"for partition in $(lsblk -ln -o NAME {dev} 2>/dev/null | tail -n +2); do
    if umount "/dev/$partition" 2>/dev/null; then
        echo "Unmounted /dev/$partition"
    else
        echo "/dev/$partition not mounted or could not be unmounted"
    fi
done"#
        ),
        FailurePolicy::WarnAndContinue,
    )
}

fn installer_script(req: &InstallRequest, device: &str, opts: &ComposeOptions) -> String {
    let installer = shell_quote(&opts.installer.to_string_lossy());
    let workdir = opts
        .installer
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let flags = installer_flags(req).join(" ");

    format!(
        "cd {} || exit $?\nyes | timeout {} bash {installer} {flags} {}",
        shell_quote(&workdir.to_string_lossy()),
        opts.installer_timeout_secs,
        shell_quote(device),
    )
}

fn signing_script(
    device: &str,
    key: &Path,
    cert: &Path,
    owner_guid: Option<&str>,
    opts: &ComposeOptions,
) -> String {
    let mut sbsign = format!(
        "sbsign --key {} --cert {}",
        shell_quote(&key.to_string_lossy()),
        shell_quote(&cert.to_string_lossy())
    );
    if let Some(guid) = owner_guid {
        sbsign.push_str(&format!(" --owner-guid {}", shell_quote(guid)));
    }

    format!(
        r#"sleep {settle}
EFI_PARTITION={partition}
MOUNT_POINT={mount_point}
mkdir -p "$MOUNT_POINT"
if ! mount "$EFI_PARTITION" "$MOUNT_POINT" 2>/dev/null; then
    echo "Warning: could not mount $EFI_PARTITION for signing"
    rmdir "$MOUNT_POINT" 2>/dev/null
    exit 1
fi
find "$MOUNT_POINT" -type f -name '*.efi' | while IFS= read -r efi_file; do
    echo "Signing $(basename "$efi_file")..."
    {sbsign} --output "$efi_file" "$efi_file" || echo "Warning: failed to sign $(basename "$efi_file")"
done
umount "$MOUNT_POINT"
rmdir "$MOUNT_POINT" 2>/dev/null || true
echo "EFI signing completed""#,
        settle = opts.signing_settle_secs,
        partition = shell_quote(&partition_path(device, 1)),
        mount_point = shell_quote(&opts.signing_mount_point.to_string_lossy()),
    )
}

fn data_layout_script(device: &str, opts: &ComposeOptions) -> String {
    let mut create = String::new();
    for dir in DATA_DIRECTORIES {
        create.push_str(&format!("        mkdir -p \"$MOUNT_POINT/{dir}\"\n"));
    }
    for dir in DATA_DIRECTORIES {
        create.push_str(&format!(
            "cat > \"$MOUNT_POINT/{dir}/README.txt\" <<'README_EOF'\n{}\nREADME_EOF\n",
            readme_for(dir)
        ));
    }
    create.push_str(&format!(
        "        if [ ! -f \"$MOUNT_POINT/Plugins/ventoy.json\" ]; then\n\
         cat > \"$MOUNT_POINT/Plugins/ventoy.json\" <<'CONFIG_EOF'\n{STARTER_CONFIG}\nCONFIG_EOF\n\
         \x20           echo \"Created sample ventoy.json\"\n\
         \x20       fi\n"
    ));

    format!(
        r#"sleep {settle}
MOUNT_POINT={mount_point}
DATA_MOUNTED=false
mkdir -p "$MOUNT_POINT"
for partition in {second} {first}; do
    [ "$DATA_MOUNTED" = "true" ] && break
    echo "Trying to mount $partition..."
    if ! mount "$partition" "$MOUNT_POINT" 2>/dev/null; then
        continue
    fi
    FREE_KIB=$(df -Pk "$MOUNT_POINT" | tail -1 | awk '{{print $4}}')
    if [ -w "$MOUNT_POINT" ] && [ "${{FREE_KIB:-0}}" -gt {min_free} ]; then
        echo "Found data partition: $partition"
        DATA_MOUNTED=true
{create}        echo "Created directories: {dirs}"
    fi
    umount "$MOUNT_POINT" 2>/dev/null || true
done
rmdir "$MOUNT_POINT" 2>/dev/null || true
if [ "$DATA_MOUNTED" != "true" ]; then
    echo "No suitable data partition found for user directories"
    exit 1
fi
echo "User directories created successfully""#,
        settle = opts.data_settle_secs,
        mount_point = shell_quote(&opts.data_mount_point.to_string_lossy()),
        second = shell_quote(&partition_path(device, 2)),
        first = shell_quote(&partition_path(device, 1)),
        min_free = opts.min_free_kib,
        dirs = DATA_DIRECTORIES.map(|d| format!("{d}/")).join(", "),
    )
}

fn readme_for(dir: &str) -> &'static str {
    match dir {
        "ISO" => {
            "ISO Directory\n\
             =============\n\n\
             Place your .iso and .img files here.\n\n\
             Supported formats:\n\
             - .iso files (Linux distributions, Windows, etc.)\n\
             - .img files (disk images)\n\
             - .wim files (Windows imaging)\n\
             - .vhd/.vhdx files (virtual hard disks)\n\n\
             Copy boot files here and they will appear in the boot menu."
        }
        "Themes" => {
            "Themes Directory\n\
             ================\n\n\
             Place custom boot menu themes here.\n\n\
             Theme structure:\n\
             - One subdirectory per theme\n\
             - A theme.txt configuration file\n\
             - Background images and fonts\n\n\
             Example: Themes/MyTheme/theme.txt"
        }
        "Plugins" => {
            "Plugins Directory\n\
             =================\n\n\
             Plugin files:\n\
             - ventoy.json (main plugin configuration)\n\
             - Custom plugin scripts\n\
             - Persistence configuration"
        }
        _ => {
            "Scripts Directory\n\
             =================\n\n\
             Custom tools and scripts:\n\
             - Diagnostic tools\n\
             - Utility scripts\n\
             - Custom bootable tools"
        }
    }
}

/// Path of partition `number` on `device`.
///
/// Kernel names ending in a digit take a `p` separator
/// (`/dev/nvme0n1` -> `/dev/nvme0n1p1`).
pub fn partition_path(device: &str, number: u32) -> String {
    if device.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{device}p{number}")
    } else {
        format!("{device}{number}")
    }
}

/// Single-quote a value for POSIX shells
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
