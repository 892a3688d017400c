//! Disk descriptors surfaced by the inventory

use serde::{Deserialize, Serialize};

/// Media type every surfaced descriptor carries
pub const MEDIA_DISK: &str = "disk";

/// Transport every surfaced descriptor carries
pub const TRANSPORT_USB: &str = "usb";

/// Immutable snapshot of one USB-attached whole disk.
///
/// Descriptors are rebuilt on every query and have no identity beyond
/// [`DiskDescriptor::name`]. Holding one across a refresh does not keep
/// the device selected; callers re-resolve by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDescriptor {
    /// Kernel device name (e.g. `sdb`)
    pub name: String,
    /// Free-text model, may contain spaces
    pub model: String,
    /// Human-readable size as printed by the listing (e.g. `29.8G`)
    pub size: String,
    /// Media type column, always `disk`
    pub media_type: String,
    /// Transport column, always `usb`
    pub transport: String,
}

impl DiskDescriptor {
    /// Absolute device node path (e.g. `/dev/sdb`)
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.name)
    }

    /// One-line summary for listings
    pub fn summary(&self) -> String {
        format!("{} | {} | {}", self.name, self.model, self.size)
    }
}
