//! # blockdev
//!
//! Discovery of USB-attached whole disks.
//!
//! The inventory asks the block-device registry (`lsblk`) for a table of
//! `NAME MODEL SIZE TYPE TRAN` rows and keeps the rows that are USB disks.
//! It never fails: a broken query is logged and yields an empty list, so
//! "no drives" and "query broken" can only be told apart from the logs.
//!
//! ## Example
//!
//! ```no_run
//! let disks = blockdev::list_usb_disks();
//! for disk in &disks {
//!     println!("{} ({})", disk.device_path(), disk.model);
//! }
//! ```

pub mod error;
pub mod parser;
pub mod source;
pub mod types;

pub use error::{Error, Result};
pub use parser::{parse_listing, parse_row};
pub use source::{ListingSource, Lsblk, StaticListing};
pub use types::DiskDescriptor;

/// List USB disks using the system `lsblk`
pub fn list_usb_disks() -> Vec<DiskDescriptor> {
    list_usb_disks_from(&Lsblk::new())
}

/// List USB disks from any listing source.
///
/// Query failures are logged at warn level and produce an empty list.
pub fn list_usb_disks_from(source: &dyn ListingSource) -> Vec<DiskDescriptor> {
    match source.listing() {
        Ok(listing) => {
            let disks = parse_listing(&listing);
            log::debug!("Block-device query returned {} USB disk(s)", disks.len());
            disks
        }
        Err(e) => {
            log::warn!("Block-device query failed: {e}");
            Vec::new()
        }
    }
}

/// Re-resolve a disk by kernel name (a leading `/dev/` is ignored).
///
/// Callers resolve against a fresh listing right before use; a name that
/// is no longer present means the selection is stale.
pub fn find_disk<'a>(disks: &'a [DiskDescriptor], name: &str) -> Option<&'a DiskDescriptor> {
    let name = name.trim().trim_start_matches("/dev/");
    disks.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenListing;

    impl ListingSource for BrokenListing {
        fn listing(&self) -> Result<String> {
            Err(Error::QueryFailed {
                program: "lsblk".to_string(),
                status: "exit status: 32".to_string(),
                stderr: "failed to access sysfs".to_string(),
            })
        }
    }

    #[test]
    fn test_broken_query_is_empty() {
        assert!(list_usb_disks_from(&BrokenListing).is_empty());
    }

    #[test]
    fn test_list_from_static() {
        let source = StaticListing(
            "sda Samsung SSD 465.8G disk sata\nsdb SanDisk Ultra USB 3.0 29.8G disk usb\n"
                .to_string(),
        );
        let disks = list_usb_disks_from(&source);
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].name, "sdb");
    }

    #[test]
    fn test_find_disk() {
        let disks = parse_listing("sdb A 1G disk usb\nsdc B 2G disk usb\n");
        assert_eq!(find_disk(&disks, "sdc").unwrap().model, "B");
        assert_eq!(find_disk(&disks, "/dev/sdb").unwrap().model, "A");
        assert!(find_disk(&disks, "sdd").is_none());
    }

    #[test]
    fn test_find_disk_stale_after_refresh() {
        let before = parse_listing("sdb A 1G disk usb\n");
        assert!(find_disk(&before, "sdb").is_some());
        let after = parse_listing("sdc B 2G disk usb\n");
        assert!(find_disk(&after, "sdb").is_none());
    }
}
