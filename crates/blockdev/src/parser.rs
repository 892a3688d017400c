//! Parser for `lsblk -o NAME,MODEL,SIZE,TYPE,TRAN` output
//!
//! The MODEL column has no fixed width and may contain spaces, so rows are
//! parsed positionally: first token is the name, the last three are size,
//! type and transport, and everything in between is the model.

use crate::types::{DiskDescriptor, MEDIA_DISK, TRANSPORT_USB};

/// Model reported when the MODEL column is empty
const UNKNOWN_MODEL: &str = "Unknown";

/// Parse a full listing, keeping only USB whole disks in listing order
pub fn parse_listing(listing: &str) -> Vec<DiskDescriptor> {
    listing.lines().filter_map(parse_row).collect()
}

/// Parse a single listing row.
///
/// Returns `None` unless the raw row mentions both `usb` and `disk`
/// (case-insensitive) and the positional TYPE/TRAN columns are `disk`/`usb`.
pub fn parse_row(row: &str) -> Option<DiskDescriptor> {
    let lowered = row.to_lowercase();
    if !lowered.contains(TRANSPORT_USB) || !lowered.contains(MEDIA_DISK) {
        return None;
    }

    let tokens: Vec<&str> = row.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let last = tokens.len();
    let media_type = tokens[last - 2];
    let transport = tokens[last - 1];
    if !media_type.eq_ignore_ascii_case(MEDIA_DISK) || !transport.eq_ignore_ascii_case(TRANSPORT_USB)
    {
        return None;
    }

    let model = tokens[1..last - 3].join(" ");

    Some(DiskDescriptor {
        name: tokens[0].to_string(),
        model: if model.is_empty() {
            UNKNOWN_MODEL.to_string()
        } else {
            model
        },
        size: tokens[last - 3].to_string(),
        media_type: media_type.to_string(),
        transport: transport.to_string(),
    })
}
