//! Progress indicators for the usbforge CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Steady-ticking spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} {elapsed:.dim}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Hidden spinner for quiet mode; all calls become no-ops
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}
