//! Progress events streamed from a running program

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display severity derived from a line's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Classify one output line.
    ///
    /// Error markers win over warning markers, which win over success
    /// markers. Anything else is informational.
    pub fn classify(line: &str) -> Self {
        const ERROR: [&str; 4] = ["❌", "FAILED", "ERROR", "Error:"];
        const WARNING: [&str; 3] = ["⚠", "WARNING", "Warning:"];
        const SUCCESS: [&str; 2] = ["✅", "SUCCESS"];

        let has = |markers: &[&str]| markers.iter().any(|m| line.contains(m));
        if has(&ERROR) {
            Self::Error
        } else if has(&WARNING) {
            Self::Warning
        } else if has(&SUCCESS) || line.to_lowercase().contains("completed") {
            Self::Success
        } else {
            Self::Info
        }
    }
}

/// One line of program output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Position in the stream, starting at 0
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub line: String,
    pub severity: Severity,
}

impl ProgressEvent {
    pub fn new(seq: u64, line: impl Into<String>) -> Self {
        let line = line.into();
        Self {
            seq,
            at: Utc::now(),
            severity: Severity::classify(&line),
            line,
        }
    }

    /// `HH:MM:SS` in local time
    pub fn timestamp(&self) -> String {
        self.at
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S")
            .to_string()
    }
}
