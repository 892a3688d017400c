use thiserror::Error;

/// Errors raised while querying the block-device registry.
///
/// These never escape [`crate::list_usb_disks`]; they only reach callers that
/// drive a [`crate::ListingSource`] directly.
#[derive(Debug, Error)]
pub enum Error {
    /// The listing tool could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The listing tool ran but reported failure
    #[error("{program} exited with {status}: {stderr}")]
    QueryFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Result type for block-device queries
pub type Result<T> = std::result::Result<T, Error>;
