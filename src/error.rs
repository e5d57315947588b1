//! Error types for release resolution, download and installation.

use std::path::PathBuf;

/// Top-level error type for every library operation.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure talking to the hosting API or a download host.
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body could not be decoded.
    #[error("cannot decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Every attempt to resolve the latest release failed.
    #[error("unable to resolve latest version of {repo} after {attempts} attempt(s)")]
    ResolveFailed { repo: String, attempts: u32 },

    /// The install directory belongs to another repository.
    #[error("installed version is for a different repository: expected {expected}, found {found}")]
    RepoMismatch { expected: String, found: String },

    /// No version record exists in the install directory.
    #[error("no version record at {}", path.display())]
    RecordNotFound { path: PathBuf },

    /// The version record exists but cannot be parsed.
    #[error("malformed version record at {}: {reason}", path.display())]
    RecordMalformed { path: PathBuf, reason: String },

    /// Filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Compressed stream or container header is corrupt, or an entry is unsafe.
    #[error("archive error in {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    /// Pattern search over the latest release found nothing.
    #[error("no asset of the latest {repo} release matches {pattern}")]
    NoMatchingAsset { repo: String, pattern: String },

    /// Asset pattern is not a valid regular expression.
    #[error("invalid asset pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Repository identifier is not of the form `owner/name`.
    #[error("invalid repository {0:?}, expected owner/name")]
    InvalidRepo(String),

    /// Configuration value rejected.
    #[error("config error: {0}")]
    InvalidConfig(String),

    /// Transfer aborted by the caller's cancellation token.
    #[error("download of {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    /// Wrap an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Attach operation context to `std::io::Result` values.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| FetchError::io(context(), source))
    }
}
