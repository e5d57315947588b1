//! GitHub release resolution, asset transfer and archive extraction
//!
//! ## Module Organization
//!
//! - `github` - GitHub API interaction for release discovery
//! - `resolver` - Latest-tag resolution with retry, download URL construction
//! - `core` - Fetch engine and archive-aware dispatch
//! - `extract` - Stripped `.tar.gz` replay and zip extraction
//! - `progress` - Progress events and sinks

mod core;
mod extract;
mod github;
mod progress;
mod resolver;

// Re-export public API
pub use self::core::{FetchMode, Fetcher, HttpFetcher, fetch_asset, file_name_from_url};
pub use extract::{TAR_GZ_SUFFIX, extract_tar_gz_stripped, extract_zip};
pub use github::{DEFAULT_REQUEST_TIMEOUT, GitHubApi, GitHubAsset, GitHubRelease, ReleaseApi};
pub use progress::{BarProgress, DownloadPhase, DownloadProgress, NoProgress, ProgressSink};
pub use resolver::{
    AssetLocator, DEFAULT_DOWNLOAD_BASE, RetryPolicy, VersionResolver, find_matching_asset,
    validate_repo,
};
