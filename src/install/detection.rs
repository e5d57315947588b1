//! Installation state detection
//!
//! Compares the version record in an install directory against the latest
//! remote release:
//! - no record file → `NotInstalled`
//! - record tag equals the latest tag → `InstalledCurrent`
//! - otherwise → `InstalledStale`
//!
//! The latest tag is always used for the comparison, even when the existing
//! install was pinned to a specific tag.

use std::path::Path;

use super::record::{VersionRecord, read_record};
use crate::download::{ReleaseApi, VersionResolver};
use crate::error::{FetchError, Result};

/// Installation state of one directory relative to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationState {
    /// No version record found
    NotInstalled,
    /// Installed tag matches the latest release
    InstalledCurrent { record: VersionRecord },
    /// A newer (or at least different) release is available
    InstalledStale { record: VersionRecord, latest: String },
}

/// Read the record in `dir` and check it belongs to `repo`.
///
/// `Ok(None)` means nothing is installed. A malformed record or one owned by
/// another repository is an error; the directory is never treated as empty.
pub fn installed_record(dir: &Path, repo: &str) -> Result<Option<VersionRecord>> {
    let record = match read_record(dir) {
        Ok(record) => record,
        Err(FetchError::RecordNotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };

    if record.repo != repo {
        return Err(FetchError::RepoMismatch {
            expected: repo.to_owned(),
            found: record.repo,
        });
    }
    Ok(Some(record))
}

/// Determine the installation state of `dir` for `repo`.
///
/// Makes exactly one (retried) resolution when a record is present and none
/// otherwise.
pub async fn check_installation_state<A: ReleaseApi>(
    dir: &Path,
    repo: &str,
    resolver: &VersionResolver<A>,
) -> Result<InstallationState> {
    let Some(record) = installed_record(dir, repo)? else {
        return Ok(InstallationState::NotInstalled);
    };

    let latest = resolver.resolve_latest(repo).await?;
    if latest == record.tag {
        Ok(InstallationState::InstalledCurrent { record })
    } else {
        Ok(InstallationState::InstalledStale { record, latest })
    }
}
