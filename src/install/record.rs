//! Persisted version record
//!
//! One `version.json` per install directory, holding the installed tag and the
//! repository it came from:
//!
//! ```json
//! {"tag_name": "v1.2.3", "repo": "owner/name"}
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{FetchError, IoContext, Result};

/// File name of the record inside an install directory.
pub const VERSION_FILE: &str = "version.json";

/// What is currently installed in a directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    #[serde(rename = "tag_name")]
    pub tag: String,
    pub repo: String,
}

/// Location of the record for `dir`.
pub fn record_path(dir: &Path) -> PathBuf {
    dir.join(VERSION_FILE)
}

/// Write (or overwrite) the record in `dir`, creating `dir` if needed.
///
/// The record is written to a temporary file in the same directory and
/// renamed over the old one, so a reader sees either the old or the new
/// record, never a torn one.
pub fn write_record(dir: &Path, tag: &str, repo: &str) -> Result<()> {
    std::fs::create_dir_all(dir)
        .io_context(|| format!("failed to create directory {}", dir.display()))?;

    let record = VersionRecord {
        tag: tag.to_owned(),
        repo: repo.to_owned(),
    };
    let json = serde_json::to_vec(&record)
        .map_err(|e| FetchError::io("failed to serialize version record", std::io::Error::other(e)))?;

    let path = record_path(dir);
    let mut tmp = NamedTempFile::new_in(dir)
        .io_context(|| format!("failed to create temporary record in {}", dir.display()))?;
    tmp.write_all(&json)
        .and_then(|()| tmp.as_file().sync_all())
        .io_context(|| format!("failed to write {}", path.display()))?;
    tmp.persist(&path)
        .map_err(|e| FetchError::io(format!("failed to persist {}", path.display()), e.error))?;

    log::debug!("recorded {repo}@{tag} in {}", path.display());
    Ok(())
}

/// Read the record in `dir`.
pub fn read_record(dir: &Path) -> Result<VersionRecord> {
    let path = record_path(dir);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FetchError::RecordNotFound { path });
        }
        Err(e) => return Err(FetchError::io(format!("failed to read {}", path.display()), e)),
    };

    serde_json::from_slice(&bytes).map_err(|e| FetchError::RecordMalformed {
        path,
        reason: e.to_string(),
    })
}
