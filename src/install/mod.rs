//! Installation of release assets into tracked directories
//!
//! An install directory holds the extracted asset of exactly one repository
//! plus a `version.json` record. The record is what later calls compare
//! against the latest release to decide between doing nothing and upgrading.

mod detection;
mod installer;
mod record;

pub use detection::{InstallationState, check_installation_state, installed_record};
pub use installer::{InstallOutcome, Installer};
pub use record::{VERSION_FILE, VersionRecord, read_record, record_path, write_record};
