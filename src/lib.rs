//! Resolve, download and install GitHub release assets.
//!
//! An install directory tracks what it holds through a small `version.json`
//! record; installing again either does nothing, or replaces the directory
//! when a newer release is out and upgrading is allowed.

pub mod api;
pub mod config;
pub mod download;
pub mod error;
pub mod install;

pub use api::{Api, RepoApi, VersionApi};
pub use config::{FetchConfig, FetchConfigBuilder, Settings, env_proxy};
pub use error::{FetchError, Result};
pub use install::{InstallOutcome, VersionRecord};
