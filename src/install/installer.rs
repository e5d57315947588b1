//! Install / upgrade state machine
//!
//! Drives one install directory through `NotInstalled` → `InstalledCurrent`,
//! and `InstalledStale` → `InstalledCurrent` when upgrading is allowed.
//! Failures abort the operation and are returned as-is; a failed in-place
//! upgrade is not rolled back.

use std::path::{Path, PathBuf};

use log::debug;

use super::detection::{InstallationState, check_installation_state, installed_record};
use super::record::write_record;
use crate::download::{
    AssetLocator, Fetcher, ReleaseApi, VersionResolver, fetch_asset, validate_repo,
};
use crate::error::{FetchError, IoContext, Result};

/// What an install call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Nothing was installed before; `tag` is now.
    Installed { tag: String },
    /// The installed tag is already the latest.
    Current { tag: String },
    /// The directory was rebuilt from `from` to `to`.
    Upgraded { from: String, to: String },
    /// A record exists and upgrading was not allowed; nothing was checked.
    Kept { tag: String },
}

impl InstallOutcome {
    /// Tag present in the directory after the call.
    pub fn tag(&self) -> &str {
        match self {
            Self::Installed { tag } | Self::Current { tag } | Self::Kept { tag } => tag,
            Self::Upgraded { to, .. } => to,
        }
    }
}

/// Installs release assets of one repository into one directory.
#[derive(Debug)]
pub struct Installer<A, F> {
    repo: String,
    install_dir: PathBuf,
    resolver: VersionResolver<A>,
    locator: AssetLocator,
    fetcher: F,
    staged_upgrade: bool,
}

impl<A: ReleaseApi, F: Fetcher> Installer<A, F> {
    pub fn new(
        repo: &str,
        install_dir: impl Into<PathBuf>,
        resolver: VersionResolver<A>,
        locator: AssetLocator,
        fetcher: F,
    ) -> Result<Self> {
        validate_repo(repo)?;
        Ok(Self {
            repo: repo.to_owned(),
            install_dir: install_dir.into(),
            resolver,
            locator,
            fetcher,
            staged_upgrade: false,
        })
    }

    /// Build upgrades in a sibling directory and swap them in only once the
    /// new record is written.
    pub fn with_staged_upgrade(mut self, staged: bool) -> Self {
        self.staged_upgrade = staged;
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Install the asset named by `asset_name(tag)`.
    ///
    /// `version` pins the tag for a fresh install; `None` resolves the latest
    /// release. An existing install is only compared against the latest
    /// release when `allow_upgrade` is set, and an upgrade always moves to
    /// the latest tag with the asset name recomputed from it.
    pub async fn install<N>(
        &self,
        version: Option<&str>,
        allow_upgrade: bool,
        asset_name: N,
    ) -> Result<InstallOutcome>
    where
        N: Fn(&str) -> String,
    {
        if !allow_upgrade && let Some(record) = installed_record(&self.install_dir, &self.repo)? {
            debug!("{} already holds {}@{}", self.install_dir.display(), self.repo, record.tag);
            return Ok(InstallOutcome::Kept { tag: record.tag });
        }

        match check_installation_state(&self.install_dir, &self.repo, &self.resolver).await? {
            InstallationState::NotInstalled => {
                let tag = match version {
                    Some(tag) => tag.to_owned(),
                    None => self.resolver.resolve_latest(&self.repo).await?,
                };
                self.fetch_into(&self.install_dir, &tag, &asset_name(&tag)).await?;
                write_record(&self.install_dir, &tag, &self.repo)?;
                Ok(InstallOutcome::Installed { tag })
            }
            InstallationState::InstalledCurrent { record } => {
                debug!("{}@{} is current", self.repo, record.tag);
                Ok(InstallOutcome::Current { tag: record.tag })
            }
            InstallationState::InstalledStale { record, latest } => {
                debug!("upgrading {} from {} to {latest}", self.repo, record.tag);
                let asset = asset_name(&latest);
                if self.staged_upgrade {
                    self.upgrade_staged(&latest, &asset).await?;
                } else {
                    self.upgrade_in_place(&latest, &asset).await?;
                }
                Ok(InstallOutcome::Upgraded {
                    from: record.tag,
                    to: latest,
                })
            }
        }
    }

    async fn fetch_into(&self, dir: &Path, tag: &str, asset: &str) -> Result<()> {
        let url = self.locator.asset_url(&self.repo, tag, asset);
        fetch_asset(&self.fetcher, &url, dir).await
    }

    async fn upgrade_in_place(&self, tag: &str, asset: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.install_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FetchError::io(
                    format!("failed to remove {}", self.install_dir.display()),
                    e,
                ));
            }
        }

        self.fetch_into(&self.install_dir, tag, asset).await?;
        write_record(&self.install_dir, tag, &self.repo)
    }

    async fn upgrade_staged(&self, tag: &str, asset: &str) -> Result<()> {
        let Some(name) = self.install_dir.file_name() else {
            return Err(FetchError::InvalidConfig(format!(
                "staged upgrade needs a named install directory, got {}",
                self.install_dir.display()
            )));
        };
        let parent = match self.install_dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let stage = tempfile::Builder::new()
            .prefix(&format!(".{}.staged-", name.to_string_lossy()))
            .tempdir_in(parent)
            .io_context(|| format!("failed to create staging directory in {}", parent.display()))?;

        // Dropping `stage` before `keep` discards a failed upgrade.
        self.fetch_into(stage.path(), tag, asset).await?;
        write_record(stage.path(), tag, &self.repo)?;
        let staged = stage.keep();

        tokio::fs::remove_dir_all(&self.install_dir)
            .await
            .io_context(|| format!("failed to remove {}", self.install_dir.display()))?;
        tokio::fs::rename(&staged, &self.install_dir)
            .await
            .io_context(|| {
                format!(
                    "failed to move {} into {}",
                    staged.display(),
                    self.install_dir.display()
                )
            })
    }
}
