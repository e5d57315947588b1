//! Chained repository / version selection
//!
//! ```no_run
//! # async fn run() -> relfetch::Result<()> {
//! use relfetch::{Api, FetchConfig};
//!
//! let config = FetchConfig::builder().install_dir("./vendor/llama").build()?;
//! let outcome = Api::new(config)
//!     .repo("ggml-org/llama.cpp")
//!     .latest()
//!     .install(|tag| format!("llama-{tag}-bin-ubuntu-x64.zip"))
//!     .await?;
//! println!("installed {}", outcome.tag());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use crate::config::{FetchConfig, env_proxy};
use crate::download::{
    AssetLocator, GitHubApi, HttpFetcher, VersionResolver, fetch_asset, find_matching_asset,
    validate_repo,
};
use crate::error::Result;
use crate::install::{InstallOutcome, Installer, VersionRecord, read_record};

/// Entry point holding a frozen [`FetchConfig`].
#[derive(Debug, Clone)]
pub struct Api {
    config: FetchConfig,
}

impl Api {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    /// Default configuration with the proxy taken from `HTTP_PROXY` /
    /// `HTTPS_PROXY`.
    pub fn from_env() -> Result<Self> {
        let mut builder = FetchConfig::builder();
        if let Some(proxy) = env_proxy() {
            builder = builder.proxy(proxy);
        }
        Ok(Self::new(builder.build()?))
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Select a repository (`owner/name`).
    pub fn repo(&self, repo: &str) -> RepoApi<'_> {
        RepoApi {
            api: self,
            repo: repo.to_owned(),
        }
    }

    fn resolver(&self) -> Result<VersionResolver<GitHubApi>> {
        let client = GitHubApi::new(
            self.config.api_base(),
            self.config.proxy(),
            self.config.request_timeout(),
        )?;
        Ok(VersionResolver::new(client, self.config.retry()))
    }

    fn fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::new(self.config.proxy(), self.config.progress())
    }

    fn locator(&self) -> AssetLocator {
        AssetLocator::new(self.config.download_base())
    }
}

/// Operations on one repository.
#[derive(Debug, Clone)]
pub struct RepoApi<'a> {
    api: &'a Api,
    repo: String,
}

impl<'a> RepoApi<'a> {
    pub fn name(&self) -> &str {
        &self.repo
    }

    /// Install whatever the latest release is; upgrades are allowed.
    pub fn latest(&self) -> VersionApi<'a> {
        VersionApi {
            api: self.api,
            repo: self.repo.clone(),
            version: None,
            allow_upgrade: true,
        }
    }

    /// Install a specific tag; an existing install is left alone.
    pub fn version(&self, tag: &str) -> VersionApi<'a> {
        VersionApi {
            api: self.api,
            repo: self.repo.clone(),
            version: Some(tag.to_owned()),
            allow_upgrade: false,
        }
    }

    /// Record in the configured install directory. The record's repository
    /// is not checked against this one.
    pub fn installed_version(&self) -> Result<VersionRecord> {
        read_record(self.api.config.install_dir())
    }

    /// Latest release tag, retried per the configured policy.
    pub async fn latest_version(&self) -> Result<String> {
        validate_repo(&self.repo)?;
        self.api.resolver()?.resolve_latest(&self.repo).await
    }

    /// Asset names of the latest release (single request).
    pub async fn latest_assets(&self) -> Result<Vec<String>> {
        validate_repo(&self.repo)?;
        self.api.resolver()?.list_latest_assets(&self.repo).await
    }

    pub fn asset_url(&self, version: &str, asset_name: &str) -> String {
        self.api.locator().asset_url(&self.repo, version, asset_name)
    }

    /// Fetch `asset_name` into `dest` without touching any version record.
    /// `None` resolves the latest tag first.
    pub async fn download_asset(
        &self,
        asset_name: &str,
        version: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        validate_repo(&self.repo)?;
        let locator = self.api.locator();
        let url = match version {
            Some(tag) => locator.asset_url(&self.repo, tag, asset_name),
            None => {
                let resolver = self.api.resolver()?;
                locator.latest_asset_url(&resolver, &self.repo, asset_name).await?
            }
        };
        fetch_asset(&self.api.fetcher()?, &url, dest).await
    }

    /// Fetch the first asset of the latest release whose name matches the
    /// regular expression `pattern`, returning its name.
    pub async fn download_latest_matching(&self, pattern: &str, dest: &Path) -> Result<String> {
        validate_repo(&self.repo)?;
        let release = self.api.resolver()?.latest_release_once(&self.repo).await?;
        let names = release.asset_names();
        let name = find_matching_asset(&self.repo, pattern, &names)?;

        let url = self.api.locator().asset_url(&self.repo, &release.tag_name, name);
        fetch_asset(&self.api.fetcher()?, &url, dest).await?;
        Ok(name.to_owned())
    }
}

/// A repository plus a version strategy, ready to install.
#[derive(Debug, Clone)]
pub struct VersionApi<'a> {
    api: &'a Api,
    repo: String,
    version: Option<String>,
    allow_upgrade: bool,
}

impl VersionApi<'_> {
    /// Override whether a stale install may be replaced.
    pub fn with_upgrade(mut self, allow: bool) -> Self {
        self.allow_upgrade = allow;
        self
    }

    /// Install into the configured directory, naming the asset with
    /// `asset_name(tag)`.
    pub async fn install<N>(self, asset_name: N) -> Result<InstallOutcome>
    where
        N: Fn(&str) -> String,
    {
        let config = &self.api.config;
        let installer = Installer::new(
            &self.repo,
            config.install_dir(),
            self.api.resolver()?,
            self.api.locator(),
            self.api.fetcher()?,
        )?
        .with_staged_upgrade(config.staged_upgrade());

        installer
            .install(self.version.as_deref(), self.allow_upgrade, asset_name)
            .await
    }
}
