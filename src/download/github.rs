//! GitHub release API interaction

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use serde::Deserialize;

use crate::error::{FetchError, Result};

/// Default API request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("relfetch/", env!("CARGO_PKG_VERSION"));

/// GitHub release metadata from API
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// GitHub release asset metadata
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GitHubAsset {
    pub name: String,
}

impl GitHubRelease {
    /// Names of every asset attached to the release, in API order.
    pub fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.name.clone()).collect()
    }
}

/// Source of "latest release" metadata for a repository.
///
/// One call is exactly one request; retrying is the resolver's job.
pub trait ReleaseApi: Send + Sync {
    fn latest_release(&self, repo: &str) -> impl Future<Output = Result<GitHubRelease>> + Send;
}

/// Base reqwest builder shared by the API client and the fetch engine.
///
/// Ambient proxy variables are ignored; only an explicit proxy is used.
pub(crate) fn client_builder(proxy: Option<&str>) -> Result<ClientBuilder> {
    let builder = Client::builder().user_agent(USER_AGENT);
    match proxy {
        Some(proxy_url) => {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| FetchError::InvalidConfig(format!("invalid proxy {proxy_url}: {e}")))?;
            Ok(builder.proxy(proxy))
        }
        None => Ok(builder.no_proxy()),
    }
}

/// HTTP implementation of [`ReleaseApi`] against the GitHub REST API.
#[derive(Clone)]
pub struct GitHubApi {
    client: Client,
    api_base: String,
}

impl std::fmt::Debug for GitHubApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubApi")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubApi {
    /// Create a client for `api_base` (e.g. `https://api.github.com`).
    pub fn new(api_base: &str, proxy: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = client_builder(proxy)?
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::InvalidConfig(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
        })
    }

    /// Endpoint for the latest release of `repo`.
    pub fn latest_release_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, repo)
    }
}

impl ReleaseApi for GitHubApi {
    async fn latest_release(&self, repo: &str) -> Result<GitHubRelease> {
        let url = self.latest_release_url(repo);
        log::trace!("GET {url}");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response
            .json::<GitHubRelease>()
            .await
            .map_err(|e| FetchError::Decode {
                url,
                reason: e.to_string(),
            })
    }
}
