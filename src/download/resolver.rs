//! Latest-version resolution with fixed retry, and download URL construction.

use std::time::Duration;

use log::debug;
use regex::Regex;

use super::github::{GitHubRelease, ReleaseApi};
use crate::error::{FetchError, Result};

/// Default download host for release assets.
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://github.com";

/// Fixed-count, fixed-delay retry policy for version resolution.
///
/// `count` is the total number of attempts. The delay is slept after every
/// failed attempt, including the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub count: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// Resolves the latest release tag of a repository.
#[derive(Debug, Clone)]
pub struct VersionResolver<A> {
    api: A,
    retry: RetryPolicy,
}

impl<A: ReleaseApi> VersionResolver<A> {
    pub fn new(api: A, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Latest release tag, exactly as reported (a leading `v` is kept).
    ///
    /// Individual attempt errors are dropped; exhaustion yields
    /// [`FetchError::ResolveFailed`].
    pub async fn resolve_latest(&self, repo: &str) -> Result<String> {
        for attempt in 1..=self.retry.count {
            match self.api.latest_release(repo).await {
                Ok(release) => return Ok(release.tag_name),
                Err(e) => {
                    debug!(
                        "resolving latest {repo} failed (attempt {attempt}/{}): {e}",
                        self.retry.count
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }

        Err(FetchError::ResolveFailed {
            repo: repo.to_owned(),
            attempts: self.retry.count,
        })
    }

    /// Latest release metadata from a single, non-retried request.
    pub async fn latest_release_once(&self, repo: &str) -> Result<GitHubRelease> {
        self.api.latest_release(repo).await
    }

    /// Names of every asset attached to the latest release (single request).
    pub async fn list_latest_assets(&self, repo: &str) -> Result<Vec<String>> {
        Ok(self.latest_release_once(repo).await?.asset_names())
    }
}

/// Builds download URLs for release assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocator {
    download_base: String,
}

impl Default for AssetLocator {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_BASE)
    }
}

impl AssetLocator {
    pub fn new(download_base: &str) -> Self {
        Self {
            download_base: download_base.trim_end_matches('/').to_owned(),
        }
    }

    /// `<base>/<repo>/releases/download/<version>/<asset>`. Pure; the asset
    /// name is not validated.
    pub fn asset_url(&self, repo: &str, version: &str, asset_name: &str) -> String {
        format!(
            "{}/{}/releases/download/{}/{}",
            self.download_base, repo, version, asset_name
        )
    }

    /// Download URL of `asset_name` in the latest release.
    pub async fn latest_asset_url<A: ReleaseApi>(
        &self,
        resolver: &VersionResolver<A>,
        repo: &str,
        asset_name: &str,
    ) -> Result<String> {
        let version = resolver.resolve_latest(repo).await?;
        Ok(self.asset_url(repo, &version, asset_name))
    }
}

/// First asset name matching `pattern`, in release order.
pub fn find_matching_asset<'a>(
    repo: &str,
    pattern: &str,
    assets: &'a [String],
) -> Result<&'a str> {
    let re = Regex::new(pattern).map_err(|e| FetchError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })?;

    assets
        .iter()
        .find(|name| re.is_match(name))
        .map(String::as_str)
        .ok_or_else(|| FetchError::NoMatchingAsset {
            repo: repo.to_owned(),
            pattern: pattern.to_owned(),
        })
}

/// Check that `repo` has the `owner/name` shape.
pub fn validate_repo(repo: &str) -> Result<()> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => Err(FetchError::InvalidRepo(repo.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Release API that fails a fixed number of times before answering.
    struct FlakyApi {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl ReleaseApi for FlakyApi {
        async fn latest_release(&self, repo: &str) -> Result<GitHubRelease> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Status {
                    url: format!("mock://{repo}"),
                    status: 502,
                });
            }
            Ok(GitHubRelease {
                tag_name: "v2.0.0".into(),
                assets: Vec::new(),
            })
        }
    }

    fn resolver(failures: usize, count: u32) -> (VersionResolver<FlakyApi>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let api = FlakyApi {
            failures,
            calls: calls.clone(),
        };
        let policy = RetryPolicy {
            count,
            delay: Duration::from_secs(3),
        };
        (VersionResolver::new(api, policy), calls)
    }

    #[test]
    fn test_asset_url_is_deterministic() {
        let locator = AssetLocator::default();
        let a = locator.asset_url("libffi/libffi", "v3.5.1", "libffi-3.5.1-x86-32bit-msvc-binaries.zip");
        let b = locator.asset_url("libffi/libffi", "v3.5.1", "libffi-3.5.1-x86-32bit-msvc-binaries.zip");
        assert_eq!(a, b);
        assert_eq!(
            a,
            "https://github.com/libffi/libffi/releases/download/v3.5.1/libffi-3.5.1-x86-32bit-msvc-binaries.zip"
        );
    }

    #[test]
    fn test_custom_download_base() {
        let locator = AssetLocator::new("http://127.0.0.1:8080/");
        assert_eq!(
            locator.asset_url("o/n", "b1", "x.tar.gz"),
            "http://127.0.0.1:8080/o/n/releases/download/b1/x.tar.gz"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_attempts_exactly_count() {
        let (resolver, calls) = resolver(usize::MAX, 3);
        let started = tokio::time::Instant::now();

        let err = resolver.resolve_latest("owner/name").await.unwrap_err();

        assert!(matches!(err, FetchError::ResolveFailed { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Delay follows every failed attempt, including the last.
        assert_eq!(started.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_failures() {
        let (resolver, calls) = resolver(2, 3);
        let tag = resolver.resolve_latest("owner/name").await.unwrap();
        assert_eq!(tag, "v2.0.0");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_count_never_tries() {
        let (resolver, calls) = resolver(0, 0);
        let err = resolver.resolve_latest("owner/name").await.unwrap_err();
        assert!(matches!(err, FetchError::ResolveFailed { attempts: 0, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_latest_asset_url_uses_resolved_tag() {
        let (resolver, _) = resolver(0, 1);
        let url = AssetLocator::default()
            .latest_asset_url(&resolver, "owner/name", "tool.zip")
            .await
            .unwrap();
        assert_eq!(url, "https://github.com/owner/name/releases/download/v2.0.0/tool.zip");
    }

    #[test]
    fn test_find_matching_asset() {
        let assets = vec![
            "llama-b1234-bin-macos-arm64.zip".to_string(),
            "llama-b1234-bin-win-cpu-x64.zip".to_string(),
            "llama-b1234-bin-win-cuda-x64.zip".to_string(),
        ];
        assert_eq!(
            find_matching_asset("o/n", r"win-.*-x64\.zip$", &assets).unwrap(),
            "llama-b1234-bin-win-cpu-x64.zip"
        );
        assert!(matches!(
            find_matching_asset("o/n", "linux", &assets),
            Err(FetchError::NoMatchingAsset { .. })
        ));
        assert!(matches!(
            find_matching_asset("o/n", "(", &assets),
            Err(FetchError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_validate_repo() {
        assert!(validate_repo("ggml-org/llama.cpp").is_ok());
        assert!(validate_repo("llama.cpp").is_err());
        assert!(validate_repo("/name").is_err());
        assert!(validate_repo("owner/").is_err());
        assert!(validate_repo("a/b/c").is_err());
    }
}
