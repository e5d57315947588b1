//! Client configuration
//!
//! [`FetchConfig`] is frozen once built and passed by value into the resolver,
//! fetch engine and installer. The environment is never read here except by
//! [`env_proxy`], which callers use at the outer boundary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::download::{
    BarProgress, DEFAULT_DOWNLOAD_BASE, DEFAULT_REQUEST_TIMEOUT, ProgressSink, RetryPolicy,
};
use crate::error::{FetchError, Result};

/// Default GitHub REST API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Settings file name under the user config directory.
const SETTINGS_FILE: &str = "relfetch.toml";

/// Immutable client configuration.
#[derive(Clone)]
pub struct FetchConfig {
    install_dir: PathBuf,
    retry: RetryPolicy,
    proxy: Option<String>,
    progress: Option<Arc<dyn ProgressSink>>,
    api_base: String,
    download_base: String,
    request_timeout: Duration,
    staged_upgrade: bool,
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("install_dir", &self.install_dir)
            .field("retry", &self.retry)
            .field("proxy", &self.proxy)
            .field("progress", &self.progress.is_some())
            .field("api_base", &self.api_base)
            .field("download_base", &self.download_base)
            .field("request_timeout", &self.request_timeout)
            .field("staged_upgrade", &self.staged_upgrade)
            .finish()
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
            proxy: None,
            progress: Some(Arc::new(BarProgress::new())),
            api_base: DEFAULT_API_BASE.to_owned(),
            download_base: DEFAULT_DOWNLOAD_BASE.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            staged_upgrade: false,
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn progress(&self) -> Option<Arc<dyn ProgressSink>> {
        self.progress.clone()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn download_base(&self) -> &str {
        &self.download_base
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn staged_upgrade(&self) -> bool {
        self.staged_upgrade
    }
}

/// Builder for [`FetchConfig`].
#[derive(Debug, Clone, Default)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.install_dir = dir.into();
        self
    }

    /// Total number of resolution attempts.
    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry.count = count;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.delay = delay;
        self
    }

    pub fn retry_delay_secs(self, secs: u64) -> Self {
        self.retry_delay(Duration::from_secs(secs))
    }

    /// Route every request through `proxy`. An empty string clears it.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        let proxy = proxy.into();
        self.config.proxy = (!proxy.is_empty()).then_some(proxy);
        self
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.config.progress = Some(sink);
        self
    }

    pub fn no_progress(mut self) -> Self {
        self.config.progress = None;
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn download_base(mut self, base: impl Into<String>) -> Self {
        self.config.download_base = base.into();
        self
    }

    /// Per-request ceiling for API calls.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn staged_upgrade(mut self, staged: bool) -> Self {
        self.config.staged_upgrade = staged;
        self
    }

    pub fn build(self) -> Result<FetchConfig> {
        let config = self.config;
        check_base_url("api_base", &config.api_base)?;
        check_base_url("download_base", &config.download_base)?;
        if let Some(proxy) = &config.proxy {
            check_proxy(proxy)?;
        }
        if config.request_timeout.is_zero() {
            return Err(FetchError::InvalidConfig("request_timeout must be non-zero".into()));
        }
        Ok(config)
    }
}

fn check_base_url(key: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value)
        .map_err(|e| FetchError::InvalidConfig(format!("{key} {value:?} is not a URL: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        _ => Err(FetchError::InvalidConfig(format!(
            "{key} {value:?} must be an http(s) URL with a host"
        ))),
    }
}

// Proxies may be given without a scheme, as reqwest accepts `host:port`.
fn check_proxy(value: &str) -> Result<()> {
    let parsed = match url::Url::parse(value) {
        Ok(url) if url.has_host() => Ok(url),
        _ => url::Url::parse(&format!("http://{value}")),
    };
    match parsed {
        Ok(url) if url.has_host() => Ok(()),
        _ => Err(FetchError::InvalidConfig(format!("proxy {value:?} is not a URL"))),
    }
}

/// Proxy from `HTTP_PROXY`, falling back to `HTTPS_PROXY`. Empty values count
/// as unset.
pub fn env_proxy() -> Option<String> {
    env_proxy_from(|key| std::env::var(key).ok())
}

/// [`env_proxy`] over an arbitrary variable lookup.
pub fn env_proxy_from<L>(lookup: L) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    ["HTTP_PROXY", "HTTPS_PROXY"]
        .into_iter()
        .filter_map(lookup)
        .find(|value| !value.is_empty())
}

/// Optional on-disk settings, all keys optional.
///
/// ```toml
/// install_dir = "/opt/tools/llama"
/// retry_count = 5
/// retry_delay_secs = 2
/// proxy = "http://proxy.internal:3128"
/// staged_upgrade = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub install_dir: Option<PathBuf>,
    pub retry_count: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub proxy: Option<String>,
    pub api_base: Option<String>,
    pub download_base: Option<String>,
    pub staged_upgrade: Option<bool>,
}

impl Settings {
    /// `<config dir>/relfetch/relfetch.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relfetch").join(SETTINGS_FILE))
    }

    /// Load settings from `path`. A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map_err(|e| match e {
                FetchError::InvalidConfig(reason) => {
                    FetchError::InvalidConfig(format!("{}: {reason}", path.display()))
                }
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no settings file at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(FetchError::io(format!("failed to read {}", path.display()), e)),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FetchError::InvalidConfig(e.to_string()))
    }

    /// Overlay every key that is set onto `builder`.
    pub fn apply(&self, mut builder: FetchConfigBuilder) -> FetchConfigBuilder {
        if let Some(dir) = &self.install_dir {
            builder = builder.install_dir(dir);
        }
        if let Some(count) = self.retry_count {
            builder = builder.retry_count(count);
        }
        if let Some(secs) = self.retry_delay_secs {
            builder = builder.retry_delay_secs(secs);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy);
        }
        if let Some(base) = &self.api_base {
            builder = builder.api_base(base);
        }
        if let Some(base) = &self.download_base {
            builder = builder.download_base(base);
        }
        if let Some(staged) = self.staged_upgrade {
            builder = builder.staged_upgrade(staged);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = FetchConfig::builder().build().unwrap();
        assert_eq!(config.install_dir(), Path::new("."));
        assert_eq!(config.retry(), RetryPolicy::default());
        assert_eq!(config.retry().count, 3);
        assert_eq!(config.retry().delay, Duration::from_secs(3));
        assert_eq!(config.proxy(), None);
        assert!(config.progress().is_some());
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
        assert_eq!(config.download_base(), "https://github.com");
        assert!(!config.staged_upgrade());
    }

    #[test]
    fn test_builder_setters() {
        let config = FetchConfig::builder()
            .install_dir("/opt/x")
            .retry_count(5)
            .retry_delay_secs(1)
            .proxy("http://127.0.0.1:3128")
            .no_progress()
            .staged_upgrade(true)
            .build()
            .unwrap();
        assert_eq!(config.install_dir(), Path::new("/opt/x"));
        assert_eq!(config.retry().count, 5);
        assert_eq!(config.retry().delay, Duration::from_secs(1));
        assert_eq!(config.proxy(), Some("http://127.0.0.1:3128"));
        assert!(config.progress().is_none());
        assert!(config.staged_upgrade());
    }

    #[test]
    fn test_empty_proxy_clears() {
        let config = FetchConfig::builder().proxy("http://p:1").proxy("").build().unwrap();
        assert_eq!(config.proxy(), None);
    }

    #[test]
    fn test_build_rejects_bad_urls() {
        for builder in [
            FetchConfig::builder().api_base("not a url"),
            FetchConfig::builder().download_base("ftp://example.com"),
            FetchConfig::builder().proxy("http://"),
            FetchConfig::builder().request_timeout(Duration::ZERO),
        ] {
            assert!(matches!(builder.build(), Err(FetchError::InvalidConfig(_))));
        }
        assert!(FetchConfig::builder().proxy("proxy.internal:3128").build().is_ok());
    }

    #[test]
    fn test_env_proxy_order() {
        let env = |pairs: &[(&str, &str)]| {
            let map: HashMap<String, String> = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            env_proxy_from(move |key| map.get(key).cloned())
        };

        assert_eq!(env(&[]), None);
        assert_eq!(env(&[("HTTPS_PROXY", "http://s:2")]), Some("http://s:2".into()));
        assert_eq!(
            env(&[("HTTP_PROXY", "http://h:1"), ("HTTPS_PROXY", "http://s:2")]),
            Some("http://h:1".into())
        );
        assert_eq!(
            env(&[("HTTP_PROXY", ""), ("HTTPS_PROXY", "http://s:2")]),
            Some("http://s:2".into())
        );
        assert_eq!(env(&[("HTTP_PROXY", ""), ("HTTPS_PROXY", "")]), None);
    }

    #[test]
    fn test_settings_overlay() {
        let settings = Settings::from_toml(
            r#"
            install_dir = "/srv/tool"
            retry_count = 7
            proxy = "http://file:1"
            "#,
        )
        .unwrap();

        let config = settings
            .apply(FetchConfig::builder().proxy("http://env:1").retry_delay_secs(9))
            .build()
            .unwrap();

        assert_eq!(config.install_dir(), Path::new("/srv/tool"));
        assert_eq!(config.retry().count, 7);
        assert_eq!(config.retry().delay, Duration::from_secs(9));
        assert_eq!(config.proxy(), Some("http://file:1"));
    }

    #[test]
    fn test_settings_unknown_key() {
        assert!(matches!(
            Settings::from_toml("retries = 3"),
            Err(FetchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_settings_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
