//! Client configuration types.

use std::time::Duration;

/// Top-level configuration for the gallery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Number of worker tasks draining the operation queue.
    pub worker_count: usize,
    /// Endpoints of the remote site.
    pub site: SiteConfig,
    /// Settings handed to the HTTP transport.
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            site: SiteConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Check the configuration for values the dispatcher cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error when `worker_count` is zero or a site URL is empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be at least 1");
        }
        for (name, url) in [
            ("base_url", &self.site.base_url),
            ("api_url", &self.site.api_url),
            ("sign_in_url", &self.site.sign_in_url),
        ] {
            if url.trim().is_empty() {
                anyhow::bail!("site.{name} must not be empty");
            }
        }
        Ok(())
    }
}

/// Remote endpoints used when preparing requests.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Site root; relative listing/detail URLs are resolved against it.
    pub base_url: String,
    /// JSON API endpoint (rate).
    pub api_url: String,
    /// Sign-in form endpoint.
    pub sign_in_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://e-hentai.org".to_string(),
            api_url: "https://api.e-hentai.org/api.php".to_string(),
            sign_in_url: "https://forums.e-hentai.org/index.php?act=Login&CODE=01".to_string(),
        }
    }
}

impl SiteConfig {
    /// Resolve `url` against `base_url` unless it is already absolute.
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if url.starts_with('/') {
            format!("{base}{url}")
        } else {
            format!("{base}/{url}")
        }
    }
}

/// Settings for the shared HTTP transport.
///
/// The dispatcher imposes no per-operation timeout; only connection setup is
/// bounded here. A stuck read is ended by cancelling the operation.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("gallery-client/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.transport.connect_timeout, Duration::from_secs(10));
        assert!(config.transport.user_agent.starts_with("gallery-client/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ClientConfig {
            worker_count: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_url_rejected() {
        let mut config = ClientConfig::default();
        config.site.api_url = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let site = SiteConfig {
            base_url: "https://host/".to_string(),
            ..SiteConfig::default()
        };
        assert_eq!(site.resolve("/g/1/abc/"), "https://host/g/1/abc/");
        assert_eq!(site.resolve("?page=2"), "https://host/?page=2");
        assert_eq!(site.resolve("http://other/x"), "http://other/x");
    }
}
