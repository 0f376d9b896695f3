//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::types::SitesPerPage;
use crate::url::encode_query_value;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_INTERSTITIAL_PAGE: &str = "blocked.html";
pub const DEFAULT_EXTENSION_BASE_URL: &str = "chrome-extension://timeguard/";
pub const DEFAULT_FAVICON_TEMPLATE: &str = "https://www.google.com/s2/favicons?domain={domain}";
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 3000;

/// Settings shared by the background service, the CLI and the interstitial page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Period of the flush timer
    pub tick_interval_ms: u64,
    /// Interstitial page, relative to the extension root
    pub interstitial_page: String,
    /// Root URL of the extension's own pages, with a trailing slash
    pub extension_base_url: String,
    /// Favicon URL with a `{domain}` placeholder
    pub favicon_template: String,
    /// Stats page size when no preference is stored
    pub sites_per_page: SitesPerPage,
    /// How long the interstitial waits for the background before falling back
    pub message_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            interstitial_page: DEFAULT_INTERSTITIAL_PAGE.to_string(),
            extension_base_url: DEFAULT_EXTENSION_BASE_URL.to_string(),
            favicon_template: DEFAULT_FAVICON_TEMPLATE.to_string(),
            sites_per_page: SitesPerPage::default(),
            message_timeout_ms: DEFAULT_MESSAGE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(text)?;
        Ok(config.normalized())
    }

    /// Ensure the base URL ends with '/', the page has no leading '/' and the tick is non-zero.
    pub fn normalized(mut self) -> Self {
        if !self.extension_base_url.ends_with('/') {
            self.extension_base_url.push('/');
        }
        self.interstitial_page = self.interstitial_page.trim_start_matches('/').to_string();
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = DEFAULT_TICK_INTERVAL_MS;
        }
        self
    }

    /// Absolute interstitial URL for a blocked domain.
    pub fn interstitial_url(&self, domain: &str) -> String {
        format!("{}{}", self.extension_base_url, self.interstitial_path(domain).trim_start_matches('/'))
    }

    /// Interstitial path as used by declarative redirect rules (`/blocked.html?domain=...`).
    pub fn interstitial_path(&self, domain: &str) -> String {
        format!("/{}?domain={}", self.interstitial_page, encode_query_value(domain))
    }

    /// Whether the URL belongs to one of the extension's own pages.
    pub fn is_extension_url(&self, url: &str) -> bool {
        url.starts_with(&self.extension_base_url)
    }
}
