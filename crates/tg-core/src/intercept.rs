//! Navigation interceptor
//!
//! Enforces the blocked list against in-flight top-level navigations and
//! against tabs that are already showing a blocked page. Every decision is
//! made against the synchronizer's in-memory cache, never the store. The
//! pre-redirect URL of each intercepted tab is remembered so the interstitial
//! page can resume it after an unblock.

use std::cell::RefCell;
use std::collections::HashMap;

use log::{debug, info, warn};

use crate::browser::Browser;
use crate::config::Config;
use crate::error::BrowserError;
use crate::matcher::BlockedDomains;
use crate::sync::RuleSynchronizer;
use crate::types::{NavigationDetails, Tab, TabId};

/// What to do with a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Redirect {
        /// Domain of the blocked URL.
        domain: String,
        interstitial_url: String,
    },
}

impl Verdict {
    /// Decide for `url` against `blocked`. Extension pages are always allowed.
    pub fn of(url: &str, blocked: &BlockedDomains, config: &Config) -> Self {
        if config.is_extension_url(url) {
            return Verdict::Allow;
        }
        match blocked.blocked_domain_of(url) {
            Some(domain) => Verdict::Redirect {
                interstitial_url: config.interstitial_url(&domain),
                domain,
            },
            None => Verdict::Allow,
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Verdict::Redirect { .. })
    }
}

#[derive(Debug, Default)]
pub struct Interceptor {
    original_urls: RefCell<HashMap<TabId, String>>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, tab_id: TabId, url: &str) {
        self.original_urls.borrow_mut().insert(tab_id, url.to_string());
    }

    /// Last intercepted URL for a tab, if any.
    pub fn original_url(&self, tab_id: TabId) -> Option<String> {
        self.original_urls.borrow().get(&tab_id).cloned()
    }

    pub fn forget(&self, tab_id: TabId) -> Option<String> {
        self.original_urls.borrow_mut().remove(&tab_id)
    }

    pub fn remembered_count(&self) -> usize {
        self.original_urls.borrow().len()
    }

    // =========================================================================
    // Enforcement
    // =========================================================================

    /// Redirect `tab_id` to the interstitial page if `url` is blocked.
    /// Returns the blocked domain when a redirect was issued.
    pub async fn enforce<B: Browser>(
        &self,
        tab_id: TabId,
        url: &str,
        sync: &RuleSynchronizer,
        browser: &B,
        config: &Config,
    ) -> Result<Option<String>, BrowserError> {
        // Decide before the await; the cache borrow must not be held across it
        let verdict = Verdict::of(url, &sync.cache(), config);
        let Verdict::Redirect {
            domain,
            interstitial_url,
        } = verdict
        else {
            return Ok(None);
        };

        self.remember(tab_id, url);
        info!("Blocked {} in tab {}, redirecting", domain, tab_id);
        browser.navigate(tab_id, &interstitial_url).await?;
        Ok(Some(domain))
    }

    /// Top-level navigation about to start. Sub-frames are ignored.
    pub async fn on_before_navigate<B: Browser>(
        &self,
        details: &NavigationDetails,
        sync: &RuleSynchronizer,
        browser: &B,
        config: &Config,
    ) -> Result<Option<String>, BrowserError> {
        if !details.is_top_level() {
            return Ok(None);
        }
        self.enforce(details.tab_id, &details.url, sync, browser, config).await
    }

    /// Re-check a tab that was activated, created or changed URL.
    pub async fn check_tab<B: Browser>(
        &self,
        tab: &Tab,
        sync: &RuleSynchronizer,
        browser: &B,
        config: &Config,
    ) -> Result<Option<String>, BrowserError> {
        match tab.url.as_deref() {
            Some(url) => self.enforce(tab.id, url, sync, browser, config).await,
            None => Ok(None),
        }
    }

    /// Apply the redirect check to every open tab. A failure on one tab is
    /// logged and does not stop the sweep. Returns the redirected tabs.
    pub async fn check_all_open_tabs<B: Browser>(
        &self,
        sync: &RuleSynchronizer,
        browser: &B,
        config: &Config,
    ) -> Result<Vec<TabId>, BrowserError> {
        let tabs = browser.all_tabs().await?;
        debug!("Checking {} open tabs against blocked list", tabs.len());

        let mut redirected = Vec::new();
        for tab in &tabs {
            match self.check_tab(tab, sync, browser, config).await {
                Ok(Some(_)) => redirected.push(tab.id),
                Ok(None) => {}
                Err(e) => warn!("Could not check tab {}: {}", tab.id, e),
            }
        }
        Ok(redirected)
    }
}
