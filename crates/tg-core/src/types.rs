//! Core type definitions for TimeGuard
//!
//! These types mirror the persisted storage records and the browser's tab,
//! window and navigation descriptors. Field names follow the browser's JSON
//! shapes so values can be exchanged with the extension unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Identifiers
// =============================================================================

/// Browser tab identifier.
pub type TabId = i32;

/// Browser window identifier.
pub type WindowId = i32;

/// Sentinel reported by the browser when no window has focus.
pub const WINDOW_ID_NONE: WindowId = -1;

/// Sentinel for tabs without an id (devtools, prerender).
pub const TAB_ID_NONE: TabId = -1;

fn tab_id_none() -> TabId {
    TAB_ID_NONE
}

// =============================================================================
// Site Records
// =============================================================================

/// Accumulated time for one tracked domain (`sites[domain]` in storage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Accumulated active time in milliseconds
    pub time: u64,
    /// Favicon URL, fixed at first sight
    #[serde(default)]
    pub favicon: String,
    /// Display title, fixed at first sight
    #[serde(default)]
    pub title: String,
}

impl SiteRecord {
    /// Create an empty record for a newly seen domain.
    pub fn new(domain: &str, favicon_template: &str) -> Self {
        Self {
            time: 0,
            favicon: favicon_template.replace("{domain}", domain),
            title: domain.to_string(),
        }
    }
}

/// Domain → record map. Ordered so serialization is deterministic.
pub type SiteMap = BTreeMap<String, SiteRecord>;

// =============================================================================
// Preferences
// =============================================================================

/// Rows per page in the stats view: a positive count or the literal `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum SitesPerPage {
    Count(u32),
    All,
}

impl Default for SitesPerPage {
    fn default() -> Self {
        Self::Count(10)
    }
}

impl TryFrom<Value> for SitesPerPage {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::String(s) if s == "all" => Ok(Self::All),
            Value::Number(n) => match n.as_u64() {
                Some(count) if count >= 1 && count <= u32::MAX as u64 => Ok(Self::Count(count as u32)),
                _ => Err(format!("sitesPerPage must be a positive integer, got {}", n)),
            },
            // Older popups stored the count as a string
            Value::String(s) => match s.parse::<u32>() {
                Ok(count) if count >= 1 => Ok(Self::Count(count)),
                _ => Err(format!("invalid sitesPerPage value '{}'", s)),
            },
            other => Err(format!("invalid sitesPerPage value {}", other)),
        }
    }
}

impl From<SitesPerPage> for Value {
    fn from(value: SitesPerPage) -> Self {
        match value {
            SitesPerPage::Count(count) => Value::from(count),
            SitesPerPage::All => Value::from("all"),
        }
    }
}

// =============================================================================
// Tabs and Windows
// =============================================================================

/// Subset of the browser's tab descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    #[serde(default = "tab_id_none")]
    pub id: TabId,
    #[serde(default)]
    pub window_id: WindowId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Window state as reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
    LockedFullscreen,
}

/// Window type as reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[default]
    Normal,
    Popup,
    Panel,
    App,
    Devtools,
    #[serde(other)]
    Other,
}

/// Subset of the browser's window descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub state: WindowState,
    #[serde(rename = "type", default)]
    pub kind: WindowType,
}

impl Window {
    /// Focused and not minimized.
    pub fn has_attention(&self) -> bool {
        self.focused && self.state != WindowState::Minimized
    }

    /// A normal browsing window that currently has the user's attention.
    pub fn is_active_normal(&self) -> bool {
        self.kind == WindowType::Normal && self.has_attention()
    }
}

// =============================================================================
// Navigation
// =============================================================================

/// A navigation about to start (`webNavigation.onBeforeNavigate` details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationDetails {
    pub tab_id: TabId,
    pub url: String,
    /// 0 for the top-level frame
    #[serde(default)]
    pub frame_id: i32,
}

impl NavigationDetails {
    pub fn is_top_level(&self) -> bool {
        self.frame_id == 0
    }
}

/// Fields of `tabs.onUpdated` change info that matter here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabChange {
    #[serde(default)]
    pub url: Option<String>,
}

// =============================================================================
// Current Time
// =============================================================================

/// Live view of the session being timed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTime {
    pub domain: Option<String>,
    /// Elapsed since the last flush, 0 when paused or idle
    pub elapsed_ms: u64,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_record_new() {
        let record = SiteRecord::new("example.com", "https://icons.test/?d={domain}");
        assert_eq!(record.time, 0);
        assert_eq!(record.favicon, "https://icons.test/?d=example.com");
        assert_eq!(record.title, "example.com");
    }

    #[test]
    fn test_sites_per_page_serde() {
        let all: SitesPerPage = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, SitesPerPage::All);
        let count: SitesPerPage = serde_json::from_str("25").unwrap();
        assert_eq!(count, SitesPerPage::Count(25));
        let legacy: SitesPerPage = serde_json::from_str("\"20\"").unwrap();
        assert_eq!(legacy, SitesPerPage::Count(20));
        assert!(serde_json::from_str::<SitesPerPage>("0").is_err());
        assert_eq!(serde_json::to_string(&SitesPerPage::All).unwrap(), "\"all\"");
    }

    #[test]
    fn test_window_from_browser_json() {
        let window: Window = serde_json::from_str(
            r#"{"id": 3, "focused": true, "state": "locked-fullscreen", "type": "normal", "top": 0}"#,
        )
        .unwrap();
        assert_eq!(window.state, WindowState::LockedFullscreen);
        assert!(window.is_active_normal());

        let devtools: Window =
            serde_json::from_str(r#"{"id": 4, "focused": true, "state": "normal", "type": "devtools"}"#).unwrap();
        assert!(devtools.has_attention());
        assert!(!devtools.is_active_normal());
    }

    #[test]
    fn test_tab_without_id() {
        let tab: Tab = serde_json::from_str(r#"{"windowId": 1, "active": true}"#).unwrap();
        assert_eq!(tab.id, TAB_ID_NONE);
        assert_eq!(tab.url, None);
    }
}
