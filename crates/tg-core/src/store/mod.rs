//! Persistent key-value storage
//!
//! The extension persists three keys in the browser's local storage area:
//!
//! - `sites`: domain → [`SiteRecord`]
//! - `blocked`: ordered list of blocked domains (order = rule-id order)
//! - `sitesPerPage`: stats page size preference
//!
//! [`StorageArea`] is the raw async get/set seam; [`Storage`] layers the typed
//! read-modify-write operations on top and serializes them through a single
//! write lock, so two concurrent flushes or toggles cannot lose an update.

mod memory;

pub use memory::MemoryStore;

use std::rc::Rc;

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::matcher::matches_entry;
use crate::types::{SiteMap, SiteRecord, SitesPerPage};

pub const SITES_KEY: &str = "sites";
pub const BLOCKED_KEY: &str = "blocked";
pub const SITES_PER_PAGE_KEY: &str = "sitesPerPage";

// =============================================================================
// Storage Area Seam
// =============================================================================

/// Raw async access to one storage area.
#[allow(async_fn_in_trait)]
pub trait StorageArea {
    /// Read a key; `Ok(None)` when absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a key, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

impl<T: StorageArea> StorageArea for Rc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }
}

// =============================================================================
// Change Feed
// =============================================================================

/// One entry of the storage change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    pub key: String,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
}

impl StorageChange {
    pub fn is_blocked_list(&self) -> bool {
        self.key == BLOCKED_KEY
    }

    /// Flatten the browser's `{ key: { oldValue, newValue } }` change object.
    pub fn from_changes_object(changes: &Value) -> Vec<StorageChange> {
        let Some(map) = changes.as_object() else {
            return Vec::new();
        };
        map.iter()
            .map(|(key, change)| StorageChange {
                key: key.clone(),
                old_value: change.get("oldValue").cloned(),
                new_value: change.get("newValue").cloned(),
            })
            .collect()
    }
}

// =============================================================================
// Typed Storage
// =============================================================================

fn decode<T: DeserializeOwned>(key: &str, value: Option<Value>) -> Result<Option<T>, StoreError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            }),
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

/// Typed operations over a [`StorageArea`].
pub struct Storage<A> {
    area: A,
    writes: Mutex<()>,
    favicon_template: String,
}

impl<A: StorageArea> Storage<A> {
    pub fn new(area: A, favicon_template: impl Into<String>) -> Self {
        Self {
            area,
            writes: Mutex::new(()),
            favicon_template: favicon_template.into(),
        }
    }

    /// The underlying storage area.
    pub fn area(&self) -> &A {
        &self.area
    }

    // -------------------------------------------------------------------------
    // Sites
    // -------------------------------------------------------------------------

    /// All site records; empty when never written.
    pub async fn sites(&self) -> Result<SiteMap, StoreError> {
        let value = self.area.get(SITES_KEY).await?;
        Ok(decode(SITES_KEY, value)?.unwrap_or_default())
    }

    /// Record for one domain.
    pub async fn site(&self, domain: &str) -> Result<Option<SiteRecord>, StoreError> {
        let mut sites = self.sites().await?;
        Ok(sites.remove(domain))
    }

    /// Flush elapsed time into a domain's record, creating it on first sight.
    /// Returns the new accumulated total. Zero-length flushes are not written.
    pub async fn add_time(&self, domain: &str, elapsed_ms: u64) -> Result<u64, StoreError> {
        let _guard = self.writes.lock().await;
        let mut sites = self.sites().await?;
        let record = sites
            .entry(domain.to_string())
            .or_insert_with(|| SiteRecord::new(domain, &self.favicon_template));
        if elapsed_ms == 0 {
            return Ok(record.time);
        }
        record.time = record.time.saturating_add(elapsed_ms);
        let total = record.time;
        self.area.set(SITES_KEY, encode(SITES_KEY, &sites)?).await?;
        debug!("Flushed {}ms to {} (total {}ms)", elapsed_ms, domain, total);
        Ok(total)
    }

    /// Replace all site records with an empty map. The blocked list is untouched.
    pub async fn reset_sites(&self) -> Result<(), StoreError> {
        let _guard = self.writes.lock().await;
        self.area.set(SITES_KEY, encode(SITES_KEY, &SiteMap::new())?).await
    }

    // -------------------------------------------------------------------------
    // Blocked List
    // -------------------------------------------------------------------------

    /// The blocked list in insertion order.
    pub async fn blocked(&self) -> Result<Vec<String>, StoreError> {
        let value = self.area.get(BLOCKED_KEY).await?;
        Ok(decode(BLOCKED_KEY, value)?.unwrap_or_default())
    }

    async fn write_blocked(&self, blocked: &[String]) -> Result<(), StoreError> {
        self.area.set(BLOCKED_KEY, encode(BLOCKED_KEY, &blocked)?).await
    }

    /// Append a domain unless already present. Returns whether the list changed.
    pub async fn block(&self, domain: &str) -> Result<bool, StoreError> {
        let _guard = self.writes.lock().await;
        let mut blocked = self.blocked().await?;
        if blocked.iter().any(|d| d == domain) {
            return Ok(false);
        }
        blocked.push(domain.to_string());
        self.write_blocked(&blocked).await?;
        Ok(true)
    }

    /// Remove exactly `domain`. Returns whether the list changed.
    pub async fn remove_blocked(&self, domain: &str) -> Result<bool, StoreError> {
        let _guard = self.writes.lock().await;
        let blocked = self.blocked().await?;
        let kept: Vec<String> = blocked.iter().filter(|d| *d != domain).cloned().collect();
        if kept.len() == blocked.len() {
            return Ok(false);
        }
        self.write_blocked(&kept).await?;
        Ok(true)
    }

    /// Remove every entry that blocks `domain` (the domain itself and any
    /// parent entry). Returns the resulting list.
    pub async fn unblock(&self, domain: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.writes.lock().await;
        let blocked = self.blocked().await?;
        let kept: Vec<String> = blocked
            .iter()
            .filter(|entry| !matches_entry(domain, entry))
            .cloned()
            .collect();
        if kept.len() != blocked.len() {
            self.write_blocked(&kept).await?;
        }
        Ok(kept)
    }

    /// Block the domain if it is not blocked, unblock it otherwise.
    /// Returns whether it is blocked afterwards.
    pub async fn toggle_blocked(&self, domain: &str) -> Result<bool, StoreError> {
        let _guard = self.writes.lock().await;
        let mut blocked = self.blocked().await?;
        let now_blocked = match blocked.iter().position(|d| d == domain) {
            Some(_) => {
                blocked.retain(|d| d != domain);
                false
            }
            None => {
                blocked.push(domain.to_string());
                true
            }
        };
        self.write_blocked(&blocked).await?;
        Ok(now_blocked)
    }

    /// Empty the blocked list.
    pub async fn clear_blocked(&self) -> Result<(), StoreError> {
        let _guard = self.writes.lock().await;
        self.write_blocked(&[]).await
    }

    // -------------------------------------------------------------------------
    // Preferences
    // -------------------------------------------------------------------------

    /// Stored page size, or `default` when absent or unreadable.
    pub async fn sites_per_page(&self, default: SitesPerPage) -> Result<SitesPerPage, StoreError> {
        let value = self.area.get(SITES_PER_PAGE_KEY).await?;
        match decode(SITES_PER_PAGE_KEY, value) {
            Ok(Some(per_page)) => Ok(per_page),
            Ok(None) => Ok(default),
            Err(e) => {
                debug!("Ignoring stored page size: {}", e);
                Ok(default)
            }
        }
    }

    pub async fn set_sites_per_page(&self, per_page: SitesPerPage) -> Result<(), StoreError> {
        self.area
            .set(SITES_PER_PAGE_KEY, encode(SITES_PER_PAGE_KEY, &per_page)?)
            .await
    }
}
