//! Blocked-list → rule synchronization
//!
//! Keeps the in-memory [`BlockedDomains`] cache and the browser's dynamic
//! rule set consistent with the persisted blocked list. Automatic rebuilds
//! (driven by storage changes and startup) are skipped entirely while a
//! suppression guard is held; the unblock transaction holds one and performs
//! its own explicit install instead.
//!
//! The cache is refreshed before any rule-engine call and is never rolled
//! back: if the rule engine fails, the navigation interceptor still enforces
//! the current list.

use std::cell::{Cell, Ref, RefCell};

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::browser::RuleEngine;
use crate::config::Config;
use crate::error::{RuleEngineError, StoreError};
use crate::matcher::BlockedDomains;
use crate::rules::build_rule_set;
use crate::store::{Storage, StorageArea};

// =============================================================================
// Suppression
// =============================================================================

/// Counts in-flight transactions that must not race with automatic rebuilds.
#[derive(Debug, Default)]
pub struct Suppression {
    holders: Cell<u32>,
}

impl Suppression {
    pub fn is_active(&self) -> bool {
        self.holders.get() > 0
    }

    /// Suppress automatic rebuilds until the guard is dropped.
    pub fn hold(&self) -> SuppressionGuard<'_> {
        self.holders.set(self.holders.get() + 1);
        SuppressionGuard { holders: &self.holders }
    }
}

/// Releases suppression on drop, on every exit path.
#[must_use = "suppression ends as soon as the guard is dropped"]
pub struct SuppressionGuard<'a> {
    holders: &'a Cell<u32>,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.holders.set(self.holders.get().saturating_sub(1));
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of pushing a list into the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleInstall {
    /// Old rules removed and this many installed.
    Installed(usize),
    /// No rule engine; the cache alone enforces blocking.
    CacheOnly,
}

/// Result of an automatic rebuild.
#[derive(Debug)]
pub enum RebuildOutcome {
    /// Skipped because an unblock transaction is in flight.
    Suppressed,
    /// Cache refreshed and rules installed (or no engine present).
    Synced(RuleInstall),
    /// Cache refreshed but the rule engine rejected the update.
    Degraded(RuleEngineError),
}

// =============================================================================
// Synchronizer
// =============================================================================

pub struct RuleSynchronizer {
    cache: RefCell<BlockedDomains>,
    suppression: Suppression,
    rebuilds: Mutex<()>,
}

impl Default for RuleSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSynchronizer {
    pub fn new() -> Self {
        Self {
            cache: RefCell::new(BlockedDomains::new()),
            suppression: Suppression::default(),
            rebuilds: Mutex::new(()),
        }
    }

    /// Current cache contents. Do not hold across an `.await`.
    pub fn cache(&self) -> Ref<'_, BlockedDomains> {
        self.cache.borrow()
    }

    pub fn suppression(&self) -> &Suppression {
        &self.suppression
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppression.is_active()
    }

    /// Automatic rebuild from the persisted list. A complete no-op while suppressed.
    pub async fn rebuild<A, R>(
        &self,
        storage: &Storage<A>,
        engine: &R,
        config: &Config,
    ) -> Result<RebuildOutcome, StoreError>
    where
        A: StorageArea,
        R: RuleEngine,
    {
        if self.is_suppressed() {
            debug!("Rule rebuild suppressed");
            return Ok(RebuildOutcome::Suppressed);
        }

        let _serial = self.rebuilds.lock().await;
        // Suppression may have started while waiting for the previous rebuild
        if self.is_suppressed() {
            debug!("Rule rebuild suppressed");
            return Ok(RebuildOutcome::Suppressed);
        }

        let blocked = storage.blocked().await?;
        if self.is_suppressed() {
            debug!("Rule rebuild suppressed after read");
            return Ok(RebuildOutcome::Suppressed);
        }

        match self.install_unserialized(&blocked, engine, config).await {
            Ok(install) => Ok(RebuildOutcome::Synced(install)),
            Err(e) => {
                warn!("Rule rebuild failed, enforcing from cache only: {}", e);
                Ok(RebuildOutcome::Degraded(e))
            }
        }
    }

    /// Refresh the cache from `blocked` and replace every installed rule.
    /// Ignores suppression; used by the unblock transaction.
    pub async fn install<R: RuleEngine>(
        &self,
        blocked: &[String],
        engine: &R,
        config: &Config,
    ) -> Result<RuleInstall, RuleEngineError> {
        let _serial = self.rebuilds.lock().await;
        self.install_unserialized(blocked, engine, config).await
    }

    async fn install_unserialized<R: RuleEngine>(
        &self,
        blocked: &[String],
        engine: &R,
        config: &Config,
    ) -> Result<RuleInstall, RuleEngineError> {
        self.cache.borrow_mut().replace(blocked);
        debug!("Blocked cache now holds {} domains", blocked.len());

        if !engine.is_available() {
            warn!("Rule engine unavailable; blocking from cache only");
            return Ok(RuleInstall::CacheOnly);
        }

        let installed = engine.rule_ids().await?;
        if !installed.is_empty() {
            engine.remove_rules(&installed).await?;
        }

        let rules = build_rule_set(blocked, config);
        if !rules.is_empty() {
            engine.add_rules(&rules).await?;
        }

        info!("Installed {} blocking rules (removed {})", rules.len(), installed.len());
        Ok(RuleInstall::Installed(rules.len()))
    }
}
