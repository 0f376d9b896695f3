//! Browser seams: tabs, windows, navigation and the declarative rule engine.

use std::rc::Rc;

use crate::error::{BrowserError, RuleEngineError};
use crate::rules::BlockRule;
use crate::types::{Tab, TabId, Window, WindowId};

/// Tab and window queries plus tab navigation.
#[allow(async_fn_in_trait)]
pub trait Browser {
    /// Look up a tab; `Ok(None)` if it no longer exists.
    async fn get_tab(&self, tab_id: TabId) -> Result<Option<Tab>, BrowserError>;

    /// Active tab of a window, or of the last focused window when `None`.
    async fn active_tab(&self, window_id: Option<WindowId>) -> Result<Option<Tab>, BrowserError>;

    /// Every open tab in every window.
    async fn all_tabs(&self) -> Result<Vec<Tab>, BrowserError>;

    /// Look up a window; `Ok(None)` if it no longer exists.
    async fn get_window(&self, window_id: WindowId) -> Result<Option<Window>, BrowserError>;

    /// Every open window.
    async fn all_windows(&self) -> Result<Vec<Window>, BrowserError>;

    /// Point a tab at a new URL.
    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError>;
}

/// Dynamic rule engine (install/remove redirect rules).
#[allow(async_fn_in_trait)]
pub trait RuleEngine {
    /// False when the browser does not expose a rule engine at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Ids of the currently installed dynamic rules.
    async fn rule_ids(&self) -> Result<Vec<u32>, RuleEngineError>;

    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleEngineError>;

    /// Install rules as a single update.
    async fn add_rules(&self, rules: &[BlockRule]) -> Result<(), RuleEngineError>;
}

impl<T: Browser> Browser for Rc<T> {
    async fn get_tab(&self, tab_id: TabId) -> Result<Option<Tab>, BrowserError> {
        (**self).get_tab(tab_id).await
    }

    async fn active_tab(&self, window_id: Option<WindowId>) -> Result<Option<Tab>, BrowserError> {
        (**self).active_tab(window_id).await
    }

    async fn all_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        (**self).all_tabs().await
    }

    async fn get_window(&self, window_id: WindowId) -> Result<Option<Window>, BrowserError> {
        (**self).get_window(window_id).await
    }

    async fn all_windows(&self) -> Result<Vec<Window>, BrowserError> {
        (**self).all_windows().await
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError> {
        (**self).navigate(tab_id, url).await
    }
}

impl<T: RuleEngine> RuleEngine for Rc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn rule_ids(&self) -> Result<Vec<u32>, RuleEngineError> {
        (**self).rule_ids().await
    }

    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleEngineError> {
        (**self).remove_rules(ids).await
    }

    async fn add_rules(&self, rules: &[BlockRule]) -> Result<(), RuleEngineError> {
        (**self).add_rules(rules).await
    }
}

/// Rule engine for browsers without one; enforcement falls back to the interceptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRuleEngine;

impl RuleEngine for NoRuleEngine {
    fn is_available(&self) -> bool {
        false
    }

    async fn rule_ids(&self) -> Result<Vec<u32>, RuleEngineError> {
        Err(RuleEngineError::Unavailable)
    }

    async fn remove_rules(&self, _ids: &[u32]) -> Result<(), RuleEngineError> {
        Err(RuleEngineError::Unavailable)
    }

    async fn add_rules(&self, _rules: &[BlockRule]) -> Result<(), RuleEngineError> {
        Err(RuleEngineError::Unavailable)
    }
}
