//! Simulated browser
//!
//! An in-process implementation of [`Browser`] and [`RuleEngine`] with
//! scriptable windows and tabs. The CLI replays recorded event logs against
//! it, and the test suite uses it to observe navigations and installed rules.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::browser::{Browser, RuleEngine};
use crate::error::{BrowserError, RuleEngineError};
use crate::rules::BlockRule;
use crate::types::{Tab, TabId, Window, WindowId, WindowState, WindowType};

#[derive(Debug, Default)]
pub struct SimBrowser {
    windows: RefCell<BTreeMap<WindowId, Window>>,
    tabs: RefCell<BTreeMap<TabId, Tab>>,
    navigations: RefCell<Vec<(TabId, String)>>,
    rules: RefCell<Vec<BlockRule>>,
    rules_unavailable: Cell<bool>,
    fail_rule_updates: Cell<bool>,
    fail_navigation: Cell<bool>,
}

impl SimBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Windows
    // -------------------------------------------------------------------------

    /// Open a normal window and give it focus.
    pub fn open_window(&self, window_id: WindowId) {
        self.windows.borrow_mut().insert(
            window_id,
            Window {
                id: window_id,
                focused: false,
                state: WindowState::Normal,
                kind: WindowType::Normal,
            },
        );
        self.focus_window(Some(window_id));
    }

    /// Focus one window (unfocusing the rest), or none.
    pub fn focus_window(&self, window_id: Option<WindowId>) {
        for window in self.windows.borrow_mut().values_mut() {
            window.focused = Some(window.id) == window_id;
            if window.focused && window.state == WindowState::Minimized {
                window.state = WindowState::Normal;
            }
        }
    }

    pub fn minimize_window(&self, window_id: WindowId) {
        if let Some(window) = self.windows.borrow_mut().get_mut(&window_id) {
            window.state = WindowState::Minimized;
            window.focused = false;
        }
    }

    pub fn window(&self, window_id: WindowId) -> Option<Window> {
        self.windows.borrow().get(&window_id).cloned()
    }

    // -------------------------------------------------------------------------
    // Tabs
    // -------------------------------------------------------------------------

    /// Open a tab and make it the active tab of its window.
    pub fn open_tab(&self, tab_id: TabId, window_id: WindowId, url: &str) -> Tab {
        let tab = Tab {
            id: tab_id,
            window_id,
            url: Some(url.to_string()),
            active: false,
        };
        self.tabs.borrow_mut().insert(tab_id, tab);
        self.activate_tab(tab_id);
        self.tab(tab_id).unwrap_or_else(|| Tab {
            id: tab_id,
            window_id,
            url: Some(url.to_string()),
            active: true,
        })
    }

    /// Make a tab the active one of its window.
    pub fn activate_tab(&self, tab_id: TabId) {
        let mut tabs = self.tabs.borrow_mut();
        let Some(window_id) = tabs.get(&tab_id).map(|t| t.window_id) else {
            return;
        };
        for tab in tabs.values_mut().filter(|t| t.window_id == window_id) {
            tab.active = tab.id == tab_id;
        }
    }

    pub fn set_tab_url(&self, tab_id: TabId, url: &str) {
        if let Some(tab) = self.tabs.borrow_mut().get_mut(&tab_id) {
            tab.url = Some(url.to_string());
        }
    }

    pub fn close_tab(&self, tab_id: TabId) {
        self.tabs.borrow_mut().remove(&tab_id);
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.tabs.borrow().get(&tab_id).cloned()
    }

    /// Navigations performed through [`Browser::navigate`], in order.
    pub fn navigations(&self) -> Vec<(TabId, String)> {
        self.navigations.borrow().clone()
    }

    // -------------------------------------------------------------------------
    // Rules and failure injection
    // -------------------------------------------------------------------------

    pub fn installed_rules(&self) -> Vec<BlockRule> {
        self.rules.borrow().clone()
    }

    pub fn set_rules_available(&self, available: bool) {
        self.rules_unavailable.set(!available);
    }

    pub fn set_fail_rule_updates(&self, fail: bool) {
        self.fail_rule_updates.set(fail);
    }

    pub fn set_fail_navigation(&self, fail: bool) {
        self.fail_navigation.set(fail);
    }
}

impl Browser for SimBrowser {
    async fn get_tab(&self, tab_id: TabId) -> Result<Option<Tab>, BrowserError> {
        Ok(self.tab(tab_id))
    }

    async fn active_tab(&self, window_id: Option<WindowId>) -> Result<Option<Tab>, BrowserError> {
        let window_id = match window_id {
            Some(id) => Some(id),
            None => {
                let windows = self.windows.borrow();
                windows
                    .values()
                    .find(|w| w.focused)
                    .or_else(|| windows.values().next())
                    .map(|w| w.id)
            }
        };
        let Some(window_id) = window_id else {
            return Ok(None);
        };
        Ok(self
            .tabs
            .borrow()
            .values()
            .find(|t| t.window_id == window_id && t.active)
            .cloned())
    }

    async fn all_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        Ok(self.tabs.borrow().values().cloned().collect())
    }

    async fn get_window(&self, window_id: WindowId) -> Result<Option<Window>, BrowserError> {
        Ok(self.window(window_id))
    }

    async fn all_windows(&self) -> Result<Vec<Window>, BrowserError> {
        Ok(self.windows.borrow().values().cloned().collect())
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError> {
        if self.fail_navigation.get() {
            return Err(BrowserError::Navigation {
                tab_id,
                reason: "injected navigation failure".to_string(),
            });
        }
        match self.tabs.borrow_mut().get_mut(&tab_id) {
            Some(tab) => tab.url = Some(url.to_string()),
            None => return Err(BrowserError::NoSuchTab(tab_id)),
        }
        self.navigations.borrow_mut().push((tab_id, url.to_string()));
        Ok(())
    }
}

impl RuleEngine for SimBrowser {
    fn is_available(&self) -> bool {
        !self.rules_unavailable.get()
    }

    async fn rule_ids(&self) -> Result<Vec<u32>, RuleEngineError> {
        if !self.is_available() {
            return Err(RuleEngineError::Unavailable);
        }
        Ok(self.rules.borrow().iter().map(|r| r.id).collect())
    }

    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleEngineError> {
        if self.fail_rule_updates.get() {
            return Err(RuleEngineError::Remove("injected rule failure".to_string()));
        }
        self.rules.borrow_mut().retain(|r| !ids.contains(&r.id));
        Ok(())
    }

    async fn add_rules(&self, rules: &[BlockRule]) -> Result<(), RuleEngineError> {
        if self.fail_rule_updates.get() {
            return Err(RuleEngineError::Add("injected rule failure".to_string()));
        }
        let mut installed = self.rules.borrow_mut();
        if let Some(dup) = rules.iter().find(|r| installed.iter().any(|i| i.id == r.id)) {
            return Err(RuleEngineError::Add(format!("Rule with id {} already exists", dup.id)));
        }
        installed.extend(rules.iter().cloned());
        Ok(())
    }
}
