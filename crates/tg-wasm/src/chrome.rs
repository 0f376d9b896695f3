//! `chrome.*` promise APIs behind the core's storage, browser and rule seams.

use js_sys::{Array, Object, Promise, Reflect};
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use tg_core::browser::{Browser, RuleEngine};
use tg_core::clock::Clock;
use tg_core::error::{BrowserError, RuleEngineError, StoreError};
use tg_core::rules::BlockRule;
use tg_core::store::StorageArea;
use tg_core::types::{Tab, TabId, Window, WindowId};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    fn storage_local_get(keys: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    fn storage_local_set(items: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = get)]
    fn tabs_get(tab_id: i32) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    fn tabs_query(query: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = update)]
    fn tabs_update(tab_id: i32, props: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "windows"], js_name = get)]
    fn windows_get(window_id: i32) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "windows"], js_name = getAll)]
    fn windows_get_all(query: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "declarativeNetRequest"], js_name = getDynamicRules)]
    fn dnr_get_dynamic_rules() -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "declarativeNetRequest"], js_name = updateDynamicRules)]
    fn dnr_update_dynamic_rules(options: &JsValue) -> Result<Promise, JsValue>;
}

// =============================================================================
// JS <-> JSON
// =============================================================================

/// Human-readable text of a thrown value or rejection.
pub(crate) fn describe(err: &JsValue) -> String {
    if let Some(text) = err.as_string() {
        return text;
    }
    Reflect::get(err, &"message".into())
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{:?}", err))
}

pub(crate) fn to_js(value: &Value) -> Result<JsValue, String> {
    js_sys::JSON::parse(&value.to_string()).map_err(|e| describe(&e))
}

/// `undefined` maps to `null`.
pub(crate) fn from_js(value: &JsValue) -> Result<Value, String> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text: String = js_sys::JSON::stringify(value).map_err(|e| describe(&e))?.into();
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

async fn settle(promise: Result<Promise, JsValue>) -> Result<JsValue, String> {
    let promise = promise.map_err(|e| describe(&e))?;
    JsFuture::from(promise).await.map_err(|e| describe(&e))
}

fn has_function(path: &[&str]) -> bool {
    let mut current: JsValue = js_sys::global().into();
    for name in path {
        match Reflect::get(&current, &JsValue::from_str(name)) {
            Ok(next) if !next.is_undefined() && !next.is_null() => current = next,
            _ => return false,
        }
    }
    current.is_function()
}

// =============================================================================
// Storage
// =============================================================================

/// `chrome.storage.local`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeStorage;

impl StorageArea for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let read_err = |reason: String| StoreError::Read {
            key: key.to_string(),
            reason,
        };
        let items = settle(storage_local_get(&JsValue::from_str(key)))
            .await
            .map_err(read_err)?;
        let value = Reflect::get(&items, &JsValue::from_str(key)).map_err(|e| read_err(describe(&e)))?;
        match from_js(&value).map_err(read_err)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let write_err = |reason: String| StoreError::Write {
            key: key.to_string(),
            reason,
        };
        let items = Object::new();
        let js_value = to_js(&value).map_err(write_err)?;
        Reflect::set(&items, &JsValue::from_str(key), &js_value).map_err(|e| write_err(describe(&e)))?;
        settle(storage_local_set(&items)).await.map_err(write_err)?;
        Ok(())
    }
}

// =============================================================================
// Tabs, Windows, Rules
// =============================================================================

/// `chrome.tabs`, `chrome.windows` and `chrome.declarativeNetRequest`.
#[derive(Debug)]
pub struct ChromeBrowser {
    rules_available: bool,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        let rules_available = has_function(&["chrome", "declarativeNetRequest", "updateDynamicRules"]);
        if !rules_available {
            log::warn!("declarativeNetRequest unavailable; blocking via navigation checks only");
        }
        Self { rules_available }
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: &JsValue) -> Result<T, BrowserError> {
    let json = from_js(value).map_err(BrowserError::Call)?;
    serde_json::from_value(json).map_err(|e| BrowserError::Call(e.to_string()))
}

async fn query_tabs(query: Value) -> Result<Vec<Tab>, BrowserError> {
    let query = to_js(&query).map_err(BrowserError::Call)?;
    let tabs = settle(tabs_query(&query)).await.map_err(BrowserError::Call)?;
    decode(&tabs)
}

impl Browser for ChromeBrowser {
    async fn get_tab(&self, tab_id: TabId) -> Result<Option<Tab>, BrowserError> {
        // tabs.get rejects for closed tabs
        match settle(tabs_get(tab_id)).await {
            Ok(tab) => decode(&tab).map(Some),
            Err(reason) => {
                log::debug!("tabs.get({}) failed: {}", tab_id, reason);
                Ok(None)
            }
        }
    }

    async fn active_tab(&self, window_id: Option<WindowId>) -> Result<Option<Tab>, BrowserError> {
        let query = match window_id {
            Some(id) => json!({"active": true, "windowId": id}),
            None => json!({"active": true, "lastFocusedWindow": true}),
        };
        Ok(query_tabs(query).await?.into_iter().next())
    }

    async fn all_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        query_tabs(json!({})).await
    }

    async fn get_window(&self, window_id: WindowId) -> Result<Option<Window>, BrowserError> {
        match settle(windows_get(window_id)).await {
            Ok(window) => decode(&window).map(Some),
            Err(reason) => {
                log::debug!("windows.get({}) failed: {}", window_id, reason);
                Ok(None)
            }
        }
    }

    async fn all_windows(&self) -> Result<Vec<Window>, BrowserError> {
        let query = to_js(&json!({"populate": false})).map_err(BrowserError::Call)?;
        let windows = settle(windows_get_all(&query)).await.map_err(BrowserError::Call)?;
        decode(&windows)
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError> {
        let props = to_js(&json!({ "url": url })).map_err(BrowserError::Call)?;
        settle(tabs_update(tab_id, &props))
            .await
            .map_err(|reason| BrowserError::Navigation { tab_id, reason })?;
        Ok(())
    }
}

impl RuleEngine for ChromeBrowser {
    fn is_available(&self) -> bool {
        self.rules_available
    }

    async fn rule_ids(&self) -> Result<Vec<u32>, RuleEngineError> {
        if !self.rules_available {
            return Err(RuleEngineError::Unavailable);
        }
        let rules = settle(dnr_get_dynamic_rules()).await.map_err(RuleEngineError::Read)?;
        let ids = Array::from(&rules)
            .iter()
            .filter_map(|rule| Reflect::get(&rule, &"id".into()).ok())
            .filter_map(|id| id.as_f64())
            .map(|id| id as u32)
            .collect();
        Ok(ids)
    }

    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleEngineError> {
        if !self.rules_available {
            return Err(RuleEngineError::Unavailable);
        }
        let options = to_js(&json!({ "removeRuleIds": ids })).map_err(RuleEngineError::Remove)?;
        settle(dnr_update_dynamic_rules(&options))
            .await
            .map_err(RuleEngineError::Remove)?;
        Ok(())
    }

    async fn add_rules(&self, rules: &[BlockRule]) -> Result<(), RuleEngineError> {
        if !self.rules_available {
            return Err(RuleEngineError::Unavailable);
        }
        let rules = serde_json::to_value(rules).map_err(|e| RuleEngineError::Add(e.to_string()))?;
        let options = to_js(&json!({ "addRules": rules })).map_err(RuleEngineError::Add)?;
        settle(dnr_update_dynamic_rules(&options))
            .await
            .map_err(RuleEngineError::Add)?;
        Ok(())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// `Date.now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }
}
