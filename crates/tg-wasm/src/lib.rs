//! WebAssembly bindings for TimeGuard
//!
//! The extension's background script constructs one [`WasmBackground`] and
//! forwards every `chrome.*` event to it; each method returns a `Promise`.
//! The interstitial page uses the free helper functions.

mod chrome;
mod logger;

use std::rc::Rc;

use js_sys::{Object, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use tg_core::config::DEFAULT_INTERSTITIAL_PAGE;
use tg_core::interstitial::{self, SiteLookup};
use tg_core::messages::Sender;
use tg_core::store::StorageChange;
use tg_core::types::{NavigationDetails, SiteMap, Tab, TabChange};
use tg_core::{format_clock, format_spent, Background, Config};

pub use chrome::{ChromeBrowser, ChromeStorage, JsClock};
pub use logger::set_log_level;

use chrome::{from_js, to_js};

type ChromeBackground = Background<ChromeStorage, Rc<ChromeBrowser>, Rc<ChromeBrowser>>;

fn js_error(err: impl ToString) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(value: &JsValue, what: &str) -> Result<T, JsValue> {
    let json = from_js(value).map_err(|e| js_error(format!("Invalid {}: {}", what, e)))?;
    serde_json::from_value(json).map_err(|e| js_error(format!("Invalid {}: {}", what, e)))
}

/// `MessageSender.tab.id`, if the message came from a tab.
fn sender_from_js(sender: &JsValue) -> Sender {
    let tab_id = Reflect::get(sender, &"tab".into())
        .ok()
        .filter(|tab| tab.is_object())
        .and_then(|tab| Reflect::get(&tab, &"id".into()).ok())
        .and_then(|id| id.as_f64())
        .map(|id| id as i32);
    Sender { tab_id }
}

// =============================================================================
// Background
// =============================================================================

#[wasm_bindgen(js_name = Background)]
pub struct WasmBackground {
    inner: Rc<ChromeBackground>,
}

#[wasm_bindgen(js_class = Background)]
impl WasmBackground {
    /// `config` is a partial [`Config`] object; `extensionBaseUrl` should come
    /// from `chrome.runtime.getURL("")`.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmBackground, JsValue> {
        let config: Config = if config.is_undefined() || config.is_null() {
            Config::default()
        } else {
            decode(&config, "config")?
        };
        let browser = Rc::new(ChromeBrowser::new());
        let inner = Background::new(config, ChromeStorage, browser.clone(), browser, Box::new(JsClock));
        Ok(WasmBackground { inner: Rc::new(inner) })
    }

    #[wasm_bindgen(getter, js_name = tickIntervalMs)]
    pub fn tick_interval_ms(&self) -> u32 {
        self.inner.config().tick_interval_ms.min(u32::MAX as u64) as u32
    }

    pub fn startup(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.startup().await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTabActivated)]
    pub fn on_tab_activated(&self, tab_id: i32) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.on_tab_activated(tab_id).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTabUpdated)]
    pub fn on_tab_updated(&self, tab_id: i32, change_info: JsValue, tab: JsValue) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let change: TabChange = decode(&change_info, "changeInfo")?;
            let tab: Tab = decode(&tab, "tab")?;
            inner.on_tab_updated(tab_id, &change, &tab).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTabCreated)]
    pub fn on_tab_created(&self, tab: JsValue) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let tab: Tab = decode(&tab, "tab")?;
            inner.on_tab_created(&tab).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Resolves to the blocked domain when the navigation was redirected.
    #[wasm_bindgen(js_name = onBeforeNavigate)]
    pub fn on_before_navigate(&self, details: JsValue) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let details: NavigationDetails = decode(&details, "navigation details")?;
            let redirected = inner.on_before_navigate(&details).await.map_err(js_error)?;
            Ok(redirected.map_or(JsValue::NULL, |d| JsValue::from_str(&d)))
        })
    }

    #[wasm_bindgen(js_name = onWindowFocusChanged)]
    pub fn on_window_focus_changed(&self, window_id: i32) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.on_window_focus_changed(window_id).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTick)]
    pub fn on_tick(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.on_tick().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// `runtime.onConnect`; only the port named `"popup"` counts.
    #[wasm_bindgen(js_name = onConnect)]
    pub fn on_connect(&self, port_name: &str) -> bool {
        if port_name != "popup" {
            return false;
        }
        self.inner.on_popup_connected();
        true
    }

    #[wasm_bindgen(js_name = onPopupDisconnected)]
    pub fn on_popup_disconnected(&self) {
        self.inner.on_popup_disconnected();
    }

    /// `storage.onChanged`; only the `local` area is watched.
    #[wasm_bindgen(js_name = onStorageChanged)]
    pub fn on_storage_changed(&self, changes: JsValue, area_name: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            if area_name != "local" {
                return Ok(JsValue::UNDEFINED);
            }
            let changes = from_js(&changes).map_err(js_error)?;
            let changes = StorageChange::from_changes_object(&changes);
            inner.on_storage_changed(&changes).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// `runtime.onMessage`; always resolves to a response object.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue, sender: JsValue) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let sender = sender_from_js(&sender);
            let response = match from_js(&message) {
                Ok(message) => inner.handle_message(&message, &sender).await,
                Err(e) => tg_core::Response::failure(e),
            };
            to_js(&response.to_value()).map_err(js_error)
        })
    }
}

// =============================================================================
// Interstitial page helpers
// =============================================================================

#[wasm_bindgen(js_name = resolveBlockedDomain)]
pub fn resolve_blocked_domain(
    page_url: &str,
    referrer: Option<String>,
    session_fallback: Option<String>,
    local_fallback: Option<String>,
) -> Option<String> {
    interstitial::resolve_blocked_domain(
        page_url,
        referrer.as_deref(),
        session_fallback.as_deref(),
        local_fallback.as_deref(),
        DEFAULT_INTERSTITIAL_PAGE,
    )
}

/// `{found, similar, domain, time}` for the storage fallback path.
#[wasm_bindgen(js_name = lookupTimeSpent)]
pub fn lookup_time_spent(sites: JsValue, domain: &str) -> Result<JsValue, JsValue> {
    let sites: SiteMap = if sites.is_undefined() || sites.is_null() {
        SiteMap::new()
    } else {
        decode(&sites, "sites")?
    };

    let result = Object::new();
    let (found, similar, domain, time) = match interstitial::lookup_time_spent(&sites, domain) {
        SiteLookup::Found { domain, time } => (true, false, domain, time),
        SiteLookup::Similar { domain, time } => (true, true, domain, time),
        SiteLookup::NotFound => (false, false, domain.to_string(), 0),
    };
    let _ = Reflect::set(&result, &"found".into(), &JsValue::from(found));
    let _ = Reflect::set(&result, &"similar".into(), &JsValue::from(similar));
    let _ = Reflect::set(&result, &"domain".into(), &JsValue::from_str(&domain));
    let _ = Reflect::set(&result, &"time".into(), &JsValue::from(time as f64));
    Ok(result.into())
}

#[wasm_bindgen(js_name = formatTimeSpent)]
pub fn format_time_spent(ms: f64) -> String {
    format_spent(ms.max(0.0) as u64).to_string()
}

#[wasm_bindgen(js_name = formatClock)]
pub fn format_clock_js(ms: f64) -> String {
    format_clock(ms.max(0.0) as u64)
}

#[wasm_bindgen(js_name = unblockFallbackUrl)]
pub fn unblock_fallback_url(domain: &str, original_url: Option<String>) -> String {
    interstitial::unblock_fallback_url(domain, original_url.as_deref())
}

#[wasm_bindgen(js_name = extractDomain)]
pub fn extract_domain(url: &str) -> Option<String> {
    tg_core::url::extract_domain(url)
}

#[wasm_bindgen(js_name = normalizeDomain)]
pub fn normalize_domain(input: &str) -> Option<String> {
    tg_core::url::normalize_domain(input)
}

