//! Background service
//!
//! Owns all state of the extension's background context: configuration, the
//! typed store, the session tracker, the rule synchronizer and the navigation
//! interceptor. Browser events are delivered to the `on_*` methods; foreground
//! pages talk to it through [`Background::handle_message`].
//!
//! Handlers never hold a `RefCell` borrow across an `.await`. State read
//! before an await is re-read after it where it matters.

use std::cell::RefCell;

use log::{debug, error, info, warn};

use crate::browser::{Browser, RuleEngine};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{BrowserError, Error, Result, StoreError};
use crate::intercept::Interceptor;
use crate::interstitial::{lookup_time_spent, SiteLookup};
use crate::messages::{Request, Response, Sender};
use crate::stats::SiteStats;
use crate::store::{Storage, StorageArea, StorageChange};
use crate::sync::{RebuildOutcome, RuleSynchronizer};
use crate::tracker::{Flush, SessionState, SessionTracker};
use crate::types::{
    CurrentTime, NavigationDetails, SiteMap, SitesPerPage, Tab, TabChange, TabId, Window, WindowId, WINDOW_ID_NONE,
};
use crate::url::{extract_domain, normalize_domain};

pub struct Background<A, B, R> {
    config: Config,
    storage: Storage<A>,
    browser: B,
    rules: R,
    clock: Box<dyn Clock>,
    tracker: RefCell<SessionTracker>,
    sync: RuleSynchronizer,
    interceptor: Interceptor,
}

impl<A, B, R> Background<A, B, R>
where
    A: StorageArea,
    B: Browser,
    R: RuleEngine,
{
    pub fn new(config: Config, area: A, browser: B, rules: R, clock: Box<dyn Clock>) -> Self {
        let config = config.normalized();
        let storage = Storage::new(area, config.favicon_template.clone());
        Self {
            config,
            storage,
            browser,
            rules,
            clock,
            tracker: RefCell::new(SessionTracker::new()),
            sync: RuleSynchronizer::new(),
            interceptor: Interceptor::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Storage<A> {
        &self.storage
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn sync(&self) -> &RuleSynchronizer {
        &self.sync
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Snapshot of the session state.
    pub fn session(&self) -> SessionState {
        self.tracker.borrow().state().clone()
    }

    pub fn window_focused(&self) -> bool {
        self.tracker.borrow().window_focused()
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    async fn persist(&self, flush: Option<Flush>) {
        let Some(Flush { domain, elapsed_ms }) = flush else {
            return;
        };
        if let Err(e) = self.storage.add_time(&domain, elapsed_ms).await {
            error!("Failed to save {}ms for {}: {}", elapsed_ms, domain, e);
        }
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Warm the cache and rules, sweep open tabs, then track the active tab.
    pub async fn startup(&self) -> Result<()> {
        info!("Background starting");
        self.rebuild_rules().await?;

        match self.check_all_open_tabs().await {
            Ok(n) if n > 0 => info!("Redirected {} already-open blocked tabs", n),
            Ok(_) => {}
            Err(e) => warn!("Open-tab sweep failed: {}", e),
        }

        if let Some(tab) = self.browser.active_tab(None).await? {
            self.start_tracking(&tab).await;
        }
        Ok(())
    }

    // =========================================================================
    // Activity tracking
    // =========================================================================

    /// Make the tab's domain the current session. Returns false (and changes
    /// nothing) for extension pages, unparseable URLs and blocked domains.
    pub async fn start_tracking(&self, tab: &Tab) -> bool {
        let Some(url) = tab.url.as_deref() else {
            return false;
        };
        if self.config.is_extension_url(url) {
            return false;
        }
        let Some(domain) = extract_domain(url) else {
            return false;
        };
        if self.sync.cache().is_blocked(&domain) {
            debug!("Not tracking blocked domain {}", domain);
            return false;
        }

        let now = self.now();
        let flush = self.tracker.borrow_mut().start(domain.clone(), tab.id, now);
        info!("Started tracking {} in tab {}", domain, tab.id);
        self.persist(flush).await;
        true
    }

    /// Settle and end the current session. With `tab_id`, only when that
    /// tab is the one being timed.
    async fn stop_tracking(&self, tab_id: Option<TabId>) {
        let now = self.now();
        let flush = {
            let mut tracker = self.tracker.borrow_mut();
            let current = tracker.state().tab_id();
            if current.is_none() || (tab_id.is_some() && tab_id != current) {
                return;
            }
            if let Some(domain) = tracker.state().domain() {
                info!("Stopped tracking {}", domain);
            }
            tracker.stop(now)
        };
        self.persist(flush).await;
    }

    /// The activated tab is now in front: a redirect ends whatever was timed.
    pub async fn on_tab_activated(&self, tab_id: TabId) -> Result<()> {
        let Some(tab) = self.browser.get_tab(tab_id).await? else {
            return Ok(());
        };
        let redirected = self
            .interceptor
            .check_tab(&tab, &self.sync, &self.browser, &self.config)
            .await?;
        if redirected.is_some() {
            self.stop_tracking(None).await;
        } else {
            self.start_tracking(&tab).await;
        }
        Ok(())
    }

    /// Only URL changes matter. Enforcement applies to every tab; tracking
    /// restarts only for the tab currently being timed.
    pub async fn on_tab_updated(&self, tab_id: TabId, change: &TabChange, tab: &Tab) -> Result<()> {
        if change.url.is_none() {
            return Ok(());
        }
        let redirected = self
            .interceptor
            .check_tab(tab, &self.sync, &self.browser, &self.config)
            .await?;
        if redirected.is_some() {
            self.stop_tracking(Some(tab_id)).await;
            return Ok(());
        }
        let is_current = self.tracker.borrow().state().tab_id() == Some(tab_id);
        if is_current {
            self.start_tracking(tab).await;
        }
        Ok(())
    }

    pub async fn on_tab_created(&self, tab: &Tab) -> Result<()> {
        self.interceptor
            .check_tab(tab, &self.sync, &self.browser, &self.config)
            .await?;
        Ok(())
    }

    /// Returns the blocked domain when the navigation was redirected.
    pub async fn on_before_navigate(&self, details: &NavigationDetails) -> Result<Option<String>> {
        let redirected = self
            .interceptor
            .on_before_navigate(details, &self.sync, &self.browser, &self.config)
            .await?;
        if redirected.is_some() {
            self.stop_tracking(Some(details.tab_id)).await;
        }
        Ok(redirected)
    }

    pub async fn on_window_focus_changed(&self, window_id: WindowId) -> Result<()> {
        if self.tracker.borrow().popup_open() {
            debug!("Popup is open, ignoring focus change");
            return Ok(());
        }

        let focused = if window_id == WINDOW_ID_NONE {
            false
        } else {
            match self.browser.get_window(window_id).await {
                Ok(window) => window.is_some_and(|w| w.has_attention()),
                Err(e) => {
                    warn!("Could not read window {}: {}", window_id, e);
                    false
                }
            }
        };

        let now = self.now();
        if !focused {
            let flush = self.tracker.borrow_mut().focus_lost(now);
            if let Some(domain) = self.tracker.borrow().state().domain() {
                info!("Window lost focus, paused tracking {}", domain);
            }
            self.persist(flush).await;
            return Ok(());
        }

        self.tracker.borrow_mut().focus_gained(now);
        if let Some(tab) = self.browser.active_tab(Some(window_id)).await? {
            self.start_tracking(&tab).await;
        }
        Ok(())
    }

    /// Periodic flush of the running session.
    pub async fn on_tick(&self) {
        let popup_open = self.tracker.borrow().popup_open();
        let attention = popup_open
            || match self.browser.all_windows().await {
                Ok(windows) => windows.iter().any(Window::is_active_normal),
                Err(e) => {
                    warn!("Could not list windows: {}", e);
                    false
                }
            };

        let now = self.now();
        let flush = self.tracker.borrow_mut().tick(now, attention);
        self.persist(flush).await;
    }

    pub fn on_popup_connected(&self) {
        self.tracker.borrow_mut().set_popup_open(true);
        info!("Popup opened");
    }

    pub fn on_popup_disconnected(&self) {
        self.tracker.borrow_mut().set_popup_open(false);
        info!("Popup closed");
    }

    pub fn current_time(&self) -> CurrentTime {
        self.tracker.borrow().current_time(self.now())
    }

    // =========================================================================
    // Blocking
    // =========================================================================

    /// Rebuild when the blocked list is among the changes.
    pub async fn on_storage_changed(
        &self,
        changes: &[StorageChange],
    ) -> std::result::Result<Option<RebuildOutcome>, StoreError> {
        if !changes.iter().any(StorageChange::is_blocked_list) {
            return Ok(None);
        }
        self.rebuild_rules().await.map(Some)
    }

    pub async fn rebuild_rules(&self) -> std::result::Result<RebuildOutcome, StoreError> {
        self.sync.rebuild(&self.storage, &self.rules, &self.config).await
    }

    /// Sweep every open tab. Returns how many were redirected.
    pub async fn check_all_open_tabs(&self) -> std::result::Result<usize, BrowserError> {
        let redirected = self
            .interceptor
            .check_all_open_tabs(&self.sync, &self.browser, &self.config)
            .await?;
        let current = self.tracker.borrow().state().tab_id();
        if let Some(tab_id) = current.filter(|id| redirected.contains(id)) {
            self.stop_tracking(Some(tab_id)).await;
        }
        Ok(redirected.len())
    }

    /// Unblock `domain` and send the tab back where it was going.
    ///
    /// Automatic rebuilds are suppressed for the whole transaction and the
    /// suppression is released on every exit path. Returns the URL navigated to.
    pub async fn unblock_and_open(
        &self,
        domain: &str,
        original_url: Option<&str>,
        tab_id: Option<TabId>,
    ) -> Result<String> {
        let domain = normalize_domain(domain).ok_or_else(|| Error::InvalidDomain(domain.to_string()))?;
        let _suppressed = self.sync.suppression().hold();
        info!("Unblocking {}", domain);

        let blocked = self.storage.unblock(&domain).await?;
        self.sync.install(&blocked, &self.rules, &self.config).await?;

        let recorded = tab_id.and_then(|id| self.interceptor.forget(id));
        let target = original_url
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or(recorded)
            .unwrap_or_else(|| format!("https://{}", domain));

        if let Some(tab_id) = tab_id {
            self.browser.navigate(tab_id, &target).await?;
            info!("Tab {} resumed at {}", tab_id, target);
        }
        Ok(target)
    }

    /// Normalize and append to the blocked list. Returns whether it changed.
    pub async fn block_domain(&self, input: &str) -> Result<bool> {
        let domain = normalize_domain(input).ok_or_else(|| Error::InvalidDomain(input.to_string()))?;
        Ok(self.storage.block(&domain).await?)
    }

    /// Returns the normalized domain and whether it is blocked afterwards.
    pub async fn toggle_block(&self, input: &str) -> Result<(String, bool)> {
        let domain = normalize_domain(input).ok_or_else(|| Error::InvalidDomain(input.to_string()))?;
        let blocked = self.storage.toggle_blocked(&domain).await?;
        info!("{} {}", if blocked { "Blocked" } else { "Unblocked" }, domain);
        Ok((domain, blocked))
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Answer one foreground message. Never fails; failures are responses.
    pub async fn handle_message(&self, message: &serde_json::Value, sender: &Sender) -> Response {
        match Request::from_value(message) {
            Ok(request) => self.dispatch(request, sender).await,
            Err(e) => {
                debug!("Rejected message {}: {}", message, e);
                Response::failure(e)
            }
        }
    }

    pub async fn dispatch(&self, request: Request, sender: &Sender) -> Response {
        match request {
            Request::GetCurrentTime => {
                let current = self.current_time();
                Response::CurrentTime {
                    domain: current.domain,
                    current_time: current.elapsed_ms,
                    is_active: current.is_active,
                }
            }
            Request::GetSiteStats { domain } => match self.storage.sites().await {
                Ok(sites) => match lookup_time_spent(&sites, &domain) {
                    SiteLookup::Found { domain, time } | SiteLookup::Similar { domain, time } => {
                        Response::SiteStats {
                            success: true,
                            domain,
                            time_spent: time,
                        }
                    }
                    SiteLookup::NotFound => Response::failure(format!("no data for {}", domain)),
                },
                Err(e) => Response::failure(e),
            },
            Request::GetOriginalBlockedUrl => Response::OriginalUrl {
                success: true,
                original_url: sender.tab_id.and_then(|id| self.interceptor.original_url(id)),
                tab_id: sender.tab_id,
            },
            Request::UnblockAndOpen { domain, original_url } => {
                match self.unblock_and_open(&domain, original_url.as_deref(), sender.tab_id).await {
                    Ok(_) => Response::done(),
                    Err(e) => {
                        warn!("Unblock of {} failed: {}", domain, e);
                        Response::failure(e)
                    }
                }
            }
            Request::Ping => {
                let tracker = self.tracker.borrow();
                Response::Ping {
                    status: "ok".to_string(),
                    message: "Background is running".to_string(),
                    current_domain: tracker.state().domain().map(str::to_string),
                    is_tracking: tracker.state().is_tracking(),
                    timestamp: self.now(),
                }
            }
            Request::CheckAllTabs => match self.check_all_open_tabs().await {
                Ok(n) => Response::Message {
                    success: true,
                    message: format!("Checked all tabs, redirected {}", n),
                },
                Err(e) => Response::failure(e),
            },
            Request::GetBlockedDomains => match self.storage.blocked().await {
                Ok(blocked) => Response::Blocked { success: true, blocked },
                Err(e) => Response::failure(e),
            },
            Request::GetStats { page } => self.stats_response(page.unwrap_or(1)).await,
            Request::ToggleBlock { domain } => match self.toggle_block(&domain).await {
                Ok((domain, blocked)) => Response::Toggled {
                    success: true,
                    domain,
                    blocked,
                },
                Err(e) => Response::failure(e),
            },
            Request::ResetAllData => match self.storage.reset_sites().await {
                Ok(()) => {
                    info!("All tracking data reset");
                    Response::done()
                }
                Err(e) => Response::failure(e),
            },
        }
    }

    async fn stats_response(&self, page: u32) -> Response {
        let (sites, per_page) = match self.load_stats_inputs().await {
            Ok(inputs) => inputs,
            Err(e) => return Response::failure(e),
        };
        let current = self.current_time();
        let live = current.domain.as_deref().map(|d| (d, current.elapsed_ms));
        let stats = SiteStats::ranked(&sites, live);
        let view = stats.page(page, per_page);
        Response::Stats {
            success: true,
            sites: view.sites.to_vec(),
            page: view.page,
            total_pages: view.total_pages,
            total_sites: view.total_sites,
            current_domain: current.domain.clone(),
        }
    }

    async fn load_stats_inputs(&self) -> std::result::Result<(SiteMap, SitesPerPage), StoreError> {
        let sites = self.storage.sites().await?;
        let per_page = self.storage.sites_per_page(self.config.sites_per_page).await?;
        Ok((sites, per_page))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::SimBrowser;
    use crate::store::MemoryStore;

    type TestBackground = Background<Rc<MemoryStore>, Rc<SimBrowser>, Rc<SimBrowser>>;

    struct Harness {
        bg: TestBackground,
        store: Rc<MemoryStore>,
        sim: Rc<SimBrowser>,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let store = Rc::new(MemoryStore::new());
        let sim = Rc::new(SimBrowser::new());
        let clock = ManualClock::new(1_000_000);
        let bg = Background::new(
            Config::default(),
            store.clone(),
            sim.clone(),
            sim.clone(),
            Box::new(clock.clone()),
        );
        Harness { bg, store, sim, clock }
    }

    async fn time_of(h: &Harness, domain: &str) -> u64 {
        h.bg.storage().site(domain).await.unwrap().map_or(0, |r| r.time)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_tab_switch_flushes_previous() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://www.a.com/");
        h.bg.on_tab_activated(1).await.unwrap();

        h.clock.advance(5_000);
        h.sim.open_tab(2, 1, "https://b.com/");
        h.bg.on_tab_activated(2).await.unwrap();

        assert_eq!(time_of(&h, "a.com").await, 5_000);
        assert_eq!(h.bg.session().domain(), Some("b.com"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_extension_and_internal_pages_not_tracked() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "chrome://newtab/");
        assert!(!h.bg.start_tracking(&h.sim.tab(1).unwrap()).await);
        h.sim.open_tab(2, 1, "chrome-extension://timeguard/popup.html");
        assert!(!h.bg.start_tracking(&h.sim.tab(2).unwrap()).await);
        assert_eq!(h.bg.session(), SessionState::Idle);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_focus_loss_and_regain() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://a.com/");
        h.bg.on_tab_activated(1).await.unwrap();

        h.clock.advance(2_000);
        h.sim.focus_window(None);
        h.bg.on_window_focus_changed(WINDOW_ID_NONE).await.unwrap();
        assert_eq!(time_of(&h, "a.com").await, 2_000);
        assert!(!h.bg.window_focused());

        h.clock.advance(10_000);
        h.bg.on_tick().await;
        assert_eq!(time_of(&h, "a.com").await, 2_000);

        h.sim.focus_window(Some(1));
        h.bg.on_window_focus_changed(1).await.unwrap();
        h.clock.advance(1_000);
        h.bg.on_tick().await;
        assert_eq!(time_of(&h, "a.com").await, 3_000);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_minimized_window_counts_as_unfocused() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://a.com/");
        h.bg.on_tab_activated(1).await.unwrap();
        h.sim.minimize_window(1);
        h.bg.on_window_focus_changed(1).await.unwrap();
        assert!(!h.bg.window_focused());
        assert!(!h.bg.session().is_tracking());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_popup_suppresses_focus_change_and_keeps_ticking() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://a.com/");
        h.bg.on_tab_activated(1).await.unwrap();

        h.bg.on_popup_connected();
        h.sim.focus_window(None);
        h.bg.on_window_focus_changed(WINDOW_ID_NONE).await.unwrap();
        assert!(h.bg.window_focused());

        h.clock.advance(1_000);
        h.bg.on_tick().await;
        assert_eq!(time_of(&h, "a.com").await, 1_000);

        h.bg.on_popup_disconnected();
        h.clock.advance(1_000);
        h.bg.on_tick().await;
        assert_eq!(time_of(&h, "a.com").await, 1_000);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_tab_updated_only_retracks_current_tab() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://a.com/");
        h.bg.on_tab_activated(1).await.unwrap();
        h.sim.open_tab(2, 1, "https://b.com/");
        h.sim.activate_tab(1);

        let change = TabChange {
            url: Some("https://c.com/".into()),
        };
        h.sim.set_tab_url(2, "https://c.com/");
        h.bg.on_tab_updated(2, &change, &h.sim.tab(2).unwrap()).await.unwrap();
        assert_eq!(h.bg.session().domain(), Some("a.com"));

        h.sim.set_tab_url(1, "https://d.com/");
        let change = TabChange {
            url: Some("https://d.com/".into()),
        };
        h.bg.on_tab_updated(1, &change, &h.sim.tab(1).unwrap()).await.unwrap();
        assert_eq!(h.bg.session().domain(), Some("d.com"));

        // Title-only updates are ignored
        h.bg.on_tab_updated(1, &TabChange::default(), &h.sim.tab(1).unwrap()).await.unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_storage_change_triggers_rebuild() {
        let h = harness();
        h.bg.toggle_block("https://www.foo.com/x").await.unwrap();
        let changes = h.store.take_changes();
        let outcome = h.bg.on_storage_changed(&changes).await.unwrap();
        assert!(matches!(outcome, Some(RebuildOutcome::Synced(_))));
        assert!(h.bg.sync().cache().is_blocked("foo.com"));
        assert_eq!(h.sim.installed_rules().len(), 1);

        h.bg.storage().add_time("a.com", 10).await.unwrap();
        let changes = h.store.take_changes();
        assert!(h.bg.on_storage_changed(&changes).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocked_tab_redirected_not_tracked() {
        let h = harness();
        h.store.put_value(crate::store::BLOCKED_KEY, json!(["foo.com"]));
        h.bg.rebuild_rules().await.unwrap();

        h.sim.open_window(1);
        h.sim.open_tab(3, 1, "https://foo.com/a");
        h.bg.on_tab_activated(3).await.unwrap();
        assert_eq!(h.bg.session(), SessionState::Idle);
        assert_eq!(h.sim.tab(3).unwrap().url.unwrap(), h.bg.config().interstitial_url("foo.com"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unblock_releases_suppression_on_store_failure() {
        let h = harness();
        h.store.put_value(crate::store::BLOCKED_KEY, json!(["foo.com"]));
        h.store.set_fail_writes(true);

        let response = h
            .bg
            .handle_message(&json!({"action": "unblockAndOpen", "domain": "foo.com"}), &Sender::tab(1))
            .await;
        assert!(!response.is_success());
        assert!(!h.bg.sync().is_suppressed());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unblock_releases_suppression_on_rule_failure() {
        let h = harness();
        h.store.put_value(crate::store::BLOCKED_KEY, json!(["foo.com", "bar.com"]));
        h.sim.set_fail_rule_updates(true);

        let result = h.bg.unblock_and_open("foo.com", None, Some(1)).await;
        assert!(matches!(result, Err(Error::Rules(_))));
        assert!(!h.bg.sync().is_suppressed());
        // The cache is already current and enforces the new list
        assert!(!h.bg.sync().cache().is_blocked("foo.com"));
        assert!(h.bg.sync().cache().is_blocked("bar.com"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_redirect_of_timed_tab_ends_session() {
        let h = harness();
        h.store.put_value(crate::store::BLOCKED_KEY, json!(["foo.com"]));
        h.bg.rebuild_rules().await.unwrap();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://a.com/");
        h.bg.on_tab_activated(1).await.unwrap();

        h.clock.advance(1_000);
        let details = NavigationDetails {
            tab_id: 1,
            url: "https://foo.com/".into(),
            frame_id: 0,
        };
        assert_eq!(h.bg.on_before_navigate(&details).await.unwrap().as_deref(), Some("foo.com"));
        let tab = h.sim.tab(1).unwrap();
        assert_eq!(tab.url.as_deref(), Some(h.bg.config().interstitial_url("foo.com").as_str()));
        let change = TabChange { url: tab.url.clone() };
        h.bg.on_tab_updated(1, &change, &tab).await.unwrap();

        for _ in 0..10 {
            h.clock.advance(1_000);
            h.bg.on_tick().await;
        }
        assert_eq!(time_of(&h, "a.com").await, 1_000);
        assert_eq!(h.bg.session(), SessionState::Idle);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_activating_blocked_tab_settles_previous_domain() {
        let h = harness();
        h.store.put_value(crate::store::BLOCKED_KEY, json!(["foo.com"]));
        h.bg.rebuild_rules().await.unwrap();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://a.com/");
        h.bg.on_tab_activated(1).await.unwrap();

        h.clock.advance(2_000);
        h.sim.open_tab(2, 1, "https://foo.com/");
        h.bg.on_tab_activated(2).await.unwrap();
        h.clock.advance(5_000);
        h.bg.on_tick().await;

        assert_eq!(time_of(&h, "a.com").await, 2_000);
        assert_eq!(h.bg.session(), SessionState::Idle);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_sweep_redirecting_timed_tab_ends_session() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://foo.com/");
        h.sim.open_tab(2, 1, "https://b.com/");
        h.bg.on_tab_activated(2).await.unwrap();
        h.clock.advance(3_000);

        h.store.put_value(crate::store::BLOCKED_KEY, json!(["b.com"]));
        h.bg.rebuild_rules().await.unwrap();
        assert_eq!(h.bg.check_all_open_tabs().await.unwrap(), 1);
        assert_eq!(time_of(&h, "b.com").await, 3_000);
        assert_eq!(h.bg.session(), SessionState::Idle);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unblock_releases_suppression_on_navigation_failure() {
        let h = harness();
        h.store.put_value(crate::store::BLOCKED_KEY, json!(["foo.com", "bar.com"]));
        h.bg.rebuild_rules().await.unwrap();
        h.sim.open_window(1);
        h.sim.open_tab(4, 1, "https://foo.com/x");
        h.bg.check_all_open_tabs().await.unwrap();
        h.sim.set_fail_navigation(true);

        let response = h
            .bg
            .handle_message(&json!({"action": "unblockAndOpen", "domain": "foo.com"}), &Sender::tab(4))
            .await;
        assert!(!response.is_success());
        assert!(!h.bg.sync().is_suppressed());
        // The list and rules were already updated before navigation failed
        assert_eq!(h.bg.storage().blocked().await.unwrap(), vec!["bar.com".to_string()]);
        assert_eq!(h.sim.installed_rules().len(), 1);
        assert!(!h.bg.sync().cache().is_blocked("foo.com"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unblock_falls_back_to_recorded_then_https() {
        let h = harness();
        h.store.put_value(crate::store::BLOCKED_KEY, json!(["foo.com"]));
        h.bg.rebuild_rules().await.unwrap();
        h.sim.open_window(1);
        h.sim.open_tab(5, 1, "https://foo.com/deep/link");
        h.bg.check_all_open_tabs().await.unwrap();

        let target = h.bg.unblock_and_open("foo.com", None, Some(5)).await.unwrap();
        assert_eq!(target, "https://foo.com/deep/link");
        assert_eq!(h.bg.interceptor().original_url(5), None);

        let target = h.bg.unblock_and_open("bar.com", Some(""), None).await.unwrap();
        assert_eq!(target, "https://bar.com");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_messages() {
        let h = harness();
        h.sim.open_window(1);
        h.sim.open_tab(1, 1, "https://a.com/");
        h.bg.on_tab_activated(1).await.unwrap();
        h.clock.advance(1_500);

        let current = h.bg.handle_message(&json!({"action": "getCurrentTime"}), &Sender::default()).await;
        assert_eq!(current.to_value(), json!({"domain": "a.com", "currentTime": 1500, "isActive": true}));

        let ping = h.bg.handle_message(&json!({"action": "ping"}), &Sender::default()).await.to_value();
        assert_eq!(ping["status"], "ok");
        assert_eq!(ping["currentDomain"], "a.com");
        assert_eq!(ping["isTracking"], true);

        let missing = h
            .bg
            .handle_message(&json!({"action": "getSiteStats", "domain": "a.com"}), &Sender::default())
            .await;
        assert!(!missing.is_success());

        h.bg.on_tick().await;
        let stats = h
            .bg
            .handle_message(&json!({"action": "getSiteStats", "domain": "a.com"}), &Sender::default())
            .await
            .to_value();
        assert_eq!(stats["timeSpent"], 1500);

        let empty = h
            .bg
            .handle_message(&json!({"action": "getSiteStats", "domain": ""}), &Sender::default())
            .await;
        assert!(!empty.is_success());

        let unknown = h.bg.handle_message(&json!({"action": "selfDestruct"}), &Sender::default()).await;
        assert_eq!(unknown.to_value(), json!({"success": false, "error": "unknown action"}));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_stats_and_reset_messages() {
        let h = harness();
        h.bg.storage().add_time("a.com", 3_000).await.unwrap();
        h.bg.storage().add_time("b.com", 6_000).await.unwrap();
        h.bg.block_domain("c.com").await.unwrap();

        let stats = h
            .bg
            .handle_message(&json!({"action": "getStats", "page": 1}), &Sender::default())
            .await
            .to_value();
        assert_eq!(stats["totalSites"], 2);
        assert_eq!(stats["sites"][0]["domain"], "b.com");

        let reset = h.bg.handle_message(&json!({"action": "resetAllData"}), &Sender::default()).await;
        assert!(reset.is_success());
        assert!(h.bg.storage().sites().await.unwrap().is_empty());
        assert_eq!(h.bg.storage().blocked().await.unwrap(), vec!["c.com".to_string()]);

        let blocked = h
            .bg
            .handle_message(&json!({"action": "getBlockedDomains"}), &Sender::default())
            .await
            .to_value();
        assert_eq!(blocked, json!({"success": true, "blocked": ["c.com"]}));
    }
}
