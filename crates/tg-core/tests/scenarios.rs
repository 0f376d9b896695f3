//! End-to-end scenarios for the background service.

use std::rc::Rc;

use serde_json::json;
use tg_core::sim::SimBrowser;
use tg_core::store::BLOCKED_KEY;
use tg_core::sync::RebuildOutcome;
use tg_core::types::NavigationDetails;
use tg_core::{extract_domain, Background, BlockedDomains, Config, ManualClock, MemoryStore, Sender, Storage};

type Bg = Background<Rc<MemoryStore>, Rc<SimBrowser>, Rc<SimBrowser>>;

fn background(blocked: &[&str]) -> (Bg, Rc<MemoryStore>, Rc<SimBrowser>, ManualClock) {
    let store = Rc::new(MemoryStore::new());
    store.put_value(BLOCKED_KEY, json!(blocked));
    let sim = Rc::new(SimBrowser::new());
    let clock = ManualClock::new(1_700_000_000_000);
    let bg = Background::new(
        Config::default(),
        store.clone(),
        sim.clone(),
        sim.clone(),
        Box::new(clock.clone()),
    );
    (bg, store, sim, clock)
}

#[test]
fn test_www_stripping_is_idempotent() {
    for (with, without) in [
        ("https://www.example.com/a?b", "https://example.com/a?b"),
        ("http://www.sub.example.org", "http://sub.example.org"),
        ("https://www.x.io:8443/", "https://x.io:8443/"),
    ] {
        assert_eq!(extract_domain(with), extract_domain(without));
        assert!(extract_domain(with).is_some());
    }
}

#[test]
fn test_matching_is_reflexive_and_subdomain_inclusive() {
    let cache = BlockedDomains::from_list(&["example.com".to_string()]);
    assert!(cache.is_blocked("example.com"));
    assert!(cache.is_blocked("sub.example.com"));
    assert!(!cache.is_blocked("notexample.com"));
}

#[tokio::test(flavor = "current_thread")]
async fn test_flushes_accumulate() {
    let storage = Storage::new(MemoryStore::new(), "");
    storage.add_time("a.com", 5_000).await.unwrap();
    storage.add_time("a.com", 3_000).await.unwrap();
    assert_eq!(storage.site("a.com").await.unwrap().unwrap().time, 8_000);
}

#[tokio::test(flavor = "current_thread")]
async fn test_blocked_navigation_is_intercepted() {
    let (bg, _store, sim, _clock) = background(&["foo.com"]);
    bg.startup().await.unwrap();
    sim.open_window(1);
    sim.open_tab(3, 1, "about:blank");

    let details = NavigationDetails {
        tab_id: 3,
        url: "https://www.foo.com/page".into(),
        frame_id: 0,
    };
    let hit = bg.on_before_navigate(&details).await.unwrap();
    assert_eq!(hit.as_deref(), Some("foo.com"));

    let (tab_id, url) = sim.navigations().pop().unwrap();
    assert_eq!(tab_id, 3);
    assert!(url.ends_with("blocked.html?domain=foo.com"));
    assert_eq!(
        bg.interceptor().original_url(3).as_deref(),
        Some("https://www.foo.com/page")
    );
}

#[tokio::test(flavor = "current_thread")]
async fn test_unblock_and_open() {
    let (bg, store, sim, _clock) = background(&["foo.com", "bar.com"]);
    bg.startup().await.unwrap();
    sim.open_window(1);
    sim.open_tab(7, 1, "https://www.foo.com/page");
    bg.check_all_open_tabs().await.unwrap();
    assert!(bg.interceptor().original_url(7).is_some());

    let response = bg
        .handle_message(
            &json!({"action": "unblockAndOpen", "domain": "foo.com", "originalUrl": "https://www.foo.com/page"}),
            &Sender::tab(7),
        )
        .await;
    assert!(response.is_success());

    assert_eq!(store.get_value(BLOCKED_KEY), Some(json!(["bar.com"])));
    let rules = sim.installed_rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, 1);
    assert_eq!(rules[0].domain(), Some("bar.com"));
    assert_eq!(sim.tab(7).unwrap().url.as_deref(), Some("https://www.foo.com/page"));
    assert_eq!(bg.interceptor().original_url(7), None);
    assert!(!bg.sync().is_suppressed());
}

#[tokio::test(flavor = "current_thread")]
async fn test_rebuild_during_unblock_is_noop() {
    let (bg, store, sim, _clock) = background(&["foo.com"]);
    bg.rebuild_rules().await.unwrap();

    let guard = bg.sync().suppression().hold();
    store.put_value(BLOCKED_KEY, json!(["foo.com", "baz.com"]));
    let changes = store.take_changes();
    let outcome = bg.on_storage_changed(&changes).await.unwrap();
    assert!(matches!(outcome, Some(RebuildOutcome::Suppressed)));
    assert!(!bg.sync().cache().is_blocked("baz.com"));
    assert_eq!(sim.installed_rules().len(), 1);
    drop(guard);

    bg.rebuild_rules().await.unwrap();
    assert!(bg.sync().cache().is_blocked("baz.com"));
    assert_eq!(sim.installed_rules().len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn test_reset_leaves_blocked_list() {
    let (bg, store, _sim, _clock) = background(&["foo.com"]);
    bg.storage().add_time("a.com", 1_000).await.unwrap();
    let response = bg.handle_message(&json!({"action": "resetAllData"}), &Sender::default()).await;
    assert!(response.is_success());
    assert_eq!(store.get_value("sites"), Some(json!({})));
    assert_eq!(store.get_value(BLOCKED_KEY), Some(json!(["foo.com"])));
}

#[tokio::test(flavor = "current_thread")]
async fn test_switching_domains_flushes_before_opening() {
    let (bg, _store, sim, clock) = background(&[]);
    sim.open_window(1);
    sim.open_tab(1, 1, "https://a.com/");
    bg.startup().await.unwrap();

    clock.advance(1_234);
    sim.open_tab(2, 1, "https://b.com/");
    bg.on_tab_activated(2).await.unwrap();
    assert_eq!(bg.storage().site("a.com").await.unwrap().unwrap().time, 1_234);
    assert_eq!(bg.session().domain(), Some("b.com"));

    clock.advance(500);
    bg.on_tick().await;
    assert_eq!(bg.storage().site("b.com").await.unwrap().unwrap().time, 500);
}

#[tokio::test(flavor = "current_thread")]
async fn test_rule_engine_outage_keeps_enforcing_from_cache() {
    let (bg, _store, sim, _clock) = background(&["foo.com"]);
    sim.set_rules_available(false);
    let outcome = bg.rebuild_rules().await.unwrap();
    assert!(matches!(outcome, RebuildOutcome::Synced(tg_core::sync::RuleInstall::CacheOnly)));

    sim.open_window(1);
    sim.open_tab(2, 1, "https://m.foo.com/");
    bg.on_tab_activated(2).await.unwrap();
    assert!(sim.tab(2).unwrap().url.unwrap().contains("blocked.html?domain=m.foo.com"));
}
