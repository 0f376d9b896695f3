//! Replay of recorded browser events
//!
//! Drives a [`Background`] wired to a [`SimBrowser`] through a timed event
//! log, advancing a [`ManualClock`] and firing the periodic tick at the
//! configured interval between events. One JSON object per line:
//!
//! ```text
//! {"at": 0,    "event": "openWindow", "windowId": 1}
//! {"at": 0,    "event": "openTab", "tabId": 1, "windowId": 1, "url": "https://a.com/"}
//! {"at": 5000, "event": "navigate", "tabId": 1, "url": "https://b.com/"}
//! {"at": 9000, "event": "end"}
//! ```
//!
//! `at` is milliseconds since the start of the replay.

use std::rc::Rc;

use log::{debug, warn};
use serde::Deserialize;

use crate::background::Background;
use crate::clock::{Clock, ManualClock};
use crate::error::Result;
use crate::sim::SimBrowser;
use crate::store::StorageArea;
use crate::types::{NavigationDetails, TabChange, TabId, WindowId, WINDOW_ID_NONE};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ReplayEvent {
    OpenWindow {
        window_id: WindowId,
    },
    /// `null` window id means focus left the browser.
    FocusWindow {
        #[serde(default)]
        window_id: Option<WindowId>,
    },
    MinimizeWindow {
        window_id: WindowId,
    },
    OpenTab {
        tab_id: TabId,
        window_id: WindowId,
        url: String,
    },
    ActivateTab {
        tab_id: TabId,
    },
    Navigate {
        tab_id: TabId,
        url: String,
    },
    CloseTab {
        tab_id: TabId,
    },
    PopupOpen,
    PopupClose,
    Block {
        domain: String,
    },
    Unblock {
        domain: String,
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    /// Advance time only.
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimedEvent {
    pub at: i64,
    #[serde(flatten)]
    pub event: ReplayEvent,
}

/// Parse a JSON-lines event log. Blank lines and `#` comments are skipped.
pub fn parse_event_log(text: &str) -> std::result::Result<Vec<TimedEvent>, String> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| serde_json::from_str(line).map_err(|e| format!("line {}: {}", n, e)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub ticks: usize,
    pub failures: usize,
}

type SimBackground<A> = Background<A, Rc<SimBrowser>, Rc<SimBrowser>>;

/// Run `events` in order of appearance. Event times must not decrease;
/// an event timed before the current clock runs at the current time.
pub async fn replay<A: StorageArea>(
    bg: &SimBackground<A>,
    clock: &ManualClock,
    events: &[TimedEvent],
) -> ReplaySummary {
    let tick = bg.config().tick_interval_ms.max(1) as i64;
    let start = clock.now_ms();
    let mut next_tick = start + tick;
    let mut summary = ReplaySummary::default();

    for timed in events {
        let at = (start + timed.at).max(clock.now_ms());
        while next_tick <= at {
            clock.set(next_tick);
            bg.on_tick().await;
            summary.ticks += 1;
            next_tick += tick;
        }
        clock.set(at);

        debug!("t+{}ms {:?}", timed.at, timed.event);
        if let Err(e) = apply(bg, &timed.event).await {
            warn!("Event at t+{}ms failed: {}", timed.at, e);
            summary.failures += 1;
        }
        summary.events += 1;
    }
    summary
}

async fn apply<A: StorageArea>(bg: &SimBackground<A>, event: &ReplayEvent) -> Result<()> {
    let sim = bg.browser();
    match event {
        ReplayEvent::OpenWindow { window_id } => {
            sim.open_window(*window_id);
            bg.on_window_focus_changed(*window_id).await?;
        }
        ReplayEvent::FocusWindow { window_id } => {
            sim.focus_window(*window_id);
            bg.on_window_focus_changed(window_id.unwrap_or(WINDOW_ID_NONE)).await?;
        }
        ReplayEvent::MinimizeWindow { window_id } => {
            sim.minimize_window(*window_id);
            bg.on_window_focus_changed(WINDOW_ID_NONE).await?;
        }
        ReplayEvent::OpenTab { tab_id, window_id, url } => {
            let tab = sim.open_tab(*tab_id, *window_id, url);
            bg.on_tab_created(&tab).await?;
            bg.on_tab_activated(*tab_id).await?;
        }
        ReplayEvent::ActivateTab { tab_id } => {
            sim.activate_tab(*tab_id);
            bg.on_tab_activated(*tab_id).await?;
        }
        ReplayEvent::Navigate { tab_id, url } => {
            let details = NavigationDetails {
                tab_id: *tab_id,
                url: url.clone(),
                frame_id: 0,
            };
            if bg.on_before_navigate(&details).await?.is_none() {
                sim.set_tab_url(*tab_id, url);
            }
            if let Some(tab) = sim.tab(*tab_id) {
                let change = TabChange { url: tab.url.clone() };
                bg.on_tab_updated(*tab_id, &change, &tab).await?;
            }
        }
        ReplayEvent::CloseTab { tab_id } => sim.close_tab(*tab_id),
        ReplayEvent::PopupOpen => bg.on_popup_connected(),
        ReplayEvent::PopupClose => bg.on_popup_disconnected(),
        ReplayEvent::Block { domain } => {
            bg.block_domain(domain).await?;
            bg.rebuild_rules().await?;
        }
        ReplayEvent::Unblock { domain, tab_id } => {
            bg.unblock_and_open(domain, None, *tab_id).await?;
        }
        ReplayEvent::End => {}
    }
    Ok(())
}
