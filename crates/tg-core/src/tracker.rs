//! Activity session state machine
//!
//! Decides which domain is currently being timed and how much elapsed time
//! must be flushed to storage on each transition. The machine is pure: every
//! transition takes the current time and returns the [`Flush`] (if any) the
//! caller must persist. The elapsed span is captured before the state moves,
//! so a domain's time is always settled before another domain becomes current.
//!
//! States:
//!
//! - `Idle`: nothing has been tracked yet.
//! - `Tracking`: a domain is active and accruing time since `started_at`.
//! - `Paused`: a domain is current but the browser window lost focus; no time
//!   accrues and there is no start timestamp.

use crate::types::{CurrentTime, TabId};

/// Session state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Tracking {
        domain: String,
        tab_id: TabId,
        started_at: i64,
    },
    Paused {
        domain: String,
        tab_id: TabId,
    },
}

impl SessionState {
    pub fn domain(&self) -> Option<&str> {
        match self {
            SessionState::Idle => None,
            SessionState::Tracking { domain, .. } | SessionState::Paused { domain, .. } => Some(domain),
        }
    }

    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            SessionState::Idle => None,
            SessionState::Tracking { tab_id, .. } | SessionState::Paused { tab_id, .. } => Some(*tab_id),
        }
    }

    pub fn started_at(&self) -> Option<i64> {
        match self {
            SessionState::Tracking { started_at, .. } => Some(*started_at),
            _ => None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self, SessionState::Tracking { .. })
    }
}

/// Elapsed time to add to a domain's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flush {
    pub domain: String,
    pub elapsed_ms: u64,
}

fn elapsed_since(started_at: i64, now: i64) -> Option<u64> {
    let elapsed = now - started_at;
    if elapsed > 0 {
        Some(elapsed as u64)
    } else {
        None
    }
}

/// The session tracker.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    state: SessionState,
    window_focused: bool,
    popup_open: bool,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    /// Starts idle with the window assumed focused.
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            window_focused: true,
            popup_open: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn window_focused(&self) -> bool {
        self.window_focused
    }

    pub fn popup_open(&self) -> bool {
        self.popup_open
    }

    pub fn set_popup_open(&mut self, open: bool) {
        self.popup_open = open;
    }

    /// Settle the running span, if any, without changing state.
    fn settle(&self, now: i64) -> Option<Flush> {
        match &self.state {
            SessionState::Tracking { domain, started_at, .. } if self.window_focused => {
                elapsed_since(*started_at, now).map(|elapsed_ms| Flush {
                    domain: domain.clone(),
                    elapsed_ms,
                })
            }
            _ => None,
        }
    }

    /// Make `domain` in `tab_id` the current session.
    ///
    /// Any running span is settled first. If the window is unfocused the new
    /// session starts paused.
    pub fn start(&mut self, domain: String, tab_id: TabId, now: i64) -> Option<Flush> {
        let flush = self.settle(now);
        self.state = if self.window_focused {
            SessionState::Tracking {
                domain,
                tab_id,
                started_at: now,
            }
        } else {
            SessionState::Paused { domain, tab_id }
        };
        flush
    }

    /// End the session: settle the running span and return to `Idle`.
    /// Focus and popup flags are kept.
    pub fn stop(&mut self, now: i64) -> Option<Flush> {
        let flush = self.settle(now);
        self.state = SessionState::Idle;
        flush
    }

    /// The window lost focus: settle and pause, keeping domain and tab.
    pub fn focus_lost(&mut self, now: i64) -> Option<Flush> {
        let flush = self.settle(now);
        self.window_focused = false;
        self.state = match std::mem::take(&mut self.state) {
            SessionState::Tracking { domain, tab_id, .. } => SessionState::Paused { domain, tab_id },
            other => other,
        };
        flush
    }

    /// The window regained focus. A paused session resumes from `now`;
    /// callers normally follow up with [`start`](Self::start) for the active tab.
    pub fn focus_gained(&mut self, now: i64) {
        self.window_focused = true;
        self.state = match std::mem::take(&mut self.state) {
            SessionState::Paused { domain, tab_id } => SessionState::Tracking {
                domain,
                tab_id,
                started_at: now,
            },
            other => other,
        };
    }

    /// Periodic flush. `attention` is true when a focused, non-minimized
    /// normal window exists or the popup is open.
    pub fn tick(&mut self, now: i64, attention: bool) -> Option<Flush> {
        if !attention {
            return None;
        }
        let flush = self.settle(now);
        if let SessionState::Tracking { started_at, .. } = &mut self.state {
            *started_at = now;
        }
        flush
    }

    /// Live view; elapsed is 0 unless tracking with the window focused.
    pub fn current_time(&self, now: i64) -> CurrentTime {
        let elapsed_ms = match &self.state {
            SessionState::Tracking { started_at, .. } if self.window_focused => {
                elapsed_since(*started_at, now).unwrap_or(0)
            }
            _ => 0,
        };
        CurrentTime {
            domain: self.state.domain().map(str::to_string),
            elapsed_ms,
            is_active: self.window_focused,
        }
    }
}
