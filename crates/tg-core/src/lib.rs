//! TimeGuard Core Library
//!
//! This crate provides the tracking and blocking engine for the TimeGuard
//! browser extension. It has no browser or OS dependency: storage, tabs,
//! windows, the declarative rule engine and the clock are traits, implemented
//! over `chrome.*` by `tg-wasm` and in memory here for the CLI and tests.
//!
//! # Architecture
//!
//! A single [`Background`] service owns all state. Browser lifecycle events
//! drive the session tracker (time accounting) and the navigation interceptor
//! (block enforcement). The rule synchronizer mirrors the persisted blocked
//! list into an in-memory cache and the browser's dynamic rule set, except
//! while an unblock transaction holds its suppression guard.
//!
//! Execution is single-threaded and cooperative; futures are not `Send`.
//!
//! # Modules
//!
//! - `url`: Domain extraction and query-string helpers
//! - `types`: Shared type definitions
//! - `config`: Runtime configuration
//! - `error`: Error types per external seam
//! - `clock`: Wall-clock seam
//! - `store`: Typed key-value storage with serialized writes
//! - `browser`: Tab, window and rule-engine seams
//! - `matcher`: Blocked-domain matching
//! - `rules`: Declarative redirect rule builder
//! - `tracker`: Activity session state machine
//! - `sync`: Blocked list → rule synchronization and suppression
//! - `intercept`: Navigation interceptor
//! - `background`: The background service
//! - `messages`: Foreground message protocol
//! - `stats`: Ranking, paging and time formatting
//! - `interstitial`: Blocked-page helpers
//! - `sim`: Simulated browser
//! - `replay`: Recorded event replay

pub mod background;
pub mod browser;
pub mod clock;
pub mod config;
pub mod error;
pub mod intercept;
pub mod interstitial;
pub mod matcher;
pub mod messages;
pub mod replay;
pub mod rules;
pub mod sim;
pub mod stats;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use background::Background;
pub use browser::{Browser, NoRuleEngine, RuleEngine};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{BrowserError, Error, Result, RuleEngineError, StoreError};
pub use matcher::BlockedDomains;
pub use messages::{Request, Response, Sender};
pub use rules::{build_rule_set, BlockRule};
pub use stats::{format_clock, format_spent, SiteStats, SpentTime};
pub use store::{MemoryStore, Storage, StorageArea, StorageChange};
pub use tracker::{SessionState, SessionTracker};
pub use types::{SiteRecord, SitesPerPage, Tab, TabId, Window, WindowId};
pub use url::extract_domain;
