//! Foreground ↔ background message protocol
//!
//! Requests are JSON objects keyed by an `action` string; responses are flat
//! JSON objects. No failure crosses this boundary as an error: every failure
//! becomes `{success: false, error}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stats::SiteEntry;
use crate::types::TabId;

/// Every action the background context answers.
pub const ACTIONS: &[&str] = &[
    "getCurrentTime",
    "getSiteStats",
    "getOriginalBlockedUrl",
    "unblockAndOpen",
    "ping",
    "checkAllTabs",
    "getBlockedDomains",
    "getStats",
    "toggleBlock",
    "resetAllData",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetCurrentTime,
    GetSiteStats {
        domain: String,
    },
    GetOriginalBlockedUrl,
    UnblockAndOpen {
        domain: String,
        #[serde(default)]
        original_url: Option<String>,
    },
    Ping,
    CheckAllTabs,
    GetBlockedDomains,
    GetStats {
        #[serde(default)]
        page: Option<u32>,
    },
    ToggleBlock {
        domain: String,
    },
    ResetAllData,
}

impl Request {
    /// Parse a raw message. The error is the text sent back to the caller.
    pub fn from_value(message: &Value) -> Result<Self, String> {
        let action = message
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing action".to_string())?;
        if !ACTIONS.contains(&action) {
            return Err("unknown action".to_string());
        }
        serde_json::from_value(message.clone()).map_err(|e| format!("invalid {} request: {}", action, e))
    }
}

/// The page or tab a message came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    #[serde(default)]
    pub tab_id: Option<TabId>,
}

impl Sender {
    pub fn tab(tab_id: TabId) -> Self {
        Self { tab_id: Some(tab_id) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Response {
    CurrentTime {
        domain: Option<String>,
        current_time: u64,
        is_active: bool,
    },
    SiteStats {
        success: bool,
        domain: String,
        time_spent: u64,
    },
    OriginalUrl {
        success: bool,
        original_url: Option<String>,
        tab_id: Option<TabId>,
    },
    Ping {
        status: String,
        message: String,
        current_domain: Option<String>,
        is_tracking: bool,
        timestamp: i64,
    },
    Message {
        success: bool,
        message: String,
    },
    Blocked {
        success: bool,
        blocked: Vec<String>,
    },
    Toggled {
        success: bool,
        domain: String,
        blocked: bool,
    },
    Stats {
        success: bool,
        sites: Vec<SiteEntry>,
        page: u32,
        total_pages: u32,
        total_sites: usize,
        current_domain: Option<String>,
    },
    Done {
        success: bool,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl Response {
    pub fn done() -> Self {
        Response::Done { success: true }
    }

    pub fn failure(error: impl ToString) -> Self {
        Response::Failure {
            success: false,
            error: error.to_string(),
        }
    }

    /// `false` only for failure responses.
    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Failure { .. })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"success": false, "error": e.to_string()})
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            Request::from_value(&json!({"action": "getCurrentTime"})).unwrap(),
            Request::GetCurrentTime
        );
        assert_eq!(
            Request::from_value(&json!({"action": "unblockAndOpen", "domain": "foo.com", "originalUrl": null}))
                .unwrap(),
            Request::UnblockAndOpen {
                domain: "foo.com".into(),
                original_url: None
            }
        );
        assert_eq!(
            Request::from_value(&json!({"action": "unblockAndOpen", "domain": "foo.com", "originalUrl": "https://foo.com/x"}))
                .unwrap(),
            Request::UnblockAndOpen {
                domain: "foo.com".into(),
                original_url: Some("https://foo.com/x".into())
            }
        );
        assert_eq!(
            Request::from_value(&json!({"action": "getStats"})).unwrap(),
            Request::GetStats { page: None }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Request::from_value(&json!({"action": "launch"})).unwrap_err(), "unknown action");
        assert_eq!(Request::from_value(&json!({})).unwrap_err(), "missing action");
        assert!(Request::from_value(&json!({"action": "getSiteStats"}))
            .unwrap_err()
            .starts_with("invalid getSiteStats request"));
    }

    #[test]
    fn test_response_shapes() {
        let current = Response::CurrentTime {
            domain: Some("a.com".into()),
            current_time: 1500,
            is_active: true,
        };
        assert_eq!(current.to_value(), json!({"domain": "a.com", "currentTime": 1500, "isActive": true}));

        let original = Response::OriginalUrl {
            success: true,
            original_url: None,
            tab_id: Some(7),
        };
        assert_eq!(original.to_value(), json!({"success": true, "originalUrl": null, "tabId": 7}));

        let failure = Response::failure("boom");
        assert!(!failure.is_success());
        assert_eq!(failure.to_value(), json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_sender_from_json() {
        let sender: Sender = serde_json::from_value(json!({"tabId": 3})).unwrap();
        assert_eq!(sender, Sender::tab(3));
        let sender: Sender = serde_json::from_value(json!({})).unwrap();
        assert_eq!(sender.tab_id, None);
    }
}
