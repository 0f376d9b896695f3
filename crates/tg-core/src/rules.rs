//! Declarative redirect rules
//!
//! One rule per blocked domain, in blocked-list order, with `id = index + 1`.
//! Ids are re-assigned on every rebuild and are not stable. Each rule
//! redirects top-level navigations to the domain (or any subdomain) to the
//! interstitial page. The JSON shape is the browser's dynamic rule format.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Priority of every generated rule.
pub const REDIRECT_PRIORITY: u32 = 1;

// =============================================================================
// Rule Shape
// =============================================================================

/// Action type of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleActionType {
    Block,
    Redirect,
    Allow,
    UpgradeScheme,
    ModifyHeaders,
    AllowAllRequests,
}

/// Redirect target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: RuleActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

/// Resource types a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    /// Matches the listed domains and all their subdomains
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<ResourceType>,
}

/// A single dynamic rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub id: u32,
    #[serde(default = "default_priority")]
    pub priority: u32,
    pub action: RuleAction,
    #[serde(default)]
    pub condition: RuleCondition,
}

fn default_priority() -> u32 {
    REDIRECT_PRIORITY
}

impl BlockRule {
    /// Redirect top-level navigations to `domain` and its subdomains to the interstitial page.
    pub fn redirect_to_interstitial(id: u32, domain: &str, config: &Config) -> Self {
        Self {
            id,
            priority: REDIRECT_PRIORITY,
            action: RuleAction {
                kind: RuleActionType::Redirect,
                redirect: Some(Redirect {
                    extension_path: Some(config.interstitial_path(domain)),
                    url: None,
                }),
            },
            condition: RuleCondition {
                request_domains: vec![domain.to_string()],
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    /// The domain this rule blocks, when it was generated from the blocked list.
    pub fn domain(&self) -> Option<&str> {
        match self.condition.request_domains.as_slice() {
            [domain] => Some(domain.as_str()),
            _ => None,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Build the full rule set for a blocked list. Ids are 1-based list positions.
pub fn build_rule_set(blocked: &[String], config: &Config) -> Vec<BlockRule> {
    blocked
        .iter()
        .enumerate()
        .map(|(index, domain)| BlockRule::redirect_to_interstitial(index as u32 + 1, domain, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_rule_set_ids() {
        let blocked = vec!["foo.com".to_string(), "bar.com".to_string()];
        let rules = build_rule_set(&blocked, &Config::default());
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, 1);
        assert_eq!(rules[0].domain(), Some("foo.com"));
        assert_eq!(rules[1].id, 2);
        assert_eq!(rules[1].domain(), Some("bar.com"));
    }

    #[test]
    fn test_empty_list_builds_no_rules() {
        assert!(build_rule_set(&[], &Config::default()).is_empty());
    }

    #[test]
    fn test_rule_json_shape() {
        let rule = BlockRule::redirect_to_interstitial(1, "foo.com", &Config::default());
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({
                "id": 1,
                "priority": 1,
                "action": {
                    "type": "redirect",
                    "redirect": { "extensionPath": "/blocked.html?domain=foo.com" }
                },
                "condition": {
                    "requestDomains": ["foo.com"],
                    "resourceTypes": ["main_frame"]
                }
            })
        );
    }

    #[test]
    fn test_parse_rule_from_browser() {
        let rule: BlockRule = serde_json::from_value(json!({
            "id": 9,
            "action": { "type": "block" },
            "condition": { "urlFilter": "||ads.example^", "resourceTypes": ["script"] }
        }))
        .unwrap();
        assert_eq!(rule.id, 9);
        assert_eq!(rule.priority, REDIRECT_PRIORITY);
        assert_eq!(rule.action.kind, RuleActionType::Block);
        assert_eq!(rule.condition.resource_types, vec![ResourceType::Other]);
        assert_eq!(rule.domain(), None);
    }
}
