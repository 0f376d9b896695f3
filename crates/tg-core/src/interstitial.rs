//! Interstitial page helpers
//!
//! The blocked page must always be able to show something and always offer a
//! way forward, even when messaging to the background context fails.

use crate::types::SiteMap;
use crate::url::{host_of, query_param};

/// Domain the interstitial page should show, by preference: the `domain`
/// query parameter, the referrer's host (unless the referrer is itself the
/// interstitial page), then the session and local fallbacks.
pub fn resolve_blocked_domain(
    page_url: &str,
    referrer: Option<&str>,
    session_fallback: Option<&str>,
    local_fallback: Option<&str>,
    interstitial_page: &str,
) -> Option<String> {
    if let Some(domain) = query_param(page_url, "domain") {
        return Some(domain);
    }

    let from_referrer = referrer
        .filter(|r| !r.is_empty() && !r.contains(interstitial_page))
        .and_then(host_of);
    if from_referrer.is_some() {
        return from_referrer;
    }

    [session_fallback, local_fallback]
        .into_iter()
        .flatten()
        .find(|d| !d.is_empty())
        .map(str::to_string)
}

/// Result of looking up time spent for a blocked domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteLookup {
    Found { domain: String, time: u64 },
    /// No exact record; a record whose key overlaps the domain was used.
    Similar { domain: String, time: u64 },
    NotFound,
}

impl SiteLookup {
    pub fn time(&self) -> Option<u64> {
        match self {
            SiteLookup::Found { time, .. } | SiteLookup::Similar { time, .. } => Some(*time),
            SiteLookup::NotFound => None,
        }
    }
}

/// Exact lookup, falling back to the first key that contains `domain` or is
/// contained in it.
pub fn lookup_time_spent(sites: &SiteMap, domain: &str) -> SiteLookup {
    if domain.is_empty() {
        return SiteLookup::NotFound;
    }
    if let Some(record) = sites.get(domain) {
        return SiteLookup::Found {
            domain: domain.to_string(),
            time: record.time,
        };
    }
    sites
        .iter()
        .find(|(key, _)| key.contains(domain) || domain.contains(key.as_str()))
        .map_or(SiteLookup::NotFound, |(key, record)| SiteLookup::Similar {
            domain: key.clone(),
            time: record.time,
        })
}

/// Where to send the user when the unblock message path fails.
pub fn unblock_fallback_url(domain: &str, original_url: Option<&str>) -> String {
    match original_url.filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => format!("https://{}", domain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SiteRecord;

    const PAGE: &str = "blocked.html";

    #[test]
    fn test_resolve_prefers_query() {
        let got = resolve_blocked_domain(
            "chrome-extension://x/blocked.html?domain=foo.com",
            Some("https://www.bar.com/"),
            Some("baz.com"),
            None,
            PAGE,
        );
        assert_eq!(got.as_deref(), Some("foo.com"));
    }

    #[test]
    fn test_resolve_from_referrer() {
        let got = resolve_blocked_domain(
            "chrome-extension://x/blocked.html",
            Some("https://www.bar.com/x"),
            None,
            None,
            PAGE,
        );
        assert_eq!(got.as_deref(), Some("bar.com"));
    }

    #[test]
    fn test_resolve_skips_self_referrer_and_empty() {
        let got = resolve_blocked_domain(
            "chrome-extension://x/blocked.html?domain=",
            Some("chrome-extension://x/blocked.html?domain=a.com"),
            Some(""),
            Some("local.com"),
            PAGE,
        );
        assert_eq!(got.as_deref(), Some("local.com"));
        assert_eq!(resolve_blocked_domain("blocked.html", None, None, None, PAGE), None);
    }

    #[test]
    fn test_lookup_exact_similar_missing() {
        let mut sites = SiteMap::new();
        let mut record = SiteRecord::new("m.foo.com", "");
        record.time = 42;
        sites.insert("m.foo.com".into(), record);

        assert_eq!(lookup_time_spent(&sites, "m.foo.com").time(), Some(42));
        assert_eq!(
            lookup_time_spent(&sites, "foo.com"),
            SiteLookup::Similar {
                domain: "m.foo.com".into(),
                time: 42
            }
        );
        assert_eq!(lookup_time_spent(&sites, "bar.com"), SiteLookup::NotFound);
        assert_eq!(lookup_time_spent(&sites, ""), SiteLookup::NotFound);
    }

    #[test]
    fn test_fallback_url() {
        assert_eq!(unblock_fallback_url("foo.com", None), "https://foo.com");
        assert_eq!(unblock_fallback_url("foo.com", Some("")), "https://foo.com");
        assert_eq!(unblock_fallback_url("foo.com", Some("https://foo.com/p")), "https://foo.com/p");
    }
}
