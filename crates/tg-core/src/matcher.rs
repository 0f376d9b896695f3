//! Blocked-domain matching
//!
//! This is the hot path for navigation enforcement: every top-level
//! navigation and tab update is checked against the in-memory cache, never the
//! persisted store. A domain `d` is blocked when the cache holds `d` itself or
//! any `p` such that `d` ends with `"." + p`. Matching walks the suffixes of
//! `d` from most to least specific and does one set lookup per label.

use std::collections::HashSet;

use crate::url::extract_domain;

// =============================================================================
// Suffix Walking
// =============================================================================

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator over a host and each of its parent domains.
pub struct DomainSuffixes<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for DomainSuffixes<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific.
pub fn walk_domain_suffixes(host: &str) -> DomainSuffixes<'_> {
    DomainSuffixes {
        current: if host.is_empty() { None } else { Some(host) },
    }
}

/// Reference predicate: `domain` equals `entry` or is a subdomain of it.
#[inline]
pub fn matches_entry(domain: &str, entry: &str) -> bool {
    if entry.is_empty() {
        return false;
    }
    domain == entry
        || (domain.len() > entry.len()
            && domain.ends_with(entry)
            && domain.as_bytes()[domain.len() - entry.len() - 1] == b'.')
}

// =============================================================================
// Blocked Domains Cache
// =============================================================================

/// In-memory mirror of the persisted blocked list.
#[derive(Debug, Clone, Default)]
pub struct BlockedDomains {
    entries: HashSet<String>,
}

impl BlockedDomains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from the persisted list.
    pub fn from_list(list: &[String]) -> Self {
        let mut cache = Self::new();
        cache.replace(list);
        cache
    }

    /// Replace the whole cache with the given list.
    pub fn replace(&mut self, list: &[String]) {
        self.entries.clear();
        self.entries
            .extend(list.iter().filter(|d| !d.is_empty()).map(|d| d.to_ascii_lowercase()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted copy of the entries.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.entries.iter().cloned().collect();
        entries.sort();
        entries
    }

    /// The most specific cache entry that blocks `domain`, if any.
    pub fn blocking_entry(&self, domain: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        walk_domain_suffixes(domain).find_map(|suffix| self.entries.get(suffix).map(String::as_str))
    }

    /// Whether `domain` is blocked (exact or subdomain match).
    #[inline]
    pub fn is_blocked(&self, domain: &str) -> bool {
        self.blocking_entry(domain).is_some()
    }

    /// Domain of `url` if that domain is blocked.
    pub fn blocked_domain_of(&self, url: &str) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        extract_domain(url).filter(|domain| self.is_blocked(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(entries: &[&str]) -> BlockedDomains {
        let list: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        BlockedDomains::from_list(&list)
    }

    #[test]
    fn test_get_parent_domain() {
        assert_eq!(get_parent_domain("sub.example.com"), Some("example.com"));
        assert_eq!(get_parent_domain("example.com"), Some("com"));
        assert_eq!(get_parent_domain("com"), None);
        assert_eq!(get_parent_domain("com."), None);
        assert_eq!(get_parent_domain(""), None);
    }

    #[test]
    fn test_walk_domain_suffixes() {
        let suffixes: Vec<&str> = walk_domain_suffixes("a.b.example.com").collect();
        assert_eq!(suffixes, vec!["a.b.example.com", "b.example.com", "example.com", "com"]);
        assert_eq!(walk_domain_suffixes("").count(), 0);
    }

    #[test]
    fn test_subdomain_inclusive_matching() {
        let blocked = cache(&["example.com"]);
        assert!(blocked.is_blocked("example.com"));
        assert!(blocked.is_blocked("sub.example.com"));
        assert!(blocked.is_blocked("deep.sub.example.com"));
        assert!(!blocked.is_blocked("notexample.com"));
        assert!(!blocked.is_blocked("example.com.evil.net"));
        assert!(!blocked.is_blocked("com"));
    }

    #[test]
    fn test_blocking_entry_prefers_most_specific() {
        let blocked = cache(&["example.com", "sub.example.com"]);
        assert_eq!(blocked.blocking_entry("x.sub.example.com"), Some("sub.example.com"));
        assert_eq!(blocked.blocking_entry("other.example.com"), Some("example.com"));
    }

    #[test]
    fn test_matches_entry_agrees_with_cache() {
        let entries = ["foo.com", "bar.co.uk", "x.y.z"];
        let blocked = cache(&entries);
        let probes = [
            "foo.com", "a.foo.com", "afoo.com", "foo.co", "bar.co.uk", "www2.bar.co.uk",
            "co.uk", "y.z", "w.x.y.z", "xx.y.z",
        ];
        for probe in probes {
            let expected = entries.iter().any(|e| matches_entry(probe, e));
            assert_eq!(blocked.is_blocked(probe), expected, "probe {}", probe);
        }
    }

    #[test]
    fn test_blocked_domain_of_url() {
        let blocked = cache(&["foo.com"]);
        assert_eq!(blocked.blocked_domain_of("https://www.foo.com/page"), Some("foo.com".to_string()));
        assert_eq!(blocked.blocked_domain_of("https://m.foo.com/"), Some("m.foo.com".to_string()));
        assert_eq!(blocked.blocked_domain_of("https://bar.com/"), None);
        assert_eq!(blocked.blocked_domain_of("chrome://settings"), None);
    }

    #[test]
    fn test_replace_and_empty_entries() {
        let mut blocked = cache(&["a.com", ""]);
        assert_eq!(blocked.len(), 1);
        blocked.replace(&["B.com".to_string()]);
        assert!(!blocked.is_blocked("a.com"));
        assert!(blocked.is_blocked("b.com"));
        assert_eq!(blocked.to_sorted_vec(), vec!["b.com".to_string()]);
    }
}
