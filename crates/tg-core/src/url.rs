//! URL utilities: domain extraction and query-string helpers
//!
//! Domains are the tracking and blocking key everywhere in the engine, so
//! every URL that enters the system goes through [`extract_domain`].

use url::{form_urlencoded, Url};

// =============================================================================
// Scheme
// =============================================================================

/// URL schemes the engine tracks and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// Fast scheme check without a full parse.
/// Returns None for anything other than http(s), including browser-internal pages.
#[inline]
pub fn extract_scheme(url: &str) -> Option<Scheme> {
    let bytes = url.trim_start().as_bytes();
    if bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
        Some(Scheme::Https)
    } else if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
        Some(Scheme::Http)
    } else {
        None
    }
}

// =============================================================================
// Domain Extraction
// =============================================================================

/// Strip a single leading `www.` label.
#[inline]
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Map a URL to its normalized domain: lowercased hostname without `www.`.
///
/// Returns None when the URL does not parse, is not http(s), or has no host.
pub fn extract_domain(url: &str) -> Option<String> {
    extract_scheme(url)?;
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let domain = strip_www(host.trim_end_matches('.'));
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_string())
}

/// Normalize user input that may be a bare domain or a full URL.
pub fn normalize_domain(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input.contains("://") {
        return extract_domain(input);
    }
    extract_domain(&format!("https://{}", input))
}

/// Hostname of any absolute URL, `www.` stripped, regardless of scheme.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(strip_www(host).to_string())
}

// =============================================================================
// Query Strings
// =============================================================================

/// Percent-encode a value for use in a query string.
pub fn encode_query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Look up a parameter in a query string (leading '?' optional) or a full URL.
pub fn query_param(input: &str, name: &str) -> Option<String> {
    let query = match input.find('?') {
        Some(pos) => &input[pos + 1..],
        None if input.contains("://") => return None,
        None => input,
    };
    let query = match query.find('#') {
        Some(pos) => &query[..pos],
        None => query,
    };

    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
