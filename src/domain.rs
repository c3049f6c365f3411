//! Domain normalization.
//!
//! Key derivation and the anti-phishing check both go through
//! [`normalize`]; if the two ever disagreed, a relayed challenge could be
//! signed with the victim site's key.

use url::Url;

/// Opaque origin sent by browsers for sandboxed frames and `file:` pages
const OPAQUE_ORIGIN: &str = "null";

/// Normalize a request origin, URL or bare host into a comparable domain.
///
/// - inputs with a scheme (`https://...`) are parsed as URLs and reduced to the host
/// - anything else is treated as a bare host
/// - a single leading `www.` label is stripped
/// - the result is lower-cased
///
/// Returns an empty string when there is no host to bind to (unparseable
/// URLs, host-less schemes such as `file:///...`, the opaque `null` origin).
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();

    let host = if trimmed.contains("://") {
        match Url::parse(trimmed).ok().and_then(|url| url.host_str().map(str::to_string)) {
            Some(host) => host,
            None => return String::new(),
        }
    } else if trimmed.eq_ignore_ascii_case(OPAQUE_ORIGIN) {
        return String::new();
    } else {
        trimmed.to_string()
    };

    let host = host.to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}
