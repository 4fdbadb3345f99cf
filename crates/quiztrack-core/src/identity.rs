use sha2::{Digest, Sha256};
use url::Url;

/// Site every unresolvable request is attributed to.
pub const UNKNOWN_SITE: &str = "unknown";

/// One-way fingerprint of a client IP.
///
/// Formula: sha256(salt + ip)[0..8] encoded as 16 hex chars. Only the digest
/// is stored; it is used as the rate-limit key.
pub fn hash_ip(salt: &str, ip: &str) -> String {
    let hash = Sha256::digest(format!("{salt}{ip}").as_bytes());
    hex::encode(&hash[..8])
}

/// Pick the best-effort domain hint for a tracking request.
///
/// Precedence: explicit `site` field, `Origin`, `Referer`, `Host`. Browsers
/// send `Origin: null` from sandboxed frames, so that value is skipped.
pub fn pick_domain_hint(
    explicit: Option<&str>,
    origin: Option<&str>,
    referer: Option<&str>,
    host: Option<&str>,
) -> String {
    [explicit, origin.filter(|o| *o != "null"), referer, host]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SITE)
        .to_string()
}

/// Reduce a URL, origin or bare host to the canonical site domain.
///
/// Strips scheme, credentials, port, path, query, a trailing dot and a leading
/// `www.`, then lowercases. Anything that does not parse to a host becomes
/// [`UNKNOWN_SITE`].
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNKNOWN_SITE.to_string();
    }

    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("http://{trimmed}"))
    };

    let Some(host) = parsed.ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return UNKNOWN_SITE.to_string();
    };

    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        UNKNOWN_SITE.to_string()
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_hash_is_16_hex_chars() {
        let h = hash_ip("salt", "1.2.3.4");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!h.contains("1.2.3.4"));
    }

    #[test]
    fn ip_hash_depends_on_salt() {
        assert_eq!(hash_ip("a", "1.2.3.4"), hash_ip("a", "1.2.3.4"));
        assert_ne!(hash_ip("a", "1.2.3.4"), hash_ip("b", "1.2.3.4"));
    }

    #[test]
    fn normalize_full_url() {
        assert_eq!(
            normalize_domain("https://www.Example.com:8443/quiz?id=1"),
            "example.com"
        );
    }

    #[test]
    fn normalize_bare_host_and_trailing_dot() {
        assert_eq!(normalize_domain("x.com"), "x.com");
        assert_eq!(normalize_domain("X.COM."), "x.com");
        assert_eq!(normalize_domain("x.com/landing"), "x.com");
    }

    #[test]
    fn normalize_garbage_degrades_to_unknown() {
        assert_eq!(normalize_domain(""), UNKNOWN_SITE);
        assert_eq!(normalize_domain("   "), UNKNOWN_SITE);
        assert_eq!(normalize_domain("http://"), UNKNOWN_SITE);
    }

    #[test]
    fn hint_precedence() {
        assert_eq!(
            pick_domain_hint(Some("a.com"), Some("https://b.com"), None, Some("c.com")),
            "a.com"
        );
        assert_eq!(
            pick_domain_hint(None, Some("null"), Some("https://r.com/p"), Some("c.com")),
            "https://r.com/p"
        );
        assert_eq!(pick_domain_hint(Some(" "), None, None, Some("c.com")), "c.com");
        assert_eq!(pick_domain_hint(None, None, None, None), UNKNOWN_SITE);
    }
}
