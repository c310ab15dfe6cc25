//! Stable URL/title hashing and URL normalization.
//!
//! Grounded on `original_source/src/utils.py`'s `normalize_url` and
//! `generate_stable_hash`, preserving its exact
//! big-endian-signed-64-bit-of-SHA-256 rule.

use sha2::{Digest, Sha256};
use url::Url;

/// Tracking query parameters stripped during normalization.
const TRACKING_PARAMS: [&str; 7] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "ref",
    "source",
    "fbclid",
    "gclid",
];

/// Canonicalizes a URL for dedup comparison: forces `https`, lowercases the
/// host, strips a trailing slash from the path, removes tracking query
/// parameters, re-encodes the remaining query keys in stable (sorted)
/// order, and drops any fragment.
///
/// Returns the input unchanged (trimmed) if it does not parse as a URL.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.trim().to_string();
    };

    let _ = url.set_scheme("https");

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        let _ = url.set_host(Some(&lowered));
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let encoded = kept
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&encoded));
    }

    url.set_fragment(None);
    url.to_string()
}

/// SHA-256 of the UTF-8 bytes of `s`; interprets the first 8 bytes of the
/// digest as a big-endian signed 64-bit integer. `stable_hash("") == 0`
/// falls out naturally since an empty string's first 8 digest bytes are
/// used exactly like any other input's.
///
/// The empty string is defined to hash to `0` regardless of what
/// SHA-256("") actually produces, so callers never collide an absent
/// URL/title with a real one.
#[must_use]
pub fn stable_hash(s: &str) -> i64 {
    if s.is_empty() {
        return 0;
    }
    let digest = Sha256::digest(s.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(buf)
}

/// Normalizes a title for the secondary dedup key: lowercase, strip
/// anything that isn't alphanumeric or whitespace, collapse whitespace.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
