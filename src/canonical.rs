//! URL canonicalizer.
//!
//! A pure transformation used everywhere as the frontier's dedup key.
//! Parsing failures return the input unchanged — canonicalization never
//! invents an error type, because the dedup key still has to exist for a
//! URL the rest of the system can't otherwise make sense of.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left unescaped when re-encoding canonical query keys/values.
/// Mirrors the common "unreserved" set (RFC 3986 §2.3) plus the characters
/// `form_urlencoded` already decoded them out of, so round-tripping a
/// typical query string doesn't escape things a browser wouldn't.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Canonicalize a raw URL using the default (case-preserving path) rules.
pub fn canonicalize(raw: &str) -> String {
    canonicalize_with(raw, false)
}

/// Canonicalize a raw URL, optionally lowercasing the path as well — a
/// config-driven normalization switch for hosts that treat paths
/// case-insensitively.
pub fn canonicalize_with(raw: &str, lowercase_path: bool) -> String {
    let parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return raw.to_string(),
    };

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = match parsed.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return raw.to_string(),
    };

    // `url::Url` already elides the default port for known schemes on
    // parse, so any port left on `parsed` is non-default and must be kept.
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };

    let mut path = parsed.path().to_string();
    if path.is_empty() {
        path = "/".to_string();
    }
    path = uppercase_percent_hex(&path);
    if lowercase_path {
        path = uppercase_percent_hex(&path.to_ascii_lowercase());
    }
    if path != "/" && path.ends_with('/') {
        path.pop();
    }

    let query_suffix = parsed
        .query()
        .map(canonicalize_query)
        .filter(|q| !q.is_empty())
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    format!("{scheme}://{authority}{path}{query_suffix}")
}

/// Uppercase the two hex digits of every `%HH` escape, leaving everything
/// else (including non-hex `%` occurrences) untouched.
fn uppercase_percent_hex(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() && is_hex(bytes[i + 1]) && is_hex(bytes[i + 2])
        {
            out.push('%');
            out.push(bytes[i + 1].to_ascii_uppercase() as char);
            out.push(bytes[i + 2].to_ascii_uppercase() as char);
            i += 3;
        } else {
            // Safe: we only ever step one UTF-8 scalar at a time via chars
            // below when not matching a percent escape.
            let ch_len = utf8_char_len(bytes[i]);
            out.push_str(std::str::from_utf8(&bytes[i..i + ch_len]).unwrap_or(""));
            i += ch_len;
        }
    }
    out
}

fn utf8_char_len(b: u8) -> usize {
    if b & 0x80 == 0 {
        1
    } else if b & 0xE0 == 0xC0 {
        2
    } else if b & 0xF0 == 0xE0 {
        3
    } else if b & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

fn is_hex(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

/// Normalize a raw query string: drop empty keys/values, sort keys, sort
/// values within a repeated key, percent-encode with uppercase hex.
fn canonicalize_query(raw_query: &str) -> String {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    pairs
        .into_iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(&k, QUERY_ENCODE_SET),
                utf8_percent_encode(&v, QUERY_ENCODE_SET),
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            canonicalize("HTTPS://EXAMPLE.COM/path"),
            "https://example.com/path"
        );
    }

    #[test]
    fn strips_default_ports_preserves_others() {
        assert_eq!(canonicalize("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(canonicalize("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(
            canonicalize("http://example.com:8080/a"),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn empty_path_becomes_root() {
        assert_eq!(canonicalize("https://example.com"), "https://example.com/");
    }

    #[test]
    fn uppercases_percent_hex_in_path() {
        assert_eq!(canonicalize("https://example.com/a%2fb"), "https://example.com/a%2Fb");
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(canonicalize("https://example.com/path/"), "https://example.com/path");
        assert_eq!(canonicalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn drops_fragment() {
        assert_eq!(
            canonicalize("https://example.com/path#section"),
            "https://example.com/path"
        );
    }

    #[test]
    fn sorts_query_keys_and_drops_empties() {
        assert_eq!(
            canonicalize("https://example.com/path?z=3&a=1&b=2&empty=&=novalue"),
            "https://example.com/path?a=1&b=2&z=3"
        );
    }

    #[test]
    fn sorts_repeated_key_values() {
        assert_eq!(
            canonicalize("https://example.com/p?k=banana&k=apple"),
            "https://example.com/p?k=apple&k=banana"
        );
    }

    #[test]
    fn combines_all_normalization_rules_at_once() {
        assert_eq!(
            canonicalize("HTTPS://EXAMPLE.COM:443/PATH/?z=3&a=1&b=2#frag"),
            "https://example.com/PATH?a=1&b=2&z=3"
        );
    }

    #[test]
    fn dedup_across_query_order() {
        let a = canonicalize("https://ex.com/p?b=2&a=1");
        let b = canonicalize("https://ex.com/p?a=1&b=2");
        assert_eq!(a, b);
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "HTTPS://EXAMPLE.COM:443/PATH/?z=3&a=1&b=2#frag",
            "http://a.com/x/y/z?q=1",
            "https://a.com",
            "not a url at all",
        ];
        for input in inputs {
            let once = canonicalize(input);
            let twice = canonicalize(&once);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn unparseable_input_is_returned_unchanged() {
        assert_eq!(canonicalize("not a url at all"), "not a url at all");
    }

    #[test]
    fn space_plus_and_percent20_are_equivalent() {
        let a = canonicalize("https://ex.com/p?q=a+b");
        let b = canonicalize("https://ex.com/p?q=a%20b");
        assert_eq!(a, b);
    }

    #[test]
    fn lowercase_path_switch_reuppercases_hex() {
        assert_eq!(
            canonicalize_with("https://example.com/PATH%2Fmore", true),
            "https://example.com/path%2Fmore"
        );
    }
}
