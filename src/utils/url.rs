// src/utils/url.rs

//! URL manipulation utilities.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|(\d+));").unwrap());

static CONTENT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"id=([a-f0-9]+)").unwrap());

/// Decode numeric and the common named HTML entities.
///
/// # Examples
/// ```
/// use assignment_sync::utils::url::decode_html_entities;
///
/// assert_eq!(
///     decode_html_entities("https&#x3a;&#x2f;&#x2f;a.example/x?a=1&amp;b=2"),
///     "https://a.example/x?a=1&b=2"
/// );
/// ```
pub fn decode_html_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Drop an explicit `:443` port before the path.
pub fn strip_port_443(url: &str) -> String {
    if url.contains(":443/") {
        url.replacen(":443/", "/", 1)
    } else if let Some(stripped) = url.strip_suffix(":443") {
        stripped.to_string()
    } else {
        url.to_string()
    }
}

/// Attach a path to an origin unless it is already absolute.
///
/// # Examples
/// ```
/// use assignment_sync::utils::url::with_origin;
///
/// assert_eq!(
///     with_origin("/webclass/", "https://lms.example.ac.jp/"),
///     "https://lms.example.ac.jp/webclass/"
/// );
/// ```
pub fn with_origin(href: &str, origin: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let origin = origin.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        format!("{origin}/{href}")
    }
}

/// Resolve a potentially relative URL against a base URL.
pub fn resolve(base: &str, href: &str) -> String {
    url::Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract the hexadecimal content ID from a portal link.
pub fn extract_content_id(href: &str) -> Option<String> {
    CONTENT_ID.captures(href).map(|caps| caps[1].to_string())
}
