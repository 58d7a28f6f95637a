//! Fence info-string parsing.
//!
//! Splits an info string like `js {.line-numbers cmd=true}` into a language
//! and an attribute map, and normalizes both for downstream consumers.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::attributes::{AttributeMap, parse_attributes};

static BRACED_INFO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\s{]*)\s*\{(.*?)\}").expect("braced info regex"));
static UNBRACED_INFO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(.+?)$").expect("unbraced info regex"));

/// Language plus attributes decoded from a fence info string.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BlockInfo {
    /// Language token; empty when the info string carried none.
    pub language: String,
    /// Parsed attribute map (empty on any attribute-syntax failure).
    pub attributes: AttributeMap,
}

/// Parses a raw fence info string into a [`BlockInfo`].
///
/// A `{...}` body is split off with the language prefix; otherwise the first
/// whitespace run separates language from an unbraced attribute body. Never
/// fails: an unparsable attribute body yields an empty map.
pub fn parse_block_info(raw: &str) -> BlockInfo {
    let trimmed = raw.trim();

    let captures = if trimmed.contains('{') {
        BRACED_INFO_RE.captures(trimmed)
    } else {
        UNBRACED_INFO_RE.captures(trimmed)
    };

    let (language, attribute_body) = match captures {
        Some(caps) => {
            let language = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            (language.to_string(), body)
        }
        None => (trimmed.to_string(), ""),
    };

    let attributes = if attribute_body.is_empty() {
        AttributeMap::new()
    } else {
        parse_attributes(attribute_body)
    };

    BlockInfo {
        language,
        attributes,
    }
}

/// Rewrites a key to snake_case: `lineNumbers`, `line-numbers`, and
/// `Line Numbers` all become `line_numbers`.
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut prev_lower_or_digit = false;
    let mut pending_separator = false;

    for ch in key.chars() {
        if matches!(ch, '-' | '_' | ' ') {
            pending_separator = !out.is_empty();
            prev_lower_or_digit = false;
            continue;
        }
        if ch.is_uppercase() {
            if prev_lower_or_digit {
                pending_separator = true;
            }
            prev_lower_or_digit = false;
        } else {
            prev_lower_or_digit = ch.is_ascii_alphanumeric();
        }
        if pending_separator {
            out.push('_');
            pending_separator = false;
        }
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }

    out
}

/// Snake-cases every attribute key. Returns `Cow::Borrowed` when all keys are
/// already normalized.
pub fn normalize_attribute_keys(attributes: &AttributeMap) -> Cow<'_, AttributeMap> {
    let changed = attributes.keys().any(|key| snake_case(key) != *key);
    if !changed {
        return Cow::Borrowed(attributes);
    }

    let mut normalized = AttributeMap::with_capacity(attributes.len());
    for (key, value) in attributes {
        normalized.insert(snake_case(key), value.clone());
    }
    Cow::Owned(normalized)
}

/// Lower-cases and trims the language, snake-cases attribute keys. Returns
/// `Cow::Borrowed` when nothing changed so callers can cheaply detect a no-op.
pub fn normalize_block_info(info: &BlockInfo) -> Cow<'_, BlockInfo> {
    let normalized_language = info.language.trim().to_lowercase();
    let normalized_attributes = normalize_attribute_keys(&info.attributes);

    if normalized_language == info.language && matches!(normalized_attributes, Cow::Borrowed(_)) {
        return Cow::Borrowed(info);
    }

    Cow::Owned(BlockInfo {
        language: normalized_language,
        attributes: normalized_attributes.into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeValue;

    #[test]
    fn braced_info_splits_language_and_attributes() {
        let info = parse_block_info("js {.line-numbers cmd=true}");
        assert_eq!(info.language, "js");
        assert_eq!(
            info.attributes.get("class"),
            Some(&AttributeValue::String("line-numbers".into()))
        );
        assert_eq!(info.attributes.get("cmd"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn unbraced_info_splits_on_whitespace() {
        let info = parse_block_info("python foo=bar");
        assert_eq!(info.language, "python");
        assert_eq!(
            info.attributes.get("foo"),
            Some(&AttributeValue::String("bar".into()))
        );
    }

    #[test]
    fn bare_language_only() {
        let info = parse_block_info("  rust  ");
        assert_eq!(info.language, "rust");
        assert!(info.attributes.is_empty());
    }

    #[test]
    fn braces_without_language() {
        let info = parse_block_info("{cmd=true}");
        assert_eq!(info.language, "");
        assert_eq!(info.attributes.get("cmd"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn empty_info_string() {
        let info = parse_block_info("");
        assert_eq!(info.language, "");
        assert!(info.attributes.is_empty());
    }

    #[test]
    fn snake_case_variants() {
        assert_eq!(snake_case("lineNumbers"), "line_numbers");
        assert_eq!(snake_case("line-numbers"), "line_numbers");
        assert_eq!(snake_case("Line Numbers"), "line_numbers");
        assert_eq!(snake_case("depth_from"), "depth_from");
        assert_eq!(snake_case("ID"), "id");
    }

    #[test]
    fn normalize_is_noop_when_already_normalized() {
        let info = parse_block_info("js {depth_from=1}");
        assert!(matches!(normalize_block_info(&info), Cow::Borrowed(_)));
    }

    #[test]
    fn normalize_lowercases_language_and_keys() {
        let info = parse_block_info("JS {lineNumbers=true}");
        let normalized = normalize_block_info(&info);
        assert!(matches!(normalized, Cow::Owned(_)));
        assert_eq!(normalized.language, "js");
        assert_eq!(
            normalized.attributes.get("line_numbers"),
            Some(&AttributeValue::Bool(true))
        );
        assert!(normalized.attributes.get("lineNumbers").is_none());
    }

    #[test]
    fn serializes_to_plain_json() {
        let info = parse_block_info("js {cmd=true width=3}");
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(
            json,
            r#"{"language":"js","attributes":{"cmd":true,"width":3.0}}"#
        );
    }
}
