//! Brace-delimited attribute mini-language.
//!
//! Parses bodies like `{#identifier .class1 .class2 key1=value1 key2=[1, 2]}`
//! into an insertion-ordered map. Parsing is total: unrecognized characters
//! are skipped one at a time, so any input yields a map.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// Maximum nesting depth for `[...]` arrays. Deeper openers are treated as
/// unrecognized characters and skipped.
const MAX_ARRAY_DEPTH: usize = 32;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean flag or normalized `true`/`false` word.
    Bool(bool),
    /// Word that parsed as a float.
    Number(f64),
    /// Quoted string, parenthesized blob, or plain word.
    String(String),
    /// `[...]` array, possibly nested.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Returns the string content when the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Loose truthiness, matching how option flags are interpreted:
    /// `false`, `0`, the empty string, and the empty array are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            AttributeValue::Bool(b) => *b,
            AttributeValue::Number(n) => *n != 0.0,
            AttributeValue::String(s) => !s.is_empty(),
            AttributeValue::Array(items) => !items.is_empty(),
        }
    }
}

impl fmt::Display for AttributeValue {
    /// String coercion used when interpolating values into markup
    /// (`width="100"`, `checked="true"`); arrays join with commas.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

/// Ordered attribute map. Keys are unique; later bindings overwrite earlier
/// ones in place, so insertion order is stable for serialization.
pub type AttributeMap = IndexMap<String, AttributeValue>;

/// What kind of node an extractor produced. Only words undergo value
/// normalization; quoted strings and parenthesized blobs stay verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    QuotedString,
    ParenBlob,
    Word,
    Array,
}

struct Node {
    value: AttributeValue,
    end: usize,
    kind: NodeKind,
}

/// `true`/`false` (case-insensitive) become booleans, floats become numbers,
/// anything else stays a string.
fn normalize_value(word: &str) -> AttributeValue {
    if word.eq_ignore_ascii_case("true") {
        return AttributeValue::Bool(true);
    }
    if word.eq_ignore_ascii_case("false") {
        return AttributeValue::Bool(false);
    }
    if let Ok(number) = word.parse::<f64>() {
        return AttributeValue::Number(number);
    }
    AttributeValue::String(word.to_string())
}

/// `(...)` blob: balanced-depth scan, kept verbatim including the parens.
/// An unbalanced blob runs to end of input.
fn extract_paren_blob(chars: &[char], start: usize) -> Option<Node> {
    if chars.get(start) != Some(&'(') {
        return None;
    }
    let mut depth = 1usize;
    let mut end = start + 1;
    while end < chars.len() {
        match chars[end] {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        end += 1;
        if depth == 0 {
            break;
        }
    }
    let blob: String = chars[start..end].iter().collect();
    Some(Node {
        value: AttributeValue::String(blob),
        end,
        kind: NodeKind::ParenBlob,
    })
}

/// Quoted string with `'`, `"`, or backtick delimiter. Backslash escapes the
/// next character; an unterminated quote reads to end of input.
fn extract_quoted(chars: &[char], start: usize) -> Option<Node> {
    let quote = *chars.get(start)?;
    if !matches!(quote, '\'' | '"' | '`') {
        return None;
    }
    let mut end = start + 1;
    let mut content = String::new();
    while end < chars.len() {
        if chars[end] == '\\' {
            if end + 1 < chars.len() {
                content.push(chars[end + 1]);
            }
            end += 2;
            continue;
        }
        if chars[end] == quote {
            end += 1;
            break;
        }
        content.push(chars[end]);
        end += 1;
    }
    Some(Node {
        value: AttributeValue::String(content),
        end,
        kind: NodeKind::QuotedString,
    })
}

fn is_word_char(ch: char) -> bool {
    !matches!(ch, ',' | ';' | '=') && !ch.is_whitespace()
}

/// Bare word: run of non-separator characters. Tracks `[`/`]` depth so an
/// unmatched `]` terminates the word instead of being consumed.
fn extract_word(chars: &[char], start: usize) -> Option<Node> {
    let mut i = start;
    let mut bracket_depth: isize = 0;
    while i < chars.len() {
        let ch = chars[i];
        if !is_word_char(ch) {
            break;
        }
        match ch {
            '[' => bracket_depth += 1,
            ']' => bracket_depth -= 1,
            _ => {}
        }
        if bracket_depth < 0 {
            break;
        }
        i += 1;
    }
    if i == start {
        return None;
    }
    let word: String = chars[start..i].iter().collect();
    Some(Node {
        value: AttributeValue::String(word),
        end: i,
        kind: NodeKind::Word,
    })
}

/// `[...]` array; elements use the same four alternatives. Separators are not
/// required, unknown characters (including `,` and `;`) are skipped.
fn extract_array(chars: &[char], start: usize, depth: usize) -> Option<Node> {
    if chars.get(start) != Some(&'[') || depth >= MAX_ARRAY_DEPTH {
        return None;
    }
    let mut items = Vec::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == ']' {
            i += 1;
            break;
        }
        match extract_node(chars, i, depth + 1) {
            Some(node) => {
                let value = if node.kind == NodeKind::Word {
                    match &node.value {
                        AttributeValue::String(word) => normalize_value(word),
                        other => other.clone(),
                    }
                } else {
                    node.value
                };
                items.push(value);
                i = node.end;
            }
            None => i += 1,
        }
    }
    Some(Node {
        value: AttributeValue::Array(items),
        end: i,
        kind: NodeKind::Array,
    })
}

fn extract_node(chars: &[char], start: usize, depth: usize) -> Option<Node> {
    extract_array(chars, start, depth)
        .or_else(|| extract_paren_blob(chars, start))
        .or_else(|| extract_quoted(chars, start))
        .or_else(|| extract_word(chars, start))
}

/// Appends to a space-joined attribute (`class`, `id`). A prior non-string
/// value is overwritten.
fn append_space_joined(map: &mut AttributeMap, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    match map.get(key) {
        Some(AttributeValue::String(previous)) => {
            let joined = format!("{} {}", previous, value);
            map.insert(key.to_string(), AttributeValue::String(joined));
        }
        _ => {
            map.insert(key.to_string(), AttributeValue::String(value.to_string()));
        }
    }
}

/// Parses an attribute body, optionally wrapped in `{ }`, into an
/// [`AttributeMap`]. Never fails: malformed input degrades by skipping
/// characters until something parses.
pub fn parse_attributes(text: &str) -> AttributeMap {
    let mut body = text.trim();
    if body.starts_with('{') && body.ends_with('}') && body.len() >= 2 {
        body = &body[1..body.len() - 1];
    }

    let chars: Vec<char> = body.chars().collect();
    let mut map = AttributeMap::new();
    let mut pending_key: Option<String> = None;
    let mut i = 0usize;

    while i < chars.len() {
        let Some(node) = extract_node(&chars, i, 0) else {
            // Unknown character: skip it and retry. Guarantees termination.
            i += 1;
            continue;
        };
        i = node.end;

        if let Some(key) = pending_key.take() {
            let value = if node.kind == NodeKind::Word {
                match &node.value {
                    AttributeValue::String(word) => normalize_value(word),
                    other => other.clone(),
                }
            } else {
                node.value
            };
            map.insert(key, value);
            continue;
        }

        if chars.get(i) == Some(&'=') {
            // Raw (unnormalized) node text becomes the key. Non-string nodes
            // cannot name a key; the `=` is skipped on the next iteration.
            if let AttributeValue::String(raw) = node.value {
                pending_key = Some(raw);
            }
            continue;
        }

        // Bare flag token.
        let AttributeValue::String(token) = node.value else {
            continue;
        };
        if let Some(rest) = token.strip_prefix('.') {
            append_space_joined(&mut map, "class", rest);
        } else if let Some(rest) = token.strip_prefix('#') {
            append_space_joined(&mut map, "id", rest);
        } else {
            map.insert(token, AttributeValue::Bool(true));
        }
    }

    map
}

fn stringify_value(value: &AttributeValue, out: &mut String) {
    match value {
        AttributeValue::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                stringify_value(item, out);
            }
            out.push(']');
        }
        AttributeValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        AttributeValue::Number(n) => {
            out.push_str(&n.to_string());
        }
        AttributeValue::String(s) => {
            // JSON-literal encoding keeps the round-trip with parse_attributes.
            out.push_str(&serde_json::to_string(s).unwrap_or_default());
        }
    }
}

/// Serializes an attribute map back to the mini-language. Left inverse of
/// [`parse_attributes`] for maps built from scalars and arrays of scalars.
pub fn stringify_attributes(attributes: &AttributeMap, with_braces: bool) -> String {
    let mut out = String::new();
    if with_braces {
        out.push('{');
    }
    for (idx, (key, value)) in attributes.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(key);
        out.push('=');
        stringify_value(value, &mut out);
    }
    if with_braces {
        out.push('}');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classes_id_and_flags() {
        let map = parse_attributes("{#identifier .class1 .class2 hide}");
        assert_eq!(
            map.get("id"),
            Some(&AttributeValue::String("identifier".into()))
        );
        assert_eq!(
            map.get("class"),
            Some(&AttributeValue::String("class1 class2".into()))
        );
        assert_eq!(map.get("hide"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn normalizes_word_values() {
        let map = parse_attributes("a=TRUE b=false c=3.5 d=hello");
        assert_eq!(map.get("a"), Some(&AttributeValue::Bool(true)));
        assert_eq!(map.get("b"), Some(&AttributeValue::Bool(false)));
        assert_eq!(map.get("c"), Some(&AttributeValue::Number(3.5)));
        assert_eq!(map.get("d"), Some(&AttributeValue::String("hello".into())));
    }

    #[test]
    fn quoted_values_stay_verbatim() {
        let map = parse_attributes(r#"title="true" alt='a \"b\" c'"#);
        assert_eq!(map.get("title"), Some(&AttributeValue::String("true".into())));
        assert_eq!(
            map.get("alt"),
            Some(&AttributeValue::String("a \"b\" c".into()))
        );
    }

    #[test]
    fn unterminated_quote_reads_to_end() {
        let map = parse_attributes("title=\"never closed");
        assert_eq!(
            map.get("title"),
            Some(&AttributeValue::String("never closed".into()))
        );
    }

    #[test]
    fn backtick_quotes_supported() {
        let map = parse_attributes("cmd=`node -e \"x\"`");
        assert_eq!(
            map.get("cmd"),
            Some(&AttributeValue::String("node -e \"x\"".into()))
        );
    }

    #[test]
    fn paren_blob_kept_verbatim() {
        let map = parse_attributes("matches=(a, (b c), d)");
        assert_eq!(
            map.get("matches"),
            Some(&AttributeValue::String("(a, (b c), d)".into()))
        );
    }

    #[test]
    fn arrays_parse_recursively() {
        let map = parse_attributes("xs=[1, two, [true, 'q']]");
        assert_eq!(
            map.get("xs"),
            Some(&AttributeValue::Array(vec![
                AttributeValue::Number(1.0),
                AttributeValue::String("two".into()),
                AttributeValue::Array(vec![
                    AttributeValue::Bool(true),
                    AttributeValue::String("q".into()),
                ]),
            ]))
        );
    }

    #[test]
    fn separators_between_pairs_are_skipped() {
        let map = parse_attributes("a=1, b=2; c=3");
        assert_eq!(map.get("a"), Some(&AttributeValue::Number(1.0)));
        assert_eq!(map.get("b"), Some(&AttributeValue::Number(2.0)));
        assert_eq!(map.get("c"), Some(&AttributeValue::Number(3.0)));
    }

    #[test]
    fn later_binding_overwrites_earlier() {
        let map = parse_attributes("k=1 k=2");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("k"), Some(&AttributeValue::Number(2.0)));
    }

    #[test]
    fn unmatched_close_bracket_ends_word() {
        // The trailing `]` terminates the word rather than joining it.
        let map = parse_attributes("foo] bar");
        assert_eq!(map.get("foo"), Some(&AttributeValue::Bool(true)));
        assert_eq!(map.get("bar"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn never_fails_on_garbage() {
        for input in [
            "",
            "{}",
            "{",
            "}",
            "=====",
            ",,,;;;",
            "[[[[",
            "]]]]",
            "((((((",
            "\\\\\\",
            "{{{{nested=}}}}",
        ] {
            let _ = parse_attributes(input);
        }
    }

    #[test]
    fn adversarial_nesting_terminates() {
        let deep = "[".repeat(10_000);
        let _ = parse_attributes(&deep);
        let mixed = "[(".repeat(5_000);
        let _ = parse_attributes(&mixed);
    }

    #[test]
    fn empty_class_marker_ignored() {
        let map = parse_attributes(". .red");
        assert_eq!(map.get("class"), Some(&AttributeValue::String("red".into())));
    }

    #[test]
    fn stringify_round_trips_scalars_and_arrays() {
        let mut map = AttributeMap::new();
        map.insert("cmd".into(), AttributeValue::String("toc".into()));
        map.insert("hide".into(), AttributeValue::Bool(true));
        map.insert("depth_from".into(), AttributeValue::Number(1.0));
        map.insert(
            "xs".into(),
            AttributeValue::Array(vec![
                AttributeValue::Number(2.0),
                AttributeValue::String("b".into()),
            ]),
        );

        let serialized = stringify_attributes(&map, true);
        let reparsed = parse_attributes(&serialized);
        assert_eq!(reparsed, map);
    }

    #[test]
    fn stringify_formats_whole_numbers_without_fraction() {
        let mut map = AttributeMap::new();
        map.insert("n".into(), AttributeValue::Number(6.0));
        assert_eq!(stringify_attributes(&map, false), "n=6");
    }

    #[test]
    fn display_coercion() {
        assert_eq!(AttributeValue::Bool(true).to_string(), "true");
        assert_eq!(AttributeValue::Number(100.0).to_string(), "100");
        assert_eq!(
            AttributeValue::Array(vec![
                AttributeValue::Number(1.0),
                AttributeValue::String("a".into()),
            ])
            .to_string(),
            "1,a"
        );
    }
}
