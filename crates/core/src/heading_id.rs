//! Heading id generation.
//!
//! Deterministic slugs with per-document collision disambiguation. One
//! generator lives for exactly one transform call; counters never leak
//! between documents.

use std::collections::HashMap;

/// Collision-disambiguating slug generator for heading ids.
#[derive(Debug, Default)]
pub struct HeadingIdGenerator {
    counts: HashMap<String, usize>,
}

impl HeadingIdGenerator {
    /// Creates a fresh generator with empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the id for the given heading text. A repeat of an earlier
    /// slug in the same document gets `-1`, `-2`, … appended.
    pub fn generate_id(&mut self, text: &str) -> String {
        let mut slug = slugify(text);

        let entry = self.counts.entry(slug.clone()).or_insert(0);
        if *entry > 0 {
            slug.push_str(&format!("-{}", *entry));
        }
        *entry += 1;

        slug
    }
}

/// Lowercase; keep alphanumerics, `-`, and `_`; spaces become hyphens;
/// everything else is dropped.
fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for ch in text.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            slug.push(ch.to_ascii_lowercase());
        } else if !ch.is_ascii() && ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else if ch == ' ' {
            slug.push('-');
        }
    }
    if slug.is_empty() {
        slug.push_str("heading");
    }
    slug
}
