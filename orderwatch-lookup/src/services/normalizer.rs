//! Identifier normalization
//!
//! Turns pasted text (one identifier per line, or comma/semicolon separated)
//! into an ordered, deduplicated [`IdentifierSet`].

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Separators between identifiers in pasted text
const SEPARATORS: [char; 3] = ['\n', ',', ';'];

/// Characters stripped from both ends of an identifier
///
/// Covers Unicode whitespace, control characters and the invisible
/// formatting characters spreadsheets and chat clients paste along
/// (NBSP, zero-width spaces and joiners, BOM).
pub fn is_padding(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(
            c,
            '\u{00A0}'
                | '\u{1680}'
                | '\u{2000}'..='\u{200F}'
                | '\u{2028}'..='\u{202F}'
                | '\u{205F}'
                | '\u{3000}'
                | '\u{FEFF}'
        )
}

/// Trim padding characters from both ends, preserving internal spacing
pub fn clean_identifier(raw: &str) -> &str {
    raw.trim_matches(is_padding)
}

/// Ordered, deduplicated identifiers with a content fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierSet {
    identifiers: Vec<String>,
    fingerprint: String,
}

impl IdentifierSet {
    /// Build from already-clean identifiers, deduplicating in first-seen order
    pub fn from_identifiers<I>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let identifiers: Vec<String> = identifiers
            .into_iter()
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        let fingerprint = fingerprint(&identifiers);
        Self {
            identifiers,
            fingerprint,
        }
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Order-independent SHA-256 (hex) of the identifiers
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Identifiers joined one per line
    pub fn to_text(&self) -> String {
        self.identifiers.join("\n")
    }
}

/// SHA-256 over the sorted identifiers joined by newlines
fn fingerprint(identifiers: &[String]) -> String {
    let mut sorted: Vec<&str> = identifiers.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for (i, id) in sorted.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(id.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Normalize raw pasted text into an identifier set
///
/// Never fails: empty input yields an empty set.
pub fn normalize(raw: &str) -> IdentifierSet {
    IdentifierSet::from_identifiers(
        raw.split(SEPARATORS.as_slice())
            .map(clean_identifier)
            .filter(|token| !token.is_empty())
            .map(str::to_string),
    )
}
