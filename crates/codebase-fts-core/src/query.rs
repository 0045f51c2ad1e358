//! Query text helpers for the trigram full-text index.
//!
//! The text store tokenizes content into overlapping 3-character
//! fragments, so any query term shorter than [`FRAGMENT_LEN`] characters
//! can never match.

/// Fragment length of the trigram tokenizer.
pub const FRAGMENT_LEN: usize = 3;

/// The store's parameter placeholder.
pub const PLACEHOLDER: char = '?';

/// Strip the parameter placeholder from raw query text.
///
/// The result is always passed as a bound value; stripping keeps query
/// text from the host identical to what earlier releases matched on.
pub fn sanitize_query(text: &str) -> String {
    text.chars().filter(|c| *c != PLACEHOLDER).collect()
}

/// Build an FTS5 match expression from free text.
///
/// Each whitespace-separated term becomes a quoted phrase (so operators
/// and punctuation inside identifiers are matched literally) and the
/// phrases are joined with `OR`. Terms shorter than the fragment length
/// are dropped. Returns an empty string when no term survives.
pub fn terms_query(text: &str) -> String {
    sanitize_query(text)
        .split_whitespace()
        .filter(|term| term.chars().count() >= FRAGMENT_LEN)
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}
