//! Tag codec.
//!
//! Encodes an [`IndexTag`] into the single string key stored in the
//! `chunk_tags` table. The encoding is `directory::branch::artifact`.
//!
//! Keys are compared by exact string equality, so the encoding must be
//! injective: two tags produce the same key iff all three fields are
//! equal. That holds as long as no field contains the `::` separator or
//! starts/ends with `:` (which would let a separator straddle a field
//! boundary). Such fields are rejected, as are fields containing the
//! store's `?` parameter placeholder or NUL.

use thiserror::Error;

use crate::models::IndexTag;

/// Separator between the three tag fields.
pub const TAG_SEPARATOR: &str = "::";

/// Characters reserved by the query layer.
const RESERVED_CHARS: [char; 2] = ['?', '\0'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("tag {field} {value:?} contains reserved character {ch:?}")]
    ReservedChar {
        field: &'static str,
        value: String,
        ch: char,
    },
    #[error("tag {field} {value:?} would make the tag key ambiguous around '::'")]
    AmbiguousSeparator { field: &'static str, value: String },
}

/// Encode a tag into its canonical key.
pub fn tag_to_string(tag: &IndexTag) -> Result<String, TagError> {
    check_field("directory", &tag.directory)?;
    check_field("branch", &tag.branch)?;
    check_field("artifact", &tag.artifact_kind)?;
    Ok(format!(
        "{}{sep}{}{sep}{}",
        tag.directory,
        tag.branch,
        tag.artifact_kind,
        sep = TAG_SEPARATOR
    ))
}

fn check_field(field: &'static str, value: &str) -> Result<(), TagError> {
    if let Some(ch) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(TagError::ReservedChar {
            field,
            value: value.to_string(),
            ch,
        });
    }
    if value.contains(TAG_SEPARATOR) || value.starts_with(':') || value.ends_with(':') {
        return Err(TagError::AmbiguousSeparator {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
