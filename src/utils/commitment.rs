// src/utils/commitment.rs
//! Field commitment scheme.
//!
//! A commitment binds a field type to a normalized value so it can be shared
//! and stored on chain while the value stays with the verifier:
//!
//! ```text
//! normalized  = lowercase(trim(raw_value))
//! inner       = keccak256(utf8(normalized))
//! commitment  = keccak256(utf8("VerifyENS:" + field_type + ":" + hex0x(inner)))
//! ```
//!
//! The outer hash folds in the field type, so the same value committed as a
//! name and as a date of birth yields unrelated digests. Browser clients
//! compute the same bytes with viem, which is why the intermediate hex is
//! lowercase and `0x`-prefixed.

use crate::models::field::{FieldCommitment, FieldType};
use crate::utils::crypto::{hash_data, to_prefixed_hex};

/// Tag separating field commitments from every other hash in the system.
pub const FIELD_DOMAIN_TAG: &str = "VerifyENS";

/// Whitespace as browsers trim it (`String.prototype.trim`): the ECMAScript
/// `WhiteSpace` and `LineTerminator` sets.
///
/// Differs from [`char::is_whitespace`]: U+FEFF is stripped, U+0085 is not.
pub fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'
            | '\u{000B}'
            | '\u{000C}'
            | '\u{0020}'
            | '\u{00A0}'
            | '\u{FEFF}'
            | '\u{000A}'
            | '\u{000D}'
            | '\u{2028}'
            | '\u{2029}'
            // remaining Zs
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

/// Normalizes a raw value: surrounding whitespace removed, lower-cased.
///
/// Returns `None` when nothing but whitespace was entered.
pub fn normalize_value(raw_value: &str) -> Option<String> {
    let trimmed = raw_value.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Computes the commitment for `raw_value` under `field_type`.
///
/// Returns `None` for an empty or whitespace-only value: nothing has been
/// entered yet, so there is nothing to commit to. `field_type` is folded in
/// exactly as given, so it must be the canonical wire id (`"dob"`, not
/// `" dob"`); [`commit_typed_field`] has that enforced by [`FieldType`].
pub fn commit_field(field_type: &str, raw_value: &str) -> Option<FieldCommitment> {
    debug_assert!(!field_type.is_empty(), "field type must not be empty");
    let normalized = normalize_value(raw_value)?;
    let inner = hash_data(normalized.as_bytes());
    let tagged = format!("{}:{}:{}", FIELD_DOMAIN_TAG, field_type, to_prefixed_hex(&inner));
    Some(FieldCommitment::from_bytes(hash_data(tagged.as_bytes())))
}

/// [`commit_field`] for an already parsed [`FieldType`].
pub fn commit_typed_field(field_type: &FieldType, raw_value: &str) -> Option<FieldCommitment> {
    commit_field(field_type.as_str(), raw_value)
}

/// Checks a disclosed value against a stored commitment.
///
/// Accepts if and only if the recomputed commitment equals `stored` on all
/// 32 bytes. An empty disclosed value never matches.
pub fn matches_commitment(field_type: &str, disclosed_value: &str, stored: &FieldCommitment) -> bool {
    match commit_field(field_type, disclosed_value) {
        Some(recomputed) => recomputed.as_bytes() == stored.as_bytes(),
        None => false,
    }
}
