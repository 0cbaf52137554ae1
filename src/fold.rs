//! Lowercase folding and character-stepped UTF-8 helpers.
//!
//! Folding here is deliberately simple: `char::to_lowercase`, locale
//! unaware, no Unicode normalization. That's the explicit Non-goal in the
//! design doc — anything fancier belongs to a collation layer this crate
//! doesn't have.

/// Deterministic, locale-unaware lowercase fold. Idempotent: `fold(fold(x))
/// == fold(x)`, since `char::to_lowercase` on an already-lowercase scalar
/// is a no-op.
pub fn fold(s: &str) -> String {
    s.chars().flat_map(|c| c.to_lowercase()).collect()
}

/// One character of source text, decomposed into its character position
/// (0-indexed from the start) and the UTF-8 bytes it's made of. All bytes
/// of one character share the same position — this is what lets the
/// matcher treat a multi-byte character as a single indexed unit.
pub struct CharAt {
    pub position: usize,
    pub bytes: [u8; 4],
    pub byte_len: usize,
}

/// Character-step a string, yielding one `CharAt` per Unicode scalar value.
pub fn char_steps(s: &str) -> impl Iterator<Item = CharAt> + '_ {
    s.chars().enumerate().map(|(position, c)| {
        let mut bytes = [0u8; 4];
        let byte_len = c.encode_utf8(&mut bytes).len();
        CharAt {
            position,
            bytes,
            byte_len,
        }
    })
}

/// Character length of a string (Unicode scalar count, not byte length).
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}
