//! Pattern parser and matcher (design doc §4.4, component D).
//!
//! Parses a `LIKE` pattern into an ordered list of segments (maximal
//! substrings between `%` characters, possibly containing `_`) plus
//! leading/trailing `%` flags, then evaluates it against a column's
//! [`CharIndex`]/[`LengthIndex`] pair using the fast paths and the
//! recursive windowed placement search described in the design doc.

use crate::bitmap::RecordBitmap;
use crate::charindex::CharIndex;
use crate::error::{BiscuitError, Result};
use crate::fold::char_len;
use crate::lenindex::LengthIndex;

const MAX_PATTERN_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegChar {
    Literal(char),
    Underscore,
}

/// A maximal run of the pattern between `%` characters.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub chars: Vec<SegChar>,
}

impl Segment {
    pub fn char_len(&self) -> usize {
        self.chars.len()
    }

    pub fn has_multibyte(&self) -> bool {
        self.chars
            .iter()
            .any(|c| matches!(c, SegChar::Literal(c) if c.len_utf8() > 1))
    }

    pub fn underscore_count(&self) -> usize {
        self.chars
            .iter()
            .filter(|c| matches!(c, SegChar::Underscore))
            .count()
    }

    pub fn concrete_chars(&self) -> usize {
        self.char_len() - self.underscore_count()
    }
}

/// A parsed `LIKE`/`ILIKE` pattern.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub segments: Vec<Segment>,
    pub leading_percent: bool,
    pub trailing_percent: bool,
    pub underscore_count: usize,
    pub percent_count: usize,
    /// Maximal runs of consecutive `%` (so `"%%%"` counts as one run, not
    /// three) — distinct from `percent_count`, which counts every `%` byte.
    pub percent_runs: usize,
}

impl Pattern {
    /// Parse a raw pattern string. Embedded NULs or patterns exceeding the
    /// implementation-defined length bound are rejected.
    pub fn parse(raw: &str) -> Result<Pattern> {
        if raw.contains('\0') {
            return Err(BiscuitError::InvalidPattern {
                reason: "pattern contains an embedded NUL".into(),
            });
        }
        if char_len(raw) > MAX_PATTERN_CHARS {
            return Err(BiscuitError::InvalidPattern {
                reason: format!("pattern exceeds {MAX_PATTERN_CHARS} characters"),
            });
        }

        let mut segments = Vec::new();
        let mut current = Segment::default();
        let mut leading_percent = false;
        let mut trailing_percent = false;
        let mut underscore_count = 0;
        let mut percent_count = 0;
        let mut percent_runs = 0;
        let mut in_percent_run = false;

        for c in raw.chars() {
            match c {
                '%' => {
                    percent_count += 1;
                    if !in_percent_run {
                        percent_runs += 1;
                        in_percent_run = true;
                    }
                    if current.chars.is_empty() {
                        if segments.is_empty() {
                            leading_percent = true;
                        }
                    } else {
                        segments.push(std::mem::take(&mut current));
                    }
                    trailing_percent = true;
                }
                '_' => {
                    underscore_count += 1;
                    in_percent_run = false;
                    current.chars.push(SegChar::Underscore);
                }
                _ => {
                    in_percent_run = false;
                    current.chars.push(SegChar::Literal(c));
                }
            }
        }
        if !current.chars.is_empty() {
            segments.push(current);
            trailing_percent = false;
        }

        Ok(Pattern {
            segments,
            leading_percent,
            trailing_percent,
            underscore_count,
            percent_count,
            percent_runs,
        })
    }

    pub fn has_percent(&self) -> bool {
        self.percent_count > 0
    }

    pub fn concrete_chars(&self) -> usize {
        self.segments.iter().map(Segment::concrete_chars).sum()
    }

    pub fn total_char_len(&self) -> usize {
        self.segments.iter().map(Segment::char_len).sum()
    }
}

/// Outcome of matching one segment at a fixed character position.
enum SegMatch<B: RecordBitmap> {
    /// A byte required at some position has no index entries: the segment
    /// cannot match anywhere, for any record.
    Empty,
    /// The segment is all `_`: no character constraint was contributed.
    Any,
    /// The segment matched, constrained to this bitmap.
    Some(B),
}

fn match_segment_forward<B: RecordBitmap>(
    idx: &CharIndex<B>,
    segment: &Segment,
    start_pos: usize,
) -> SegMatch<B> {
    let mut acc: Option<B> = None;
    let mut pos = start_pos as i32;
    for sc in &segment.chars {
        match sc {
            SegChar::Underscore => pos += 1,
            SegChar::Literal(c) => {
                let mut buf = [0u8; 4];
                let bytes = c.encode_utf8(&mut buf).as_bytes();
                for &b in bytes {
                    let Some(bm) = idx.get_pos(b, pos) else {
                        return SegMatch::Empty;
                    };
                    match acc.as_mut() {
                        Some(a) => {
                            a.intersect_with(bm);
                            if a.is_empty() {
                                return SegMatch::Empty;
                            }
                        }
                        None => acc = Some(bm.clone()),
                    }
                }
                pos += 1;
            }
        }
    }
    match acc {
        Some(bm) => SegMatch::Some(bm),
        None => SegMatch::Any,
    }
}

/// Match a segment anchored at the end of the text: the segment's last
/// character sits at negative position `-1`, its first at `-segment_len`.
fn match_segment_backward<B: RecordBitmap>(idx: &CharIndex<B>, segment: &Segment) -> SegMatch<B> {
    let len = segment.char_len() as i32;
    let mut acc: Option<B> = None;
    for (i, sc) in segment.chars.iter().enumerate() {
        if let SegChar::Literal(c) = sc {
            let neg_pos = i as i32 - len;
            let mut buf = [0u8; 4];
            let bytes = c.encode_utf8(&mut buf).as_bytes();
            for &b in bytes {
                let Some(bm) = idx.get_neg(b, neg_pos) else {
                    return SegMatch::Empty;
                };
                match acc.as_mut() {
                    Some(a) => {
                        a.intersect_with(bm);
                        if a.is_empty() {
                            return SegMatch::Empty;
                        }
                    }
                    None => acc = Some(bm.clone()),
                }
            }
        }
    }
    match acc {
        Some(bm) => SegMatch::Some(bm),
        None => SegMatch::Any,
    }
}

/// Does `text`, starting at character index `start`, match `segment`
/// character-by-character (`_` matches any one character)? Used only for
/// post-verifying multi-byte substring candidates.
fn segment_matches_at_char(text_chars: &[char], start: usize, segment: &Segment) -> bool {
    if start + segment.char_len() > text_chars.len() {
        return false;
    }
    for (i, sc) in segment.chars.iter().enumerate() {
        if let SegChar::Literal(c) = sc {
            if text_chars[start + i] != *c {
                return false;
            }
        }
    }
    true
}

fn contains_segment(text: &str, segment: &Segment) -> bool {
    let chars: Vec<char> = text.chars().collect();
    if segment.char_len() > chars.len() {
        return false;
    }
    (0..=(chars.len() - segment.char_len())).any(|start| segment_matches_at_char(&chars, start, segment))
}

/// Recursive windowed placement over the segments of a multi-segment (or
/// single-segment wildcarded) pattern. `result` accumulates every
/// successful leaf placement.
#[allow(clippy::too_many_arguments)]
fn place<B: RecordBitmap>(
    segments: &[Segment],
    idx: usize,
    min_pos: usize,
    candidates: &B,
    trailing_percent: bool,
    chars: &CharIndex<B>,
    lens: &LengthIndex<B>,
    max_len: usize,
    result: &mut B,
) {
    if idx >= segments.len() {
        result.union_with(candidates);
        return;
    }
    if candidates.is_empty() {
        return;
    }
    let segment = &segments[idx];
    let seg_len = segment.char_len();
    let remaining_len: usize = segments[idx + 1..].iter().map(Segment::char_len).sum();
    let is_last = idx == segments.len() - 1;

    if is_last && !trailing_percent {
        let seg_match = match_segment_backward(chars, segment);
        let mut cand = match seg_match {
            SegMatch::Empty => return,
            SegMatch::Any => candidates.clone(),
            SegMatch::Some(bm) => {
                let mut c = candidates.clone();
                c.intersect_with(&bm);
                c
            }
        };
        match lens.ge(min_pos + seg_len) {
            Some(ge) => cand.intersect_with(ge),
            None => return,
        }
        if !cand.is_empty() {
            result.union_with(&cand);
        }
        return;
    }

    if seg_len + remaining_len > max_len {
        return;
    }
    let max_pos = max_len - seg_len - remaining_len;
    if min_pos > max_pos {
        return;
    }
    for pos in min_pos..=max_pos {
        let seg_match = match_segment_forward(chars, segment, pos);
        let next_candidates = match seg_match {
            SegMatch::Empty => continue,
            SegMatch::Any => candidates.clone(),
            SegMatch::Some(bm) => {
                let mut c = candidates.clone();
                c.intersect_with(&bm);
                c
            }
        };
        if next_candidates.is_empty() {
            continue;
        }
        place(
            segments,
            idx + 1,
            pos + seg_len,
            &next_candidates,
            trailing_percent,
            chars,
            lens,
            max_len,
            result,
        );
    }
}

/// General entry point for any pattern containing at least one `%`. Covers
/// prefix, suffix, substring, and multi-segment placement uniformly; the
/// fast paths in [`eval`] short-circuit the common shapes before reaching
/// here.
fn windowed_match<B: RecordBitmap>(pattern: &Pattern, chars: &CharIndex<B>, lens: &LengthIndex<B>) -> B {
    debug_assert!(!pattern.segments.is_empty(), "eval handles the bare-%/_ case before reaching here");
    let max_len = lens.max_len();
    let total_len = pattern.total_char_len();
    let mut result = B::new();
    let Some(start_candidates) = lens.ge(total_len) else {
        return result;
    };
    if !pattern.leading_percent {
        let first = &pattern.segments[0];
        let seg_match = match_segment_forward(chars, first, 0);
        let cand = match seg_match {
            SegMatch::Empty => return result,
            SegMatch::Any => start_candidates.clone(),
            SegMatch::Some(bm) => {
                let mut c = start_candidates.clone();
                c.intersect_with(&bm);
                c
            }
        };
        if cand.is_empty() {
            return result;
        }
        place(
            &pattern.segments,
            1,
            first.char_len(),
            &cand,
            pattern.trailing_percent,
            chars,
            lens,
            max_len,
            &mut result,
        );
    } else {
        place(
            &pattern.segments,
            0,
            0,
            start_candidates,
            pattern.trailing_percent,
            chars,
            lens,
            max_len,
            &mut result,
        );
    }
    result
}

/// Evaluate `pattern` (already folded for ILIKE if applicable) against a
/// column's index. `all_live` is the set of non-tombstoned records;
/// `texts` is the cached per-record text for this index (original or
/// folded, matching `chars`/`lens`), used only for the multi-byte
/// substring post-verification fast path.
pub fn eval<B: RecordBitmap>(
    pattern: &Pattern,
    chars: &CharIndex<B>,
    lens: &LengthIndex<B>,
    all_live: &B,
    text_of: &dyn Fn(u32) -> Option<String>,
) -> B {
    // Fast path: pattern is a bare run of `%` (no segments at all, so no
    // `_` either — any `_` would itself form a one-character segment).
    if pattern.segments.is_empty() {
        return all_live.clone();
    }

    // Fast path: no `%` at all -> exact match, segment anchored at 0.
    if !pattern.has_percent() {
        debug_assert_eq!(pattern.segments.len(), 1);
        let segment = &pattern.segments[0];
        let seg_match = match_segment_forward(chars, segment, 0);
        let mut result = match seg_match {
            SegMatch::Empty => return B::new(),
            SegMatch::Any => all_live.clone(),
            SegMatch::Some(bm) => bm,
        };
        match lens.exact(segment.char_len()) {
            Some(exact) => result.intersect_with(exact),
            None => return B::new(),
        }
        return result;
    }

    // Fast path: single segment, substring (`%X%`).
    if pattern.segments.len() == 1 && pattern.leading_percent && pattern.trailing_percent {
        let segment = &pattern.segments[0];
        if segment.has_multibyte() {
            return substring_via_cache_and_verify(segment, chars, lens, all_live, text_of);
        }
    }

    windowed_match(pattern, chars, lens)
}

/// Coarse cache-based pre-filter (AND of per-byte union bitmaps) followed
/// by a character-aligned substring scan over the cached text, for `%X%`
/// patterns where `X` contains multi-byte characters. The bitmap filter
/// alone is a superset — it only guarantees every byte of `X` appears
/// *somewhere* in the record, not in the right arrangement — so every
/// surviving candidate is re-checked against its actual text.
fn substring_via_cache_and_verify<B: RecordBitmap>(
    segment: &Segment,
    chars: &CharIndex<B>,
    lens: &LengthIndex<B>,
    all_live: &B,
    text_of: &dyn Fn(u32) -> Option<String>,
) -> B {
    let mut candidates: Option<B> = None;
    for sc in &segment.chars {
        if let SegChar::Literal(c) = sc {
            let mut buf = [0u8; 4];
            for &b in c.encode_utf8(&mut buf).as_bytes() {
                let cache = chars.get_cache(b);
                match candidates.as_mut() {
                    Some(acc) => acc.intersect_with(cache),
                    None => candidates = Some(cache.clone()),
                }
            }
        }
    }
    let mut candidates = match candidates {
        Some(c) => c,
        None => all_live.clone(),
    };
    match lens.ge(segment.char_len()) {
        Some(ge) => candidates.intersect_with(ge),
        None => return B::new(),
    }
    if candidates.is_empty() {
        return candidates;
    }

    let mut verified = B::new();
    for id in candidates.iter() {
        if let Some(text) = text_of(id) {
            if contains_segment(&text, segment) {
                verified.add(id);
            }
        }
    }
    verified
}
