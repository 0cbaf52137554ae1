//! Multi-predicate query planner (design doc §4.5, component E).
//!
//! Scores each column predicate's selectivity from its parsed pattern shape
//! alone (no data-dependent statistics — the original has none either) and
//! orders predicates to prune the candidate set as early as possible.

use crate::bitmap::RecordBitmap;
use crate::error::{BiscuitError, Result};
use crate::fold::fold;
use crate::pattern::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Like,
    NotLike,
    ILike,
    NotILike,
}

impl Mode {
    pub fn is_negated(self) -> bool {
        matches!(self, Mode::NotLike | Mode::NotILike)
    }

    pub fn is_case_insensitive(self) -> bool {
        matches!(self, Mode::ILike | Mode::NotILike)
    }
}

/// One column predicate: `column LIKE|NOT LIKE|ILIKE|NOT ILIKE pattern`.
pub struct Predicate {
    pub column_index: usize,
    pub pattern: Pattern,
    pub mode: Mode,
}

impl Predicate {
    /// Parse `raw_pattern` into a predicate, folding it to lowercase first
    /// when `mode` is case-insensitive — the parser always operates on
    /// already-folded text for ILIKE/NOT ILIKE, matching the folded shadow
    /// index it will be evaluated against.
    pub fn new(column_index: usize, raw_pattern: &str, mode: Mode) -> Result<Predicate> {
        let text = if mode.is_case_insensitive() {
            fold(raw_pattern)
        } else {
            raw_pattern.to_string()
        };
        Ok(Predicate {
            column_index,
            pattern: Pattern::parse(&text)?,
            mode,
        })
    }
}

/// Boolean/count tags derived from a parsed pattern's shape, used only to
/// score selectivity; no per-record data is consulted.
#[derive(Debug)]
struct Tags {
    is_exact: bool,
    is_prefix: bool,
    is_suffix: bool,
    is_substring: bool,
    has_percent: bool,
    concrete_chars: usize,
    underscore_count: usize,
    percent_runs: usize,
    partition_count: usize,
    anchor_strength: u32,
}

fn anchor_strength(pattern: &Pattern) -> u32 {
    if pattern.segments.is_empty() {
        return 0;
    }
    let first = &pattern.segments[0];
    let last = &pattern.segments[pattern.segments.len() - 1];
    let single_segment = pattern.segments.len() == 1;

    let mut score: i64 = 0;
    if !pattern.leading_percent {
        score += 10 * first.concrete_chars() as i64 + 3 * first.underscore_count() as i64;
    }
    // Avoid double-counting a single segment that is both the leading and
    // trailing anchor run (the exact / no-percent shapes).
    let already_counted = single_segment && !pattern.leading_percent;
    if !pattern.trailing_percent && !already_counted {
        score += 10 * last.concrete_chars() as i64 + 3 * last.underscore_count() as i64;
    }
    score.clamp(0, 100) as u32
}

fn tags(pattern: &Pattern) -> Tags {
    let has_percent = pattern.has_percent();
    let single_segment = pattern.segments.len() == 1;
    Tags {
        is_exact: !has_percent && pattern.underscore_count == 0,
        is_prefix: single_segment && !pattern.leading_percent && pattern.trailing_percent,
        is_suffix: single_segment && pattern.leading_percent && !pattern.trailing_percent,
        is_substring: single_segment && pattern.leading_percent && pattern.trailing_percent,
        has_percent,
        concrete_chars: pattern.concrete_chars(),
        underscore_count: pattern.underscore_count,
        percent_runs: pattern.percent_runs,
        partition_count: pattern.segments.len(),
        anchor_strength: anchor_strength(pattern),
    }
}

/// Selectivity score in `(0, 1]`; lower means more selective (design doc
/// §4.5's formula, transcribed verbatim).
fn selectivity(t: &Tags) -> f64 {
    let base = 1.0 / (t.concrete_chars as f64 + 1.0);
    let mut s = if t.is_exact { base * 0.1 } else { base };
    s -= 0.05 * t.underscore_count as f64;
    s += 0.15 * t.partition_count as f64;
    s -= t.anchor_strength as f64 / 200.0;
    if t.is_substring {
        s += 0.5;
    }
    s.clamp(0.01, 1.0)
}

/// Tiered priority; lower executes first. Tie-broken on selectivity, then
/// on column index by the caller's stable sort.
fn priority(t: &Tags, s: f64) -> i64 {
    let tier = if t.is_exact {
        0
    } else if !t.has_percent {
        10
    } else if (t.is_prefix || t.is_suffix) && t.anchor_strength >= 50 {
        20
    } else if t.is_prefix || t.is_suffix {
        30
    } else if t.partition_count >= 2 {
        40
    } else if t.is_substring {
        50
    } else {
        35
    };
    tier + (10.0 * s).floor() as i64
}

/// A predicate annotated with its computed priority and selectivity, used
/// to derive an execution order.
pub struct Scored<'a> {
    pub predicate: &'a Predicate,
    pub priority: i64,
    pub selectivity: f64,
}

/// Order `predicates` for execution: lowest priority first, ties broken by
/// selectivity then by original column index (stable sort preserves this
/// automatically for equal keys).
pub fn plan(predicates: &[Predicate]) -> Vec<Scored<'_>> {
    let mut scored: Vec<Scored> = predicates
        .iter()
        .map(|p| {
            let t = tags(&p.pattern);
            let s = selectivity(&t);
            Scored {
                predicate: p,
                priority: priority(&t, s),
                selectivity: s,
            }
        })
        .collect();
    scored.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.selectivity.partial_cmp(&b.selectivity).unwrap())
            .then(a.predicate.column_index.cmp(&b.predicate.column_index))
    });
    scored
}

/// Intersect per-predicate result bitmaps in planner order, early-exiting
/// once the running candidate set is empty. `eval_predicate` evaluates one
/// predicate's raw (un-negated) match set; `all_live` supplies the
/// complement for `NOT LIKE`/`NOT ILIKE`. `is_cancelled` is polled between
/// predicates, matching the design doc's "checks an interrupt flag... between
/// predicates in the planner".
pub fn execute<B: RecordBitmap>(
    predicates: &[Predicate],
    all_live: &B,
    mut eval_predicate: impl FnMut(&Predicate) -> B,
    mut is_cancelled: impl FnMut() -> bool,
) -> Result<B> {
    let order = plan(predicates);
    let mut candidates: Option<B> = None;
    for scored in order {
        if is_cancelled() {
            return Err(BiscuitError::Cancelled);
        }
        let mut bitmap = eval_predicate(scored.predicate);
        if scored.predicate.mode.is_negated() {
            let mut complement = all_live.clone();
            complement.difference_with(&bitmap);
            bitmap = complement;
        }
        candidates = Some(match candidates {
            Some(mut acc) => {
                acc.intersect_with(&bitmap);
                acc
            }
            None => bitmap,
        });
        if candidates.as_ref().unwrap().is_empty() {
            break;
        }
    }
    Ok(candidates.unwrap_or_else(B::new))
}
