//! An in-memory, bitmap-backed positional character index for accelerating
//! SQL `LIKE` / `NOT LIKE` / `ILIKE` / `NOT ILIKE` predicates on text-like
//! columns.
//!
//! The index maps `(character, position)` pairs to record-id sets, in both
//! forward and reverse (end-relative) position spaces, with a
//! lowercase-folded shadow for case-insensitive matching. A query engine
//! translates arbitrary patterns into ordered bitmap operations — including
//! a recursive windowed placement search for multi-segment patterns — and a
//! planner reorders multi-column predicates by estimated selectivity before
//! executing them.
//!
//! Six components, leaves first: [`bitmap`] (compressed record-id sets),
//! [`charindex`] and [`lenindex`] (the positional and length bitmaps),
//! [`pattern`] (parser and matcher), [`planner`] (predicate ordering), and
//! [`store`] (the record allocator and CRUD lifecycle). [`Engine`] wires all
//! six together behind one per-index read-write lock.

pub mod bitmap;
pub mod charindex;
mod error;
mod fold;
pub mod lenindex;
pub mod marker;
pub mod pattern;
pub mod planner;
pub mod registry;
mod spinlock;
pub mod store;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

pub use crate::bitmap::{ArrayBitmap, CroaringBitmap, RecordBitmap};
pub use crate::error::{BiscuitError, Result};
use crate::fold::{char_len, char_steps, fold};
pub use crate::marker::IndexMarker;
pub use crate::planner::{Mode, Predicate};
use crate::spinlock::RWSpinlock;
pub use crate::store::RecordId;
use crate::store::{Allocation, RecordStore};

/// Which compressed-bitmap backend an index instance is built on. This is
/// descriptive metadata only — the actual selection happens at compile time
/// through which [`RecordBitmap`] type parameter an `Engine` is
/// instantiated with (design doc §9, "no virtual calls in hot loops").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapBackend {
    Compressed,
    Array,
}

/// Per-index configuration.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub columns: Vec<String>,
    pub bitmap_backend: BitmapBackend,
    /// Tombstone count at which a bulk delete triggers automatic
    /// compaction (design doc §4.6, default 1000).
    pub compaction_threshold: usize,
    /// Whether to maintain the lowercase-folded shadow index at all. The
    /// original always builds both; exposing this lets a host skip the
    /// folded index entirely for workloads that never issue ILIKE.
    pub case_insensitive: bool,
}

impl IndexConfig {
    pub fn new(columns: Vec<String>) -> Self {
        IndexConfig {
            columns,
            bitmap_backend: BitmapBackend::Compressed,
            compaction_threshold: 1000,
            case_insensitive: true,
        }
    }
}

/// A cooperative interrupt flag, checked at chunk boundaries during result
/// enumeration and between predicates in the planner (design doc §5
/// "Cancellation"). Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The bitmap indices for one column: case-sensitive always present, the
/// lowercase-folded shadow present only when [`IndexConfig::case_insensitive`]
/// is set.
struct ColumnIndex<B: RecordBitmap> {
    chars: charindex::CharIndex<B>,
    lens: lenindex::LengthIndex<B>,
    folded_chars: Option<charindex::CharIndex<B>>,
    folded_lens: Option<lenindex::LengthIndex<B>>,
}

impl<B: RecordBitmap> ColumnIndex<B> {
    fn new(case_insensitive: bool) -> Self {
        ColumnIndex {
            chars: charindex::CharIndex::new(),
            lens: lenindex::LengthIndex::new(),
            folded_chars: case_insensitive.then(charindex::CharIndex::new),
            folded_lens: case_insensitive.then(lenindex::LengthIndex::new),
        }
    }

    fn remove_record(&mut self, id: RecordId) {
        self.chars.remove_record(id);
        self.lens.remove_record(id);
        if let Some(fc) = self.folded_chars.as_mut() {
            fc.remove_record(id);
        }
        if let Some(fl) = self.folded_lens.as_mut() {
            fl.remove_record(id);
        }
    }

    fn compact(&mut self, tombstones: &B) {
        self.chars.compact(tombstones);
        self.lens.compact(tombstones);
        if let Some(fc) = self.folded_chars.as_mut() {
            fc.compact(tombstones);
        }
        if let Some(fl) = self.folded_lens.as_mut() {
            fl.compact(tombstones);
        }
    }

    fn index_text(&mut self, id: RecordId, text: &str, folded_text: Option<&str>) {
        let len = char_len(text);
        self.lens.insert(id, len);
        for step in char_steps(text) {
            for &b in &step.bytes[..step.byte_len] {
                self.chars.index_character(id, step.position, b, len);
            }
        }
        if let (Some(folded_text), Some(fc), Some(fl)) =
            (folded_text, self.folded_chars.as_mut(), self.folded_lens.as_mut())
        {
            let flen = char_len(folded_text);
            fl.insert(id, flen);
            for step in char_steps(folded_text) {
                for &b in &step.bytes[..step.byte_len] {
                    fc.index_character(id, step.position, b, flen);
                }
            }
        }
    }
}

/// Counters carried through insert/update/delete, supplementing the design
/// doc's in-process bookkeeping (design doc §G.4) — not a reporting
/// surface, which stays out of scope per §1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    pub live_count: usize,
    pub tombstone_count: u64,
}

const PARALLEL_ENUMERATION_THRESHOLD: usize = 10_000;

/// The pattern-matching index engine. Generic over the ExternalRef type `R`
/// the host resolves hits back to, and the bitmap backend `B`.
pub struct Engine<R: Clone + PartialEq, B: RecordBitmap> {
    config: IndexConfig,
    columns: Vec<ColumnIndex<B>>,
    store: RecordStore<R, B>,
    all_live: B,
    lock: RWSpinlock,
}

impl<R: Clone + PartialEq, B: RecordBitmap> Engine<R, B> {
    pub fn new(config: IndexConfig) -> Self {
        let columns = config
            .columns
            .iter()
            .map(|_| ColumnIndex::new(config.case_insensitive))
            .collect();
        Engine {
            config,
            columns,
            store: RecordStore::new(),
            all_live: B::new(),
            lock: RWSpinlock::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Insert a record, or update it in place if `external_ref` already
    /// names a live record (design doc §4.6). `values` must have one entry
    /// per configured column.
    pub fn insert(&mut self, external_ref: R, values: Vec<String>) -> Result<RecordId> {
        if values.len() != self.config.columns.len() {
            return Err(BiscuitError::InvalidPattern {
                reason: format!(
                    "expected {} column values, got {}",
                    self.config.columns.len(),
                    values.len()
                ),
            });
        }

        let _guard = self.lock.acquire_write();
        let id = match self.store.allocate(&external_ref) {
            Allocation::New(id) => id,
            Allocation::Reclaimed(id) => {
                debug!("insert reclaiming existing slot {id} for update");
                for col in self.columns.iter_mut() {
                    col.remove_record(id);
                }
                id
            }
        };

        let folded: Vec<String> = if self.config.case_insensitive {
            values.iter().map(|v| fold(v)).collect()
        } else {
            Vec::new()
        };

        for (ci, value) in values.iter().enumerate() {
            let folded_ref = folded.get(ci).map(|s| s.as_str());
            self.columns[ci].index_text(id, value, folded_ref);
        }

        self.store.write(id, external_ref, values, folded);
        self.all_live.add(id);
        Ok(id)
    }

    /// Tombstone every live record for which `should_delete` returns true.
    /// Triggers compaction automatically once the tombstone count reaches
    /// [`IndexConfig::compaction_threshold`].
    pub fn bulk_delete(&mut self, should_delete: impl FnMut(&R) -> bool) -> usize {
        let _guard = self.lock.acquire_write();
        let deleted = self.store.bulk_delete(should_delete);
        self.all_live.difference_with(self.store.tombstones());
        if self.store.tombstone_count() as usize >= self.config.compaction_threshold {
            self.compact_locked();
        }
        deleted
    }

    /// Force a compaction pass regardless of the configured threshold.
    pub fn compact(&mut self) {
        let _guard = self.lock.acquire_write();
        if self.store.tombstone_count() > 0 {
            self.compact_locked();
        }
    }

    fn compact_locked(&mut self) {
        let tombstones = self.store.tombstones().clone();
        let count = tombstones.cardinality();
        for col in self.columns.iter_mut() {
            col.compact(&tombstones);
        }
        self.store.compact();
        info!("compaction complete: {count} tombstones removed");
    }

    /// Evaluate a multi-column predicate list and return the matching
    /// live RecordIds. Predicates are reordered by estimated selectivity
    /// before execution (design doc §4.5); the candidate set is
    /// tombstone-filtered before being returned.
    pub fn query(&self, predicates: &[Predicate]) -> Result<Vec<RecordId>> {
        self.query_cancellable(predicates, None)
    }

    pub fn query_cancellable(
        &self,
        predicates: &[Predicate],
        cancellation: Option<&CancellationToken>,
    ) -> Result<Vec<RecordId>> {
        for p in predicates {
            if p.column_index >= self.columns.len() {
                return Err(BiscuitError::InvalidPattern {
                    reason: format!("column index {} out of range", p.column_index),
                });
            }
            if p.mode.is_case_insensitive() && !self.config.case_insensitive {
                return Err(BiscuitError::InvalidPattern {
                    reason: "ILIKE requested but this index was built without a folded shadow index"
                        .into(),
                });
            }
        }

        let _guard = self.lock.acquire_read();
        let mut result = planner::execute(
            predicates,
            &self.all_live,
            |pred| {
                let col = &self.columns[pred.column_index];
                let folded = pred.mode.is_case_insensitive();
                let (chars, lens) = if folded {
                    (
                        col.folded_chars.as_ref().expect("validated above"),
                        col.folded_lens.as_ref().expect("validated above"),
                    )
                } else {
                    (&col.chars, &col.lens)
                };
                let column_index = pred.column_index;
                let text_of = |id: u32| self.store.column_text(id, column_index, folded);
                pattern::eval(&pred.pattern, chars, lens, &self.all_live, &text_of)
            },
            || cancellation.map(CancellationToken::is_cancelled).unwrap_or(false),
        )?;
        result.difference_with(self.store.tombstones());
        Ok(result.iter().collect())
    }

    pub fn stats(&self) -> Stats {
        let store_stats = self.store.stats();
        Stats {
            insert_count: store_stats.insert_count,
            update_count: store_stats.update_count,
            delete_count: store_stats.delete_count,
            live_count: self.store.live_count(),
            tombstone_count: self.store.tombstone_count(),
        }
    }

    /// Build the on-open persistence marker for the current live count
    /// (design doc §6 — bitmaps are never persisted, only this marker).
    pub fn marker(&self) -> IndexMarker {
        IndexMarker::new(self.store.live_count() as u32)
    }

    /// Validate a marker read back at open time against the live record
    /// count the host's source table reports; a mismatch is an integrity
    /// error that should drive a full rebuild (design doc §7).
    pub fn check_marker(marker: &IndexMarker, observed_record_count: u32) -> Result<()> {
        match marker.validate(observed_record_count) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("index marker integrity check failed: {e}");
                Err(e)
            }
        }
    }
}

impl<R: Clone + PartialEq + Send + Sync, B: RecordBitmap + Sync> Engine<R, B> {
    /// Resolve RecordIds to ExternalRefs. Small result sets are copied
    /// single-threaded; sets at or above the parallel-enumeration threshold
    /// are split across worker threads and joined before returning (design
    /// doc §5 "TID result assembly").
    pub fn resolve(&self, ids: &[RecordId]) -> Vec<R> {
        self.resolve_cancellable(ids, None)
            .expect("resolve without a cancellation token never returns Cancelled")
    }

    /// Same as [`Engine::resolve`], but polls `cancellation` at chunk
    /// boundaries during the parallel-enumeration path, matching the design
    /// doc §5 guarantee that a long TID collection observes the interrupt
    /// flag "at chunk boundaries" (the other half of that guarantee — between
    /// predicates in the planner — is covered by
    /// [`Engine::query_cancellable`]).
    pub fn resolve_cancellable(&self, ids: &[RecordId], cancellation: Option<&CancellationToken>) -> Result<Vec<R>> {
        let _guard = self.lock.acquire_read();
        if ids.len() < PARALLEL_ENUMERATION_THRESHOLD {
            return Ok(ids
                .iter()
                .filter_map(|&id| self.store.get(id).map(|r| r.external_ref.clone()))
                .collect());
        }

        let is_cancelled = || cancellation.map(CancellationToken::is_cancelled).unwrap_or(false);
        let chunk_count = 4usize;
        let chunk_size = (ids.len() + chunk_count - 1) / chunk_count;
        let store = &self.store;
        std::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(chunk_size.max(1))
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .filter_map(|&id| store.get(id).map(|r| r.external_ref.clone()))
                            .collect::<Vec<R>>()
                    })
                })
                .collect();
            let mut out = Vec::with_capacity(ids.len());
            for handle in handles {
                if is_cancelled() {
                    return Err(BiscuitError::Cancelled);
                }
                out.extend(handle.join().unwrap());
                if is_cancelled() {
                    return Err(BiscuitError::Cancelled);
                }
            }
            Ok(out)
        })
    }

    /// Same as [`Engine::resolve`] but sorted by the ExternalRef's own
    /// ordering, for hosts that consume results as an ordered index scan.
    /// Bitmap/aggregate scans should prefer [`Engine::resolve`] — the
    /// design doc notes sorting is a documented 20-40% cost on those.
    pub fn resolve_sorted(&self, ids: &[RecordId]) -> Vec<R>
    where
        R: Ord,
    {
        let mut refs = self.resolve(ids);
        refs.sort_unstable();
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(columns: &[&str]) -> IndexConfig {
        IndexConfig::new(columns.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_s1_prefix_suffix_underscore() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        for (i, word) in ["apple", "apply", "grape", "grail"].iter().enumerate() {
            engine.insert(i as u32, vec![word.to_string()]).unwrap();
        }

        let q = |pattern: &str| {
            let pred = Predicate::new(0, pattern, Mode::Like).unwrap();
            let mut ids = engine.query(&[pred]).unwrap();
            ids.sort_unstable();
            ids
        };
        assert_eq!(q("app%"), vec![0, 1]);
        assert_eq!(q("%ple"), vec![0]);
        assert_eq!(q("g_a%"), vec![2, 3]);
    }

    #[test]
    fn test_s2_ilike_vs_like() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        for (i, word) in ["Abc", "abc", "ABC", "abd"].iter().enumerate() {
            engine.insert(i as u32, vec![word.to_string()]).unwrap();
        }

        let pred = Predicate::new(0, "abc", Mode::ILike).unwrap();
        let mut ids = engine.query(&[pred]).unwrap();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);

        let pred = Predicate::new(0, "abc", Mode::Like).unwrap();
        let ids = engine.query(&[pred]).unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_update_on_existing_external_ref() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        let id = engine.insert(1, vec!["alpha".to_string()]).unwrap();
        let id2 = engine.insert(1, vec!["beta".to_string()]).unwrap();
        assert_eq!(id, id2, "same ExternalRef must reuse the same RecordId");

        let pred = Predicate::new(0, "alpha", Mode::Like).unwrap();
        assert!(engine.query(&[pred]).unwrap().is_empty());
        let pred = Predicate::new(0, "beta", Mode::Like).unwrap();
        assert_eq!(engine.query(&[pred]).unwrap(), vec![id]);
    }

    #[test]
    fn test_bulk_delete_and_compaction_cardinality() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        for i in 0..100u32 {
            engine.insert(i, vec!["x".to_string()]).unwrap();
        }
        engine.bulk_delete(|r| *r < 50);
        let pred = Predicate::new(0, "%", Mode::Like).unwrap();
        assert_eq!(engine.query(&[pred]).unwrap().len(), 50);
        assert_eq!(engine.stats().tombstone_count, 50);
    }

    #[test]
    fn test_multicolumn_planner_ordering() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["name", "city"]));
        engine.insert(0, vec!["Alice".into(), "NYC".into()]).unwrap();
        engine.insert(1, vec!["Alicia".into(), "NYC".into()]).unwrap();
        engine.insert(2, vec!["Alice".into(), "LA".into()]).unwrap();

        let preds = vec![
            Predicate::new(0, "Alic%", Mode::Like).unwrap(),
            Predicate::new(1, "NYC", Mode::Like).unwrap(),
        ];
        let mut ids = engine.query(&preds).unwrap();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_not_like() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        engine.insert(0, vec!["apple".into()]).unwrap();
        engine.insert(1, vec!["grape".into()]).unwrap();
        let pred = Predicate::new(0, "app%", Mode::NotLike).unwrap();
        assert_eq!(engine.query(&[pred]).unwrap(), vec![1]);
    }

    #[test]
    fn test_marker_round_trip() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        engine.insert(0, vec!["a".into()]).unwrap();
        let marker = engine.marker();
        assert!(Engine::<u32, ArrayBitmap>::check_marker(&marker, 1).is_ok());
        assert!(Engine::<u32, ArrayBitmap>::check_marker(&marker, 2).is_err());
    }

    #[test]
    fn test_resolve_cancellable_observes_pre_cancelled_token() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        let ids: Vec<RecordId> = (0..PARALLEL_ENUMERATION_THRESHOLD as u32 + 1)
            .map(|i| engine.insert(i, vec!["x".to_string()]).unwrap())
            .collect();

        let token = CancellationToken::new();
        token.cancel();
        let err = engine.resolve_cancellable(&ids, Some(&token)).unwrap_err();
        assert!(matches!(err, BiscuitError::Cancelled));
    }

    #[test]
    fn test_resolve_cancellable_without_token_matches_resolve() {
        let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config(&["word"]));
        let ids: Vec<RecordId> = (0..PARALLEL_ENUMERATION_THRESHOLD as u32 + 1)
            .map(|i| engine.insert(i, vec!["x".to_string()]).unwrap())
            .collect();
        assert_eq!(engine.resolve_cancellable(&ids, None).unwrap().len(), ids.len());
    }
}
