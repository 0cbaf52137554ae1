//! Positional character index (design doc §4.2, component B).
//!
//! For each byte value (0..256) two sorted arrays of `(position, bitmap)`
//! map a character position to the set of records whose text has that byte
//! at that position — one array anchored at the start of the text
//! (`pos`, position ≥ 0), one anchored at the end (`neg`, position < 0, so
//! `-1` is the last character). A third per-byte bitmap (`cache`) is the
//! union across all positions, used as a coarse pre-filter.
//!
//! Position sets are sparse, so a sorted array with binary-search lookup
//! beats a hashed layout on memory and keeps cache locality for the common
//! case where the matcher probes adjacent positions.

use crate::bitmap::RecordBitmap;

const BYTE_RANGE: usize = 256;

struct PositionMap<B: RecordBitmap> {
    entries: Vec<(i32, B)>,
}

impl<B: RecordBitmap> PositionMap<B> {
    fn new() -> Self {
        PositionMap { entries: Vec::new() }
    }

    fn get(&self, position: i32) -> Option<&B> {
        self.entries
            .binary_search_by_key(&position, |(p, _)| *p)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    fn get_or_insert(&mut self, position: i32) -> &mut B {
        match self.entries.binary_search_by_key(&position, |(p, _)| *p) {
            Ok(idx) => &mut self.entries[idx].1,
            Err(idx) => {
                self.entries.insert(idx, (position, B::new()));
                &mut self.entries[idx].1
            }
        }
    }

    fn remove_record(&mut self, record_id: u32) {
        for (_, bitmap) in self.entries.iter_mut() {
            bitmap.remove(record_id);
        }
    }

    fn subtract(&mut self, tombstones: &B) {
        for (_, bitmap) in self.entries.iter_mut() {
            bitmap.difference_with(tombstones);
        }
    }
}

/// Per-column positional character index. Built twice per column: once over
/// the original text (case-sensitive), once over the folded text (for
/// ILIKE) — callers hold two `CharIndex` instances rather than this type
/// branching on case.
pub struct CharIndex<B: RecordBitmap> {
    pos: Vec<PositionMap<B>>,
    neg: Vec<PositionMap<B>>,
    cache: Vec<B>,
}

impl<B: RecordBitmap> CharIndex<B> {
    pub fn new() -> Self {
        CharIndex {
            pos: (0..BYTE_RANGE).map(|_| PositionMap::new()).collect(),
            neg: (0..BYTE_RANGE).map(|_| PositionMap::new()).collect(),
            cache: (0..BYTE_RANGE).map(|_| B::new()).collect(),
        }
    }

    /// Index one byte of one character of `record_id`'s text.
    /// `char_position` is 0-indexed from the start; `char_len_total` is the
    /// character length of the whole text, used to derive the end-relative
    /// (negative) position. Must be called for every byte of every
    /// character, with the same `char_position` for all bytes of one
    /// character (design doc §3's positional invariant).
    pub fn index_character(
        &mut self,
        record_id: u32,
        char_position: usize,
        byte: u8,
        char_len_total: usize,
    ) {
        let pos = char_position as i32;
        let neg = char_position as i32 - char_len_total as i32;
        self.pos[byte as usize].get_or_insert(pos).add(record_id);
        self.neg[byte as usize].get_or_insert(neg).add(record_id);
        self.cache[byte as usize].add(record_id);
    }

    /// Bitmap of records whose text has `byte` at start-relative position
    /// `p`. Returns `None` (treated as empty) for out-of-range positions —
    /// never allocates.
    pub fn get_pos(&self, byte: u8, p: i32) -> Option<&B> {
        self.pos[byte as usize].get(p)
    }

    /// Bitmap of records whose text has `byte` at end-relative position
    /// `p` (p < 0, -1 is the last character).
    pub fn get_neg(&self, byte: u8, p: i32) -> Option<&B> {
        self.neg[byte as usize].get(p)
    }

    /// Coarse pre-filter: records that contain `byte` anywhere.
    pub fn get_cache(&self, byte: u8) -> &B {
        &self.cache[byte as usize]
    }

    /// Remove `record_id` from every position and cache bitmap it belongs
    /// to. Used on the insert-on-existing-ExternalRef (update) path, where
    /// a record must be scrubbed before being re-indexed.
    pub fn remove_record(&mut self, record_id: u32) {
        for map in self.pos.iter_mut() {
            map.remove_record(record_id);
        }
        for map in self.neg.iter_mut() {
            map.remove_record(record_id);
        }
        for bitmap in self.cache.iter_mut() {
            bitmap.remove(record_id);
        }
    }

    /// Compaction: subtract the tombstone set from every bitmap this index
    /// owns, in place.
    pub fn compact(&mut self, tombstones: &B) {
        for map in self.pos.iter_mut() {
            map.subtract(tombstones);
        }
        for map in self.neg.iter_mut() {
            map.subtract(tombstones);
        }
        for bitmap in self.cache.iter_mut() {
            bitmap.difference_with(tombstones);
        }
    }
}

impl<B: RecordBitmap> Default for CharIndex<B> {
    fn default() -> Self {
        CharIndex::new()
    }
}
