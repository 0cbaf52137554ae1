//! Length index (design doc §4.3, component C).
//!
//! Two arrays of bitmaps per column: `exact[k]` holds records whose
//! (character) length equals `k`; `ge[k]` holds records whose length is
//! `>= k`, maintained as the invariant `ge[k] = union_{j>=k} exact[j]`.
//! Both arrays are half-open `[0, max_len)` — the convention the design
//! doc's open question leaves to the implementation, resolved here to
//! match `original_source`'s own bound (`max_length_legacy` used directly
//! as an array length, with `for (j = 0; j < idx->max_length_legacy; j++)`
//! cleanup loops over it).

use crate::bitmap::RecordBitmap;

pub struct LengthIndex<B: RecordBitmap> {
    exact: Vec<B>,
    ge: Vec<B>,
}

impl<B: RecordBitmap> LengthIndex<B> {
    pub fn new() -> Self {
        LengthIndex {
            exact: Vec::new(),
            ge: Vec::new(),
        }
    }

    fn ensure_capacity(&mut self, len: usize) {
        if len >= self.exact.len() {
            // Geometric growth, mirroring the free-list/array doubling
            // the record store and original C index both use.
            let new_cap = (self.exact.len().max(1) * 2).max(len + 1);
            self.exact.resize_with(new_cap, B::new);
            self.ge.resize_with(new_cap, B::new);
        }
    }

    /// Insert `record_id`, whose text has character length `len`.
    pub fn insert(&mut self, record_id: u32, len: usize) {
        self.ensure_capacity(len);
        self.exact[len].add(record_id);
        for k in 0..=len {
            self.ge[k].add(record_id);
        }
    }

    /// Bitmap of records whose length equals exactly `len`.
    pub fn exact(&self, len: usize) -> Option<&B> {
        self.exact.get(len)
    }

    /// Bitmap of records whose length is `>= len`.
    pub fn ge(&self, len: usize) -> Option<&B> {
        self.ge.get(len)
    }

    /// Remove `record_id` from every length bitmap it belongs to. Used on
    /// the insert-on-existing-ExternalRef (update) path.
    pub fn remove_record(&mut self, record_id: u32) {
        for bitmap in self.exact.iter_mut() {
            bitmap.remove(record_id);
        }
        for bitmap in self.ge.iter_mut() {
            bitmap.remove(record_id);
        }
    }

    /// Compaction: subtract the tombstone set from every bitmap.
    pub fn compact(&mut self, tombstones: &B) {
        for bitmap in self.exact.iter_mut() {
            bitmap.difference_with(tombstones);
        }
        for bitmap in self.ge.iter_mut() {
            bitmap.difference_with(tombstones);
        }
    }

    pub fn max_len(&self) -> usize {
        self.exact.len()
    }
}

impl<B: RecordBitmap> Default for LengthIndex<B> {
    fn default() -> Self {
        LengthIndex::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::ArrayBitmap;

    #[test]
    fn test_ge_invariant() {
        let mut idx: LengthIndex<ArrayBitmap> = LengthIndex::new();
        idx.insert(1, 3);
        idx.insert(2, 5);
        idx.insert(3, 5);

        assert!(idx.exact(3).unwrap().contains(1));
        assert!(idx.exact(5).unwrap().contains(2));
        assert!(idx.exact(5).unwrap().contains(3));

        // ge[k] must equal the union of exact[j] for j >= k.
        for k in 0..=5 {
            let mut union = ArrayBitmap::new();
            for (len, id) in [(3, 1u32), (5, 2), (5, 3)] {
                if len >= k {
                    union.add(id);
                }
            }
            let ge = idx.ge(k).unwrap();
            assert_eq!(ge.cardinality(), union.cardinality(), "k={k}");
            for id in [1u32, 2, 3] {
                assert_eq!(ge.contains(id), union.contains(id), "k={k} id={id}");
            }
        }
    }

    #[test]
    fn test_remove_and_compact() {
        let mut idx: LengthIndex<ArrayBitmap> = LengthIndex::new();
        idx.insert(1, 4);
        idx.insert(2, 4);
        idx.remove_record(1);
        assert!(!idx.exact(4).unwrap().contains(1));
        assert!(idx.exact(4).unwrap().contains(2));

        let mut tomb = ArrayBitmap::new();
        tomb.add(2);
        idx.compact(&tomb);
        assert!(!idx.exact(4).unwrap().contains(2));
        assert!(!idx.ge(0).unwrap().contains(2));
    }
}
