//! Compressed set of 32-bit record-ids, with a trivial bit-array fallback.
//!
//! Two backends implement [`RecordBitmap`], the way `CRoaring` and
//! `NoBitmap` both implemented the storage core's `Bloom` trait: a
//! production backend (`CroaringBitmap`, wrapping [`croaring::Bitmap`]) and
//! a dependency-free fallback (`ArrayBitmap`, a flat `Vec<u64>` word array).
//! The matcher is generic over the trait, so swapping backends never shows
//! up in the pattern-matching hot loop.

use croaring::Bitmap as Croaring;

/// Contract every bitmap backend must satisfy (design doc §4.1).
///
/// `add`/`remove` of a value already at the desired membership state are
/// no-ops; `iter` over an empty bitmap yields nothing.
pub trait RecordBitmap: Clone {
    fn new() -> Self;
    fn add(&mut self, x: u32);
    fn remove(&mut self, x: u32);
    fn contains(&self, x: u32) -> bool;
    fn cardinality(&self) -> u64;
    fn is_empty(&self) -> bool;
    fn intersect_with(&mut self, other: &Self);
    fn union_with(&mut self, other: &Self);
    fn difference_with(&mut self, other: &Self);
    fn add_range(&mut self, lo: u32, hi: u32);
    fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_>;
}

/// Compressed backend wrapping a roaring bitmap. The default, production
/// choice: bulk set operations are sub-linear in practice and serialization
/// is handled by the underlying library.
#[derive(Clone, Default)]
pub struct CroaringBitmap(Croaring);

impl RecordBitmap for CroaringBitmap {
    #[inline]
    fn new() -> Self {
        CroaringBitmap(Croaring::create())
    }

    #[inline]
    fn add(&mut self, x: u32) {
        self.0.add(x);
    }

    #[inline]
    fn remove(&mut self, x: u32) {
        self.0.remove(x);
    }

    #[inline]
    fn contains(&self, x: u32) -> bool {
        self.0.contains(x)
    }

    #[inline]
    fn cardinality(&self) -> u64 {
        self.0.cardinality()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    fn intersect_with(&mut self, other: &Self) {
        self.0.and_inplace(&other.0);
    }

    #[inline]
    fn union_with(&mut self, other: &Self) {
        self.0.or_inplace(&other.0);
    }

    #[inline]
    fn difference_with(&mut self, other: &Self) {
        self.0.andnot_inplace(&other.0);
    }

    #[inline]
    fn add_range(&mut self, lo: u32, hi: u32) {
        self.0.add_range(lo..hi);
    }

    fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        Box::new(self.0.iter())
    }
}

/// Trivial fallback backend: one bit per record-id in a flat word array.
/// Correct but O(n) in the record-id space for every operation; kept for
/// hosts that can't (or don't want to) link a compressed-bitmap library.
#[derive(Clone, Default)]
pub struct ArrayBitmap {
    words: Vec<u64>,
}

impl ArrayBitmap {
    fn ensure_word(&mut self, word_idx: usize) {
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }
    }
}

impl RecordBitmap for ArrayBitmap {
    #[inline]
    fn new() -> Self {
        ArrayBitmap { words: Vec::new() }
    }

    fn add(&mut self, x: u32) {
        let (w, b) = (x as usize / 64, x as u64 % 64);
        self.ensure_word(w);
        self.words[w] |= 1u64 << b;
    }

    fn remove(&mut self, x: u32) {
        let (w, b) = (x as usize / 64, x as u64 % 64);
        if w < self.words.len() {
            self.words[w] &= !(1u64 << b);
        }
    }

    fn contains(&self, x: u32) -> bool {
        let (w, b) = (x as usize / 64, x as u64 % 64);
        self.words.get(w).map_or(false, |word| word & (1u64 << b) != 0)
    }

    fn cardinality(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    fn intersect_with(&mut self, other: &Self) {
        for (i, w) in self.words.iter_mut().enumerate() {
            *w &= other.words.get(i).copied().unwrap_or(0);
        }
    }

    fn union_with(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (i, w) in other.words.iter().enumerate() {
            self.words[i] |= w;
        }
    }

    fn difference_with(&mut self, other: &Self) {
        for (i, w) in self.words.iter_mut().enumerate() {
            *w &= !other.words.get(i).copied().unwrap_or(0);
        }
    }

    fn add_range(&mut self, lo: u32, hi: u32) {
        for x in lo..hi {
            self.add(x);
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        Box::new(self.words.iter().enumerate().flat_map(|(w, word)| {
            let base = (w * 64) as u32;
            (0..64u32).filter_map(move |b| {
                if word & (1u64 << b) != 0 {
                    Some(base + b)
                } else {
                    None
                }
            })
        }))
    }
}
