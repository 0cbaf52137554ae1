//! Record store and CRUD (design doc §4.6, component F).
//!
//! Owns the RecordId allocator, the parallel ExternalRef/value arrays, the
//! tombstone set, and the free list. Does not own any positional or length
//! bitmap itself — those belong to the per-column indices the engine drives
//! around this store — but the tombstone set it maintains is the same
//! `RecordBitmap` type those indices compact against.

use crate::bitmap::RecordBitmap;

pub type RecordId = u32;

/// One stored record: a host-supplied external reference, one cached string
/// per indexed column, and the lowercase-folded shadow of each.
pub struct Record<R> {
    pub external_ref: R,
    pub values: Vec<String>,
    pub folded: Vec<String>,
    live: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
}

/// Outcome of [`RecordStore::allocate`]: a fresh slot, or an existing live
/// record reclaimed because its ExternalRef reappeared (the update path).
pub enum Allocation {
    New(RecordId),
    Reclaimed(RecordId),
}

pub struct RecordStore<R, B: RecordBitmap> {
    records: Vec<Option<Record<R>>>,
    free_list: Vec<RecordId>,
    next_id: RecordId,
    tombstones: B,
    stats: Stats,
}

impl<R: Clone + PartialEq, B: RecordBitmap> RecordStore<R, B> {
    pub fn new() -> Self {
        RecordStore {
            records: Vec::new(),
            free_list: Vec::new(),
            next_id: 0,
            tombstones: B::new(),
            stats: Stats::default(),
        }
    }

    /// Linear scan for a live record carrying `external_ref`. The design
    /// doc notes this may be host-hinted/indexable; no such hint exists
    /// here, so this is the straightforward baseline.
    pub fn find_live_by_external_ref(&self, external_ref: &R) -> Option<RecordId> {
        self.records.iter().enumerate().find_map(|(i, slot)| match slot {
            Some(r) if r.live && &r.external_ref == external_ref => Some(i as RecordId),
            _ => None,
        })
    }

    /// Reserve a slot for `external_ref`: reclaim an existing live record's
    /// slot if its ExternalRef reappears (update), else pop a free slot, else
    /// grow and allocate a fresh id. Does not write the record's values —
    /// callers must scrub the reclaimed id from every bitmap it still
    /// belongs to before calling [`RecordStore::write`].
    pub fn allocate(&mut self, external_ref: &R) -> Allocation {
        if let Some(id) = self.find_live_by_external_ref(external_ref) {
            self.stats.update_count += 1;
            return Allocation::Reclaimed(id);
        }
        if let Some(id) = self.free_list.pop() {
            self.tombstones.remove(id);
            self.stats.insert_count += 1;
            return Allocation::New(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        if id as usize >= self.records.len() {
            let new_cap = (self.records.len().max(1) * 2).max(id as usize + 1);
            self.records.resize_with(new_cap, || None);
        }
        self.stats.insert_count += 1;
        Allocation::New(id)
    }

    pub fn write(&mut self, id: RecordId, external_ref: R, values: Vec<String>, folded: Vec<String>) {
        self.records[id as usize] = Some(Record {
            external_ref,
            values,
            folded,
            live: true,
        });
    }

    pub fn get(&self, id: RecordId) -> Option<&Record<R>> {
        self.records.get(id as usize).and_then(|r| r.as_ref()).filter(|r| r.live)
    }

    pub fn column_text(&self, id: RecordId, column: usize, folded: bool) -> Option<String> {
        self.get(id).and_then(|r| {
            let slice = if folded { &r.folded } else { &r.values };
            slice.get(column).cloned()
        })
    }

    /// Mark every live record for which `should_delete` returns true as
    /// tombstoned, pushing its id onto the free list. Returns the number of
    /// records newly tombstoned by this call.
    pub fn bulk_delete(&mut self, mut should_delete: impl FnMut(&R) -> bool) -> usize {
        let mut deleted = 0;
        for (i, slot) in self.records.iter_mut().enumerate() {
            if let Some(record) = slot {
                if record.live && should_delete(&record.external_ref) {
                    record.live = false;
                    self.tombstones.add(i as u32);
                    self.free_list.push(i as u32);
                    deleted += 1;
                }
            }
        }
        self.stats.delete_count += deleted as u64;
        deleted
    }

    pub fn tombstones(&self) -> &B {
        &self.tombstones
    }

    pub fn tombstone_count(&self) -> u64 {
        self.tombstones.cardinality()
    }

    /// Drop cached values for every tombstoned slot and reset the tombstone
    /// set. Callers are responsible for compacting every bitmap index
    /// against the tombstone set *before* calling this (it clears the set
    /// those bitmaps would otherwise be subtracted against).
    pub fn compact(&mut self) {
        for id in self.tombstones.iter() {
            self.records[id as usize] = None;
        }
        self.tombstones = B::new();
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn live_count(&self) -> usize {
        self.records.iter().filter(|r| matches!(r, Some(rec) if rec.live)).count()
    }
}

impl<R: Clone + PartialEq, B: RecordBitmap> Default for RecordStore<R, B> {
    fn default() -> Self {
        RecordStore::new()
    }
}
