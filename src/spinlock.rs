//! Read-write spinlock enforcing the per-index mutex discipline: `query`
//! and `enumerate_ids` take shared access, `insert`/`bulk_delete`/`compact`
//! take exclusive access, and no suspension point is reached while the
//! latch is held.
//!
//! Same latch-and-spin construction as before: a single `AtomicU64` packs
//! a reader count into the low 62 bits and a latch/lock flag pair into the
//! top two, so acquiring a lock never blocks on the OS scheduler.
//!
//! Imagine a door leading into a room:
//! 1. The door has a latch and a lock.
//! 2. A **reader** can enter only when the door is un-locked and un-latched.
//! 3. A **writer** can enter only when the door is un-locked, un-latched,
//!    and there is no other reader or writer in the room.
//! 4. Once latched by a writer, no other writer or reader can enter, but
//!    readers already inside can finish and exit.
//! 5. A writer locks the door only after all readers have exited.
//! 6. Callers spin until the needed permission is available.

use std::sync::atomic::{
    AtomicU64,
    Ordering::{Acquire, SeqCst},
};
use std::thread;

pub struct RWSpinlock {
    value: AtomicU64,
    conflicts: AtomicU64,
}

impl RWSpinlock {
    const LATCH_FLAG: u64 = 0x4000_0000_0000_0000;
    const LOCK_FLAG: u64 = 0x8000_0000_0000_0000;
    const LATCH_LOCK_FLAG: u64 = 0xC000_0000_0000_0000;
    const READERS_FLAG: u64 = 0x3FFF_FFFF_FFFF_FFFF;

    pub fn new() -> RWSpinlock {
        RWSpinlock {
            value: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Acquire read permission; spins while a writer holds the latch.
    pub fn acquire_read(&self) -> Reader<'_> {
        loop {
            let c = self.value.load(SeqCst);
            if (c & Self::LATCH_LOCK_FLAG) == 0 {
                let n = c + 1;
                if self.value.compare_exchange(c, n, SeqCst, Acquire) == Ok(c) {
                    break Reader { door: self };
                }
            }
            self.conflicts.fetch_add(1, SeqCst);
            thread::yield_now();
        }
    }

    /// Acquire write permission; spins for the latch, then spins again
    /// until every in-flight reader has exited.
    pub fn acquire_write(&self) -> Writer<'_> {
        loop {
            let c = self.value.load(SeqCst);
            if (c & Self::LATCH_FLAG) == 0 {
                let n = c | Self::LATCH_FLAG;
                if self.value.compare_exchange(c, n, SeqCst, Acquire) == Ok(c) {
                    break;
                }
            }
            self.conflicts.fetch_add(1, SeqCst);
            thread::yield_now();
        }
        loop {
            let c = self.value.load(SeqCst);
            if (c & Self::READERS_FLAG) == 0 {
                let n = c | Self::LOCK_FLAG;
                if self.value.compare_exchange(c, n, SeqCst, Acquire) == Ok(c) {
                    break Writer { door: self };
                }
                panic!("latch held, zero readers, but unable to lock");
            }
            self.conflicts.fetch_add(1, SeqCst);
            thread::yield_now();
        }
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(SeqCst)
    }
}

impl Default for RWSpinlock {
    fn default() -> Self {
        RWSpinlock::new()
    }
}

/// Held while a reader is inside the critical section; releases on drop.
pub struct Reader<'a> {
    door: &'a RWSpinlock,
}

impl<'a> Drop for Reader<'a> {
    fn drop(&mut self) {
        self.door.value.fetch_sub(1, SeqCst);
    }
}

/// Held while a writer is inside the critical section; releases on drop.
pub struct Writer<'a> {
    door: &'a RWSpinlock,
}

impl<'a> Drop for Writer<'a> {
    fn drop(&mut self) {
        self.door.value.store(0, SeqCst);
    }
}

#[cfg(test)]
#[path = "spinlock_test.rs"]
mod spinlock_test;
