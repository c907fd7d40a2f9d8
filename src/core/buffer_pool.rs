//! Fixed-depth ring of buffer slots for producer/consumer hand-off
//!
//! A pool owns `depth` slots addressed by index. The producer fills the slot
//! at the write cursor, the consumer drains the slot at the read cursor, and
//! the two cursors never overtake each other:
//!
//! - `full()`: every slot holds unread data, the producer must wait on `non_full`
//! - `empty()`: no slot holds unread data, the consumer must wait on `non_empty`
//!
//! All cursor inspection and movement happens through the [`PoolState`]
//! guard returned by [`BufferPool::lock`]. Slot contents may be moved out
//! with `std::mem::take` and filled without the lock; only the side that
//! owns the cursor ever touches that slot until the cursor advances.
//!
//! [`BufferPool::close`] provides cooperative cancellation: it wakes every
//! waiter, and the wait helpers report the pool as closed so callers can exit
//! their loops.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

/// Cursor state and slots, only reachable while holding the pool mutex
#[derive(Debug)]
pub struct PoolState<T> {
    slots: Vec<T>,
    read_pos: usize,
    write_pos: usize,
    used: usize,
    closed: bool,
}

impl<T> PoolState<T> {
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Every slot holds unread data
    pub fn full(&self) -> bool {
        self.used == self.slots.len()
    }

    /// No slot holds unread data
    pub fn empty(&self) -> bool {
        self.used == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Slot at the write cursor
    pub fn write_slot(&mut self) -> &mut T {
        &mut self.slots[self.write_pos]
    }

    /// Slot at the read cursor
    pub fn read_slot(&mut self) -> &mut T {
        &mut self.slots[self.read_pos]
    }

    /// Publish the write slot. Must not be called while full.
    pub fn advance_write_pos(&mut self) {
        debug_assert!(!self.full(), "write cursor would lap read cursor");
        self.write_pos = (self.write_pos + 1) % self.slots.len();
        self.used += 1;
    }

    /// Release the read slot. Must not be called while empty.
    pub fn advance_read_pos(&mut self) {
        debug_assert!(!self.empty(), "read cursor would pass write cursor");
        self.read_pos = (self.read_pos + 1) % self.slots.len();
        self.used -= 1;
    }

    /// Discard every unread slot, returning how many were dropped
    pub fn drain(&mut self) -> usize {
        let dropped = self.used;
        self.read_pos = self.write_pos;
        self.used = 0;
        dropped
    }
}

/// Hand-off counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots published by the producer
    pub produced: u64,
    /// Slots released by the consumer
    pub consumed: u64,
}

/// Bounded ring with `non_full` / `non_empty` signalling
#[derive(Debug)]
pub struct BufferPool<T> {
    state: Mutex<PoolState<T>>,
    non_full: Condvar,
    non_empty: Condvar,
    produced: AtomicU64,
    consumed: AtomicU64,
}

impl<T: Default> BufferPool<T> {
    /// Create a pool of `depth` default slots (at least 2)
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(2);
        Self::with_slots((0..depth).map(|_| T::default()).collect())
    }
}

impl<T> BufferPool<T> {
    /// Create a pool from pre-sized slots
    pub fn with_slots(slots: Vec<T>) -> Self {
        BufferPool {
            state: Mutex::new(PoolState {
                slots,
                read_pos: 0,
                write_pos: 0,
                used: 0,
                closed: false,
            }),
            non_full: Condvar::new(),
            non_empty: Condvar::new(),
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock()
    }

    /// Block until a slot is writable. Returns `false` if the pool closed.
    pub fn wait_for_non_full(&self, guard: &mut MutexGuard<'_, PoolState<T>>) -> bool {
        while guard.full() && !guard.closed {
            self.non_full.wait(guard);
        }
        !guard.closed
    }

    /// Block until a slot is readable. Slots published before `close()` are
    /// still handed out; returns `false` once the pool is closed and empty.
    pub fn wait_for_non_empty(&self, guard: &mut MutexGuard<'_, PoolState<T>>) -> bool {
        while guard.empty() && !guard.closed {
            self.non_empty.wait(guard);
        }
        !guard.empty()
    }

    /// Wake the producer after a slot was released
    pub fn signal_non_full(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        self.non_full.notify_all();
    }

    /// Wake the consumer after a slot was published
    pub fn signal_non_empty(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        self.non_empty.notify_all();
    }

    /// Mark the pool closed and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.non_full.notify_all();
        self.non_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            produced: self.produced.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
        }
    }
}
