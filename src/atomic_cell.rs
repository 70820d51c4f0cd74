//! Integer cell with fetch-and-add.
//!
//! The flavour is picked at build time by the `threads` feature: with it [AtomicCell] is a
//! [SyncCell] backed by a hardware read-modify-write, without it [AtomicCell] is an
//! [UnsyncCell] that performs a plain read-modify-write and is not `Sync`.
//!
//! Cells are only used for monotonic counters, never to order other memory.

use std::cell::Cell;
use std::sync::atomic::{AtomicIsize, Ordering};

#[cfg(feature = "threads")]
pub type AtomicCell = SyncCell;
#[cfg(not(feature = "threads"))]
pub type AtomicCell = UnsyncCell;

/// Lock-free cell. Every update is a sequentially consistent `fetch_add`.
#[repr(transparent)]
pub struct SyncCell {
    value: AtomicIsize,
}

impl SyncCell {
    pub const fn new(value: isize) -> Self {
        Self {
            value: AtomicIsize::new(value),
        }
    }
    /// Adds `delta` and returns the new value.
    #[inline(always)]
    pub fn fetch_and_add(&self, delta: isize) -> isize {
        self.value
            .fetch_add(delta, Ordering::SeqCst)
            .wrapping_add(delta)
    }
    #[inline(always)]
    pub fn get(&self) -> isize {
        self.value.load(Ordering::SeqCst)
    }
}

/// Single-threaded cell. No concurrent observer exists so no ordering is provided.
#[repr(transparent)]
pub struct UnsyncCell {
    value: Cell<isize>,
}

impl UnsyncCell {
    pub const fn new(value: isize) -> Self {
        Self {
            value: Cell::new(value),
        }
    }
    /// Adds `delta` and returns the new value.
    #[inline(always)]
    pub fn fetch_and_add(&self, delta: isize) -> isize {
        let value = self.value.get().wrapping_add(delta);
        self.value.set(value);
        value
    }
    #[inline(always)]
    pub fn get(&self) -> isize {
        self.value.get()
    }
}

impl Default for SyncCell {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Default for UnsyncCell {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for SyncCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncCell({})", self.get())
    }
}

impl std::fmt::Debug for UnsyncCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UnsyncCell({})", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsync_cell_adds_sequentially() {
        let cell = UnsyncCell::new(0);
        assert_eq!(cell.fetch_and_add(1), 1);
        assert_eq!(cell.fetch_and_add(1), 2);
        assert_eq!(cell.fetch_and_add(1), 3);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn sync_cell_returns_new_value() {
        let cell = SyncCell::new(10);
        assert_eq!(cell.fetch_and_add(5), 15);
        assert_eq!(cell.fetch_and_add(-20), -5);
        assert_eq!(cell.get(), -5);
    }

    #[test]
    fn sync_cell_counts_every_increment() {
        let cell = SyncCell::new(0);
        crossbeam_utils::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|_| {
                    for _ in 0..1000 {
                        cell.fetch_and_add(1);
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(cell.get(), 8000);
    }
}
