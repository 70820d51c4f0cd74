//! Weak processing, the collector-side half of the weak reference protocol.
//!
//! [WeakCounterTable::sweep] is the hook a collection cycle runs after marking has finished and
//! before a single byte is reclaimed. Any counter whose referent was not marked is cleared at
//! that point, so a mutator can never read an address whose memory was already given back.

use std::ptr::NonNull;

use crate::{counter::WeakCounter, gcref::Gc, header::HeapObjectHeader};

/// Counters whose referent may still be alive.
#[derive(Default)]
pub struct WeakCounterTable {
    counters: Vec<Gc<WeakCounter>>,
}

/// What a single pass of weak processing did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeakSweepOutcome {
    /// Counters cleared because their referent died.
    pub cleared: usize,
    /// Counters that died themselves and were forgotten.
    pub retired: usize,
    /// Counters still tracking a live referent.
    pub retained: usize,
}

impl WeakCounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a counter that has just been committed as canonical.
    pub fn register(&mut self, counter: Gc<WeakCounter>) {
        self.counters.push(counter);
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Clears every counter whose referent is not live and forgets counters that are
    /// unreachable themselves. Cleared counters are dropped from the table as well since
    /// there is nothing left to do for them.
    ///
    /// # Safety
    /// Must run while the world is stopped, after marking and before reclaiming. `is_live`
    /// must answer from the mark state of the current cycle.
    pub unsafe fn sweep(
        &mut self,
        mut is_live: impl FnMut(NonNull<HeapObjectHeader>) -> bool,
    ) -> WeakSweepOutcome {
        let mut outcome = WeakSweepOutcome::default();
        self.counters.retain(|counter| {
            if !is_live(counter.base) {
                outcome.retired += 1;
                return false;
            }
            match counter.payload() {
                Some(referent) if is_live(referent.header()) => {
                    outcome.retained += 1;
                    true
                }
                Some(_) => {
                    counter.clear();
                    outcome.cleared += 1;
                    false
                }
                None => false,
            }
        });
        outcome
    }
}
