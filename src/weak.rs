//! Weak reference protocol: get-or-create a referent's counter and resolve a counter back to
//! its referent.
//!
//! ```text
//!  referent header ──metadata──> ObjectMetadata ──(strong)──> WeakCounter
//!        ^                                                       │
//!        └──────────────────(untraced)───────────────────────────┘
//! ```
//!
//! [Mutator::get_counter] returns an existing counter with a single acquire load of the metadata
//! slot. Only the first access per referent enters a mutator operation, since it allocates.
//! [Mutator::counter_get] reads the payload and roots the referent inside one mutator operation,
//! so a cycle either finishes before the read (and the payload is already cleared) or starts
//! after the root is in place. Entering an operation is two atomic stores and an atomic load;
//! it only waits when a cycle is running at that moment.

use std::{
    hash::{Hash, Hasher},
    marker::PhantomData,
    ptr::NonNull,
};

use crate::{
    counter::WeakCounter,
    error::AllocResult,
    gcref::{Collectable, Gc, Trace, UntracedRef, UntypedGcRef, Visitor},
    metadata::{self, get_or_make_meta},
    mutator::{Mutator, Root},
};

impl<'h> Mutator<'h> {
    /// Returns the weak counter of `referent`, allocating it on first access.
    ///
    /// Repeated calls for the same live referent return the same counter, also when threads
    /// race on the first call. The counter lives at least as long as `referent`, which must be
    /// alive (rooted, or obtained in the current scope). The only failure is running out of
    /// memory while allocating the counter, in which case no counter is committed.
    pub fn get_counter(&self, referent: impl Into<UntypedGcRef>) -> AllocResult<Gc<WeakCounter>> {
        let referent = referent.into();
        let header = unsafe { &*referent.header().as_ptr() };
        if let Some(counter) = NonNull::new(metadata::weak_counter_address(header)) {
            return Ok(Gc {
                base: counter,
                marker: PhantomData,
            });
        }

        let _scope = self.enter();
        let heap = self.heap();
        let meta = get_or_make_meta(header);
        if let Some(counter) = NonNull::new(meta.weak_counter_address()) {
            return Ok(Gc {
                base: counter,
                marker: PhantomData,
            });
        }
        let candidate = heap.allocate_raw(WeakCounter::new(UntracedRef::of(referent)))?;
        match meta.set_weak_counter_address(candidate.base.as_ptr()) {
            Ok(()) => {
                heap.write_barrier(candidate);
                heap.weak_counters.lock().register(candidate);
                heap.counters.weak_counters_created.fetch_and_add(1);
                log::trace!(
                    "[weak] created counter {:p} for {:p} ({})",
                    candidate,
                    referent,
                    header.type_name()
                );
                Ok(candidate)
            }
            Err(winner) => {
                // The candidate was never published and is reclaimed by the next cycle.
                heap.counters.weak_install_races.fetch_and_add(1);
                log::debug!(
                    "[weak] lost counter install race for {:p}, discarding {:p}",
                    referent,
                    candidate
                );
                Ok(Gc {
                    base: unsafe { NonNull::new_unchecked(winner) },
                    marker: PhantomData,
                })
            }
        }
    }

    /// Resolves `counter` to its referent, or `None` once the referent has been collected.
    ///
    /// The referent is rooted in this mutator until the returned [Root] is dropped. Never
    /// allocates heap objects; the root table may grow.
    pub fn counter_get(&self, counter: Gc<WeakCounter>) -> Option<Root<'_, UntypedGcRef>> {
        let _scope = self.enter();
        let referent = counter.payload()?;
        Some(self.root(unsafe { referent.to_gc() }))
    }

    /// Creates a typed weak handle to `referent`.
    pub fn allocate_weak<T: Collectable>(&self, referent: Gc<T>) -> AllocResult<Weak<T>> {
        Ok(Weak {
            counter: Some(self.get_counter(referent)?),
            marker: PhantomData,
        })
    }
}

/// Typed weak reference. All handles to one referent share its [WeakCounter], so two handles
/// compare equal exactly when they were created for the same object.
pub struct Weak<T: Collectable> {
    counter: Option<Gc<WeakCounter>>,
    marker: PhantomData<T>,
}

impl<T: Collectable> Weak<T> {
    /// Returns the referent, rooted in `mutator`, if it is still alive.
    pub fn upgrade<'m>(&self, mutator: &'m Mutator<'_>) -> Option<Root<'m, Gc<T>>> {
        mutator.counter_get(self.counter?)?.downcast::<T>().ok()
    }

    pub fn counter(&self) -> Option<Gc<WeakCounter>> {
        self.counter
    }

    /// Detaches this handle from its counter. Other handles and the referent are not affected.
    pub fn clear(&mut self) {
        self.counter = None;
    }

    pub fn is_cleared(&self) -> bool {
        match self.counter {
            Some(counter) => counter.is_cleared(),
            None => true,
        }
    }
}

impl<T: Collectable> Clone for Weak<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: Collectable> Copy for Weak<T> {}

impl<T: Collectable> PartialEq for Weak<T> {
    fn eq(&self, other: &Self) -> bool {
        self.counter == other.counter
    }
}
impl<T: Collectable> Eq for Weak<T> {}
impl<T: Collectable> Hash for Weak<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.counter.hash(state);
    }
}

impl<T: Collectable> std::fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.counter {
            Some(counter) => write!(f, "Weak({:?})", *counter),
            None => write!(f, "Weak(detached)"),
        }
    }
}

unsafe impl<T: Collectable> Trace for Weak<T> {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        self.counter.trace(vis);
    }
}
impl<T: Collectable> Collectable for Weak<T> {}
