//! C API for the weak reference protocol. Objects cross the boundary as header pointers.
//!
//! Both functions are meant to be called from native code running inside a
//! [MutatorScope](crate::mutator::MutatorScope) of `mutator`. No cycle runs while that scope is
//! open, so the returned objects stay valid until it closes; root them with
//! [Mutator::root] to keep them longer.

use std::ptr::{null_mut, NonNull};

use crate::{counter::WeakCounter, gcref::UntypedGcRef, header::HeapObjectHeader, mutator::Mutator};

/// Returns the weak counter of `referent`, or null if it could not be allocated.
///
/// # Safety
/// `mutator` must be the calling thread's live mutator and `referent` a live object of its heap.
#[no_mangle]
pub unsafe extern "C" fn tether_weak_get_counter(
    mutator: *const Mutator,
    referent: *mut HeapObjectHeader,
) -> *mut HeapObjectHeader {
    let referent = match NonNull::new(referent) {
        Some(header) => UntypedGcRef::from_header(header),
        None => return null_mut(),
    };
    match (*mutator).get_counter(referent) {
        Ok(counter) => counter.header().as_ptr(),
        Err(error) => {
            log::debug!("[weak] tether_weak_get_counter: {}", error);
            null_mut()
        }
    }
}

/// Returns the referent of `counter`, or null if it was collected or `counter` is not a weak
/// counter.
///
/// # Safety
/// `mutator` must be the calling thread's live mutator, currently inside a scope, and `counter`
/// a live object of its heap.
#[no_mangle]
pub unsafe extern "C" fn tether_weak_counter_get(
    mutator: *const Mutator,
    counter: *mut HeapObjectHeader,
) -> *mut HeapObjectHeader {
    let mutator = &*mutator;
    debug_assert!(mutator.is_in_scope());
    let counter = match NonNull::new(counter)
        .and_then(|header| UntypedGcRef::from_header(header).downcast::<WeakCounter>())
    {
        Some(counter) => counter,
        None => return null_mut(),
    };
    match mutator.counter_get(counter) {
        Some(referent) => referent.header().as_ptr(),
        None => null_mut(),
    }
}
