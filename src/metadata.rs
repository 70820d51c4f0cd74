//! Lazily materialized per-object side record.
//!
//! Every [HeapObjectHeader] has a metadata slot at a fixed offset. It stays null until the
//! first weak access to the object, at which point an [ObjectMetadata] is created and
//! installed with a compare-and-swap. The record is owned by its object, is never shared, and
//! is freed when the object is reclaimed.

use std::{
    ptr::null_mut,
    sync::atomic::{AtomicPtr, Ordering},
};

use crate::header::HeapObjectHeader;

pub struct ObjectMetadata {
    /// Header of the object's [WeakCounter](crate::counter::WeakCounter), or null.
    weak_counter: AtomicPtr<HeapObjectHeader>,
}

impl ObjectMetadata {
    pub(crate) fn new() -> Self {
        Self {
            weak_counter: AtomicPtr::new(null_mut()),
        }
    }

    #[inline(always)]
    pub fn weak_counter_address(&self) -> *mut HeapObjectHeader {
        self.weak_counter.load(Ordering::Acquire)
    }

    /// Commits `counter` as the weak counter if none has been committed yet.
    ///
    /// On failure the slot is left untouched and the already committed counter is returned.
    #[inline]
    pub fn set_weak_counter_address(
        &self,
        counter: *mut HeapObjectHeader,
    ) -> Result<(), *mut HeapObjectHeader> {
        debug_assert!(!counter.is_null());
        self.weak_counter
            .compare_exchange(null_mut(), counter, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }
}

/// Returns metadata of `object`, creating it if this is the first weak access.
///
/// Safe to race: every caller observes the same record. A losing candidate is freed
/// immediately since it was never published.
pub fn get_or_make_meta(object: &HeapObjectHeader) -> &ObjectMetadata {
    let slot = object.metadata_slot();
    let current = slot.load(Ordering::Acquire);
    if !current.is_null() {
        return unsafe { &*current };
    }
    let candidate = Box::into_raw(Box::new(ObjectMetadata::new()));
    match slot.compare_exchange(null_mut(), candidate, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => unsafe { &*candidate },
        Err(winner) => unsafe {
            drop(Box::from_raw(candidate));
            &*winner
        },
    }
}

/// Weak counter address of `object`, or null if the object has none yet.
pub fn weak_counter_address(object: &HeapObjectHeader) -> *mut HeapObjectHeader {
    let meta = object.metadata();
    if meta.is_null() {
        null_mut()
    } else {
        unsafe { (*meta).weak_counter_address() }
    }
}

/// Frees metadata of an object that is being reclaimed.
///
/// # Safety
/// Must only be called by the collector on an unreachable object.
pub(crate) unsafe fn destroy_meta(object: &HeapObjectHeader) {
    let meta = object.metadata_slot().swap(null_mut(), Ordering::AcqRel);
    if !meta.is_null() {
        drop(Box::from_raw(meta));
    }
}
