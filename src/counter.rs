use atomic::{Atomic, Ordering};

use crate::gcref::{Collectable, Trace, UntracedRef};

/// Indirection object shared by every weak handle to one referent.
///
/// The counter is an ordinary collectable object, but its single payload is an [UntracedRef]:
/// marking never follows it, so the counter does not keep its referent alive. The payload is
/// written once when the counter is created and can afterwards only go from the referent to
/// `None` (cleared). A cleared counter never points anywhere again.
pub struct WeakCounter {
    referent: Atomic<Option<UntracedRef>>,
}

impl WeakCounter {
    pub(crate) fn new(referent: UntracedRef) -> Self {
        Self {
            referent: Atomic::new(Some(referent)),
        }
    }

    /// Address of the tracked object, or `None` once the counter has been cleared.
    #[inline(always)]
    pub fn payload(&self) -> Option<UntracedRef> {
        self.referent.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn is_cleared(&self) -> bool {
        self.payload().is_none()
    }

    /// Invalidates the counter. Only the collector's weak processing calls this.
    pub(crate) fn clear(&self) {
        self.referent.store(None, Ordering::Release);
    }
}

// The referent is deliberately not reported.
unsafe impl Trace for WeakCounter {}
impl Collectable for WeakCounter {}

impl std::fmt::Debug for WeakCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.payload() {
            Some(referent) => write!(f, "WeakCounter({:#x})", referent.addr()),
            None => write!(f, "WeakCounter(cleared)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gc_info::GcInfoTrait, gcref::UntypedGcRef, header::HeapObjectHeader};
    use std::ptr::NonNull;

    #[test]
    fn payload_is_lock_free() {
        assert!(Atomic::<Option<UntracedRef>>::is_lock_free());
    }

    #[test]
    fn clearing_is_one_way() {
        let mut object = HeapObjectHeader::new(<i32 as GcInfoTrait>::GC_INFO, 32);
        let referent = unsafe { UntypedGcRef::from_header(NonNull::from(&mut object)) };
        let counter = WeakCounter::new(UntracedRef::of(referent));

        assert_eq!(counter.payload(), Some(UntracedRef::of(referent)));
        assert!(!counter.is_cleared());
        counter.clear();
        assert!(counter.is_cleared());
        counter.clear();
        assert_eq!(counter.payload(), None);
        assert_eq!(format!("{:?}", counter), "WeakCounter(cleared)");
    }
}
