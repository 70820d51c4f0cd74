use std::any::TypeId;

use crate::gcref::{Collectable, Visitor};

pub type TraceCallback = unsafe fn(*mut u8, &mut dyn Visitor);
pub type FinalizationCallback = unsafe fn(*mut u8);

/// GcInfo contains metadata for objects. Pointer to it is the first word of every
/// [HeapObjectHeader](crate::header::HeapObjectHeader).
pub struct GcInfo {
    pub trace: TraceCallback,
    /// `None` when the type does not need drop.
    pub finalize: Option<FinalizationCallback>,
    pub type_id: fn() -> TypeId,
    pub type_name: fn() -> &'static str,
}

impl GcInfo {
    pub fn is<T: 'static>(&self) -> bool {
        (self.type_id)() == TypeId::of::<T>()
    }
}

/// Provides the static [GcInfo] of a type. Implemented for every [Collectable].
pub trait GcInfoTrait: Collectable + Sized {
    const GC_INFO: &'static GcInfo;
}

impl<T: Collectable + Sized> GcInfoTrait for T {
    const GC_INFO: &'static GcInfo = &GcInfo {
        trace: trace_erased::<T>,
        finalize: if std::mem::needs_drop::<T>() {
            Some(finalize_erased::<T>)
        } else {
            None
        },
        type_id: TypeId::of::<T>,
        type_name: std::any::type_name::<T>,
    };
}

unsafe fn trace_erased<T: Collectable>(payload: *mut u8, vis: &mut dyn Visitor) {
    (*payload.cast::<T>()).trace(vis);
}

unsafe fn finalize_erased<T>(payload: *mut u8) {
    core::ptr::drop_in_place(payload.cast::<T>());
}
