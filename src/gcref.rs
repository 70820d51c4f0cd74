use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Deref,
    ptr::NonNull,
};

use crate::{gc_info::GcInfo, header::HeapObjectHeader};

/// Indicates that a type can be traced by a garbage collector.
///
/// # Safety
/// `trace` must report every [Gc] reachable from `self`. A reference that is not reported may
/// be reclaimed while still in use.
pub unsafe trait Trace {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        let _ = vis;
    }
}

/// Types that can be allocated on the GC heap.
pub trait Collectable: Trace + 'static {}

pub trait Visitor {
    fn mark_object(&mut self, root: &mut NonNull<HeapObjectHeader>);
}

/// Traced reference to a heap object of unknown type.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct UntypedGcRef {
    pub(crate) header: NonNull<HeapObjectHeader>,
}

impl UntypedGcRef {
    /// # Safety
    /// `header` must point to a live object allocated by a [Heap](crate::heap::Heap).
    pub unsafe fn from_header(header: NonNull<HeapObjectHeader>) -> Self {
        Self { header }
    }
    pub fn header(&self) -> NonNull<HeapObjectHeader> {
        self.header
    }
    pub fn gc_info(&self) -> &'static GcInfo {
        unsafe { (*self.header.as_ptr()).gc_info() }
    }
    pub fn is<T: Collectable>(&self) -> bool {
        self.gc_info().is::<T>()
    }
    pub fn downcast<T: Collectable>(self) -> Option<Gc<T>> {
        if self.is::<T>() {
            Some(Gc {
                base: self.header,
                marker: PhantomData,
            })
        } else {
            None
        }
    }
}

/// Traced reference to a heap object of type `T`.
#[repr(transparent)]
pub struct Gc<T: Collectable> {
    pub(crate) base: NonNull<HeapObjectHeader>,
    pub(crate) marker: PhantomData<T>,
}

impl<T: Collectable> Gc<T> {
    pub fn as_untyped(self) -> UntypedGcRef {
        UntypedGcRef { header: self.base }
    }
    pub fn header(&self) -> NonNull<HeapObjectHeader> {
        self.base
    }
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.base == other.base
    }
}

impl<T: Collectable> Deref for Gc<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        unsafe { &*(*self.base.as_ptr()).payload().cast::<T>() }
    }
}

impl<T: Collectable> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: Collectable> Copy for Gc<T> {}

impl<T: Collectable> From<Gc<T>> for UntypedGcRef {
    fn from(gc: Gc<T>) -> Self {
        gc.as_untyped()
    }
}

unsafe impl<T: Collectable + Send + Sync> Send for Gc<T> {}
unsafe impl<T: Collectable + Send + Sync> Sync for Gc<T> {}
unsafe impl Send for UntypedGcRef {}
unsafe impl Sync for UntypedGcRef {}

/// Address of a heap object that the collector never follows.
///
/// Does not implement [Trace] on purpose: a structure holding it cannot report it to a
/// [Visitor], so the object it names is kept alive only by other references. Turning it back
/// into a traced reference is only sound while the object is known to be alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct UntracedRef {
    addr: NonNull<HeapObjectHeader>,
}

impl UntracedRef {
    pub fn of(object: impl Into<UntypedGcRef>) -> Self {
        Self {
            addr: object.into().header,
        }
    }
    pub fn addr(self) -> usize {
        self.addr.as_ptr() as usize
    }
    pub fn header(self) -> NonNull<HeapObjectHeader> {
        self.addr
    }
    /// # Safety
    /// The object must not have been reclaimed.
    pub unsafe fn to_gc(self) -> UntypedGcRef {
        UntypedGcRef { header: self.addr }
    }
}

unsafe impl Send for UntracedRef {}
unsafe impl Sync for UntracedRef {}

impl fmt::Debug for UntracedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UntracedRef({:p})", self.addr)
    }
}

impl fmt::Debug for UntypedGcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UntypedGcRef({:p})", self.header)
    }
}
impl fmt::Pointer for UntypedGcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.header)
    }
}
impl<T: Collectable> fmt::Pointer for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.base)
    }
}

impl<T: Collectable + fmt::Debug> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", **self)
    }
}
impl<T: Collectable + fmt::Display> fmt::Display for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", **self)
    }
}

impl PartialEq for UntypedGcRef {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}
impl Eq for UntypedGcRef {}
impl Hash for UntypedGcRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.header.hash(state);
    }
}

impl<T: Collectable> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}
impl<T: Collectable> Eq for Gc<T> {}
impl<T: Collectable> Hash for Gc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base.hash(state);
    }
}

unsafe impl<T: Collectable> Trace for Gc<T> {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        vis.mark_object(&mut self.base);
    }
}

unsafe impl Trace for UntypedGcRef {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        vis.mark_object(&mut self.header);
    }
}

macro_rules! impl_prim {
    ($($t: ty)*) => {
        $(
            unsafe impl Trace for $t {}
            impl Collectable for $t {}
        )*
    };
}

impl_prim!(
    u8 u16 u32 u64 u128 usize
    i8 i16 i32 i64 i128 isize
    f32 f64
    bool char
    String std::path::PathBuf
);

unsafe impl<T: Trace> Trace for [T] {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        for x in self.iter_mut() {
            x.trace(vis);
        }
    }
}

unsafe impl<T: Trace, const N: usize> Trace for [T; N] {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        self.as_mut_slice().trace(vis);
    }
}
impl<T: Trace + 'static, const N: usize> Collectable for [T; N] {}

unsafe impl<T: Trace> Trace for Vec<T> {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        for elem in self.iter_mut() {
            elem.trace(vis);
        }
    }
}
impl<T: Trace + 'static> Collectable for Vec<T> {}

unsafe impl<T: Trace + ?Sized> Trace for Box<T> {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        (**self).trace(vis);
    }
}

unsafe impl<T: Trace> Trace for Option<T> {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        if let Some(elem) = self {
            elem.trace(vis);
        }
    }
}
impl<T: Trace + 'static> Collectable for Option<T> {}

unsafe impl<K, V: Trace> Trace for HashMap<K, V> {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        for (_, v) in self.iter_mut() {
            v.trace(vis);
        }
    }
}
impl<K: 'static, V: Trace + 'static> Collectable for HashMap<K, V> {}

unsafe impl<T: Trace> Trace for parking_lot::Mutex<T> {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        self.get_mut().trace(vis);
    }
}
impl<T: Trace + 'static> Collectable for parking_lot::Mutex<T> {}

unsafe impl<'a> Trace for &'a mut dyn Trace {
    fn trace(&mut self, vis: &mut dyn Visitor) {
        (**self).trace(vis);
    }
}
