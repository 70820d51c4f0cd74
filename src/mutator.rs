//! # Mutator
//!
//! Every thread that touches a [Heap] does so through its own [Mutator], obtained with
//! [Heap::mutator]. A thread may hold at most one mutator per heap.
//!
//! ## Handshake
//! Heap operations run while the mutator is in [ThreadState::Unsafe]. Entering that state is a
//! store of the state followed by a load of the heap's `armed` flag; a collector stores `armed`
//! and then waits until every registered mutator is [ThreadState::Safe]. Both sides use
//! sequentially consistent accesses, so a mutator either sees the armed flag and backs off, or
//! the collector sees the mutator inside its operation and waits for it. No lock is taken on the
//! way in or out. A mutator only waits when a cycle is actually running.
//!
//! ## Roots
//! References obtained from a mutator are not rooted by default. [Mutator::root] (and every
//! weak reference resolution) stores the reference in the mutator's root table, and the
//! collector marks from every root table before anything else. A slot stays occupied until its
//! [Root] is dropped.

use std::{
    cell::{Cell, RefCell, UnsafeCell},
    fmt,
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::Deref,
    ptr::{null_mut, NonNull},
    sync::{atomic::AtomicPtr, Arc},
};

use atomic::{Atomic, Ordering};

use crate::{
    error::{AllocError, AllocResult},
    gcref::{Collectable, Gc, Trace, UntypedGcRef, Visitor},
    header::HeapObjectHeader,
    heap::{CycleStats, Heap},
};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ThreadState {
    /// Inside a heap operation or a [MutatorScope]. Collection has to wait.
    Unsafe = 0,
    /// Not touching the heap.
    Safe = 1,
}

/// Part of a mutator that the collector reads.
pub(crate) struct MutatorShared {
    state: Atomic<ThreadState>,
    roots: UnsafeCell<Vec<AtomicPtr<HeapObjectHeader>>>,
}

// `roots` only grows while its mutator is `Unsafe`, and the collector reads it only after it has
// observed every mutator `Safe` with the heap armed. Slots themselves are atomics.
unsafe impl Send for MutatorShared {}
unsafe impl Sync for MutatorShared {}

impl MutatorShared {
    fn new() -> Self {
        Self {
            state: Atomic::new(ThreadState::Safe),
            roots: UnsafeCell::new(Vec::new()),
        }
    }

    pub(crate) fn state(&self) -> ThreadState {
        self.state.load(Ordering::SeqCst)
    }

    /// # Safety
    /// Heap must be armed and this mutator observed `Safe`.
    pub(crate) unsafe fn trace_roots(&self, vis: &mut dyn Visitor) {
        for slot in (*self.roots.get()).iter() {
            if let Some(mut root) = NonNull::new(slot.load(Ordering::Acquire)) {
                vis.mark_object(&mut root);
            }
        }
    }
}

thread_local! {
    static ATTACHED_HEAPS: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// Thread-bound handle to a [Heap]. Allocation, rooting, weak reference resolution and
/// collection go through it.
pub struct Mutator<'h> {
    heap: &'h Heap,
    shared: Arc<MutatorShared>,
    depth: Cell<usize>,
    free_slots: RefCell<Vec<usize>>,
    _thread_bound: PhantomData<*const ()>,
}

impl<'h> Mutator<'h> {
    pub(crate) fn attach(heap: &'h Heap) -> Self {
        let key = heap as *const Heap as usize;
        ATTACHED_HEAPS.with(|attached| {
            let mut attached = attached.borrow_mut();
            assert!(
                !attached.contains(&key),
                "thread already has a mutator for this heap"
            );
            attached.push(key);
        });
        let shared = Arc::new(MutatorShared::new());
        heap.register_mutator(shared.clone());
        Self {
            heap,
            shared,
            depth: Cell::new(0),
            free_slots: RefCell::new(Vec::new()),
            _thread_bound: PhantomData,
        }
    }

    pub fn heap(&self) -> &'h Heap {
        self.heap
    }

    pub fn state(&self) -> ThreadState {
        self.shared.state()
    }

    pub fn is_in_scope(&self) -> bool {
        self.depth.get() != 0
    }

    /// Enters a mutator scope: no collection cycle runs until the scope is dropped. Waits if a
    /// cycle is running right now. Scopes nest.
    pub fn enter(&self) -> MutatorScope<'_> {
        let depth = self.depth.get();
        self.depth.set(depth + 1);
        if depth == 0 {
            loop {
                self.shared.state.store(ThreadState::Unsafe, Ordering::SeqCst);
                if !self.heap.is_armed() {
                    break;
                }
                self.shared.state.store(ThreadState::Safe, Ordering::SeqCst);
                self.heap.wait_for_cycle();
            }
        }
        MutatorScope { mutator: self }
    }

    fn leave(&self) {
        let depth = self.depth.get() - 1;
        self.depth.set(depth);
        if depth == 0 {
            self.shared.state.store(ThreadState::Safe, Ordering::Release);
        }
    }

    /// Allocates `value` on GC heap. The result is not rooted: keep it in a [Root], pass it to
    /// [Mutator::collect] or hold a [MutatorScope] while using it.
    pub fn try_allocate<T: Collectable>(&self, value: T) -> AllocResult<Gc<T>> {
        let _scope = self.enter();
        self.heap.allocate_raw(value)
    }

    /// Same as [Mutator::try_allocate] but aborts the process when there is no memory left.
    pub fn allocate<T: Collectable>(&self, value: T) -> Gc<T> {
        match self.try_allocate(value) {
            Ok(object) => object,
            Err(error) => oom_abort(error),
        }
    }

    /// Allocates `value` and roots it in one step.
    pub fn allocate_rooted<T: Collectable>(&self, value: T) -> AllocResult<Root<'_, Gc<T>>> {
        let _scope = self.enter();
        let object = self.heap.allocate_raw(value)?;
        Ok(self.root(object))
    }

    /// Roots `value` until the returned [Root] is dropped.
    ///
    /// `value` must still be alive, i.e. reachable or obtained in the current scope.
    pub fn root<T: Rootable>(&self, value: T) -> Root<'_, T> {
        let _scope = self.enter();
        let header = value.header().as_ptr();
        let roots = unsafe { &mut *self.shared.roots.get() };
        let slot = match self.free_slots.borrow_mut().pop() {
            Some(slot) => {
                roots[slot].store(header, Ordering::Release);
                slot
            }
            None => {
                roots.push(AtomicPtr::new(header));
                roots.len() - 1
            }
        };
        Root {
            mutator: self,
            slot,
            value,
        }
    }

    fn release(&self, slot: usize) {
        let roots = unsafe { &*self.shared.roots.get() };
        roots[slot].store(null_mut(), Ordering::Release);
        self.free_slots.borrow_mut().push(slot);
    }

    /// Number of occupied root slots.
    pub fn root_count(&self) -> usize {
        let roots = unsafe { &*self.shared.roots.get() };
        roots.len() - self.free_slots.borrow().len()
    }

    /// Perform garbage collection cycle. Roots are every mutator's root table, the heap's
    /// constraints and `keep`.
    ///
    /// Returns `None` without collecting when called inside a [MutatorScope] of this mutator.
    pub fn collect(&self, keep: &mut [&mut dyn Trace]) -> Option<CycleStats> {
        if self.is_in_scope() {
            log::warn!("[gc] collection requested inside a mutator scope, deferring");
            return None;
        }
        Some(self.heap.collect_cycle(keep))
    }

    /// Starts a cycle if allocated bytes crossed the current threshold.
    pub fn collect_if_necessary(&self, keep: &mut [&mut dyn Trace]) -> Option<CycleStats> {
        if !self.heap.over_threshold() {
            return None;
        }
        self.collect(keep)
    }
}

impl Drop for Mutator<'_> {
    fn drop(&mut self) {
        self.heap.unregister_mutator(&self.shared);
        let key = self.heap as *const Heap as usize;
        ATTACHED_HEAPS.with(|attached| attached.borrow_mut().retain(|heap| *heap != key));
    }
}

/// Proof that no collection cycle runs. Obtained with [Mutator::enter].
pub struct MutatorScope<'m> {
    mutator: &'m Mutator<'m>,
}

impl Drop for MutatorScope<'_> {
    fn drop(&mut self) {
        self.mutator.leave();
    }
}

/// References that can be kept in a root table.
pub trait Rootable: Copy {
    fn header(&self) -> NonNull<HeapObjectHeader>;
}

impl<T: Collectable> Rootable for Gc<T> {
    fn header(&self) -> NonNull<HeapObjectHeader> {
        self.base
    }
}

impl Rootable for UntypedGcRef {
    fn header(&self) -> NonNull<HeapObjectHeader> {
        self.header
    }
}

/// Rooted reference. The object stays alive at least until the root is dropped.
pub struct Root<'m, T: Rootable> {
    mutator: &'m Mutator<'m>,
    slot: usize,
    value: T,
}

impl<'m, T: Rootable> Root<'m, T> {
    /// The reference itself. The copy is not rooted on its own.
    pub fn get(&self) -> T {
        self.value
    }
}

impl<'m> Root<'m, UntypedGcRef> {
    pub fn downcast<T: Collectable>(self) -> Result<Root<'m, Gc<T>>, Self> {
        match self.value.downcast::<T>() {
            Some(value) => {
                let this = ManuallyDrop::new(self);
                Ok(Root {
                    mutator: this.mutator,
                    slot: this.slot,
                    value,
                })
            }
            None => Err(self),
        }
    }
}

impl<T: Rootable> Deref for Root<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Rootable> Clone for Root<'_, T> {
    fn clone(&self) -> Self {
        self.mutator.root(self.value)
    }
}

impl<T: Rootable> Drop for Root<'_, T> {
    fn drop(&mut self) {
        self.mutator.release(self.slot);
    }
}

impl<T: Rootable> fmt::Pointer for Root<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.value.header())
    }
}

impl<T: Rootable + fmt::Debug> fmt::Debug for Root<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Root({:?})", self.value)
    }
}

#[cold]
pub fn oom_abort(error: AllocError) -> ! {
    log::error!("{}", error);
    eprintln!("OutOfMemory");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_survive_collection() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let rooted = mutator.allocate_rooted(String::from("kept")).unwrap();
        let _ = mutator.allocate(String::from("dropped"));

        let stats = mutator.collect(&mut []).unwrap();
        assert_eq!(stats.freed_objects, 1);
        assert_eq!(rooted.as_str(), "kept");
        assert_eq!(mutator.root_count(), 1);

        drop(rooted);
        assert_eq!(mutator.root_count(), 0);
        mutator.collect(&mut []).unwrap();
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn slots_are_reused() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let object = mutator.allocate_rooted(1i32).unwrap();
        let copy = object.clone();
        assert_eq!(mutator.root_count(), 2);
        drop(object);
        let again = mutator.root(copy.get());
        assert_eq!(mutator.root_count(), 2);
        assert_eq!(**again, 1);
    }

    #[test]
    fn untyped_root_downcasts() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let object = mutator.allocate_rooted(5u16).unwrap();
        let untyped = mutator.root(object.as_untyped());
        let untyped = untyped.downcast::<u32>().unwrap_err();
        let typed = untyped.downcast::<u16>().unwrap();
        assert_eq!(**typed, 5);
        assert_eq!(mutator.root_count(), 2);
    }

    #[test]
    fn scopes_nest_and_block_collection() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        assert_eq!(mutator.state(), ThreadState::Safe);
        let outer = mutator.enter();
        let inner = mutator.enter();
        assert_eq!(mutator.state(), ThreadState::Unsafe);
        drop(inner);
        assert_eq!(mutator.state(), ThreadState::Unsafe);
        assert!(mutator.collect(&mut []).is_none());
        drop(outer);
        assert_eq!(mutator.state(), ThreadState::Safe);
        assert!(mutator.collect(&mut []).is_some());
    }

    #[test]
    fn scope_on_one_heap_does_not_block_another() {
        let first = Heap::default();
        let second = Heap::default();
        let a = first.mutator();
        let b = second.mutator();
        let _scope = a.enter();
        let _ = b.allocate(1u8);
        let stats = b.collect(&mut []).unwrap();
        assert_eq!(stats.freed_objects, 1);
    }

    #[test]
    #[should_panic(expected = "thread already has a mutator for this heap")]
    fn one_mutator_per_thread_and_heap() {
        let heap = Heap::default();
        let _first = heap.mutator();
        let _second = heap.mutator();
    }

    #[test]
    fn mutator_can_be_reattached() {
        let heap = Heap::default();
        drop(heap.mutator());
        let mutator = heap.mutator();
        assert_eq!(heap.mutator_count(), 1);
        drop(mutator);
        assert_eq!(heap.mutator_count(), 0);
    }
}
