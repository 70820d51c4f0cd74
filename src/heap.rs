//! # Heap
//!
//! Non-moving mark&sweep heap that hosts objects and their weak counters. Each object gets its
//! own allocation with a [HeapObjectHeader] in front of it. Objects are never moved, so a weak
//! counter's payload stays valid until the cycle that finds its referent unreachable.
//!
//! ## Cycle
//! Collection is stop-the-world. The collecting thread arms the heap and waits until no
//! [Mutator] is inside an operation (see [crate::mutator] for the handshake). Then it runs these
//! phases in order:
//! 1. mutator root tables, before-mark constraints and the `keep` roots
//! 2. transitive marking, then after-mark constraints
//! 3. weak processing ([WeakCounterTable::sweep])
//! 4. reclaim of every unmarked object
//!
//! Weak processing always finishes before reclaim starts.

use std::{
    alloc::Layout,
    marker::PhantomData,
    mem::{align_of, size_of},
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use atomic::Atomic;
use crossbeam_utils::{Backoff, CachePadded};
use parking_lot::Mutex;

use crate::{
    atomic_cell::AtomicCell,
    error::{AllocError, AllocResult},
    gc_info::GcInfoTrait,
    gcref::{Collectable, Gc, Trace, Visitor},
    header::{HeapObjectHeader, ALLOCATION_GRANULARITY, MAX_ALLOCATION_SIZE},
    metadata,
    mutator::{Mutator, MutatorShared, ThreadState},
    sweep::{WeakCounterTable, WeakSweepOutcome},
    util::{align_usize, formatted_size, is_aligned},
};

pub const DEFAULT_MAX_HEAP_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_GC_THRESHOLD: usize = 2 * 1024 * 1024;

/// Configuration for heap constructor.
#[derive(Clone, Debug)]
pub struct HeapOptions {
    /// Log every cycle at `info` level instead of `debug`.
    pub verbose: bool,
    /// Hard limit for bytes allocated. Allocation beyond it fails with [AllocError::OutOfMemory].
    pub max_heap_size: usize,
    /// Bytes allocated before [Mutator::collect_if_necessary] starts a cycle.
    pub gc_threshold: usize,
    /// How fast the threshold grows relative to live bytes after a cycle.
    pub growth_factor: f64,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            max_heap_size: DEFAULT_MAX_HEAP_SIZE,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            growth_factor: 1.5,
        }
    }
}

impl HeapOptions {
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
    pub fn with_max_heap_size(mut self, size: usize) -> Self {
        self.max_heap_size = size;
        self
    }
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HeapPhase {
    Idle,
    Marking,
    WeakProcessing,
    Sweeping,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MarkingConstraintRuns {
    AfterMark,
    BeforeMark,
}

/// Extra roots reported by the embedder on every cycle, e.g. a VM's global table.
///
/// # Safety
/// A constraint runs on the collecting thread while every mutator is parked and the heap's
/// registries are locked:
/// - it must report every object it wants kept, since anything it misses may be reclaimed in
///   the same cycle;
/// - it must not use a [Mutator] or call back into the [Heap] (allocate, resolve weak
///   counters, add constraints, read statistics), any of which deadlocks.
pub unsafe trait MarkingConstraint {
    /// Whether to run before the `keep` roots are traced or after transitive marking.
    fn runs_at(&self) -> MarkingConstraintRuns;
    /// Name used in logs.
    fn name(&self) -> &str;
    /// A constraint returning `true` is dropped before its next run.
    fn is_over(&self) -> bool;
    fn run(&mut self, visitor: &mut dyn Visitor);
}

unsafe impl<F: FnMut(&mut dyn Visitor)> MarkingConstraint for F {
    fn runs_at(&self) -> MarkingConstraintRuns {
        MarkingConstraintRuns::BeforeMark
    }
    fn name(&self) -> &str {
        "closure"
    }
    fn is_over(&self) -> bool {
        false
    }
    fn run(&mut self, visitor: &mut dyn Visitor) {
        self(visitor)
    }
}

/// Result of a single collection cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycle: usize,
    pub marked: usize,
    pub freed_objects: usize,
    pub freed_bytes: usize,
    pub weak: WeakSweepOutcome,
}

#[derive(Default)]
pub(crate) struct HeapCounters {
    pub(crate) allocations: AtomicCell,
    pub(crate) weak_counters_created: AtomicCell,
    pub(crate) weak_counters_cleared: AtomicCell,
    pub(crate) weak_install_races: AtomicCell,
    pub(crate) cycles: AtomicCell,
}

pub struct Heap {
    options: HeapOptions,
    /// Set while a cycle runs; mutators back off from entering operations.
    armed: AtomicBool,
    /// Held for the whole cycle. Serializes collectors and parks mutators that saw `armed`.
    cycle: Mutex<()>,
    mutators: Mutex<Vec<Arc<MutatorShared>>>,
    objects: Mutex<Vec<NonNull<HeapObjectHeader>>>,
    pub(crate) weak_counters: Mutex<WeakCounterTable>,
    constraints: Mutex<Vec<Box<dyn MarkingConstraint + Send>>>,
    bytes_allocated: CachePadded<AtomicUsize>,
    threshold: AtomicUsize,
    phase: Atomic<HeapPhase>,
    pub(crate) counters: HeapCounters,
}

unsafe impl Send for Heap {}
#[cfg(feature = "threads")]
unsafe impl Sync for Heap {}

impl Heap {
    pub fn new(options: HeapOptions) -> Self {
        Self {
            threshold: AtomicUsize::new(options.gc_threshold),
            options,
            armed: AtomicBool::new(false),
            cycle: Mutex::new(()),
            mutators: Mutex::new(Vec::new()),
            objects: Mutex::new(Vec::new()),
            weak_counters: Mutex::new(WeakCounterTable::new()),
            constraints: Mutex::new(Vec::new()),
            bytes_allocated: CachePadded::new(AtomicUsize::new(0)),
            phase: Atomic::new(HeapPhase::Idle),
            counters: HeapCounters::default(),
        }
    }

    pub fn options(&self) -> &HeapOptions {
        &self.options
    }

    pub fn phase(&self) -> HeapPhase {
        self.phase.load(Ordering::Acquire)
    }

    /// Attaches the calling thread to this heap.
    ///
    /// # Panics
    /// If the thread already has a mutator for this heap.
    pub fn mutator(&self) -> Mutator<'_> {
        Mutator::attach(self)
    }

    pub(crate) fn register_mutator(&self, mutator: Arc<MutatorShared>) {
        self.mutators.lock().push(mutator);
    }

    pub(crate) fn unregister_mutator(&self, mutator: &Arc<MutatorShared>) {
        self.mutators
            .lock()
            .retain(|registered| !Arc::ptr_eq(registered, mutator));
    }

    pub fn mutator_count(&self) -> usize {
        self.mutators.lock().len()
    }

    #[inline(always)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Parks until the running cycle is over.
    #[cold]
    pub(crate) fn wait_for_cycle(&self) {
        drop(self.cycle.lock());
    }

    /// Add GC constraint to the heap. See [MarkingConstraint].
    pub fn add_constraint<T: MarkingConstraint + Send + 'static>(&self, constraint: T) {
        self.constraints.lock().push(Box::new(constraint));
    }

    /// Caller must be inside a mutator operation.
    pub(crate) fn allocate_raw<T: Collectable>(&self, value: T) -> AllocResult<Gc<T>> {
        if align_of::<T>() > ALLOCATION_GRANULARITY {
            return Err(AllocError::UnsupportedAlignment {
                align: align_of::<T>(),
            });
        }
        let size = align_usize(
            size_of::<HeapObjectHeader>() + size_of::<T>(),
            ALLOCATION_GRANULARITY,
        );
        self.reserve(size)?;
        unsafe {
            let layout = Layout::from_size_align_unchecked(size, ALLOCATION_GRANULARITY);
            let memory = std::alloc::alloc(layout);
            if memory.is_null() {
                self.bytes_allocated.fetch_sub(size, Ordering::Relaxed);
                return Err(AllocError::OutOfMemory {
                    requested: size,
                    available: 0,
                });
            }
            debug_assert!(is_aligned(memory as usize, ALLOCATION_GRANULARITY));
            let header = memory.cast::<HeapObjectHeader>();
            header.write(HeapObjectHeader::new(<T as GcInfoTrait>::GC_INFO, size));
            (*header).payload().cast::<T>().write(value);
            let base = NonNull::new_unchecked(header);
            self.objects.lock().push(base);
            self.counters.allocations.fetch_and_add(1);
            Ok(Gc {
                base,
                marker: PhantomData,
            })
        }
    }

    fn reserve(&self, size: usize) -> AllocResult<()> {
        let mut current = self.bytes_allocated.load(Ordering::Relaxed);
        loop {
            let available = self.options.max_heap_size.saturating_sub(current);
            if size > available || size > MAX_ALLOCATION_SIZE {
                return Err(AllocError::OutOfMemory {
                    requested: size,
                    available,
                });
            }
            match self.bytes_allocated.compare_exchange_weak(
                current,
                current + size,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Write barrier for a store of `object` into another heap object. Objects never move and
    /// marking only happens while mutators are parked, so there is nothing to record; the barrier
    /// checks that the store does not race with a cycle.
    #[inline(always)]
    pub fn write_barrier<T: Collectable>(&self, object: Gc<T>) {
        debug_assert_eq!(
            self.phase(),
            HeapPhase::Idle,
            "store of {:p} while a cycle is running",
            object
        );
    }

    pub(crate) fn over_threshold(&self) -> bool {
        self.bytes_allocated.load(Ordering::Relaxed) >= self.threshold.load(Ordering::Relaxed)
    }

    /// Stops every mutator, marks, clears weak counters of dead objects and reclaims them.
    /// The calling thread must not be inside an operation of a mutator of this heap.
    pub(crate) fn collect_cycle(&self, keep: &mut [&mut dyn Trace]) -> CycleStats {
        let cycle_guard = self.cycle.lock();
        self.armed.store(true, Ordering::SeqCst);
        let mutators = self.mutators.lock();
        for mutator in mutators.iter() {
            let backoff = Backoff::new();
            while mutator.state() != ThreadState::Safe {
                backoff.snooze();
            }
        }
        let time = Instant::now();
        let before = self.bytes_allocated.load(Ordering::Relaxed);
        let cycle = (self.counters.cycles.fetch_and_add(1) - 1) as usize;

        self.phase.store(HeapPhase::Marking, Ordering::Release);
        let mut marker = Marker {
            mark_stack: Vec::new(),
            marked: 0,
        };
        for mutator in mutators.iter() {
            unsafe {
                mutator.trace_roots(&mut marker);
            }
        }
        let mut constraints = self.constraints.lock();
        run_constraints(&mut constraints, MarkingConstraintRuns::BeforeMark, &mut marker);
        keep.trace(&mut marker);
        unsafe {
            marker.drain();
        }
        run_constraints(&mut constraints, MarkingConstraintRuns::AfterMark, &mut marker);
        unsafe {
            marker.drain();
        }
        drop(constraints);

        self.phase.store(HeapPhase::WeakProcessing, Ordering::Release);
        let weak = unsafe {
            self.weak_counters
                .lock()
                .sweep(|object| object.as_ref().is_marked())
        };
        self.counters
            .weak_counters_cleared
            .fetch_and_add(weak.cleared as isize);

        self.phase.store(HeapPhase::Sweeping, Ordering::Release);
        let (freed_objects, freed_bytes) = unsafe { self.reclaim() };
        self.phase.store(HeapPhase::Idle, Ordering::Release);

        let after = self.bytes_allocated.load(Ordering::Relaxed);
        let threshold =
            ((after as f64 * self.options.growth_factor) as usize).max(self.options.gc_threshold);
        self.threshold.store(threshold, Ordering::Relaxed);
        self.armed.store(false, Ordering::SeqCst);
        drop(mutators);
        drop(cycle_guard);

        let level = if self.options.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        };
        log::log!(
            level,
            "[gc] GC({}) Pause MarkSweep {}->{}({}) {:.4}ms",
            cycle,
            formatted_size(before),
            formatted_size(after),
            formatted_size(threshold),
            time.elapsed().as_micros() as f64 / 1000.0
        );
        log::log!(
            level,
            "[gc] GC({}) Weak counters: {} cleared, {} retired, {} retained",
            cycle,
            weak.cleared,
            weak.retired,
            weak.retained
        );
        CycleStats {
            cycle,
            marked: marker.marked,
            freed_objects,
            freed_bytes,
            weak,
        }
    }

    /// Frees every unmarked object and clears mark bits of the survivors.
    unsafe fn reclaim(&self) -> (usize, usize) {
        debug_assert_eq!(self.phase(), HeapPhase::Sweeping);
        let mut freed_objects = 0;
        let mut freed_bytes = 0;
        self.objects.lock().retain(|object| {
            let header = object.as_ptr();
            if (*header).is_marked() {
                (*header).clear_mark();
                true
            } else {
                freed_objects += 1;
                freed_bytes += (*header).size();
                destroy(*object);
                false
            }
        });
        self.bytes_allocated
            .fetch_sub(freed_bytes, Ordering::Relaxed);
        (freed_objects, freed_bytes)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    /// Number of counters whose referent was alive at the end of the last cycle or that were
    /// created since.
    pub fn weak_counter_count(&self) -> usize {
        self.weak_counters.lock().len()
    }

    pub fn statistics(&self) -> HeapStatistics {
        HeapStatistics {
            objects: self.object_count(),
            bytes_allocated: self.bytes_allocated(),
            max_heap_size: self.options.max_heap_size,
            heap_threshold: self.threshold.load(Ordering::Relaxed),
            total_gc_cycles_count: self.counters.cycles.get() as usize,
            total_objects_allocated: self.counters.allocations.get() as usize,
            weak_counters_live: self.weak_counter_count(),
            weak_counters_created: self.counters.weak_counters_created.get() as usize,
            weak_counters_cleared: self.counters.weak_counters_cleared.get() as usize,
            weak_install_races: self.counters.weak_install_races.get() as usize,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapOptions::default())
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        for object in self.objects.get_mut().drain(..) {
            unsafe {
                destroy(object);
            }
        }
    }
}

/// Runs the finalizer, frees metadata and returns memory of `object`.
unsafe fn destroy(object: NonNull<HeapObjectHeader>) {
    let header = object.as_ptr();
    if let Some(finalize) = (*header).gc_info().finalize {
        finalize((*header).payload());
    }
    metadata::destroy_meta(&*header);
    let size = (*header).size();
    std::alloc::dealloc(
        header.cast(),
        Layout::from_size_align_unchecked(size, ALLOCATION_GRANULARITY),
    );
}

fn run_constraints(
    constraints: &mut Vec<Box<dyn MarkingConstraint + Send>>,
    runs: MarkingConstraintRuns,
    visitor: &mut dyn Visitor,
) {
    constraints.retain_mut(|constraint| {
        if constraint.is_over() {
            false
        } else {
            if constraint.runs_at() == runs {
                constraint.run(&mut *visitor);
            }
            true
        }
    });
}

struct Marker {
    mark_stack: Vec<NonNull<HeapObjectHeader>>,
    marked: usize,
}

impl Marker {
    unsafe fn drain(&mut self) {
        while let Some(object) = self.mark_stack.pop() {
            let header = object.as_ptr();
            ((*header).gc_info().trace)((*header).payload(), self);
            // metadata holds its weak counter strongly
            if let Some(mut counter) = NonNull::new(metadata::weak_counter_address(&*header)) {
                self.mark_object(&mut counter);
            }
        }
    }
}

impl Visitor for Marker {
    fn mark_object(&mut self, root: &mut NonNull<HeapObjectHeader>) {
        unsafe {
            if (*root.as_ptr()).set_marked() {
                self.marked += 1;
                self.mark_stack.push(*root);
            }
        }
    }
}

pub struct HeapStatistics {
    pub objects: usize,
    pub bytes_allocated: usize,
    pub max_heap_size: usize,
    pub heap_threshold: usize,
    pub total_gc_cycles_count: usize,
    pub total_objects_allocated: usize,
    pub weak_counters_live: usize,
    pub weak_counters_created: usize,
    pub weak_counters_cleared: usize,
    pub weak_install_races: usize,
}

impl std::fmt::Display for HeapStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Heap statistics:")?;
        writeln!(
            f,
            "  Memory allocated: {} of {}",
            formatted_size(self.bytes_allocated),
            formatted_size(self.max_heap_size)
        )?;
        writeln!(f, "  Heap threshold: {}", formatted_size(self.heap_threshold))?;
        writeln!(f, "  Live objects: {}", self.objects)?;
        writeln!(f, "  Total objects allocated: {}", self.total_objects_allocated)?;
        writeln!(f, "  Total GC cycles: {}", self.total_gc_cycles_count)?;
        writeln!(
            f,
            "  Weak counters: {} live, {} created, {} cleared",
            self.weak_counters_live, self.weak_counters_created, self.weak_counters_cleared
        )?;
        write!(f, "  Weak counter install races: {}", self.weak_install_races)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        value: i32,
        next: Option<Gc<Node>>,
    }

    unsafe impl Trace for Node {
        fn trace(&mut self, vis: &mut dyn Visitor) {
            self.next.trace(vis);
        }
    }
    impl Collectable for Node {}

    struct DropFlag(std::sync::Arc<std::sync::atomic::AtomicBool>);

    unsafe impl Trace for DropFlag {}
    impl Collectable for DropFlag {}
    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn unrooted_objects_are_reclaimed() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let _ = mutator.allocate(1i32);
        let _ = mutator.allocate(2i32);
        let mut kept = mutator.allocate(3i32);
        assert_eq!(heap.object_count(), 3);

        let stats = mutator.collect(&mut [&mut kept]).unwrap();
        assert_eq!(stats.freed_objects, 2);
        assert_eq!(stats.marked, 1);
        assert_eq!(heap.object_count(), 1);
        assert_eq!(*kept, 3);
        assert_eq!(heap.phase(), HeapPhase::Idle);
    }

    #[test]
    fn marking_is_transitive() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let tail = mutator.allocate(Node {
            value: 2,
            next: None,
        });
        let mut head = mutator.allocate(Node {
            value: 1,
            next: Some(tail),
        });
        let _garbage = mutator.allocate(Node {
            value: 3,
            next: None,
        });

        mutator.collect(&mut [&mut head]).unwrap();
        assert_eq!(heap.object_count(), 2);
        assert_eq!(head.value, 1);
        assert_eq!(head.next.as_ref().unwrap().value, 2);
    }

    #[test]
    fn reclaim_runs_drop() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let _ = mutator.allocate(DropFlag(flag.clone()));
        mutator.collect(&mut []).unwrap();
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn dropping_heap_drops_objects() {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        {
            let heap = Heap::default();
            let mutator = heap.mutator();
            let _ = mutator.allocate(DropFlag(flag.clone()));
        }
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn allocation_beyond_limit_fails() {
        let heap = Heap::new(HeapOptions::default().with_max_heap_size(64));
        let mutator = heap.mutator();
        let first = mutator.try_allocate(1u64);
        assert!(first.is_ok());
        let second = mutator.try_allocate([0u64; 16]);
        assert!(matches!(
            second,
            Err(AllocError::OutOfMemory {
                requested: 160,
                available: 16
            })
        ));
        assert_eq!(heap.object_count(), 1);
    }

    #[test]
    fn over_aligned_types_are_rejected() {
        #[repr(align(64))]
        struct Wide(u8);
        unsafe impl Trace for Wide {}
        impl Collectable for Wide {}

        let heap = Heap::default();

        let mutator = heap.mutator();
        assert_eq!(
            mutator.try_allocate(Wide(0)).err(),
            Some(AllocError::UnsupportedAlignment { align: 64 })
        );
    }

    #[test]
    fn constraints_provide_roots() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let root = mutator.allocate(7i32);
        let root_ref = root.as_untyped();
        heap.add_constraint(move |vis: &mut dyn Visitor| {
            let mut root = root_ref;
            root.trace(vis);
        });
        let _ = mutator.allocate(8i32);
        mutator.collect(&mut []).unwrap();
        assert_eq!(heap.object_count(), 1);
        assert_eq!(*root, 7);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "while a cycle is running")]
    fn write_barrier_rejects_stores_during_a_cycle() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let object = mutator.allocate(1i32).as_untyped();
        let heap_addr = &heap as *const Heap as usize;
        heap.add_constraint(move |_: &mut dyn Visitor| {
            let heap = unsafe { &*(heap_addr as *const Heap) };
            heap.write_barrier(object.downcast::<i32>().unwrap());
        });
        mutator.collect(&mut []);
    }

    #[test]
    fn write_barrier_accepts_stores_between_cycles() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let object = mutator.allocate(1i32);
        heap.write_barrier(object);
    }

    #[test]
    fn threshold_drives_collect_if_necessary() {
        let heap = Heap::new(HeapOptions::default().with_gc_threshold(128));
        let mutator = heap.mutator();
        let _ = mutator.allocate(1u64);
        assert!(mutator.collect_if_necessary(&mut []).is_none());
        for _ in 0..8 {
            let _ = mutator.allocate(1u64);
        }
        let stats = mutator.collect_if_necessary(&mut []).unwrap();
        assert_eq!(stats.freed_objects, 9);
        assert_eq!(heap.statistics().total_gc_cycles_count, 1);
    }

    #[test]
    fn statistics_render() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let _ = mutator.allocate(1i32);
        let text = heap.statistics().to_string();
        assert!(text.starts_with("Heap statistics:"));
        assert!(text.contains("Live objects: 1"));
    }

    #[cfg(feature = "threads")]
    #[test]
    fn existing_counter_lookup_does_not_wait_for_a_cycle() {
        let heap = Heap::default();
        let mutator = heap.mutator();
        let object = mutator.allocate_rooted(1i32).unwrap();
        let counter = mutator.get_counter(*object).unwrap();
        let target = object.get();

        let running = heap.cycle.lock();
        heap.armed.store(true, Ordering::SeqCst);
        crossbeam_utils::thread::scope(|scope| {
            scope.spawn(|_| {
                let mutator = heap.mutator();
                let found = mutator.get_counter(target).unwrap();
                assert!(Gc::ptr_eq(&found, &counter));
                assert_eq!(mutator.state(), ThreadState::Safe);
            });
        })
        .unwrap();
        heap.armed.store(false, Ordering::SeqCst);
        drop(running);
    }
}
